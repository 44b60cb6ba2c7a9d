use crate::proto::ElementId;
use crate::proto::QueryDescriptor;
use crate::proto::SearchScope;
use crate::snapshot::Snapshot;
use crate::snapshot::model::Element;
use std::collections::HashSet;

/// Hard filters derived from a descriptor. A candidate failing any of them
/// is dropped before scoring.
pub(crate) struct Constraints<'d> {
    descriptor: &'d QueryDescriptor,
    anchor_id: ElementId,
    types: HashSet<u32>,
    template_types: HashSet<u32>,
}

impl<'d> Constraints<'d> {
    pub(crate) fn new(descriptor: &'d QueryDescriptor, anchor_id: ElementId) -> Self {
        Self {
            descriptor,
            anchor_id,
            types: descriptor.type_in.iter().flatten().copied().collect(),
            template_types: descriptor
                .template_type_in
                .iter()
                .flatten()
                .copied()
                .collect(),
        }
    }

    pub(crate) fn admits(&self, snapshot: &Snapshot, element: &Element) -> bool {
        let descriptor = self.descriptor;
        if element.id == self.anchor_id {
            return false;
        }
        let Some(distance) = distance_below(snapshot, self.anchor_id, element) else {
            return false;
        };
        if descriptor.search_scope == SearchScope::DirectChildren && distance != 1 {
            return false;
        }
        if let Some(max) = descriptor.max_depth_from_anchor
            && distance > max
        {
            return false;
        }
        if let Some(created) = descriptor.is_created
            && element.is_created != created
        {
            return false;
        }
        if let Some(visible) = descriptor.is_visible
            && element.is_visible != visible
        {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&element.type_id) {
            return false;
        }
        if !self.template_types.is_empty() && !self.template_types.contains(&element.template_type)
        {
            return false;
        }
        if let Some(fingerprint) = descriptor.fingerprint
            && element.effective_fingerprint() != fingerprint
        {
            return false;
        }
        if let Some(offset) = descriptor.child_offset_id
            && element.child_offset_id != offset
        {
            return false;
        }
        if descriptor.child_count_min.is_some() || descriptor.child_count_max.is_some() {
            let count = snapshot.child_count(element.id);
            if descriptor.child_count_min.is_some_and(|min| count < min)
                || descriptor.child_count_max.is_some_and(|max| count > max)
            {
                return false;
            }
        }
        if let Some(expected) = descriptor.parent_fingerprint {
            let parent = snapshot
                .get_element(element.parent_id)
                .map(Element::effective_fingerprint);
            if parent != Some(expected) {
                return false;
            }
        }
        true
    }
}

/// Number of parent links from `element` up to `ancestor`, or `None` when
/// `ancestor` is not on its parent chain. The walk is bounded by the
/// snapshot size so a corrupted chain cannot loop.
pub(crate) fn distance_below(
    snapshot: &Snapshot,
    ancestor: ElementId,
    element: &Element,
) -> Option<u32> {
    let mut current = element.parent_id;
    for steps in 1..=snapshot.element_count() {
        if current == ancestor {
            return u32::try_from(steps).ok();
        }
        match snapshot.parent_of(current) {
            Some(next) if next != 0 => current = next,
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::build_snapshot;
    use crate::snapshot::test_support::sample_host;
    use pretty_assertions::assert_eq;

    fn admitted(snapshot: &Snapshot, descriptor: &QueryDescriptor, anchor: ElementId) -> Vec<u64> {
        let constraints = Constraints::new(descriptor, anchor);
        snapshot
            .elements()
            .filter(|e| constraints.admits(snapshot, e))
            .map(|e| e.id)
            .collect()
    }

    #[test]
    fn distance_follows_parent_chain() {
        let snapshot = build_snapshot(&sample_host());
        let seven = snapshot.get_element(7).unwrap();
        assert_eq!(distance_below(&snapshot, 3, seven), Some(2));
        assert_eq!(distance_below(&snapshot, 1, seven), Some(3));
        assert_eq!(distance_below(&snapshot, 2, seven), None);
    }

    #[test]
    fn scope_and_depth_limit_candidates() {
        let snapshot = build_snapshot(&sample_host());
        let all = QueryDescriptor::default();
        assert_eq!(admitted(&snapshot, &all, 1), vec![2, 3, 4, 5, 6, 7]);

        let direct = QueryDescriptor::default().with_scope(SearchScope::DirectChildren);
        assert_eq!(admitted(&snapshot, &direct, 1), vec![2, 3]);

        let shallow = QueryDescriptor {
            max_depth_from_anchor: Some(2),
            ..Default::default()
        };
        assert_eq!(admitted(&snapshot, &shallow, 1), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn attribute_filters_combine() {
        let snapshot = build_snapshot(&sample_host());
        let leaves = QueryDescriptor {
            child_count_max: Some(0),
            parent_fingerprint: Some(0),
            ..Default::default()
        };
        assert_eq!(admitted(&snapshot, &leaves, 1), vec![4, 5, 7]);

        let under_row = QueryDescriptor {
            parent_fingerprint: Some(300),
            child_offset_id: Some(0),
            ..Default::default()
        };
        assert_eq!(admitted(&snapshot, &under_row, 1), vec![6]);

        let typed = QueryDescriptor {
            type_in: Some(vec![42]),
            ..Default::default()
        };
        assert!(admitted(&snapshot, &typed, 1).is_empty());
        let hidden = QueryDescriptor {
            is_visible: Some(false),
            ..Default::default()
        };
        assert!(admitted(&snapshot, &hidden, 1).is_empty());
    }
}
