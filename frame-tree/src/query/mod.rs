//! Declarative resolution of elements against one frozen snapshot.
//!
//! Every operation here is a pure function of the snapshot and its inputs;
//! nothing returns an error. An unknown anchor or an unsatisfiable
//! descriptor simply yields no matches.

mod constraints;
mod score;

use crate::catalog::FrameCatalog;
use crate::proto::ChildOffset;
use crate::proto::ElementId;
use crate::proto::Fingerprint;
use crate::proto::QueryDescriptor;
use crate::proto::QueryExplanation;
use crate::proto::RankedMatch;
use crate::proto::SearchScope;
use crate::proto::SelectionMode;
use crate::proto::SortKey;
use crate::proto::SortOrder;
use crate::snapshot::ElementFilter;
use crate::snapshot::Snapshot;
use crate::snapshot::model::Element;
use constraints::Constraints;
use constraints::distance_below;
use score::FAST_PATH_BONUS;
use score::FAST_PATH_REASON;
use score::Placement;
use score::score_candidate;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::debug;

/// Read-only query surface over a single snapshot.
#[derive(Clone, Copy, Debug)]
pub struct FrameQueryEngine<'a> {
    snapshot: &'a Snapshot,
}

struct Resolution<'a> {
    anchor_id: Option<ElementId>,
    fast_path_ran: bool,
    fast_candidates: Vec<&'a Element>,
    fast_valid: Vec<&'a Element>,
    fallback_ran: bool,
    fallback_count: usize,
    matches: Vec<RankedMatch<'a>>,
}

impl<'a> FrameQueryEngine<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    pub fn find_by_fingerprint(&self, fingerprint: Fingerprint) -> Option<&'a Element> {
        self.snapshot.find_by_fingerprint(fingerprint)
    }

    /// Direct children of `parent_id`, filtered and sorted (id ascending by default).
    pub fn find_children(
        &self,
        parent_id: ElementId,
        filter: Option<&ElementFilter>,
        sort: Option<(SortKey, SortOrder)>,
    ) -> Vec<&'a Element> {
        let mut out: Vec<&'a Element> = self
            .snapshot
            .children(parent_id)
            .into_iter()
            .filter(|element| filter.is_none_or(|f| f.matches(element)))
            .collect();
        sort_elements(&mut out, sort);
        out
    }

    pub fn find_descendants(
        &self,
        parent_id: ElementId,
        filter: Option<&ElementFilter>,
        sort: Option<(SortKey, SortOrder)>,
    ) -> Vec<&'a Element> {
        let mut out = self.snapshot.descendants(parent_id, filter);
        sort_elements(&mut out, sort);
        out
    }

    /// Follows `offsets` down from the anchor and returns the final layer.
    /// With `validate`, only elements whose own derived ancestor and offset
    /// path agree with the request are kept.
    pub fn resolve_offset_path(
        &self,
        anchor_fingerprint: Fingerprint,
        offsets: &[ChildOffset],
        validate: bool,
    ) -> Vec<RankedMatch<'a>> {
        let Some(anchor) = self.find_by_fingerprint(anchor_fingerprint) else {
            return Vec::new();
        };
        let mut layer = self.follow_offsets(anchor, offsets);
        if validate {
            layer.retain(|element| {
                element.nearest_fingerprinted_ancestor_fingerprint == Some(anchor_fingerprint)
                    && element.offset_path_from_ancestor == offsets
            });
        }
        layer.sort_by_key(|element| element.id);
        layer
            .into_iter()
            .enumerate()
            .map(|(rank, element)| RankedMatch {
                element_id: element.id,
                score: FAST_PATH_BONUS,
                rank,
                reasons: vec![format!("{FAST_PATH_REASON} {FAST_PATH_BONUS:+}")],
                element,
            })
            .collect()
    }

    /// Main entry point: fast path, optional fallback search, scoring,
    /// ordering and selection. `anchor_fingerprint` takes precedence over the
    /// descriptor's own anchor.
    pub fn resolve(
        &self,
        anchor_fingerprint: Fingerprint,
        descriptor: &QueryDescriptor,
    ) -> Vec<RankedMatch<'a>> {
        self.run(anchor_fingerprint, descriptor).matches
    }

    /// Same work as [`Self::resolve`], returned together with the
    /// intermediate candidate sets.
    pub fn explain(
        &self,
        anchor_fingerprint: Fingerprint,
        descriptor: &QueryDescriptor,
    ) -> QueryExplanation<'a> {
        let resolution = self.run(anchor_fingerprint, descriptor);
        QueryExplanation {
            anchor_fingerprint,
            anchor_id: resolution.anchor_id,
            fast_path_ran: resolution.fast_path_ran,
            fast_path_candidate_ids: resolution.fast_candidates.iter().map(|e| e.id).collect(),
            fast_path_valid_ids: resolution.fast_valid.iter().map(|e| e.id).collect(),
            fallback_ran: resolution.fallback_ran,
            fallback_candidate_count: resolution.fallback_count,
            matches: resolution.matches,
        }
    }

    /// Resolves a named descriptor from `catalog`, following aliases, against
    /// the descriptor's own anchor fingerprint.
    pub fn resolve_named(&self, catalog: &FrameCatalog, name: &str) -> Vec<RankedMatch<'a>> {
        match catalog.descriptor(name) {
            Some(descriptor) => self.resolve(descriptor.anchor_fingerprint, descriptor),
            None => {
                debug!("no descriptor named {name}");
                Vec::new()
            }
        }
    }

    fn run(&self, anchor_fingerprint: Fingerprint, descriptor: &QueryDescriptor) -> Resolution<'a> {
        let mut resolution = Resolution {
            anchor_id: None,
            fast_path_ran: false,
            fast_candidates: Vec::new(),
            fast_valid: Vec::new(),
            fallback_ran: false,
            fallback_count: 0,
            matches: Vec::new(),
        };
        let Some(anchor) = self.find_by_fingerprint(anchor_fingerprint) else {
            debug!("anchor {anchor_fingerprint:#x} not in snapshot");
            return resolution;
        };
        resolution.anchor_id = Some(anchor.id);
        let constraints = Constraints::new(descriptor, anchor.id);

        if let Some(offsets) = descriptor.offset_path.as_deref() {
            resolution.fast_path_ran = true;
            resolution.fast_candidates = self.follow_offsets(anchor, offsets);
            resolution.fast_valid = resolution
                .fast_candidates
                .iter()
                .copied()
                .filter(|element| constraints.admits(self.snapshot, element))
                .collect();
        }

        let fast_failed = resolution.fast_valid.is_empty();
        let suppressed =
            fast_failed && resolution.fast_path_ran && descriptor.require_fast_path_match;
        let broaden = !fast_failed && descriptor.selection_mode == SelectionMode::All;
        let mut fallback: Vec<&'a Element> = Vec::new();
        if descriptor.fallback_to_search && !suppressed && (fast_failed || broaden) {
            resolution.fallback_ran = true;
            fallback = self
                .scope_candidates(anchor, descriptor.search_scope)
                .into_iter()
                .filter(|element| constraints.admits(self.snapshot, element))
                .collect();
            resolution.fallback_count = fallback.len();
        }

        let mut merged: BTreeMap<ElementId, (&'a Element, bool)> = BTreeMap::new();
        for element in &resolution.fast_valid {
            merged.insert(element.id, (*element, true));
        }
        for element in fallback {
            merged.entry(element.id).or_insert((element, false));
        }

        let sorted_ranks = descriptor
            .sort_by
            .filter(|_| descriptor.expected_rank_in_sorted.is_some())
            .map(|key| {
                let mut ordered: Vec<&Element> = merged.values().map(|(e, _)| *e).collect();
                sort_elements(&mut ordered, Some((key, descriptor.sort_order)));
                ordered
                    .into_iter()
                    .enumerate()
                    .map(|(rank, element)| (element.id, rank))
                    .collect::<HashMap<ElementId, usize>>()
            })
            .unwrap_or_default();

        let mut scored: Vec<RankedMatch<'a>> = merged
            .into_values()
            .map(|(element, via_fast_path)| {
                let placement = Placement {
                    via_fast_path,
                    depth_from_anchor: distance_below(self.snapshot, anchor.id, element),
                    sorted_rank: sorted_ranks.get(&element.id).copied(),
                };
                let card = score_candidate(descriptor, element, placement);
                RankedMatch {
                    element_id: element.id,
                    score: card.total,
                    rank: 0,
                    reasons: card.reasons,
                    element,
                }
            })
            .collect();

        let sort = descriptor.sort_by.map(|key| (key, descriptor.sort_order));
        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| match sort {
                    Some((key, order)) => compare_by(key, order, a.element, b.element),
                    None => Ordering::Equal,
                })
                .then_with(|| a.element_id.cmp(&b.element_id))
        });
        for (rank, matched) in scored.iter_mut().enumerate() {
            matched.rank = rank;
        }

        debug!(
            "resolved anchor {anchor_fingerprint:#x}: fast {}/{}, fallback {} ({}), {} ranked",
            resolution.fast_valid.len(),
            resolution.fast_candidates.len(),
            resolution.fallback_ran,
            resolution.fallback_count,
            scored.len()
        );
        resolution.matches = select(scored, descriptor);
        resolution
    }

    /// Layer-by-layer descent: every child of the current layer whose
    /// offset equals the next step joins the next layer.
    fn follow_offsets(&self, anchor: &'a Element, offsets: &[ChildOffset]) -> Vec<&'a Element> {
        let mut layer = vec![anchor];
        for offset in offsets {
            let mut seen = HashSet::new();
            let next: Vec<&'a Element> = layer
                .iter()
                .flat_map(|parent| self.snapshot.children(parent.id))
                .filter(|child| child.child_offset_id == *offset && seen.insert(child.id))
                .collect();
            if next.is_empty() {
                return Vec::new();
            }
            layer = next;
        }
        layer
    }

    fn scope_candidates(&self, anchor: &'a Element, scope: SearchScope) -> Vec<&'a Element> {
        match scope {
            SearchScope::DirectChildren => self.snapshot.children(anchor.id),
            SearchScope::Descendants => self.snapshot.descendants(anchor.id, None),
        }
    }
}

fn select<'a>(ranked: Vec<RankedMatch<'a>>, descriptor: &QueryDescriptor) -> Vec<RankedMatch<'a>> {
    match descriptor.selection_mode {
        SelectionMode::All => ranked,
        SelectionMode::First => ranked.into_iter().take(1).collect(),
        SelectionMode::Nth => match descriptor.nth_index {
            Some(index) => ranked.into_iter().nth(index).into_iter().collect(),
            None => Vec::new(),
        },
    }
}

fn sort_elements(elements: &mut [&Element], sort: Option<(SortKey, SortOrder)>) {
    let (key, order) = sort.unwrap_or_default();
    elements.sort_by(|a, b| compare_by(key, order, a, b).then_with(|| a.id.cmp(&b.id)));
}

/// Compares on one sort key, honouring `order`. Ties are left to the caller.
fn compare_by(key: SortKey, order: SortOrder, a: &Element, b: &Element) -> Ordering {
    let screen = |e: &Element| e.geometry.on_screen;
    let ordering = match key {
        SortKey::Top => screen(a).top.total_cmp(&screen(b).top),
        SortKey::Left => screen(a).left.total_cmp(&screen(b).left),
        SortKey::Right => screen(a).right.total_cmp(&screen(b).right),
        SortKey::Bottom => screen(a).bottom.total_cmp(&screen(b).bottom),
        SortKey::Area => a.area_on_screen().total_cmp(&b.area_on_screen()),
        SortKey::SiblingRankX => a.sibling_rank_x.cmp(&b.sibling_rank_x),
        SortKey::SiblingRankY => a.sibling_rank_y.cmp(&b.sibling_rank_y),
        SortKey::Id => a.id.cmp(&b.id),
    };
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHost;
    use crate::snapshot::AttrMatch;
    use crate::snapshot::ElementAttr;
    use crate::snapshot::build_snapshot;
    use crate::snapshot::test_support::at;
    use crate::snapshot::test_support::attrs;
    use crate::snapshot::test_support::sample_host;
    use pretty_assertions::assert_eq;

    fn ids(matches: &[RankedMatch<'_>]) -> Vec<ElementId> {
        matches.iter().map(|m| m.element_id).collect()
    }

    fn element_ids(elements: &[&Element]) -> Vec<ElementId> {
        elements.iter().map(|e| e.id).collect()
    }

    #[test]
    fn children_and_descendants_sort_and_filter() {
        let snapshot = build_snapshot(&sample_host());
        let engine = FrameQueryEngine::new(&snapshot);
        assert_eq!(element_ids(&engine.find_children(1, None, None)), vec![2, 3]);
        assert_eq!(
            element_ids(&engine.find_children(1, None, Some((SortKey::Left, SortOrder::Desc)))),
            vec![3, 2]
        );
        let deep = ElementFilter::from(AttrMatch::new().with(ElementAttr::Depth, 2));
        assert_eq!(
            element_ids(&engine.find_descendants(
                1,
                Some(&deep),
                Some((SortKey::Top, SortOrder::Asc))
            )),
            vec![6, 4, 5]
        );
        assert!(engine.find_children(404, None, None).is_empty());
    }

    #[test]
    fn offset_path_resolution_and_validation() {
        let snapshot = build_snapshot(&sample_host());
        let engine = FrameQueryEngine::new(&snapshot);
        let found = engine.resolve_offset_path(100, &[0, 1], true);
        assert_eq!(ids(&found), vec![5]);
        assert_eq!(found[0].score, 100);
        assert_eq!(found[0].reasons, vec!["fast_path +100"]);

        // Passes through fingerprinted row 3, so its derived path disagrees.
        assert_eq!(ids(&engine.resolve_offset_path(100, &[1, 0], false)), vec![6]);
        assert!(engine.resolve_offset_path(100, &[1, 0], true).is_empty());
        assert!(engine.resolve_offset_path(100, &[5], false).is_empty());
        assert!(engine.resolve_offset_path(999, &[0], false).is_empty());
    }

    #[test]
    fn shared_offsets_branch_the_fast_path() {
        let mut host = StaticHost::default();
        host.insert(1, attrs(0, 50, 0));
        host.insert(2, attrs(1, 0, 3));
        host.insert(3, attrs(1, 0, 3));
        host.insert(4, attrs(2, 0, 1));
        host.insert(5, attrs(3, 0, 1));
        host.insert(6, attrs(3, 0, 2));
        let snapshot = build_snapshot(&host);
        let engine = FrameQueryEngine::new(&snapshot);
        assert_eq!(ids(&engine.resolve_offset_path(50, &[3, 1], true)), vec![4, 5]);
    }

    #[test]
    fn first_mode_with_fast_path_skips_fallback() {
        let snapshot = build_snapshot(&sample_host());
        let engine = FrameQueryEngine::new(&snapshot);
        let descriptor = QueryDescriptor::anchored(100).with_offset_path([0, 1]).first();
        let explanation = engine.explain(100, &descriptor);
        assert_eq!(explanation.anchor_id, Some(1));
        assert_eq!(explanation.fast_path_candidate_ids, vec![5]);
        assert_eq!(explanation.fast_path_valid_ids, vec![5]);
        assert!(!explanation.fallback_ran);
        assert_eq!(ids(&explanation.matches), vec![5]);
        assert_eq!(explanation.matches[0].score, 110);
    }

    #[test]
    fn all_mode_broadens_after_fast_path() {
        let snapshot = build_snapshot(&sample_host());
        let engine = FrameQueryEngine::new(&snapshot);
        let descriptor = QueryDescriptor::anchored(100)
            .with_offset_path([0, 1])
            .with_scope(SearchScope::DirectChildren);
        let explanation = engine.explain(100, &descriptor);
        assert!(explanation.fallback_ran);
        assert_eq!(explanation.fallback_candidate_count, 2);
        // The fast-path hit is not a direct child, so the scope filter drops it.
        assert!(explanation.fast_path_valid_ids.is_empty());
        assert_eq!(ids(&explanation.matches), vec![2, 3]);

        let broad = QueryDescriptor::anchored(100).with_offset_path([0, 1]);
        let matches = engine.resolve(100, &broad);
        assert_eq!(matches[0].element_id, 5);
        assert_eq!(matches[0].score, 110);
        assert_eq!(ids(&matches[1..]), vec![2, 3, 4, 6, 7]);
        assert_eq!(
            matches.iter().map(|m| m.rank).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn required_fast_path_suppresses_fallback() {
        let snapshot = build_snapshot(&sample_host());
        let engine = FrameQueryEngine::new(&snapshot);
        let strict = QueryDescriptor::anchored(100)
            .with_offset_path([7, 7])
            .require_fast_path();
        assert!(strict.fallback_to_search);
        assert!(engine.resolve(100, &strict).is_empty());
        assert!(!engine.explain(100, &strict).fallback_ran);

        let lenient = QueryDescriptor::anchored(100).with_offset_path([7, 7]);
        assert_eq!(engine.resolve(100, &lenient).len(), 6);
        assert!(engine.resolve(100, &lenient.without_fallback()).is_empty());
    }

    #[test]
    fn unknown_anchor_yields_nothing() {
        let snapshot = build_snapshot(&sample_host());
        let engine = FrameQueryEngine::new(&snapshot);
        let explanation = engine.explain(0xdead, &QueryDescriptor::default());
        assert_eq!(explanation.anchor_id, None);
        assert!(explanation.matches.is_empty());
        assert!(engine.resolve(0, &QueryDescriptor::default()).is_empty());
    }

    #[test]
    fn identical_candidates_tie_break_by_id() {
        let mut host = StaticHost::default();
        host.insert(1, attrs(0, 10, 0));
        host.insert(8, at(attrs(1, 0, 0), 5.0, 5.0));
        host.insert(5, at(attrs(1, 0, 0), 5.0, 5.0));
        let snapshot = build_snapshot(&host);
        let engine = FrameQueryEngine::new(&snapshot);
        let descriptor = QueryDescriptor::anchored(10).sorted_by(SortKey::Left, SortOrder::Asc);
        for _ in 0..3 {
            let matches = engine.resolve(10, &descriptor);
            assert_eq!(ids(&matches), vec![5, 8]);
            assert_eq!(matches[0].score, matches[1].score);
        }
    }

    #[test]
    fn sort_key_orders_equal_scores() {
        let snapshot = build_snapshot(&sample_host());
        let engine = FrameQueryEngine::new(&snapshot);
        let descriptor = QueryDescriptor::anchored(300).sorted_by(SortKey::Top, SortOrder::Desc);
        assert_eq!(ids(&engine.resolve(300, &descriptor)), vec![7, 6]);

        let hinted = QueryDescriptor {
            expected_rank_in_sorted: Some(1),
            ..descriptor
        };
        let matches = engine.resolve(300, &hinted);
        assert_eq!(ids(&matches), vec![6, 7]);
        assert_eq!(matches[0].score - matches[1].score, 17);
    }

    fn ranked<'a>(elements: &[&'a Element], scores: &[i32]) -> Vec<RankedMatch<'a>> {
        scores
            .iter()
            .zip(elements)
            .enumerate()
            .map(|(rank, (score, element))| RankedMatch {
                element_id: element.id,
                score: *score,
                rank,
                reasons: Vec::new(),
                element: *element,
            })
            .collect()
    }

    #[test]
    fn selection_modes_trim_ranked_list() {
        let snapshot = build_snapshot(&sample_host());
        let elements: Vec<&Element> = snapshot.elements().take(5).collect();
        let scores = [50, 40, 30, 20, 10];

        let first = select(ranked(&elements, &scores), &QueryDescriptor::default().first());
        assert_eq!(first.len(), 1);
        assert_eq!((first[0].rank, first[0].score), (0, 50));

        let nth = select(ranked(&elements, &scores), &QueryDescriptor::default().nth(2));
        assert_eq!(nth.len(), 1);
        assert_eq!((nth[0].rank, nth[0].score), (2, 30));

        assert!(select(ranked(&elements, &scores), &QueryDescriptor::default().nth(9)).is_empty());
        let malformed = QueryDescriptor {
            selection_mode: SelectionMode::Nth,
            nth_index: None,
            ..Default::default()
        };
        assert!(select(ranked(&elements, &scores), &malformed).is_empty());
        assert_eq!(
            select(ranked(&elements, &scores), &QueryDescriptor::default()).len(),
            5
        );
    }
}
