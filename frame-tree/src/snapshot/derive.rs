use crate::proto::ChildOffset;
use crate::proto::Diagnostic;
use crate::proto::DiagnosticKind;
use crate::proto::ElementId;
use crate::proto::ElementIndex;
use crate::proto::Fingerprint;
use crate::snapshot::Snapshot;
use crate::snapshot::model::Element;
use std::cmp::Ordering;
use std::collections::VecDeque;
use tracing::warn;

/// Fills every derived field on the snapshot's elements in place.
pub(crate) fn compute_derived_fields(snapshot: &mut Snapshot) {
    assign_sibling_ranks(snapshot);
    propagate_ancestry(snapshot);
}

fn assign_sibling_ranks(snapshot: &mut Snapshot) {
    let Snapshot {
        elements,
        children,
        detached_children,
        ..
    } = snapshot;
    for bucket in children.iter().chain(detached_children.values()) {
        let mut ordered = bucket.clone();
        ordered.sort_by(|a, b| compare_on(elements, *a, *b, |e| e.geometry.on_screen.left));
        for (rank, slot) in ordered.iter().enumerate() {
            if let Some(element) = elements.get_mut(*slot) {
                element.sibling_rank_x = Some(rank);
            }
        }
        ordered.sort_by(|a, b| compare_on(elements, *a, *b, |e| e.geometry.on_screen.top));
        for (rank, slot) in ordered.iter().enumerate() {
            if let Some(element) = elements.get_mut(*slot) {
                element.sibling_rank_y = Some(rank);
            }
        }
    }
}

fn compare_on(
    elements: &[Element],
    a: ElementIndex,
    b: ElementIndex,
    coord: impl Fn(&Element) -> f32,
) -> Ordering {
    match (elements.get(a), elements.get(b)) {
        (Some(a), Some(b)) => coord(a).total_cmp(&coord(b)).then(a.id.cmp(&b.id)),
        _ => a.cmp(&b),
    }
}

/// One node of the walk trail. Every queued item owns a step; following
/// `parent_step` yields the lineage it was reached through.
struct WalkStep {
    slot: ElementIndex,
    parent_step: Option<usize>,
}

struct Pending {
    step: usize,
    depth: u32,
    ancestor: Option<(ElementId, Fingerprint)>,
    path: Vec<ChildOffset>,
}

struct AncestryWalk {
    trail: Vec<WalkStep>,
    visited: Vec<bool>,
}

impl AncestryWalk {
    fn on_lineage(&self, step: usize) -> bool {
        let slot = self.trail[step].slot;
        let mut cursor = self.trail[step].parent_step;
        while let Some(idx) = cursor {
            if self.trail[idx].slot == slot {
                return true;
            }
            cursor = self.trail[idx].parent_step;
        }
        false
    }

    fn run(&mut self, snapshot: &mut Snapshot, root: ElementIndex) {
        let Some(root_id) = snapshot.elements.get(root).map(|e| e.id) else {
            return;
        };
        let mut queue = VecDeque::new();
        self.trail.push(WalkStep {
            slot: root,
            parent_step: None,
        });
        queue.push_back(Pending {
            step: self.trail.len() - 1,
            depth: 0,
            ancestor: None,
            path: Vec::new(),
        });

        while let Some(item) = queue.pop_front() {
            let slot = self.trail[item.step].slot;
            if self.on_lineage(item.step) {
                let parent = self.trail[item.step]
                    .parent_step
                    .and_then(|idx| snapshot.elements.get(self.trail[idx].slot))
                    .map(|e| e.id);
                if let Some(element) = snapshot.elements.get(slot) {
                    let id = element.id;
                    warn!("cycle detected at element {id}; dropping branch");
                    let mut diag = Diagnostic::new(
                        DiagnosticKind::CycleDetected,
                        Some(id),
                        format!("element {id} is its own ancestor"),
                    );
                    if let Some(parent) = parent {
                        diag = diag.with_related(parent);
                    }
                    snapshot.diagnostics.push(diag);
                }
                continue;
            }
            if self.visited[slot] {
                continue;
            }
            self.visited[slot] = true;

            let Some(element) = snapshot.elements.get_mut(slot) else {
                continue;
            };
            element.depth = Some(item.depth);
            element.root_id = Some(root_id);
            let fingerprint = element.effective_fingerprint();
            let (ancestor, child_path) = if fingerprint != 0 {
                element.offset_path_from_ancestor = Vec::new();
                (Some((element.id, fingerprint)), Vec::new())
            } else if item.ancestor.is_some() {
                let mut path = item.path;
                path.push(element.child_offset_id);
                element.offset_path_from_ancestor = path.clone();
                (item.ancestor, path)
            } else {
                element.offset_path_from_ancestor = Vec::new();
                (None, Vec::new())
            };
            element.nearest_fingerprinted_ancestor_id = ancestor.map(|(id, _)| id);
            element.nearest_fingerprinted_ancestor_fingerprint = ancestor.map(|(_, fp)| fp);

            for child in snapshot.children.get(slot).into_iter().flatten() {
                self.trail.push(WalkStep {
                    slot: *child,
                    parent_step: Some(item.step),
                });
                queue.push_back(Pending {
                    step: self.trail.len() - 1,
                    depth: item.depth + 1,
                    ancestor,
                    path: child_path.clone(),
                });
            }
        }
    }
}

fn propagate_ancestry(snapshot: &mut Snapshot) {
    let mut walk = AncestryWalk {
        trail: Vec::new(),
        visited: vec![false; snapshot.elements.len()],
    };
    let roots: Vec<ElementIndex> = snapshot
        .root_ids
        .iter()
        .filter_map(|id| snapshot.slot_of(*id))
        .collect();
    for root in roots {
        walk.run(snapshot, root);
    }

    let mut stranded: Vec<(ElementId, ElementIndex)> = snapshot
        .elements
        .iter()
        .enumerate()
        .filter(|(slot, _)| !walk.visited[*slot])
        .map(|(slot, element)| (element.id, slot))
        .collect();
    stranded.sort_unstable();
    for (id, slot) in stranded {
        // An earlier pseudo-root may already have reached this one.
        if walk.visited[slot] {
            continue;
        }
        warn!("element {id} is unreachable from every root; walking it as a pseudo-root");
        snapshot.diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnreachableElement,
            Some(id),
            format!("element {id} is not reachable from any root"),
        ));
        walk.run(snapshot, slot);
    }
}

#[cfg(test)]
mod tests {
    use crate::host::StaticHost;
    use crate::proto::DiagnosticKind;
    use crate::proto::ElementId;
    use crate::snapshot::Snapshot;
    use crate::snapshot::build_snapshot;
    use crate::snapshot::test_support::at;
    use crate::snapshot::test_support::attrs;
    use crate::snapshot::test_support::sample_host;
    use pretty_assertions::assert_eq;

    fn ranks(snapshot: &Snapshot, id: ElementId) -> (Option<usize>, Option<usize>) {
        let element = snapshot.get_element(id).unwrap();
        (element.sibling_rank_x, element.sibling_rank_y)
    }

    #[test]
    fn sibling_ranks_follow_screen_position() {
        let snapshot = build_snapshot(&sample_host());
        assert_eq!(ranks(&snapshot, 1), (Some(0), Some(0)));
        assert_eq!(ranks(&snapshot, 2), (Some(0), Some(1)));
        assert_eq!(ranks(&snapshot, 3), (Some(1), Some(0)));
        assert_eq!(ranks(&snapshot, 4), (Some(1), Some(0)));
        assert_eq!(ranks(&snapshot, 5), (Some(0), Some(1)));
    }

    #[test]
    fn equal_positions_rank_by_id() {
        let mut host = StaticHost::default();
        host.insert(1, attrs(0, 0, 0));
        host.insert(9, at(attrs(1, 0, 0), 5.0, 5.0));
        host.insert(4, at(attrs(1, 0, 1), 5.0, 5.0));
        let snapshot = build_snapshot(&host);
        assert_eq!(ranks(&snapshot, 4), (Some(0), Some(0)));
        assert_eq!(ranks(&snapshot, 9), (Some(1), Some(1)));
    }

    #[test]
    fn offset_paths_restart_at_each_fingerprint() {
        let snapshot = build_snapshot(&sample_host());
        let derived: Vec<_> = (1..=7)
            .map(|id| {
                let e = snapshot.get_element(id).unwrap();
                (
                    id,
                    e.depth,
                    e.nearest_fingerprinted_ancestor_fingerprint,
                    e.offset_path_from_ancestor.clone(),
                )
            })
            .collect();
        assert_eq!(
            derived,
            vec![
                (1, Some(0), Some(100), vec![]),
                (2, Some(1), Some(100), vec![0]),
                (3, Some(1), Some(300), vec![]),
                (4, Some(2), Some(100), vec![0, 0]),
                (5, Some(2), Some(100), vec![0, 1]),
                (6, Some(2), Some(300), vec![0]),
                (7, Some(3), Some(300), vec![0, 2]),
            ]
        );
        assert!(snapshot.elements().all(|e| e.root_id == Some(1)));
        assert_eq!(
            snapshot.get_element(7).unwrap().nearest_fingerprinted_ancestor_id,
            Some(3)
        );
    }

    #[test]
    fn no_ancestor_means_empty_path() {
        let mut host = StaticHost::default();
        host.insert(1, attrs(0, 0, 0));
        host.insert(2, attrs(1, 0, 4));
        host.insert(3, attrs(2, 0, 1));
        let snapshot = build_snapshot(&host);
        let leaf = snapshot.get_element(3).unwrap();
        assert_eq!(leaf.depth, Some(2));
        assert_eq!(leaf.nearest_fingerprinted_ancestor_id, None);
        assert!(leaf.offset_path_from_ancestor.is_empty());
    }

    #[test]
    fn two_element_cycle_is_walked_once() {
        let mut host = StaticHost::default();
        host.insert(12, attrs(0, 0, 0));
        host.insert(10, attrs(11, 0, 0));
        host.insert(11, attrs(10, 0, 0));
        let snapshot = build_snapshot(&host);

        assert_eq!(snapshot.root_ids(), &[12]);
        let unreachable: Vec<_> = snapshot
            .diagnostics_of(DiagnosticKind::UnreachableElement)
            .map(|d| d.element_id)
            .collect();
        assert_eq!(unreachable, vec![Some(10)]);
        let cycle = snapshot
            .diagnostics_of(DiagnosticKind::CycleDetected)
            .next()
            .unwrap();
        assert_eq!(cycle.element_id, Some(10));
        assert_eq!(cycle.related_id, Some(11));

        assert_eq!(snapshot.get_element(10).unwrap().depth, Some(0));
        assert_eq!(snapshot.get_element(11).unwrap().depth, Some(1));
        assert_eq!(snapshot.get_element(11).unwrap().root_id, Some(10));
        assert!(snapshot.elements().all(|e| e.depth.is_some()));
    }
}
