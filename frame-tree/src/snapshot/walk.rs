use crate::proto::ElementId;
use crate::proto::ElementIndex;
use crate::snapshot::Snapshot;
use crate::snapshot::model::Element;
use serde::Deserialize;
use serde::Serialize;
use std::collections::VecDeque;
use strum_macros::Display;
use strum_macros::EnumString;

#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TraversalOrder {
    #[default]
    Dfs,
    Bfs,
}

/// Pre-order walk over the children index. Each element is yielded at most
/// once, so a corrupted index containing a cycle still terminates.
pub struct TreeIter<'a> {
    snapshot: &'a Snapshot,
    order: TraversalOrder,
    frontier: VecDeque<ElementIndex>,
    visited: Vec<bool>,
}

impl<'a> TreeIter<'a> {
    pub(crate) fn new(
        snapshot: &'a Snapshot,
        starts: Vec<ElementIndex>,
        order: TraversalOrder,
    ) -> Self {
        let mut frontier = VecDeque::with_capacity(starts.len());
        match order {
            TraversalOrder::Bfs => frontier.extend(starts),
            TraversalOrder::Dfs => frontier.extend(starts.into_iter().rev()),
        }
        Self {
            snapshot,
            order,
            frontier,
            visited: vec![false; snapshot.element_count()],
        }
    }
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let slot = match self.order {
                TraversalOrder::Bfs => self.frontier.pop_front()?,
                TraversalOrder::Dfs => self.frontier.pop_back()?,
            };
            if self.visited.get(slot).copied().unwrap_or(true) {
                continue;
            }
            self.visited[slot] = true;
            let children = self.snapshot.child_slots_at(slot);
            match self.order {
                TraversalOrder::Bfs => self.frontier.extend(children.iter().copied()),
                TraversalOrder::Dfs => self.frontier.extend(children.iter().rev().copied()),
            }
            return self.snapshot.element_at(slot);
        }
    }
}

/// Every slot strictly below `id`, breadth first. `id` need not be part of
/// the snapshot; its detached bucket seeds the walk then.
pub(crate) fn descendant_slots(snapshot: &Snapshot, id: ElementId) -> Vec<ElementIndex> {
    let mut visited = vec![false; snapshot.element_count()];
    if let Some(flag) = snapshot.slot_of(id).and_then(|start| visited.get_mut(start)) {
        *flag = true;
    }
    let mut queue: VecDeque<ElementIndex> = snapshot.child_slots(id).iter().copied().collect();
    let mut out = Vec::new();
    while let Some(slot) = queue.pop_front() {
        match visited.get_mut(slot) {
            Some(flag) if !*flag => *flag = true,
            _ => continue,
        }
        out.push(slot);
        queue.extend(snapshot.child_slots_at(slot).iter().copied());
    }
    out
}
