mod builder;
mod derive;
pub mod filter;
pub mod model;
mod walk;

pub use builder::SnapshotBuilder;
pub use filter::AttrMatch;
pub use filter::ElementAttr;
pub use filter::ElementFilter;
pub use model::Element;
pub use model::Geometry;
pub use model::Rect;
pub use model::RelationRecord;
pub use walk::TraversalOrder;
pub use walk::TreeIter;

use crate::host::HostAdapter;
use crate::proto::Diagnostic;
use crate::proto::DiagnosticKind;
use crate::proto::ElementId;
use crate::proto::ElementIndex;
use crate::proto::Fingerprint;
use crate::proto::Severity;
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::collections::HashMap;
use time::OffsetDateTime;
use walk::descendant_slots;

/// Builds a snapshot from the host's current state, honouring the host's root hint.
pub fn build_snapshot<H: HostAdapter + ?Sized>(host: &H) -> Snapshot {
    SnapshotBuilder::new(host).build()
}

/// Frozen capture of the host tree at one instant.
///
/// Elements live in a dense arena; host handles map to arena slots through a
/// side table. Children of parents that are not part of the snapshot (parent
/// id 0 included) are kept in separate buckets keyed by the missing parent id.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) elements: Vec<Element>,
    pub(crate) slot_by_id: HashMap<ElementId, ElementIndex>,
    pub(crate) children: Vec<Vec<ElementIndex>>,
    pub(crate) detached_children: BTreeMap<ElementId, Vec<ElementIndex>>,
    pub(crate) parent_by_id: HashMap<ElementId, ElementId>,
    pub(crate) fingerprint_to_id: HashMap<Fingerprint, ElementId>,
    pub(crate) root_ids: Vec<ElementId>,
    pub(crate) primary_root_id: Option<ElementId>,
    pub(crate) build_timestamp: OffsetDateTime,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SnapshotSummary {
    pub element_count: usize,
    pub fingerprinted: usize,
    pub root_ids: Vec<ElementId>,
    pub primary_root_id: Option<ElementId>,
    pub build_timestamp: OffsetDateTime,
    pub errors: usize,
    pub warnings: usize,
}

impl Snapshot {
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn build_timestamp(&self) -> OffsetDateTime {
        self.build_timestamp
    }

    pub fn root_ids(&self) -> &[ElementId] {
        &self.root_ids
    }

    pub fn primary_root_id(&self) -> Option<ElementId> {
        self.primary_root_id
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn diagnostics_with(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |diag| diag.severity == severity)
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |diag| diag.kind == kind)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics_with(Severity::Error).next().is_some()
    }

    pub fn fingerprint_to_id(&self) -> &HashMap<Fingerprint, ElementId> {
        &self.fingerprint_to_id
    }

    pub fn parent_of(&self, id: ElementId) -> Option<ElementId> {
        self.parent_by_id.get(&id).copied()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.slot_by_id.contains_key(&id)
    }

    pub fn get_element(&self, id: ElementId) -> Option<&Element> {
        self.slot_of(id).and_then(|slot| self.element_at(slot))
    }

    pub fn find_by_fingerprint(&self, fingerprint: Fingerprint) -> Option<&Element> {
        if fingerprint == 0 {
            return None;
        }
        self.fingerprint_to_id
            .get(&fingerprint)
            .and_then(|id| self.get_element(*id))
    }

    /// Elements in arena (host enumeration) order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Direct children in host enumeration order. Works for parent ids that
    /// are absent from the snapshot, including 0.
    pub fn children(&self, id: ElementId) -> Vec<&Element> {
        self.child_slots(id)
            .iter()
            .filter_map(|slot| self.element_at(*slot))
            .collect()
    }

    pub fn child_count(&self, id: ElementId) -> usize {
        self.child_slots(id).len()
    }

    /// Every element strictly below `id`, breadth first, optionally filtered.
    /// Like [`Self::children`], accepts parent ids absent from the snapshot.
    pub fn descendants(&self, id: ElementId, filter: Option<&ElementFilter>) -> Vec<&Element> {
        descendant_slots(self, id)
            .into_iter()
            .filter_map(|slot| self.element_at(slot))
            .filter(|element| filter.is_none_or(|f| f.matches(element)))
            .collect()
    }

    /// Walks from `root`, or from every root when `None`.
    pub fn iter_tree(&self, root: Option<ElementId>, order: TraversalOrder) -> TreeIter<'_> {
        let starts = match root {
            Some(id) => self.slot_of(id).into_iter().collect(),
            None => self
                .root_ids
                .iter()
                .filter_map(|id| self.slot_of(*id))
                .collect(),
        };
        TreeIter::new(self, starts, order)
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            element_count: self.element_count(),
            fingerprinted: self.fingerprint_to_id.len(),
            root_ids: self.root_ids.clone(),
            primary_root_id: self.primary_root_id,
            build_timestamp: self.build_timestamp,
            errors: self.diagnostics_with(Severity::Error).count(),
            warnings: self.diagnostics_with(Severity::Warning).count(),
        }
    }

    /// Re-walks the parent and children indices and reports every
    /// inconsistency. Never mutates the snapshot.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (slot, element) in self.elements.iter().enumerate() {
            let id = element.id;
            match self.parent_by_id.get(&id) {
                None => out.push(Diagnostic::new(
                    DiagnosticKind::ParentIndexMissingNode,
                    Some(id),
                    format!("element {id} is missing from the parent index"),
                )),
                Some(recorded) if *recorded != element.parent_id => out.push(
                    Diagnostic::new(
                        DiagnosticKind::ParentChildMismatch,
                        Some(id),
                        format!(
                            "parent index records {recorded} for element {id}, element reports {}",
                            element.parent_id
                        ),
                    )
                    .with_related(*recorded),
                ),
                Some(_) => {}
            }

            if element.parent_id == 0 {
                continue;
            }
            let bucket = self.child_slots(element.parent_id);
            match bucket.iter().filter(|child| **child == slot).count() {
                0 => out.push(
                    Diagnostic::new(
                        DiagnosticKind::ChildrenIndexMissingNode,
                        Some(id),
                        format!(
                            "element {id} is missing from the children of {}",
                            element.parent_id
                        ),
                    )
                    .with_related(element.parent_id),
                ),
                1 => {}
                n => out.push(
                    Diagnostic::new(
                        DiagnosticKind::ParentChildMismatch,
                        Some(id),
                        format!(
                            "element {id} is listed {n} times under {}",
                            element.parent_id
                        ),
                    )
                    .with_related(element.parent_id),
                ),
            }
        }

        let attached = self.children.iter().enumerate().filter_map(|(slot, bucket)| {
            self.element_at(slot).map(|parent| (parent.id, bucket))
        });
        let detached = self
            .detached_children
            .iter()
            .map(|(parent_id, bucket)| (*parent_id, bucket));
        for (parent_id, bucket) in attached.chain(detached) {
            for child_slot in bucket {
                match self.element_at(*child_slot) {
                    Some(child) if child.parent_id == parent_id => {}
                    Some(child) => out.push(
                        Diagnostic::new(
                            DiagnosticKind::ParentChildMismatch,
                            Some(child.id),
                            format!(
                                "element {} is listed under {parent_id} but reports parent {}",
                                child.id, child.parent_id
                            ),
                        )
                        .with_related(parent_id),
                    ),
                    None => out.push(Diagnostic::new(
                        DiagnosticKind::ParentChildMismatch,
                        None,
                        format!("children of {parent_id} reference unknown slot {child_slot}"),
                    )),
                }
            }
        }
        out
    }

    pub(crate) fn slot_of(&self, id: ElementId) -> Option<ElementIndex> {
        self.slot_by_id.get(&id).copied()
    }

    pub(crate) fn element_at(&self, slot: ElementIndex) -> Option<&Element> {
        self.elements.get(slot)
    }

    pub(crate) fn child_slots(&self, id: ElementId) -> &[ElementIndex] {
        match self.slot_of(id) {
            Some(slot) if id != 0 => self.child_slots_at(slot),
            _ => self
                .detached_children
                .get(&id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    pub(crate) fn child_slots_at(&self, slot: ElementIndex) -> &[ElementIndex] {
        self.children.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }
}
