use crate::host::HostAdapter;
use crate::proto::Diagnostic;
use crate::proto::DiagnosticKind;
use crate::proto::ElementId;
use crate::proto::ElementIndex;
use crate::snapshot::Snapshot;
use crate::snapshot::derive::compute_derived_fields;
use crate::snapshot::model::Element;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::debug;
use tracing::error;
use tracing::warn;

/// Pulls the flat handle list from a host and turns it into an indexed
/// [`Snapshot`]. A build never fails: unreadable elements are skipped and
/// every anomaly is recorded as a diagnostic on the result.
pub struct SnapshotBuilder<'a, H: HostAdapter + ?Sized> {
    host: &'a H,
    root_hint: Option<ElementId>,
}

impl<'a, H: HostAdapter + ?Sized> SnapshotBuilder<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self {
            host,
            root_hint: None,
        }
    }

    /// Overrides the host's own root hint.
    pub fn with_root_hint(mut self, root_hint: Option<ElementId>) -> Self {
        self.root_hint = root_hint;
        self
    }

    pub fn build(&self) -> Snapshot {
        let start = Instant::now();
        let mut diagnostics = Vec::new();
        let handles = match self.host.element_ids() {
            Ok(handles) => handles,
            Err(err) => {
                error!("frame snapshot enumeration failed: {err}");
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::EnumerationFailed,
                    None,
                    err.to_string(),
                ));
                Vec::new()
            }
        };

        let mut elements: Vec<Element> = Vec::with_capacity(handles.len());
        let mut slot_by_id: HashMap<ElementId, ElementIndex> = HashMap::with_capacity(handles.len());
        let mut parent_by_id = HashMap::with_capacity(handles.len());
        let mut fingerprint_to_id = HashMap::new();

        for id in handles {
            if slot_by_id.contains_key(&id) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateHandle,
                    Some(id),
                    format!("handle {id} enumerated more than once"),
                ));
                continue;
            }
            let attributes = match self.host.read_element(id) {
                Ok(attributes) => attributes,
                Err(err) => {
                    warn!("skipping element {id}: {err}");
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ElementReadFailed,
                        Some(id),
                        err.to_string(),
                    ));
                    continue;
                }
            };
            let element = Element::from_attributes(id, attributes);
            let fingerprint = element.effective_fingerprint();
            if fingerprint != 0 {
                match fingerprint_to_id.entry(fingerprint) {
                    Entry::Vacant(slot) => {
                        slot.insert(id);
                    }
                    Entry::Occupied(kept) => {
                        let kept = *kept.get();
                        warn!("fingerprint {fingerprint:#x} seen on {kept} and {id}; keeping {kept}");
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::DuplicateFingerprint,
                                Some(kept),
                                format!(
                                    "fingerprint {fingerprint:#x} already assigned to {kept}; rejected {id}"
                                ),
                            )
                            .with_related(id),
                        );
                    }
                }
            }
            parent_by_id.insert(id, element.parent_id);
            slot_by_id.insert(id, elements.len());
            elements.push(element);
        }

        // Parents may be enumerated after their children, so adjacency is
        // only wired once every slot is known.
        let mut children = vec![Vec::new(); elements.len()];
        let mut detached_children: BTreeMap<ElementId, Vec<ElementIndex>> = BTreeMap::new();
        let mut root_ids = Vec::new();
        for (slot, element) in elements.iter().enumerate() {
            match slot_by_id.get(&element.parent_id) {
                Some(parent_slot) if element.parent_id != 0 => children[*parent_slot].push(slot),
                _ => {
                    detached_children
                        .entry(element.parent_id)
                        .or_default()
                        .push(slot);
                    root_ids.push(element.id);
                }
            }
        }
        root_ids.sort_unstable();

        let in_snapshot = |hint: &ElementId| slot_by_id.contains_key(hint);
        let primary_root_id = self
            .root_hint
            .filter(in_snapshot)
            .or_else(|| self.host.root_hint().filter(in_snapshot))
            .or_else(|| root_ids.first().copied());

        let mut snapshot = Snapshot {
            elements,
            slot_by_id,
            children,
            detached_children,
            parent_by_id,
            fingerprint_to_id,
            root_ids,
            primary_root_id,
            build_timestamp: OffsetDateTime::now_utc(),
            diagnostics,
        };
        compute_derived_fields(&mut snapshot);

        debug!(
            "frame snapshot built: {} elements, {} roots, {} fingerprinted, {} diagnostics in {:?}",
            snapshot.element_count(),
            snapshot.root_ids.len(),
            snapshot.fingerprint_to_id.len(),
            snapshot.diagnostics.len(),
            start.elapsed()
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ElementAttributes;
    use crate::host::HostError;
    use crate::host::StaticHost;
    use crate::snapshot::build_snapshot;
    use crate::snapshot::test_support::attrs;
    use crate::snapshot::test_support::sample_host;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    struct FlakyHost {
        inner: StaticHost,
        broken: HashSet<ElementId>,
    }

    impl HostAdapter for FlakyHost {
        fn element_ids(&self) -> Result<Vec<ElementId>, HostError> {
            self.inner.element_ids()
        }

        fn read_element(&self, id: ElementId) -> Result<ElementAttributes, HostError> {
            if self.broken.contains(&id) {
                return Err(HostError::Read {
                    id,
                    message: "handle went stale".to_string(),
                });
            }
            self.inner.read_element(id)
        }
    }

    struct DeadHost;

    impl HostAdapter for DeadHost {
        fn element_ids(&self) -> Result<Vec<ElementId>, HostError> {
            Err(HostError::Unavailable("tree not mounted".to_string()))
        }

        fn read_element(&self, id: ElementId) -> Result<ElementAttributes, HostError> {
            Err(HostError::ElementGone(id))
        }
    }

    #[test]
    fn indices_are_built_from_the_flat_list() {
        let snapshot = build_snapshot(&sample_host());
        assert_eq!(snapshot.element_count(), 7);
        assert_eq!(snapshot.root_ids(), &[1]);
        assert_eq!(snapshot.primary_root_id(), Some(1));
        assert_eq!(snapshot.parent_of(7), Some(6));
        assert_eq!(snapshot.find_by_fingerprint(300).map(|e| e.id), Some(3));
        assert!(snapshot.diagnostics().is_empty());
    }

    #[test]
    fn unreadable_element_is_skipped_with_warning() {
        let host = FlakyHost {
            inner: sample_host(),
            broken: HashSet::from([5]),
        };
        let snapshot = build_snapshot(&host);
        assert_eq!(snapshot.element_count(), 6);
        assert!(snapshot.get_element(5).is_none());
        let diags: Vec<_> = snapshot
            .diagnostics_of(DiagnosticKind::ElementReadFailed)
            .collect();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].element_id, Some(5));
        assert_eq!(diags[0].severity, crate::proto::Severity::Warning);
        assert!(diags[0].message.contains("handle went stale"));
    }

    #[test]
    fn duplicate_fingerprint_keeps_first_seen() {
        let mut host = StaticHost::default();
        host.insert(10, attrs(0, 55, 0));
        host.insert(11, attrs(10, 55, 0));
        host.insert(12, attrs(10, 56, 1));
        let snapshot = build_snapshot(&host);
        assert_eq!(snapshot.find_by_fingerprint(55).map(|e| e.id), Some(10));
        let diag = snapshot
            .diagnostics_of(DiagnosticKind::DuplicateFingerprint)
            .next()
            .unwrap();
        assert_eq!(diag.element_id, Some(10));
        assert_eq!(diag.related_id, Some(11));
        assert_eq!(snapshot.fingerprint_to_id().len(), 2);
    }

    #[test]
    fn orphans_become_roots_and_hint_selects_primary() {
        let mut host = StaticHost::default();
        host.insert(20, attrs(0, 0, 0));
        host.insert(9, attrs(777, 0, 0));
        host.insert(21, attrs(20, 0, 0));
        host.set_root_hint(Some(20));
        let snapshot = build_snapshot(&host);
        assert_eq!(snapshot.root_ids(), &[9, 20]);
        assert_eq!(snapshot.primary_root_id(), Some(20));
        assert_eq!(snapshot.children(777).len(), 1);

        let overridden = SnapshotBuilder::new(&host)
            .with_root_hint(Some(21))
            .build();
        assert_eq!(overridden.primary_root_id(), Some(21));
    }

    #[test]
    fn unknown_builder_hint_falls_back_to_host_hint() {
        let mut host = StaticHost::default();
        host.insert(20, attrs(0, 0, 0));
        host.insert(9, attrs(777, 0, 0));
        host.set_root_hint(Some(20));
        let snapshot = SnapshotBuilder::new(&host)
            .with_root_hint(Some(4040))
            .build();
        assert_eq!(snapshot.primary_root_id(), Some(20));

        host.set_root_hint(Some(5050));
        let snapshot = SnapshotBuilder::new(&host)
            .with_root_hint(Some(4040))
            .build();
        assert_eq!(snapshot.primary_root_id(), Some(9));
    }

    #[test]
    fn repeated_handles_are_read_once() {
        let host = StaticHost::from_dump(crate::host::HostDump {
            handles: Some(vec![1, 1]),
            elements: vec![crate::host::DumpedElement {
                id: 1,
                attributes: attrs(0, 0, 0),
            }],
            ..Default::default()
        });
        let snapshot = build_snapshot(&host);
        assert_eq!(snapshot.element_count(), 1);
        assert_eq!(
            snapshot.diagnostics_of(DiagnosticKind::DuplicateHandle).count(),
            1
        );
    }

    #[test]
    fn failed_enumeration_yields_empty_snapshot() {
        let snapshot = build_snapshot(&DeadHost);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.primary_root_id(), None);
        assert!(snapshot.has_errors());
    }
}
