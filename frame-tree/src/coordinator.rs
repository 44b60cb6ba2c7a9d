use crate::config::FrameScopeConfig;
use crate::host::HostAdapter;
use crate::snapshot::Snapshot;
use crate::snapshot::SnapshotBuilder;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing::warn;

/// Owns the host and the snapshot currently handed out to readers.
///
/// Every rebuild produces a fresh [`Snapshot`]; readers holding the previous
/// `Arc` keep a consistent view until they drop it.
pub struct SnapshotCoordinator<H: HostAdapter> {
    host: H,
    config: FrameScopeConfig,
    current: Option<Arc<Snapshot>>,
    built_at: Option<Instant>,
    generation: u64,
}

impl<H: HostAdapter> SnapshotCoordinator<H> {
    pub fn new(host: H, config: FrameScopeConfig) -> Self {
        Self {
            host,
            config,
            current: None,
            built_at: None,
            generation: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &FrameScopeConfig {
        &self.config
    }

    /// Number of snapshots built so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last built snapshot, without triggering a rebuild.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.current.clone()
    }

    /// Returns the current snapshot, rebuilding first when none exists or it
    /// is older than the refresh interval.
    pub fn current(&mut self) -> Arc<Snapshot> {
        let fresh = self
            .built_at
            .is_some_and(|at| at.elapsed() < self.config.refresh_interval());
        if fresh && let Some(snapshot) = &self.current {
            return Arc::clone(snapshot);
        }
        self.rebuild()
    }

    pub fn rebuild(&mut self) -> Arc<Snapshot> {
        let snapshot = SnapshotBuilder::new(&self.host).build();
        if self.config.validate_after_build {
            for finding in snapshot.validate() {
                warn!("snapshot validation: {}: {}", finding.kind, finding.message);
            }
        }
        self.generation += 1;
        info!(
            "snapshot generation {} ready: {} elements, {} diagnostics",
            self.generation,
            snapshot.element_count(),
            snapshot.diagnostics().len()
        );
        let snapshot = Arc::new(snapshot);
        self.current = Some(Arc::clone(&snapshot));
        self.built_at = Some(Instant::now());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticHost;
    use crate::snapshot::test_support::attrs;
    use crate::snapshot::test_support::sample_host;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config(refresh_interval_ms: u64) -> FrameScopeConfig {
        FrameScopeConfig {
            refresh_interval_ms,
            validate_after_build: true,
            ..Default::default()
        }
    }

    #[test]
    fn current_reuses_fresh_snapshot() {
        let mut coordinator = SnapshotCoordinator::new(sample_host(), config(60_000));
        assert!(coordinator.latest().is_none());
        let first = coordinator.current();
        let second = coordinator.current();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(coordinator.generation(), 1);
    }

    #[test]
    fn rebuild_replaces_snapshot_wholesale() {
        let mut coordinator = SnapshotCoordinator::new(sample_host(), config(60_000));
        let before = coordinator.current();
        coordinator.host_mut().insert(8, attrs(7, 0, 0));
        let after = coordinator.rebuild();
        assert_eq!(before.element_count(), 7);
        assert_eq!(after.element_count(), 8);
        assert_eq!(coordinator.generation(), 2);
        assert!(Arc::ptr_eq(&after, &coordinator.current()));
    }

    #[test]
    fn stale_snapshot_is_rebuilt() {
        let mut coordinator = SnapshotCoordinator::new(StaticHost::default(), config(1));
        coordinator.current();
        std::thread::sleep(Duration::from_millis(5));
        coordinator.current();
        assert_eq!(coordinator.generation(), 2);
    }
}
