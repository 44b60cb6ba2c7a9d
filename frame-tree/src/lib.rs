pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod proto;
pub mod query;
pub mod snapshot;

pub use catalog::FrameCatalog;
pub use catalog::LoadReport;
pub use config::FrameScopeConfig;
pub use coordinator::SnapshotCoordinator;
pub use error::FrameTreeError;
pub use error::Result;
pub use host::ElementAttributes;
pub use host::HostAdapter;
pub use host::HostDump;
pub use host::HostError;
pub use host::StaticHost;
pub use proto::Diagnostic;
pub use proto::DiagnosticKind;
pub use proto::QueryDescriptor;
pub use proto::QueryExplanation;
pub use proto::RankedMatch;
pub use proto::Severity;
pub use query::FrameQueryEngine;
pub use snapshot::Element;
pub use snapshot::ElementFilter;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotBuilder;
pub use snapshot::TraversalOrder;
pub use snapshot::build_snapshot;
