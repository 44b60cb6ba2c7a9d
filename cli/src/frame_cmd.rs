use crate::render;
use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use framescope_frame_tree::ElementFilter;
use framescope_frame_tree::FrameCatalog;
use framescope_frame_tree::FrameQueryEngine;
use framescope_frame_tree::FrameScopeConfig;
use framescope_frame_tree::QueryDescriptor;
use framescope_frame_tree::Severity;
use framescope_frame_tree::Snapshot;
use framescope_frame_tree::SnapshotCoordinator;
use framescope_frame_tree::StaticHost;
use framescope_frame_tree::TraversalOrder;
use framescope_frame_tree::proto::ChildOffset;
use framescope_frame_tree::proto::ElementId;
use framescope_frame_tree::proto::Fingerprint;
use framescope_frame_tree::snapshot::AttrMatch;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "framescope", about = "Snapshot and query a captured element tree")]
pub struct FrameCli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: FrameCommand,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum FrameCommand {
    /// Build a snapshot and print its summary and build diagnostics
    Build(DumpArgs),

    /// Re-check the snapshot indices; exits non-zero when errors are found
    Validate(DumpArgs),

    /// Print the element tree
    Tree(TreeArgs),

    /// Resolve a query descriptor against the snapshot
    Resolve(ResolveArgs),
}

#[derive(Debug, Parser)]
pub struct DumpArgs {
    /// JSON host dump to snapshot
    #[arg(value_name = "DUMP")]
    pub dump: PathBuf,
}

#[derive(Debug, Parser)]
pub struct TreeArgs {
    #[command(flatten)]
    pub dump: DumpArgs,

    /// Start from this element instead of every root
    #[arg(long, value_name = "ID", value_parser = parse_number)]
    pub root: Option<ElementId>,

    /// Traversal order (dfs or bfs)
    #[arg(long, default_value = "dfs")]
    pub order: TraversalOrder,

    /// Only print elements matching attr=value (repeatable)
    #[arg(long = "where", value_name = "ATTR=VALUE")]
    pub filters: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub dump: DumpArgs,

    /// Anchor fingerprint (decimal or 0x hex); defaults to the descriptor's
    #[arg(long, value_name = "FP", value_parser = parse_number)]
    pub anchor: Option<Fingerprint>,

    /// Comma-separated child offsets below the anchor
    #[arg(long, value_name = "OFFSETS", value_delimiter = ',')]
    pub offsets: Option<Vec<ChildOffset>>,

    /// JSON file holding a query descriptor
    #[arg(long, value_name = "PATH", conflicts_with = "named")]
    pub descriptor: Option<PathBuf>,

    /// Named descriptor from the configured catalog
    #[arg(long, value_name = "NAME")]
    pub named: Option<String>,

    /// Keep only the best match
    #[arg(long, conflicts_with = "nth")]
    pub first: bool,

    /// Keep only the match at this rank
    #[arg(long, value_name = "INDEX")]
    pub nth: Option<usize>,

    /// Do not fall back to a subtree search when the offset path fails
    #[arg(long)]
    pub require_fast_path: bool,

    /// Never run the subtree search
    #[arg(long)]
    pub no_fallback: bool,

    /// Print the intermediate candidate sets as well
    #[arg(long)]
    pub explain: bool,
}

impl ResolveArgs {
    fn has_overrides(&self) -> bool {
        self.anchor.is_some()
            || self.offsets.is_some()
            || self.first
            || self.nth.is_some()
            || self.require_fast_path
            || self.no_fallback
    }
}

struct Session {
    config: FrameScopeConfig,
    catalog: FrameCatalog,
    format: OutputFormat,
}

impl FrameCli {
    pub fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => FrameScopeConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => FrameScopeConfig::default(),
        };
        let catalog = FrameCatalog::load(&config).context("Failed to load catalog documents")?;
        let session = Session {
            config,
            catalog,
            format: self.format,
        };
        match self.command {
            FrameCommand::Build(args) => run_build(&session, &args),
            FrameCommand::Validate(args) => run_validate(&session, &args),
            FrameCommand::Tree(args) => run_tree(&session, &args),
            FrameCommand::Resolve(args) => run_resolve(&session, &args),
        }
    }
}

fn snapshot_from(session: &Session, dump: &Path) -> Result<Arc<Snapshot>> {
    let host = StaticHost::load(dump)
        .with_context(|| format!("Failed to read host dump {}", dump.display()))?;
    let mut coordinator = SnapshotCoordinator::new(host, session.config.clone());
    Ok(coordinator.current())
}

fn run_build(session: &Session, args: &DumpArgs) -> Result<()> {
    let snapshot = snapshot_from(session, &args.dump)?;
    let validation = session
        .config
        .validate_after_build
        .then(|| snapshot.validate());
    render::build_report(session.format, &snapshot, validation.as_deref())
}

fn run_validate(session: &Session, args: &DumpArgs) -> Result<()> {
    let snapshot = snapshot_from(session, &args.dump)?;
    let findings = snapshot.validate();
    render::build_report(session.format, &snapshot, Some(&findings))?;
    let build_errors = snapshot
        .diagnostics_with(Severity::Error)
        .count();
    let total = build_errors + findings.len();
    if total > 0 {
        bail!("snapshot has {total} error diagnostics");
    }
    Ok(())
}

fn run_tree(session: &Session, args: &TreeArgs) -> Result<()> {
    let snapshot = snapshot_from(session, &args.dump.dump)?;
    let filter = if args.filters.is_empty() {
        None
    } else {
        let attrs = AttrMatch::from_pairs(args.filters.iter().map(String::as_str))
            .context("Invalid --where filter")?;
        Some(ElementFilter::from(attrs))
    };
    let elements: Vec<_> = snapshot
        .iter_tree(args.root, args.order)
        .filter(|element| filter.as_ref().is_none_or(|f| f.matches(element)))
        .collect();
    render::tree(session.format, &session.catalog, &elements)
}

fn run_resolve(session: &Session, args: &ResolveArgs) -> Result<()> {
    let snapshot = snapshot_from(session, &args.dump.dump)?;
    let engine = FrameQueryEngine::new(&snapshot);

    if let Some(name) = &args.named
        && !args.explain
        && !args.has_overrides()
    {
        if session.catalog.descriptor(name).is_none() {
            bail!("no descriptor named '{name}'");
        }
        let matches = engine.resolve_named(&session.catalog, name);
        return render::matches(session.format, &session.catalog, &matches);
    }

    let descriptor = build_descriptor(session, args)?;
    let anchor = args.anchor.unwrap_or(descriptor.anchor_fingerprint);
    if anchor == 0 {
        bail!("an anchor fingerprint is required (--anchor or a descriptor with anchor_fingerprint)");
    }
    if args.explain {
        let explanation = engine.explain(anchor, &descriptor);
        render::explanation(session.format, &session.catalog, &explanation)
    } else {
        let matches = engine.resolve(anchor, &descriptor);
        render::matches(session.format, &session.catalog, &matches)
    }
}

fn build_descriptor(session: &Session, args: &ResolveArgs) -> Result<QueryDescriptor> {
    let mut descriptor = if let Some(name) = &args.named {
        match session.catalog.descriptor(name) {
            Some(descriptor) => descriptor.clone(),
            None => bail!("no descriptor named '{name}'"),
        }
    } else if let Some(path) = &args.descriptor {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read descriptor {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse descriptor {}", path.display()))?
    } else {
        QueryDescriptor::default()
    };

    if let Some(offsets) = &args.offsets {
        descriptor = descriptor.with_offset_path(offsets.clone());
    }
    if args.first {
        descriptor = descriptor.first();
    }
    if let Some(index) = args.nth {
        descriptor = descriptor.nth(index);
    }
    if args.require_fast_path {
        descriptor = descriptor.require_fast_path();
    }
    if args.no_fallback {
        descriptor = descriptor.without_fallback();
    }
    Ok(descriptor)
}

fn parse_number(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|err| format!("invalid number '{raw}': {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_number("0x1F"), Ok(31));
        assert_eq!(parse_number(" 42 "), Ok(42));
        assert!(parse_number("forty").is_err());
    }

    #[test]
    fn resolve_flags_shape_the_descriptor() {
        let cli = FrameCli::try_parse_from([
            "framescope",
            "resolve",
            "dump.json",
            "--anchor",
            "0x10",
            "--offsets",
            "1,0,3",
            "--nth",
            "2",
            "--no-fallback",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        let FrameCommand::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.anchor, Some(16));
        let session = Session {
            config: FrameScopeConfig::default(),
            catalog: FrameCatalog::default(),
            format: OutputFormat::Json,
        };
        let descriptor = build_descriptor(&session, &args).unwrap();
        assert_eq!(descriptor.offset_path, Some(vec![1, 0, 3]));
        assert_eq!(descriptor.nth_index, Some(2));
        assert!(!descriptor.fallback_to_search);
    }

    #[test]
    fn first_conflicts_with_nth() {
        let parsed = FrameCli::try_parse_from([
            "framescope",
            "resolve",
            "dump.json",
            "--first",
            "--nth",
            "1",
        ]);
        assert!(parsed.is_err());
    }
}
