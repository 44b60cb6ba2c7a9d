use crate::frame_cmd::OutputFormat;
use anyhow::Result;
use framescope_frame_tree::Diagnostic;
use framescope_frame_tree::Element;
use framescope_frame_tree::FrameCatalog;
use framescope_frame_tree::QueryExplanation;
use framescope_frame_tree::RankedMatch;
use framescope_frame_tree::Snapshot;
use framescope_frame_tree::snapshot::SnapshotSummary;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Serialize)]
struct BuildReport<'a> {
    summary: SnapshotSummary,
    diagnostics: &'a [Diagnostic],
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<&'a [Diagnostic]>,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn build_report(
    format: OutputFormat,
    snapshot: &Snapshot,
    validation: Option<&[Diagnostic]>,
) -> Result<()> {
    let summary = snapshot.summary();
    if format == OutputFormat::Json {
        return print_json(&BuildReport {
            summary,
            diagnostics: snapshot.diagnostics(),
            validation,
        });
    }

    println!("elements: {}", summary.element_count);
    println!("fingerprinted: {}", summary.fingerprinted);
    let roots: Vec<String> = summary.root_ids.iter().map(u64::to_string).collect();
    match summary.primary_root_id {
        Some(primary) => println!("roots: {} (primary {primary})", roots.join(", ")),
        None => println!("roots: none"),
    }
    println!("built: {}", summary.build_timestamp);
    print_diagnostics("diagnostics", snapshot.diagnostics());
    if let Some(findings) = validation {
        print_diagnostics("validation", findings);
    }
    Ok(())
}

fn print_diagnostics(title: &str, diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        println!("{title}: none");
        return;
    }
    println!("{title}:");
    for diag in diagnostics {
        let mut line = format!("  {} {}", diag.severity, diag.kind);
        if let Some(id) = diag.element_id {
            let _ = write!(line, " [{id}]");
        }
        let _ = write!(line, ": {}", diag.message);
        println!("{line}");
    }
}

fn describe(catalog: &FrameCatalog, element: &Element) -> String {
    let mut line = format!(
        "{} off={} type={}",
        element.id, element.child_offset_id, element.type_id
    );
    let fingerprint = element.effective_fingerprint();
    if fingerprint != 0 {
        let _ = write!(line, " fp={fingerprint:#x}");
        if let Some(name) = catalog.display_name(fingerprint) {
            let _ = write!(line, " \"{name}\"");
        }
    }
    if !element.is_visible {
        line.push_str(" hidden");
    }
    if !element.is_created {
        line.push_str(" uncreated");
    }
    line
}

pub(crate) fn tree(format: OutputFormat, catalog: &FrameCatalog, elements: &[&Element]) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(elements);
    }
    for element in elements {
        let depth = element.depth.unwrap_or(0) as usize;
        println!("{}{}", "  ".repeat(depth), describe(catalog, element));
    }
    Ok(())
}

pub(crate) fn matches(
    format: OutputFormat,
    catalog: &FrameCatalog,
    matches: &[RankedMatch<'_>],
) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(matches);
    }
    if matches.is_empty() {
        println!("no matches");
        return Ok(());
    }
    for matched in matches {
        println!(
            "#{} score={} {} [{}]",
            matched.rank,
            matched.score,
            describe(catalog, matched.element),
            matched.reasons.join(", ")
        );
    }
    Ok(())
}

pub(crate) fn explanation(
    format: OutputFormat,
    catalog: &FrameCatalog,
    explanation: &QueryExplanation<'_>,
) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(explanation);
    }
    match explanation.anchor_id {
        Some(id) => println!("anchor: {:#x} -> {id}", explanation.anchor_fingerprint),
        None => println!("anchor: {:#x} not found", explanation.anchor_fingerprint),
    }
    if explanation.fast_path_ran {
        println!(
            "fast path: {:?} reached, {:?} valid",
            explanation.fast_path_candidate_ids, explanation.fast_path_valid_ids
        );
    } else {
        println!("fast path: not requested");
    }
    if explanation.fallback_ran {
        println!(
            "fallback: {} candidates",
            explanation.fallback_candidate_count
        );
    } else {
        println!("fallback: skipped");
    }
    matches(OutputFormat::Text, catalog, &explanation.matches)
}
