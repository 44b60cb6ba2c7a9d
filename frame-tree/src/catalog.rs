//! Human-authored lookup documents: fingerprint display names, named query
//! descriptors and legacy name aliases.
//!
//! Each document is a flat JSON object. Loading is lenient: an entry that
//! cannot be decoded is logged and skipped, the rest of the document is kept.

use crate::config::FrameScopeConfig;
use crate::error::FrameTreeError;
use crate::error::Result;
use crate::proto::Fingerprint;
use crate::proto::QueryDescriptor;
use serde_json::Map;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameCatalog {
    pub names: BTreeMap<Fingerprint, String>,
    pub descriptors: BTreeMap<String, QueryDescriptor>,
    pub aliases: BTreeMap<String, String>,
}

/// Outcome of decoding one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

impl FrameCatalog {
    /// Loads every document the config points at. Unset paths and missing
    /// files leave the matching table empty.
    pub fn load(config: &FrameScopeConfig) -> Result<Self> {
        let mut catalog = Self::default();
        if let Some(path) = &config.names_path {
            catalog.load_names(path)?;
        }
        if let Some(path) = &config.descriptors_path {
            catalog.load_descriptors(path)?;
        }
        if let Some(path) = &config.aliases_path {
            catalog.load_aliases(path)?;
        }
        Ok(catalog)
    }

    pub fn load_names(&mut self, path: &Path) -> Result<LoadReport> {
        let Some(object) = read_object(path)? else {
            return Ok(LoadReport::default());
        };
        let mut report = LoadReport::default();
        for (key, value) in object {
            match (parse_fingerprint(&key), value) {
                (Some(fingerprint), Value::String(name)) => {
                    self.names.insert(fingerprint, name);
                    report.loaded += 1;
                }
                (None, _) => skip(&mut report, path, &key, "key is not a fingerprint"),
                (_, _) => skip(&mut report, path, &key, "name is not a string"),
            }
        }
        log_report(path, report);
        Ok(report)
    }

    pub fn load_descriptors(&mut self, path: &Path) -> Result<LoadReport> {
        let Some(object) = read_object(path)? else {
            return Ok(LoadReport::default());
        };
        let mut report = LoadReport::default();
        for (key, value) in object {
            match serde_json::from_value::<QueryDescriptor>(value) {
                Ok(descriptor) => {
                    self.descriptors.insert(key, descriptor);
                    report.loaded += 1;
                }
                Err(err) => skip(&mut report, path, &key, &err.to_string()),
            }
        }
        log_report(path, report);
        Ok(report)
    }

    pub fn load_aliases(&mut self, path: &Path) -> Result<LoadReport> {
        let Some(object) = read_object(path)? else {
            return Ok(LoadReport::default());
        };
        let mut report = LoadReport::default();
        for (key, value) in object {
            match value {
                Value::String(target) => {
                    self.aliases.insert(key, target);
                    report.loaded += 1;
                }
                _ => skip(&mut report, path, &key, "alias target is not a string"),
            }
        }
        log_report(path, report);
        Ok(report)
    }

    pub fn save_names(&self, path: &Path) -> Result<()> {
        let object: Map<String, Value> = self
            .names
            .iter()
            .map(|(fingerprint, name)| (format!("{fingerprint:#x}"), Value::String(name.clone())))
            .collect();
        write_json_atomic(path, &Value::Object(object))
    }

    pub fn save_descriptors(&self, path: &Path) -> Result<()> {
        let value = serde_json::to_value(&self.descriptors)?;
        write_json_atomic(path, &value)
    }

    pub fn save_aliases(&self, path: &Path) -> Result<()> {
        let value = serde_json::to_value(&self.aliases)?;
        write_json_atomic(path, &value)
    }

    pub fn display_name(&self, fingerprint: Fingerprint) -> Option<&str> {
        self.names.get(&fingerprint).map(String::as_str)
    }

    /// Follows the alias chain from `name`. A chain that loops stops at the
    /// last name before the repeat.
    pub fn canonical_name<'c>(&'c self, name: &'c str) -> &'c str {
        let mut seen = HashSet::new();
        let mut current = name;
        seen.insert(current);
        while let Some(next) = self.aliases.get(current) {
            if !seen.insert(next.as_str()) {
                warn!("alias cycle through '{next}' while resolving '{name}'");
                break;
            }
            current = next.as_str();
        }
        current
    }

    pub fn descriptor(&self, name: &str) -> Option<&QueryDescriptor> {
        self.descriptors.get(self.canonical_name(name))
    }
}

fn parse_fingerprint(raw: &str) -> Option<Fingerprint> {
    let raw = raw.trim();
    let parsed = match raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
    {
        Some(hex) => Fingerprint::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    };
    parsed.filter(|fingerprint| *fingerprint != 0)
}

fn read_object(path: &Path) -> Result<Option<Map<String, Value>>> {
    if !path.exists() {
        debug!("catalog document {path:?} does not exist; using an empty table");
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(object) => Ok(Some(object)),
        other => Err(FrameTreeError::InvalidDocument {
            path: path.to_path_buf(),
            message: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn skip(report: &mut LoadReport, path: &Path, key: &str, why: &str) {
    warn!("skipping entry '{key}' in {path:?}: {why}");
    report.skipped += 1;
}

fn log_report(path: &Path, report: LoadReport) {
    info!(
        "loaded {} entries from {path:?} ({} skipped)",
        report.loaded, report.skipped
    );
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    let tmp_path = tmp_path_for(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("catalog"));
    name.push(".tmp");
    path.with_file_name(name)
}
