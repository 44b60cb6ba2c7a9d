use crate::error::FrameTreeError;
use crate::error::Result;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for snapshot refresh and the auxiliary documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameScopeConfig {
    /// Minimum age of a snapshot before the coordinator rebuilds it
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Run `Snapshot::validate` after every rebuild and log the findings
    #[serde(default)]
    pub validate_after_build: bool,

    /// Fingerprint to display-name document
    #[serde(default)]
    pub names_path: Option<PathBuf>,

    /// Named query descriptor document
    #[serde(default)]
    pub descriptors_path: Option<PathBuf>,

    /// Legacy alias document
    #[serde(default)]
    pub aliases_path: Option<PathBuf>,
}

fn default_refresh_interval_ms() -> u64 {
    250
}

impl Default for FrameScopeConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            validate_after_build: false,
            names_path: None,
            descriptors_path: None,
            aliases_path: None,
        }
    }
}

impl FrameScopeConfig {
    /// Reads a TOML file. Relative document paths are taken relative to the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&raw).map_err(|source| FrameTreeError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config
            .validate()
            .map_err(FrameTreeError::InvalidConfig)?;
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.refresh_interval_ms == 0 {
            return Err("refresh_interval_ms must be > 0".to_string());
        }
        for (field, path) in self.document_paths() {
            if path.is_some_and(|p| p.as_os_str().is_empty()) {
                return Err(format!("{field} must not be empty"));
            }
        }
        Ok(())
    }

    fn document_paths(&self) -> [(&'static str, Option<&PathBuf>); 3] {
        [
            ("names_path", self.names_path.as_ref()),
            ("descriptors_path", self.descriptors_path.as_ref()),
            ("aliases_path", self.aliases_path.as_ref()),
        ]
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.names_path,
            &mut self.descriptors_path,
            &mut self.aliases_path,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() && !path.as_os_str().is_empty() {
                *path = base.join(&*path);
            }
        }
    }
}
