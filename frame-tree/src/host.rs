//! Boundary to the environment that owns the live element tree.
//!
//! The snapshot builder only ever reads through [`HostAdapter`]; nothing in
//! this crate mutates host state.

use crate::error::Result;
use crate::proto::ChildOffset;
use crate::proto::ElementId;
use crate::proto::Fingerprint;
use crate::snapshot::model::Geometry;
use crate::snapshot::model::RelationRecord;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("element {0} no longer exists")]
    ElementGone(ElementId),

    #[error("failed to read element {id}: {message}")]
    Read { id: ElementId, message: String },

    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Raw per-element attributes as the host reports them.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ElementAttributes {
    pub parent_id: ElementId,
    pub fingerprint: Fingerprint,
    pub child_offset_id: ChildOffset,
    pub type_id: u32,
    pub template_type: u32,
    pub layout: u32,
    pub state: u32,
    pub is_created: bool,
    pub is_visible: bool,
    pub visibility_flags: u32,
    pub geometry: Geometry,
    pub relation: Option<RelationRecord>,
}

pub trait HostAdapter {
    /// Every live handle, in host order. Called once per build.
    fn element_ids(&self) -> std::result::Result<Vec<ElementId>, HostError>;

    fn read_element(&self, id: ElementId) -> std::result::Result<ElementAttributes, HostError>;

    fn root_hint(&self) -> Option<ElementId> {
        None
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DumpedElement {
    pub id: ElementId,
    #[serde(flatten)]
    pub attributes: ElementAttributes,
}

/// Serialized capture of a host tree, used for fixtures and offline inspection.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostDump {
    pub root_hint: Option<ElementId>,
    /// Enumeration order. Defaults to the order of `elements`; handles listed
    /// here without a matching element fail to read.
    pub handles: Option<Vec<ElementId>>,
    pub elements: Vec<DumpedElement>,
}

/// In-memory host backed by a [`HostDump`].
#[derive(Clone, Debug, Default)]
pub struct StaticHost {
    handles: Vec<ElementId>,
    elements: HashMap<ElementId, ElementAttributes>,
    root_hint: Option<ElementId>,
}

impl StaticHost {
    pub fn from_dump(dump: HostDump) -> Self {
        let handles = dump
            .handles
            .unwrap_or_else(|| dump.elements.iter().map(|e| e.id).collect());
        let mut elements = HashMap::with_capacity(dump.elements.len());
        for element in dump.elements {
            elements.entry(element.id).or_insert(element.attributes);
        }
        Self {
            handles,
            elements,
            root_hint: dump.root_hint,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let dump: HostDump = serde_json::from_str(raw)?;
        Ok(Self::from_dump(dump))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn insert(&mut self, id: ElementId, attributes: ElementAttributes) {
        if self.elements.insert(id, attributes).is_none() {
            self.handles.push(id);
        }
    }

    pub fn set_root_hint(&mut self, root_hint: Option<ElementId>) {
        self.root_hint = root_hint;
    }
}

impl HostAdapter for StaticHost {
    fn element_ids(&self) -> std::result::Result<Vec<ElementId>, HostError> {
        Ok(self.handles.clone())
    }

    fn read_element(&self, id: ElementId) -> std::result::Result<ElementAttributes, HostError> {
        self.elements
            .get(&id)
            .cloned()
            .ok_or(HostError::ElementGone(id))
    }

    fn root_hint(&self) -> Option<ElementId> {
        self.root_hint
    }
}
