use crate::snapshot::model::Element;
use crate::snapshot::model::Rect;
use serde::Deserialize;
use serde::Serialize;
use serde_with::skip_serializing_none;
use strum_macros::Display;
use strum_macros::EnumString;

/// Host handle. Unstable across rebuilds.
pub type ElementId = u64;
/// Content-derived hash; 0 means "not fingerprinted".
pub type Fingerprint = u64;
/// Positional slot of an element under its parent.
pub type ChildOffset = u32;
/// Dense slot of an element inside one snapshot's arena.
pub type ElementIndex = usize;

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    EnumerationFailed,
    ElementReadFailed,
    DuplicateHandle,
    DuplicateFingerprint,
    CycleDetected,
    UnreachableElement,
    ParentIndexMissingNode,
    ChildrenIndexMissingNode,
    ParentChildMismatch,
}

impl DiagnosticKind {
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::DuplicateHandle => Severity::Info,
            DiagnosticKind::ElementReadFailed => Severity::Warning,
            DiagnosticKind::EnumerationFailed
            | DiagnosticKind::DuplicateFingerprint
            | DiagnosticKind::CycleDetected
            | DiagnosticKind::UnreachableElement
            | DiagnosticKind::ParentIndexMissingNode
            | DiagnosticKind::ChildrenIndexMissingNode
            | DiagnosticKind::ParentChildMismatch => Severity::Error,
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub element_id: Option<ElementId>,
    /// Second element involved, e.g. the rejected id of a fingerprint collision.
    pub related_id: Option<ElementId>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        element_id: Option<ElementId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            element_id,
            related_id: None,
            message: message.into(),
        }
    }

    pub fn with_related(mut self, related_id: ElementId) -> Self {
        self.related_id = Some(related_id);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    All,
    First,
    Nth,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    DirectChildren,
    #[default]
    Descendants,
}

#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortKey {
    Top,
    Left,
    Right,
    Bottom,
    Area,
    SiblingRankX,
    SiblingRankY,
    #[default]
    #[strum(to_string = "id", serialize = "element_id")]
    Id,
}

#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortOrder {
    #[default]
    #[strum(to_string = "asc", serialize = "ascending")]
    Asc,
    #[strum(to_string = "desc", serialize = "descending")]
    Desc,
}

/// Declarative query against a snapshot. Every unset field means "no constraint".
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryDescriptor {
    pub anchor_fingerprint: Fingerprint,
    pub offset_path: Option<Vec<ChildOffset>>,
    pub selection_mode: SelectionMode,
    pub nth_index: Option<usize>,
    pub search_scope: SearchScope,
    pub max_depth_from_anchor: Option<u32>,
    pub depth_from_anchor: Option<u32>,
    pub is_created: Option<bool>,
    pub is_visible: Option<bool>,
    pub type_in: Option<Vec<u32>>,
    pub template_type_in: Option<Vec<u32>>,
    pub fingerprint: Option<Fingerprint>,
    pub child_offset_id: Option<ChildOffset>,
    pub child_count_min: Option<usize>,
    pub child_count_max: Option<usize>,
    pub parent_fingerprint: Option<Fingerprint>,
    pub sort_by: Option<SortKey>,
    pub sort_order: SortOrder,
    pub prefer_visible: bool,
    pub prefer_created: bool,
    pub screen_region_hint: Option<Rect>,
    pub expected_rank_in_sorted: Option<usize>,
    pub require_fast_path_match: bool,
    pub fallback_to_search: bool,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self {
            anchor_fingerprint: 0,
            offset_path: None,
            selection_mode: SelectionMode::All,
            nth_index: None,
            search_scope: SearchScope::Descendants,
            max_depth_from_anchor: None,
            depth_from_anchor: None,
            is_created: None,
            is_visible: None,
            type_in: None,
            template_type_in: None,
            fingerprint: None,
            child_offset_id: None,
            child_count_min: None,
            child_count_max: None,
            parent_fingerprint: None,
            sort_by: None,
            sort_order: SortOrder::Asc,
            prefer_visible: true,
            prefer_created: true,
            screen_region_hint: None,
            expected_rank_in_sorted: None,
            require_fast_path_match: false,
            fallback_to_search: true,
        }
    }
}

impl QueryDescriptor {
    pub fn anchored(anchor_fingerprint: Fingerprint) -> Self {
        Self {
            anchor_fingerprint,
            ..Default::default()
        }
    }

    pub fn with_offset_path(mut self, offsets: impl Into<Vec<ChildOffset>>) -> Self {
        self.offset_path = Some(offsets.into());
        self
    }

    pub fn first(mut self) -> Self {
        self.selection_mode = SelectionMode::First;
        self.nth_index = None;
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.selection_mode = SelectionMode::Nth;
        self.nth_index = Some(index);
        self
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.search_scope = scope;
        self
    }

    pub fn sorted_by(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort_by = Some(key);
        self.sort_order = order;
        self
    }

    pub fn require_fast_path(mut self) -> Self {
        self.require_fast_path_match = true;
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback_to_search = false;
        self
    }
}

/// One resolved candidate. Borrows the snapshot that produced it.
#[derive(Clone, Debug, Serialize)]
pub struct RankedMatch<'a> {
    pub element_id: ElementId,
    pub score: i32,
    pub rank: usize,
    pub reasons: Vec<String>,
    pub element: &'a Element,
}

/// Trace of a single `resolve` call, returned by `explain`.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
pub struct QueryExplanation<'a> {
    pub anchor_fingerprint: Fingerprint,
    pub anchor_id: Option<ElementId>,
    pub fast_path_ran: bool,
    pub fast_path_candidate_ids: Vec<ElementId>,
    pub fast_path_valid_ids: Vec<ElementId>,
    pub fallback_ran: bool,
    pub fallback_candidate_count: usize,
    pub matches: Vec<RankedMatch<'a>>,
}
