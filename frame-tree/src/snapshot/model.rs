use crate::host::ElementAttributes;
use crate::proto::ChildOffset;
use crate::proto::ElementId;
use crate::proto::Fingerprint;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Negative extents count as zero.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Edges are inclusive.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Geometry {
    /// Rectangle in the host's content coordinates, before viewport scaling.
    pub content: Rect,
    pub on_screen: Rect,
    pub viewport_scale: f32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            content: Rect::default(),
            on_screen: Rect::default(),
            viewport_scale: 1.0,
        }
    }
}

/// Secondary parent/fingerprint linkage some hosts expose next to the primary fields.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationRecord {
    #[serde(default)]
    pub parent_id: ElementId,
    #[serde(default)]
    pub fingerprint: Fingerprint,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub parent_id: ElementId,
    pub fingerprint: Fingerprint,
    pub child_offset_id: ChildOffset,

    pub type_id: u32,
    pub template_type: u32,
    pub layout: u32,
    pub state: u32,

    pub is_created: bool,
    pub is_visible: bool,
    /// Raw host flags, kept for debugging only.
    pub visibility_flags: u32,

    pub geometry: Geometry,
    pub relation: Option<RelationRecord>,

    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub root_id: Option<ElementId>,
    #[serde(default)]
    pub nearest_fingerprinted_ancestor_id: Option<ElementId>,
    #[serde(default)]
    pub nearest_fingerprinted_ancestor_fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub offset_path_from_ancestor: Vec<ChildOffset>,
    #[serde(default)]
    pub sibling_rank_x: Option<usize>,
    #[serde(default)]
    pub sibling_rank_y: Option<usize>,
}

impl Element {
    pub fn from_attributes(id: ElementId, attrs: ElementAttributes) -> Self {
        Self {
            id,
            parent_id: attrs.parent_id,
            fingerprint: attrs.fingerprint,
            child_offset_id: attrs.child_offset_id,
            type_id: attrs.type_id,
            template_type: attrs.template_type,
            layout: attrs.layout,
            state: attrs.state,
            is_created: attrs.is_created,
            is_visible: attrs.is_visible,
            visibility_flags: attrs.visibility_flags,
            geometry: attrs.geometry,
            relation: attrs.relation,
            depth: None,
            root_id: None,
            nearest_fingerprinted_ancestor_id: None,
            nearest_fingerprinted_ancestor_fingerprint: None,
            offset_path_from_ancestor: Vec::new(),
            sibling_rank_x: None,
            sibling_rank_y: None,
        }
    }

    /// Primary fingerprint, or the relation record's when the primary is unset.
    pub fn effective_fingerprint(&self) -> Fingerprint {
        if self.fingerprint != 0 {
            return self.fingerprint;
        }
        self.relation.map(|rel| rel.fingerprint).unwrap_or(0)
    }

    pub fn is_fingerprinted(&self) -> bool {
        self.effective_fingerprint() != 0
    }

    pub fn area_on_screen(&self) -> f32 {
        self.geometry.on_screen.area()
    }

    pub fn screen_center(&self) -> (f32, f32) {
        self.geometry.on_screen.center()
    }
}
