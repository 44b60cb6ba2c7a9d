use crate::snapshot::model::Element;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use strum_macros::Display;
use strum_macros::EnumString;

/// Attributes an [`AttrMatch`] can compare against.
#[derive(
    Clone,
    Copy,
    Debug,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ElementAttr {
    Id,
    ParentId,
    /// Compares against the effective fingerprint.
    Fingerprint,
    ChildOffsetId,
    #[strum(to_string = "type", serialize = "type_id")]
    #[serde(rename = "type", alias = "type_id")]
    TypeId,
    TemplateType,
    Layout,
    State,
    IsCreated,
    IsVisible,
    Depth,
    SiblingRankX,
    SiblingRankY,
}

impl ElementAttr {
    /// Booleans read as 0/1; unset derived fields read as `None`.
    pub fn value_of(self, element: &Element) -> Option<i64> {
        match self {
            ElementAttr::Id => i64::try_from(element.id).ok(),
            ElementAttr::ParentId => i64::try_from(element.parent_id).ok(),
            ElementAttr::Fingerprint => i64::try_from(element.effective_fingerprint()).ok(),
            ElementAttr::ChildOffsetId => Some(i64::from(element.child_offset_id)),
            ElementAttr::TypeId => Some(i64::from(element.type_id)),
            ElementAttr::TemplateType => Some(i64::from(element.template_type)),
            ElementAttr::Layout => Some(i64::from(element.layout)),
            ElementAttr::State => Some(i64::from(element.state)),
            ElementAttr::IsCreated => Some(i64::from(element.is_created)),
            ElementAttr::IsVisible => Some(i64::from(element.is_visible)),
            ElementAttr::Depth => element.depth.map(i64::from),
            ElementAttr::SiblingRankX => element.sibling_rank_x.and_then(rank_value),
            ElementAttr::SiblingRankY => element.sibling_rank_y.and_then(rank_value),
        }
    }
}

fn rank_value(rank: usize) -> Option<i64> {
    i64::try_from(rank).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrParseError {
    message: String,
}

impl AttrParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AttrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AttrParseError {}

/// Attribute-equality map; an element matches when every entry is equal.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttrMatch(BTreeMap<ElementAttr, i64>);

impl AttrMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attr: ElementAttr, value: i64) -> Self {
        self.0.insert(attr, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, element: &Element) -> bool {
        self.0
            .iter()
            .all(|(attr, expected)| attr.value_of(element) == Some(*expected))
    }

    /// Parses `attr=value` pairs such as `type=3` or `is_visible=true`.
    pub fn from_pairs<'s>(pairs: impl IntoIterator<Item = &'s str>) -> Result<Self, AttrParseError> {
        let mut out = Self::new();
        for pair in pairs {
            let Some((name, raw)) = pair.split_once('=') else {
                return Err(AttrParseError::new(format!(
                    "expected attr=value, got '{pair}'"
                )));
            };
            let name = name.trim();
            let raw = raw.trim();
            let attr = ElementAttr::from_str(name)
                .map_err(|_| AttrParseError::new(format!("unknown attribute '{name}'")))?;
            let value = parse_attr_value(raw)
                .ok_or_else(|| AttrParseError::new(format!("invalid value '{raw}' for {attr}")))?;
            out.0.insert(attr, value);
        }
        Ok(out)
    }
}

fn parse_attr_value(raw: &str) -> Option<i64> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Some(1),
        "false" => Some(0),
        other => match other.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => other.parse().ok(),
        },
    }
}

/// Filter accepted by enumeration helpers: either an arbitrary predicate or
/// an attribute-equality map.
pub enum ElementFilter {
    Predicate(Box<dyn Fn(&Element) -> bool>),
    Attrs(AttrMatch),
}

impl ElementFilter {
    pub fn predicate(f: impl Fn(&Element) -> bool + 'static) -> Self {
        ElementFilter::Predicate(Box::new(f))
    }

    pub fn matches(&self, element: &Element) -> bool {
        match self {
            ElementFilter::Predicate(f) => f(element),
            ElementFilter::Attrs(attrs) => attrs.matches(element),
        }
    }
}

impl From<AttrMatch> for ElementFilter {
    fn from(attrs: AttrMatch) -> Self {
        ElementFilter::Attrs(attrs)
    }
}

impl fmt::Debug for ElementFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementFilter::Predicate(_) => f.write_str("ElementFilter::Predicate(..)"),
            ElementFilter::Attrs(attrs) => {
                f.debug_tuple("ElementFilter::Attrs").field(attrs).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ElementAttributes;
    use pretty_assertions::assert_eq;

    fn sample() -> Element {
        Element::from_attributes(
            5,
            ElementAttributes {
                parent_id: 2,
                type_id: 3,
                is_visible: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn pairs_parse_into_attr_match() {
        let parsed = AttrMatch::from_pairs(["type=3", "is_visible=true", "parent_id=0x2"]).unwrap();
        let expected = AttrMatch::new()
            .with(ElementAttr::TypeId, 3)
            .with(ElementAttr::IsVisible, 1)
            .with(ElementAttr::ParentId, 2);
        assert_eq!(parsed, expected);
        assert!(parsed.matches(&sample()));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let err = AttrMatch::from_pairs(["colour=red"]).unwrap_err();
        assert_eq!(err.message(), "unknown attribute 'colour'");
    }

    #[test]
    fn unset_derived_field_never_matches() {
        let filter = ElementFilter::from(AttrMatch::new().with(ElementAttr::Depth, 0));
        assert!(!filter.matches(&sample()));
        let visible = ElementFilter::predicate(|e| e.is_visible);
        assert!(visible.matches(&sample()));
    }
}
