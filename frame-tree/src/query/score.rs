use crate::proto::QueryDescriptor;
use crate::snapshot::model::Element;

pub(crate) const FAST_PATH_BONUS: i32 = 100;
const TYPE_MATCH_BONUS: i32 = 25;
const TEMPLATE_TYPE_MATCH_BONUS: i32 = 25;
const DEPTH_MATCH_BONUS: i32 = 20;
const DEPTH_MISS_PENALTY: i32 = 3;
const CHILD_OFFSET_BONUS: i32 = 10;
const RANK_MATCH_BONUS: i32 = 15;
const RANK_MISS_PENALTY: i32 = 2;
const SCREEN_REGION_BONUS: i32 = 10;
const VISIBLE_BONUS: i32 = 5;
const CREATED_BONUS: i32 = 5;

pub(crate) const FAST_PATH_REASON: &str = "fast_path";

/// Running total plus the audit trail of every signal that fired.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ScoreCard {
    pub(crate) total: i32,
    pub(crate) reasons: Vec<String>,
}

impl ScoreCard {
    pub(crate) fn apply(&mut self, signal: &str, delta: i32) {
        self.total = self.total.saturating_add(delta);
        self.reasons.push(format!("{signal} {delta:+}"));
    }
}

/// Inputs that depend on the candidate's position rather than its own fields.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Placement {
    pub(crate) via_fast_path: bool,
    pub(crate) depth_from_anchor: Option<u32>,
    pub(crate) sorted_rank: Option<usize>,
}

pub(crate) fn score_candidate(
    descriptor: &QueryDescriptor,
    element: &Element,
    placement: Placement,
) -> ScoreCard {
    let mut card = ScoreCard::default();
    if placement.via_fast_path {
        card.apply(FAST_PATH_REASON, FAST_PATH_BONUS);
    }
    if let Some(types) = descriptor.type_in.as_deref()
        && types.contains(&element.type_id)
    {
        card.apply("type_in", TYPE_MATCH_BONUS);
    }
    if let Some(types) = descriptor.template_type_in.as_deref()
        && types.contains(&element.template_type)
    {
        card.apply("template_type_in", TEMPLATE_TYPE_MATCH_BONUS);
    }
    if let (Some(expected), Some(actual)) = (descriptor.depth_from_anchor, placement.depth_from_anchor)
    {
        let distance = expected.abs_diff(actual);
        if distance == 0 {
            card.apply("depth_from_anchor", DEPTH_MATCH_BONUS);
        } else {
            card.apply("depth_from_anchor", penalty(DEPTH_MISS_PENALTY, u64::from(distance)));
        }
    }
    if descriptor.child_offset_id == Some(element.child_offset_id) {
        card.apply("child_offset_id", CHILD_OFFSET_BONUS);
    }
    if descriptor.sort_by.is_some()
        && let (Some(expected), Some(actual)) =
            (descriptor.expected_rank_in_sorted, placement.sorted_rank)
    {
        let distance = expected.abs_diff(actual);
        if distance == 0 {
            card.apply("expected_rank_in_sorted", RANK_MATCH_BONUS);
        } else {
            let distance = u64::try_from(distance).unwrap_or(u64::MAX);
            card.apply("expected_rank_in_sorted", penalty(RANK_MISS_PENALTY, distance));
        }
    }
    if let Some(region) = descriptor.screen_region_hint {
        let (x, y) = element.screen_center();
        if region.contains_point(x, y) {
            card.apply("screen_region_hint", SCREEN_REGION_BONUS);
        }
    }
    if descriptor.prefer_visible && element.is_visible {
        card.apply("prefer_visible", VISIBLE_BONUS);
    }
    if descriptor.prefer_created && element.is_created {
        card.apply("prefer_created", CREATED_BONUS);
    }
    card
}

fn penalty(weight: i32, distance: u64) -> i32 {
    let distance = i32::try_from(distance).unwrap_or(i32::MAX);
    weight.saturating_mul(distance).saturating_neg()
}
