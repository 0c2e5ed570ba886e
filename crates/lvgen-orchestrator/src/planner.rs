//! Segment planner.
//!
//! Validates a requested duration and splits it into fixed-length segments
//! that tile `[0, total_duration)` with no gaps or overlaps.

use lvgen_models::{
    LongVideoConfig, Segment, DEFAULT_CREDITS_PER_SEGMENT, LONG_VIDEO_DURATIONS,
    MAX_GENERIC_DURATION, MIN_GENERIC_DURATION, SEGMENT_SECONDS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("duration {0}s is not one of {allowed:?}", allowed = LONG_VIDEO_DURATIONS)]
    UnsupportedDuration(u32),

    #[error(
        "duration {0}s must be a multiple of {step} between {min} and {max}",
        step = SEGMENT_SECONDS,
        min = MIN_GENERIC_DURATION,
        max = MAX_GENERIC_DURATION
    )]
    InvalidGenericDuration(u32),

    #[error("at least one segment prompt is required")]
    NoPrompts,

    #[error("prompt for segment {0} is blank")]
    BlankPrompt(usize),

    #[error("credits_per_segment must be positive")]
    ZeroCredits,
}

/// Caller-supplied per-segment content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentsInput {
    /// Prompts by segment index; the last one is reused for the remainder
    pub prompts: Vec<String>,

    /// Explicit seed image per segment index
    #[serde(default)]
    pub seed_images: Vec<Option<String>>,

    /// Task-level seed image used where no per-segment seed is given
    #[serde(default)]
    pub seed_image_url: Option<String>,

    #[serde(default = "default_true")]
    pub allow_scene_editing: bool,

    #[serde(default = "default_credits_per_segment")]
    pub credits_per_segment: u32,
}

fn default_true() -> bool {
    true
}

fn default_credits_per_segment() -> u32 {
    DEFAULT_CREDITS_PER_SEGMENT
}

impl SegmentsInput {
    pub fn new<I, S>(prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompts: prompts.into_iter().map(Into::into).collect(),
            seed_images: Vec::new(),
            seed_image_url: None,
            allow_scene_editing: true,
            credits_per_segment: DEFAULT_CREDITS_PER_SEGMENT,
        }
    }

    pub fn with_seed_image_url(mut self, url: impl Into<String>) -> Self {
        self.seed_image_url = Some(url.into());
        self
    }

    pub fn with_seed_images(mut self, seeds: Vec<Option<String>>) -> Self {
        self.seed_images = seeds;
        self
    }

    pub fn with_scene_editing(mut self, allow: bool) -> Self {
        self.allow_scene_editing = allow;
        self
    }

    pub fn with_credits_per_segment(mut self, credits: u32) -> Self {
        self.credits_per_segment = credits;
        self
    }

    fn validate(&self) -> Result<(), PlanError> {
        if self.prompts.is_empty() {
            return Err(PlanError::NoPrompts);
        }
        if let Some(i) = self.prompts.iter().position(|p| p.trim().is_empty()) {
            return Err(PlanError::BlankPrompt(i));
        }
        if self.credits_per_segment == 0 {
            return Err(PlanError::ZeroCredits);
        }
        Ok(())
    }
}

/// Plan a long video whose duration must be one of [`LONG_VIDEO_DURATIONS`].
pub fn plan(total_duration: u32, input: &SegmentsInput) -> Result<LongVideoConfig, PlanError> {
    if !LONG_VIDEO_DURATIONS.contains(&total_duration) {
        return Err(PlanError::UnsupportedDuration(total_duration));
    }
    build(total_duration, input)
}

/// Plan any positive multiple of the segment length within the generic bounds.
pub fn plan_generic(total_duration: u32, input: &SegmentsInput) -> Result<LongVideoConfig, PlanError> {
    let in_bounds = (MIN_GENERIC_DURATION..=MAX_GENERIC_DURATION).contains(&total_duration);
    if !in_bounds || total_duration % SEGMENT_SECONDS != 0 {
        return Err(PlanError::InvalidGenericDuration(total_duration));
    }
    build(total_duration, input)
}

fn build(total_duration: u32, input: &SegmentsInput) -> Result<LongVideoConfig, PlanError> {
    input.validate()?;

    let num_segments = total_duration.div_ceil(SEGMENT_SECONDS);
    let last_prompt = input.prompts.len() - 1;

    let segments = (0..num_segments)
        .map(|i| {
            let start = i * SEGMENT_SECONDS;
            let end = ((i + 1) * SEGMENT_SECONDS).min(total_duration);
            let prompt = &input.prompts[(i as usize).min(last_prompt)];
            let seed = input
                .seed_images
                .get(i as usize)
                .cloned()
                .flatten()
                .or_else(|| input.seed_image_url.clone());
            Segment::new(i, start, end, prompt.clone()).with_seed_image(seed)
        })
        .collect();

    Ok(LongVideoConfig {
        total_duration,
        segments,
        current_segment_index: 0,
        paused_at_segment: None,
        seed_image_url: input.seed_image_url.clone(),
        allow_scene_editing: input.allow_scene_editing,
        credits_per_segment: input.credits_per_segment,
        group_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_durations_tile_exactly() {
        for d in LONG_VIDEO_DURATIONS {
            let config = plan(d, &SegmentsInput::new(["scene"])).unwrap();
            assert_eq!(config.num_segments(), d / 8);

            let mut cursor = 0;
            for (i, segment) in config.segments.iter().enumerate() {
                assert_eq!(segment.segment_id, i as u32);
                assert_eq!(segment.start_time, cursor);
                assert_eq!(segment.duration(), 8);
                cursor = segment.end_time;
            }
            assert_eq!(cursor, d);
        }
    }

    #[test]
    fn test_plan_32_ranges() {
        let config = plan(32, &SegmentsInput::new(["a"])).unwrap();
        let ranges: Vec<(u32, u32)> = config
            .segments
            .iter()
            .map(|s| (s.start_time, s.end_time))
            .collect();
        assert_eq!(ranges, vec![(0, 8), (8, 16), (16, 24), (24, 32)]);
    }

    #[test]
    fn test_rejects_durations_outside_allowed_set() {
        let input = SegmentsInput::new(["a"]);
        assert_eq!(plan(50, &input), Err(PlanError::UnsupportedDuration(50)));
        assert_eq!(plan(40, &input), Err(PlanError::UnsupportedDuration(40)));
        assert_eq!(plan(0, &input), Err(PlanError::UnsupportedDuration(0)));
    }

    #[test]
    fn test_generic_bounds() {
        let input = SegmentsInput::new(["a"]);
        assert_eq!(plan_generic(40, &input).unwrap().num_segments(), 5);
        assert_eq!(plan_generic(8, &input).unwrap().num_segments(), 1);
        assert_eq!(plan_generic(1800, &input).unwrap().num_segments(), 225);
        assert!(plan_generic(50, &input).is_err());
        assert!(plan_generic(0, &input).is_err());
        assert!(plan_generic(1808, &input).is_err());
    }

    #[test]
    fn test_last_prompt_is_reused() {
        let config = plan(56, &SegmentsInput::new(["intro", "middle"])).unwrap();
        let prompts: Vec<&str> = config.segments.iter().map(|s| s.prompt.as_str()).collect();
        assert_eq!(prompts[0], "intro");
        assert!(prompts[1..].iter().all(|p| *p == "middle"));
        assert_eq!(prompts.len(), 7);
    }

    #[test]
    fn test_seed_image_fallback() {
        let input = SegmentsInput::new(["a"])
            .with_seed_image_url("https://cdn/task.png")
            .with_seed_images(vec![None, Some("https://cdn/one.png".into())]);
        let config = plan(32, &input).unwrap();

        let seeds: Vec<Option<&str>> = config
            .segments
            .iter()
            .map(|s| s.seed_image_url.as_deref())
            .collect();
        assert_eq!(
            seeds,
            vec![
                Some("https://cdn/task.png"),
                Some("https://cdn/one.png"),
                Some("https://cdn/task.png"),
                Some("https://cdn/task.png"),
            ]
        );
        assert_eq!(config.seed_image_url.as_deref(), Some("https://cdn/task.png"));
    }

    #[test]
    fn test_input_validation() {
        assert_eq!(
            plan(32, &SegmentsInput::new(Vec::<String>::new())),
            Err(PlanError::NoPrompts)
        );
        assert_eq!(
            plan(32, &SegmentsInput::new(["ok", "  "])),
            Err(PlanError::BlankPrompt(1))
        );
        assert_eq!(
            plan(32, &SegmentsInput::new(["ok"]).with_credits_per_segment(0)),
            Err(PlanError::ZeroCredits)
        );
    }

    #[test]
    fn test_config_carries_billing_and_editing() {
        let config = plan(
            120,
            &SegmentsInput::new(["a"])
                .with_credits_per_segment(3)
                .with_scene_editing(false),
        )
        .unwrap();
        assert_eq!(config.total_cost(), 45);
        assert!(!config.allow_scene_editing);
        assert_eq!(config.paused_at_segment, None);
    }
}
