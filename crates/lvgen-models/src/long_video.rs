//! Long-video segment plans.
//!
//! A long video is produced as a sequence of fixed-length segments that are
//! generated independently and stitched together afterwards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{GroupId, JobId, OutputAsset, TaskStatus};

/// Length of every segment in seconds.
pub const SEGMENT_SECONDS: u32 = 8;

/// Total durations accepted for long-video tasks.
pub const LONG_VIDEO_DURATIONS: [u32; 5] = [32, 56, 120, 240, 480];

/// Bounds for generic segmented durations.
pub const MIN_GENERIC_DURATION: u32 = 8;
pub const MAX_GENERIC_DURATION: u32 = 1800;

pub const DEFAULT_CREDITS_PER_SEGMENT: u32 = 1;

/// Extra credits charged when a segment is regenerated with an edited prompt.
pub const EDIT_SURCHARGE_CREDITS: u32 = 1;

/// Segments share the task lifecycle states.
pub type SegmentStatus = TaskStatus;

/// One contiguous time-slice of a long video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Index of the segment within its task
    pub segment_id: u32,

    pub start_time: u32,

    pub end_time: u32,

    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_image_url: Option<String>,

    #[serde(default)]
    pub status: SegmentStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Prompt was overwritten on resume; regeneration carries a surcharge
    #[serde(default)]
    pub edited: bool,

    /// Job that paid the surcharge for the current edit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_charged_by: Option<JobId>,
}

impl Segment {
    pub fn new(segment_id: u32, start_time: u32, end_time: u32, prompt: impl Into<String>) -> Self {
        Self {
            segment_id,
            start_time,
            end_time,
            prompt: prompt.into(),
            seed_image_url: None,
            status: SegmentStatus::Pending,
            output: None,
            error_message: None,
            edited: false,
            edit_charged_by: None,
        }
    }

    pub fn with_seed_image(mut self, url: Option<String>) -> Self {
        self.seed_image_url = url;
        self
    }

    pub fn duration(&self) -> u32 {
        self.end_time - self.start_time
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Overwrite the prompt. A new edit is owed its own surcharge.
    pub fn edit_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
        self.edited = true;
        self.edit_charged_by = None;
    }

    /// Whether `job_id` has to pay for the current edit. The paying job
    /// stays due so its redeliveries replay the same ledger key.
    pub fn edit_surcharge_due(&self, job_id: &JobId) -> bool {
        self.edited && self.edit_charged_by.as_ref().map_or(true, |paid| paid == job_id)
    }

    /// Clear the previous attempt so the segment can be generated again.
    pub fn reset(&mut self) {
        self.status = SegmentStatus::Pending;
        self.output = None;
        self.error_message = None;
    }
}

/// Aggregate state of a segment group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentGroupState {
    /// At least one segment is still pending or processing
    Open,
    /// Every segment completed
    AllCompleted,
    /// Every segment is terminal and these did not complete
    Unsuccessful(Vec<u32>),
}

/// Segment plan attached to a long-video task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LongVideoConfig {
    /// Total duration in seconds
    pub total_duration: u32,

    pub segments: Vec<Segment>,

    #[serde(default)]
    pub current_segment_index: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_at_segment: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_image_url: Option<String>,

    #[serde(default = "default_true")]
    pub allow_scene_editing: bool,

    #[serde(default = "default_credits_per_segment")]
    pub credits_per_segment: u32,

    /// Correlates the segment jobs of one dispatch; set when dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

fn default_true() -> bool {
    true
}

fn default_credits_per_segment() -> u32 {
    DEFAULT_CREDITS_PER_SEGMENT
}

impl LongVideoConfig {
    pub fn num_segments(&self) -> u32 {
        self.segments.len() as u32
    }

    pub fn segment(&self, index: u32) -> Option<&Segment> {
        self.segments.get(index as usize)
    }

    pub fn segment_mut(&mut self, index: u32) -> Option<&mut Segment> {
        self.segments.get_mut(index as usize)
    }

    /// Credits charged up front for the whole plan.
    pub fn total_cost(&self) -> u32 {
        self.num_segments().saturating_mul(self.credits_per_segment)
    }

    pub fn all_terminal(&self) -> bool {
        self.segments.iter().all(Segment::is_terminal)
    }

    pub fn state(&self) -> SegmentGroupState {
        if !self.all_terminal() {
            return SegmentGroupState::Open;
        }
        let unsuccessful: Vec<u32> = self
            .segments
            .iter()
            .filter(|s| s.status != SegmentStatus::Completed)
            .map(|s| s.segment_id)
            .collect();
        if unsuccessful.is_empty() {
            SegmentGroupState::AllCompleted
        } else {
            SegmentGroupState::Unsuccessful(unsuccessful)
        }
    }

    /// Completed segment outputs ordered by segment id, regardless of the
    /// order in which they finished.
    pub fn ordered_outputs(&self) -> Vec<(u32, &OutputAsset)> {
        let mut outputs: Vec<(u32, &OutputAsset)> = self
            .segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Completed)
            .filter_map(|s| s.output.as_ref().map(|o| (s.segment_id, o)))
            .collect();
        outputs.sort_by_key(|(id, _)| *id);
        outputs
    }

    /// Point `current_segment_index` at the first segment not yet completed.
    pub fn advance_current_index(&mut self) {
        self.current_segment_index = self
            .segments
            .iter()
            .position(|s| s.status != SegmentStatus::Completed)
            .unwrap_or(self.segments.len()) as u32;
    }

    pub(crate) fn cancel_open_segments(&mut self) {
        for segment in self.segments.iter_mut().filter(|s| !s.is_terminal()) {
            segment.status = SegmentStatus::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaKind;

    fn config(n: u32) -> LongVideoConfig {
        LongVideoConfig {
            total_duration: n * SEGMENT_SECONDS,
            segments: (0..n)
                .map(|i| Segment::new(i, i * 8, (i + 1) * 8, format!("p{i}")))
                .collect(),
            current_segment_index: 0,
            paused_at_segment: None,
            seed_image_url: None,
            allow_scene_editing: true,
            credits_per_segment: 2,
            group_id: None,
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut lv = config(3);
        assert_eq!(lv.state(), SegmentGroupState::Open);
        assert_eq!(lv.total_cost(), 6);

        for s in lv.segments.iter_mut() {
            s.status = SegmentStatus::Completed;
        }
        assert_eq!(lv.state(), SegmentGroupState::AllCompleted);

        lv.segments[1].status = SegmentStatus::Failed;
        assert_eq!(lv.state(), SegmentGroupState::Unsuccessful(vec![1]));
    }

    #[test]
    fn test_ordered_outputs_sorted_by_segment() {
        let mut lv = config(3);
        for i in [2usize, 0, 1] {
            lv.segments[i].status = SegmentStatus::Completed;
            lv.segments[i].output =
                Some(OutputAsset::new(format!("https://x/{i}.mp4"), MediaKind::Video));
        }
        lv.segments.swap(0, 2);
        let ids: Vec<u32> = lv.ordered_outputs().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_advance_current_index() {
        let mut lv = config(4);
        lv.segments[0].status = SegmentStatus::Completed;
        lv.segments[2].status = SegmentStatus::Completed;
        lv.advance_current_index();
        assert_eq!(lv.current_segment_index, 1);
    }

    #[test]
    fn test_edited_defaults_false_when_missing() {
        let json = r#"{"segment_id":0,"start_time":0,"end_time":8,"prompt":"a"}"#;
        let seg: Segment = serde_json::from_str(json).unwrap();
        assert!(!seg.edited);
        assert!(seg.edit_charged_by.is_none());
        assert_eq!(seg.status, SegmentStatus::Pending);
    }

    #[test]
    fn test_edit_surcharge_due_once_per_edit() {
        let mut seg = Segment::new(1, 8, 16, "a river");
        let first = JobId::from_string("j1");
        let second = JobId::from_string("j2");
        assert!(!seg.edit_surcharge_due(&first));

        seg.edit_prompt("a better river");
        assert!(seg.edit_surcharge_due(&first));

        seg.edit_charged_by = Some(first.clone());
        assert!(seg.edit_surcharge_due(&first));
        assert!(!seg.edit_surcharge_due(&second));

        seg.edit_prompt("the best river");
        assert!(seg.edit_surcharge_due(&second));
    }
}
