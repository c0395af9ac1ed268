use crate::game::error::{ChartError, TimelineKind};
use crate::game::timeline::{EventTimeline, TimedEvent};
use log::trace;
use serde::Serialize;

/// Line time runs at 32 units per beat.
pub const UNITS_PER_BEAT: f32 = 32.0;
/// Milliseconds per line time unit at 1 BPM (`60_000 / 32`).
pub const MS_PER_UNIT_AT_ONE_BPM: f32 = 1875.0;

/// Scroll-distance units per line time unit at `bpm`: the real duration of one
/// unit, in seconds.
#[inline(always)]
pub fn floor_scale_for_bpm(bpm: f32) -> f32 {
    MS_PER_UNIT_AT_ONE_BPM / bpm / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedEvent {
    pub start_time: f32,
    pub end_time: f32,
    /// Signed scroll speed multiplier.
    pub value: f32,
    /// Scroll distance accumulated by `start_time`.
    pub floor_position: f32,
}

impl SpeedEvent {
    pub fn new(start_time: f32, end_time: f32, value: f32) -> Self {
        Self { start_time, end_time, value, floor_position: 0.0 }
    }
}

impl TimedEvent for SpeedEvent {
    #[inline(always)]
    fn start_time(&self) -> f32 {
        self.start_time
    }

    #[inline(always)]
    fn end_time(&self) -> f32 {
        self.end_time
    }

    fn payload_is_finite(&self) -> bool {
        self.value.is_finite() && self.floor_position.is_finite()
    }
}

/// Speed segments of one judge line and the running integral over them.
#[derive(Debug, Clone)]
pub struct SpeedTrack {
    timeline: EventTimeline<SpeedEvent>,
    scale: f32,
}

impl SpeedTrack {
    /// Builds a track whose floor positions are taken as given. Call
    /// [`SpeedTrack::recalculate_floor_positions`] if they were not supplied.
    pub fn new(events: Vec<SpeedEvent>, bpm: f32) -> Result<Self, ChartError> {
        Ok(Self {
            timeline: EventTimeline::new(events, TimelineKind::Speed)?,
            scale: floor_scale_for_bpm(bpm),
        })
    }

    /// Builds a track and computes floor positions from scratch.
    pub fn with_recalculated(events: Vec<SpeedEvent>, bpm: f32) -> Result<Self, ChartError> {
        let mut track = Self::new(events, bpm)?;
        track.recalculate_floor_positions();
        Ok(track)
    }

    /// Replaces the speed segments. Floor positions are always recomputed
    /// since the previous prefix sums no longer apply.
    pub fn set_events(&mut self, events: Vec<SpeedEvent>) -> Result<(), ChartError> {
        self.timeline = EventTimeline::new(events, TimelineKind::Speed)?;
        self.recalculate_floor_positions();
        Ok(())
    }

    /// Single left-to-right accumulation pass over the segments.
    pub fn recalculate_floor_positions(&mut self) {
        let scale = self.scale;
        let mut floor = 0.0_f32;
        for ev in self.timeline.events_mut() {
            ev.floor_position = floor;
            floor = advance(ev, ev.end_time, scale);
        }
        trace!("Recalculated floor positions for {} speed events.", self.timeline.len());
    }

    /// Total scroll distance accumulated by `time` (line units). Times outside
    /// every segment extrapolate from the first one; no segments means no
    /// scrolling at all.
    #[inline(always)]
    pub fn floor_position(&self, time: f32) -> f32 {
        match self.timeline.resolve(time) {
            Some(r) => advance(r.event, time, self.scale),
            None => 0.0,
        }
    }

    /// Speed multiplier in effect at `time` (line units).
    #[inline(always)]
    pub fn speed_at(&self, time: f32) -> f32 {
        self.timeline.resolve(time).map_or(1.0, |r| r.event.value)
    }

    pub fn events(&self) -> &[SpeedEvent] {
        self.timeline.events()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }
}

// Shared by lookup and recalculation so boundary values agree bit for bit.
#[inline(always)]
fn advance(ev: &SpeedEvent, time: f32, scale: f32) -> f32 {
    ev.floor_position + (time - ev.start_time) * scale * ev.value
}
