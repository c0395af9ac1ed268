use crate::game::error::{ChartError, TimelineKind, TimelineSite};
use serde::{Deserialize, Serialize};

/// Anything that occupies the interval `(start_time, end_time]` of a line's
/// private time axis.
pub trait TimedEvent {
    fn start_time(&self) -> f32;
    fn end_time(&self) -> f32;

    /// Payload fields other than the interval, checked at load.
    fn payload_is_finite(&self) -> bool {
        true
    }

    /// Left-open, right-closed membership. A time sitting exactly on a
    /// boundary belongs to the earlier event.
    #[inline(always)]
    fn contains(&self, time: f32) -> bool {
        time > self.start_time() && time <= self.end_time()
    }
}

/// Binary search for the event whose interval contains `time`.
///
/// Only valid on slices sorted by start time with non-overlapping intervals,
/// which [`EventTimeline::new`] guarantees. Gaps between events are treated
/// as "outside every event" and yield `None`.
#[inline(always)]
pub fn find_event<E: TimedEvent>(events: &[E], time: f32) -> Option<&E> {
    let mut lo = 0usize;
    let mut hi = events.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let e = &events[mid];
        if e.contains(time) {
            return Some(e);
        }
        if e.start_time() >= time {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    None
}

/// A sorted, validated list of events for one property of a judge line.
#[derive(Debug, Clone)]
pub struct EventTimeline<E> {
    events: Vec<E>,
}

impl<E> Default for EventTimeline<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E: TimedEvent> EventTimeline<E> {
    /// Validates ordering and disjointness. Touching intervals
    /// (`end[i] == start[i+1]`) and gaps are both fine.
    pub fn new(events: Vec<E>, kind: TimelineKind) -> Result<Self, ChartError> {
        let site = TimelineSite { line: None, timeline: kind };
        for (index, ev) in events.iter().enumerate() {
            let (start_time, end_time) = (ev.start_time(), ev.end_time());
            if !(start_time.is_finite() && end_time.is_finite() && ev.payload_is_finite()) {
                return Err(ChartError::NonFiniteValue { site, index });
            }
            if end_time < start_time {
                return Err(ChartError::InvertedEvent { site, index, start_time, end_time });
            }
            if index == 0 {
                continue;
            }
            let prev = &events[index - 1];
            if start_time < prev.start_time() {
                return Err(ChartError::UnsortedEvents {
                    site,
                    index,
                    start_time,
                    previous_start: prev.start_time(),
                });
            }
            if start_time < prev.end_time() {
                return Err(ChartError::OverlappingEvents {
                    site,
                    index,
                    start_time,
                    previous_end: prev.end_time(),
                });
            }
        }
        Ok(Self { events })
    }

    /// The event containing `time`, if any.
    #[inline(always)]
    pub fn find(&self, time: f32) -> Option<&E> {
        find_event(&self.events, time)
    }

    /// The event containing `time`, falling back to the first event. `None`
    /// only for an empty timeline.
    #[inline(always)]
    pub fn resolve(&self, time: f32) -> Option<Resolved<'_, E>> {
        match self.find(time) {
            Some(event) => Some(Resolved { event, fallback: false }),
            None => self.events.first().map(|event| Resolved { event, fallback: true }),
        }
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn events_mut(&mut self) -> &mut [E] {
        &mut self.events
    }
}

/// Result of [`EventTimeline::resolve`]: the authoritative event and whether
/// it was reached through the first-event fallback.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a, E> {
    pub event: &'a E,
    pub fallback: bool,
}

/// Two independent interpolation pairs. A move timeline reads both as
/// (x, y); rotate and alpha timelines only use the first pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    pub start_time: f32,
    pub end_time: f32,
    #[serde(default)]
    pub start: f32,
    #[serde(default)]
    pub end: f32,
    #[serde(default)]
    pub start2: f32,
    #[serde(default)]
    pub end2: f32,
}

impl TimedEvent for StateEvent {
    #[inline(always)]
    fn start_time(&self) -> f32 {
        self.start_time
    }

    #[inline(always)]
    fn end_time(&self) -> f32 {
        self.end_time
    }

    fn payload_is_finite(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start2.is_finite() && self.end2.is_finite()
    }
}

impl StateEvent {
    pub fn new(start_time: f32, end_time: f32, start: f32, end: f32) -> Self {
        Self { start_time, end_time, start, end, start2: 0.0, end2: 0.0 }
    }

    pub fn new_pair(start_time: f32, end_time: f32, start: (f32, f32), end: (f32, f32)) -> Self {
        Self {
            start_time,
            end_time,
            start: start.0,
            end: end.0,
            start2: start.1,
            end2: end.1,
        }
    }

    /// Position of `time` within the event. Zero-length events sit at their
    /// midpoint so they never produce NaN.
    #[inline(always)]
    pub fn progress(&self, time: f32) -> f32 {
        let duration = self.end_time - self.start_time;
        if duration <= 0.0 {
            return 0.5;
        }
        (time - self.start_time) / duration
    }

    #[inline(always)]
    fn lerp_at(&self, progress: f32) -> (f32, f32) {
        (
            self.start + (self.end - self.start) * progress,
            self.start2 + (self.end2 - self.start2) * progress,
        )
    }
}

impl EventTimeline<StateEvent> {
    /// Interpolated pair at `time`. Inside an event the progress is already
    /// within `(0, 1]`; the first-event fallback is clamped so it never
    /// extrapolates past the event's own endpoints.
    pub fn sample(&self, time: f32) -> Option<(f32, f32)> {
        let resolved = self.resolve(time)?;
        let progress = resolved.event.progress(time);
        let progress = if resolved.fallback { progress.clamp(0.0, 1.0) } else { progress };
        Some(resolved.event.lerp_at(progress))
    }
}
