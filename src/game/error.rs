use std::fmt;
use thiserror::Error;

/// Which of a judge line's event lists an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineKind {
    Speed,
    Move,
    Rotate,
    Alpha,
}

impl TimelineKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::Move => "move",
            Self::Rotate => "rotate",
            Self::Alpha => "alpha",
        }
    }
}

impl fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in a chart a timeline lives. `line` is `None` while a timeline is
/// being built on its own (e.g. in tests) and gets filled in by the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSite {
    pub line: Option<usize>,
    pub timeline: TimelineKind,
}

impl fmt::Display for TimelineSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line} {} events", self.timeline),
            None => write!(f, "{} events", self.timeline),
        }
    }
}

/// Structural problems with chart data. All of these are reported once at
/// load time; nothing in the per-frame path can fail.
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("line {line}: bpm must be a positive finite number, got {bpm}")]
    InvalidBpm { line: usize, bpm: f32 },

    #[error("{site}: event {index} ends before it starts ({start_time} > {end_time})")]
    InvertedEvent {
        site: TimelineSite,
        index: usize,
        start_time: f32,
        end_time: f32,
    },

    #[error("{site}: event {index} starts at {start_time}, before the previous event's start {previous_start}")]
    UnsortedEvents {
        site: TimelineSite,
        index: usize,
        start_time: f32,
        previous_start: f32,
    },

    #[error("{site}: event {index} starts at {start_time}, inside the previous event ending at {previous_end}")]
    OverlappingEvents {
        site: TimelineSite,
        index: usize,
        start_time: f32,
        previous_end: f32,
    },

    #[error("{site}: event {index} has a non-finite field")]
    NonFiniteValue { site: TimelineSite, index: usize },

    #[error("line at position {position} carries index {index}")]
    LineIndexMismatch { position: usize, index: usize },

    #[error("line {line}: note {index} has unknown type {code}")]
    UnknownNoteType { line: usize, index: usize, code: i32 },

    #[error("unsupported chart format version {0}")]
    UnsupportedFormat(u32),

    #[error("malformed chart JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read chart: {0}")]
    Io(#[from] std::io::Error),
}

impl ChartError {
    /// Attaches a line index to timeline errors raised before the owning
    /// line was known.
    pub(crate) fn at_line(self, line: usize) -> Self {
        let place = |site: TimelineSite| TimelineSite { line: Some(line), ..site };
        match self {
            Self::InvertedEvent { site, index, start_time, end_time } => {
                Self::InvertedEvent { site: place(site), index, start_time, end_time }
            }
            Self::UnsortedEvents { site, index, start_time, previous_start } => {
                Self::UnsortedEvents { site: place(site), index, start_time, previous_start }
            }
            Self::OverlappingEvents { site, index, start_time, previous_end } => {
                Self::OverlappingEvents { site: place(site), index, start_time, previous_end }
            }
            Self::NonFiniteValue { site, index } => Self::NonFiniteValue { site: place(site), index },
            other => other,
        }
    }
}
