use crate::core::space::Playfield;
use crate::game::cache::LineCache;
use crate::game::judge_line::{JudgeLine, NotePlacement, line_time_from_ms, ms_from_line_time};
use glam::Vec2;

/// Floor-position distance beyond which a note is not worth drawing.
pub const CULL_DISTANCE: f32 = 10.0;
/// Real time (ms) a hold is judged before its tail reaches the line.
pub const HOLD_CLEAR_LOOKBACK_MS: f32 = 250.0;
/// Real time (ms) a missed note takes to fade out.
pub const MISS_FADE_MS: f32 = 250.0;
/// Crossings later than this (line units) are treated as skipped over.
pub const FRESH_CROSSING_UNITS: f32 = 10.0;
/// Notes closer than this (line units) are grouped as siblings.
pub const SIBLING_TOLERANCE: f32 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NoteKind {
    Tap,
    Catch,
    Hold,
    Flick,
    /// Scrolls like a tap but is never judged.
    Dummy,
}

impl NoteKind {
    /// Numeric type used by the native chart format.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Tap),
            2 => Some(Self::Catch),
            3 => Some(Self::Hold),
            4 => Some(Self::Flick),
            -1 => Some(Self::Dummy),
            _ => None,
        }
    }

    pub const fn code(&self) -> i32 {
        match self {
            Self::Tap => 1,
            Self::Catch => 2,
            Self::Hold => 3,
            Self::Flick => 4,
            Self::Dummy => -1,
        }
    }

    #[inline(always)]
    pub const fn is_hold(&self) -> bool {
        matches!(self, Self::Hold)
    }

    #[inline(always)]
    pub const fn is_dummy(&self) -> bool {
        matches!(self, Self::Dummy)
    }
}

/// Which side of its line a note scrolls in from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Above,
    Below,
}

impl Side {
    /// Sign of the scroll axis in the line's local frame.
    #[inline(always)]
    pub const fn sign(&self) -> f32 {
        match self {
            Self::Above => 1.0,
            Self::Below => -1.0,
        }
    }
}

/// Stable address of a note inside a chart.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NoteId {
    pub line: usize,
    pub side: Side,
    pub index: usize,
}

/// Lifecycle of a note relative to the current host time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoteState {
    Approaching,
    /// Past the note's time but not yet at its clear time (holds in progress).
    Crossed,
    Cleared,
    Missed,
}

/// One-shot crossing of a note's time, reported once per pass.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CrossedEdge {
    pub note: NoteId,
    pub kind: NoteKind,
    /// How far past the note's time the crossing was observed, in line units.
    pub lateness: f32,
    /// False when the frame jumped well past the note (seek, hitch); hosts
    /// usually skip hit sounds for those.
    pub fresh: bool,
    /// Screen position where hit effects should spawn.
    pub hit_point: Vec2,
}

#[derive(Clone, Debug)]
pub struct Note {
    pub kind: NoteKind,
    /// Line time units.
    pub time: f32,
    /// Lateral offset along the line in chart units.
    pub position_x: f32,
    pub speed: f32,
    /// Scroll distance at `time`.
    pub floor_position: f32,
    /// Line time units; zero for everything but holds.
    pub hold_time: f32,
    parent: Option<usize>,
    has_sibling: bool,
    crossed: bool,
    cleared: bool,
}

impl Note {
    pub fn new(kind: NoteKind, time: f32, position_x: f32) -> Self {
        Self {
            kind,
            time,
            position_x,
            speed: 1.0,
            floor_position: 0.0,
            hold_time: 0.0,
            parent: None,
            has_sibling: false,
            crossed: false,
            cleared: false,
        }
    }

    pub fn hold(time: f32, position_x: f32, hold_time: f32) -> Self {
        Self { hold_time, ..Self::new(NoteKind::Hold, time, position_x) }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_floor_position(mut self, floor_position: f32) -> Self {
        self.floor_position = floor_position;
        self
    }

    /// Index of the owning judge line. Set once when the line is built.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub(crate) fn attach(&mut self, line: usize) {
        debug_assert!(
            self.parent.is_none_or(|p| p == line),
            "note already belongs to line {:?}",
            self.parent
        );
        self.parent = Some(line);
    }

    pub fn has_sibling(&self) -> bool {
        self.has_sibling
    }

    pub(crate) fn set_sibling(&mut self, value: bool) {
        self.has_sibling = value;
    }

    pub fn crossed(&self) -> bool {
        self.crossed
    }

    pub fn cleared(&self) -> bool {
        self.cleared
    }

    pub fn end_time(&self) -> f32 {
        self.time + self.hold_time
    }

    #[inline(always)]
    fn check_parent(&self, line: &JudgeLine) {
        debug_assert_eq!(self.parent, Some(line.index), "note queried through a foreign line");
    }

    /// Line time at which the note counts as judged. Holds clear a little
    /// before their tail so the judged state shows while the body finishes.
    #[inline(always)]
    pub fn clear_time(&self, line: &JudgeLine) -> f32 {
        self.clear_time_at_bpm(line.bpm)
    }

    #[inline(always)]
    pub(crate) fn clear_time_at_bpm(&self, bpm: f32) -> f32 {
        if !self.kind.is_hold() {
            return self.time;
        }
        let early = line_time_from_ms(bpm, ms_from_line_time(bpm, self.end_time()) - HOLD_CLEAR_LOOKBACK_MS);
        self.time.max(early)
    }

    /// Re-evaluates the lifecycle flags at `line_time`. Returns true exactly
    /// when the note crosses its time on this step.
    pub(crate) fn step(&mut self, line_time: f32, clear_time: f32) -> bool {
        let cleared = line_time >= clear_time;
        let crossed = line_time >= self.time;
        if !cleared {
            self.cleared = false;
        }
        if !crossed {
            self.crossed = false;
        }
        if cleared && !self.cleared && !self.kind.is_dummy() {
            self.cleared = true;
        }
        if crossed && !self.crossed {
            self.crossed = true;
            return !self.kind.is_dummy();
        }
        false
    }

    #[inline(always)]
    fn missed_at(&self, line_time: f32, clear_time: f32) -> bool {
        match self.kind {
            // Holds never report a miss, and dummies are never judged.
            NoteKind::Hold | NoteKind::Dummy => false,
            _ => line_time > clear_time && !self.cleared,
        }
    }

    pub fn is_missed(&self, line: &JudgeLine, host_time: f32) -> bool {
        self.check_parent(line);
        self.missed_at(line.convert_time(host_time), self.clear_time(line))
    }

    pub fn state(&self, line: &JudgeLine, host_time: f32) -> NoteState {
        self.check_parent(line);
        if !self.crossed {
            NoteState::Approaching
        } else if self.is_missed(line, host_time) {
            NoteState::Missed
        } else if self.cleared {
            NoteState::Cleared
        } else {
            NoteState::Crossed
        }
    }

    /// Hold that has been crossed and whose tail has not reached the line.
    pub fn is_holding(&self, line: &JudgeLine, host_time: f32) -> bool {
        self.check_parent(line);
        self.kind.is_hold() && self.crossed && line.convert_time(host_time) < self.end_time()
    }

    /// Draw culling only; has no effect on judgement.
    pub fn is_off_screen(&self, line: &JudgeLine, host_time: f32, cache: &mut LineCache) -> bool {
        self.check_parent(line);
        if self.kind.is_hold() {
            let t = line.convert_time(host_time);
            if t >= self.time && t <= self.end_time() {
                return false;
            }
        }
        (self.floor_position - line.current_floor_position(host_time, cache)).abs() > CULL_DISTANCE
    }

    /// Draw opacity: missed notes fade from half opacity to nothing.
    pub fn alpha(&self, line: &JudgeLine, host_time: f32) -> f32 {
        if !self.is_missed(line, host_time) {
            return 1.0;
        }
        let t = line.convert_time(host_time);
        let clear_time = self.clear_time(line);
        if t < clear_time {
            return 1.0;
        }
        let gone_at = line.convert_time(line.real_time(clear_time) + MISS_FADE_MS);
        let progress = ((t - clear_time) / (gone_at - clear_time)).clamp(0.0, 1.0);
        0.5 * (1.0 - progress)
    }

    pub fn screen_position(
        &self,
        side: Side,
        line: &JudgeLine,
        host_time: f32,
        cache: &mut LineCache,
        playfield: &Playfield,
    ) -> NotePlacement {
        self.check_parent(line);
        line.place_note(self, side, host_time, cache, playfield)
    }
}
