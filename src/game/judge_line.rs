use crate::core::space::Playfield;
use crate::game::cache::LineCache;
use crate::game::error::{ChartError, TimelineKind};
use crate::game::note::{CrossedEdge, FRESH_CROSSING_UNITS, Note, NoteId, Side};
use crate::game::speed::{MS_PER_UNIT_AT_ONE_BPM, SpeedEvent, SpeedTrack};
use crate::game::timeline::{EventTimeline, StateEvent};
use glam::{Affine2, Mat2, Vec2};
use log::debug;
use smallvec::SmallVec;

/// Where a line sits when it has no move events.
pub const DEFAULT_LINE_POSITION: Vec2 = Vec2::new(0.5, 0.5);
/// Chart `positionX` units to normalized line width.
pub const NOTE_X_SCALE: f32 = 0.845 / 15.0;
/// Vertical stretch applied to the lateral offset of notes on tilted lines.
pub const NOTE_Y_STRETCH: f32 = 1.8;

/// Host milliseconds to line time units.
#[inline(always)]
pub fn line_time_from_ms(bpm: f32, ms: f32) -> f32 {
    ms * bpm / MS_PER_UNIT_AT_ONE_BPM
}

/// Line time units to host milliseconds.
#[inline(always)]
pub fn ms_from_line_time(bpm: f32, units: f32) -> f32 {
    units * MS_PER_UNIT_AT_ONE_BPM / bpm
}

/// Raw event lists for a line, in the order the chart lists them.
#[derive(Debug, Clone, Default)]
pub struct LineEvents {
    pub speed: Vec<SpeedEvent>,
    pub moves: Vec<StateEvent>,
    pub rotations: Vec<StateEvent>,
    pub alphas: Vec<StateEvent>,
}

/// Resolved state of a line at one host time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePose {
    /// Line space, 0..1 with y up.
    pub normalized: Vec2,
    /// Screen pixels, y down.
    pub position: Vec2,
    /// Degrees, counter-clockwise positive.
    pub rotation: f32,
    pub alpha: f32,
}

impl LinePose {
    /// Line-local frame in screen space. Local x runs along the line, local
    /// y points down-screen when the line is level. The angle is negated here
    /// because screen y grows downward.
    #[inline(always)]
    pub fn frame(&self) -> Affine2 {
        Affine2::from_angle_translation(-self.rotation.to_radians(), self.position)
    }
}

/// Where a note should be drawn this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotePlacement {
    /// Screen pixels of the note head.
    pub position: Vec2,
    /// Offset along the line, in pixels of the line-local frame.
    pub lateral: f32,
    /// Distance from the line in pixels, positive while approaching.
    pub scroll: f32,
    /// Pixel length of a hold body; zero for other notes.
    pub hold_length: f32,
    /// Line rotation in degrees.
    pub rotation: f32,
}

#[derive(Debug, Clone)]
pub struct JudgeLine {
    /// Position in the chart's line list.
    pub index: usize,
    /// Defines this line's private time scale (32 units per beat).
    pub bpm: f32,
    pub texture: Option<String>,
    speed: SpeedTrack,
    moves: EventTimeline<StateEvent>,
    rotations: EventTimeline<StateEvent>,
    alphas: EventTimeline<StateEvent>,
    notes_above: Vec<Note>,
    notes_below: Vec<Note>,
    /// Bumped whenever speed data changes so frame caches drop stale floors.
    revision: u64,
}

impl JudgeLine {
    /// Validates the event lists and takes ownership of the notes. Speed
    /// event floor positions are kept as given; see
    /// [`JudgeLine::recalculate_floor_position`].
    pub fn new(
        index: usize,
        bpm: f32,
        events: LineEvents,
        mut notes_above: Vec<Note>,
        mut notes_below: Vec<Note>,
    ) -> Result<Self, ChartError> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(ChartError::InvalidBpm { line: index, bpm });
        }
        let timeline = |events: Vec<StateEvent>, kind: TimelineKind| {
            EventTimeline::new(events, kind).map_err(|e| e.at_line(index))
        };
        let speed = SpeedTrack::new(events.speed, bpm).map_err(|e| e.at_line(index))?;
        let moves = timeline(events.moves, TimelineKind::Move)?;
        let rotations = timeline(events.rotations, TimelineKind::Rotate)?;
        let alphas = timeline(events.alphas, TimelineKind::Alpha)?;

        for note in notes_above.iter_mut().chain(notes_below.iter_mut()) {
            note.attach(index);
        }
        debug!(
            "Line {index}: bpm {bpm}, {} speed / {} move / {} rotate / {} alpha events, {} + {} notes.",
            speed.events().len(),
            moves.len(),
            rotations.len(),
            alphas.len(),
            notes_above.len(),
            notes_below.len()
        );

        Ok(Self {
            index,
            bpm,
            texture: None,
            speed,
            moves,
            rotations,
            alphas,
            notes_above,
            notes_below,
            revision: 0,
        })
    }

    #[inline(always)]
    pub fn convert_time(&self, host_time: f32) -> f32 {
        line_time_from_ms(self.bpm, host_time)
    }

    #[inline(always)]
    pub fn real_time(&self, line_time: f32) -> f32 {
        ms_from_line_time(self.bpm, line_time)
    }

    pub fn speed_track(&self) -> &SpeedTrack {
        &self.speed
    }

    /// Changes whenever the speed data is edited.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn move_events(&self) -> &[StateEvent] {
        self.moves.events()
    }

    pub fn rotate_events(&self) -> &[StateEvent] {
        self.rotations.events()
    }

    pub fn alpha_events(&self) -> &[StateEvent] {
        self.alphas.events()
    }

    pub fn notes(&self, side: Side) -> &[Note] {
        match side {
            Side::Above => &self.notes_above,
            Side::Below => &self.notes_below,
        }
    }

    pub(crate) fn notes_mut(&mut self, side: Side) -> &mut [Note] {
        match side {
            Side::Above => &mut self.notes_above,
            Side::Below => &mut self.notes_below,
        }
    }

    /// Every note with its address, above-side first.
    pub fn iter_notes(&self) -> impl Iterator<Item = (NoteId, &Note)> + '_ {
        let line = self.index;
        [Side::Above, Side::Below].into_iter().flat_map(move |side| {
            self.notes(side)
                .iter()
                .enumerate()
                .map(move |(index, note)| (NoteId { line, side, index }, note))
        })
    }

    pub fn note_count(&self) -> usize {
        self.notes_above.len() + self.notes_below.len()
    }

    /// Speed multiplier in effect at `host_time`.
    pub fn speed_at(&self, host_time: f32) -> f32 {
        self.speed.speed_at(self.convert_time(host_time))
    }

    /// Replaces the speed segments and recomputes every derived floor
    /// position, including the notes'.
    pub fn set_speed_events(&mut self, events: Vec<SpeedEvent>) -> Result<(), ChartError> {
        self.speed.set_events(events).map_err(|e| e.at_line(self.index))?;
        self.revision += 1;
        self.recalculate_notes_floor_position();
        Ok(())
    }

    pub fn recalculate_floor_position(&mut self) {
        self.speed.recalculate_floor_positions();
        self.revision += 1;
        self.recalculate_notes_floor_position();
    }

    pub fn recalculate_notes_floor_position(&mut self) {
        let speed = &self.speed;
        for note in self.notes_above.iter_mut().chain(self.notes_below.iter_mut()) {
            note.floor_position = speed.floor_position(note.time);
        }
    }

    /// Resolves the line's pose. The first query for a new host time starts
    /// a new frame in `cache`; repeated queries for the same time are served
    /// from it.
    pub fn resolve(&self, host_time: f32, cache: &mut LineCache, playfield: &Playfield) -> LinePose {
        cache.enter(host_time, self.revision);
        self.pose_at(host_time, cache, playfield)
    }

    // Pose at an arbitrary time within the current frame.
    fn pose_at(&self, host_time: f32, cache: &mut LineCache, playfield: &Playfield) -> LinePose {
        let t = self.convert_time(host_time);
        let normalized = cache.position(host_time, || {
            self.moves.sample(t).map_or(DEFAULT_LINE_POSITION, |(x, y)| Vec2::new(x, y))
        });
        let rotation = cache.rotation(host_time, || self.rotations.sample(t).map_or(0.0, |(r, _)| r));
        let alpha = cache.alpha(host_time, || self.alphas.sample(t).map_or(1.0, |(a, _)| a));
        LinePose {
            normalized,
            position: playfield.to_screen(normalized),
            rotation,
            alpha,
        }
    }

    /// Scroll distance at `line_time`, memoized for the frame.
    #[inline(always)]
    pub fn floor_position_at(&self, line_time: f32, cache: &mut LineCache) -> f32 {
        cache.floor(line_time, || self.speed.floor_position(line_time))
    }

    pub fn current_floor_position(&self, host_time: f32, cache: &mut LineCache) -> f32 {
        cache.enter(host_time, self.revision);
        self.floor_position_at(self.convert_time(host_time), cache)
    }

    /// Absolute scroll height of `line_time` in pixels.
    pub fn y_position(&self, line_time: f32, cache: &mut LineCache, playfield: &Playfield) -> f32 {
        self.floor_position_at(line_time, cache) * playfield.scroll_unit()
    }

    /// Offset of a note along the line in the line-local frame. The local
    /// offset is rotated into line space, mapped to screen pixels with the
    /// vertical part stretched for aspect, then rotated again so tilted lines
    /// spread notes over the taller axis.
    pub fn lateral_offset(position_x: f32, rotation: f32, playfield: &Playfield) -> f32 {
        let rot = Mat2::from_angle(rotation.to_radians());
        let in_line = rot * Vec2::new(NOTE_X_SCALE * position_x, 0.0);
        let on_screen = playfield.to_screen(in_line) - Vec2::new(playfield.pad, playfield.height);
        let stretched = Vec2::new(
            on_screen.x,
            on_screen.y * NOTE_Y_STRETCH * playfield.note_aspect_factor(),
        );
        (rot * stretched).x
    }

    pub fn place_note(
        &self,
        note: &Note,
        side: Side,
        host_time: f32,
        cache: &mut LineCache,
        playfield: &Playfield,
    ) -> NotePlacement {
        cache.enter(host_time, self.revision);
        let pose = self.pose_at(host_time, cache, playfield);
        let current = self.floor_position_at(self.convert_time(host_time), cache);
        let unit = playfield.scroll_unit();

        let mut scroll = (note.floor_position - current) * unit;
        if !note.kind.is_hold() && !playfield.unique_speed {
            scroll *= note.speed;
        }
        let hold_length = if note.kind.is_hold() {
            (self.floor_position_at(note.end_time(), cache) - self.floor_position_at(note.time, cache)) * unit
        } else {
            0.0
        };

        let lateral = Self::lateral_offset(note.position_x, pose.rotation, playfield);
        let local = Vec2::new(lateral, -scroll * side.sign());
        NotePlacement {
            position: pose.frame().transform_point2(local),
            lateral,
            scroll,
            hold_length,
            rotation: pose.rotation,
        }
    }

    /// Starts a new frame for this line and re-evaluates every note's
    /// lifecycle. Returns the notes that crossed their time on this step.
    pub fn update(
        &mut self,
        host_time: f32,
        cache: &mut LineCache,
        playfield: &Playfield,
    ) -> SmallVec<[CrossedEdge; 4]> {
        cache.restart(host_time, self.revision);
        let line_time = self.convert_time(host_time);
        let bpm = self.bpm;

        let mut crossed: SmallVec<[(Side, usize); 4]> = SmallVec::new();
        for side in [Side::Above, Side::Below] {
            for (index, note) in self.notes_mut(side).iter_mut().enumerate() {
                let clear_time = note.clear_time_at_bpm(bpm);
                if note.step(line_time, clear_time) {
                    crossed.push((side, index));
                }
            }
        }

        crossed
            .into_iter()
            .map(|(side, index)| {
                let note = &self.notes(side)[index];
                let lateness = line_time - note.time;
                // Hold effects follow the current frame, taps the instant they
                // were due. The offset along the line always uses the current
                // rotation.
                let at = if note.kind.is_hold() { host_time } else { self.real_time(note.time) };
                let rotation_now = self.pose_at(host_time, cache, playfield).rotation;
                let pose = self.pose_at(at, cache, playfield);
                let lateral = Self::lateral_offset(note.position_x, rotation_now, playfield);
                CrossedEdge {
                    note: NoteId { line: self.index, side, index },
                    kind: note.kind,
                    lateness,
                    fresh: lateness < FRESH_CROSSING_UNITS,
                    hit_point: pose.frame().transform_point2(Vec2::new(lateral, 0.0)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::note::NoteKind;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-2
    }

    fn moving_line() -> JudgeLine {
        let events = LineEvents {
            speed: vec![SpeedEvent::new(0.0, 1000.0, 1.0), SpeedEvent::new(1000.0, 4000.0, 2.0)],
            moves: vec![StateEvent::new_pair(0.0, 1000.0, (0.0, 0.5), (1.0, 0.5))],
            rotations: vec![StateEvent::new(0.0, 1000.0, 0.0, 90.0)],
            alphas: vec![StateEvent::new(0.0, 1000.0, 0.0, 1.0)],
        };
        let mut line = JudgeLine::new(
            0,
            1875.0,
            events,
            vec![Note::new(NoteKind::Tap, 2000.0, 0.0), Note::hold(500.0, 0.0, 1000.0)],
            vec![Note::new(NoteKind::Tap, 2000.0, 0.0)],
        )
        .unwrap();
        line.recalculate_floor_position();
        line
    }

    #[test]
    fn rejects_bad_bpm() {
        let err = JudgeLine::new(3, 0.0, LineEvents::default(), Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, ChartError::InvalidBpm { line: 3, .. }));
    }

    #[test]
    fn timeline_errors_name_the_line() {
        let events = LineEvents {
            alphas: vec![StateEvent::new(0.0, 10.0, 1.0, 1.0), StateEvent::new(5.0, 20.0, 1.0, 1.0)],
            ..LineEvents::default()
        };
        let err = JudgeLine::new(4, 120.0, events, Vec::new(), Vec::new()).unwrap_err();
        assert!(err.to_string().starts_with("line 4 alpha events"), "got {err}");
    }

    #[test]
    fn idle_line_sits_at_screen_center() {
        let line = JudgeLine::new(0, 120.0, LineEvents::default(), Vec::new(), Vec::new()).unwrap();
        let mut cache = LineCache::new();
        let pose = line.resolve(1234.0, &mut cache, &Playfield::default());
        assert_eq!(pose.normalized, DEFAULT_LINE_POSITION);
        assert_eq!(pose.position, Vec2::new(960.0, 540.0));
        assert_eq!(pose.rotation, 0.0);
        assert_eq!(pose.alpha, 1.0);
    }

    #[test]
    fn resolve_interpolates_and_maps_to_screen() {
        let line = moving_line();
        let mut cache = LineCache::new();
        let pose = line.resolve(250.0, &mut cache, &Playfield::default());
        assert!((pose.normalized.x - 0.25).abs() < 1e-6);
        assert!(close(pose.position, Vec2::new(480.0, 540.0)));
        assert!((pose.rotation - 22.5).abs() < 1e-4);
        assert!((pose.alpha - 0.25).abs() < 1e-6);
    }

    #[test]
    fn repeated_resolve_is_cached_and_identical() {
        let line = moving_line();
        let mut cache = LineCache::new();
        let pf = Playfield::default();
        let a = line.resolve(321.0, &mut cache, &pf);
        let lookups = cache.lookups();
        let b = line.resolve(321.0, &mut cache, &pf);
        assert_eq!(cache.lookups(), lookups, "second resolve should not touch the timelines");
        assert_eq!(a.position.x.to_bits(), b.position.x.to_bits());
        assert_eq!(a.position.y.to_bits(), b.position.y.to_bits());
        assert_eq!(a.rotation.to_bits(), b.rotation.to_bits());
        assert_eq!(a.alpha.to_bits(), b.alpha.to_bits());

        // A new host time opens a new frame.
        line.resolve(322.0, &mut cache, &pf);
        assert!(cache.lookups() > lookups);
    }

    #[test]
    fn notes_scroll_toward_the_line() {
        let line = moving_line();
        let pf = Playfield::default();
        let mut cache = LineCache::new();
        // Past the move/rotate events the line rests at their end values:
        // x = 1.0 (right edge), rotated 90 degrees.
        let host = 1500.0;
        let above = &line.notes(Side::Above)[0];
        let placed = line.place_note(above, Side::Above, host, &mut cache, &pf);
        // floor(2000) = 1 + 2 = 3, floor(1500) = 1 + 1 = 2 at one unit per ms.
        assert!((placed.scroll - 1.0 * pf.scroll_unit()).abs() < 1e-2);
        assert_eq!(placed.rotation, 90.0);
        // Rotated by 90 degrees the scroll axis lies along screen x.
        let line_pos = Vec2::new(1920.0, 540.0);
        assert!(close(placed.position, line_pos + Vec2::new(-placed.scroll, 0.0)), "{:?}", placed.position);

        let below = &line.notes(Side::Below)[0];
        let placed = line.place_note(below, Side::Below, host, &mut cache, &pf);
        assert!(close(placed.position, line_pos + Vec2::new(placed.scroll, 0.0)), "{:?}", placed.position);
    }

    #[test]
    fn lateral_offset_follows_rotation() {
        let pf = Playfield::default();
        let x = 1.0 / NOTE_X_SCALE;
        assert!((JudgeLine::lateral_offset(x, 0.0, &pf) - 1920.0).abs() < 1e-2);
        assert!((JudgeLine::lateral_offset(x, 90.0, &pf) - 1080.0 * NOTE_Y_STRETCH).abs() < 1e-1);
        assert_eq!(JudgeLine::lateral_offset(0.0, 37.0, &pf), 0.0);
    }

    #[test]
    fn note_on_level_line_is_offset_sideways() {
        let notes = vec![Note::new(NoteKind::Tap, 100.0, 1.0 / NOTE_X_SCALE / 4.0)];
        let line = JudgeLine::new(0, 1875.0, LineEvents::default(), notes, Vec::new()).unwrap();
        let mut cache = LineCache::new();
        let note = &line.notes(Side::Above)[0];
        let placed = note.screen_position(Side::Above, &line, 0.0, &mut cache, &Playfield::default());
        // No speed events: nothing scrolls, the note sits on the line.
        assert_eq!(placed.scroll, 0.0);
        assert!(close(placed.position, Vec2::new(960.0 + 480.0, 540.0)));
    }

    #[test]
    fn hold_length_spans_its_duration() {
        let line = moving_line();
        let pf = Playfield::default();
        let mut cache = LineCache::new();
        let hold = &line.notes(Side::Above)[1];
        let placed = line.place_note(hold, Side::Above, 0.0, &mut cache, &pf);
        // floor(1500) - floor(500) = 2.0 - 0.5
        assert!((placed.hold_length - 1.5 * pf.scroll_unit()).abs() < 1e-2);
    }

    #[test]
    fn unique_speed_ignores_note_speed() {
        let notes = vec![Note::new(NoteKind::Tap, 1000.0, 0.0).with_speed(2.0)];
        let events = LineEvents { speed: vec![SpeedEvent::new(0.0, 5000.0, 1.0)], ..LineEvents::default() };
        let mut line = JudgeLine::new(0, 1875.0, events, notes, Vec::new()).unwrap();
        line.recalculate_floor_position();
        let note = &line.notes(Side::Above)[0];

        let mut pf = Playfield::default();
        let mut cache = LineCache::new();
        let fast = line.place_note(note, Side::Above, 0.0, &mut cache, &pf).scroll;
        pf.unique_speed = true;
        let plain = line.place_note(note, Side::Above, 0.0, &mut cache, &pf).scroll;
        assert!((fast - 2.0 * plain).abs() < 1e-3);
    }

    #[test]
    fn update_reports_edges_with_hit_points() {
        let mut line = moving_line();
        let mut cache = LineCache::new();
        let pf = Playfield::default();
        let edges = line.update(600.0, &mut cache, &pf);
        assert_eq!(edges.len(), 1);
        let edge = edges[0];
        assert_eq!(edge.kind, NoteKind::Hold);
        assert_eq!(edge.note, NoteId { line: 0, side: Side::Above, index: 1 });
        assert!((edge.lateness - 100.0).abs() < 1e-3);
        assert!(!edge.fresh);
        // Hold hit point follows the line at the current frame.
        let pose = line.resolve(600.0, &mut cache, &pf);
        assert!(close(edge.hit_point, pose.position));

        let edges = line.update(2000.0, &mut cache, &pf);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.fresh));
    }

    #[test]
    fn recalculation_touches_both_sides() {
        let line = moving_line();
        assert!((line.notes(Side::Above)[0].floor_position - 3.0).abs() < 1e-5);
        assert!((line.notes(Side::Below)[0].floor_position - 3.0).abs() < 1e-5);
        assert!((line.notes(Side::Above)[1].floor_position - 0.5).abs() < 1e-5);
    }

    #[test]
    fn set_speed_events_refreshes_notes() {
        let mut line = moving_line();
        line.set_speed_events(vec![SpeedEvent::new(0.0, 4000.0, 0.5)]).unwrap();
        assert!((line.notes(Side::Below)[0].floor_position - 1.0).abs() < 1e-5);
    }

    #[test]
    fn speed_edit_at_unchanged_time_refreshes_placement() {
        let notes = vec![Note::new(NoteKind::Tap, 2000.0, 0.0)];
        let events = LineEvents { speed: vec![SpeedEvent::new(0.0, 4000.0, 1.0)], ..LineEvents::default() };
        let mut line = JudgeLine::new(0, 1875.0, events, notes, Vec::new()).unwrap();
        line.recalculate_floor_position();
        let pf = Playfield::default();
        let mut cache = LineCache::new();

        let note = line.notes(Side::Above)[0].clone();
        let before = line.place_note(&note, Side::Above, 1000.0, &mut cache, &pf).scroll;
        assert!((before - pf.scroll_unit()).abs() < 1e-2);

        line.set_speed_events(vec![SpeedEvent::new(0.0, 4000.0, 0.5)]).unwrap();
        let note = line.notes(Side::Above)[0].clone();
        let after = line.place_note(&note, Side::Above, 1000.0, &mut cache, &pf).scroll;
        assert!((after - 0.5 * pf.scroll_unit()).abs() < 1e-2, "stale scroll {after}");
        assert!((line.current_floor_position(1000.0, &mut cache) - 0.5).abs() < 1e-5);
        assert_eq!(cache.revision(), line.revision());
    }

    #[test]
    fn tap_hit_point_uses_current_rotation_along_the_line() {
        let x = 1.0 / NOTE_X_SCALE / 4.0;
        let events = LineEvents {
            rotations: vec![StateEvent::new(0.0, 1000.0, 0.0, 90.0)],
            ..LineEvents::default()
        };
        let mut line =
            JudgeLine::new(0, 1875.0, events, vec![Note::new(NoteKind::Tap, 500.0, x)], Vec::new()).unwrap();
        let pf = Playfield::default();
        let mut cache = LineCache::new();
        let edges = line.update(1000.0, &mut cache, &pf);
        assert_eq!(edges.len(), 1);

        // Offset measured at the current 90 degrees (0.25 * 1080 * 1.8 = 486),
        // laid along the line as it stood at the note's time (45 degrees).
        let along = 486.0 * std::f32::consts::FRAC_1_SQRT_2;
        assert!(close(edges[0].hit_point, Vec2::new(960.0 + along, 540.0 - along)), "{:?}", edges[0].hit_point);
    }

    #[test]
    fn iter_notes_addresses_every_note() {
        let line = moving_line();
        let ids: Vec<NoteId> = line.iter_notes().map(|(id, _)| id).collect();
        assert_eq!(ids.len(), line.note_count());
        assert_eq!(ids[2], NoteId { line: 0, side: Side::Below, index: 0 });
    }
}
