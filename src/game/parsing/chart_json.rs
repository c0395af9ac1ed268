//! Native JSON chart format.
//!
//! Format versions below 3 pack move-event coordinates as `x * 1000 + y` on
//! an 880x520 grid; version 3 stores them normalized. Version 3 also always
//! carries explicit floor positions.

use crate::game::chart::Chart;
use crate::game::error::ChartError;
use crate::game::judge_line::{JudgeLine, LineEvents};
use crate::game::note::{Note, NoteKind, Side};
use crate::game::speed::{SpeedEvent, SpeedTrack};
use crate::game::timeline::StateEvent;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CURRENT_FORMAT_VERSION: u32 = 3;

const PACKED_GRID_WIDTH: f32 = 880.0;
const PACKED_GRID_HEIGHT: f32 = 520.0;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawChart {
    #[serde(default = "default_format_version")]
    format_version: u32,
    /// Seconds.
    #[serde(default)]
    offset: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num_of_notes: Option<usize>,
    judge_line_list: Vec<RawLine>,
}

fn default_format_version() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawLine {
    bpm: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num_of_notes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num_of_notes_above: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num_of_notes_below: Option<usize>,
    #[serde(default)]
    notes_above: Vec<RawNote>,
    #[serde(default)]
    notes_below: Vec<RawNote>,
    #[serde(default)]
    speed_events: Vec<RawSpeedEvent>,
    #[serde(default)]
    judge_line_move_events: Vec<StateEvent>,
    #[serde(default)]
    judge_line_rotate_events: Vec<StateEvent>,
    #[serde(default)]
    judge_line_disappear_events: Vec<StateEvent>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawNote {
    #[serde(rename = "type")]
    kind: i32,
    time: f32,
    #[serde(default)]
    position_x: f32,
    #[serde(default)]
    speed: Option<f32>,
    #[serde(default)]
    floor_position: Option<f32>,
    #[serde(default)]
    hold_time: f32,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawSpeedEvent {
    start_time: f32,
    end_time: f32,
    value: f32,
    #[serde(default)]
    floor_position: Option<f32>,
}

/// Reads a chart from its JSON text. Dummy notes are dropped unless
/// `with_dummy` is set. Sibling flags are solved before returning.
pub fn parse_chart(json: &str, with_dummy: bool) -> Result<Chart, ChartError> {
    let raw: RawChart = serde_json::from_str(json)?;
    if raw.format_version > CURRENT_FORMAT_VERSION {
        return Err(ChartError::UnsupportedFormat(raw.format_version));
    }

    let lines = raw
        .judge_line_list
        .into_iter()
        .enumerate()
        .map(|(index, line)| build_line(index, line, raw.format_version, with_dummy))
        .collect::<Result<Vec<_>, _>>()?;

    let mut chart = Chart::from_lines(raw.offset * 1000.0, lines)?;
    let siblings = chart.solve_siblings();
    info!(
        "Loaded chart (format {}): {} judge lines, {} notes, {} siblings, offset {:.0}ms.",
        raw.format_version,
        chart.lines().len(),
        chart.note_count(),
        siblings,
        chart.offset_ms
    );
    Ok(chart)
}

pub fn load_chart(path: &Path, with_dummy: bool) -> Result<Chart, ChartError> {
    let text = fs::read_to_string(path)?;
    debug!("Read {} bytes from '{}'.", text.len(), path.display());
    parse_chart(&text, with_dummy)
}

fn build_line(index: usize, raw: RawLine, version: u32, with_dummy: bool) -> Result<JudgeLine, ChartError> {
    if !(raw.bpm.is_finite() && raw.bpm > 0.0) {
        return Err(ChartError::InvalidBpm { line: index, bpm: raw.bpm });
    }

    let mut missing_floor = false;
    let speed_events: Vec<SpeedEvent> = raw
        .speed_events
        .iter()
        .map(|e| {
            missing_floor |= e.floor_position.is_none();
            SpeedEvent {
                start_time: e.start_time,
                end_time: e.end_time,
                value: e.value,
                floor_position: e.floor_position.unwrap_or(0.0),
            }
        })
        .collect();
    let speed = if missing_floor {
        if version >= CURRENT_FORMAT_VERSION {
            warn!("Line {index}: speed event without a floorPosition; recalculating.");
        }
        SpeedTrack::with_recalculated(speed_events, raw.bpm)
    } else {
        SpeedTrack::new(speed_events, raw.bpm)
    }
    .map_err(|e| e.at_line(index))?;

    let notes_above = build_notes(index, &raw.notes_above, &speed, with_dummy)?;
    let notes_below = build_notes(index, &raw.notes_below, &speed, with_dummy)?;

    let mut moves = raw.judge_line_move_events;
    if version < CURRENT_FORMAT_VERSION {
        for ev in &mut moves {
            unpack_move(ev);
        }
    }
    let mut rotations = raw.judge_line_rotate_events;
    let mut alphas = raw.judge_line_disappear_events;
    for list in [&mut moves, &mut rotations, &mut alphas] {
        list.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }

    let events = LineEvents { speed: speed.events().to_vec(), moves, rotations, alphas };
    let mut line = JudgeLine::new(index, raw.bpm, events, notes_above, notes_below)?;
    line.texture = raw.texture;
    Ok(line)
}

fn build_notes(line: usize, raw: &[RawNote], speed: &SpeedTrack, with_dummy: bool) -> Result<Vec<Note>, ChartError> {
    let mut notes = Vec::with_capacity(raw.len());
    for (index, n) in raw.iter().enumerate() {
        let kind = NoteKind::from_code(n.kind).ok_or(ChartError::UnknownNoteType { line, index, code: n.kind })?;
        if kind.is_dummy() && !with_dummy {
            continue;
        }
        let mut note = Note::new(kind, n.time, n.position_x)
            .with_speed(n.speed.unwrap_or_else(|| speed.speed_at(n.time)))
            .with_floor_position(n.floor_position.unwrap_or_else(|| speed.floor_position(n.time)));
        if kind.is_hold() {
            note.hold_time = n.hold_time;
        }
        notes.push(note);
    }
    Ok(notes)
}

// Start y rounds and end y floors; older exports depend on the asymmetry.
fn unpack_move(ev: &mut StateEvent) {
    let (start, end) = (ev.start, ev.end);
    ev.start = (start / 1000.0).floor() / PACKED_GRID_WIDTH;
    ev.start2 = (start % 1000.0).round() / PACKED_GRID_HEIGHT;
    ev.end = (end / 1000.0).floor() / PACKED_GRID_WIDTH;
    ev.end2 = (end % 1000.0).floor() / PACKED_GRID_HEIGHT;
}

/// Writes the chart in the current format version with explicit floor
/// positions and note counters.
pub fn to_json(chart: &Chart) -> Result<String, ChartError> {
    let judge_line_list: Vec<RawLine> = chart.lines().iter().map(export_line).collect();
    let raw = RawChart {
        format_version: CURRENT_FORMAT_VERSION,
        offset: chart.offset_ms / 1000.0,
        num_of_notes: Some(judge_line_list.iter().filter_map(|l| l.num_of_notes).sum()),
        judge_line_list,
    };
    Ok(serde_json::to_string(&raw)?)
}

fn export_line(line: &JudgeLine) -> RawLine {
    let export_notes = |side| -> Vec<RawNote> {
        line.notes(side)
            .iter()
            .map(|n| RawNote {
                kind: n.kind.code(),
                time: n.time,
                position_x: n.position_x,
                speed: Some(n.speed),
                floor_position: Some(n.floor_position),
                hold_time: n.hold_time,
            })
            .collect()
    };
    let notes_above = export_notes(Side::Above);
    let notes_below = export_notes(Side::Below);
    RawLine {
        bpm: line.bpm,
        texture: line.texture.clone(),
        num_of_notes: Some(notes_above.len() + notes_below.len()),
        num_of_notes_above: Some(notes_above.len()),
        num_of_notes_below: Some(notes_below.len()),
        notes_above,
        notes_below,
        speed_events: line
            .speed_track()
            .events()
            .iter()
            .map(|e| RawSpeedEvent {
                start_time: e.start_time,
                end_time: e.end_time,
                value: e.value,
                floor_position: Some(e.floor_position),
            })
            .collect(),
        judge_line_move_events: line.move_events().to_vec(),
        judge_line_rotate_events: line.rotate_events().to_vec(),
        judge_line_disappear_events: line.alpha_events().to_vec(),
    }
}

impl Chart {
    pub fn to_json(&self) -> Result<String, ChartError> {
        to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::note::NoteId;

    const LEGACY: &str = r#"{
        "formatVersion": 1,
        "offset": 0.25,
        "judgeLineList": [{
            "bpm": 120,
            "notesAbove": [
                {"type": 1, "time": 64, "positionX": 1.5, "speed": 1.0, "floorPosition": 1.0},
                {"type": 3, "time": 128, "positionX": 0, "speed": 1.0, "holdTime": 32},
                {"type": -1, "time": 64, "positionX": 0}
            ],
            "notesBelow": [
                {"type": 4, "time": 64.5, "positionX": -2}
            ],
            "speedEvents": [
                {"startTime": 0, "endTime": 64, "value": 1},
                {"startTime": 64, "endTime": 1000, "value": 2}
            ],
            "judgeLineMoveEvents": [
                {"startTime": 0, "endTime": 1000, "start": 440260, "end": 880520}
            ],
            "judgeLineRotateEvents": [
                {"startTime": 500, "endTime": 1000, "start": 90, "end": 90},
                {"startTime": 0, "endTime": 500, "start": 0, "end": 90}
            ],
            "judgeLineDisappearEvents": []
        }]
    }"#;

    #[test]
    fn legacy_move_values_are_unpacked() {
        let chart = parse_chart(LEGACY, false).unwrap();
        let ev = chart.lines()[0].move_events()[0];
        assert!((ev.start - 0.5).abs() < 1e-6);
        assert!((ev.start2 - 0.5).abs() < 1e-6);
        assert!((ev.end - 1.0).abs() < 1e-6);
        assert!((ev.end2 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn offset_is_read_in_seconds() {
        let chart = parse_chart(LEGACY, false).unwrap();
        assert_eq!(chart.offset_ms, 250.0);
    }

    #[test]
    fn state_events_are_sorted_on_load() {
        let chart = parse_chart(LEGACY, false).unwrap();
        let starts: Vec<f32> = chart.lines()[0].rotate_events().iter().map(|e| e.start_time).collect();
        assert_eq!(starts, vec![0.0, 500.0]);
    }

    #[test]
    fn missing_floor_positions_are_filled() {
        let chart = parse_chart(LEGACY, false).unwrap();
        let line = &chart.lines()[0];
        // 64 units at 120 BPM is one second.
        assert!((line.speed_track().events()[1].floor_position - 1.0).abs() < 1e-6);
        let hold = &line.notes(Side::Above)[1];
        assert!((hold.floor_position - 3.0).abs() < 1e-5);
        // Explicit values are kept as written.
        assert_eq!(line.notes(Side::Above)[0].floor_position, 1.0);
        // Missing speed takes the line's speed at the note.
        assert_eq!(line.notes(Side::Below)[0].speed, 2.0);
    }

    #[test]
    fn dummy_notes_follow_the_flag() {
        assert_eq!(parse_chart(LEGACY, false).unwrap().note_count(), 3);
        let chart = parse_chart(LEGACY, true).unwrap();
        assert_eq!(chart.note_count(), 4);
        let dummy = chart.note(NoteId { line: 0, side: Side::Above, index: 2 }).unwrap();
        assert_eq!(dummy.kind, NoteKind::Dummy);
        assert!(!dummy.has_sibling());
    }

    #[test]
    fn siblings_are_solved_on_load() {
        let chart = parse_chart(LEGACY, false).unwrap();
        assert!(chart.note(NoteId { line: 0, side: Side::Above, index: 0 }).unwrap().has_sibling());
        assert!(chart.note(NoteId { line: 0, side: Side::Below, index: 0 }).unwrap().has_sibling());
        assert!(!chart.note(NoteId { line: 0, side: Side::Above, index: 1 }).unwrap().has_sibling());
    }

    #[test]
    fn overlapping_events_fail_the_load() {
        let json = r#"{"formatVersion": 3, "judgeLineList": [{"bpm": 100,
            "judgeLineDisappearEvents": [
                {"startTime": 0, "endTime": 10, "start": 1, "end": 1},
                {"startTime": 5, "endTime": 20, "start": 1, "end": 0}
            ]}]}"#;
        let err = parse_chart(json, true).unwrap_err();
        assert!(matches!(err, ChartError::OverlappingEvents { index: 1, .. }), "got {err}");
    }

    #[test]
    fn missing_bpm_is_malformed() {
        let err = parse_chart(r#"{"judgeLineList": [{"notesAbove": []}]}"#, true).unwrap_err();
        assert!(matches!(err, ChartError::Json(_)));
    }

    #[test]
    fn rejects_unknown_note_types_and_versions() {
        let json = r#"{"formatVersion": 3, "judgeLineList": [{"bpm": 100,
            "notesBelow": [{"type": 9, "time": 1}]}]}"#;
        assert!(matches!(
            parse_chart(json, true).unwrap_err(),
            ChartError::UnknownNoteType { line: 0, index: 0, code: 9 }
        ));
        assert!(matches!(
            parse_chart(r#"{"formatVersion": 7, "judgeLineList": []}"#, true).unwrap_err(),
            ChartError::UnsupportedFormat(7)
        ));
    }

    #[test]
    fn export_reloads_as_current_format() {
        let chart = parse_chart(LEGACY, true).unwrap();
        let json = chart.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["formatVersion"], 3);
        assert_eq!(value["numOfNotes"], 4);
        assert_eq!(value["judgeLineList"][0]["numOfNotesBelow"], 1);

        let again = parse_chart(&json, true).unwrap();
        assert_eq!(again.offset_ms, chart.offset_ms);
        assert_eq!(again.lines()[0].move_events(), chart.lines()[0].move_events());
        let holds = |c: &Chart| c.notes().filter(|(_, n)| n.kind.is_hold()).map(|(_, n)| n.hold_time).sum::<f32>();
        assert_eq!(holds(&again), 32.0);
        assert_eq!(holds(&chart), 32.0);
    }
}
