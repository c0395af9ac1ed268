use crate::core::space::Playfield;
use crate::game::cache::FrameCache;
use crate::game::error::ChartError;
use crate::game::judge_line::JudgeLine;
use crate::game::note::{CrossedEdge, Note, NoteId, SIBLING_TOLERANCE, Side};
use log::{debug, info};
use smallvec::SmallVec;

/// Everything a host needs from one call to [`Chart::update`].
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub host_time: f32,
    /// Notes whose time was crossed on this step, in line order.
    pub edges: SmallVec<[CrossedEdge; 8]>,
}

/// Host times of a fixed-step playback from `start` through `end`. Each time
/// is derived from its frame index, so steps too small to register against a
/// large accumulated time never stall the sequence.
pub fn frame_times(start: f32, end: f32, step_ms: f32) -> impl Iterator<Item = f32> {
    let frames = if step_ms.is_finite() && step_ms > 0.0 && end >= start {
        ((f64::from(end) - f64::from(start)) / f64::from(step_ms)).floor() as u64 + 1
    } else {
        0
    };
    (0..frames).map(move |i| (f64::from(start) + i as f64 * f64::from(step_ms)) as f32)
}

#[derive(Debug, Clone)]
pub struct Chart {
    /// Audio-to-timeline alignment in milliseconds.
    pub offset_ms: f32,
    lines: Vec<JudgeLine>,
}

impl Chart {
    /// Takes ownership of a fully built line list. Each line's `index` must
    /// match its position so note ids resolve.
    pub fn from_lines(offset_ms: f32, lines: Vec<JudgeLine>) -> Result<Self, ChartError> {
        if let Some((position, line)) = lines.iter().enumerate().find(|(i, l)| l.index != *i) {
            return Err(ChartError::LineIndexMismatch { position, index: line.index });
        }
        Ok(Self { offset_ms, lines })
    }

    pub fn lines(&self) -> &[JudgeLine] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&JudgeLine> {
        self.lines.get(index)
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.lines.get(id.line)?.notes(id.side).get(id.index)
    }

    /// Every note in the chart with its address.
    pub fn notes(&self) -> impl Iterator<Item = (NoteId, &Note)> + '_ {
        self.lines.iter().flat_map(|line| line.iter_notes())
    }

    pub fn note_count(&self) -> usize {
        self.lines.iter().map(JudgeLine::note_count).sum()
    }

    /// Host time for a position in the audio track.
    #[inline(always)]
    pub fn host_time(&self, audio_seconds: f32) -> f32 {
        audio_seconds * 1000.0 + self.offset_ms
    }

    /// Host time of the last note's end (hold tails included), or 0 for an
    /// empty chart.
    pub fn end_time_ms(&self) -> f32 {
        self.lines
            .iter()
            .flat_map(|line| {
                line.iter_notes().map(move |(_, note)| line.real_time(note.end_time()))
            })
            .fold(0.0, f32::max)
    }

    /// A frame cache sized for this chart.
    pub fn frame_cache(&self) -> FrameCache {
        FrameCache::with_lines(self.lines.len())
    }

    /// Advances every line to `host_time`. Seeking backward is fine: all
    /// state is re-derived from the time, and crossing edges fire again when
    /// notes are re-crossed.
    pub fn update(&mut self, host_time: f32, frames: &mut FrameCache, playfield: &Playfield) -> FrameReport {
        let mut report = FrameReport { host_time, edges: SmallVec::new() };
        for line in &mut self.lines {
            let cache = frames.line_mut(line.index);
            report.edges.extend(line.update(host_time, cache, playfield));
        }
        report
    }

    /// Flags notes that share a time (within one unit) with another note on
    /// any line. Dummy notes never take part. Returns how many notes ended
    /// up flagged.
    pub fn solve_siblings(&mut self) -> usize {
        let judged: Vec<(NoteId, f32)> = self
            .notes()
            .filter(|(_, note)| !note.kind.is_dummy())
            .map(|(id, note)| (id, note.time))
            .collect();

        let mut flagged = vec![false; judged.len()];
        for (i, (_, t)) in judged.iter().enumerate() {
            for (j, (_, t2)) in judged.iter().enumerate().skip(i + 1) {
                if (t2 - t).abs() < SIBLING_TOLERANCE {
                    flagged[i] = true;
                    flagged[j] = true;
                }
            }
        }

        for line in &mut self.lines {
            for side in [Side::Above, Side::Below] {
                for note in line.notes_mut(side) {
                    note.set_sibling(false);
                }
            }
        }
        let mut count = 0;
        for ((id, _), flag) in judged.iter().zip(flagged) {
            if !flag {
                continue;
            }
            if let Some(note) = self.lines[id.line].notes_mut(id.side).get_mut(id.index) {
                note.set_sibling(true);
                count += 1;
            }
        }
        debug!("Sibling pass flagged {count} of {} notes.", judged.len());
        count
    }

    pub fn recalculate_floor_position(&mut self) {
        for line in &mut self.lines {
            line.recalculate_floor_position();
        }
        info!("Recalculated floor positions for {} judge lines.", self.lines.len());
    }
}
