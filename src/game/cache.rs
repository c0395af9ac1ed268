use glam::Vec2;
use rustc_hash::FxHashMap;

/// Per-line memo of timeline lookups for one frame.
///
/// A line's pose and floor position get queried once for the line itself and
/// again for every note it owns, all at the same instant. The cache is keyed
/// by exact time value and must be cleared with [`LineCache::begin_frame`]
/// before the line is resolved for a new frame; it is never shared between
/// lines. It also remembers the line revision it was filled against, so
/// edits to a line's speed events invalidate it even at an unchanged time.
#[derive(Debug, Default, Clone)]
pub struct LineCache {
    frame_time: Option<f32>,
    position: FxHashMap<u32, Vec2>,
    rotation: FxHashMap<u32, f32>,
    alpha: FxHashMap<u32, f32>,
    floor: FxHashMap<u32, f32>,
    revision: u64,
    lookups: u64,
}

#[inline(always)]
fn key(time: f32) -> u32 {
    // Adding zero folds -0.0 into 0.0 so both hit the same slot.
    (time + 0.0).to_bits()
}

impl LineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything memoized for the previous frame.
    pub fn begin_frame(&mut self, host_time: f32) {
        self.position.clear();
        self.rotation.clear();
        self.alpha.clear();
        self.floor.clear();
        self.frame_time = Some(host_time);
    }

    /// Starts a new frame unless the cache already holds `host_time` for
    /// this `revision` of the line.
    pub(crate) fn enter(&mut self, host_time: f32, revision: u64) {
        if self.frame_time != Some(host_time) || self.revision != revision {
            self.restart(host_time, revision);
        }
    }

    /// Unconditional [`LineCache::begin_frame`] tagged with a line revision.
    pub(crate) fn restart(&mut self, host_time: f32, revision: u64) {
        self.begin_frame(host_time);
        self.revision = revision;
    }

    /// Line revision the memoized values were computed against.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Host time passed to the last [`LineCache::begin_frame`].
    pub fn frame_time(&self) -> Option<f32> {
        self.frame_time
    }

    /// Number of timeline lookups that missed the cache since creation.
    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    #[inline(always)]
    pub(crate) fn position(&mut self, host_time: f32, compute: impl FnOnce() -> Vec2) -> Vec2 {
        memo(&mut self.position, &mut self.lookups, host_time, compute)
    }

    #[inline(always)]
    pub(crate) fn rotation(&mut self, host_time: f32, compute: impl FnOnce() -> f32) -> f32 {
        memo(&mut self.rotation, &mut self.lookups, host_time, compute)
    }

    #[inline(always)]
    pub(crate) fn alpha(&mut self, host_time: f32, compute: impl FnOnce() -> f32) -> f32 {
        memo(&mut self.alpha, &mut self.lookups, host_time, compute)
    }

    /// Keyed by line time rather than host time.
    #[inline(always)]
    pub(crate) fn floor(&mut self, line_time: f32, compute: impl FnOnce() -> f32) -> f32 {
        memo(&mut self.floor, &mut self.lookups, line_time, compute)
    }
}

#[inline(always)]
fn memo<T: Copy>(map: &mut FxHashMap<u32, T>, lookups: &mut u64, time: f32, compute: impl FnOnce() -> T) -> T {
    *map.entry(key(time)).or_insert_with(|| {
        *lookups += 1;
        compute()
    })
}

/// One [`LineCache`] per judge line, indexed like the chart's line list.
/// Owned by the host's frame loop and handed to [`crate::game::chart::Chart::update`].
#[derive(Debug, Default, Clone)]
pub struct FrameCache {
    lines: Vec<LineCache>,
}

impl FrameCache {
    pub fn with_lines(count: usize) -> Self {
        Self { lines: vec![LineCache::default(); count] }
    }

    pub fn line(&self, index: usize) -> Option<&LineCache> {
        self.lines.get(index)
    }

    /// Grows on demand so a cache built for a smaller chart stays usable.
    pub fn line_mut(&mut self, index: usize) -> &mut LineCache {
        if index >= self.lines.len() {
            self.lines.resize_with(index + 1, LineCache::default);
        }
        &mut self.lines[index]
    }

    pub fn total_lookups(&self) -> u64 {
        self.lines.iter().map(LineCache::lookups).sum()
    }
}
