use glam::Vec2;

/// Aspect ratio the note sizes were authored against.
pub const REFERENCE_ASPECT: f32 = 1920.0 / 1080.0;
/// Wider screens get pillarboxed down to this ratio.
pub const DEFAULT_MAX_ASPECT: f32 = 16.0 / 9.0;
/// Screen heights of scroll per unit of floor position.
pub const SCROLL_HEIGHT_FRACTION: f32 = 0.6;

/// Screen geometry supplied by the renderer host. All values are in pixels,
/// y grows downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playfield {
    pub width: f32,
    pub height: f32,
    /// Horizontal padding on each side of the playable area.
    pub pad: f32,
    /// Ignore per-note speed multipliers for non-hold notes.
    pub unique_speed: bool,
}

impl Default for Playfield {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

impl Playfield {
    pub fn new(width: f32, height: f32) -> Self {
        Self::with_max_aspect(width, height, DEFAULT_MAX_ASPECT)
    }

    pub fn with_max_aspect(width: f32, height: f32, max_aspect: f32) -> Self {
        let pad = if height > 0.0 && width / height > max_aspect {
            (width - height * max_aspect) / 2.0
        } else {
            0.0
        };
        Self::with_pad(width, height, pad)
    }

    pub fn with_pad(width: f32, height: f32, pad: f32) -> Self {
        Self { width, height, pad, unique_speed: false }
    }

    #[inline(always)]
    pub fn content_width(&self) -> f32 {
        self.width - self.pad * 2.0
    }

    #[inline(always)]
    pub fn center_x(&self) -> f32 {
        self.content_width() * 0.5 + self.pad
    }

    /// Maps normalized line space (0..1, y up) to screen pixels.
    #[inline(always)]
    pub fn to_screen(&self, normalized: Vec2) -> Vec2 {
        let cw = self.content_width();
        let ch = self.height;
        Vec2::new(
            self.center_x() + (normalized.x - 0.5) * cw,
            ch - 0.5 * ch - (normalized.y - 0.5) * ch,
        )
    }

    /// Shrink applied to note layout on screens narrower than the reference
    /// aspect ratio.
    #[inline(always)]
    pub fn note_aspect_factor(&self) -> f32 {
        if self.height <= 0.0 {
            return 1.0;
        }
        let aspect = self.content_width() / self.height;
        if aspect < REFERENCE_ASPECT {
            1.0 + (aspect / REFERENCE_ASPECT - 1.0) * 0.8
        } else {
            1.0
        }
    }

    /// Pixels per unit of floor position.
    #[inline(always)]
    pub fn scroll_unit(&self) -> f32 {
        self.height * SCROLL_HEIGHT_FRACTION
    }
}
