//! Distance-field text layout.
//!
//! Fonts are rasterised at [`NORMAL_FONT_SIZE`]; all metrics are in those units and
//! scaled by `text_size / NORMAL_FONT_SIZE` on placement. Lines are one font size
//! tall and the first baseline sits three quarters of a line below the top.

use std::fmt;
use std::sync::Arc;

use glam::Vec2;
use parking_lot::RwLock;
use sprocket_core::alloc::HashMap;

use crate::texture::TextureId;

/// Size at which font atlases are rasterised.
pub const NORMAL_FONT_SIZE: f32 = 32.0;

const BASELINE: f32 = 0.75;

/// Metrics of one glyph, in font units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub size: Vec2,
    pub offset: Vec2,
    pub x_advance: f32,
    /// Placement in the font atlas as `(u0, v0, u1, v1)`.
    pub uv_rect: [f32; 4],
}

/// A font atlas as seen by layout and the batcher.
pub trait Font: Send + Sync + fmt::Debug {
    /// Id of the atlas texture.
    fn id(&self) -> TextureId;

    /// Line height in font units.
    fn font_size(&self) -> f32;

    fn is_loaded(&self) -> bool;

    fn glyph(&self, character: char) -> Option<GlyphMetrics>;

    /// Changes whenever glyph placement in the atlas changes, e.g. after a repack.
    fn generation(&self) -> u64 {
        0
    }
}

pub type FontRef = Arc<dyn Font>;

#[derive(Debug, Default)]
struct GlyphState {
    glyphs: HashMap<char, GlyphMetrics>,
    generation: u64,
}

/// A [`Font`] backed by a glyph table that can be repacked while shared.
///
/// Every insert bumps the generation, so glyphs already placed pick up their new
/// atlas placement on the next pass.
#[derive(Debug)]
pub struct GlyphTable {
    id: TextureId,
    font_size: f32,
    state: RwLock<GlyphState>,
}

impl GlyphTable {
    pub fn new(id: TextureId, font_size: f32) -> Self {
        Self {
            id,
            font_size,
            state: RwLock::new(GlyphState::default()),
        }
    }

    /// Adds or replaces the metrics of `character`.
    pub fn insert(&self, character: char, metrics: GlyphMetrics) {
        let mut state = self.state.write();
        state.glyphs.insert(character, metrics);
        state.generation += 1;
    }

    pub fn with_glyph(self, character: char, metrics: GlyphMetrics) -> Self {
        self.insert(character, metrics);
        self
    }
}

impl Font for GlyphTable {
    fn id(&self) -> TextureId {
        self.id
    }

    fn font_size(&self) -> f32 {
        self.font_size
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn glyph(&self, character: char) -> Option<GlyphMetrics> {
        self.state.read().glyphs.get(&character).copied()
    }

    fn generation(&self) -> u64 {
        self.state.read().generation
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextWrap {
    #[default]
    None,
    /// Break at the last space once a line gets too wide.
    Word,
    /// Break right after the character that made the line too wide.
    Character,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// How a string is sized and broken into lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub text_size: f32,
    pub wrap: TextWrap,
    /// Maximum line width in font units, used when `wrap` is not [`TextWrap::None`].
    pub wrap_width: f32,
    pub align: TextAlign,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            text_size: NORMAL_FONT_SIZE,
            wrap: TextWrap::None,
            wrap_width: f32::INFINITY,
            align: TextAlign::Left,
        }
    }
}

impl TextStyle {
    fn scale(&self) -> f32 {
        self.text_size / NORMAL_FONT_SIZE
    }
}

/// One glyph positioned relative to the text origin, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedGlyph {
    pub character: char,
    pub position: Vec2,
    pub size: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Line {
    start: usize,
    end: usize,
    width: f32,
}

fn advance(font: &dyn Font, character: char) -> f32 {
    font.glyph(character).map_or(0.0, |glyph| glyph.x_advance)
}

fn break_lines(font: &dyn Font, chars: &[char], style: &TextStyle) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut width = 0.0;
    // index of the last space on this line and the width before it
    let mut last_space: Option<(usize, f32)> = None;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            lines.push(Line { start, end: i, width });
            start = i + 1;
            width = 0.0;
            last_space = None;
            i += 1;
            continue;
        }
        if c == ' ' {
            last_space = Some((i, width));
        }
        width += advance(font, c);

        if width > style.wrap_width {
            match (style.wrap, last_space) {
                (TextWrap::Character, _) => {
                    lines.push(Line { start, end: i + 1, width });
                    start = i + 1;
                    width = 0.0;
                    last_space = None;
                }
                (TextWrap::Word, Some((space, before))) => {
                    lines.push(Line {
                        start,
                        end: space + 1,
                        width: before,
                    });
                    start = space + 1;
                    width = 0.0;
                    last_space = None;
                    i = space + 1;
                    continue;
                }
                _ => {}
            }
        }
        i += 1;
    }
    lines.push(Line {
        start,
        end: chars.len(),
        width,
    });
    lines
}

fn block_size(font: &dyn Font, lines: &[Line]) -> Vec2 {
    let width = lines.iter().fold(0.0f32, |acc, line| acc.max(line.width));
    Vec2::new(width, lines.len() as f32 * font.font_size())
}

/// Size of the laid-out block in pixels.
pub fn measure_text(font: &dyn Font, content: &str, style: &TextStyle) -> Vec2 {
    let chars: Vec<char> = content.chars().collect();
    block_size(font, &break_lines(font, &chars, style)) * style.scale()
}

/// Width in pixels of the first line of `line`, after wrapping.
pub fn measure_line(font: &dyn Font, line: &str, style: &TextStyle) -> f32 {
    let chars: Vec<char> = line.chars().collect();
    break_lines(font, &chars, style)
        .first()
        .map_or(0.0, |line| line.width * style.scale())
}

/// Places every character of `content` that the font knows.
///
/// Newlines produce no glyph. The block is shifted by `-anchor * size` so an anchor of
/// `(0.5, 0.5)` centres it on the origin.
pub fn layout_text(font: &dyn Font, content: &str, style: &TextStyle, anchor: Vec2) -> Vec<PlacedGlyph> {
    let chars: Vec<char> = content.chars().collect();
    let lines = break_lines(font, &chars, style);
    let size = block_size(font, &lines);
    let line_height = font.font_size();
    let scale = style.scale();

    let mut placed = Vec::with_capacity(chars.len());
    for (row, line) in lines.iter().enumerate() {
        let align_offset = match style.align {
            TextAlign::Left => 0.0,
            TextAlign::Center => (size.x - line.width) / 2.0,
            TextAlign::Right => size.x - line.width,
        };
        let mut pen = Vec2::new(align_offset, line_height * (BASELINE + row as f32)) - size * anchor;

        for &character in &chars[line.start..line.end] {
            let Some(glyph) = font.glyph(character) else {
                continue;
            };
            placed.push(PlacedGlyph {
                character,
                position: (pen + glyph.offset * 2.0) * scale,
                size: glyph.size * scale,
            });
            pen.x += glyph.x_advance;
        }
    }
    placed
}

/// Edge smoothing for a distance-field glyph drawn at `text_size`.
pub fn glyph_smoothness(text_size: f32) -> f32 {
    (0.2 * NORMAL_FONT_SIZE / text_size).min(0.5)
}
