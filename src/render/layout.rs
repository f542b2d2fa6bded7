use super::font::{FontMetrics, measure_text_width_px};
use crate::region::PixelRect;

pub const MIN_FONT_SIZE: f32 = 12.0;
pub const FONT_SIZE_RATIO: f32 = 0.15;
pub const WRAP_WIDTH_RATIO: f32 = 0.85;
pub const LINE_HEIGHT_RATIO: f32 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    /// Horizontal center of the line.
    pub x: f32,
    /// Top of the line's glyph box.
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub font_size: f32,
    pub line_height: f32,
    pub lines: Vec<TextLine>,
}

pub fn font_size_for(pixel_height: f32) -> f32 {
    (pixel_height * FONT_SIZE_RATIO).max(MIN_FONT_SIZE)
}

/// Greedy word wrap. A word is appended to the current line while the line
/// still fits `max_width`; the first word of a line is always accepted, even
/// when it alone is wider than `max_width`.
pub fn wrap_words(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wraps `text` inside `rect` and centers the block on the rectangle's
/// center, both ways.
pub fn layout_region(rect: &PixelRect, text: &str, font: Option<&FontMetrics>) -> TextBlock {
    let font_size = font_size_for(rect.height);
    let line_height = font_size * LINE_HEIGHT_RATIO;
    let max_width = rect.width * WRAP_WIDTH_RATIO;
    let wrapped = wrap_words(text, max_width, |line| {
        measure_text_width_px(line, font_size, font)
    });

    let block_height = wrapped.len() as f32 * line_height;
    let top = rect.center_y() - block_height / 2.0;
    let center_x = rect.center_x();
    let lines = wrapped
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextLine {
            text,
            x: center_x,
            y: top + index as f32 * line_height,
        })
        .collect();

    TextBlock {
        font_size,
        line_height,
        lines,
    }
}
