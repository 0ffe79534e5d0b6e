//! Greedy line breaking against font metrics.

use super::font::FontProgram;

/// Horizontal placement of a line inside its box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    /// X offset of a line of `line_width` inside a box of `box_width`.
    pub fn offset(self, box_width: f32, line_width: f32) -> f32 {
        let slack = (box_width - line_width).max(0.0);
        match self {
            Align::Left => 0.0,
            Align::Center => slack / 2.0,
            Align::Right => slack,
        }
    }
}

/// Break `text` into lines no wider than `max_width`.
///
/// Explicit `\n` always starts a new line. Words wider than the box are split
/// between characters so nothing is ever truncated.
pub fn wrap(font: &FontProgram, text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        wrap_paragraph(font, paragraph, size, max_width, &mut lines);
    }
    lines
}

fn wrap_paragraph(
    font: &FontProgram,
    paragraph: &str,
    size: f32,
    max_width: f32,
    out: &mut Vec<String>,
) {
    let space = font.text_width(" ", size);
    let mut line = String::new();
    let mut line_width = 0.0f32;

    for word in paragraph.split_whitespace() {
        let word_width = font.text_width(word, size);

        if !line.is_empty() && line_width + space + word_width <= max_width {
            line.push(' ');
            line.push_str(word);
            line_width += space + word_width;
            continue;
        }
        if !line.is_empty() {
            out.push(std::mem::take(&mut line));
        }

        if word_width <= max_width {
            line.push_str(word);
            line_width = word_width;
        } else {
            let mut pieces = split_word(font, word, size, max_width);
            let last = pieces.pop().unwrap_or_default();
            out.extend(pieces);
            line_width = font.text_width(&last, size);
            line = last;
        }
    }

    if !line.is_empty() || paragraph.trim().is_empty() {
        out.push(line);
    }
}

fn split_word(font: &FontProgram, word: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        current.push(ch);
        if font.text_width(&current, size) > max_width && current.chars().count() > 1 {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    pieces.push(current);
    pieces
}

/// Collapse HTML-style whitespace runs while appending `chunk` to `buf`.
pub fn push_collapsed(buf: &mut String, chunk: &str) {
    let mut pending_space = chunk.starts_with(char::is_whitespace);
    for word in chunk.split_whitespace() {
        if pending_space && !buf.is_empty() && !buf.ends_with([' ', '\n']) {
            buf.push(' ');
        }
        buf.push_str(word);
        pending_space = true;
    }
    if chunk.ends_with(char::is_whitespace) && !buf.is_empty() && !buf.ends_with([' ', '\n']) {
        buf.push(' ');
    }
}
