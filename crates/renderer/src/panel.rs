//! CPU painting of the [`FallbackPanel`].
//!
//! The panel is shown exactly when the GPU path is unavailable, so it is
//! rasterised into an [`RgbaImage`] with a built-in 5x7 bitmap face and no
//! font files.

use image::{Rgba, RgbaImage};

use crate::probe::FallbackPanel;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const ADVANCE: u32 = GLYPH_WIDTH + 1;
const LINE_GAP: u32 = 4;

const TITLE_INK: [u8; 3] = [0xE0, 0xD6, 0xC2];
const DETAIL_INK: [u8; 3] = [0x9A, 0x94, 0x8A];

/// Rows of a 5x7 glyph, most significant of the low five bits on the left.
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        ' ' => [0x00; 7],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

/// Greedy word wrap to at most `columns` characters per line. Words longer
/// than a line are split.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > columns {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            lines.push(word.drain(..columns).collect());
        }
        let needed = if line.is_empty() { word.len() } else { line.chars().count() + 1 + word.len() };
        if needed > columns && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.extend(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

struct Block {
    lines: Vec<String>,
    scale: u32,
    ink: [u8; 3],
}

impl Block {
    fn height(&self) -> u32 {
        let count = self.lines.len() as u32;
        count * GLYPH_HEIGHT * self.scale + count.saturating_sub(1) * LINE_GAP * self.scale
    }
}

fn draw_line(image: &mut RgbaImage, text: &str, top: u32, scale: u32, ink: [u8; 3]) {
    let (width, height) = image.dimensions();
    let span = text.chars().count() as u32 * ADVANCE * scale;
    let left = width.saturating_sub(span) / 2;
    for (index, c) in text.chars().enumerate() {
        let origin = left + index as u32 * ADVANCE * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let x0 = origin + col * scale;
                let y0 = top + row as u32 * scale;
                for y in y0..(y0 + scale).min(height) {
                    for x in x0..(x0 + scale).min(width) {
                        image.put_pixel(x, y, Rgba([ink[0], ink[1], ink[2], 255]));
                    }
                }
            }
        }
    }
}

/// Paints `panel` at `width`x`height`: the background fill with the title and
/// the word-wrapped detail centred on it.
pub fn render_panel(panel: &FallbackPanel, width: u32, height: u32) -> RgbaImage {
    let [r, g, b] = panel.background;
    let mut image = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
    if width == 0 || height == 0 {
        return image;
    }

    let detail_scale = (width.min(height) / 360).max(1);
    let margin = 2 * ADVANCE * detail_scale;
    let usable = width.saturating_sub(2 * margin).max(ADVANCE);
    let title_scale = (detail_scale * 2)
        .min(usable / (panel.title.chars().count().max(1) as u32 * ADVANCE))
        .max(1);

    let blocks = [
        Block {
            lines: wrap(&panel.title, (usable / (ADVANCE * title_scale)) as usize),
            scale: title_scale,
            ink: TITLE_INK,
        },
        Block {
            lines: wrap(&panel.detail, (usable / (ADVANCE * detail_scale)) as usize),
            scale: detail_scale,
            ink: DETAIL_INK,
        },
    ];
    let gap = 3 * LINE_GAP * detail_scale;
    let total = blocks.iter().map(Block::height).sum::<u32>() + gap;

    let mut top = height.saturating_sub(total) / 2;
    for block in &blocks {
        for line in &block.lines {
            draw_line(&mut image, line, top, block.scale, block.ink);
            top += (GLYPH_HEIGHT + LINE_GAP) * block.scale;
        }
        top += gap;
    }
    image
}
