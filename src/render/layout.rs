//! Flowing page layout on top of raw PDF content operations.
//!
//! Content flows top to bottom on A4 pages. Blocks that do not fit on the
//! current page start a new one; tables break between rows and repeat
//! their header row on every page they span.

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};

use super::fonts::{Font, encode_win_ansi};

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 72.0;
pub const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const LEADING: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
    pub const GREY: Rgb = Rgb(0.5, 0.5, 0.5);
    pub const WHITESMOKE: Rgb = Rgb(0.9608, 0.9608, 0.9608);
    pub const BEIGE: Rgb = Rgb(0.9608, 0.9608, 0.8627);

    fn operands(&self) -> Vec<Object> {
        vec![self.0.into(), self.1.into(), self.2.into()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// Fixed table style: grey header with light bold text, beige body,
/// 1pt black grid, every cell centred
#[derive(Debug, Clone, Copy)]
struct TableStyle {
    font_size: f32,
    pad_x: f32,
    pad_top: f32,
    pad_bottom: f32,
    header_pad_bottom: f32,
    grid_width: f32,
}

const TABLE_STYLE: TableStyle = TableStyle {
    font_size: 10.0,
    pad_x: 6.0,
    pad_top: 3.0,
    pad_bottom: 3.0,
    header_pad_bottom: 12.0,
    grid_width: 1.0,
};

impl TableStyle {
    fn body_height(&self) -> f32 {
        self.pad_top + self.font_size * LEADING + self.pad_bottom
    }

    fn header_height(&self) -> f32 {
        self.pad_top + self.font_size * LEADING + self.header_pad_bottom
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Accumulates content operations page by page
pub struct PageBuilder {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor: f32,
}

impl Default for PageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PageBuilder {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn new_page(&mut self) {
        let done = std::mem::take(&mut self.current);
        self.pages.push(done);
        self.cursor = PAGE_HEIGHT - MARGIN;
    }

    /// Start a new page unless `height` still fits; true when a break happened
    fn ensure(&mut self, height: f32) -> bool {
        let page_is_fresh = self.current.is_empty();
        if self.cursor - height < MARGIN && !page_is_fresh {
            self.new_page();
            return true;
        }
        false
    }

    pub fn spacer(&mut self, height: f32) {
        self.cursor -= height;
    }

    /// Word-wrapped paragraph
    pub fn paragraph(&mut self, text: &str, font: Font, size: f32, align: Align) {
        let line_height = size * LEADING;
        for line in wrap(text, font, size, CONTENT_WIDTH) {
            self.ensure(line_height);
            self.cursor -= line_height;
            let encoded = encode_win_ansi(&line);
            let x = match align {
                Align::Left => MARGIN,
                Align::Center => MARGIN + (CONTENT_WIDTH - font.measure(&encoded, size)) / 2.0,
            };
            // Baseline sits a fifth of the line height above the bottom
            let y = self.cursor + (line_height - size) / 2.0 + size * 0.2;
            self.text(encoded, font, size, x, y, Rgb::BLACK);
        }
    }

    pub fn table(&mut self, table: &Table) {
        let style = TABLE_STYLE;
        let widths = column_widths(table, &style);
        let first_row = if table.rows.is_empty() {
            0.0
        } else {
            style.body_height()
        };

        self.ensure(style.header_height() + first_row);
        self.table_row(&table.header, &widths, &style, true);
        for row in &table.rows {
            if self.ensure(style.body_height()) {
                self.table_row(&table.header, &widths, &style, true);
            }
            self.table_row(row, &widths, &style, false);
        }
    }

    fn table_row(&mut self, cells: &[String], widths: &[f32], style: &TableStyle, header: bool) {
        let height = if header {
            style.header_height()
        } else {
            style.body_height()
        };
        let top = self.cursor;
        let bottom = top - height;
        let total: f32 = widths.iter().sum();
        let (fill, text_color, font) = if header {
            (Rgb::GREY, Rgb::WHITESMOKE, Font::Bold)
        } else {
            (Rgb::BEIGE, Rgb::BLACK, Font::Regular)
        };

        self.op("rg", fill.operands());
        self.op("re", vec![MARGIN.into(), bottom.into(), total.into(), height.into()]);
        self.op("f", vec![]);

        let mut x = MARGIN;
        let baseline = top - style.pad_top - style.font_size;
        for (cell, width) in cells.iter().zip(widths) {
            let encoded = encode_win_ansi(cell);
            let text_x = x + (width - font.measure(&encoded, style.font_size)) / 2.0;
            self.text(encoded, font, style.font_size, text_x, baseline, text_color);
            x += width;
        }

        self.op("w", vec![style.grid_width.into()]);
        self.op("RG", Rgb::BLACK.operands());
        let mut x = MARGIN;
        for width in widths {
            self.op("re", vec![x.into(), bottom.into(), (*width).into(), height.into()]);
            self.op("S", vec![]);
            x += width;
        }

        self.cursor = bottom;
    }

    fn text(&mut self, encoded: Vec<u8>, font: Font, size: f32, x: f32, y: f32, color: Rgb) {
        self.op("rg", color.operands());
        self.op("BT", vec![]);
        self.op("Tf", vec![font.resource().into(), size.into()]);
        self.op("Td", vec![x.into(), y.into()]);
        self.op("Tj", vec![Object::String(encoded, StringFormat::Literal)]);
        self.op("ET", vec![]);
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.current.push(Operation::new(operator, operands));
    }

    /// Content operations of every page, in order
    pub fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        self.pages
    }
}

/// Natural column widths, scaled down to the content width when too wide
fn column_widths(table: &Table, style: &TableStyle) -> Vec<f32> {
    let mut widths: Vec<f32> = table
        .header
        .iter()
        .map(|h| Font::Bold.text_width(h, style.font_size))
        .collect();
    for row in &table.rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = w.max(Font::Regular.text_width(cell, style.font_size));
        }
    }
    for w in widths.iter_mut() {
        *w += 2.0 * style.pad_x;
    }

    let total: f32 = widths.iter().sum();
    if total > CONTENT_WIDTH {
        let k = CONTENT_WIDTH / total;
        widths.iter_mut().for_each(|w| *w *= k);
    }
    widths
}

/// Greedy word wrap; an over-long single word gets a line of its own
fn wrap(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", line, word)
        };
        if font.text_width(&candidate, size) <= max_width || line.is_empty() {
            line = candidate;
        } else {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        }
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}
