//! Summary document rendering.
//!
//! Rendering happens in two steps. `layout` places every text run and rule
//! on A4 pages with a top-down cursor; it is pure and deterministic for a
//! given timestamp. `DocumentRenderer` then emits the layout as PDF bytes
//! via `printpdf`.
//!
//! Pagination is cursor-driven: once the cursor passes `BREAK_Y` inside the
//! table, a new page starts and the column header is printed again.

use std::io::BufWriter;

use chrono::{DateTime, Utc};
use printpdf::*;
use thiserror::Error;
use uuid::Uuid;

use crate::models::TableRow;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("PDF font error: {0}")]
    Font(String),

    #[error("PDF save error: {0}")]
    Save(String),

    #[error("Invalid document timestamp: {0}")]
    Timestamp(String),

    #[error("Render task failed: {0}")]
    Worker(String),
}

// ═══════════════════════════════════════════════════════════
// Page geometry (millimetres, measured from the top edge)
// ═══════════════════════════════════════════════════════════

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 14.0;
const TOP: f32 = 20.0;
/// Table rows starting below this line go to the next page.
const BREAK_Y: f32 = 262.0;
/// Free-flowing text past this line continues on the next page.
const BOTTOM_Y: f32 = 283.0;

const COL_ID: f32 = 18.0;
const COL_CATEGORY: f32 = 32.0;
const COL_STATUS: f32 = 85.0;
const COL_LOCATION: f32 = 120.0;

const BODY_WRAP: usize = 95;
const CATEGORY_WRAP: usize = 26;
const LOCATION_WRAP: usize = 40;

const LINE_HEIGHT: f32 = 5.0;
const ROW_GAP: f32 = 2.0;

pub const FOOTER_TEXT: &str = "For more detailed reports, check out the PublicEye app.";

/// One drawing instruction on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        text: String,
        size: f32,
        x: f32,
        y: f32,
        bold: bool,
        /// Greyscale level, 0.0 is black.
        shade: f32,
    },
    Rule { x1: f32, x2: f32, y: f32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub pages: Vec<Page>,
}

impl Layout {
    /// Every text run, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(|p| p.ops.iter()).filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            DrawOp::Rule { .. } => None,
        })
    }
}

/// Top-down cursor over a growing list of pages.
struct Cursor {
    pages: Vec<Page>,
    y: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            y: TOP,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = TOP;
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn text(&mut self, text: impl Into<String>, size: f32, x: f32, bold: bool, shade: f32) {
        let y = self.y;
        self.push(DrawOp::Text {
            text: text.into(),
            size,
            x,
            y,
            bold,
            shade,
        });
    }

    fn rule(&mut self) {
        let y = self.y;
        self.push(DrawOp::Rule {
            x1: COL_ID,
            x2: PAGE_WIDTH - MARGIN,
            y,
        });
    }

    /// Flowing paragraph text, breaking pages as needed.
    fn paragraph(&mut self, text: &str, size: f32, shade: f32) {
        for source_line in text.lines() {
            for line in wrap_text(source_line, BODY_WRAP) {
                if self.y > BOTTOM_Y {
                    self.new_page();
                }
                self.text(line, size, MARGIN, false, shade);
                self.y += LINE_HEIGHT;
            }
        }
    }

    fn table_header(&mut self) {
        self.text("ID", 11.0, COL_ID, true, 0.3);
        self.text("Category", 11.0, COL_CATEGORY, true, 0.3);
        self.text("Status", 11.0, COL_STATUS, true, 0.3);
        self.text("Location", 11.0, COL_LOCATION, true, 0.3);
        self.y += 4.0;
        self.rule();
        self.y += 5.0;
    }

    fn table_row(&mut self, row: &TableRow) {
        let category = wrap_text(&row.category, CATEGORY_WRAP);
        let location = wrap_text(&row.location, LOCATION_WRAP);
        let top = self.y;

        self.text(row.id.to_string(), 10.0, COL_ID, false, 0.0);
        self.text(row.status.as_str(), 10.0, COL_STATUS, false, 0.0);
        for (i, line) in category.iter().enumerate() {
            self.y = top + i as f32 * LINE_HEIGHT;
            self.text(line.as_str(), 10.0, COL_CATEGORY, false, 0.0);
        }
        for (i, line) in location.iter().enumerate() {
            self.y = top + i as f32 * LINE_HEIGHT;
            self.text(line.as_str(), 10.0, COL_LOCATION, false, 0.0);
        }

        let lines = category.len().max(location.len()).max(1);
        self.y = top + lines as f32 * LINE_HEIGHT + ROW_GAP;
    }
}

/// Approximate Helvetica run width in millimetres.
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * 0.3528
}

/// Place the title, timestamp, summary body, table and footer on pages.
pub fn layout(title: &str, body: &str, rows: &[TableRow], generated_at: &str) -> Layout {
    let mut cursor = Cursor::new();

    // Header block
    let title_x = ((PAGE_WIDTH - text_width(title, 20.0)) / 2.0).max(MARGIN);
    cursor.text(title, 20.0, title_x, true, 0.07);
    cursor.y += 10.0;
    let stamp = format!("Generated on: {generated_at}");
    let stamp_x = (PAGE_WIDTH - MARGIN - text_width(&stamp, 11.0)).max(MARGIN);
    cursor.text(stamp, 11.0, stamp_x, false, 0.4);
    cursor.y += 10.0;

    // Executive summary
    cursor.text("Executive Summary", 13.0, MARGIN, true, 0.0);
    cursor.y += 8.0;
    cursor.paragraph(body, 11.0, 0.13);
    cursor.y += 8.0;

    // Table
    if !rows.is_empty() {
        if cursor.y > BREAK_Y {
            cursor.new_page();
        }
        cursor.text("Recent Reports Overview", 13.0, MARGIN, true, 0.0);
        cursor.y += 8.0;
        cursor.table_header();

        for row in rows {
            if cursor.y > BREAK_Y {
                cursor.new_page();
                cursor.table_header();
            }
            cursor.table_row(row);
        }
    }

    // Footer
    cursor.y += 12.0;
    if cursor.y > BOTTOM_Y {
        cursor.new_page();
    }
    let footer_x = ((PAGE_WIDTH - text_width(FOOTER_TEXT, 11.0)) / 2.0).max(MARGIN);
    cursor.text(FOOTER_TEXT, 11.0, footer_x, false, 0.33);

    Layout {
        pages: cursor.pages,
    }
}

/// Renders summary documents to PDF bytes.
#[derive(Debug, Default, Clone)]
pub struct DocumentRenderer;

impl DocumentRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        &self,
        title: &str,
        body: &str,
        rows: &[TableRow],
    ) -> Result<Vec<u8>, RenderError> {
        self.render_at(title, body, rows, Utc::now())
    }

    pub fn render_at(
        &self,
        title: &str,
        body: &str,
        rows: &[TableRow],
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, RenderError> {
        let stamp = generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let layout = layout(title, body, rows, &stamp);
        let bytes = emit_pdf(title, &layout, generated_at)?;
        tracing::debug!(pages = layout.pages.len(), bytes = bytes.len(), "Summary document rendered");
        Ok(bytes)
    }
}

/// Stable 32-character identifier for a document's content and timestamp.
fn document_id(layout: &Layout, generated_at: DateTime<Utc>) -> String {
    let mut seed = generated_at.timestamp_millis().to_string();
    for text in layout.texts() {
        seed.push('\n');
        seed.push_str(text);
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
        .simple()
        .to_string()
        .to_ascii_uppercase()
}

/// printpdf fills the trailer `/ID` pair with random strings on save.
/// Overwrite both in place with `id`, keeping their length so the xref
/// table stays valid.
fn stamp_trailer_id(bytes: &mut [u8], id: &str) {
    const KEY: &[u8] = b"/ID";
    let Some(start) = bytes.windows(KEY.len()).rposition(|w| w == KEY) else {
        tracing::warn!("Rendered PDF has no trailer ID");
        return;
    };

    let id = id.as_bytes();
    let mut pos = start + KEY.len();
    for _ in 0..2 {
        let Some(open) = bytes[pos..].iter().position(|&b| b == b'(') else {
            return;
        };
        let open = pos + open + 1;
        let Some(close) = bytes[open..].iter().position(|&b| b == b')') else {
            return;
        };
        for (offset, byte) in bytes[open..open + close].iter_mut().enumerate() {
            *byte = id[offset % id.len()];
        }
        pos = open + close + 1;
    }
}

fn emit_pdf(
    title: &str,
    layout: &Layout,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, RenderError> {
    let created = OffsetDateTime::from_unix_timestamp(generated_at.timestamp())
        .map_err(|e| RenderError::Timestamp(e.to_string()))?;
    let id = document_id(layout, generated_at);

    let (doc, page1, layer1) =
        PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let doc = doc
        .with_document_id(id.clone())
        .with_creation_date(created)
        .with_mod_date(created)
        .with_metadata_date(created);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::Font(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| RenderError::Font(e.to_string()))?;

    for (index, page) in layout.pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(page1).get_layer(layer1)
        } else {
            let (p, l) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            doc.get_page(p).get_layer(l)
        };

        for op in &page.ops {
            match op {
                DrawOp::Text {
                    text,
                    size,
                    x,
                    y,
                    bold: is_bold,
                    shade,
                } => {
                    layer.set_fill_color(Color::Greyscale(Greyscale::new(*shade, None)));
                    let face = if *is_bold { &bold } else { &font };
                    layer.use_text(text.as_str(), *size, Mm(*x), Mm(PAGE_HEIGHT - *y), face);
                }
                DrawOp::Rule { x1, x2, y } => {
                    layer.set_outline_color(Color::Greyscale(Greyscale::new(0.8, None)));
                    layer.set_outline_thickness(0.5);
                    let y = Mm(PAGE_HEIGHT - *y);
                    layer.add_line(Line {
                        points: vec![
                            (Point::new(Mm(*x1), y), false),
                            (Point::new(Mm(*x2), y), false),
                        ],
                        is_closed: false,
                    });
                }
            }
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| RenderError::Save(e.to_string()))?;
    let mut bytes = buf
        .into_inner()
        .map_err(|e| RenderError::Save(format!("PDF buffer error: {e}")))?;
    stamp_trailer_id(&mut bytes, &id);
    Ok(bytes)
}

/// Simple word-wrap helper for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
