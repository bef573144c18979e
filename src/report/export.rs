//! PDF export of a rendered report.
//!
//! Layout is computed first as plain data (`layout_pages`) so pagination can
//! be checked without decoding a PDF; `render_pdf` then draws it with printpdf.

use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::LazyLock;

use printpdf::*;
use regex::Regex;

use super::render::{ReportBlock, ReportView};
use super::ExportError;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const FALLBACK_FILE_STEM: &str = "Medical";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// `Prescription_<Disease>.pdf`, with anything outside `[A-Za-z0-9]` collapsed to `_`.
pub fn export_file_name(disease_name: Option<&str>) -> String {
    let stem = disease_name
        .map(|name| UNSAFE_FILENAME_CHARS.replace_all(name, "_"))
        .map(|name| name.trim_matches('_').to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_STEM.to_string());
    format!("Prescription_{stem}.pdf")
}

impl ReportView {
    pub fn export_file_name(&self) -> String {
        export_file_name(self.disease_name.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub bold: bool,
}

impl TextStyle {
    const fn regular(size: f32) -> Self {
        Self { size, bold: false }
    }

    const fn bold(size: f32) -> Self {
        Self { size, bold: true }
    }

    /// Baseline-to-baseline distance in mm.
    fn line_height(&self) -> f32 {
        self.size * 0.3528 * 1.35
    }

    /// Rough Helvetica capacity for the given width.
    fn max_chars(&self, width_mm: f32) -> usize {
        ((width_mm / (self.size * 0.3528 * 0.5)) as usize).max(10)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlacedItem {
    Text { text: String, style: TextStyle },
    Rule { width_mm: f32 },
}

/// One item positioned on a page; `y_mm` is the baseline, measured from the bottom edge.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub item: PlacedItem,
    pub x_mm: f32,
    pub y_mm: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub lines: Vec<PlacedLine>,
}

struct Cursor {
    pages: Vec<PageLayout>,
    y: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![PageLayout::default()],
            y: PAGE_HEIGHT_MM - MARGIN_MM,
        }
    }

    /// Move down by `height`, starting a new page if that would cross the bottom margin.
    fn advance(&mut self, height: f32) -> f32 {
        if self.y - height < MARGIN_MM {
            self.pages.push(PageLayout::default());
            self.y = PAGE_HEIGHT_MM - MARGIN_MM;
        }
        self.y -= height;
        self.y
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    fn place(&mut self, item: PlacedItem, x_mm: f32, height: f32) {
        let y_mm = self.advance(height);
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(PlacedLine { item, x_mm, y_mm });
        }
    }

    fn text(&mut self, text: &str, style: TextStyle, indent_mm: f32) {
        let width = PAGE_WIDTH_MM - 2.0 * MARGIN_MM - indent_mm;
        for line in wrap_text(text, style.max_chars(width)) {
            self.place(
                PlacedItem::Text { text: line, style },
                MARGIN_MM + indent_mm,
                style.line_height(),
            );
        }
    }
}

/// Lay the report out on A4 portrait pages.
pub fn layout_pages(view: &ReportView) -> Vec<PageLayout> {
    let mut cursor = Cursor::new();

    for block in &view.blocks {
        match block {
            ReportBlock::Title(text) => cursor.text(text, TextStyle::bold(20.0), 0.0),
            ReportBlock::Badge(text) => {
                cursor.text(text, TextStyle::bold(13.0), 0.0);
                cursor.gap(1.0);
            }
            ReportBlock::Caption(text) => cursor.text(text, TextStyle::regular(9.0), 0.0),
            ReportBlock::Heading(text) => {
                cursor.gap(4.0);
                cursor.text(text, TextStyle::bold(14.0), 0.0);
                cursor.gap(1.0);
            }
            ReportBlock::Subheading(text) => {
                cursor.gap(2.0);
                cursor.text(text, TextStyle::bold(11.0), 4.0);
            }
            ReportBlock::Field { label, value } => {
                cursor.text(&format!("{label}: {value}"), TextStyle::regular(10.0), 8.0)
            }
            ReportBlock::Point(text) => {
                cursor.text(&format!("- {text}"), TextStyle::regular(10.0), 4.0)
            }
            ReportBlock::Paragraph(text) => {
                cursor.gap(2.0);
                for line in text.lines() {
                    cursor.text(line, TextStyle::regular(10.0), 0.0);
                }
            }
            ReportBlock::Note(text) => cursor.text(text, TextStyle::regular(9.0), 0.0),
            ReportBlock::Rule => {
                cursor.gap(2.0);
                cursor.place(
                    PlacedItem::Rule {
                        width_mm: PAGE_WIDTH_MM - 2.0 * MARGIN_MM,
                    },
                    MARGIN_MM,
                    2.0,
                );
                cursor.gap(2.0);
            }
        }
    }

    cursor.pages
}

/// Draw the report into PDF bytes.
pub fn render_pdf(view: &ReportView) -> Result<Vec<u8>, ExportError> {
    let title = view
        .disease_name
        .as_deref()
        .map(|name| format!("Prescription - {name}"))
        .unwrap_or_else(|| "Prescription".to_string());

    let (doc, page1, layer1) =
        PdfDocument::new(pdf_safe(&title), Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ExportError::RenderSnapshot(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ExportError::RenderSnapshot(format!("PDF font error: {e}")))?;

    let pages = layout_pages(view);
    for (i, page) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(page1).get_layer(layer1)
        } else {
            let (page_idx, layer_idx) =
                doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            doc.get_page(page_idx).get_layer(layer_idx)
        };

        for line in &page.lines {
            match &line.item {
                PlacedItem::Text { text, style } => {
                    let face = if style.bold { &bold } else { &font };
                    layer.use_text(pdf_safe(text), style.size, Mm(line.x_mm), Mm(line.y_mm), face);
                }
                PlacedItem::Rule { width_mm } => {
                    layer.set_outline_thickness(0.5);
                    layer.add_line(Line {
                        points: vec![
                            (Point::new(Mm(line.x_mm), Mm(line.y_mm)), false),
                            (Point::new(Mm(line.x_mm + width_mm), Mm(line.y_mm)), false),
                        ],
                        is_closed: false,
                    });
                }
            }
        }
    }

    tracing::debug!(pages = pages.len(), "Report laid out");

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ExportError::RenderSnapshot(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ExportError::RenderSnapshot(format!("PDF buffer error: {e}")))
}

/// Render and save the report. Drawing runs on the blocking pool.
pub async fn export_report(view: ReportView, dir: PathBuf) -> Result<PathBuf, ExportError> {
    let file_name = view.export_file_name();
    let bytes = tokio::task::spawn_blocking(move || render_pdf(&view))
        .await
        .map_err(|e| ExportError::RenderSnapshot(format!("render task failed: {e}")))??;

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ExportError::ExportIo(format!("{}: {e}", dir.display())))?;
    let path = dir.join(&file_name);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ExportError::ExportIo(format!("{}: {e}", path.display())))?;

    tracing::info!(path = %path.display(), bytes = bytes.len(), "Report exported");
    Ok(path)
}

/// Builtin PDF fonts only cover Latin-1.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| if (c as u32) <= 0xFF { c } else { '?' })
        .collect()
}

/// Greedy word wrap. Words longer than a line are split across lines.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max_chars) {
            let current_len = current.chars().count();
            if current_len + piece.len() + 1 > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(piece);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
