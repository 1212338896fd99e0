//! Paginated document export.
//!
//! Layout and drawing are separate passes: [`layout`] places every block on a
//! page using fixed metrics, so identical reports always paginate the same
//! way, and [`render`] only draws what the layout decided. The document id
//! and dates are derived from the layout, so identical reports also encode
//! to identical bytes.

use printpdf::lopdf::{self, Object};
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, CustomPdfConformance, IndirectFontRef, Mm, PdfConformance,
    PdfDocument, PdfLayerReference, Rect, Rgb,
};
use sha2::{Digest, Sha256};

use super::{format_timestamp, ExportError};
use crate::models::{ReportResult, SummaryShape};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
/// Content may not extend below this distance from the top edge.
const PAGE_LIMIT: f32 = 272.0;

const TITLE_HEIGHT: f32 = 12.0;
const LINE_HEIGHT: f32 = 7.0;
const HEADING_HEIGHT: f32 = 10.0;
const ROW_HEIGHT: f32 = 8.0;
const NOTE_HEIGHT: f32 = 7.0;
const SECTION_GAP: f32 = 6.0;

pub const MAX_VERBATIM_ROWS: usize = 5;
pub const MAX_VERBATIM_CHARS: usize = 60;
const MAX_TITLE_CHARS: usize = 50;
const MAX_LINE_CHARS: usize = 90;
const MAX_HEADING_CHARS: usize = 70;
const MAX_OPTION_CHARS: usize = 75;

/// Written as both creation and modification date.
const FIXED_PDF_DATE: &str = "D:19700101000000Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Breakdown,
    Verbatim,
}

impl TableKind {
    pub fn headers(self) -> [&'static str; 2] {
        match self {
            TableKind::Breakdown => ["Opción", "Cantidad"],
            TableKind::Verbatim => ["Respuesta", "Fecha"],
        }
    }

    fn widths(self) -> [f32; 2] {
        match self {
            TableKind::Breakdown => [130.0, 40.0],
            TableKind::Verbatim => [120.0, 50.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Line(String),
    Heading(String),
    HeaderRow(TableKind),
    BodyRow {
        kind: TableKind,
        cells: [String; 2],
        shaded: bool,
    },
    Note(String),
}

impl Block {
    fn height(&self) -> f32 {
        match self {
            Block::Title(_) => TITLE_HEIGHT,
            Block::Line(_) => LINE_HEIGHT,
            Block::Heading(_) => HEADING_HEIGHT,
            Block::HeaderRow(_) | Block::BodyRow { .. } => ROW_HEIGHT,
            Block::Note(_) => NOTE_HEIGHT,
        }
    }
}

/// A block anchored at `top` millimetres below the page's upper edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub top: f32,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentLayout {
    pub pages: Vec<Vec<Placed>>,
}

struct Cursor {
    pages: Vec<Vec<Placed>>,
    top: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            top: MARGIN,
        }
    }

    /// Starts a new page when `height` more millimetres would cross the limit.
    fn reserve(&mut self, height: f32) {
        if self.top + height > PAGE_LIMIT {
            self.pages.push(Vec::new());
            self.top = MARGIN;
        }
    }

    fn place(&mut self, block: Block) {
        let height = block.height();
        self.reserve(height);
        if let Some(page) = self.pages.last_mut() {
            page.push(Placed {
                top: self.top,
                block,
            });
        }
        self.top += height;
    }

    fn gap(&mut self, height: f32) {
        self.top += height;
    }
}

/// Maps text onto what the builtin WinAnsi fonts can show. Common
/// typographic punctuation gets an ASCII stand-in, anything else outside
/// Latin-1 becomes `?`.
pub fn printable(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' | '\r' | '\t' => out.push(' '),
            '\u{2018}' | '\u{2019}' | '\u{201A}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2022}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{20AC}' => out.push_str("EUR"),
            ' '..='~' | '\u{A0}'..='\u{FF}' => out.push(ch),
            c if c.is_control() => {}
            _ => out.push('?'),
        }
    }
    out
}

/// `printable`, then cut to `max` characters with a trailing ellipsis.
fn clip(value: &str, max: usize) -> String {
    let value = printable(value);
    if value.chars().count() > max {
        let mut short: String = value.chars().take(max).collect();
        short.push_str("...");
        short
    } else {
        value
    }
}

pub fn truncate(value: &str) -> String {
    clip(value, MAX_VERBATIM_CHARS)
}

pub fn layout(report: &ReportResult) -> DocumentLayout {
    let mut cursor = Cursor::new();

    cursor.place(Block::Title(format!(
        "Reporte: {}",
        clip(&report.survey.title, MAX_TITLE_CHARS)
    )));
    if let Some(description) = report
        .survey
        .description
        .as_deref()
        .filter(|text| !text.is_empty())
    {
        cursor.place(Block::Line(clip(description, MAX_LINE_CHARS)));
    }
    cursor.place(Block::Line(format!(
        "Total de respuestas: {}",
        report.survey.total_unique_submission_timestamps
    )));
    cursor.gap(SECTION_GAP);

    for (index, summary) in report.questions.iter().enumerate() {
        // Keep the heading together with the table header and first row.
        cursor.reserve(HEADING_HEIGHT + 2.0 * ROW_HEIGHT);
        cursor.place(Block::Heading(format!(
            "{}. {} (total: {})",
            index + 1,
            clip(&summary.question_text, MAX_HEADING_CHARS),
            summary.total_answers
        )));

        match &summary.shape {
            SummaryShape::Breakdown(counts) => {
                let kind = TableKind::Breakdown;
                cursor.place(Block::HeaderRow(kind));
                for (row, entry) in counts.iter().enumerate() {
                    cursor.place(Block::BodyRow {
                        kind,
                        cells: [clip(&entry.option, MAX_OPTION_CHARS), entry.count.to_string()],
                        shaded: row % 2 == 1,
                    });
                }
            }
            SummaryShape::VerbatimList(entries) => {
                let kind = TableKind::Verbatim;
                cursor.place(Block::HeaderRow(kind));
                for (row, entry) in entries.iter().take(MAX_VERBATIM_ROWS).enumerate() {
                    cursor.place(Block::BodyRow {
                        kind,
                        cells: [truncate(&entry.value), format_timestamp(&entry.submitted_at)],
                        shaded: row % 2 == 1,
                    });
                }
                if entries.len() > MAX_VERBATIM_ROWS {
                    cursor.place(Block::Note(format!(
                        "+{} respuestas más",
                        entries.len() - MAX_VERBATIM_ROWS
                    )));
                }
            }
        }

        cursor.gap(SECTION_GAP);
    }

    DocumentLayout {
        pages: cursor.pages,
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

fn rgb(r: f32, g: f32, b: f32) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn pdf_error<E: std::fmt::Debug>(err: E) -> ExportError {
    ExportError::Pdf(format!("{err:?}"))
}

/// Hex digest of the layout, used as the document's permanent id.
fn fingerprint(plan: &DocumentLayout) -> String {
    Sha256::digest(format!("{plan:?}").as_bytes())
        .iter()
        .take(16)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

pub fn render(report: &ReportResult) -> Result<Vec<u8>, ExportError> {
    let plan = layout(report);
    let title = format!("Reporte: {}", clip(&report.survey.title, MAX_TITLE_CHARS));
    let (doc, first_page, first_layer) =
        PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Contenido");
    let doc = doc.with_conformance(PdfConformance::Custom(CustomPdfConformance {
        requires_icc_profile: false,
        requires_xmp_metadata: false,
        ..Default::default()
    }));

    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?,
        italic: doc
            .add_builtin_font(BuiltinFont::HelveticaOblique)
            .map_err(pdf_error)?,
    };

    for (index, page) in plan.pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) =
                doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Contenido");
            doc.get_page(page_index).get_layer(layer_index)
        };

        for placed in page {
            draw(&layer, &fonts, placed);
        }
    }

    let bytes = doc.save_to_bytes().map_err(pdf_error)?;
    pin_identity(&bytes, &fingerprint(&plan))
}

/// Replaces the clock-derived dates and the random trailer ids printpdf
/// writes with fixed values.
fn pin_identity(bytes: &[u8], id: &str) -> Result<Vec<u8>, ExportError> {
    let mut document = lopdf::Document::load_mem(bytes).map_err(pdf_error)?;

    document.trailer.set(
        "ID",
        Object::Array(vec![Object::string_literal(id), Object::string_literal(id)]),
    );

    if let Ok(info_id) = document.trailer.get(b"Info").and_then(Object::as_reference) {
        let info = document
            .get_object_mut(info_id)
            .and_then(Object::as_dict_mut)
            .map_err(pdf_error)?;
        info.set("CreationDate", Object::string_literal(FIXED_PDF_DATE));
        info.set("ModDate", Object::string_literal(FIXED_PDF_DATE));
        if info.has(b"Identifier") {
            info.set("Identifier", Object::string_literal(id));
        }
    }

    let mut out = Vec::with_capacity(bytes.len());
    document.save_to(&mut out).map_err(pdf_error)?;
    Ok(out)
}

fn draw(layer: &PdfLayerReference, fonts: &Fonts, placed: &Placed) {
    let height = placed.block.height();
    let bottom = PAGE_HEIGHT - placed.top - height;
    let baseline = Mm(bottom + 2.5);
    let black = rgb(0.0, 0.0, 0.0);

    match &placed.block {
        Block::Title(text) => {
            layer.set_fill_color(black);
            layer.use_text(text.as_str(), 16.0, Mm(MARGIN), baseline, &fonts.bold);
        }
        Block::Line(text) => {
            layer.set_fill_color(black);
            layer.use_text(text.as_str(), 10.0, Mm(MARGIN), baseline, &fonts.regular);
        }
        Block::Heading(text) => {
            layer.set_fill_color(black);
            layer.use_text(text.as_str(), 12.0, Mm(MARGIN), baseline, &fonts.bold);
        }
        Block::HeaderRow(kind) => {
            draw_cells(
                layer,
                *kind,
                bottom,
                Some(rgb(0.16, 0.38, 0.62)),
                &kind.headers(),
                rgb(1.0, 1.0, 1.0),
                &fonts.bold,
            );
        }
        Block::BodyRow {
            kind,
            cells,
            shaded,
        } => {
            let fill = shaded.then(|| rgb(0.93, 0.95, 0.98));
            let texts = [cells[0].as_str(), cells[1].as_str()];
            draw_cells(layer, *kind, bottom, fill, &texts, black, &fonts.regular);
        }
        Block::Note(text) => {
            layer.set_fill_color(rgb(0.35, 0.35, 0.35));
            layer.use_text(text.as_str(), 9.0, Mm(MARGIN), baseline, &fonts.italic);
        }
    }
}

fn draw_cells(
    layer: &PdfLayerReference,
    kind: TableKind,
    bottom: f32,
    fill: Option<Color>,
    texts: &[&str; 2],
    text_color: Color,
    font: &IndirectFontRef,
) {
    let mut left = MARGIN;
    layer.set_outline_color(rgb(0.6, 0.6, 0.6));
    layer.set_outline_thickness(0.5);

    for (width, text) in kind.widths().into_iter().zip(texts.iter()) {
        let mode = match &fill {
            Some(color) => {
                layer.set_fill_color(color.clone());
                PaintMode::FillStroke
            }
            None => PaintMode::Stroke,
        };
        let cell = Rect::new(
            Mm(left),
            Mm(bottom),
            Mm(left + width),
            Mm(bottom + ROW_HEIGHT),
        )
        .with_mode(mode);
        layer.add_rect(cell);

        layer.set_fill_color(text_color.clone());
        layer.use_text(*text, 9.0, Mm(left + 2.0), Mm(bottom + 2.5), font);
        left += width;
    }
}
