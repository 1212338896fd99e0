use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};

use super::{format_timestamp, ExportError};
use crate::models::{ReportResult, SummaryShape};

const SHEET_NAME: &str = "Reporte";
const LABEL_WIDTH: f64 = 60.0;
const VALUE_WIDTH: f64 = 20.0;
/// Longest string a worksheet cell accepts.
pub const MAX_CELL_CHARS: usize = 32_767;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Count(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetRow {
    Title(String),
    Total(usize),
    Blank,
    Section { label: String, total_answers: u64 },
    Entry { label: String, value: CellValue },
}

fn cell_text(value: String) -> String {
    if value.chars().count() > MAX_CELL_CHARS {
        value.chars().take(MAX_CELL_CHARS).collect()
    } else {
        value
    }
}

/// Flattens the report into worksheet rows, in report order.
pub fn sheet_rows(report: &ReportResult) -> Vec<SheetRow> {
    let mut rows = vec![
        SheetRow::Title(cell_text(format!("Reporte: {}", report.survey.title))),
        SheetRow::Total(report.survey.total_unique_submission_timestamps),
        SheetRow::Blank,
    ];

    for summary in &report.questions {
        rows.push(SheetRow::Section {
            label: cell_text(summary.question_text.clone()),
            total_answers: summary.total_answers,
        });

        match &summary.shape {
            SummaryShape::Breakdown(counts) => {
                rows.extend(counts.iter().map(|entry| SheetRow::Entry {
                    label: cell_text(format!("  {}", entry.option)),
                    value: CellValue::Count(entry.count),
                }));
            }
            SummaryShape::VerbatimList(entries) => {
                rows.extend(entries.iter().map(|entry| SheetRow::Entry {
                    label: cell_text(format!("  {}", entry.value)),
                    value: CellValue::Text(format_timestamp(&entry.submitted_at)),
                }));
            }
        }

        rows.push(SheetRow::Blank);
    }

    rows
}

pub fn render(report: &ReportResult) -> Result<Vec<u8>, ExportError> {
    let title_format = Format::new().set_bold().set_font_size(14);
    let header_format = Format::new().set_bold();
    let section_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9E1F2))
        .set_border_bottom(FormatBorder::Thin);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;
    worksheet.set_column_width(0, LABEL_WIDTH)?;
    worksheet.set_column_width(1, VALUE_WIDTH)?;

    for (index, row) in sheet_rows(report).into_iter().enumerate() {
        let line = index as u32;
        match row {
            SheetRow::Title(text) => {
                worksheet.write_string_with_format(line, 0, &text, &title_format)?;
            }
            SheetRow::Total(total) => {
                worksheet.write_string_with_format(line, 0, "Total de respuestas", &header_format)?;
                worksheet.write_number(line, 1, total as f64)?;
            }
            SheetRow::Blank => {}
            SheetRow::Section {
                label,
                total_answers,
            } => {
                worksheet.write_string_with_format(line, 0, &label, &section_format)?;
                worksheet.write_number_with_format(
                    line,
                    1,
                    total_answers as f64,
                    &section_format,
                )?;
            }
            SheetRow::Entry { label, value } => {
                worksheet.write_string(line, 0, &label)?;
                match value {
                    CellValue::Count(count) => {
                        worksheet.write_number(line, 1, count as f64)?;
                    }
                    CellValue::Text(text) => {
                        worksheet.write_string(line, 1, &text)?;
                    }
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
