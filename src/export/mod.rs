//! Report encoders. Every encoder is a synchronous function of a
//! [`ReportResult`](crate::models::ReportResult) and never reorders it.

pub mod json;
pub mod pdf;
pub mod xlsx;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::ApiError;
use crate::models::ReportResult;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("spreadsheet encoding failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("document encoding failed: {0}")]
    Pdf(String),
}

/// Binary export formats selectable through `?format=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Pdf,
}

impl ExportFormat {
    /// A missing or unknown discriminator is a client error; there is no
    /// default format.
    pub fn from_query(value: Option<&str>) -> Result<Self, ApiError> {
        match value {
            None | Some("") => Err(ApiError::Validation(
                "Se requiere el parámetro 'format' (xlsx o pdf)".to_string(),
            )),
            Some(raw) => raw.parse(),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn file_name(self, survey_id: i64) -> String {
        format!("reporte_encuesta_{survey_id}.{}", self.extension())
    }

    pub fn encode(self, report: &ReportResult) -> Result<Vec<u8>, ExportError> {
        match self {
            ExportFormat::Xlsx => xlsx::render(report),
            ExportFormat::Pdf => pdf::render(report),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "xlsx" => Ok(ExportFormat::Xlsx),
            "pdf" => Ok(ExportFormat::Pdf),
            _ => Err(ApiError::Validation(
                "Formato no válido. Use 'xlsx' o 'pdf'".to_string(),
            )),
        }
    }
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}
