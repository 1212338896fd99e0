use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Channel, OptionCount, QuestionType, ReportResult, SummaryShape};

#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub company: i64,
    pub survey: JsonSurvey,
    pub results: Vec<JsonQuestion>,
}

#[derive(Debug, Serialize)]
pub struct JsonSurvey {
    pub id: i64,
    pub title: String,
    pub total_responses: usize,
}

#[derive(Debug, Serialize)]
pub struct JsonQuestion {
    pub question_id: i64,
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub total_answers: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<OptionCount>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<JsonAnswer>>,
}

#[derive(Debug, Serialize)]
pub struct JsonAnswer {
    pub value: String,
    pub date: DateTime<Utc>,
    pub channel: Channel,
}

pub fn to_json(company_id: i64, report: &ReportResult) -> JsonReport {
    let results = report
        .questions
        .iter()
        .map(|summary| {
            let (breakdown, data) = match &summary.shape {
                SummaryShape::Breakdown(counts) => (Some(counts.clone()), None),
                SummaryShape::VerbatimList(entries) => (
                    None,
                    Some(
                        entries
                            .iter()
                            .map(|entry| JsonAnswer {
                                value: entry.value.clone(),
                                date: entry.submitted_at,
                                channel: entry.channel,
                            })
                            .collect(),
                    ),
                ),
            };

            JsonQuestion {
                question_id: summary.question_id,
                question: summary.question_text.clone(),
                question_type: summary.question_type,
                total_answers: summary.total_answers,
                breakdown,
                data,
            }
        })
        .collect();

    JsonReport {
        company: company_id,
        survey: JsonSurvey {
            id: report.survey.id,
            title: report.survey.title.clone(),
            total_responses: report.survey.total_unique_submission_timestamps,
        },
        results,
    }
}
