use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Number,
    Date,
    SingleChoice,
    MultipleChoice,
    Rating,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::Number => "number",
            QuestionType::Date => "date",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Rating => "rating",
        }
    }

    /// Accepts the canonical names plus the Spanish aliases the survey
    /// builder front-end sends.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" | "texto" => Some(QuestionType::Text),
            "number" | "numero" => Some(QuestionType::Number),
            "date" | "fecha" => Some(QuestionType::Date),
            "single_choice" | "seleccion" => Some(QuestionType::SingleChoice),
            "multiple_choice" | "multiple" => Some(QuestionType::MultipleChoice),
            "rating" | "calificacion" => Some(QuestionType::Rating),
            _ => None,
        }
    }

    /// Closed-ended questions are reported as option frequencies, the rest
    /// as verbatim answers.
    pub fn is_closed_ended(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::Rating
        )
    }

    pub fn requires_options(self) -> bool {
        matches!(self, QuestionType::SingleChoice | QuestionType::MultipleChoice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Web,
    Messaging,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Messaging => "messaging",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "web" => Some(Channel::Web),
            "messaging" | "whatsapp" => Some(Channel::Messaging),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(UserStatus::Active),
            "inactive" => Some(UserStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Creator,
    Analyst,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Creator => "creator",
            Role::Analyst => "analyst",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "creator" => Some(Role::Creator),
            "analyst" => Some(Role::Analyst),
            _ => None,
        }
    }

    /// The single rule for every report-producing endpoint.
    pub fn may_view_reports(self) -> bool {
        matches!(self, Role::Admin | Role::Analyst)
    }

    /// Admins may do anything a creator can.
    pub fn may_author_surveys(self) -> bool {
        matches!(self, Role::Admin | Role::Creator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub nit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAccount {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Survey header as seen by the report loader, already scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyRecord {
    pub id: i64,
    pub company_id: i64,
    pub title: String,
    pub description: Option<String>,
}

/// One answer joined with its question and response header.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRow {
    pub question_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub value: String,
    pub channel: Channel,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionCount {
    pub option: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerbatimEntry {
    pub value: String,
    pub submitted_at: DateTime<Utc>,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryShape {
    /// Option label counts in first-seen order.
    Breakdown(Vec<OptionCount>),
    /// Raw answers, newest first.
    VerbatimList(Vec<VerbatimEntry>),
}

impl SummaryShape {
    pub fn for_type(question_type: QuestionType) -> Self {
        if question_type.is_closed_ended() {
            SummaryShape::Breakdown(Vec::new())
        } else {
            SummaryShape::VerbatimList(Vec::new())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSummary {
    pub question_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub total_answers: u64,
    pub shape: SummaryShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurveyOverview {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Distinct `submitted_at` values across the joined rows. Two responses
    /// sharing a timestamp are counted once.
    pub total_unique_submission_timestamps: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportResult {
    pub survey: SurveyOverview,
    pub questions: Vec<QuestionSummary>,
}

/// One answer joined with its response header, for the per-response view.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRow {
    pub response_id: i64,
    pub channel: Channel,
    pub submitted_at: DateTime<Utc>,
    pub question_id: i64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualResponse {
    pub response_id: i64,
    pub submitted_at: DateTime<Utc>,
    pub channel: Channel,
    pub answers: BTreeMap<i64, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualSurvey {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub total_responses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualReport {
    pub survey: IndividualSurvey,
    pub questions: Vec<SurveyQuestion>,
    pub responses: Vec<IndividualResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionOption {
    pub id: i64,
    pub text: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyQuestion {
    pub id: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub order: i32,
    pub options: Vec<QuestionOption>,
}

/// Survey as served to respondents through its short link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicSurvey {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub questions: Vec<SurveyQuestion>,
}

/// Row of the tenant's survey listing, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyListing {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub link_slug: Option<String>,
    pub created_by: i64,
    pub creator_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Full survey as seen by its owning tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyDetail {
    pub id: i64,
    pub company_id: i64,
    pub created_by: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub link_slug: Option<String>,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<SurveyQuestion>,
}

/// Partial update of survey metadata. The outer `None` leaves a field
/// untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurveyChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
}

impl SurveyChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOption {
    pub text: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub text: String,
    pub question_type: QuestionType,
    pub options: Vec<NewOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSurvey {
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedSurvey {
    pub id: i64,
    pub link_slug: String,
    pub questions: Vec<SurveyQuestion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnswer {
    pub question_id: i64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResponse {
    pub survey_id: i64,
    pub channel: Channel,
    pub respondent_identifier: Option<String>,
    pub answers: Vec<NewAnswer>,
}

/// Answers are always stored as text; multi-select arrays are comma-joined.
pub fn flatten_answer_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(flatten_answer_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
