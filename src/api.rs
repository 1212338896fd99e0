//! HTTP surface: public survey links, response intake and tenant reports.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::config::ServerSettings;
use crate::error::ApiError;
use crate::export::json::to_json;
use crate::export::ExportFormat;
use crate::models::{
    flatten_answer_value, Channel, CreatedSurvey, NewAnswer, NewOption, NewQuestion,
    NewResponse, NewSurvey, NewUser, QuestionType, Role, SurveyChanges,
};
use crate::report;
use crate::store::SurveyStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SurveyStore>,
    pub jwt_secret: Arc<str>,
    pub public_base_url: Arc<str>,
    pub started: std::time::Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn SurveyStore>, jwt_secret: &str, public_base_url: &str) -> Self {
        Self {
            store,
            jwt_secret: Arc::from(jwt_secret),
            public_base_url: Arc::from(public_base_url.trim_end_matches('/')),
            started: std::time::Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/companies", post(create_company_handler))
        .route("/users", post(create_user_handler))
        .route("/s/{slug}", get(survey_by_slug_handler))
        .route("/surveys", get(list_surveys_handler).post(create_survey_handler))
        .route(
            "/surveys/{survey_id}",
            get(get_survey_handler)
                .put(update_survey_handler)
                .delete(delete_survey_handler),
        )
        .route("/surveys/{survey_id}/duplicate", post(duplicate_survey_handler))
        .route("/surveys/{survey_id}/questions", post(add_question_handler))
        .route(
            "/surveys/{survey_id}/questions/{question_id}",
            delete(delete_question_handler),
        )
        .route("/surveys/{survey_id}/responses", post(submit_response_handler))
        .route("/webhooks/messaging", post(messaging_webhook_handler))
        .route("/reports/{survey_id}", get(report_handler))
        .route("/reports/{survey_id}/responses", get(individual_responses_handler))
        .route("/reports/{survey_id}/export", get(export_handler))
        .with_state(state)
}

pub async fn serve(state: AppState, settings: &ServerSettings) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = TcpListener::bind(&settings.bind).await?;
    info!("FeedFlow API listening on {}", settings.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}

#[derive(Debug, Deserialize)]
struct CreateCompanyRequest {
    name: Option<String>,
    nit: Option<String>,
}

#[instrument(skip(state, identity, request), fields(user_id = identity.user_id))]
async fn create_company_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_admin()?;
    let name = request
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("El campo 'name' es obligatorio".to_string()))?;
    let nit = request.nit.filter(|nit| !nit.trim().is_empty());

    let company = state
        .store
        .create_company(name.trim(), nit.as_deref())
        .await?
        .ok_or_else(|| ApiError::Validation("El NIT ya está registrado".to_string()))?;
    info!(company_id = company.id, "company created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Empresa creada exitosamente", "data": company })),
    ))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    name: Option<String>,
    email: Option<String>,
    role: Option<String>,
}

impl CreateUserRequest {
    /// Admin accounts are never created through the API.
    fn validate(self) -> Result<NewUser, ApiError> {
        let (Some(name), Some(email), Some(role)) = (self.name, self.email, self.role) else {
            return Err(ApiError::Validation(
                "Los campos 'name', 'email' y 'role' son obligatorios".to_string(),
            ));
        };
        let email = email.trim().to_lowercase();
        if name.trim().is_empty() || !email.contains('@') {
            return Err(ApiError::Validation("Nombre o email inválido".to_string()));
        }
        let role = match Role::parse(&role) {
            Some(role @ (Role::Creator | Role::Analyst)) => role,
            _ => {
                return Err(ApiError::Validation(
                    "El rol debe ser 'creator' o 'analyst'".to_string(),
                ))
            }
        };
        Ok(NewUser {
            name: name.trim().to_string(),
            email,
            role,
        })
    }
}

#[instrument(skip(state, identity, request), fields(company_id = identity.company_id))]
async fn create_user_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_admin()?;
    let user = request.validate()?;

    let account = state
        .store
        .create_user(identity.company_id, &user)
        .await?
        .ok_or_else(|| ApiError::Validation("El email ya está registrado".to_string()))?;
    info!(user_id = account.id, role = account.role.as_str(), "user created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Usuario creado exitosamente", "data": account })),
    ))
}

#[instrument(skip(state, identity), fields(company_id = identity.company_id))]
async fn report_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_report_access()?;
    let report = report::load_report(state.store.as_ref(), survey_id, identity.company_id).await?;
    Ok(Json(to_json(identity.company_id, &report)))
}

#[instrument(skip(state, identity), fields(company_id = identity.company_id))]
async fn individual_responses_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_report_access()?;
    let report =
        report::load_individual_report(state.store.as_ref(), survey_id, identity.company_id)
            .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[instrument(skip(state, identity, query), fields(company_id = identity.company_id))]
async fn export_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    identity.ensure_report_access()?;
    let format = ExportFormat::from_query(query.format.as_deref())?;

    let report = report::load_report(state.store.as_ref(), survey_id, identity.company_id).await?;
    let bytes = tokio::task::spawn_blocking(move || format.encode(&report)).await??;
    info!(survey_id, format = format.extension(), bytes = bytes.len(), "report exported");

    let disposition = format!("attachment; filename=\"{}\"", format.file_name(survey_id));
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OptionInput {
    Plain(String),
    Detailed { text: String, value: Option<String> },
}

#[derive(Debug, Deserialize)]
struct QuestionInput {
    text: Option<String>,
    #[serde(rename = "type")]
    question_type: Option<String>,
    #[serde(default)]
    options: Vec<OptionInput>,
}

#[derive(Debug, Deserialize)]
struct CreateSurveyRequest {
    title: Option<String>,
    description: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    #[serde(default)]
    questions: Vec<QuestionInput>,
}

impl QuestionInput {
    /// `number` is the 1-based position used in error messages.
    fn validate(self, number: usize) -> Result<NewQuestion, ApiError> {
        let incomplete =
            || ApiError::Validation(format!("La pregunta #{number} está incompleta"));
        let text = self
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(incomplete)?;
        let raw_type = self.question_type.ok_or_else(incomplete)?;
        let question_type = QuestionType::parse(&raw_type).ok_or_else(|| {
            ApiError::Validation(format!(
                "Tipo de pregunta inválido en pregunta #{number}: '{raw_type}'"
            ))
        })?;

        if question_type.requires_options() && self.options.is_empty() {
            return Err(ApiError::Validation(format!(
                "La pregunta #{number} de tipo '{}' requiere opciones",
                question_type.as_str()
            )));
        }

        let options = self
            .options
            .into_iter()
            .map(|option| match option {
                OptionInput::Plain(text) => NewOption {
                    value: Some(text.clone()),
                    text,
                },
                OptionInput::Detailed { text, value } => NewOption { text, value },
            })
            .collect();

        Ok(NewQuestion {
            text,
            question_type,
            options,
        })
    }
}

impl CreateSurveyRequest {
    fn validate(self) -> Result<NewSurvey, ApiError> {
        let title = self
            .title
            .filter(|title| !title.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("El campo 'title' es obligatorio".to_string()))?;

        let questions = self
            .questions
            .into_iter()
            .enumerate()
            .map(|(index, input)| input.validate(index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NewSurvey {
            title,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            questions,
        })
    }
}

const SLUG_ATTEMPTS: usize = 5;

fn new_slug() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Draws slugs from `next` until one is free.
async fn unique_slug(
    store: &dyn SurveyStore,
    mut next: impl FnMut() -> String,
) -> Result<String, ApiError> {
    for _ in 0..SLUG_ATTEMPTS {
        let slug = next();
        if !store.slug_exists(&slug).await? {
            return Ok(slug);
        }
        debug!(slug = %slug, "link slug already taken");
    }
    Err(ApiError::Internal(format!(
        "no free link slug after {SLUG_ATTEMPTS} attempts"
    )))
}

fn created_survey_body(
    state: &AppState,
    identity: &Identity,
    survey: &NewSurvey,
    created: &CreatedSurvey,
    message: &str,
) -> serde_json::Value {
    let short_link = format!("{}/s/{}", state.public_base_url, created.link_slug);
    json!({
        "message": message,
        "data": {
            "id": created.id,
            "link_slug": created.link_slug,
            "title": survey.title,
            "description": survey.description,
            "start_date": survey.start_date,
            "end_date": survey.end_date,
            "company_id": identity.company_id,
            "created_by": identity.user_id,
            "questions": created.questions,
            "links": {
                "short_link": short_link,
                "qr_code": format!(
                    "https://api.qrserver.com/v1/create-qr-code/?size=150x150&data={short_link}"
                ),
            },
        },
    })
}

#[instrument(skip(state, identity, request), fields(company_id = identity.company_id))]
async fn create_survey_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<CreateSurveyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_survey_authoring()?;
    let survey = request.validate()?;
    let slug = unique_slug(state.store.as_ref(), new_slug).await?;

    let created = state
        .store
        .create_survey(identity.company_id, identity.user_id, &survey, &slug)
        .await?;
    info!(survey_id = created.id, slug = %created.link_slug, "survey created");

    let body = created_survey_body(
        &state,
        &identity,
        &survey,
        &created,
        "Encuesta creada exitosamente",
    );
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip(state, identity), fields(company_id = identity.company_id))]
async fn list_surveys_handler(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let surveys = state.store.list_surveys(identity.company_id).await?;
    Ok(Json(json!({ "data": surveys })))
}

#[instrument(skip(state, identity), fields(company_id = identity.company_id))]
async fn get_survey_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let survey = state
        .store
        .survey_detail(survey_id, identity.company_id)
        .await?
        .ok_or_else(survey_not_found)?;
    Ok(Json(json!({ "data": survey })))
}

fn survey_not_found() -> ApiError {
    ApiError::NotFound("Encuesta no encontrada".to_string())
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct UpdateSurveyRequest {
    title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    end_date: Option<Option<NaiveDate>>,
}

impl UpdateSurveyRequest {
    fn validate(self) -> Result<SurveyChanges, ApiError> {
        if self.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(ApiError::Validation(
                "El campo 'title' no puede estar vacío".to_string(),
            ));
        }
        let changes = SurveyChanges {
            title: self.title,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
        };
        if changes.is_empty() {
            return Err(ApiError::Validation(
                "No se proporcionaron campos para actualizar".to_string(),
            ));
        }
        Ok(changes)
    }
}

#[instrument(skip(state, identity, request), fields(company_id = identity.company_id))]
async fn update_survey_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
    Json(request): Json<UpdateSurveyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_survey_authoring()?;
    let changes = request.validate()?;

    if !state
        .store
        .update_survey(survey_id, identity.company_id, &changes)
        .await?
    {
        return Err(survey_not_found());
    }
    info!(survey_id, "survey updated");

    let survey = state
        .store
        .survey_detail(survey_id, identity.company_id)
        .await?
        .ok_or_else(survey_not_found)?;
    Ok(Json(json!({
        "message": "Encuesta actualizada exitosamente",
        "data": survey,
    })))
}

#[instrument(skip(state, identity), fields(company_id = identity.company_id))]
async fn delete_survey_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_survey_authoring()?;
    if !state
        .store
        .delete_survey(survey_id, identity.company_id)
        .await?
    {
        return Err(survey_not_found());
    }
    info!(survey_id, "survey deleted");
    Ok(Json(json!({ "message": "Encuesta eliminada exitosamente" })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DuplicateSurveyRequest {
    title: Option<String>,
    description: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

/// Copies a survey's metadata, questions and options under a new link.
/// Responses stay with the original.
#[instrument(skip(state, identity, body), fields(company_id = identity.company_id))]
async fn duplicate_survey_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_survey_authoring()?;
    let request: DuplicateSurveyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DuplicateSurveyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::Validation(format!("Cuerpo inválido: {err}")))?
    };
    let source = state
        .store
        .survey_detail(survey_id, identity.company_id)
        .await?
        .ok_or_else(survey_not_found)?;

    let survey = NewSurvey {
        title: request
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| format!("{} (Copia)", source.title)),
        description: request.description.or(source.description),
        start_date: request.start_date.or(source.start_date),
        end_date: request.end_date.or(source.end_date),
        questions: source
            .questions
            .into_iter()
            .map(|question| NewQuestion {
                text: question.text,
                question_type: question.question_type,
                options: question
                    .options
                    .into_iter()
                    .map(|option| NewOption {
                        text: option.text,
                        value: option.value,
                    })
                    .collect(),
            })
            .collect(),
    };

    let slug = unique_slug(state.store.as_ref(), new_slug).await?;
    let created = state
        .store
        .create_survey(identity.company_id, identity.user_id, &survey, &slug)
        .await?;
    info!(source_id = survey_id, survey_id = created.id, "survey duplicated");

    let body = created_survey_body(
        &state,
        &identity,
        &survey,
        &created,
        "Encuesta duplicada exitosamente",
    );
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip(state, identity, input), fields(company_id = identity.company_id))]
async fn add_question_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(survey_id): Path<i64>,
    Json(input): Json<QuestionInput>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_survey_authoring()?;
    let survey = state
        .store
        .survey_detail(survey_id, identity.company_id)
        .await?
        .ok_or_else(survey_not_found)?;
    let question = input.validate(survey.questions.len() + 1)?;

    let stored = state.store.add_question(survey_id, &question).await?;
    info!(survey_id, question_id = stored.id, "question added");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Pregunta agregada exitosamente", "data": stored })),
    ))
}

#[instrument(skip(state, identity), fields(company_id = identity.company_id))]
async fn delete_question_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path((survey_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    identity.ensure_survey_authoring()?;
    if state
        .store
        .find_survey(survey_id, identity.company_id)
        .await?
        .is_none()
    {
        return Err(survey_not_found());
    }
    if !state.store.delete_question(survey_id, question_id).await? {
        return Err(ApiError::NotFound("Pregunta no encontrada".to_string()));
    }
    info!(survey_id, question_id, "question deleted");
    Ok(Json(json!({ "message": "Pregunta eliminada exitosamente" })))
}

#[instrument(skip(state))]
async fn survey_by_slug_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let survey = state
        .store
        .survey_by_slug(&slug)
        .await?
        .ok_or_else(survey_not_found)?;
    Ok(Json(json!({ "data": survey })))
}

#[derive(Debug, Deserialize)]
struct AnswerInput {
    question_id: i64,
    #[serde(default)]
    value: serde_json::Value,
}

/// Rejects answers naming a question that is not part of the survey.
async fn survey_answers(
    store: &dyn SurveyStore,
    survey_id: i64,
    inputs: Vec<AnswerInput>,
) -> Result<Vec<NewAnswer>, ApiError> {
    if !store.survey_exists(survey_id).await? {
        return Err(survey_not_found());
    }

    let known: HashSet<i64> = store
        .survey_questions(survey_id)
        .await?
        .into_iter()
        .map(|question| question.id)
        .collect();
    if let Some(foreign) = inputs
        .iter()
        .find(|input| !known.contains(&input.question_id))
    {
        warn!(
            survey_id,
            question_id = foreign.question_id,
            "answer names a question outside the survey"
        );
        return Err(ApiError::Validation(format!(
            "La pregunta {} no pertenece a esta encuesta",
            foreign.question_id
        )));
    }

    Ok(inputs
        .into_iter()
        .map(|input| NewAnswer {
            question_id: input.question_id,
            value: flatten_answer_value(&input.value),
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct SubmitResponseRequest {
    respondent_identifier: Option<String>,
    answers: Option<Vec<AnswerInput>>,
}

#[instrument(skip(state, request))]
async fn submit_response_handler(
    State(state): State<AppState>,
    Path(survey_id): Path<i64>,
    Json(request): Json<SubmitResponseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answers = request
        .answers
        .filter(|answers| !answers.is_empty())
        .ok_or_else(|| {
            ApiError::Validation("Se requieren respuestas para procesar la encuesta".to_string())
        })?;

    let answers = survey_answers(state.store.as_ref(), survey_id, answers).await?;

    let response_id = state
        .store
        .submit_response(&NewResponse {
            survey_id,
            channel: Channel::Web,
            respondent_identifier: request.respondent_identifier,
            answers,
        })
        .await?;
    info!(response_id, "web response stored");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Respuestas guardadas exitosamente",
            "data": { "response_id": response_id },
        })),
    ))
}

/// Payload of the messaging provider after its bot has collected every answer.
#[derive(Debug, Deserialize)]
struct MessagingWebhook {
    from: Option<String>,
    survey_id: Option<i64>,
    answers: Option<Vec<AnswerInput>>,
}

#[instrument(skip(state, payload))]
async fn messaging_webhook_handler(
    State(state): State<AppState>,
    Json(payload): Json<MessagingWebhook>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(survey_id), Some(answers)) = (payload.survey_id, payload.answers) else {
        return Err(ApiError::Validation(
            "Payload inválido para el canal de mensajería".to_string(),
        ));
    };

    let answers = survey_answers(state.store.as_ref(), survey_id, answers).await?;

    let response_id = state
        .store
        .submit_response(&NewResponse {
            survey_id,
            channel: Channel::Messaging,
            respondent_identifier: payload.from,
            answers,
        })
        .await?;
    info!(survey_id, response_id, "messaging response stored");

    Ok(Json(json!({ "status": "success", "response_id": response_id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{sign_token, Claims};
    use crate::models::UserStatus;
    use crate::store::memory::MemoryStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    const SECRET: &str = "router-secret";
    const ADMIN: i64 = 100;
    const CREATOR: i64 = 101;
    const ANALYST: i64 = 102;
    const INACTIVE: i64 = 103;
    const OUTSIDER: i64 = 200;

    struct Fixture {
        store: Arc<MemoryStore>,
        survey_id: i64,
        choice_id: i64,
        text_id: i64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.add_user(ADMIN, 1, Role::Admin, UserStatus::Active);
        store.add_user(CREATOR, 1, Role::Creator, UserStatus::Active);
        store.add_user(ANALYST, 1, Role::Analyst, UserStatus::Active);
        store.add_user(INACTIVE, 1, Role::Analyst, UserStatus::Inactive);
        store.add_user(OUTSIDER, 2, Role::Admin, UserStatus::Active);

        let survey_id = store.add_survey(1, "Clima", "clima001");
        let choice_id = store.add_question(survey_id, "¿Te gusta?", QuestionType::SingleChoice, 0);
        let text_id = store.add_question(survey_id, "Comentarios", QuestionType::Text, 1);
        let at = |minute| Utc.with_ymd_and_hms(2026, 5, 1, 12, minute, 0).unwrap();
        store.add_response(survey_id, Channel::Web, at(1), &[(choice_id, "Mucho"), (text_id, "")]);
        store.add_response(
            survey_id,
            Channel::Messaging,
            at(2),
            &[(choice_id, "Mucho"), (text_id, "Bien")],
        );

        Fixture {
            store,
            survey_id,
            choice_id,
            text_id,
        }
    }

    fn router(fixture: &Fixture) -> Router {
        build_router(AppState::new(
            fixture.store.clone(),
            SECRET,
            "https://feedflow.test/",
        ))
    }

    fn token(user_id: i64, company_id: i64, role: Role) -> String {
        let claims = Claims {
            sub: user_id,
            company_id,
            role,
            exp: Utc::now().timestamp() + 3_600,
        };
        sign_token(&claims, SECRET.as_bytes()).unwrap()
    }

    fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(bearer) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {bearer}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
        send_json("POST", uri, bearer, body)
    }

    fn send_json(method: &str, uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(bearer) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {bearer}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn delete(uri: &str, bearer: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let fixture = fixture();
        let response = router(&fixture).oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn report_requires_token() {
        let fixture = fixture();
        let uri = format!("/reports/{}", fixture.survey_id);
        let response = router(&fixture).oneshot(get(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn creator_cannot_read_reports() {
        let fixture = fixture();
        let uri = format!("/reports/{}", fixture.survey_id);
        let bearer = token(CREATOR, 1, Role::Creator);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn inactive_user_is_rejected() {
        let fixture = fixture();
        let uri = format!("/reports/{}", fixture.survey_id);
        let bearer = token(INACTIVE, 1, Role::Analyst);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn analyst_receives_aggregated_report() {
        let fixture = fixture();
        let uri = format!("/reports/{}", fixture.survey_id);
        let bearer = token(ANALYST, 1, Role::Analyst);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["survey"]["total_responses"], 2);
        assert_eq!(body["results"][0]["question_id"], fixture.choice_id);
        assert_eq!(body["results"][0]["breakdown"][0]["option"], "Mucho");
        assert_eq!(body["results"][0]["breakdown"][0]["count"], 2);
        assert_eq!(body["results"][1]["question_id"], fixture.text_id);
        assert_eq!(body["results"][1]["data"][0]["value"], "Bien");
        assert_eq!(body["results"][1]["data"][1]["value"], "");
    }

    #[tokio::test]
    async fn other_tenant_gets_not_found() {
        let fixture = fixture();
        let uri = format!("/reports/{}", fixture.survey_id);
        let bearer = token(OUTSIDER, 2, Role::Admin);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn token_naming_another_company_is_rejected() {
        let fixture = fixture();
        let uri = format!("/reports/{}", fixture.survey_id);
        let bearer = token(ADMIN, 2, Role::Admin);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_survey_reports_no_results() {
        let fixture = fixture();
        let empty_id = fixture.store.add_survey(1, "Vacía", "vacia001");
        let uri = format!("/reports/{empty_id}");
        let bearer = token(ADMIN, 1, Role::Admin);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["results"], Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn individual_responses_list_each_submission() {
        let fixture = fixture();
        let uri = format!("/reports/{}/responses", fixture.survey_id);
        let bearer = token(ANALYST, 1, Role::Analyst);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["survey"]["total_responses"], 2);
        assert_eq!(body["responses"][0]["channel"], "messaging");
        let key = fixture.text_id.to_string();
        assert_eq!(body["responses"][0]["answers"][key.as_str()], "Bien");
        assert_eq!(body["questions"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn unsupported_export_format_is_bad_request() {
        let fixture = fixture();
        let bearer = token(ANALYST, 1, Role::Analyst);
        for query in ["?format=csv", ""] {
            let uri = format!("/reports/{}/export{query}", fixture.survey_id);
            let response = router(&fixture)
                .oneshot(get(&uri, Some(&bearer)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = json_body(response).await;
            assert_eq!(body["code"], 400);
        }
    }

    #[tokio::test]
    async fn spreadsheet_export_sets_headers() {
        let fixture = fixture();
        let uri = format!("/reports/{}/export?format=xlsx", fixture.survey_id);
        let bearer = token(ANALYST, 1, Role::Analyst);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            ExportFormat::Xlsx.content_type()
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(".xlsx"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn document_export_returns_pdf() {
        let fixture = fixture();
        let uri = format!("/reports/{}/export?format=pdf", fixture.survey_id);
        let bearer = token(ADMIN, 1, Role::Admin);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn web_submission_flows_into_report() {
        let fixture = fixture();
        let submit = post_json(
            &format!("/surveys/{}/responses", fixture.survey_id),
            None,
            json!({ "answers": [{ "question_id": fixture.choice_id, "value": ["Poco"] }] }),
        );
        let response = router(&fixture).oneshot(submit).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bearer = token(ANALYST, 1, Role::Analyst);
        let report = router(&fixture)
            .oneshot(get(&format!("/reports/{}", fixture.survey_id), Some(&bearer)))
            .await
            .unwrap();
        let body = json_body(report).await;
        assert_eq!(body["results"][0]["total_answers"], 3);
    }

    #[tokio::test]
    async fn submission_without_answers_is_rejected() {
        let fixture = fixture();
        let submit = post_json(
            &format!("/surveys/{}/responses", fixture.survey_id),
            None,
            json!({ "answers": [] }),
        );
        let response = router(&fixture).oneshot(submit).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn messaging_webhook_stores_response() {
        let fixture = fixture();
        let payload = json!({
            "from": "+573000000000",
            "survey_id": fixture.survey_id,
            "answers": [{ "question_id": fixture.text_id, "value": "Excelente" }],
        });
        let response = router(&fixture)
            .oneshot(post_json("/webhooks/messaging", None, payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");

        let missing = router(&fixture)
            .oneshot(post_json("/webhooks/messaging", None, json!({ "from": "x" })))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn creator_builds_survey_reachable_by_slug() {
        let fixture = fixture();
        let bearer = token(CREATOR, 1, Role::Creator);
        let request = post_json(
            "/surveys",
            Some(&bearer),
            json!({
                "title": "Nueva",
                "questions": [
                    { "text": "¿Volvería?", "type": "seleccion", "options": ["Sí", { "text": "No", "value": "no" }] },
                    { "text": "Comentarios", "type": "texto" }
                ]
            }),
        );
        let response = router(&fixture).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        let slug = body["data"]["link_slug"].as_str().unwrap().to_string();
        assert_eq!(
            body["data"]["links"]["short_link"],
            format!("https://feedflow.test/s/{slug}")
        );
        assert_eq!(body["data"]["questions"][0]["type"], "single_choice");

        let public = router(&fixture)
            .oneshot(get(&format!("/s/{slug}"), None))
            .await
            .unwrap();
        assert_eq!(public.status(), StatusCode::OK);
        let body = json_body(public).await;
        assert_eq!(body["data"]["questions"][0]["options"][1]["value"], "no");
    }

    #[tokio::test]
    async fn choice_question_without_options_is_rejected() {
        let fixture = fixture();
        let bearer = token(CREATOR, 1, Role::Creator);
        let request = post_json(
            "/surveys",
            Some(&bearer),
            json!({ "title": "Mala", "questions": [{ "text": "¿Cuál?", "type": "multiple" }] }),
        );
        let response = router(&fixture).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyst_cannot_create_surveys() {
        let fixture = fixture();
        let bearer = token(ANALYST, 1, Role::Analyst);
        let request = post_json("/surveys", Some(&bearer), json!({ "title": "X" }));
        let response = router(&fixture).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn submission_naming_foreign_question_is_rejected() {
        let fixture = fixture();
        let other_survey = fixture.store.add_survey(2, "Ajena", "ajena001");
        let foreign_id = fixture
            .store
            .add_question(other_survey, "Secreta", QuestionType::Text, 0);

        for unknown in [foreign_id, 9_999] {
            let submit = post_json(
                &format!("/surveys/{}/responses", fixture.survey_id),
                None,
                json!({ "answers": [
                    { "question_id": fixture.text_id, "value": "ok" },
                    { "question_id": unknown, "value": "fuga" }
                ] }),
            );
            let response = router(&fixture).oneshot(submit).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body = json_body(response).await;
            assert_eq!(
                body["error"],
                format!("La pregunta {unknown} no pertenece a esta encuesta")
            );
        }

        let webhook = post_json(
            "/webhooks/messaging",
            None,
            json!({
                "from": "+573000000000",
                "survey_id": fixture.survey_id,
                "answers": [{ "question_id": foreign_id, "value": "fuga" }],
            }),
        );
        let response = router(&fixture).oneshot(webhook).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bearer = token(ANALYST, 1, Role::Analyst);
        let report = router(&fixture)
            .oneshot(get(&format!("/reports/{}", fixture.survey_id), Some(&bearer)))
            .await
            .unwrap();
        let body = json_body(report).await;
        assert_eq!(body["survey"]["total_responses"], 2);
        assert_eq!(body["results"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn admin_creates_company_once_per_nit() {
        let fixture = fixture();
        let bearer = token(ADMIN, 1, Role::Admin);
        let payload = json!({ "name": "Panadería Sol", "nit": "900123" });

        let response = router(&fixture)
            .oneshot(post_json("/companies", Some(&bearer), payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["data"]["name"], "Panadería Sol");

        let again = router(&fixture)
            .oneshot(post_json("/companies", Some(&bearer), payload))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);

        let creator = token(CREATOR, 1, Role::Creator);
        let denied = router(&fixture)
            .oneshot(post_json("/companies", Some(&creator), json!({ "name": "X" })))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_adds_users_to_own_company() {
        let fixture = fixture();
        let bearer = token(ADMIN, 1, Role::Admin);
        let response = router(&fixture)
            .oneshot(post_json(
                "/users",
                Some(&bearer),
                json!({ "name": "Ana", "email": "Ana@Example.com", "role": "analyst" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["data"]["company_id"], 1);
        assert_eq!(body["data"]["email"], "ana@example.com");
        assert_eq!(body["data"]["role"], "analyst");

        let new_id = body["data"]["id"].as_i64().unwrap();
        let analyst = token(new_id, 1, Role::Analyst);
        let report = router(&fixture)
            .oneshot(get(&format!("/reports/{}", fixture.survey_id), Some(&analyst)))
            .await
            .unwrap();
        assert_eq!(report.status(), StatusCode::OK);

        for payload in [
            json!({ "name": "Ana", "email": "ana@example.com", "role": "creator" }),
            json!({ "name": "Root", "email": "root@example.com", "role": "admin" }),
            json!({ "name": "Sin email", "role": "creator" }),
        ] {
            let response = router(&fixture)
                .oneshot(post_json("/users", Some(&bearer), payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let analyst = token(ANALYST, 1, Role::Analyst);
        let denied = router(&fixture)
            .oneshot(post_json(
                "/users",
                Some(&analyst),
                json!({ "name": "B", "email": "b@example.com", "role": "creator" }),
            ))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn survey_listing_is_scoped_to_tenant() {
        let fixture = fixture();
        fixture.store.add_survey(2, "Ajena", "ajena001");

        let bearer = token(CREATOR, 1, Role::Creator);
        let response = router(&fixture)
            .oneshot(get("/surveys", Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let titles: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|survey| survey["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["Clima"]);
    }

    #[tokio::test]
    async fn survey_detail_includes_questions() {
        let fixture = fixture();
        let bearer = token(ANALYST, 1, Role::Analyst);
        let uri = format!("/surveys/{}", fixture.survey_id);
        let response = router(&fixture)
            .oneshot(get(&uri, Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["link_slug"], "clima001");
        assert_eq!(body["data"]["questions"][0]["id"], fixture.choice_id);

        let outsider = token(OUTSIDER, 2, Role::Admin);
        let hidden = router(&fixture)
            .oneshot(get(&uri, Some(&outsider)))
            .await
            .unwrap();
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let fixture = fixture();
        let uri = format!("/surveys/{}", fixture.survey_id);
        let bearer = token(CREATOR, 1, Role::Creator);

        let response = router(&fixture)
            .oneshot(send_json(
                "PUT",
                &uri,
                Some(&bearer),
                json!({ "description": "Trimestral", "end_date": "2026-12-31" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["title"], "Clima");
        assert_eq!(body["data"]["description"], "Trimestral");
        assert_eq!(body["data"]["end_date"], "2026-12-31");

        let cleared = router(&fixture)
            .oneshot(send_json("PUT", &uri, Some(&bearer), json!({ "description": null })))
            .await
            .unwrap();
        let body = json_body(cleared).await;
        assert_eq!(body["data"]["description"], Value::Null);
        assert_eq!(body["data"]["end_date"], "2026-12-31");

        let empty = router(&fixture)
            .oneshot(send_json("PUT", &uri, Some(&bearer), json!({})))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let analyst = token(ANALYST, 1, Role::Analyst);
        let denied = router(&fixture)
            .oneshot(send_json("PUT", &uri, Some(&analyst), json!({ "title": "X" })))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn deleting_survey_hides_it_from_reports() {
        let fixture = fixture();
        let uri = format!("/surveys/{}", fixture.survey_id);

        let outsider = token(OUTSIDER, 2, Role::Admin);
        let foreign = router(&fixture)
            .oneshot(delete(&uri, &outsider))
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

        let bearer = token(ADMIN, 1, Role::Admin);
        let response = router(&fixture)
            .oneshot(delete(&uri, &bearer))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report = router(&fixture)
            .oneshot(get(&format!("/reports/{}", fixture.survey_id), Some(&bearer)))
            .await
            .unwrap();
        assert_eq!(report.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_copies_questions_without_responses() {
        let fixture = fixture();
        let bearer = token(CREATOR, 1, Role::Creator);
        let response = router(&fixture)
            .oneshot(post_json(
                &format!("/surveys/{}/duplicate", fixture.survey_id),
                Some(&bearer),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        assert_eq!(body["data"]["title"], "Clima (Copia)");
        assert_ne!(body["data"]["link_slug"], "clima001");
        assert_eq!(body["data"]["questions"][1]["text"], "Comentarios");
        let copy_id = body["data"]["id"].as_i64().unwrap();
        assert_ne!(copy_id, fixture.survey_id);

        let bare = Request::builder()
            .method("POST")
            .uri(format!("/surveys/{}/duplicate", fixture.survey_id))
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .body(Body::empty())
            .unwrap();
        let without_body = router(&fixture).oneshot(bare).await.unwrap();
        assert_eq!(without_body.status(), StatusCode::CREATED);
        assert_eq!(fixture.store.survey_count(), 3);

        let analyst = token(ANALYST, 1, Role::Analyst);
        let report = router(&fixture)
            .oneshot(get(&format!("/reports/{copy_id}"), Some(&analyst)))
            .await
            .unwrap();
        let body = json_body(report).await;
        assert_eq!(body["survey"]["total_responses"], 0);
    }

    #[tokio::test]
    async fn questions_are_added_and_removed() {
        let fixture = fixture();
        let bearer = token(CREATOR, 1, Role::Creator);
        let base = format!("/surveys/{}/questions", fixture.survey_id);

        let response = router(&fixture)
            .oneshot(post_json(
                &base,
                Some(&bearer),
                json!({ "text": "¿Nos recomendaría?", "type": "calificacion" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["data"]["order"], 2);
        assert_eq!(body["data"]["type"], "rating");

        let invalid = router(&fixture)
            .oneshot(post_json(
                &base,
                Some(&bearer),
                json!({ "text": "¿Cuál?", "type": "multiple" }),
            ))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let removed = router(&fixture)
            .oneshot(delete(&format!("{base}/{}", fixture.text_id), &bearer))
            .await
            .unwrap();
        assert_eq!(removed.status(), StatusCode::OK);
        let missing = router(&fixture)
            .oneshot(delete(&format!("{base}/{}", fixture.text_id), &bearer))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let analyst = token(ANALYST, 1, Role::Analyst);
        let report = router(&fixture)
            .oneshot(get(&format!("/reports/{}", fixture.survey_id), Some(&analyst)))
            .await
            .unwrap();
        let body = json_body(report).await;
        let ids: Vec<i64> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|result| result["question_id"].as_i64())
            .collect();
        assert_eq!(ids, vec![fixture.choice_id]);
    }

    #[tokio::test]
    async fn taken_slugs_are_redrawn() {
        let fixture = fixture();
        let mut candidates = vec!["clima001", "libre001"].into_iter();
        let slug = unique_slug(fixture.store.as_ref(), || {
            candidates.next().unwrap_or("clima001").to_string()
        })
        .await
        .unwrap();
        assert_eq!(slug, "libre001");

        let exhausted = unique_slug(fixture.store.as_ref(), || "clima001".to_string()).await;
        assert!(matches!(exhausted, Err(ApiError::Internal(_))));
    }
}
