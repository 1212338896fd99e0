use async_trait::async_trait;

use crate::models::{
    AnswerRow, Company, CreatedSurvey, NewQuestion, NewResponse, NewSurvey, NewUser,
    PublicSurvey, ResponseRow, SurveyChanges, SurveyDetail, SurveyListing, SurveyQuestion,
    SurveyRecord, UserAccount,
};

/// Persistence capability handed to the HTTP layer and the report loader.
///
/// Methods taking a `company_id` only ever see that tenant's rows.
#[async_trait]
pub trait SurveyStore: Send + Sync {
    /// `None` when the survey is absent or owned by another company.
    async fn find_survey(
        &self,
        survey_id: i64,
        company_id: i64,
    ) -> anyhow::Result<Option<SurveyRecord>>;

    /// Answers joined with their response and with a question of the same
    /// survey, ordered by question display order, then newest submission
    /// first (ties: question id, then response id descending).
    async fn answer_rows(&self, survey_id: i64) -> anyhow::Result<Vec<AnswerRow>>;

    async fn survey_questions(&self, survey_id: i64) -> anyhow::Result<Vec<SurveyQuestion>>;

    /// Same join as [`SurveyStore::answer_rows`], ordered newest submission
    /// first, then answer id.
    async fn response_rows(&self, survey_id: i64) -> anyhow::Result<Vec<ResponseRow>>;

    async fn user_account(&self, user_id: i64) -> anyhow::Result<Option<UserAccount>>;

    /// `None` when the tax id is already registered.
    async fn create_company(&self, name: &str, nit: Option<&str>)
        -> anyhow::Result<Option<Company>>;

    /// `None` when the email is already registered.
    async fn create_user(
        &self,
        company_id: i64,
        user: &NewUser,
    ) -> anyhow::Result<Option<UserAccount>>;

    async fn list_surveys(&self, company_id: i64) -> anyhow::Result<Vec<SurveyListing>>;

    async fn survey_detail(
        &self,
        survey_id: i64,
        company_id: i64,
    ) -> anyhow::Result<Option<SurveyDetail>>;

    async fn create_survey(
        &self,
        company_id: i64,
        created_by: i64,
        survey: &NewSurvey,
        slug: &str,
    ) -> anyhow::Result<CreatedSurvey>;

    /// Returns `false` when no survey of the tenant matched.
    async fn update_survey(
        &self,
        survey_id: i64,
        company_id: i64,
        changes: &SurveyChanges,
    ) -> anyhow::Result<bool>;

    /// Removes the survey with its questions, options, responses and answers.
    async fn delete_survey(&self, survey_id: i64, company_id: i64) -> anyhow::Result<bool>;

    /// Appends a question after the survey's last one.
    async fn add_question(
        &self,
        survey_id: i64,
        question: &NewQuestion,
    ) -> anyhow::Result<SurveyQuestion>;

    /// Removes the question and the answers given to it.
    async fn delete_question(&self, survey_id: i64, question_id: i64) -> anyhow::Result<bool>;

    async fn slug_exists(&self, slug: &str) -> anyhow::Result<bool>;

    async fn survey_by_slug(&self, slug: &str) -> anyhow::Result<Option<PublicSurvey>>;

    async fn survey_exists(&self, survey_id: i64) -> anyhow::Result<bool>;

    /// Stores the response header and its answers atomically, returning the
    /// response id.
    async fn submit_response(&self, response: &NewResponse) -> anyhow::Result<i64>;
}
