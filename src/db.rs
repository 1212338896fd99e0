use std::collections::HashMap;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::models::{
    AnswerRow, Channel, Company, CreatedSurvey, NewQuestion, NewResponse, NewSurvey, NewUser,
    PublicSurvey, QuestionOption, QuestionType, ResponseRow, Role, SurveyChanges, SurveyDetail,
    SurveyListing, SurveyQuestion, SurveyRecord, UserAccount, UserStatus,
};
use crate::store::SurveyStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts a demo company with one user per role and a survey covering every
/// question type. Running it twice leaves the data unchanged.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let company_id: i64 = sqlx::query(
        r#"
        INSERT INTO companies (name, nit)
        VALUES ($1, $2)
        ON CONFLICT (nit) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind("Cafetería Aurora")
    .bind("900123456-7")
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    let users = vec![
        ("Laura Gómez", "laura@aurora.example", "admin"),
        ("Mateo Ruiz", "mateo@aurora.example", "creator"),
        ("Sofía Peña", "sofia@aurora.example", "analyst"),
    ];

    let mut creator_id = None;
    for (name, email, role) in users {
        let user_id: i64 = sqlx::query(
            r#"
            INSERT INTO users (company_id, name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, role = EXCLUDED.role
            RETURNING id
            "#,
        )
        .bind(company_id)
        .bind(name)
        .bind(email)
        .bind(role)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        if role == "creator" {
            creator_id = Some(user_id);
        }
    }
    let creator_id = creator_id.context("seed data has no creator")?;

    let survey_id: Option<i64> = sqlx::query(
        r#"
        INSERT INTO surveys (company_id, created_by, title, description, link_slug)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (link_slug) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(creator_id)
    .bind("Satisfacción de clientes")
    .bind("Encuesta de salida en punto de venta")
    .bind("aurora01")
    .fetch_optional(&mut *tx)
    .await?
    .map(|row| row.get("id"));

    let Some(survey_id) = survey_id else {
        tx.commit().await?;
        return Ok(());
    };

    let questions = vec![
        ("¿Qué tan satisfecho quedó?", "single_choice", vec!["Mucho", "Algo", "Poco"]),
        ("¿Qué productos compró?", "multiple_choice", vec!["Café", "Pan", "Jugo"]),
        ("Califique la atención", "rating", vec![]),
        ("¿Cuántas veces nos visita al mes?", "number", vec![]),
        ("Comentarios", "text", vec![]),
    ];

    let mut question_ids = Vec::new();
    for (order, (text, question_type, options)) in questions.into_iter().enumerate() {
        let question_id: i64 = sqlx::query(
            r#"
            INSERT INTO questions (survey_id, text, type, display_order)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(survey_id)
        .bind(text)
        .bind(question_type)
        .bind(order as i32)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        for option in options {
            sqlx::query("INSERT INTO options (question_id, text, value) VALUES ($1, $2, $3)")
                .bind(question_id)
                .bind(option)
                .bind(option)
                .execute(&mut *tx)
                .await?;
        }
        question_ids.push(question_id);
    }

    let submissions = vec![
        ("web", None, 3, ["Mucho", "Café,Pan", "5", "4", "Excelente servicio"]),
        ("messaging", Some("+573001112233"), 2, ["Algo", "Café", "4", "2", ""]),
        ("web", None, 1, ["Mucho", "Pan,Jugo", "5", "8", "Volveré pronto"]),
    ];

    for (channel, respondent, days_ago, values) in submissions {
        let response_id: i64 = sqlx::query(
            r#"
            INSERT INTO responses (survey_id, channel, respondent_identifier, submitted_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(survey_id)
        .bind(channel)
        .bind(respondent)
        .bind(Utc::now() - Duration::days(days_ago))
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        for (question_id, value) in question_ids.iter().zip(values) {
            sqlx::query("INSERT INTO answers (response_id, question_id, value) VALUES ($1, $2, $3)")
                .bind(response_id)
                .bind(question_id)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

fn parse_question_type(row: &PgRow, column: &str) -> anyhow::Result<QuestionType> {
    let raw: String = row.get(column);
    QuestionType::parse(&raw).ok_or_else(|| anyhow!("unknown question type '{raw}'"))
}

fn parse_channel(row: &PgRow) -> anyhow::Result<Channel> {
    let raw: String = row.get("channel");
    Channel::parse(&raw).ok_or_else(|| anyhow!("unknown response channel '{raw}'"))
}

fn user_from_row(row: &PgRow) -> anyhow::Result<UserAccount> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    Ok(UserAccount {
        id: row.get("id"),
        company_id: row.get("company_id"),
        name: row.get("name"),
        email: row.get("email"),
        role: Role::parse(&role).ok_or_else(|| anyhow!("unknown user role '{role}'"))?,
        status: UserStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown user status '{status}'"))?,
    })
}

/// Inserts a question and its options inside an open transaction.
async fn insert_question(
    tx: &mut Transaction<'_, Postgres>,
    survey_id: i64,
    question: &NewQuestion,
    order: i32,
) -> anyhow::Result<SurveyQuestion> {
    let question_id: i64 = sqlx::query(
        r#"
        INSERT INTO questions (survey_id, text, type, display_order)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(survey_id)
    .bind(&question.text)
    .bind(question.question_type.as_str())
    .bind(order)
    .fetch_one(&mut **tx)
    .await?
    .get("id");

    let mut options = Vec::with_capacity(question.options.len());
    for option in &question.options {
        let option_id: i64 = sqlx::query(
            "INSERT INTO options (question_id, text, value) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(question_id)
        .bind(&option.text)
        .bind(&option.value)
        .fetch_one(&mut **tx)
        .await?
        .get("id");

        options.push(QuestionOption {
            id: option_id,
            text: option.text.clone(),
            value: option.value.clone(),
        });
    }

    Ok(SurveyQuestion {
        id: question_id,
        text: question.text.clone(),
        question_type: question.question_type,
        order,
        options,
    })
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn options_for(
        &self,
        question_ids: &[i64],
    ) -> anyhow::Result<HashMap<i64, Vec<QuestionOption>>> {
        let mut options: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
        if question_ids.is_empty() {
            return Ok(options);
        }

        let rows = sqlx::query(
            "SELECT id, question_id, text, value FROM options WHERE question_id = ANY($1) ORDER BY id",
        )
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            options
                .entry(row.get("question_id"))
                .or_default()
                .push(QuestionOption {
                    id: row.get("id"),
                    text: row.get("text"),
                    value: row.get("value"),
                });
        }

        Ok(options)
    }
}

#[async_trait]
impl SurveyStore for PgStore {
    async fn find_survey(
        &self,
        survey_id: i64,
        company_id: i64,
    ) -> anyhow::Result<Option<SurveyRecord>> {
        let row = sqlx::query(
            "SELECT id, company_id, title, description FROM surveys WHERE id = $1 AND company_id = $2",
        )
        .bind(survey_id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SurveyRecord {
            id: row.get("id"),
            company_id: row.get("company_id"),
            title: row.get("title"),
            description: row.get("description"),
        }))
    }

    async fn answer_rows(&self, survey_id: i64) -> anyhow::Result<Vec<AnswerRow>> {
        let records = sqlx::query(
            r#"
            SELECT q.id AS question_id, q.text AS question_text, q.type AS question_type,
                   COALESCE(a.value, '') AS value, r.channel, r.submitted_at
            FROM answers a
            JOIN responses r ON r.id = a.response_id
            JOIN questions q ON q.id = a.question_id AND q.survey_id = r.survey_id
            WHERE r.survey_id = $1
            ORDER BY q.display_order ASC, q.id ASC, r.submitted_at DESC, r.id DESC
            "#,
        )
        .bind(survey_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load answer rows")?;

        let mut rows = Vec::with_capacity(records.len());
        for row in records {
            rows.push(AnswerRow {
                question_id: row.get("question_id"),
                question_text: row.get("question_text"),
                question_type: parse_question_type(&row, "question_type")?,
                value: row.get("value"),
                channel: parse_channel(&row)?,
                submitted_at: row.get("submitted_at"),
            });
        }

        Ok(rows)
    }

    async fn survey_questions(&self, survey_id: i64) -> anyhow::Result<Vec<SurveyQuestion>> {
        let records = sqlx::query(
            r#"
            SELECT id, text, type, display_order
            FROM questions
            WHERE survey_id = $1
            ORDER BY display_order ASC, id ASC
            "#,
        )
        .bind(survey_id)
        .fetch_all(&self.pool)
        .await?;

        let question_ids: Vec<i64> = records.iter().map(|row| row.get("id")).collect();
        let mut options = self.options_for(&question_ids).await?;

        let mut questions = Vec::with_capacity(records.len());
        for row in records {
            let id: i64 = row.get("id");
            questions.push(SurveyQuestion {
                id,
                text: row.get("text"),
                question_type: parse_question_type(&row, "type")?,
                order: row.get("display_order"),
                options: options.remove(&id).unwrap_or_default(),
            });
        }

        Ok(questions)
    }

    async fn response_rows(&self, survey_id: i64) -> anyhow::Result<Vec<ResponseRow>> {
        let records = sqlx::query(
            r#"
            SELECT r.id AS response_id, r.channel, r.submitted_at,
                   a.question_id, COALESCE(a.value, '') AS value
            FROM responses r
            JOIN answers a ON a.response_id = r.id
            JOIN questions q ON q.id = a.question_id AND q.survey_id = r.survey_id
            WHERE r.survey_id = $1
            ORDER BY r.submitted_at DESC, r.id DESC, a.id ASC
            "#,
        )
        .bind(survey_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load responses")?;

        let mut rows = Vec::with_capacity(records.len());
        for row in records {
            rows.push(ResponseRow {
                response_id: row.get("response_id"),
                channel: parse_channel(&row)?,
                submitted_at: row.get("submitted_at"),
                question_id: row.get("question_id"),
                value: row.get("value"),
            });
        }

        Ok(rows)
    }

    async fn user_account(&self, user_id: i64) -> anyhow::Result<Option<UserAccount>> {
        let row = sqlx::query(
            "SELECT id, company_id, name, email, role, status FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_company(
        &self,
        name: &str,
        nit: Option<&str>,
    ) -> anyhow::Result<Option<Company>> {
        let row = sqlx::query(
            r#"
            INSERT INTO companies (name, nit)
            VALUES ($1, $2)
            ON CONFLICT (nit) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(nit)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert company")?;

        Ok(row.map(|row| Company {
            id: row.get("id"),
            name: name.to_string(),
            nit: nit.map(str::to_string),
        }))
    }

    async fn create_user(
        &self,
        company_id: i64,
        user: &NewUser,
    ) -> anyhow::Result<Option<UserAccount>> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (company_id, name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, company_id, name, email, role, status
            "#,
        )
        .bind(company_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert user")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_surveys(&self, company_id: i64) -> anyhow::Result<Vec<SurveyListing>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.title, s.description, s.start_date, s.end_date, s.link_slug,
                   s.created_by, u.name AS creator_name, s.created_at
            FROM surveys s
            LEFT JOIN users u ON u.id = s.created_by
            WHERE s.company_id = $1
            ORDER BY s.created_at DESC, s.id DESC
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SurveyListing {
                id: row.get("id"),
                title: row.get("title"),
                description: row.get("description"),
                start_date: row.get("start_date"),
                end_date: row.get("end_date"),
                link_slug: row.get("link_slug"),
                created_by: row.get("created_by"),
                creator_name: row.get("creator_name"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn survey_detail(
        &self,
        survey_id: i64,
        company_id: i64,
    ) -> anyhow::Result<Option<SurveyDetail>> {
        let row = sqlx::query(
            r#"
            SELECT id, company_id, created_by, title, description, start_date, end_date,
                   link_slug, created_at
            FROM surveys
            WHERE id = $1 AND company_id = $2
            "#,
        )
        .bind(survey_id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(SurveyDetail {
            id: row.get("id"),
            company_id: row.get("company_id"),
            created_by: row.get("created_by"),
            title: row.get("title"),
            description: row.get("description"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
            link_slug: row.get("link_slug"),
            created_at: row.get("created_at"),
            questions: self.survey_questions(survey_id).await?,
        }))
    }

    async fn create_survey(
        &self,
        company_id: i64,
        created_by: i64,
        survey: &NewSurvey,
        slug: &str,
    ) -> anyhow::Result<CreatedSurvey> {
        let mut tx = self.pool.begin().await?;

        let survey_id: i64 = sqlx::query(
            r#"
            INSERT INTO surveys
            (company_id, created_by, title, description, start_date, end_date, link_slug)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(company_id)
        .bind(created_by)
        .bind(&survey.title)
        .bind(&survey.description)
        .bind(survey.start_date)
        .bind(survey.end_date)
        .bind(slug)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        let mut questions = Vec::with_capacity(survey.questions.len());
        for (order, question) in survey.questions.iter().enumerate() {
            questions.push(insert_question(&mut tx, survey_id, question, order as i32).await?);
        }

        tx.commit().await?;

        Ok(CreatedSurvey {
            id: survey_id,
            link_slug: slug.to_string(),
            questions,
        })
    }

    async fn update_survey(
        &self,
        survey_id: i64,
        company_id: i64,
        changes: &SurveyChanges,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE surveys SET
                title = COALESCE($3, title),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                start_date = CASE WHEN $6 THEN $7 ELSE start_date END,
                end_date = CASE WHEN $8 THEN $9 ELSE end_date END
            WHERE id = $1 AND company_id = $2
            "#,
        )
        .bind(survey_id)
        .bind(company_id)
        .bind(&changes.title)
        .bind(changes.description.is_some())
        .bind(changes.description.clone().flatten())
        .bind(changes.start_date.is_some())
        .bind(changes.start_date.flatten())
        .bind(changes.end_date.is_some())
        .bind(changes.end_date.flatten())
        .execute(&self.pool)
        .await
        .context("failed to update survey")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_survey(&self, survey_id: i64, company_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM surveys WHERE id = $1 AND company_id = $2")
            .bind(survey_id)
            .bind(company_id)
            .execute(&self.pool)
            .await
            .context("failed to delete survey")?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_question(
        &self,
        survey_id: i64,
        question: &NewQuestion,
    ) -> anyhow::Result<SurveyQuestion> {
        let mut tx = self.pool.begin().await?;

        let order: i32 = sqlx::query(
            "SELECT COALESCE(MAX(display_order) + 1, 0) AS next_order FROM questions WHERE survey_id = $1",
        )
        .bind(survey_id)
        .fetch_one(&mut *tx)
        .await?
        .get("next_order");

        let created = insert_question(&mut tx, survey_id, question, order).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn delete_question(&self, survey_id: i64, question_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1 AND survey_id = $2")
            .bind(question_id)
            .bind(survey_id)
            .execute(&self.pool)
            .await
            .context("failed to delete question")?;
        Ok(result.rows_affected() > 0)
    }

    async fn slug_exists(&self, slug: &str) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT 1 AS found FROM surveys WHERE link_slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn survey_by_slug(&self, slug: &str) -> anyhow::Result<Option<PublicSurvey>> {
        let row = sqlx::query(
            "SELECT id, title, description, start_date, end_date FROM surveys WHERE link_slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.get("id");
        let start_date: Option<NaiveDate> = row.get("start_date");
        let end_date: Option<NaiveDate> = row.get("end_date");

        Ok(Some(PublicSurvey {
            id,
            title: row.get("title"),
            description: row.get("description"),
            start_date,
            end_date,
            questions: self.survey_questions(id).await?,
        }))
    }

    async fn survey_exists(&self, survey_id: i64) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT 1 AS found FROM surveys WHERE id = $1")
            .bind(survey_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn submit_response(&self, response: &NewResponse) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;

        let response_id: i64 = sqlx::query(
            r#"
            INSERT INTO responses (survey_id, channel, respondent_identifier)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(response.survey_id)
        .bind(response.channel.as_str())
        .bind(&response.respondent_identifier)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        for answer in &response.answers {
            sqlx::query("INSERT INTO answers (response_id, question_id, value) VALUES ($1, $2, $3)")
                .bind(response_id)
                .bind(answer.question_id)
                .bind(&answer.value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(response_id)
    }
}
