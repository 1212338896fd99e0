use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::ApiError;
use crate::models::{
    AnswerRow, IndividualReport, IndividualResponse, IndividualSurvey, OptionCount,
    QuestionSummary, ReportResult, ResponseRow, SummaryShape, SurveyOverview, SurveyRecord,
    VerbatimEntry,
};
use crate::store::SurveyStore;

/// Resolves the survey for the tenant, then loads its answer rows once.
pub async fn load_report(
    store: &dyn SurveyStore,
    survey_id: i64,
    company_id: i64,
) -> Result<ReportResult, ApiError> {
    let survey = find_owned_survey(store, survey_id, company_id).await?;
    let rows = store.answer_rows(survey.id).await?;
    debug!(survey_id, rows = rows.len(), "loaded answer rows");
    Ok(aggregate(&survey, &rows))
}

pub async fn load_individual_report(
    store: &dyn SurveyStore,
    survey_id: i64,
    company_id: i64,
) -> Result<IndividualReport, ApiError> {
    let survey = find_owned_survey(store, survey_id, company_id).await?;
    let questions = store.survey_questions(survey.id).await?;
    let rows = store.response_rows(survey.id).await?;
    let responses = group_by_response(&rows);

    Ok(IndividualReport {
        survey: IndividualSurvey {
            id: survey.id,
            title: survey.title,
            description: survey.description,
            total_responses: responses.len(),
        },
        questions,
        responses,
    })
}

async fn find_owned_survey(
    store: &dyn SurveyStore,
    survey_id: i64,
    company_id: i64,
) -> Result<SurveyRecord, ApiError> {
    store
        .find_survey(survey_id, company_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(
                "Encuesta no encontrada o no pertenece a esta empresa.".to_string(),
            )
        })
}

/// Groups answer rows by question in first-seen order.
///
/// Rows are expected in loader order (question display order, then newest
/// submission first); verbatim lists keep that order as-is.
pub fn aggregate(survey: &SurveyRecord, rows: &[AnswerRow]) -> ReportResult {
    let mut questions: Vec<QuestionSummary> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut timestamps = HashSet::new();

    for row in rows {
        timestamps.insert(row.submitted_at);

        let position = *positions.entry(row.question_id).or_insert_with(|| {
            questions.push(QuestionSummary {
                question_id: row.question_id,
                question_text: row.question_text.clone(),
                question_type: row.question_type,
                total_answers: 0,
                shape: SummaryShape::for_type(row.question_type),
            });
            questions.len() - 1
        });

        let summary = &mut questions[position];
        summary.total_answers += 1;

        if summary.question_type != row.question_type {
            warn!(
                question_id = row.question_id,
                expected = summary.question_type.as_str(),
                found = row.question_type.as_str(),
                "question type changed between rows"
            );
        }

        match &mut summary.shape {
            SummaryShape::Breakdown(counts) => count_tokens(counts, &row.value),
            SummaryShape::VerbatimList(entries) => entries.push(VerbatimEntry {
                value: row.value.clone(),
                submitted_at: row.submitted_at,
                channel: row.channel,
            }),
        }
    }

    ReportResult {
        survey: SurveyOverview {
            id: survey.id,
            title: survey.title.clone(),
            description: survey.description.clone(),
            total_unique_submission_timestamps: timestamps.len(),
        },
        questions,
    }
}

fn count_tokens(counts: &mut Vec<OptionCount>, value: &str) {
    for token in value.split(',').map(str::trim).filter(|token| !token.is_empty()) {
        match counts.iter_mut().find(|entry| entry.option == token) {
            Some(entry) => entry.count += 1,
            None => counts.push(OptionCount {
                option: token.to_string(),
                count: 1,
            }),
        }
    }
}

/// One record per submission, in loader order (newest first).
pub fn group_by_response(rows: &[ResponseRow]) -> Vec<IndividualResponse> {
    let mut responses: Vec<IndividualResponse> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        let position = *positions.entry(row.response_id).or_insert_with(|| {
            responses.push(IndividualResponse {
                response_id: row.response_id,
                submitted_at: row.submitted_at,
                channel: row.channel,
                answers: Default::default(),
            });
            responses.len() - 1
        });

        responses[position]
            .answers
            .insert(row.question_id, row.value.clone());
    }

    responses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, QuestionType};
    use crate::store::memory::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, minute, 0).unwrap()
    }

    fn survey() -> SurveyRecord {
        SurveyRecord {
            id: 10,
            company_id: 1,
            title: "Clima laboral".to_string(),
            description: None,
        }
    }

    fn row(question_id: i64, question_type: QuestionType, value: &str, minute: u32) -> AnswerRow {
        AnswerRow {
            question_id,
            question_text: format!("Pregunta {question_id}"),
            question_type,
            value: value.to_string(),
            channel: Channel::Web,
            submitted_at: at(minute),
        }
    }

    fn breakdown(summary: &QuestionSummary) -> Vec<(&str, u64)> {
        match &summary.shape {
            SummaryShape::Breakdown(counts) => counts
                .iter()
                .map(|entry| (entry.option.as_str(), entry.count))
                .collect(),
            SummaryShape::VerbatimList(_) => panic!("expected a breakdown"),
        }
    }

    fn verbatim(summary: &QuestionSummary) -> &[VerbatimEntry] {
        match &summary.shape {
            SummaryShape::VerbatimList(entries) => entries,
            SummaryShape::Breakdown(_) => panic!("expected a verbatim list"),
        }
    }

    #[test]
    fn single_choice_counts_repeated_option() {
        let rows = vec![
            row(1, QuestionType::SingleChoice, "Mucho", 2),
            row(1, QuestionType::SingleChoice, "Mucho", 1),
        ];
        let report = aggregate(&survey(), &rows);

        assert_eq!(report.questions.len(), 1);
        assert_eq!(report.questions[0].total_answers, 2);
        assert_eq!(breakdown(&report.questions[0]), vec![("Mucho", 2)]);
    }

    #[test]
    fn multi_select_counts_every_token() {
        let rows = vec![row(2, QuestionType::MultipleChoice, "A,B", 1)];
        let report = aggregate(&survey(), &rows);

        assert_eq!(report.questions[0].total_answers, 1);
        assert_eq!(breakdown(&report.questions[0]), vec![("A", 1), ("B", 1)]);
    }

    #[test]
    fn breakdown_trims_tokens_and_keeps_first_seen_order() {
        let rows = vec![
            row(2, QuestionType::MultipleChoice, "Zeta , Alfa", 3),
            row(2, QuestionType::MultipleChoice, "Alfa,Beta", 2),
            row(2, QuestionType::MultipleChoice, " , ", 1),
        ];
        let report = aggregate(&survey(), &rows);
        let summary = &report.questions[0];

        assert_eq!(summary.total_answers, 3);
        assert_eq!(breakdown(summary), vec![("Zeta", 1), ("Alfa", 2), ("Beta", 1)]);
        let token_total: u64 = breakdown(summary).iter().map(|(_, count)| count).sum();
        assert_eq!(token_total, 4);
    }

    #[test]
    fn empty_text_answer_is_kept() {
        let rows = vec![row(3, QuestionType::Text, "", 1)];
        let report = aggregate(&survey(), &rows);
        let entries = verbatim(&report.questions[0]);

        assert_eq!(report.questions[0].total_answers, 1);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, "");
    }

    #[test]
    fn verbatim_lists_keep_loader_order_and_do_not_split() {
        let rows = vec![
            row(4, QuestionType::Number, "12", 9),
            row(4, QuestionType::Text, "uno, dos", 5),
            row(4, QuestionType::Number, "7", 1),
        ];
        let report = aggregate(&survey(), &rows);
        let entries = verbatim(&report.questions[0]);

        assert_eq!(report.questions[0].total_answers, 3);
        let values: Vec<&str> = entries.iter().map(|entry| entry.value.as_str()).collect();
        assert_eq!(values, vec!["12", "uno, dos", "7"]);
        assert_eq!(entries[0].submitted_at, at(9));
    }

    #[test]
    fn questions_follow_first_occurrence() {
        let rows = vec![
            row(7, QuestionType::Rating, "5", 1),
            row(3, QuestionType::Text, "bien", 1),
            row(7, QuestionType::Rating, "4", 2),
        ];
        let report = aggregate(&survey(), &rows);
        let ids: Vec<i64> = report.questions.iter().map(|q| q.question_id).collect();
        assert_eq!(ids, vec![7, 3]);
    }

    #[test]
    fn no_rows_yields_empty_report() {
        let report = aggregate(&survey(), &[]);
        assert!(report.questions.is_empty());
        assert_eq!(report.survey.total_unique_submission_timestamps, 0);
    }

    #[test]
    fn aggregation_is_repeatable() {
        let rows = vec![
            row(1, QuestionType::SingleChoice, "Sí", 3),
            row(1, QuestionType::SingleChoice, "No", 2),
            row(2, QuestionType::Text, "todo bien", 3),
        ];
        assert_eq!(aggregate(&survey(), &rows), aggregate(&survey(), &rows));
    }

    #[test]
    fn shared_timestamps_undercount_aggregated_total() {
        // Two distinct responses submitted in the same instant.
        let rows = vec![
            row(1, QuestionType::SingleChoice, "Sí", 4),
            row(1, QuestionType::SingleChoice, "No", 4),
        ];
        let report = aggregate(&survey(), &rows);
        assert_eq!(report.survey.total_unique_submission_timestamps, 1);

        let response_rows = vec![
            ResponseRow {
                response_id: 1,
                channel: Channel::Web,
                submitted_at: at(4),
                question_id: 1,
                value: "Sí".to_string(),
            },
            ResponseRow {
                response_id: 2,
                channel: Channel::Messaging,
                submitted_at: at(4),
                question_id: 1,
                value: "No".to_string(),
            },
        ];
        assert_eq!(group_by_response(&response_rows).len(), 2);
    }

    #[test]
    fn responses_group_answers_by_question() {
        let rows = vec![
            ResponseRow {
                response_id: 9,
                channel: Channel::Messaging,
                submitted_at: at(8),
                question_id: 1,
                value: "Mucho".to_string(),
            },
            ResponseRow {
                response_id: 9,
                channel: Channel::Messaging,
                submitted_at: at(8),
                question_id: 2,
                value: "A,B".to_string(),
            },
            ResponseRow {
                response_id: 4,
                channel: Channel::Web,
                submitted_at: at(3),
                question_id: 1,
                value: "Poco".to_string(),
            },
        ];
        let responses = group_by_response(&rows);

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].response_id, 9);
        assert_eq!(responses[0].channel, Channel::Messaging);
        assert_eq!(responses[0].answers.get(&2).map(String::as_str), Some("A,B"));
        assert_eq!(responses[1].answers.len(), 1);
    }

    #[tokio::test]
    async fn load_report_rejects_foreign_tenant() {
        let store = MemoryStore::new();
        let survey_id = store.add_survey(1, "Clima", "clima01");
        let result = load_report(&store, survey_id, 2).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn load_report_aggregates_stored_answers() {
        let store = MemoryStore::new();
        let survey_id = store.add_survey(1, "Clima", "clima01");
        let question = store.add_question(survey_id, "¿Te gusta?", QuestionType::SingleChoice, 0);
        store.add_response(survey_id, Channel::Web, at(1), &[(question, "Mucho")]);
        store.add_response(survey_id, Channel::Messaging, at(2), &[(question, "Mucho")]);

        let report = load_report(&store, survey_id, 1).await.unwrap();
        assert_eq!(report.survey.total_unique_submission_timestamps, 2);
        assert_eq!(breakdown(&report.questions[0]), vec![("Mucho", 2)]);
    }

    #[tokio::test]
    async fn individual_report_counts_distinct_responses() {
        let store = MemoryStore::new();
        let survey_id = store.add_survey(1, "Clima", "clima01");
        let question = store.add_question(survey_id, "Comentarios", QuestionType::Text, 0);
        store.add_response(survey_id, Channel::Web, at(5), &[(question, "uno")]);
        store.add_response(survey_id, Channel::Web, at(5), &[(question, "dos")]);

        let report = load_individual_report(&store, survey_id, 1).await.unwrap();
        assert_eq!(report.survey.total_responses, 2);
        assert_eq!(report.questions.len(), 1);
        assert_eq!(report.responses.len(), 2);
    }
}
