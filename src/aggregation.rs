//! Per-question statistics over submitted responses.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::{Answer, AnswerValue, FormResponseDetail, Question};
use crate::progress::percent;
use crate::question_types::QuestionType;

/// Answers of all responses keyed by question id, in response order.
pub fn group_answers_by_question(responses: &[FormResponseDetail]) -> HashMap<String, Vec<Answer>> {
    let mut grouped: HashMap<String, Vec<Answer>> = HashMap::new();
    for response in responses {
        for answer in &response.answers {
            grouped
                .entry(answer.question_id.clone())
                .or_default()
                .push(answer.clone());
        }
    }
    grouped
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuestionStats {
    pub total_responses: usize,
    pub unique_values: usize,
    pub distribution: BTreeMap<String, usize>,
}

fn value_key(value: &AnswerValue) -> Option<String> {
    match value {
        AnswerValue::Null => None,
        AnswerValue::Number(n) => Some(n.to_string()),
        AnswerValue::Text(s) => Some(s.clone()),
        AnswerValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        AnswerValue::List(_) => None,
    }
}

/// List answers contribute one count per selected element.
pub fn question_stats(answers: &[Answer]) -> QuestionStats {
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    for answer in answers {
        match &answer.value {
            AnswerValue::List(items) => {
                for item in items {
                    *distribution.entry(item.clone()).or_default() += 1;
                }
            }
            other => {
                if let Some(key) = value_key(other) {
                    *distribution.entry(key).or_default() += 1;
                }
            }
        }
    }
    QuestionStats {
        total_responses: answers.len(),
        unique_values: distribution.len(),
        distribution,
    }
}

/// Number of responses that answered `question_id`.
pub fn response_count(question_id: &str, responses: &[FormResponseDetail]) -> usize {
    responses
        .iter()
        .filter(|r| r.answer_for(question_id).is_some())
        .count()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OptionStat {
    pub option: String,
    pub count: usize,
    pub percentage: u32,
}

fn selects(answer: &Answer, option: &str, question_type: QuestionType) -> bool {
    match (&answer.value, question_type) {
        (AnswerValue::List(items), t) if t.is_multi_value() => items.iter().any(|i| i == option),
        (AnswerValue::Text(s), _) => s == option,
        _ => false,
    }
}

pub fn option_stats(question: &Question, responses: &[FormResponseDetail]) -> Vec<OptionStat> {
    let key = question.id.to_string();
    let answered: Vec<&Answer> = responses.iter().filter_map(|r| r.answer_for(&key)).collect();
    question
        .options
        .iter()
        .flatten()
        .map(|option| {
            let count = answered
                .iter()
                .filter(|a| selects(a, option, question.question_type))
                .count();
            OptionStat {
                option: option.clone(),
                count,
                percentage: percent(count, answered.len()),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct NumberStats {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Halves round toward positive infinity, so `-2.5` becomes `-2`.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

pub fn number_stats(question: &Question, responses: &[FormResponseDetail]) -> NumberStats {
    let key = question.id.to_string();
    let numbers: Vec<f64> = responses
        .iter()
        .filter_map(|r| r.answer_for(&key)?.value.as_number())
        .collect();
    if numbers.is_empty() {
        return NumberStats {
            min: 0.0,
            avg: 0.0,
            max: 0.0,
        };
    }
    let sum: f64 = numbers.iter().sum();
    NumberStats {
        min: numbers.iter().copied().fold(f64::INFINITY, f64::min),
        avg: round_half_up(sum / numbers.len() as f64),
        max: numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

pub fn text_responses(question: &Question, responses: &[FormResponseDetail]) -> Vec<String> {
    let key = question.id.to_string();
    responses
        .iter()
        .filter_map(|r| match &r.answer_for(&key)?.value {
            AnswerValue::Text(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionReport {
    Choice { options: Vec<OptionStat> },
    Numeric(NumberStats),
    Text { answers: Vec<String> },
    Date { distribution: BTreeMap<String, usize> },
}

/// Report for one question plus how many responses answered it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuestionSummary {
    pub question_id: String,
    pub total_responses: usize,
    #[serde(flatten)]
    pub report: QuestionReport,
}

pub fn aggregate(question: &Question, responses: &[FormResponseDetail]) -> QuestionSummary {
    let key = question.id.to_string();
    let report = match question.question_type {
        t if t.requires_options() => QuestionReport::Choice {
            options: option_stats(question, responses),
        },
        t if t.is_text_like() => QuestionReport::Text {
            answers: text_responses(question, responses),
        },
        QuestionType::Number => QuestionReport::Numeric(number_stats(question, responses)),
        _ => {
            let answers: Vec<Answer> = responses
                .iter()
                .filter_map(|r| r.answer_for(&key).cloned())
                .map(|mut a| {
                    a.value = a.value.normalize(QuestionType::Date);
                    a
                })
                .collect();
            QuestionReport::Date {
                distribution: question_stats(&answers).distribution,
            }
        }
    };
    QuestionSummary {
        total_responses: response_count(&key, responses),
        question_id: key,
        report,
    }
}

/// Human-readable answer for the response detail view.
pub fn display_answer(response: &FormResponseDetail, question: &Question) -> String {
    let Some(answer) = response.answer_for(&question.id.to_string()) else {
        return "-".to_string();
    };
    match answer.value.clone().normalize(question.question_type) {
        AnswerValue::Null => "-".to_string(),
        AnswerValue::List(items) if items.is_empty() => "-".to_string(),
        AnswerValue::List(items) => items.join(", "),
        AnswerValue::Date(d) => d.format("%d/%m/%Y").to_string(),
        AnswerValue::Number(n) => n.to_string(),
        AnswerValue::Text(s) if s.is_empty() => "-".to_string(),
        AnswerValue::Text(s) => s,
    }
}

/// One-at-a-time navigation over a loaded page of responses.
#[derive(Debug, Clone, Default)]
pub struct ResponseBrowser {
    responses: Vec<FormResponseDetail>,
    index: usize,
}

impl ResponseBrowser {
    pub fn new(responses: Vec<FormResponseDetail>) -> Self {
        Self { responses, index: 0 }
    }

    pub fn current(&self) -> Option<&FormResponseDetail> {
        self.responses.get(self.index)
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn next_response(&mut self) -> Option<&FormResponseDetail> {
        if self.index + 1 < self.responses.len() {
            self.index += 1;
        }
        self.current()
    }

    pub fn previous_response(&mut self) -> Option<&FormResponseDetail> {
        self.index = self.index.saturating_sub(1);
        self.current()
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.responses.len()
    }

    pub fn has_previous(&self) -> bool {
        self.index > 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::tests::{choice, question};
    use chrono::{TimeZone, Utc};

    pub(crate) fn response(id: &str, answers: Vec<(&str, AnswerValue)>) -> FormResponseDetail {
        FormResponseDetail {
            id: id.into(),
            form_id: "f1".into(),
            respondent_id: None,
            submitted_at: Utc.with_ymd_and_hms(2026, 3, 4, 9, 5, 0).unwrap(),
            is_complete: true,
            is_valid: true,
            ip_address: None,
            user_agent: None,
            answers: answers
                .into_iter()
                .map(|(qid, value)| Answer {
                    id: format!("{id}-{qid}"),
                    question_id: qid.into(),
                    form_response_id: Some(id.into()),
                    value,
                    created_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn checkbox_percentages_use_answering_responses() {
        let q = choice("c", QuestionType::Checkbox, &["A", "B", "C"]);
        let responses: Vec<_> = (0..10)
            .map(|i| {
                let mut picks = Vec::new();
                if i < 6 {
                    picks.push("A");
                }
                if (6..9).contains(&i) {
                    picks.push("B");
                }
                response(&format!("r{i}"), vec![("c", AnswerValue::list(picks))])
            })
            .collect();
        let stats = option_stats(&q, &responses);
        assert_eq!(stats[0], OptionStat { option: "A".into(), count: 6, percentage: 60 });
        assert_eq!(stats[1], OptionStat { option: "B".into(), count: 3, percentage: 30 });
        assert_eq!(stats[2].count, 0);

        let summary = aggregate(&q, &responses);
        assert_eq!(summary.total_responses, 10);
        assert_eq!(summary.report, QuestionReport::Choice { options: stats });
    }

    #[test]
    fn summary_counts_only_answering_responses() {
        let q = question("n", QuestionType::Number);
        let responses = vec![
            response("r1", vec![("n", AnswerValue::Number(3.0))]),
            response("r2", vec![("other", AnswerValue::text("x"))]),
        ];
        let summary = aggregate(&q, &responses);
        assert_eq!(summary.question_id, "n");
        assert_eq!(summary.total_responses, 1);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["kind"], "numeric");
        assert_eq!(json["total_responses"], 1);
        assert_eq!(json["avg"], 3.0);
    }

    #[test]
    fn unanswered_responses_are_not_in_denominator() {
        let q = choice("m", QuestionType::MultipleChoice, &["Oui", "Non"]);
        let responses = vec![
            response("r1", vec![("m", AnswerValue::text("Oui"))]),
            response("r2", vec![]),
        ];
        let stats = option_stats(&q, &responses);
        assert_eq!(stats[0].percentage, 100);
        assert_eq!(response_count("m", &responses), 1);
    }

    #[test]
    fn number_stats_round_average() {
        let q = question("n", QuestionType::Number);
        let responses = vec![
            response("r1", vec![("n", AnswerValue::Number(1.0))]),
            response("r2", vec![("n", AnswerValue::Number(2.0))]),
            response("r3", vec![("n", AnswerValue::Number(4.0))]),
        ];
        let stats = number_stats(&q, &responses);
        assert_eq!(stats, NumberStats { min: 1.0, avg: 2.0, max: 4.0 });
        assert_eq!(
            number_stats(&q, &[]),
            NumberStats { min: 0.0, avg: 0.0, max: 0.0 }
        );
    }

    #[test]
    fn negative_half_average_rounds_up() {
        let q = question("n", QuestionType::Number);
        let responses = vec![
            response("r1", vec![("n", AnswerValue::Number(-2.0))]),
            response("r2", vec![("n", AnswerValue::Number(-3.0))]),
        ];
        assert_eq!(number_stats(&q, &responses).avg, -2.0);
        let positive = vec![
            response("r1", vec![("n", AnswerValue::Number(2.0))]),
            response("r2", vec![("n", AnswerValue::Number(3.0))]),
        ];
        assert_eq!(number_stats(&q, &positive).avg, 3.0);
    }

    #[test]
    fn stats_count_list_elements() {
        let responses = vec![
            response("r1", vec![("c", AnswerValue::list(["A", "B"]))]),
            response("r2", vec![("c", AnswerValue::list(["A"]))]),
        ];
        let grouped = group_answers_by_question(&responses);
        let stats = question_stats(&grouped["c"]);
        assert_eq!(stats.total_responses, 2);
        assert_eq!(stats.unique_values, 2);
        assert_eq!(stats.distribution["A"], 2);
    }

    #[test]
    fn text_and_date_reports() {
        let t = question("t", QuestionType::ShortText);
        let d = question("d", QuestionType::Date);
        let responses = vec![
            response("r1", vec![("t", AnswerValue::text("bien")), ("d", AnswerValue::text("2026-01-02"))]),
            response("r2", vec![("t", AnswerValue::text("")), ("d", AnswerValue::text("2026-01-02"))]),
        ];
        let text = aggregate(&t, &responses);
        assert_eq!(text.report, QuestionReport::Text { answers: vec!["bien".into()] });
        assert_eq!(text.total_responses, 2);
        match aggregate(&d, &responses).report {
            QuestionReport::Date { distribution } => assert_eq!(distribution["2026-01-02"], 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_formats() {
        let d = question("d", QuestionType::Date);
        let c = choice("c", QuestionType::Checkbox, &["A", "B"]);
        let missing = question("x", QuestionType::ShortText);
        let r = response(
            "r1",
            vec![("d", AnswerValue::text("2026-05-09")), ("c", AnswerValue::list(["A", "B"]))],
        );
        assert_eq!(display_answer(&r, &d), "09/05/2026");
        assert_eq!(display_answer(&r, &c), "A, B");
        assert_eq!(display_answer(&r, &missing), "-");
    }

    #[test]
    fn browser_clamps() {
        let mut b = ResponseBrowser::new(vec![response("r1", vec![]), response("r2", vec![])]);
        assert!(!b.has_previous());
        assert_eq!(b.previous_response().unwrap().id, "r1");
        assert_eq!(b.next_response().unwrap().id, "r2");
        assert_eq!(b.next_response().unwrap().id, "r2");
        assert!(!b.has_next());
        assert!(ResponseBrowser::default().current().is_none());
    }
}
