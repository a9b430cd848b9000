use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::question_types::QuestionType;

/// Identity of a question in the builder.
///
/// Questions created in the builder live under a `Local` id until the backend
/// assigns a durable one. Anything read from the wire is `Persisted`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionId {
    Persisted(String),
    Local(Uuid),
}

impl QuestionId {
    pub fn new_local() -> Self {
        QuestionId::Local(Uuid::new_v4())
    }

    pub fn persisted(id: impl Into<String>) -> Self {
        QuestionId::Persisted(id.into())
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, QuestionId::Persisted(_))
    }

    pub fn as_persisted(&self) -> Option<&str> {
        match self {
            QuestionId::Persisted(id) => Some(id),
            QuestionId::Local(_) => None,
        }
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionId::Persisted(id) => f.write_str(id),
            QuestionId::Local(id) => write!(f, "local:{id}"),
        }
    }
}

/// Answer payload. The shape is decided by the question type; see
/// [`AnswerValue::normalize`] for the wire-to-typed conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AnswerValue {
    #[default]
    Null,
    Number(f64),
    List(Vec<String>),
    Text(String),
    Date(NaiveDate),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::List(values.into_iter().map(Into::into).collect())
    }

    /// Null, empty string and empty list count as "not answered".
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Null => true,
            AnswerValue::Text(s) => s.is_empty(),
            AnswerValue::List(items) => items.is_empty(),
            AnswerValue::Number(_) | AnswerValue::Date(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Interprets raw user input (CLI flags, form fields) for a question type.
    /// Checkbox input is comma separated; unparsable or non-finite numbers
    /// stay text so validation can report them.
    pub fn parse_input(question_type: QuestionType, raw: &str) -> Self {
        match question_type {
            QuestionType::Number => match raw.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => AnswerValue::Number(n),
                _ => AnswerValue::text(raw),
            },
            QuestionType::Checkbox => AnswerValue::list(
                raw.split(',').map(str::trim).filter(|s| !s.is_empty()),
            ),
            _ => AnswerValue::text(raw).normalize(question_type),
        }
    }

    /// Dates arrive as strings on the wire; date questions get them parsed.
    pub fn normalize(self, question_type: QuestionType) -> Self {
        match (question_type, self) {
            (QuestionType::Date, AnswerValue::Text(raw)) => match parse_wire_date(&raw) {
                Some(date) => AnswerValue::Date(date),
                None => AnswerValue::Text(raw),
            },
            (_, value) => value,
        }
    }
}

pub(crate) fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Backend timestamps come with or without an offset; naive ones are UTC.
pub(crate) mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    pub form_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub question_type: QuestionType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(
        default,
        deserialize_with = "wire_time::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "wire_time::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Question {
    /// Blank local question, as the builder creates it.
    pub fn new_local(form_id: impl Into<String>, question_type: QuestionType, order: usize) -> Self {
        Self {
            id: QuestionId::new_local(),
            form_id: form_id.into(),
            title: String::new(),
            description: None,
            question_type,
            is_required: false,
            order,
            options: question_type
                .requires_options()
                .then(|| vec!["Option 1".to_string()]),
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options
            .as_ref()
            .map(|opts| opts.iter().any(|o| o == value))
            .unwrap_or(false)
    }

    pub fn to_create(&self) -> QuestionCreate {
        QuestionCreate {
            title: self.title.clone(),
            description: self.description.clone(),
            question_type: self.question_type,
            is_required: self.is_required,
            order: Some(self.order),
            options: self.options.clone(),
            min_length: self.min_length,
            max_length: self.max_length,
            min_value: self.min_value,
            max_value: self.max_value,
        }
    }

    pub fn to_update(&self) -> QuestionUpdate {
        QuestionUpdate {
            title: Some(self.title.clone()),
            description: self.description.clone(),
            is_required: Some(self.is_required),
            order: Some(self.order),
            options: self.options.clone(),
            min_length: self.min_length,
            max_length: self.max_length,
            min_value: self.min_value,
            max_value: self.max_value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub question_type: QuestionType,
    pub is_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QuestionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionOrder {
    pub question_id: String,
    pub order: usize,
}

/// In-progress answer for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerDraft {
    pub question_id: String,
    pub value: AnswerValue,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerCreate {
    pub question_id: String,
    pub value: AnswerValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FormResponseCreate {
    pub answers: Vec<AnswerCreate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_response_id: Option<String>,
    #[serde(default)]
    pub value: AnswerValue,
    #[serde(
        default,
        deserialize_with = "wire_time::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// A stored submission with its answers, as the backend returns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormResponseDetail {
    #[serde(rename = "_id")]
    pub id: String,
    pub form_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent_id: Option<String>,
    #[serde(deserialize_with = "wire_time::deserialize")]
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl FormResponseDetail {
    pub fn answer_for(&self, question_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Form {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub accepts_responses: bool,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub response_count: u64,
    #[serde(
        default,
        deserialize_with = "wire_time::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "wire_time::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormWithQuestions {
    #[serde(flatten)]
    pub form: Form,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    Draft,
    Active,
    Closed,
    Archived,
}

impl Form {
    pub fn status(&self) -> FormStatus {
        if !self.is_active {
            FormStatus::Archived
        } else if !self.accepts_responses {
            FormStatus::Closed
        } else if self.response_count == 0 {
            FormStatus::Draft
        } else {
            FormStatus::Active
        }
    }

    pub fn can_accept_responses(&self) -> bool {
        self.is_active && self.accepts_responses
    }
}

/// Public link respondents open to fill the form.
pub fn share_link(origin: &str, form_id: &str) -> String {
    format!("{}/forms/{}/view", origin.trim_end_matches('/'), form_id)
}

/// Relative creation date for form lists.
pub fn format_created_date(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - created).num_days();
    match days {
        d if d <= 0 => "Aujourd'hui".to_string(),
        1 => "Hier".to_string(),
        d if d < 7 => format!("Il y a {d} jours"),
        _ => created.format("%d/%m/%Y").to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub issue: String,
}

fn issue(field: String, issue: &str) -> ValidationIssue {
    ValidationIssue {
        field,
        issue: issue.into(),
    }
}

/// Checks a question definition before it is saved from the builder.
pub fn validate_question_definition(question: &Question) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    collect_question_issues(question, "", &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Same checks over a whole form, with `questions[i].` field prefixes.
pub fn validate_questions(questions: &[Question]) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let mut ids = HashSet::new();
    for (i, q) in questions.iter().enumerate() {
        let prefix = format!("questions[{i}].");
        if !ids.insert(&q.id) {
            issues.push(issue(format!("{prefix}_id"), "must be unique"));
        }
        collect_question_issues(q, &prefix, &mut issues);
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

fn collect_question_issues(q: &Question, prefix: &str, issues: &mut Vec<ValidationIssue>) {
    if q.title.trim().is_empty() {
        issues.push(issue(format!("{prefix}title"), "must not be empty"));
    }

    if q.question_type.requires_options() {
        match &q.options {
            None => issues.push(issue(
                format!("{prefix}options"),
                "is required for choice questions",
            )),
            Some(opts) => {
                if opts.is_empty() {
                    issues.push(issue(
                        format!("{prefix}options"),
                        "must contain at least 1 option",
                    ));
                }
                let mut seen = HashSet::new();
                for (j, opt) in opts.iter().enumerate() {
                    if opt.trim().is_empty() {
                        issues.push(issue(format!("{prefix}options[{j}]"), "must not be empty"));
                    }
                    if !seen.insert(opt.as_str()) {
                        issues.push(issue(format!("{prefix}options[{j}]"), "must be unique"));
                    }
                }
            }
        }
    } else if q.options.as_ref().is_some_and(|o| !o.is_empty()) {
        issues.push(issue(
            format!("{prefix}options"),
            "must be absent for this question type",
        ));
    }

    if let (Some(min), Some(max)) = (q.min_length, q.max_length) {
        if min > max {
            issues.push(issue(
                format!("{prefix}min_length"),
                "must not exceed max_length",
            ));
        }
    }
    if let (Some(min), Some(max)) = (q.min_value, q.max_value) {
        if min > max {
            issues.push(issue(
                format!("{prefix}min_value"),
                "must not exceed max_value",
            ));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn question(id: &str, question_type: QuestionType) -> Question {
        Question {
            id: QuestionId::persisted(id),
            form_id: "f1".into(),
            title: format!("Question {id}"),
            description: None,
            question_type,
            is_required: false,
            order: 0,
            options: None,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub(crate) fn choice(id: &str, question_type: QuestionType, options: &[&str]) -> Question {
        let mut q = question(id, question_type);
        q.options = Some(options.iter().map(|o| o.to_string()).collect());
        q
    }

    fn form(active: bool, accepts: bool, count: u64) -> Form {
        Form {
            id: "f1".into(),
            title: "Satisfaction".into(),
            description: None,
            owner_id: "u1".into(),
            is_active: active,
            accepts_responses: accepts,
            requires_auth: false,
            response_count: count,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn answer_value_emptiness() {
        assert!(AnswerValue::Null.is_empty());
        assert!(AnswerValue::text("").is_empty());
        assert!(AnswerValue::List(vec![]).is_empty());
        assert!(!AnswerValue::text(" ").is_empty());
        assert!(!AnswerValue::Number(0.0).is_empty());
    }

    #[test]
    fn answer_value_from_wire() {
        let v: AnswerValue = serde_json::from_str("null").unwrap();
        assert_eq!(v, AnswerValue::Null);
        let v: AnswerValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, AnswerValue::Number(42.0));
        let v: AnswerValue = serde_json::from_str(r#"["A","B"]"#).unwrap();
        assert_eq!(v, AnswerValue::list(["A", "B"]));
        let v: AnswerValue = serde_json::from_str(r#""2024-03-05""#).unwrap();
        assert_eq!(v, AnswerValue::text("2024-03-05"));
        assert_eq!(
            v.normalize(QuestionType::Date),
            AnswerValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap())
        );
    }

    #[test]
    fn wire_question_is_persisted() {
        let raw = serde_json::json!({
            "_id": "q1",
            "form_id": "f1",
            "title": "Âge",
            "question_type": "number",
            "is_required": true,
            "order": 2,
            "min_value": 0,
            "created_at": "2024-01-02T10:00:00"
        });
        let q: Question = serde_json::from_value(raw).unwrap();
        assert_eq!(q.id, QuestionId::persisted("q1"));
        assert_eq!(q.min_value, Some(0.0));
        assert!(q.created_at.is_some());
    }

    #[test]
    fn local_question_gets_default_option() {
        let q = Question::new_local("f1", QuestionType::Dropdown, 3);
        assert!(!q.id.is_persisted());
        assert_eq!(q.options, Some(vec!["Option 1".to_string()]));
        assert_eq!(q.order, 3);
        assert!(Question::new_local("f1", QuestionType::Email, 0).options.is_none());
    }

    #[test]
    fn form_status_rules() {
        assert_eq!(form(false, true, 5).status(), FormStatus::Archived);
        assert_eq!(form(true, false, 5).status(), FormStatus::Closed);
        assert_eq!(form(true, true, 0).status(), FormStatus::Draft);
        assert_eq!(form(true, true, 3).status(), FormStatus::Active);
        assert!(!form(true, false, 0).can_accept_responses());
    }

    #[test]
    fn created_date_formatting() {
        let now = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
        assert_eq!(format_created_date(now, now), "Aujourd'hui");
        assert_eq!(
            format_created_date(now - chrono::Duration::days(1), now),
            "Hier"
        );
        assert_eq!(
            format_created_date(now - chrono::Duration::days(4), now),
            "Il y a 4 jours"
        );
        assert_eq!(
            format_created_date(now - chrono::Duration::days(30), now),
            "21/05/2024"
        );
    }

    #[test]
    fn question_definition_negative() {
        let mut q = choice("q1", QuestionType::Checkbox, &["A", "A", " "]);
        q.title = "  ".into();
        q.min_length = Some(5);
        q.max_length = Some(2);
        let issues = validate_question_definition(&q).unwrap_err();
        assert!(issues.iter().any(|i| i.field == "title"));
        assert!(issues.iter().any(|i| i.issue == "must be unique"));
        assert!(issues.iter().any(|i| i.field == "options[2]"));
        assert!(issues.iter().any(|i| i.field == "min_length"));
    }

    #[test]
    fn questions_must_have_unique_ids() {
        let a = question("q1", QuestionType::ShortText);
        let b = question("q1", QuestionType::Email);
        let issues = validate_questions(&[a, b]).unwrap_err();
        assert_eq!(issues[0].field, "questions[1]._id");
    }

    #[test]
    fn share_link_trims_slash() {
        assert_eq!(
            share_link("https://forms.example/", "abc"),
            "https://forms.example/forms/abc/view"
        );
    }

    #[test]
    fn raw_input_follows_question_type() {
        assert_eq!(
            AnswerValue::parse_input(QuestionType::Number, " 4.5 "),
            AnswerValue::Number(4.5)
        );
        assert_eq!(
            AnswerValue::parse_input(QuestionType::Number, "abc"),
            AnswerValue::text("abc")
        );
        assert_eq!(
            AnswerValue::parse_input(QuestionType::Number, "NaN"),
            AnswerValue::text("NaN")
        );
        assert_eq!(
            AnswerValue::parse_input(QuestionType::Number, "-inf"),
            AnswerValue::text("-inf")
        );
        assert_eq!(
            AnswerValue::parse_input(QuestionType::Checkbox, "A, B,,"),
            AnswerValue::list(["A", "B"])
        );
        assert_eq!(
            AnswerValue::parse_input(QuestionType::Date, "2026-10-15"),
            AnswerValue::Date(NaiveDate::from_ymd_opt(2026, 10, 15).unwrap())
        );
    }
}
