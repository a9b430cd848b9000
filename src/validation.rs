//! Answer validation.
//!
//! [`validate_answer`] returns the first problem with an answer, or `None`.
//! Messages are shown inline next to the field, so they are user-facing
//! strings rather than error values.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{parse_wire_date, AnswerValue, Question};
use crate::question_types::QuestionType;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

pub const REQUIRED: &str = "Cette question est obligatoire";
pub const REQUIRED_SELECTION: &str = "Veuillez sélectionner au moins une option";
pub const INVALID_TEXT: &str = "Réponse invalide";
pub const INVALID_NUMBER: &str = "Veuillez entrer un nombre valide";
pub const INVALID_EMAIL: &str = "Veuillez entrer une adresse email valide";
pub const INVALID_OPTION: &str = "Option invalide";
pub const INVALID_FORMAT: &str = "Format de réponse invalide";
pub const INVALID_OPTIONS: &str = "Une ou plusieurs options invalides";
pub const INVALID_DATE: &str = "Veuillez entrer une date valide";

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

pub fn validate_answer(question: &Question, value: &AnswerValue) -> Option<String> {
    if question.is_required {
        match value {
            AnswerValue::Null => return Some(REQUIRED.into()),
            AnswerValue::Text(s) if s.is_empty() => return Some(REQUIRED.into()),
            AnswerValue::List(items) if items.is_empty() => {
                return Some(REQUIRED_SELECTION.into())
            }
            _ => {}
        }
    }

    if value.is_empty() {
        return None;
    }

    match (question.question_type, value) {
        (QuestionType::ShortText | QuestionType::LongText, AnswerValue::Text(text)) => {
            check_length(question, text)
        }
        (QuestionType::ShortText | QuestionType::LongText, _) => Some(INVALID_TEXT.into()),

        (QuestionType::Number, AnswerValue::Number(n)) if !n.is_finite() => {
            Some(INVALID_NUMBER.into())
        }
        (QuestionType::Number, AnswerValue::Number(n)) => check_bounds(question, *n),
        (QuestionType::Number, _) => Some(INVALID_NUMBER.into()),

        (QuestionType::Email, AnswerValue::Text(text)) if is_valid_email(text) => None,
        (QuestionType::Email, _) => Some(INVALID_EMAIL.into()),

        (QuestionType::MultipleChoice | QuestionType::Dropdown, AnswerValue::Text(choice))
            if question.has_option(choice) =>
        {
            None
        }
        (QuestionType::MultipleChoice | QuestionType::Dropdown, _) => {
            Some(INVALID_OPTION.into())
        }

        (QuestionType::Checkbox, AnswerValue::List(items)) => items
            .iter()
            .any(|item| !question.has_option(item))
            .then(|| INVALID_OPTIONS.to_string()),
        (QuestionType::Checkbox, _) => Some(INVALID_FORMAT.into()),

        (QuestionType::Date, AnswerValue::Date(_)) => None,
        (QuestionType::Date, AnswerValue::Text(raw)) if parse_wire_date(raw).is_some() => None,
        (QuestionType::Date, _) => Some(INVALID_DATE.into()),
    }
}

fn check_length(question: &Question, text: &str) -> Option<String> {
    let len = text.chars().count();
    if let Some(min) = question.min_length.filter(|m| *m > 0) {
        if len < min {
            return Some(format!("Minimum {min} caractères requis"));
        }
    }
    if let Some(max) = question.max_length.filter(|m| *m > 0) {
        if len > max {
            return Some(format!("Maximum {max} caractères autorisés"));
        }
    }
    None
}

fn check_bounds(question: &Question, n: f64) -> Option<String> {
    if let Some(min) = question.min_value {
        if n < min {
            return Some(format!("La valeur minimale est {min}"));
        }
    }
    if let Some(max) = question.max_value {
        if n > max {
            return Some(format!("La valeur maximale est {max}"));
        }
    }
    None
}
