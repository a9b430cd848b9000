use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::AnswerValue;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    ShortText,
    LongText,
    MultipleChoice,
    Checkbox,
    Dropdown,
    Number,
    Date,
    Email,
}

/// Display metadata and capability flags for a question type.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct QuestionTypeMetadata {
    #[serde(rename = "type")]
    pub q_type: QuestionType,
    pub label: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub has_options: bool,
    pub has_validation: bool,
}

pub const ALL_TYPES: [QuestionType; 8] = [
    QuestionType::ShortText,
    QuestionType::LongText,
    QuestionType::MultipleChoice,
    QuestionType::Checkbox,
    QuestionType::Dropdown,
    QuestionType::Number,
    QuestionType::Date,
    QuestionType::Email,
];

impl QuestionType {
    pub fn metadata(self) -> QuestionTypeMetadata {
        let (label, icon, description, has_options, has_validation) = match self {
            QuestionType::ShortText => (
                "Texte court",
                "text_fields",
                "Réponse courte sur une ligne",
                false,
                true,
            ),
            QuestionType::LongText => (
                "Texte long",
                "subject",
                "Réponse longue sur plusieurs lignes",
                false,
                true,
            ),
            QuestionType::MultipleChoice => (
                "Choix multiple",
                "radio_button_checked",
                "Une seule réponse parmi plusieurs choix",
                true,
                false,
            ),
            QuestionType::Checkbox => (
                "Cases à cocher",
                "check_box",
                "Plusieurs réponses possibles",
                true,
                false,
            ),
            QuestionType::Dropdown => (
                "Liste déroulante",
                "arrow_drop_down_circle",
                "Sélection dans une liste",
                true,
                false,
            ),
            QuestionType::Number => ("Nombre", "pin", "Réponse numérique", false, true),
            QuestionType::Date => ("Date", "event", "Sélection d'une date", false, false),
            QuestionType::Email => ("Email", "email", "Adresse email valide", false, false),
        };
        QuestionTypeMetadata {
            q_type: self,
            label,
            icon,
            description,
            has_options,
            has_validation,
        }
    }

    pub fn requires_options(self) -> bool {
        self.metadata().has_options
    }

    /// Checkbox is the only type whose answer is a list.
    pub fn is_multi_value(self) -> bool {
        matches!(self, QuestionType::Checkbox)
    }

    /// Types whose answers are reported as raw strings.
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            QuestionType::ShortText | QuestionType::LongText | QuestionType::Email
        )
    }

    /// Value a freshly rendered input starts with.
    pub fn default_value(self) -> AnswerValue {
        match self {
            QuestionType::Checkbox => AnswerValue::List(Vec::new()),
            QuestionType::Number | QuestionType::Date => AnswerValue::Null,
            _ => AnswerValue::Text(String::new()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::ShortText => "short_text",
            QuestionType::LongText => "long_text",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Checkbox => "checkbox",
            QuestionType::Dropdown => "dropdown",
            QuestionType::Number => "number",
            QuestionType::Date => "date",
            QuestionType::Email => "email",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_types_have_options() {
        let with_options: Vec<_> = ALL_TYPES
            .iter()
            .filter(|t| t.requires_options())
            .copied()
            .collect();
        assert_eq!(
            with_options,
            vec![
                QuestionType::MultipleChoice,
                QuestionType::Checkbox,
                QuestionType::Dropdown
            ]
        );
    }

    #[test]
    fn report_families() {
        let multi: Vec<_> = ALL_TYPES.into_iter().filter(|t| t.is_multi_value()).collect();
        assert_eq!(multi, vec![QuestionType::Checkbox]);
        let text: Vec<_> = ALL_TYPES.into_iter().filter(|t| t.is_text_like()).collect();
        assert_eq!(
            text,
            vec![QuestionType::ShortText, QuestionType::LongText, QuestionType::Email]
        );
    }

    #[test]
    fn wire_names_are_snake_case() {
        for t in ALL_TYPES {
            let raw = serde_json::to_string(&t).unwrap();
            assert_eq!(raw, format!("\"{}\"", t.as_str()));
        }
        let parsed: QuestionType = serde_json::from_str("\"multiple_choice\"").unwrap();
        assert_eq!(parsed, QuestionType::MultipleChoice);
    }

    #[test]
    fn default_values_match_answer_shape() {
        assert_eq!(QuestionType::Checkbox.default_value(), AnswerValue::List(vec![]));
        assert_eq!(QuestionType::Number.default_value(), AnswerValue::Null);
        assert_eq!(QuestionType::Date.default_value(), AnswerValue::Null);
        assert_eq!(
            QuestionType::Email.default_value(),
            AnswerValue::Text(String::new())
        );
    }
}
