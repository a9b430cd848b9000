use serde::{Deserialize, Serialize};

use crate::models::{AnswerCreate, AnswerDraft, FormResponseCreate};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormProgress {
    pub answered: usize,
    pub total: usize,
    pub percent: u32,
    pub is_complete: bool,
}

/// Which drafts count as answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    /// Any non-empty value.
    Lenient,
    /// Non-empty and valid; used when checking submission readiness.
    #[default]
    Strict,
}

pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        ((part as f64) * 100.0 / (total as f64)).round() as u32
    }
}

pub fn calculate_progress<'a, I>(total: usize, drafts: I, mode: ProgressMode) -> FormProgress
where
    I: IntoIterator<Item = &'a AnswerDraft>,
{
    let answered = drafts
        .into_iter()
        .filter(|d| !d.value.is_empty())
        .filter(|d| mode == ProgressMode::Lenient || d.is_valid)
        .count();
    FormProgress {
        answered,
        total,
        percent: percent(answered, total),
        is_complete: answered == total,
    }
}

/// Builds the submission payload, skipping empty drafts.
pub fn drafts_to_submission<'a, I>(drafts: I) -> FormResponseCreate
where
    I: IntoIterator<Item = &'a AnswerDraft>,
{
    let answers = drafts
        .into_iter()
        .filter(|d| !d.value.is_empty())
        .map(|d| AnswerCreate {
            question_id: d.question_id.clone(),
            value: d.value.clone(),
        })
        .collect();
    FormResponseCreate { answers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerValue;

    fn draft(id: &str, value: AnswerValue, is_valid: bool) -> AnswerDraft {
        AnswerDraft {
            question_id: id.into(),
            value,
            is_valid,
            error_message: None,
        }
    }

    #[test]
    fn empty_form_is_vacuously_complete() {
        let p = calculate_progress(0, &Vec::<AnswerDraft>::new(), ProgressMode::Strict);
        assert_eq!(
            p,
            FormProgress {
                answered: 0,
                total: 0,
                percent: 0,
                is_complete: true
            }
        );
    }

    #[test]
    fn half_answered() {
        let drafts = vec![
            draft("q1", AnswerValue::text("a"), true),
            draft("q2", AnswerValue::Number(3.0), true),
            draft("q3", AnswerValue::text(""), true),
        ];
        let p = calculate_progress(4, &drafts, ProgressMode::Strict);
        assert_eq!(
            p,
            FormProgress {
                answered: 2,
                total: 4,
                percent: 50,
                is_complete: false
            }
        );
    }

    #[test]
    fn strict_mode_ignores_invalid_drafts() {
        let drafts = vec![
            draft("q1", AnswerValue::text("a"), true),
            draft("q2", AnswerValue::text("bad"), false),
            draft("q3", AnswerValue::list(["x"]), true),
        ];
        assert_eq!(calculate_progress(3, &drafts, ProgressMode::Lenient).answered, 3);
        let strict = calculate_progress(3, &drafts, ProgressMode::Strict);
        assert_eq!(strict.answered, 2);
        assert_eq!(strict.percent, 67);
    }

    #[test]
    fn submission_drops_empty_values() {
        let drafts = vec![
            draft("q1", AnswerValue::text(""), true),
            draft("q2", AnswerValue::Null, true),
            draft("q3", AnswerValue::List(vec![]), true),
            draft("q4", AnswerValue::text("Yes"), true),
        ];
        let payload = drafts_to_submission(&drafts);
        assert_eq!(
            payload.answers,
            vec![AnswerCreate {
                question_id: "q4".into(),
                value: AnswerValue::text("Yes")
            }]
        );
        assert!(payload.answers.iter().all(|a| !a.value.is_empty()));
    }
}
