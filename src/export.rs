//! CSV export of form responses.

use chrono::NaiveDate;

use crate::models::{wire_time, AnswerValue, FormResponseDetail};

pub const SUBMITTED_AT_HEADER: &str = "Date de soumission";
pub const RESPONDENT_HEADER: &str = "Répondant";
pub const ANONYMOUS: &str = "Anonyme";

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// Text holding exactly an ISO date or timestamp is localized like typed
/// dates. Anything else is kept verbatim.
fn cell_value(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Null => String::new(),
        AnswerValue::Number(n) => n.to_string(),
        AnswerValue::List(items) => items.join("; "),
        AnswerValue::Date(d) => format_date(*d),
        AnswerValue::Text(s) => match looks_like_date(s) {
            Some(d) => format_date(d),
            None => s.clone(),
        },
    }
}

fn looks_like_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| wire_time::parse(trimmed).map(|dt| dt.date_naive()))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Renders every response as one CSV row. Question columns follow the order
/// in which question ids first appear across the responses.
pub fn export_responses_csv(responses: &[FormResponseDetail]) -> String {
    if responses.is_empty() {
        return String::new();
    }

    let mut question_ids: Vec<&str> = Vec::new();
    for answer in responses.iter().flat_map(|r| &r.answers) {
        if !question_ids.contains(&answer.question_id.as_str()) {
            question_ids.push(&answer.question_id);
        }
    }

    let mut lines = Vec::with_capacity(responses.len() + 1);
    let header: Vec<String> = [SUBMITTED_AT_HEADER, RESPONDENT_HEADER]
        .into_iter()
        .chain(question_ids.iter().copied())
        .map(quote)
        .collect();
    lines.push(header.join(","));

    for response in responses {
        let mut row = vec![
            quote(&response.submitted_at.format("%d/%m/%Y %H:%M:%S").to_string()),
            quote(response.respondent_id.as_deref().unwrap_or(ANONYMOUS)),
        ];
        row.extend(question_ids.iter().map(|qid| {
            let value = response
                .answer_for(qid)
                .map(|a| cell_value(&a.value))
                .unwrap_or_default();
            quote(&value)
        }));
        lines.push(row.join(","));
    }

    lines.join("\n")
}

/// `<title>_<YYYY-MM-DD>.csv`, with path separators stripped from the title.
pub fn export_file_name(form_title: &str, today: NaiveDate) -> String {
    let cleaned: String = form_title
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let stem = if cleaned.is_empty() { "responses" } else { cleaned.as_str() };
    format!("{}_{}.csv", stem, today.format("%Y-%m-%d"))
}
