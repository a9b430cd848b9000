//! Respondent-side state for filling one form.

use std::collections::HashMap;
use tracing::{info, warn};

use crate::api::FormsBackend;
use crate::error::{SessionError, SubmitError};
use crate::events::{EventBus, NotificationLevel};
use crate::models::{
    AnswerDraft, AnswerValue, Form, FormResponseCreate, FormResponseDetail, Question,
    ValidationIssue,
};
use crate::progress::{calculate_progress, drafts_to_submission, FormProgress, ProgressMode};
use crate::validation::validate_answer;

pub const SUBMIT_SUCCESS: &str = "Vos réponses ont été enregistrées. Merci !";

pub struct AnswerSession {
    form: Form,
    questions: Vec<Question>,
    drafts: HashMap<String, AnswerDraft>,
    progress: FormProgress,
    submitting: bool,
    events: EventBus,
}

/// Clears the in-flight flag on every exit path of `submit`.
struct SubmittingGuard<'a>(&'a mut bool);

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

impl AnswerSession {
    pub fn new(form: Form, mut questions: Vec<Question>, events: EventBus) -> Self {
        questions.sort_by_key(|q| q.order);
        let progress = calculate_progress(questions.len(), std::iter::empty(), ProgressMode::Strict);
        Self {
            form,
            questions,
            drafts: HashMap::new(),
            progress,
            submitting: false,
            events,
        }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id.to_string() == question_id)
    }

    /// Stores the latest value for a question and revalidates it.
    pub fn set_answer(
        &mut self,
        question_id: &str,
        value: AnswerValue,
    ) -> Result<&AnswerDraft, SessionError> {
        let question = self
            .question(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        let value = value.normalize(question.question_type);
        let error_message = validate_answer(question, &value);
        let draft = AnswerDraft {
            question_id: question_id.to_string(),
            value,
            is_valid: error_message.is_none(),
            error_message,
        };
        self.drafts.insert(question_id.to_string(), draft);
        self.recompute();
        self.drafts
            .get(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))
    }

    pub fn draft(&self, question_id: &str) -> Option<&AnswerDraft> {
        self.drafts.get(question_id)
    }

    pub fn remove_answer(&mut self, question_id: &str) -> Option<AnswerDraft> {
        let removed = self.drafts.remove(question_id);
        self.recompute();
        removed
    }

    pub fn reset(&mut self) {
        self.drafts.clear();
        self.recompute();
    }

    pub fn progress(&self) -> FormProgress {
        self.progress
    }

    /// Answered questions regardless of validity, for the progress bar.
    pub fn lenient_progress(&self) -> FormProgress {
        calculate_progress(self.questions.len(), self.drafts.values(), ProgressMode::Lenient)
    }

    fn recompute(&mut self) {
        self.progress =
            calculate_progress(self.questions.len(), self.drafts.values(), ProgressMode::Strict);
    }

    pub fn all_valid(&self) -> bool {
        self.validate_all().is_empty()
    }

    /// Validates every question, including the ones never touched.
    pub fn validate_all(&self) -> Vec<ValidationIssue> {
        self.questions
            .iter()
            .filter_map(|q| {
                let key = q.id.to_string();
                let value = self
                    .drafts
                    .get(&key)
                    .map(|d| d.value.clone())
                    .unwrap_or_default();
                validate_answer(q, &value).map(|issue| ValidationIssue { field: key, issue })
            })
            .collect()
    }

    /// Submission payload with answers in question order.
    pub fn prepare_submission(&self) -> FormResponseCreate {
        drafts_to_submission(
            self.questions
                .iter()
                .filter_map(|q| self.drafts.get(&q.id.to_string())),
        )
    }

    pub async fn submit(
        &mut self,
        backend: &dyn FormsBackend,
    ) -> Result<FormResponseDetail, SubmitError> {
        if !self.form.can_accept_responses() {
            return Err(SubmitError::FormClosed);
        }
        if self.submitting {
            return Err(SubmitError::AlreadySubmitting);
        }

        let issues = self.validate_all();
        if !issues.is_empty() {
            return Err(SubmitError::Invalid(issues));
        }

        let payload = self.prepare_submission();
        let form_id = self.form.id.clone();
        let events = self.events.clone();

        self.submitting = true;
        let result = {
            let _guard = SubmittingGuard(&mut self.submitting);
            backend.submit_response(&form_id, &payload).await
        };

        match result {
            Ok(stored) => {
                info!(form_id = %form_id, response_id = %stored.id, "response submitted");
                self.reset();
                events.notify(NotificationLevel::Success, None, SUBMIT_SUCCESS);
                Ok(stored)
            }
            Err(err) => {
                warn!(form_id = %form_id, "submission failed: {}", err);
                events.notify_api_error(&err);
                Err(err.into())
            }
        }
    }
}
