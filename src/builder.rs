//! Author-side editing state for one form.
//!
//! Structural edits are applied locally first and renumbered. The `*_and_persist`
//! variants and [`FormBuilder::delete_remote`] then send the dense order to the
//! backend once the form has an id; a failed send keeps the local order.

use tracing::{debug, info, warn};

use crate::api::FormsBackend;
use crate::error::{ApiError, BuilderError};
use crate::events::{EventBus, NotificationLevel};
use crate::models::{validate_question_definition, Question, QuestionId};
use crate::ordering::{
    duplicate, move_down, move_item, move_up, normalize_order, order_assignments, renumber,
};
use crate::question_types::QuestionType;
use crate::sequence::{RequestSequencer, Ticket};

pub const ORDER_RELOADED: &str =
    "L'ordre des questions a été rechargé depuis le serveur.";

pub struct FormBuilder {
    form_id: Option<String>,
    questions: Vec<Question>,
    selected: Option<QuestionId>,
    order_diverged: bool,
    loads: RequestSequencer,
    events: EventBus,
}

impl FormBuilder {
    pub fn new(form_id: Option<String>, events: EventBus) -> Self {
        Self {
            form_id,
            questions: Vec::new(),
            selected: None,
            order_diverged: false,
            loads: RequestSequencer::new(),
            events,
        }
    }

    pub fn form_id(&self) -> Option<&str> {
        self.form_id.as_deref()
    }

    pub fn set_form_id(&mut self, form_id: impl Into<String>) {
        self.form_id = Some(form_id.into());
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn selected(&self) -> Option<&QuestionId> {
        self.selected.as_ref()
    }

    pub fn order_diverged(&self) -> bool {
        self.order_diverged
    }

    fn index_of(&self, id: &QuestionId) -> Result<usize, BuilderError> {
        self.questions
            .iter()
            .position(|q| &q.id == id)
            .ok_or_else(|| BuilderError::QuestionNotFound(id.clone()))
    }

    fn require_form_id(&self) -> Result<String, BuilderError> {
        self.form_id.clone().ok_or(BuilderError::FormNotSaved)
    }

    /// Appends a blank question of `question_type` and selects it.
    pub fn add_question(&mut self, question_type: QuestionType) -> QuestionId {
        let form_id = self.form_id.clone().unwrap_or_default();
        let question = Question::new_local(form_id, question_type, self.questions.len());
        let id = question.id.clone();
        self.questions.push(question);
        self.selected = Some(id.clone());
        id
    }

    /// Selecting the already-selected question clears the selection.
    pub fn select(&mut self, id: &QuestionId) {
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        } else {
            self.selected = Some(id.clone());
        }
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Replaces the stored definition, keeping its position.
    pub fn update_question(&mut self, updated: Question) -> Result<(), BuilderError> {
        let index = self.index_of(&updated.id)?;
        let order = self.questions[index].order;
        self.questions[index] = Question { order, ..updated };
        Ok(())
    }

    /// Local removal. Persisted questions also need [`Self::delete_remote`].
    pub fn delete_question(&mut self, id: &QuestionId) -> Result<Question, BuilderError> {
        let index = self.index_of(id)?;
        let removed = self.questions.remove(index);
        renumber(&mut self.questions);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        Ok(removed)
    }

    pub fn duplicate_question(&mut self, id: &QuestionId) -> Result<QuestionId, BuilderError> {
        let index = self.index_of(id)?;
        let copy = duplicate(&self.questions[index], self.questions.len());
        let copy_id = copy.id.clone();
        self.questions.push(copy);
        renumber(&mut self.questions);
        Ok(copy_id)
    }

    /// Drag-and-drop drop: move from one index to another.
    pub fn drop_question(&mut self, from: usize, to: usize) -> Result<(), BuilderError> {
        move_item(&mut self.questions, from, to)?;
        renumber(&mut self.questions);
        Ok(())
    }

    pub fn move_question_up(&mut self, id: &QuestionId) -> Result<bool, BuilderError> {
        let index = self.index_of(id)?;
        let moved = move_up(&mut self.questions, index);
        renumber(&mut self.questions);
        Ok(moved)
    }

    pub fn move_question_down(&mut self, id: &QuestionId) -> Result<bool, BuilderError> {
        let index = self.index_of(id)?;
        let moved = move_down(&mut self.questions, index);
        renumber(&mut self.questions);
        Ok(moved)
    }

    /// Swaps a local question for the backend's copy in place.
    pub fn reconcile(&mut self, local_id: &QuestionId, persisted: Question) -> Result<(), BuilderError> {
        let index = self.index_of(local_id)?;
        let order = self.questions[index].order;
        let new_id = persisted.id.clone();
        self.questions[index] = Question { order, ..persisted };
        if self.selected.as_ref() == Some(local_id) {
            self.selected = Some(new_id);
        }
        Ok(())
    }

    /// Creates or patches one question, then reconciles with the response.
    pub async fn save_question(
        &mut self,
        backend: &dyn FormsBackend,
        id: &QuestionId,
    ) -> Result<QuestionId, BuilderError> {
        let form_id = self.require_form_id()?;
        let question = self.questions[self.index_of(id)?].clone();
        validate_question_definition(&question).map_err(BuilderError::Invalid)?;

        let saved = match &question.id {
            QuestionId::Persisted(qid) => {
                backend
                    .update_question(&form_id, qid, &question.to_update())
                    .await
            }
            QuestionId::Local(_) => backend.create_question(&form_id, &question.to_create()).await,
        }
        .map_err(|err| self.report(err))?;

        let saved_id = saved.id.clone();
        self.reconcile(id, saved)?;
        debug!(form_id = %form_id, question_id = %saved_id, "question saved");
        Ok(saved_id)
    }

    /// Deletes locally and, for persisted questions, on the backend, then
    /// sends the renumbered order.
    pub async fn delete_remote(
        &mut self,
        backend: &dyn FormsBackend,
        id: &QuestionId,
    ) -> Result<(), BuilderError> {
        self.index_of(id)?;
        if let Some(qid) = id.as_persisted() {
            let form_id = self.require_form_id()?;
            backend
                .delete_question(&form_id, qid)
                .await
                .map_err(|err| self.report(err))?;
        }
        self.delete_question(id)?;
        self.sync_order(backend).await
    }

    pub async fn drop_and_persist(
        &mut self,
        backend: &dyn FormsBackend,
        from: usize,
        to: usize,
    ) -> Result<(), BuilderError> {
        self.drop_question(from, to)?;
        self.sync_order(backend).await
    }

    pub async fn move_up_and_persist(
        &mut self,
        backend: &dyn FormsBackend,
        id: &QuestionId,
    ) -> Result<bool, BuilderError> {
        let moved = self.move_question_up(id)?;
        if moved {
            self.sync_order(backend).await?;
        }
        Ok(moved)
    }

    pub async fn move_down_and_persist(
        &mut self,
        backend: &dyn FormsBackend,
        id: &QuestionId,
    ) -> Result<bool, BuilderError> {
        let moved = self.move_question_down(id)?;
        if moved {
            self.sync_order(backend).await?;
        }
        Ok(moved)
    }

    /// The copy stays local until saved; the persisted questions keep their
    /// renumbered positions.
    pub async fn duplicate_and_persist(
        &mut self,
        backend: &dyn FormsBackend,
        id: &QuestionId,
    ) -> Result<QuestionId, BuilderError> {
        let copy = self.duplicate_question(id)?;
        self.sync_order(backend).await?;
        Ok(copy)
    }

    /// Unsaved forms have nothing to reorder on the backend.
    async fn sync_order(&mut self, backend: &dyn FormsBackend) -> Result<(), BuilderError> {
        if self.form_id.is_none() {
            return Ok(());
        }
        self.persist_order(backend).await
    }

    /// Sends the current order. On failure the local order stays and is
    /// flagged as diverged until the next load.
    pub async fn persist_order(&mut self, backend: &dyn FormsBackend) -> Result<(), BuilderError> {
        let form_id = self.require_form_id()?;
        let batch = order_assignments(&self.questions);
        if batch.is_empty() {
            return Ok(());
        }
        match backend.reorder_questions(&form_id, &batch).await {
            Ok(()) => {
                self.order_diverged = false;
                info!(form_id = %form_id, count = batch.len(), "question order saved");
                Ok(())
            }
            Err(err) => {
                warn!(form_id = %form_id, "reorder failed: {}", err);
                self.order_diverged = true;
                if err.should_notify() {
                    self.events.notify(
                        NotificationLevel::Error,
                        None,
                        format!("Erreur lors de la réorganisation: {}", err.message),
                    );
                }
                Err(err.into())
            }
        }
    }

    pub fn begin_load(&self) -> Ticket {
        self.loads.issue()
    }

    /// Applies a load result unless a newer load has been started since.
    /// Returns whether the result was applied.
    pub fn apply_load(&mut self, ticket: Ticket, result: Result<Vec<Question>, ApiError>) -> bool {
        if !self.loads.is_latest(ticket) {
            debug!("dropping stale question load");
            return false;
        }
        match result {
            Ok(mut questions) => {
                normalize_order(&mut questions);
                self.questions = questions;
                if let Some(sel) = &self.selected {
                    if !self.questions.iter().any(|q| &q.id == sel) {
                        self.selected = None;
                    }
                }
                if self.order_diverged {
                    self.order_diverged = false;
                    self.events
                        .notify(NotificationLevel::Warning, None, ORDER_RELOADED);
                }
            }
            Err(err) => {
                self.events.notify_api_error(&err);
            }
        }
        true
    }

    pub async fn load(&mut self, backend: &dyn FormsBackend) -> Result<(), BuilderError> {
        let form_id = self.require_form_id()?;
        let ticket = self.begin_load();
        let result = backend.fetch_questions(&form_id).await;
        let err = result.as_ref().err().cloned();
        self.apply_load(ticket, result);
        match err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn report(&self, err: ApiError) -> ApiError {
        self.events.notify_api_error(&err);
        err
    }
}
