//! File-backed [`FormsBackend`] for offline use and tests.
//!
//! Everything lives in memory behind `RwLock`s and is written back to a JSON
//! snapshot after each mutation when a path is configured.

use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::warn;

use crate::api::{ApiResult, FormsBackend};
use crate::error::ApiError;
use crate::models::{
    Answer, Form, FormResponseCreate, FormResponseDetail, FormWithQuestions, Question,
    QuestionCreate, QuestionId, QuestionOrder, QuestionUpdate,
};
use crate::ordering::normalize_order;
use crate::validation::validate_answer;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    forms: HashMap<String, Form>,
    #[serde(default)]
    questions: HashMap<String, Vec<Question>>,
    #[serde(default)]
    responses: HashMap<String, FormResponseDetail>,
    #[serde(default)]
    next_question_id: i64,
    #[serde(default)]
    next_response_id: i64,
}

pub struct LocalBackend {
    forms: RwLock<HashMap<String, Form>>,
    questions: RwLock<HashMap<String, Vec<Question>>>,
    responses: RwLock<HashMap<String, FormResponseDetail>>,
    next_question_id: AtomicI64,
    next_response_id: AtomicI64,
    snapshot_path: Option<PathBuf>,
}

fn not_found() -> ApiError {
    ApiError::from_response(404, None, uuid::Uuid::new_v4().to_string())
}

/// Highest numeric part of `q<N>` ids, so generated ids never collide.
fn max_question_seq<'a>(questions: impl IntoIterator<Item = &'a Question>) -> i64 {
    questions
        .into_iter()
        .filter_map(|q| q.id.as_persisted()?.strip_prefix('q')?.parse::<i64>().ok())
        .max()
        .unwrap_or(0)
}

fn rejected(status: u16, detail: serde_json::Value) -> ApiError {
    ApiError::from_response(status, Some(&json!({ "detail": detail })), uuid::Uuid::new_v4().to_string())
}

impl LocalBackend {
    pub fn in_memory() -> Self {
        Self::from_snapshot(Snapshot::default(), None)
    }

    /// Opens a data file. A missing file starts empty; an unreadable one is an error.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let snapshot = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<Snapshot>(&raw)
                .map_err(|err| anyhow::anyhow!("failed to read data file {}: {}", path.display(), err))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self::from_snapshot(snapshot, Some(path.to_path_buf())))
    }

    fn from_snapshot(snapshot: Snapshot, snapshot_path: Option<PathBuf>) -> Self {
        let next_question_id = snapshot
            .next_question_id
            .max(1)
            .max(max_question_seq(snapshot.questions.values().flatten()) + 1);
        let next_response_id = snapshot
            .next_response_id
            .max(snapshot.responses.len() as i64 + 1);

        Self {
            forms: RwLock::new(snapshot.forms),
            questions: RwLock::new(snapshot.questions),
            responses: RwLock::new(snapshot.responses),
            next_question_id: AtomicI64::new(next_question_id),
            next_response_id: AtomicI64::new(next_response_id),
            snapshot_path,
        }
    }

    pub async fn insert_form(&self, form: Form, questions: Vec<Question>) {
        self.next_question_id
            .fetch_max(max_question_seq(&questions) + 1, Ordering::SeqCst);
        self.questions.write().await.insert(form.id.clone(), questions);
        self.forms.write().await.insert(form.id.clone(), form);
        self.persist_logged("insert_form").await;
    }

    async fn snapshot(&self) -> Snapshot {
        Snapshot {
            forms: self.forms.read().await.clone(),
            questions: self.questions.read().await.clone(),
            responses: self.responses.read().await.clone(),
            next_question_id: self.next_question_id.load(Ordering::SeqCst),
            next_response_id: self.next_response_id.load(Ordering::SeqCst),
        }
    }

    pub async fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path.as_ref() else {
            return Ok(());
        };
        let serialized = serde_json::to_vec_pretty(&self.snapshot().await)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serialized).await?;
        Ok(())
    }

    async fn persist_logged(&self, operation: &str) {
        if let Err(err) = self.persist().await {
            warn!("failed to persist data file after {}: {}", operation, err);
        }
    }

    async fn sorted_questions(&self, form_id: &str) -> ApiResult<Vec<Question>> {
        let mut questions = self
            .questions
            .read()
            .await
            .get(form_id)
            .cloned()
            .ok_or_else(not_found)?;
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }

    async fn create(&self, form_id: &str, body: &QuestionCreate) -> ApiResult<Question> {
        if !self.forms.read().await.contains_key(form_id) {
            return Err(not_found());
        }
        let now = Utc::now();
        let id = self.next_question_id.fetch_add(1, Ordering::SeqCst);
        let created = {
            let mut all = self.questions.write().await;
            let list = all.entry(form_id.to_string()).or_default();
            let question = Question {
                id: QuestionId::persisted(format!("q{id}")),
                form_id: form_id.to_string(),
                title: body.title.clone(),
                description: body.description.clone(),
                question_type: body.question_type,
                is_required: body.is_required,
                order: body.order.unwrap_or(list.len()),
                options: body.options.clone(),
                min_length: body.min_length,
                max_length: body.max_length,
                min_value: body.min_value,
                max_value: body.max_value,
                created_at: Some(now),
                updated_at: Some(now),
            };
            list.push(question.clone());
            question
        };
        self.persist_logged("create_question").await;
        Ok(created)
    }

    async fn update(&self, form_id: &str, question_id: &str, body: &QuestionUpdate) -> ApiResult<Question> {
        let updated = {
            let mut all = self.questions.write().await;
            let question = all
                .get_mut(form_id)
                .and_then(|list| {
                    list.iter_mut()
                        .find(|q| q.id.as_persisted() == Some(question_id))
                })
                .ok_or_else(not_found)?;
            if let Some(title) = &body.title {
                question.title = title.clone();
            }
            if body.description.is_some() {
                question.description = body.description.clone();
            }
            if let Some(required) = body.is_required {
                question.is_required = required;
            }
            if let Some(order) = body.order {
                question.order = order;
            }
            if body.options.is_some() {
                question.options = body.options.clone();
            }
            question.min_length = body.min_length.or(question.min_length);
            question.max_length = body.max_length.or(question.max_length);
            question.min_value = body.min_value.or(question.min_value);
            question.max_value = body.max_value.or(question.max_value);
            question.updated_at = Some(Utc::now());
            question.clone()
        };
        self.persist_logged("update_question").await;
        Ok(updated)
    }

    async fn delete(&self, form_id: &str, question_id: &str) -> ApiResult<()> {
        {
            let mut all = self.questions.write().await;
            let list = all.get_mut(form_id).ok_or_else(not_found)?;
            let before = list.len();
            list.retain(|q| q.id.as_persisted() != Some(question_id));
            if list.len() == before {
                return Err(not_found());
            }
            normalize_order(list);
        }
        self.persist_logged("delete_question").await;
        Ok(())
    }

    async fn reorder(&self, form_id: &str, orders: &[QuestionOrder]) -> ApiResult<()> {
        {
            let mut all = self.questions.write().await;
            let list = all.get_mut(form_id).ok_or_else(not_found)?;
            if let Some(unknown) = orders
                .iter()
                .find(|o| !list.iter().any(|q| q.id.as_persisted() == Some(o.question_id.as_str())))
            {
                return Err(rejected(
                    400,
                    json!(format!("Question inconnue: {}", unknown.question_id)),
                ));
            }
            for entry in orders {
                if let Some(question) = list
                    .iter_mut()
                    .find(|q| q.id.as_persisted() == Some(entry.question_id.as_str()))
                {
                    question.order = entry.order;
                }
            }
            list.sort_by_key(|q| q.order);
        }
        self.persist_logged("reorder_questions").await;
        Ok(())
    }

    async fn submit(&self, form_id: &str, body: &FormResponseCreate) -> ApiResult<FormResponseDetail> {
        let form = self
            .forms
            .read()
            .await
            .get(form_id)
            .cloned()
            .ok_or_else(not_found)?;
        if !form.can_accept_responses() {
            return Err(rejected(
                400,
                json!("Ce formulaire n'accepte plus de réponses"),
            ));
        }

        let questions = self.sorted_questions(form_id).await?;
        let mut problems = Vec::new();
        for question in &questions {
            let key = question.id.to_string();
            let value = body
                .answers
                .iter()
                .find(|a| a.question_id == key)
                .map(|a| a.value.clone().normalize(question.question_type))
                .unwrap_or_default();
            if let Some(msg) = validate_answer(question, &value) {
                problems.push(json!({"loc": ["body", "answers", key], "msg": msg}));
            }
        }
        for answer in &body.answers {
            if !questions.iter().any(|q| q.id.to_string() == answer.question_id) {
                problems.push(json!({
                    "loc": ["body", "answers", answer.question_id],
                    "msg": "Question inconnue"
                }));
            }
        }
        if !problems.is_empty() {
            return Err(rejected(422, serde_json::Value::Array(problems)));
        }

        let seq = self.next_response_id.fetch_add(1, Ordering::SeqCst);
        let response_id = format!("r{seq}");
        let now = Utc::now();
        let detail = FormResponseDetail {
            id: response_id.clone(),
            form_id: form_id.to_string(),
            respondent_id: None,
            submitted_at: now,
            is_complete: true,
            is_valid: true,
            ip_address: None,
            user_agent: None,
            answers: body
                .answers
                .iter()
                .enumerate()
                .map(|(i, a)| Answer {
                    id: format!("{response_id}-a{}", i + 1),
                    question_id: a.question_id.clone(),
                    form_response_id: Some(response_id.clone()),
                    value: a.value.clone(),
                    created_at: Some(now),
                })
                .collect(),
        };

        self.responses
            .write()
            .await
            .insert(response_id, detail.clone());
        if let Some(form) = self.forms.write().await.get_mut(form_id) {
            form.response_count += 1;
        }
        self.persist_logged("submit_response").await;
        Ok(detail)
    }

    async fn list_responses(&self, form_id: &str, skip: usize, limit: usize) -> ApiResult<Vec<FormResponseDetail>> {
        if !self.forms.read().await.contains_key(form_id) {
            return Err(not_found());
        }
        let mut responses: Vec<FormResponseDetail> = self
            .responses
            .read()
            .await
            .values()
            .filter(|r| r.form_id == form_id)
            .cloned()
            .collect();
        responses.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| b.id.cmp(&a.id)));
        Ok(responses.into_iter().skip(skip).take(limit).collect())
    }
}

impl FormsBackend for LocalBackend {
    fn fetch_form<'a>(&'a self, form_id: &'a str) -> BoxFuture<'a, ApiResult<FormWithQuestions>> {
        Box::pin(async move {
            let form = self
                .forms
                .read()
                .await
                .get(form_id)
                .cloned()
                .ok_or_else(not_found)?;
            let questions = self.sorted_questions(form_id).await.unwrap_or_default();
            Ok(FormWithQuestions { form, questions })
        })
    }

    fn fetch_questions<'a>(&'a self, form_id: &'a str) -> BoxFuture<'a, ApiResult<Vec<Question>>> {
        Box::pin(self.sorted_questions(form_id))
    }

    fn create_question<'a>(
        &'a self,
        form_id: &'a str,
        question: &'a QuestionCreate,
    ) -> BoxFuture<'a, ApiResult<Question>> {
        Box::pin(self.create(form_id, question))
    }

    fn update_question<'a>(
        &'a self,
        form_id: &'a str,
        question_id: &'a str,
        update: &'a QuestionUpdate,
    ) -> BoxFuture<'a, ApiResult<Question>> {
        Box::pin(self.update(form_id, question_id, update))
    }

    fn delete_question<'a>(
        &'a self,
        form_id: &'a str,
        question_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(self.delete(form_id, question_id))
    }

    fn reorder_questions<'a>(
        &'a self,
        form_id: &'a str,
        orders: &'a [QuestionOrder],
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(self.reorder(form_id, orders))
    }

    fn submit_response<'a>(
        &'a self,
        form_id: &'a str,
        submission: &'a FormResponseCreate,
    ) -> BoxFuture<'a, ApiResult<FormResponseDetail>> {
        Box::pin(self.submit(form_id, submission))
    }

    fn fetch_responses<'a>(
        &'a self,
        form_id: &'a str,
        skip: usize,
        limit: usize,
    ) -> BoxFuture<'a, ApiResult<Vec<FormResponseDetail>>> {
        Box::pin(self.list_responses(form_id, skip, limit))
    }

    fn fetch_response<'a>(
        &'a self,
        response_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<FormResponseDetail>> {
        Box::pin(async move {
            self.responses
                .read()
                .await
                .get(response_id)
                .cloned()
                .ok_or_else(not_found)
        })
    }
}
