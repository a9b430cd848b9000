//! Access to the forms REST backend.
//!
//! [`FormsBackend`] is the seam the builder, answer session and CLI talk to.
//! [`HttpBackend`] is the reqwest implementation; `LocalBackend` in
//! `crate::local` serves the same calls from a JSON data file.

use futures::future::BoxFuture;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{AuthToken, LoginCredentials, SessionGuard};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::models::{
    FormResponseCreate, FormResponseDetail, FormWithQuestions, Question, QuestionCreate,
    QuestionOrder, QuestionUpdate,
};

pub type ApiResult<T> = Result<T, ApiError>;

/// Endpoints that never carry the bearer token.
const AUTH_PATHS: [&str; 3] = ["/auth/login", "/auth/register", "/auth/refresh"];

pub trait FormsBackend: Send + Sync {
    fn fetch_form<'a>(&'a self, form_id: &'a str) -> BoxFuture<'a, ApiResult<FormWithQuestions>>;

    fn fetch_questions<'a>(&'a self, form_id: &'a str) -> BoxFuture<'a, ApiResult<Vec<Question>>>;

    fn create_question<'a>(
        &'a self,
        form_id: &'a str,
        question: &'a QuestionCreate,
    ) -> BoxFuture<'a, ApiResult<Question>>;

    fn update_question<'a>(
        &'a self,
        form_id: &'a str,
        question_id: &'a str,
        update: &'a QuestionUpdate,
    ) -> BoxFuture<'a, ApiResult<Question>>;

    fn delete_question<'a>(
        &'a self,
        form_id: &'a str,
        question_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>>;

    fn reorder_questions<'a>(
        &'a self,
        form_id: &'a str,
        orders: &'a [QuestionOrder],
    ) -> BoxFuture<'a, ApiResult<()>>;

    fn submit_response<'a>(
        &'a self,
        form_id: &'a str,
        submission: &'a FormResponseCreate,
    ) -> BoxFuture<'a, ApiResult<FormResponseDetail>>;

    fn fetch_responses<'a>(
        &'a self,
        form_id: &'a str,
        skip: usize,
        limit: usize,
    ) -> BoxFuture<'a, ApiResult<Vec<FormResponseDetail>>>;

    fn fetch_response<'a>(&'a self, response_id: &'a str)
        -> BoxFuture<'a, ApiResult<FormResponseDetail>>;
}

/// `(skip, limit)` for a 1-based page.
pub fn pagination(page: usize, page_size: usize) -> (usize, usize) {
    (page.saturating_sub(1) * page_size, page_size)
}

/// Pages through every stored response of a form.
pub async fn fetch_all_responses(
    backend: &dyn FormsBackend,
    form_id: &str,
    page_size: usize,
) -> ApiResult<Vec<FormResponseDetail>> {
    let page_size = page_size.max(1);
    let mut all = Vec::new();
    let mut page = 1;
    loop {
        let (skip, limit) = pagination(page, page_size);
        let batch = backend.fetch_responses(form_id, skip, limit).await?;
        let done = batch.len() < limit;
        all.extend(batch);
        if done {
            return Ok(all);
        }
        page += 1;
    }
}

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: ClientConfig,
    session: SessionGuard,
}

impl HttpBackend {
    pub fn new(config: ClientConfig, session: SessionGuard) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<AuthToken> {
        let token: AuthToken = self
            .request(Method::POST, "/auth/login", Some(credentials), &[])
            .await?;
        self.session.login(&token).await;
        Ok(token)
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        query: &[(&str, String)],
    ) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ApiError::decode(e, request_id.clone()))?;
        let token = if AUTH_PATHS.iter().any(|p| path.contains(p)) {
            None
        } else {
            self.session.tokens().token().await
        };
        let url = self.config.endpoint(path);

        let mut attempt = 0;
        loop {
            let result = self
                .send_once(&method, &url, body.as_ref(), query, token.as_deref(), &request_id)
                .await;
            match result {
                Ok(raw) => {
                    return serde_json::from_value(raw)
                        .map_err(|e| ApiError::decode(e, request_id.clone()))
                }
                Err(err) if attempt < self.config.retry && err.is_retryable() => {
                    attempt += 1;
                    warn!(
                        "{} {} failed ({}), retrying [{}]",
                        method, path, err.status, request_id
                    );
                }
                Err(err) => {
                    // Anonymous 401s (public forms) leave the session alone.
                    if err.status == StatusCode::UNAUTHORIZED.as_u16() && token.is_some() {
                        self.session
                            .terminate(None, Some(request_id.clone()))
                            .await;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
        token: Option<&str>,
        request_id: &str,
    ) -> ApiResult<Value> {
        let mut req = self
            .client
            .request(method.clone(), url)
            .header("x-request-id", request_id);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            debug!("transport error for {}: {}", url, e);
            ApiError::network(request_id)
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body: Option<Value> = resp.json().await.ok();
            return Err(ApiError::from_response(status.as_u16(), body.as_ref(), request_id));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|_| ApiError::network(request_id))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(e, request_id))
    }
}

impl FormsBackend for HttpBackend {
    fn fetch_form<'a>(&'a self, form_id: &'a str) -> BoxFuture<'a, ApiResult<FormWithQuestions>> {
        Box::pin(async move {
            self.request::<_, ()>(Method::GET, &format!("/forms/{form_id}"), None, &[])
                .await
        })
    }

    fn fetch_questions<'a>(&'a self, form_id: &'a str) -> BoxFuture<'a, ApiResult<Vec<Question>>> {
        Box::pin(async move {
            self.request::<_, ()>(Method::GET, &format!("/forms/{form_id}/questions"), None, &[])
                .await
        })
    }

    fn create_question<'a>(
        &'a self,
        form_id: &'a str,
        question: &'a QuestionCreate,
    ) -> BoxFuture<'a, ApiResult<Question>> {
        Box::pin(async move {
            self.request(
                Method::POST,
                &format!("/forms/{form_id}/questions"),
                Some(question),
                &[],
            )
            .await
        })
    }

    fn update_question<'a>(
        &'a self,
        form_id: &'a str,
        question_id: &'a str,
        update: &'a QuestionUpdate,
    ) -> BoxFuture<'a, ApiResult<Question>> {
        Box::pin(async move {
            self.request(
                Method::PATCH,
                &format!("/forms/{form_id}/questions/{question_id}"),
                Some(update),
                &[],
            )
            .await
        })
    }

    fn delete_question<'a>(
        &'a self,
        form_id: &'a str,
        question_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.request::<Value, ()>(
                Method::DELETE,
                &format!("/forms/{form_id}/questions/{question_id}"),
                None,
                &[],
            )
            .await
            .map(|_| ())
        })
    }

    fn reorder_questions<'a>(
        &'a self,
        form_id: &'a str,
        orders: &'a [QuestionOrder],
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            self.request::<Value, _>(
                Method::POST,
                &format!("/forms/{form_id}/questions/reorder"),
                Some(orders),
                &[],
            )
            .await
            .map(|_| ())
        })
    }

    fn submit_response<'a>(
        &'a self,
        form_id: &'a str,
        submission: &'a FormResponseCreate,
    ) -> BoxFuture<'a, ApiResult<FormResponseDetail>> {
        Box::pin(async move {
            self.request(
                Method::POST,
                &format!("/forms/{form_id}/submit"),
                Some(submission),
                &[],
            )
            .await
        })
    }

    fn fetch_responses<'a>(
        &'a self,
        form_id: &'a str,
        skip: usize,
        limit: usize,
    ) -> BoxFuture<'a, ApiResult<Vec<FormResponseDetail>>> {
        Box::pin(async move {
            let query = [("skip", skip.to_string()), ("limit", limit.to_string())];
            self.request::<_, ()>(
                Method::GET,
                &format!("/forms/{form_id}/responses"),
                None,
                &query,
            )
            .await
        })
    }

    fn fetch_response<'a>(
        &'a self,
        response_id: &'a str,
    ) -> BoxFuture<'a, ApiResult<FormResponseDetail>> {
        Box::pin(async move {
            self.request::<_, ()>(Method::GET, &format!("/responses/{response_id}"), None, &[])
                .await
        })
    }
}
