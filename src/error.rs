use serde::Serialize;
use serde_json::Value;

use crate::events::NotificationLevel;
use crate::models::{QuestionId, ValidationIssue};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub field: String,
    pub issue: String,
}

/// User-facing category of a failed backend call.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    Network,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    RateLimited,
    Server,
    Unavailable,
    Decode,
    Other,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => ApiErrorKind::Network,
            400 => ApiErrorKind::BadRequest,
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            409 => ApiErrorKind::Conflict,
            422 => ApiErrorKind::Validation,
            429 => ApiErrorKind::RateLimited,
            502 | 503 => ApiErrorKind::Unavailable,
            500..=599 => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }
}

fn default_message(status: u16) -> String {
    match status {
        0 => "Impossible de contacter le serveur. Vérifiez votre connexion.".into(),
        400 => "Requête invalide. Vérifiez les données saisies.".into(),
        401 => "Session expirée. Veuillez vous reconnecter.".into(),
        403 => "Vous n'avez pas les permissions nécessaires.".into(),
        404 => "La ressource demandée est introuvable.".into(),
        409 => "Conflit de données. L'opération ne peut pas être effectuée.".into(),
        422 => "Erreur de validation".into(),
        429 => "Trop de requêtes. Veuillez patienter avant de réessayer.".into(),
        500 => "Erreur serveur. Nos équipes ont été notifiées.".into(),
        502 => "Service temporairement indisponible.".into(),
        503 => "Service en maintenance. Veuillez réessayer plus tard.".into(),
        other => format!("Erreur {other}"),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: u16,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::from_status(status),
            status,
            message: message.into(),
            details: Vec::new(),
            request_id: request_id.into(),
        }
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    /// The request never produced an HTTP response.
    pub fn network(request_id: impl Into<String>) -> Self {
        Self::new(0, default_message(0), request_id)
    }

    pub fn decode(err: impl std::fmt::Display, request_id: impl Into<String>) -> Self {
        let mut e = Self::new(0, format!("Réponse illisible du serveur: {err}"), request_id);
        e.kind = ApiErrorKind::Decode;
        e
    }

    /// Classifies an HTTP error status, preferring the server's `detail`.
    pub fn from_response(status: u16, body: Option<&Value>, request_id: impl Into<String>) -> Self {
        let detail = body.and_then(|b| b.get("detail"));
        let details = detail.map(validation_details).unwrap_or_default();

        let message = match detail {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ if status == 422 && !details.is_empty() => details
                .iter()
                .map(|d| format!("{}: {}", d.field, d.issue))
                .collect::<Vec<_>>()
                .join(", "),
            _ => default_message(status),
        };

        Self::new(status, message, request_id).with_details(details)
    }

    /// 401s end the session instead of raising a notification.
    pub fn should_notify(&self) -> bool {
        self.kind != ApiErrorKind::Unauthorized
    }

    pub fn notification_level(&self) -> NotificationLevel {
        match self.kind {
            ApiErrorKind::NotFound => NotificationLevel::Warning,
            _ => NotificationLevel::Error,
        }
    }

    pub fn notification_title(&self) -> Option<&'static str> {
        match self.kind {
            ApiErrorKind::Server | ApiErrorKind::Unavailable => Some("Erreur serveur"),
            ApiErrorKind::NotFound => Some("Introuvable"),
            ApiErrorKind::Network => Some("Connexion perdue"),
            _ => None,
        }
    }

    /// Transport failures and 5xx get the one-shot retry; 4xx never do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ApiErrorKind::Network | ApiErrorKind::Server | ApiErrorKind::Unavailable
        )
    }
}

/// FastAPI-style `detail` payloads: a list of `{loc, msg}` or a field map.
fn validation_details(detail: &Value) -> Vec<ErrorDetail> {
    match detail {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let field = item
                    .get("loc")
                    .and_then(|l| l.as_array())
                    .map(|parts| {
                        parts
                            .iter()
                            .map(|p| match p {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join(".")
                    })
                    .filter(|f| !f.is_empty())
                    .unwrap_or_else(|| "champ".to_string());
                let issue = item
                    .get("msg")
                    .or_else(|| item.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string();
                ErrorDetail { field, issue }
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(field, msg)| ErrorDetail {
                field: field.clone(),
                issue: msg.as_str().map(str::to_string).unwrap_or_else(|| msg.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Local precondition failures in the form builder.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("question not found: {0}")]
    QuestionNotFound(QuestionId),
    #[error("index {index} out of range for {len} questions")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("form has not been saved yet")]
    FormNotSaved,
    #[error("question definition is invalid")]
    Invalid(Vec<ValidationIssue>),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("question {0} is not part of this form")]
    UnknownQuestion(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("form does not accept responses")]
    FormClosed,
    #[error("a submission is already in progress")]
    AlreadySubmitting,
    #[error("{} answer(s) are invalid", .0.len())]
    Invalid(Vec<ValidationIssue>),
    #[error(transparent)]
    Api(#[from] ApiError),
}
