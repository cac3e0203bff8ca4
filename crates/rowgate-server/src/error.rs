use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rowgate_core::config::EnvelopeStyle;
use serde_json::json;

// ---------------------------------------------------------------------------
// ErrorKind — what went wrong, independent of envelope shape
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("no such action")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Unauthorized {
        message: String,
        detail: Option<String>,
    },

    #[error("unsupported authorization policy")]
    UnknownPolicy,

    #[error("template error: {0}")]
    Template(String),

    #[error("query execution failed")]
    Execution { detail: String },

    #[error("{message}")]
    Provider {
        status: StatusCode,
        message: String,
    },

    #[error("{0}")]
    Internal(String),
}

impl ErrorKind {
    fn parts(&self) -> (StatusCode, String, Option<String>) {
        match self {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "no such action".to_string(), None),
            ErrorKind::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone(), None),
            ErrorKind::Unauthorized { message, detail } => {
                (StatusCode::UNAUTHORIZED, message.clone(), detail.clone())
            }
            ErrorKind::UnknownPolicy => (
                StatusCode::FORBIDDEN,
                "unsupported authorization policy".to_string(),
                None,
            ),
            ErrorKind::Template(detail) => (StatusCode::OK, detail.clone(), None),
            ErrorKind::Execution { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "query execution failed".to_string(),
                Some(detail.clone()),
            ),
            ErrorKind::Provider { status, message } => (*status, message.clone(), None),
            ErrorKind::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone(), None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ApiError — envelope-aware response type
// ---------------------------------------------------------------------------

/// An error bound to the envelope style of the deployment. `Flag` keeps the
/// numeric `status` field at 1 with a `message`; `HttpCode` mirrors the HTTP
/// status into `status` with a `msg` key. Template errors are deliberately
/// not HTTP errors: they answer 200 with a nonzero status flag and the
/// detail under `data`, in both styles.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    style: EnvelopeStyle,
}

impl ApiError {
    pub fn new(kind: ErrorKind, style: EnvelopeStyle) -> Self {
        Self { kind, style }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ErrorKind::Template(detail) = &self.kind {
            let body = json!({ "status": 1, "data": detail });
            return (StatusCode::OK, axum::Json(body)).into_response();
        }

        let (status, message, detail) = self.kind.parts();
        let mut body = match self.style {
            EnvelopeStyle::Flag => json!({ "status": 1, "message": message }),
            EnvelopeStyle::HttpCode => json!({ "status": status.as_u16(), "msg": message }),
        };
        if let Some(detail) = detail {
            body["error"] = json!(detail);
        }
        (status, axum::Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
