use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use rowgate_core::credentials::{self, Identity};
use rowgate_core::params::{string_param, ParamBag};

use crate::collect::collect;
use crate::error::ErrorKind;
use crate::routes::dispatch::render;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST <login path> — local credential issuance: look up the login-purpose
/// descriptor, fetch the stored digest and salt for the login name, verify,
/// and mint a session token.
pub async fn login(State(app): State<AppState>, req: Request) -> Response {
    let bag = collect(req).await;
    match login_flow(&app, bag).await {
        Ok(ok) => ok.into_response(),
        Err(kind) => app.error(kind).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Flow — shared with the catch-all short-circuit
// ---------------------------------------------------------------------------

pub(crate) async fn login_flow(app: &AppState, bag: ParamBag) -> Result<Json<Value>, ErrorKind> {
    let login_name = string_param(&bag, "loginName")
        .ok_or_else(missing_credentials)?
        .to_string();
    let password = string_param(&bag, "password")
        .ok_or_else(missing_credentials)?
        .to_string();

    let descriptor = app
        .lookup(&app.config.login_action, "POST")
        .await
        .ok_or(ErrorKind::NotFound)?;
    let sql = render(&descriptor.template, &bag)?;
    let rows = app.fetch(&sql).await?;

    let Some(row) = rows.first() else {
        return Err(invalid_credentials());
    };
    let stored = row.get(credentials::PASSWORD_COLUMN).and_then(Value::as_str);
    let salt = row.get(credentials::SALT_COLUMN).and_then(Value::as_str);
    let (Some(stored), Some(salt)) = (stored, salt) else {
        return Err(invalid_credentials());
    };

    if !credentials::verify_password(&login_name, &password, stored, salt) {
        tracing::debug!(%login_name, "password verification failed");
        return Err(invalid_credentials());
    }

    let identity = Identity::from_row(row);
    let token = app
        .signer
        .issue(identity.user_id, &identity.user_name)
        .map_err(|e| ErrorKind::Internal(format!("token generation failed: {e}")))?;
    Ok(Json(json!({ "status": 0, "token": token, "data": rows })))
}

fn missing_credentials() -> ErrorKind {
    ErrorKind::BadRequest("loginName and password are required".to_string())
}

/// One message for every local-credential failure mode — callers cannot
/// distinguish an unknown login name from a wrong password.
fn invalid_credentials() -> ErrorKind {
    ErrorKind::Unauthorized {
        message: "invalid login name or password".to_string(),
        detail: None,
    }
}
