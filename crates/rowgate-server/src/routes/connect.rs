use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use rowgate_core::credentials::Identity;
use rowgate_core::params::{string_param, ParamBag};
use rowgate_core::signature;
use rowgate_core::template::substitute_identity;

use crate::collect::collect;
use crate::error::ErrorKind;
use crate::routes::dispatch::render;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST <connect path> — third-party credential issuance: exchange the
/// authorization code for an external identity, look up the bound account,
/// and mint a session token (or report the identity as not yet bound).
pub async fn connect_login(State(app): State<AppState>, req: Request) -> Response {
    let bag = collect(req).await;
    match connect_flow(&app, bag).await {
        Ok(ok) => ok.into_response(),
        Err(kind) => app.error(kind).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Flow — shared with the catch-all short-circuit
// ---------------------------------------------------------------------------

pub(crate) async fn connect_flow(
    app: &AppState,
    mut bag: ParamBag,
) -> Result<Json<Value>, ErrorKind> {
    let code = string_param(&bag, "code")
        .ok_or_else(|| ErrorKind::BadRequest("missing authorization code".to_string()))?
        .to_string();

    let identity = app.connect.exchange_code(&code).await.map_err(|e| {
        ErrorKind::Provider {
            status: StatusCode::UNAUTHORIZED,
            message: e.to_string(),
        }
    })?;
    bag.insert("openid".to_string(), json!(identity.open_id));

    let descriptor = app
        .lookup(&app.config.connect_action, "POST")
        .await
        .ok_or(ErrorKind::NotFound)?;

    // With `openid` in the bag the bound-user template renders outright.
    // Descriptors that defeat the render pass carry the raw template text
    // forward into the plain-text identity substitution; the substituted
    // text is executed only when the substitution actually changed it.
    let (sql, rows) = match render(&descriptor.template, &bag) {
        Ok(rendered) => {
            let rows = app.fetch(&rendered).await?;
            (rendered, rows)
        }
        Err(_) => (descriptor.template.clone(), Vec::new()),
    };
    let patched = substitute_identity(&sql, &identity.open_id);
    let rows = if patched != sql {
        app.fetch(&patched).await?
    } else {
        rows
    };

    if rows.is_empty() {
        // Valid external identity with no bound account — a distinct
        // outcome the client follows up with a registration step.
        return Ok(Json(json!({
            "status": 2,
            "openid": identity.open_id,
            "message": "account not linked",
        })));
    }

    let who = Identity::from_row(&rows[0]);
    let token = app
        .signer
        .issue(who.user_id, &who.user_name)
        .map_err(|e| ErrorKind::Internal(format!("token generation failed: {e}")))?;
    Ok(Json(json!({
        "status": 0,
        "token": token,
        "openid": identity.open_id,
        "data": rows,
    })))
}

// ---------------------------------------------------------------------------
// Signed request
// ---------------------------------------------------------------------------

/// GET <signature action> — per-page signed request descriptor for the
/// client-side embedding SDK: cached server ticket, fresh nonce, current
/// timestamp, SHA-1 over the ordered field set.
pub(crate) async fn signed_request(
    app: &AppState,
    bag: &ParamBag,
) -> Result<Json<Value>, ErrorKind> {
    let url = string_param(bag, "url")
        .ok_or_else(|| ErrorKind::BadRequest("missing url parameter".to_string()))?;

    let ticket = app.connect.page_ticket().await.map_err(|e| {
        ErrorKind::Provider {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    })?;

    let nonce_str = signature::nonce(16);
    let timestamp = chrono::Utc::now().timestamp();
    let signed = signature::page_signature(&ticket, &nonce_str, timestamp, url);
    Ok(Json(json!({
        "status": 0,
        "appId": app.config.connect.app_id,
        "timestamp": timestamp,
        "nonceStr": nonce_str,
        "signature": signed,
    })))
}
