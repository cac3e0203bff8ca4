use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use rowgate_core::config::MissingActionPolicy;
use rowgate_core::descriptor::{ActionDescriptor, AuthPolicy};
use rowgate_core::params::ParamBag;
use rowgate_core::session::Claims;
use rowgate_core::template::Template;

use crate::collect::collect;
use crate::error::ErrorKind;
use crate::routes::{connect, login};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// ANY <api pattern> — the generic pipeline: collect parameters, apply the
/// authorization gate, look up the action descriptor, render its template,
/// execute, normalize, respond.
pub async fn dispatch(
    State(app): State<AppState>,
    Path(action): Path<String>,
    req: Request,
) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    let method = req.method().as_str().to_string();
    let headers = req.headers().clone();
    let query_token = query_param(req.uri().query(), "token");
    let bag = collect(req).await;
    tracing::debug!(%action, %method, params = bag.len(), "dispatch");

    match run(&app, &action, &method, &headers, query_token, bag).await {
        Ok(response) => response,
        Err(kind) => app.error(kind).into_response(),
    }
}

async fn run(
    app: &AppState,
    action: &str,
    method: &str,
    headers: &HeaderMap,
    query_token: Option<String>,
    mut bag: ParamBag,
) -> Result<Response, ErrorKind> {
    // Reserved provider actions short-circuit the generic pipeline — the
    // credential providers run their own checks.
    if method == "GET" && action == app.config.signature_action {
        return connect::signed_request(app, &bag)
            .await
            .map(IntoResponse::into_response);
    }
    if method == "POST" && action == app.config.login_action {
        return login::login_flow(app, bag)
            .await
            .map(IntoResponse::into_response);
    }
    if method == "POST" && action == app.config.connect_action {
        return connect::connect_flow(app, bag)
            .await
            .map(IntoResponse::into_response);
    }

    let descriptor = match app.lookup(action, method).await {
        Some(descriptor) => descriptor,
        None => match app.config.missing_action {
            MissingActionPolicy::Reject => return Err(ErrorKind::NotFound),
            // Permissive deployments treat an unregistered action as an
            // anonymous empty template.
            MissingActionPolicy::Permissive => ActionDescriptor::new("", None),
        },
    };

    match descriptor.policy() {
        AuthPolicy::Anonymous => {}
        AuthPolicy::Required => {
            let claims = authorize(app, headers, query_token.as_deref())?;
            enrich(&mut bag, &claims);
        }
        AuthPolicy::Unknown(flag) => {
            tracing::warn!(action, flag, "descriptor carries an unrecognized auth flag");
            return Err(ErrorKind::UnknownPolicy);
        }
    }

    let sql = render(&descriptor.template, &bag)?;
    tracing::debug!(%sql, "rendered query");
    let rows = app.fetch(&sql).await?;
    Ok(Json(json!({ "status": 0, "data": rows })).into_response())
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Resolve and verify the bearer token, from the `Authorization` header or
/// the `token` query fallback.
pub(crate) fn authorize(
    app: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<Claims, ErrorKind> {
    let Some(raw) = bearer_candidate(headers, query_token) else {
        return Err(ErrorKind::Unauthorized {
            message: "authorization token required".to_string(),
            detail: None,
        });
    };
    let token = raw.strip_prefix("Bearer ").unwrap_or(&raw);
    app.signer
        .verify(token)
        .map_err(|e| ErrorKind::Unauthorized {
            message: "invalid authorization token".to_string(),
            detail: Some(e.to_string()),
        })
}

fn bearer_candidate(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .or_else(|| {
            query_token
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        })
}

/// Make the verified identity available to the template.
pub(crate) fn enrich(bag: &mut ParamBag, claims: &Claims) {
    bag.insert("userID".to_string(), json!(claims.user_id));
    bag.insert("userName".to_string(), json!(claims.user_name));
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn render(template: &str, bag: &ParamBag) -> Result<String, ErrorKind> {
    let parsed = Template::parse(template).map_err(|e| ErrorKind::Template(e.to_string()))?;
    parsed
        .render(bag)
        .map_err(|e| ErrorKind::Template(e.to_string()))
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?.split('&').find_map(|piece| {
        let (k, v) = piece.split_once('=')?;
        (k == key).then(|| {
            urlencoding::decode(v)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| v.to_string())
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_finds_token() {
        assert_eq!(
            query_param(Some("a=1&token=abc"), "token"),
            Some("abc".to_string())
        );
        assert_eq!(query_param(Some("a=1"), "token"), None);
        assert_eq!(query_param(None, "token"), None);
    }

    #[test]
    fn query_param_decodes_value() {
        assert_eq!(
            query_param(Some("token=a%3Db"), "token"),
            Some("a=b".to_string())
        );
    }

    #[test]
    fn bearer_candidate_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(
            bearer_candidate(&headers, Some("query-token")),
            Some("Bearer abc".to_string())
        );
    }

    #[test]
    fn bearer_candidate_falls_back_to_query() {
        let headers = HeaderMap::new();
        assert_eq!(
            bearer_candidate(&headers, Some("query-token")),
            Some("query-token".to_string())
        );
        assert_eq!(bearer_candidate(&headers, None), None);
        assert_eq!(bearer_candidate(&headers, Some("  ")), None);
    }

    #[test]
    fn enrich_injects_identity_keys() {
        let mut bag = ParamBag::new();
        let claims = Claims {
            user_id: 7,
            user_name: "ada".to_string(),
            iss: "rowgate".to_string(),
            iat: 0,
            exp: 0,
        };
        enrich(&mut bag, &claims);
        assert_eq!(bag["userID"], json!(7));
        assert_eq!(bag["userName"], json!("ada"));
    }

    #[test]
    fn render_maps_template_failures() {
        let bag = ParamBag::new();
        assert!(matches!(
            render("SELECT {{.x", &bag).unwrap_err(),
            ErrorKind::Template(_)
        ));
        assert!(matches!(
            render("SELECT {{.missing}}", &bag).unwrap_err(),
            ErrorKind::Template(_)
        ));
    }
}
