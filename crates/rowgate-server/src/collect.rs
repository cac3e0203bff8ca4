use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::{header, Method};
use serde_json::{Map, Value};

use rowgate_core::params::{insert_first, ParamBag};

/// Upper bound on buffered request bodies.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Extract the flat parameter bag from a request.
///
/// The JSON body (for methods that carry one) lands first, then query-string
/// pairs, then form fields — so form overrides query overrides body. A body
/// that fails to parse as a JSON object is logged and contributes nothing.
/// Values are URL-decoded best-effort; a failed decode keeps what it had.
/// No escaping or type coercion happens here.
pub async fn collect(req: Request) -> ParamBag {
    let (parts, body) = req.into_parts();
    let mut bag = ParamBag::new();

    let has_body = parts.method != Method::GET && parts.method != Method::DELETE;
    let bytes = if has_body {
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(error = %e, "failed to read request body");
                Default::default()
            }
        }
    } else {
        Default::default()
    };

    if !bytes.is_empty() {
        match serde_json::from_slice::<Map<String, Value>>(&bytes) {
            Ok(map) => bag.extend(map),
            Err(e) => tracing::debug!(error = %e, "request body is not a JSON object"),
        }
    }

    let mut pairs = ParamBag::new();
    if let Some(query) = parts.uri.query() {
        parse_pairs(&mut pairs, query);
    }

    let is_form = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            let mut form = ParamBag::new();
            parse_pairs(&mut form, text);
            for (key, value) in form {
                pairs.insert(key, value);
            }
        }
    }

    for (key, value) in pairs {
        bag.insert(key, value);
    }
    bag
}

// ---------------------------------------------------------------------------
// Pair parsing
// ---------------------------------------------------------------------------

fn parse_pairs(into: &mut ParamBag, raw: &str) {
    for piece in raw.split('&') {
        if piece.is_empty() {
            continue;
        }
        let (key, value) = piece.split_once('=').unwrap_or((piece, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        // Second pass covers double-encoded values; failure keeps the
        // single-decoded form.
        let value = match urlencoding::decode(&value) {
            Ok(v) => v.into_owned(),
            Err(_) => value,
        };
        insert_first(into, &key, Value::String(value));
    }
}

/// One best-effort decode: `+` as space, percent sequences where valid.
fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(v) => v.into_owned(),
        Err(_) => plus_decoded,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
