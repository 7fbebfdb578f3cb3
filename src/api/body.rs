use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{Method, header::CONTENT_TYPE},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};
use tracing::debug;

use super::context::ParsedBody;
use super::response::RenderOptions;
use super::{ApiError, AppState};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Buffers POST/PUT/PATCH bodies and attaches the result as a [`ParsedBody`].
pub async fn parse_body(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    if !has_body(&parts.method) {
        parts.extensions.insert(ParsedBody::default());
        return next.run(Request::from_parts(parts, body)).await;
    }

    let limit = state.config().server.max_body_bytes;
    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, limit, "Rejected request body");
            let err = ApiError::bad_request(format!(
                "Request body could not be read (limit is {limit} bytes)"
            ));
            return state
                .renderer
                .render_error(&RenderOptions::from_uri(&parts.uri), &err);
        }
    };

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let parsed = parse_request_body(
        &parts.method,
        content_type.as_deref(),
        &bytes,
        state.config().api.parse_json_body,
    );

    parts.extensions.insert(parsed);
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn has_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// JSON first (when enabled); a non-empty urlencoded POST form replaces it.
#[must_use]
pub fn parse_request_body(
    method: &Method,
    content_type: Option<&str>,
    bytes: &[u8],
    parse_json: bool,
) -> ParsedBody {
    if !has_body(method) {
        return ParsedBody::default();
    }

    let mut data = None;

    if parse_json && !bytes.is_empty() {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => data = Some(value),
            Err(e) => debug!(error = %e, "Request body is not JSON"),
        }
    }

    if *method == Method::POST && is_form(content_type) {
        let form: Map<String, Value> = url::form_urlencoded::parse(bytes)
            .into_owned()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();

        if !form.is_empty() {
            data = Some(Value::Object(form));
        }
    }

    ParsedBody(data)
}

fn is_form(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        let parsed = parse_request_body(&Method::PUT, Some("application/json"), br#"{"a": [1, 2]}"#, true);
        assert_eq!(parsed.0, Some(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_malformed_json_is_absent() {
        let parsed = parse_request_body(&Method::PATCH, None, b"{not json", true);
        assert_eq!(parsed.0, None);
    }

    #[test]
    fn test_json_parsing_can_be_disabled() {
        let parsed = parse_request_body(&Method::PUT, None, br#"{"a": 1}"#, false);
        assert_eq!(parsed.0, None);
    }

    #[test]
    fn test_post_form_overrides_json_and_last_value_wins() {
        let parsed = parse_request_body(
            &Method::POST,
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            b"name=first&name=second&city=Helsinki",
            true,
        );
        assert_eq!(parsed.0, Some(json!({"name": "second", "city": "Helsinki"})));
    }

    #[test]
    fn test_form_only_applies_to_post() {
        let parsed = parse_request_body(&Method::PUT, Some(FORM_CONTENT_TYPE), b"name=x", true);
        assert_eq!(parsed.0, None);
    }

    #[test]
    fn test_get_has_no_body() {
        let parsed = parse_request_body(&Method::GET, Some("application/json"), b"{}", true);
        assert_eq!(parsed.0, None);
    }
}
