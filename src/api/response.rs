//! JSON / JSONP response construction.
//!
//! Handlers produce a [`Reply`] (status, JSON body, extra headers). The
//! [`Renderer`] turns it into an HTTP response according to the request's
//! [`RenderOptions`]: JSONP wrapping, pretty printing and the Basic auth
//! challenge on 401.

use std::convert::Infallible;
use std::sync::OnceLock;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode, Uri,
        header::{CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use super::ApiError;
use crate::config::ApiConfig;

const JSON_CONTENT_TYPE: &str = "application/json";
const JSONP_CONTENT_TYPE: &str = "application/javascript";

/// A status code, an optional JSON body and extra headers, not yet serialized.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl Reply {
    #[must_use]
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_status<T: Serialize + ?Sized>(status: StatusCode, data: &T) -> Result<Self, ApiError> {
        Ok(Self::new(status, Some(serde_json::to_value(data)?)))
    }

    /// 200 with `data` as the body.
    pub fn ok<T: Serialize + ?Sized>(data: &T) -> Result<Self, ApiError> {
        Self::with_status(StatusCode::OK, data)
    }

    /// 201 with `data` as the body and a `Location` header.
    pub fn created<T: Serialize + ?Sized>(data: &T, location: &str) -> Result<Self, ApiError> {
        let location = HeaderValue::from_str(location)
            .map_err(|e| ApiError::internal(format!("Invalid Location header: {e}")))?;
        Ok(Self::with_status(StatusCode::CREATED, data)?.header(LOCATION, location))
    }

    /// 204 without a body.
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, None)
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Per-request rendering switches read from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// JSONP callback; only set when the name passed validation.
    pub callback: Option<String>,
    pub prettify: bool,
    pub disable_basic_auth: bool,
}

impl RenderOptions {
    #[must_use]
    pub fn from_query(query: Option<&str>) -> Self {
        let mut options = Self::default();

        let Some(query) = query else {
            return options;
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "callback" => {
                    options.callback = is_valid_callback(&value).then(|| value.into_owned());
                }
                "prettify" => options.prettify = !value.is_empty(),
                "disable_basic_auth" => options.disable_basic_auth = !value.is_empty(),
                _ => {}
            }
        }

        options
    }

    #[must_use]
    pub fn from_uri(uri: &Uri) -> Self {
        Self::from_query(uri.query())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RenderOptions {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_uri(&parts.uri))
    }
}

/// A callback name must start with a letter and contain only word characters and dots.
#[must_use]
pub fn is_valid_callback(name: &str) -> bool {
    static CALLBACK_RE: OnceLock<Regex> = OnceLock::new();
    let re = CALLBACK_RE.get_or_init(|| Regex::new(r"^[a-zA-Z][\w.]*$").expect("Invalid regex"));
    re.is_match(name)
}

#[derive(Debug, Clone)]
pub struct Renderer {
    challenge: Option<HeaderValue>,
    debug: bool,
}

impl Renderer {
    #[must_use]
    pub fn new(api: &ApiConfig) -> Self {
        Self {
            challenge: HeaderValue::from_str(&api.basic_auth_challenge()).ok(),
            debug: api.debug,
        }
    }

    pub fn render(&self, options: &RenderOptions, reply: Reply) -> Response {
        let Reply {
            status,
            body,
            mut headers,
        } = reply;

        if status == StatusCode::UNAUTHORIZED
            && !options.disable_basic_auth
            && let Some(challenge) = &self.challenge
        {
            headers.insert(WWW_AUTHENTICATE, challenge.clone());
        }

        let pretty = self.debug || options.prettify;

        let mut response = match (&options.callback, body) {
            (Some(callback), body) => {
                // Script tags cannot see the status, so it travels in the payload.
                let wrapped = json!({
                    "data": body.unwrap_or(Value::Null),
                    "status_code": status.as_u16(),
                });
                let content = format!("{callback}({});", to_json(&wrapped, pretty));
                with_content_type(StatusCode::OK, content, JSONP_CONTENT_TYPE)
            }
            (None, Some(body)) => with_content_type(status, to_json(&body, pretty), JSON_CONTENT_TYPE),
            (None, None) => status.into_response(),
        };

        response.headers_mut().extend(headers);
        response
    }

    pub fn render_error(&self, options: &RenderOptions, err: &ApiError) -> Response {
        self.render(options, err.to_reply())
    }
}

fn to_json(value: &Value, pretty: bool) -> String {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.unwrap_or_default()
}

fn with_content_type(status: StatusCode, content: String, content_type: &'static str) -> Response {
    (
        status,
        [(CONTENT_TYPE, HeaderValue::from_static(content_type))],
        content,
    )
        .into_response()
}
