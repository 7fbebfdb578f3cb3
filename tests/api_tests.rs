use std::sync::Arc;

use api_boilerplate::api::AppState;
use api_boilerplate::config::{Config, SecurityConfig};
use api_boilerplate::db::{NewUser, User};
use api_boilerplate::entities::users;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{Value, json};
use tower::ServiceExt;

const PASSWORD: &str = "correct-horse";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.server.secure_cookies = false;
    config.server.cors_allowed_origins.clear();
    config.security = fast_hashing();
    config
}

fn fast_hashing() -> SecurityConfig {
    SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
    }
}

async fn spawn_app_with(config: Config) -> (Router, Arc<AppState>) {
    let state = api_boilerplate::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    (api_boilerplate::api::router(state.clone()), state)
}

async fn spawn_app() -> (Router, Arc<AppState>) {
    spawn_app_with(test_config()).await
}

async fn create_user(state: &AppState, username: &str, is_staff: bool) -> User {
    let email = format!("{}@example.com", username.to_lowercase());
    create_user_with_email(state, username, &email, is_staff).await
}

async fn create_user_with_email(state: &AppState, username: &str, email: &str, is_staff: bool) -> User {
    state
        .store()
        .create_user(
            NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password: PASSWORD.to_string(),
                is_staff,
                is_superuser: false,
            },
            &fast_hashing(),
        )
        .await
        .expect("Failed to create user")
}

async fn deactivate(state: &AppState, user_id: i32) {
    users::ActiveModel {
        id: Set(user_id),
        is_active: Set(false),
        ..Default::default()
    }
    .update(&state.store().conn)
    .await
    .expect("Failed to deactivate user");
}

async fn login_cookie(app: &Router, login: &str) -> String {
    let (status, headers, _) = send(
        app,
        json_request("POST", "/api/auth/login/", &json!({"username": login, "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    headers[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn basic(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{login}:{password}")))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, authorization)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_basic_auth_requires_exact_password() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice", false).await;

    let (status, _, body) = send(&app, get_with_auth("/api/account/", &basic("alice", PASSWORD))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["username"], "alice");

    for i in 0..PASSWORD.len() {
        let mut mutated = PASSWORD.as_bytes().to_vec();
        mutated[i] = if mutated[i] == b'x' { b'y' } else { b'x' };
        let mutated = String::from_utf8(mutated).unwrap();

        let (status, _, body) = send(&app, get_with_auth("/api/account/", &basic("alice", &mutated))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "password {mutated} was accepted");
        assert_eq!(parse(&body), json!({"message": "Username and password don't match"}));
    }
}

#[tokio::test]
async fn test_basic_auth_by_email() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice", false).await;

    let (status, _, _) = send(
        &app,
        get_with_auth("/api/account/", &basic("alice@example.com", PASSWORD)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_basic_header() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice", false).await;

    let header = format!("Basic {}", STANDARD.encode("alice"));
    let (status, headers, body) = send(&app, get_with_auth("/api/echo/", &header)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.contains_key(header::WWW_AUTHENTICATE));
    assert!(
        parse(&body)["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid Authorization header.")
    );

    let (status, _, body) = send(&app, get_with_auth("/api/echo/", "Token abc")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse(&body), json!({"message": "Error with HTTP Basic Auth"}));
}

#[tokio::test]
async fn test_case_insensitive_login() {
    let (app, state) = spawn_app().await;
    create_user(&state, "Alice", false).await;

    for login in ["Alice", "alice", "ALICE"] {
        let (status, _, body) = send(&app, get_with_auth("/api/account/", &basic(login, PASSWORD))).await;
        assert_eq!(status, StatusCode::OK, "{login}");
        assert_eq!(parse(&body)["username"], "Alice");
    }
}

#[tokio::test]
async fn test_case_sensitive_login_when_disabled() {
    let mut config = test_config();
    config.api.case_insensitive_auth = false;
    let (app, state) = spawn_app_with(config).await;
    create_user(&state, "Alice", false).await;

    let (status, _, _) = send(&app, get_with_auth("/api/account/", &basic("Alice", PASSWORD))).await;
    assert_eq!(status, StatusCode::OK);

    for login in ["alice", "ALICE"] {
        let (status, _, _) = send(&app, get_with_auth("/api/account/", &basic(login, PASSWORD))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{login}");
    }
}

#[tokio::test]
async fn test_api_key_is_stable_and_authenticates() {
    let (app, state) = spawn_app().await;
    let user = create_user(&state, "alice", false).await;

    let first = state.store().get_or_create_api_key(user.id).await.unwrap();
    let second = state.store().get_or_create_api_key(user.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 40);

    let request = Request::builder()
        .uri("/api/account/")
        .header("X-EXAMPLE-USERNAME", "alice")
        .header("X-EXAMPLE-API-TOKEN", &first)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["api_key"], first.as_str());

    let request = Request::builder()
        .uri("/api/account/")
        .header("X-EXAMPLE-USERNAME", "alice")
        .header("X-EXAMPLE-API-TOKEN", "0000")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        parse(&body),
        json!({"message": "Can't find an user with this username and api_key"})
    );
}

#[tokio::test]
async fn test_users_self_requires_auth() {
    let (app, _state) = spawn_app().await;

    let (status, headers, body) = send(&app, get("/api/users/self/")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Basic realm=\"Example\"");
    assert_eq!(parse(&body), json!({"message": "Please authenticate"}));

    let (status, headers, _) = send(&app, get("/api/users/self/?disable_basic_auth=1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!headers.contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_session_login_and_logout() {
    let (app, state) = spawn_app().await;
    let user = create_user(&state, "alice", false).await;

    let (status, headers, body) = send(
        &app,
        json_request("POST", "/api/auth/login/", &json!({"username": "alice", "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(parse(&body)["api_key"].is_string());

    let cookie = headers[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let request = Request::builder()
        .uri("/api/users/self/")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let profile = parse(&body);
    assert_eq!(profile["username"], "alice");
    assert_eq!(profile["resource_uri"], format!("/api/users/{}/", user.id));
    assert!(profile.get("api_key").is_none());

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/logout/")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let request = Request::builder()
        .uri("/api/account/")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice", false).await;

    let (status, _, _) = send(
        &app,
        json_request("POST", "/api/auth/login/", &json!({"username": "alice", "password": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        json_request("POST", "/api/auth/login/", &json!({"username": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_user_lookup() {
    let (app, state) = spawn_app().await;
    let user = create_user(&state, "Alice", false).await;

    let (status, _, body) = send(&app, get(&format!("/api/users/{}/", user.id))).await;
    assert_eq!(status, StatusCode::OK);
    let profile = parse(&body);
    assert_eq!(profile["username"], "Alice");
    assert_eq!(profile["is_admin"], false);
    assert!(profile["joined_at"].as_i64().unwrap() > 0);

    let (status, _, body) = send(&app, get("/api/users/alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["username"], "Alice");

    let (status, _, body) = send(&app, get("/api/users/9999999/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse(&body), json!({"message": "User not found."}));
}

#[tokio::test]
async fn test_jsonp_wrapping() {
    let (app, _state) = spawn_app().await;

    let (status, headers, body) = send(&app, get("/api/users/9999999/?callback=handle")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");

    let inner = body
        .strip_prefix("handle(")
        .and_then(|b| b.strip_suffix(");"))
        .unwrap();
    let payload = parse(inner);
    assert_eq!(payload["status_code"], 404);
    assert_eq!(payload["data"], json!({"message": "User not found."}));

    let (status, _, body) = send(&app, get("/api/users/9999999/?callback=1bad")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse(&body), json!({"message": "User not found."}));
}

#[tokio::test]
async fn test_echo() {
    let (app, _state) = spawn_app().await;

    let (status, _, body) = send(&app, get("/api/echo")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!("POST/PUT/PATCH data to echo."));

    let payload = json!({"hello": ["world", 1]});
    for method in ["POST", "PUT", "PATCH"] {
        let (status, _, body) = send(&app, json_request(method, "/api/echo/", &payload)).await;
        assert_eq!(status, StatusCode::OK, "{method}");
        assert_eq!(parse(&body), payload);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/echo/")
        .header(header::CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
        .body(Body::from("a=1&a=2&b=x"))
        .unwrap();
    let (_, _, body) = send(&app, request).await;
    assert_eq!(parse(&body), json!({"a": "2", "b": "x"}));

    let request = Request::builder()
        .method("POST")
        .uri("/api/echo/")
        .body(Body::from("{broken"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body), json!({}));
}

#[tokio::test]
async fn test_method_not_allowed() {
    let (app, _state) = spawn_app().await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/echo/")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(parse(&body), json!({"error": "DELETE method not allowed."}));
    assert!(headers.contains_key(header::ALLOW));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/echo/")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ALLOW], "GET, POST, PUT, PATCH, HEAD, OPTIONS");
}

#[tokio::test]
async fn test_account_requires_login() {
    let (app, _state) = spawn_app().await;

    let (status, _, body) = send(&app, get("/api/account/")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse(&body), json!({"message": "Please authenticate"}));
}

#[tokio::test]
async fn test_users_pagination() {
    let (app, state) = spawn_app().await;
    for name in ["alice", "bob", "carol"] {
        create_user(&state, name, false).await;
    }

    let (status, _, body) = send(&app, get("/api/users/?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let page = parse(&body);
    assert_eq!(page["meta"]["total_count"], 3);
    assert_eq!(page["meta"]["limit"], 2);
    assert_eq!(page["meta"]["previous"], Value::Null);
    assert_eq!(page["meta"]["next"], "/api/users/?limit=2&offset=2");
    assert_eq!(page["objects"].as_array().unwrap().len(), 2);
    assert_eq!(page["objects"][0]["username"], "alice");

    let (_, _, body) = send(&app, get("/api/users/?limit=2&offset=2")).await;
    let page = parse(&body);
    assert_eq!(page["objects"][0]["username"], "carol");
    assert_eq!(page["meta"]["next"], Value::Null);

    let (status, _, body) = send(&app, get("/api/users/?limit=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        parse(&body),
        json!({"message": "Invalid limit 'abc' provided. Please provide a positive integer."})
    );
}

#[tokio::test]
async fn test_staff_creates_users() {
    let (app, state) = spawn_app().await;
    create_user(&state, "admin", true).await;
    create_user(&state, "alice", false).await;

    let payload = json!({"username": "dave", "email": "dave@example.com", "password": "long-enough"});

    let mut request = json_request("POST", "/api/users/", &payload);
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, basic("alice", PASSWORD).parse().unwrap());
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = json_request("POST", "/api/users/", &payload);
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, basic("admin", PASSWORD).parse().unwrap());
    let (status, headers, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    let created = parse(&body);
    assert_eq!(created["username"], "dave");
    assert_eq!(headers[header::LOCATION], created["resource_uri"].as_str().unwrap());

    let mut request = json_request("POST", "/api/users/", &json!({"username": "DAVE", "email": "d2@example.com", "password": "long-enough"}));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, basic("admin", PASSWORD).parse().unwrap());
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut request = json_request("POST", "/api/users/", &json!({"username": "erin"}));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, basic("admin", PASSWORD).parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse(&body), json!({"message": "Missing required field 'email'"}));
}

#[tokio::test]
async fn test_unknown_path() {
    let (app, _state) = spawn_app().await;

    let (status, _, body) = send(&app, get("/api/nothing/here/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse(&body), json!({"message": "Not found."}));
}

#[tokio::test]
async fn test_non_ascii_usernames_fold_case() {
    let (app, state) = spawn_app().await;
    create_user(&state, "admin", true).await;
    create_user(&state, "Émile", false).await;

    for login in ["Émile", "émile", "ÉMILE"] {
        let (status, _, body) = send(&app, get_with_auth("/api/account/", &basic(login, PASSWORD))).await;
        assert_eq!(status, StatusCode::OK, "login {login}");
        assert_eq!(parse(&body)["username"], "Émile");
    }

    let (status, _, body) = send(&app, get("/api/users/%C3%A9mile/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["username"], "Émile");

    let mut request = json_request(
        "POST",
        "/api/users/",
        &json!({"username": "émile", "email": "other@example.com", "password": "long-enough"}),
    );
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, basic("admin", PASSWORD).parse().unwrap());
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_offset_beyond_signed_range() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice", false).await;

    let (status, _, body) = send(&app, get("/api/users/?offset=18446744073709551615")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        parse(&body),
        json!({"message": "Invalid offset '18446744073709551615' provided. Please provide a positive integer."})
    );

    let (status, _, body) = send(&app, get("/api/users/?offset=9223372036854775807")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["objects"], json!([]));
}

#[tokio::test]
async fn test_basic_auth_takes_precedence_over_api_key() {
    let (app, state) = spawn_app().await;
    let user = create_user(&state, "alice", false).await;
    let key = state.store().get_or_create_api_key(user.id).await.unwrap();

    let request = Request::builder()
        .uri("/api/account/")
        .header(header::AUTHORIZATION, basic("alice", "wrong"))
        .header("X-EXAMPLE-USERNAME", "alice")
        .header("X-EXAMPLE-API-TOKEN", &key)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse(&body), json!({"message": "Username and password don't match"}));
}

#[tokio::test]
async fn test_session_takes_precedence_over_basic() {
    let (app, state) = spawn_app().await;
    create_user(&state, "alice", false).await;
    let cookie = login_cookie(&app, "alice").await;

    let request = Request::builder()
        .uri("/api/account/")
        .header(header::COOKIE, &cookie)
        .header(header::AUTHORIZATION, basic("alice", "wrong"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["username"], "alice");
}

#[tokio::test]
async fn test_inactive_user_rejected_by_every_strategy() {
    let (app, state) = spawn_app().await;
    let user = create_user(&state, "alice", false).await;
    let key = state.store().get_or_create_api_key(user.id).await.unwrap();
    let cookie = login_cookie(&app, "alice").await;

    deactivate(&state, user.id).await;

    let (status, _, _) = send(&app, get_with_auth("/api/account/", &basic("alice", PASSWORD))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/account/")
        .header("X-EXAMPLE-USERNAME", "alice")
        .header("X-EXAMPLE-API-TOKEN", &key)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/account/")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse(&body), json!({"message": "Please authenticate"}));

    let (status, _, _) = send(
        &app,
        json_request("POST", "/api/auth/login/", &json!({"username": "alice", "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inactive_username_does_not_shadow_email_login() {
    let (app, state) = spawn_app().await;
    let stale = create_user_with_email(&state, "bob@example.com", "old@example.com", false).await;
    create_user_with_email(&state, "carol", "bob@example.com", false).await;

    deactivate(&state, stale.id).await;

    let (status, _, body) = send(
        &app,
        get_with_auth("/api/account/", &basic("bob@example.com", PASSWORD)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse(&body)["username"], "carol");
}
