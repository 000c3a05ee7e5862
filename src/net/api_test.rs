use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header::AUTHORIZATION};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

use super::*;

// =============================================================================
// FAKE BACKEND
// =============================================================================

const GOOD_TOKEN: &str = "tok-1";

#[derive(Clone, Debug, Default)]
struct SeenRequest {
    method: String,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
    /// Multipart field name -> text value (or `<N bytes>` for file parts).
    fields: Vec<(String, String)>,
}

#[derive(Clone, Default)]
struct Seen {
    requests: Arc<Mutex<Vec<SeenRequest>>>,
}

impl Seen {
    fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> usize {
        let mut requests = self.requests.lock().unwrap();
        requests.push(SeenRequest {
            method: method.to_string(),
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            authorization: headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned),
            fields: Vec::new(),
        });
        requests.len() - 1
    }

    fn last(&self) -> SeenRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {GOOD_TOKEN}");
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(expected.as_str())
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Could not validate credentials" }))).into_response()
}

async fn login(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    seen.record(&method, &uri, &headers);
    if body["password"] == "secret" {
        Json(json!({ "access_token": GOOD_TOKEN, "token_type": "bearer" })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "detail": "Invalid username or password" }))).into_response()
    }
}

async fn register(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    seen.record(&method, &uri, &headers);
    if body["username"] == "taken" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "Username already exists" }))).into_response();
    }
    Json(json!({ "message": "registered", "user_id": "u-42", "echo_email": body["email"] })).into_response()
}

async fn me(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    seen.record(&method, &uri, &headers);
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "username": "mei", "email": "mei@example.com", "is_vip": false, "credits": 3 })).into_response()
}

async fn styles(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    seen.record(&method, &uri, &headers);
    Json(json!([
        { "_id": "s1", "name": "Watercolor", "is_popular": true },
        { "_id": "s2", "name": "Pixel Art" }
    ]))
    .into_response()
}

async fn categories(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    seen.record(&method, &uri, &headers);
    Json(json!([{ "id": 1, "name": "Painting" }])).into_response()
}

async fn list_tasks(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    seen.record(&method, &uri, &headers);
    Json(json!([{ "_id": "t1", "style_id": "s1", "status": "completed", "output_image": "out/t1.png" }]))
        .into_response()
}

async fn create_task(
    State(seen): State<Seen>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let idx = seen.record(&method, &uri, &headers);
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_owned();
        let is_file = field.file_name().is_some();
        let data = field.bytes().await.unwrap();
        let value = if is_file { format!("<{} bytes>", data.len()) } else { String::from_utf8_lossy(&data).into_owned() };
        fields.push((name, value));
    }
    seen.requests.lock().unwrap()[idx].fields = fields;
    Json(json!({ "task_id": "t9", "status": "completed", "message": "done" })).into_response()
}

async fn get_task(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    seen.record(&method, &uri, &headers);
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Task not found" }))).into_response();
    }
    Json(json!({ "_id": id, "style_id": "s1", "status": "failed", "error": "timeout" })).into_response()
}

async fn retry_task(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    seen.record(&method, &uri, &headers);
    Json(json!({ "task_id": id, "status": "pending", "message": "retrying" })).into_response()
}

async fn subscribe(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    seen.record(&method, &uri, &headers);
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "message": "VIP activated, 100 credits added" })).into_response()
}

async fn broken(State(seen): State<Seen>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    seen.record(&method, &uri, &headers);
    (StatusCode::OK, "definitely not json").into_response()
}

async fn spawn_backend() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/users/login", post(login))
        .route("/users/register", post(register))
        .route("/users/me", get(me))
        .route("/styles", get(styles))
        .route("/styles/recent", get(broken))
        .route("/styles/categories", get(categories))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/retry", post(retry_task))
        .route("/vip/subscribe", post(subscribe))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn client(base_url: &str, tokens: &TokenStore) -> ApiClient {
    let config = ClientConfig::default().with_api_url(base_url);
    ApiClient::new(&config, tokens.clone()).unwrap()
}

fn png() -> ImageUpload {
    ImageUpload::new("cat.png", "image/png", vec![0x89, b'P', b'N', b'G'])
}

// =============================================================================
// PURE HELPERS
// =============================================================================

#[test]
fn endpoint_joins_without_double_slash() {
    assert_eq!(endpoint("http://api.test/", "/users/me"), "http://api.test/users/me");
    assert_eq!(endpoint("http://api.test", "styles"), "http://api.test/styles");
}

#[test]
fn task_paths_format_expected() {
    assert_eq!(task_path("t1"), "/tasks/t1");
    assert_eq!(task_retry_path("t1"), "/tasks/t1/retry");
}

#[test]
fn task_form_fields_omit_empty_prompt() {
    assert_eq!(task_form_fields("s1", Some("")), vec![("style_id", "s1".to_owned())]);
    assert_eq!(task_form_fields("s1", None), vec![("style_id", "s1".to_owned())]);
}

#[test]
fn task_form_fields_keep_prompt_verbatim() {
    assert_eq!(
        task_form_fields("s1", Some("  moody, cinematic ")),
        vec![("style_id", "s1".to_owned()), ("custom_prompt", "  moody, cinematic ".to_owned())]
    );
}

#[test]
fn tasks_query_only_when_status_given() {
    assert!(tasks_query(None).is_empty());
    assert_eq!(tasks_query(Some(&TaskStatus::Failed)), vec![("status", "failed".to_owned())]);
}

#[test]
fn categories_query_skips_unset() {
    assert!(categories_query(None, None).is_empty());
    assert_eq!(categories_query(Some(5), None), vec![("limit", "5".to_owned())]);
}

// =============================================================================
// BEARER INJECTION
// =============================================================================

#[tokio::test]
async fn no_token_sends_no_authorization_header() {
    let (base, seen) = spawn_backend().await;
    let tokens = TokenStore::in_memory();
    let api = client(&base, &tokens);

    let err = api.get_user_profile().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.server_message(), Some("Could not validate credentials"));
    assert_eq!(seen.last().authorization, None);
}

#[tokio::test]
async fn token_is_read_at_call_time() {
    let (base, seen) = spawn_backend().await;
    let tokens = TokenStore::in_memory();
    let api = client(&base, &tokens);

    tokens.set(GOOD_TOKEN).unwrap();
    let user = api.get_user_profile().await.unwrap();
    assert_eq!(user.credits, 3);
    assert!(!user.is_vip);
    assert_eq!(seen.last().authorization.as_deref(), Some("Bearer tok-1"));

    tokens.clear().unwrap();
    api.get_styles(StyleQuery::default()).await.unwrap();
    assert_eq!(seen.last().authorization, None);
}

// =============================================================================
// AUTH
// =============================================================================

#[tokio::test]
async fn login_returns_token() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let resp = api.login("mei", "secret").await.unwrap();
    assert_eq!(resp.access_token, GOOD_TOKEN);
    let last = seen.last();
    assert_eq!(last.method, "POST");
    assert_eq!(last.path, "/users/login");
}

#[tokio::test]
async fn login_failure_carries_status_and_detail() {
    let (base, _seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let err = api.login("mei", "wrong").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Request { status: 400, message: Some("Invalid username or password".to_owned()) }
    );
}

#[tokio::test]
async fn register_sends_email() {
    let (base, _seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let resp = api.register("mei", "pw", "mei@example.com").await.unwrap();
    assert_eq!(resp.user_id.as_deref(), Some("u-42"));

    let err = api.register("taken", "pw", "x@example.com").await.unwrap_err();
    assert_eq!(err.server_message(), Some("Username already exists"));
}

// =============================================================================
// STYLES
// =============================================================================

#[tokio::test]
async fn styles_default_query_sends_no_params() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let styles = api.get_styles(StyleQuery::default()).await.unwrap();
    assert_eq!(styles.len(), 2);
    assert_eq!(styles[0].id, "s1");
    assert_eq!(seen.last().query, None);
}

#[tokio::test]
async fn styles_query_sends_set_fields() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    api.get_styles(StyleQuery { category_id: Some(2), limit: Some(10), offset: None }).await.unwrap();
    assert_eq!(seen.last().query.as_deref(), Some("category_id=2&limit=10"));
}

#[tokio::test]
async fn categories_pass_paging() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let categories = api.get_style_categories(Some(5), Some(10)).await.unwrap();
    assert_eq!(categories[0].id, "1");
    assert_eq!(seen.last().query.as_deref(), Some("limit=5&offset=10"));
}

#[tokio::test]
async fn undecodable_body_is_decode_error() {
    let (base, _seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let err = api.get_recent_styles().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "unexpected error: {err:?}");
}

// =============================================================================
// TASKS
// =============================================================================

#[tokio::test]
async fn create_task_omits_empty_prompt() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let sub = api.create_task("s1", Some(""), png()).await.unwrap();
    assert_eq!(sub.task_id, "t9");
    assert_eq!(sub.status, TaskStatus::Completed);

    let fields = seen.last().fields;
    let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["file", "style_id"]);
    assert_eq!(fields[0].1, "<4 bytes>");
    assert_eq!(fields[1].1, "s1");
}

#[tokio::test]
async fn create_task_includes_prompt_verbatim() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    api.create_task("s1", Some("golden hour, film grain"), png()).await.unwrap();

    let fields = seen.last().fields;
    assert!(fields.contains(&("custom_prompt".to_owned(), "golden hour, film grain".to_owned())));
}

#[tokio::test]
async fn create_task_rejects_bad_mime() {
    let api = client("http://127.0.0.1:9", &TokenStore::in_memory());
    let upload = ImageUpload::new("cat.png", "not a mime", vec![1]);

    let err = api.create_task("s1", None, upload).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidUpload(_)));
}

#[tokio::test]
async fn get_tasks_without_status_sends_no_filter() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let tasks = api.get_tasks(None).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(seen.last().query, None);

    api.get_tasks(Some(&TaskStatus::Pending)).await.unwrap();
    assert_eq!(seen.last().query.as_deref(), Some("status=pending"));
}

#[tokio::test]
async fn get_task_and_retry() {
    let (base, seen) = spawn_backend().await;
    let api = client(&base, &TokenStore::in_memory());

    let task = api.get_task("t5").await.unwrap();
    assert_eq!(task.id, "t5");
    assert_eq!(task.status, TaskStatus::Failed);

    let sub = api.retry_task("t5").await.unwrap();
    assert_eq!(sub.status, TaskStatus::Pending);
    let last = seen.last();
    assert_eq!(last.method, "POST");
    assert_eq!(last.path, "/tasks/t5/retry");

    let err = api.get_task("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

// =============================================================================
// VIP + TRANSPORT
// =============================================================================

#[tokio::test]
async fn subscribe_vip_with_token() {
    let (base, _seen) = spawn_backend().await;
    let tokens = TokenStore::in_memory();
    tokens.set(GOOD_TOKEN).unwrap();
    let api = client(&base, &tokens);

    let sub = api.subscribe_vip().await.unwrap();
    assert!(sub.message.contains("VIP"));
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = client(&format!("http://{addr}"), &TokenStore::in_memory());
    let err = api.get_user_profile().await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "unexpected error: {err:?}");
}
