use axum::http::{self, Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::BodyExt;
use mock_plex::{app, MockPlex, PageRequest};
use serde_json::Value;
use tower::ServiceExt;

const TOKEN: &str = "secret";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn authed(uri: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header("X-Plex-Token", TOKEN)
        .body(String::new())
        .unwrap()
}

fn library() -> MockPlex {
    MockPlex::new(TOKEN)
        .with_account("alice", "pw", "issued")
        .with_section("1", "Movies", "movie", 5)
        .with_section("2", "Shows", "show", 0)
}

// --- auth ---

#[tokio::test]
async fn missing_token_is_401() {
    let resp = app(TOKEN)
        .oneshot(Request::builder().uri("/identity").body(String::new()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_token_is_401() {
    let resp = app("other").oneshot(authed("/identity")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_reports_machine_id() {
    let mock = library();
    let resp = mock.router().oneshot(authed("/identity")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["MediaContainer"]["machineIdentifier"], mock.machine_identifier());
}

// --- sections ---

#[tokio::test]
async fn sections_list_as_directories() {
    let resp = library().router().oneshot(authed("/library/sections")).await.unwrap();
    let json = body_json(resp).await;
    let dirs = json["MediaContainer"]["Directory"].as_array().unwrap();
    assert_eq!(dirs.len(), 2);
    assert_eq!(dirs[0]["title"], "Movies");
    assert_eq!(dirs[1]["type"], "show");
}

#[tokio::test]
async fn sections_render_xml_on_request() {
    let req = Request::builder()
        .uri("/library/sections")
        .header("X-Plex-Token", TOKEN)
        .header(http::header::ACCEPT, "application/xml, text/xml")
        .body(String::new())
        .unwrap();
    let resp = library().router().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/xml");
    let body = String::from_utf8(body_bytes(resp).await.to_vec()).unwrap();
    assert!(body.contains(r#"<Directory key="1" title="Movies" type="movie"/>"#));
}

#[tokio::test]
async fn empty_library_omits_directory_list() {
    let resp = app(TOKEN).oneshot(authed("/library/sections")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["MediaContainer"]["size"], 0);
    assert!(json["MediaContainer"].get("Directory").is_none());
}

// --- items ---

#[tokio::test]
async fn items_are_windowed_and_recorded() {
    let mock = library();
    let resp = mock
        .router()
        .oneshot(authed(
            "/library/sections/1/all?X-Plex-Container-Start=3&X-Plex-Container-Size=10",
        ))
        .await
        .unwrap();
    let json = body_json(resp).await;
    let items = json["MediaContainer"]["Metadata"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["ratingKey"], "1-3");
    assert_eq!(json["MediaContainer"]["totalSize"], 5);
    assert_eq!(mock.page_requests(), vec![PageRequest { start: 3, size: Some(10) }]);
}

#[tokio::test]
async fn offset_past_end_has_no_metadata() {
    let resp = library()
        .router()
        .oneshot(authed("/library/sections/1/all?X-Plex-Container-Start=5&X-Plex-Container-Size=5"))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert!(json["MediaContainer"].get("Metadata").is_none());
}

#[tokio::test]
async fn unknown_section_is_404() {
    let resp = library().router().oneshot(authed("/library/sections/9/all")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refresh_is_recorded() {
    let mock = library();
    let resp = mock.router().oneshot(authed("/library/sections/2/refresh")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(mock.refreshed(), vec!["2".to_string()]);
}

// --- misc ---

#[tokio::test]
async fn broken_returns_invalid_json() {
    let resp = library().router().oneshot(authed("/broken")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-mock-case"], "broken");
    let bytes = body_bytes(resp).await;
    assert!(serde_json::from_slice::<Value>(&bytes).is_err());
}

#[tokio::test]
async fn echo_returns_body_and_content_type() {
    let req = Request::builder()
        .method("POST")
        .uri("/echo")
        .header("X-Plex-Token", TOKEN)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(r#"{"a":[1,2]}"#.to_string())
        .unwrap();
    let resp = library().router().oneshot(req).await.unwrap();
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/json");
    assert_eq!(body_bytes(resp).await, bytes::Bytes::from_static(br#"{"a":[1,2]}"#));
}

// --- sign-in ---

fn sign_in_request(user: &str, password: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/users/sign_in.json")
        .header(
            http::header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))),
        )
        .header("X-Plex-Client-Identifier", "test-client")
        .body(String::new())
        .unwrap()
}

#[tokio::test]
async fn sign_in_issues_usable_token() {
    use tower::Service;

    let mut app = library().router().into_service();

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(sign_in_request("alice", "pw"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["user"]["authToken"], "issued");

    let req = Request::builder()
        .uri("/identity")
        .header("X-Plex-Token", "issued")
        .body(String::new())
        .unwrap();
    let resp = ServiceExt::ready(&mut app).await.unwrap().call(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn sign_in_rejects_bad_password() {
    let resp = library().router().oneshot(sign_in_request("alice", "nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
