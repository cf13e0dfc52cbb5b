//! Integration tests for the HTTP surface: upload validation, range
//! streaming, auth gating, and the catalog/progress flows.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use coursebox::{
    config::AppConfig,
    services::catalog_service::{CourseInput, LessonInput},
    state::AppState,
};
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

const MIGRATIONS: &str = include_str!("../migrations/0001_init.sql");

struct TestApp {
    state: AppState,
    router: Router,
    video_dir: tempfile::TempDir,
}

async fn test_app(max_upload_bytes: u64) -> TestApp {
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for stmt in MIGRATIONS.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt).execute(&db).await.unwrap();
    }

    let video_dir = tempfile::tempdir().unwrap();
    let cfg = AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        video_dir: video_dir.path().to_string_lossy().into_owned(),
        database_url: "sqlite::memory:".into(),
        // A failing encoder: uploads stay at original quality, which is the
        // served-path guarantee the tests rely on.
        ffmpeg_path: "/bin/false".into(),
        max_upload_bytes,
    };
    let state = AppState::new(Arc::new(db), &cfg);
    let router = coursebox::routes::routes::routes(state.clone());
    TestApp {
        state,
        router,
        video_dir,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

/// Log in and return the session cookie pair for subsequent requests.
async fn login(app: &TestApp, username: &str, password: &str) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!(
            r#"{{"username":"{username}","password":"{password}"}}"#
        )))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn store_video(app: &TestApp, bytes: &[u8]) -> String {
    let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::copy_from_slice(bytes))]);
    let record = app
        .state
        .videos
        .save_upload("video", "clip.mp4", "video/mp4", stream)
        .await
        .unwrap();
    record.file_name
}

fn multipart_request(uri: &str, cookie: &str, parts: &[(&str, Option<(&str, &str)>, Vec<u8>)]) -> Request<Body> {
    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    for (name, file, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((filename, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn stored_files(app: &TestApp) -> Vec<String> {
    std::fs::read_dir(app.video_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn healthz_ok() {
    let app = test_app(1024 * 1024).await;
    let (status, _, body) = send(
        &app.router,
        Request::get("/healthz").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("ok"));
}

#[tokio::test]
async fn rangeless_get_returns_full_file() {
    let app = test_app(1024 * 1024).await;
    let data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
    let name = store_video(&app, &data).await;

    let (status, headers, body) = send(
        &app.router,
        Request::get(format!("/videos/{name}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::CONTENT_LENGTH], "1024");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(body.as_ref(), data.as_slice());
}

#[tokio::test]
async fn range_request_returns_partial_content() {
    let app = test_app(1024 * 1024).await;
    let data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
    let name = store_video(&app, &data).await;

    let (status, headers, body) = send(
        &app.router,
        Request::get(format!("/videos/{name}"))
            .header(header::RANGE, "bytes=0-99")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_LENGTH], "100");
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-99/1024");
    assert_eq!(body.as_ref(), &data[..100]);
}

#[tokio::test]
async fn range_past_end_is_unsatisfiable() {
    let app = test_app(1024 * 1024).await;
    let name = store_video(&app, b"0123456789").await;

    let (status, headers, _) = send(
        &app.router,
        Request::get(format!("/videos/{name}"))
            .header(header::RANGE, "bytes=100-")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes */10");
}

#[tokio::test]
async fn unknown_video_is_404() {
    let app = test_app(1024 * 1024).await;
    let (status, _, _) = send(
        &app.router,
        Request::get("/videos/video-1-1.mp4")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_a_session() {
    let app = test_app(1024 * 1024).await;
    let request = Request::builder()
        .method("POST")
        .uri("/admin/courses")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("title=Rust&slug=rust"))
        .unwrap();
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_admin_session_is_forbidden() {
    let app = test_app(1024 * 1024).await;
    app.state
        .auth
        .create_user("student", "pw", false)
        .await
        .unwrap();
    let cookie = login(&app, "student", "pw").await;

    let request = Request::builder()
        .method("POST")
        .uri("/admin/courses")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("title=Rust&slug=rust"))
        .unwrap();
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn course_crud_roundtrip() {
    let app = test_app(1024 * 1024).await;
    app.state.auth.create_user("admin", "pw", true).await.unwrap();
    let cookie = login(&app, "admin", "pw").await;

    let request = Request::builder()
        .method("POST")
        .uri("/admin/courses")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("title=Intro+to+Rust&slug=intro-rust&description=Basics"))
        .unwrap();
    let (status, headers, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/admin/courses");

    let (status, _, body) = send(
        &app.router,
        Request::get("/api/courses").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let courses: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(courses[0]["slug"], "intro-rust");
}

#[tokio::test]
async fn upload_rejects_non_video_content_type() {
    let app = test_app(1024 * 1024).await;
    app.state.auth.create_user("admin", "pw", true).await.unwrap();
    let course = app
        .state
        .catalog
        .create_course(CourseInput {
            title: "Rust".into(),
            slug: "rust".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    let cookie = login(&app, "admin", "pw").await;

    let request = multipart_request(
        "/admin/lessons",
        &cookie,
        &[
            ("course_id", None, course.id.to_string().into_bytes()),
            ("title", None, b"Lesson".to_vec()),
            ("slug", None, b"lesson".to_vec()),
            ("video", Some(("notes.txt", "text/plain")), b"not a video".to_vec()),
        ],
    );
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(stored_files(&app).is_empty());
}

#[tokio::test]
async fn upload_rejects_oversized_file_before_storage() {
    let app = test_app(1024).await;
    app.state.auth.create_user("admin", "pw", true).await.unwrap();
    let course = app
        .state
        .catalog
        .create_course(CourseInput {
            title: "Rust".into(),
            slug: "rust".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    let cookie = login(&app, "admin", "pw").await;

    let request = multipart_request(
        "/admin/lessons",
        &cookie,
        &[
            ("course_id", None, course.id.to_string().into_bytes()),
            ("title", None, b"Lesson".to_vec()),
            ("slug", None, b"lesson".to_vec()),
            ("video", Some(("big.mp4", "video/mp4")), vec![0u8; 4096]),
        ],
    );
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(stored_files(&app).is_empty());
}

#[tokio::test]
async fn upload_stores_video_and_creates_lesson() {
    let app = test_app(1024 * 1024).await;
    app.state.auth.create_user("admin", "pw", true).await.unwrap();
    let course = app
        .state
        .catalog
        .create_course(CourseInput {
            title: "Rust".into(),
            slug: "rust".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    let cookie = login(&app, "admin", "pw").await;

    let payload = vec![7u8; 2048];
    let request = multipart_request(
        "/admin/lessons",
        &cookie,
        &[
            ("course_id", None, course.id.to_string().into_bytes()),
            ("title", None, b"Ownership".to_vec()),
            ("slug", None, b"ownership".to_vec()),
            ("duration", None, b"12".to_vec()),
            ("sort_order", None, b"1".to_vec()),
            ("content", None, b"Borrow checker basics".to_vec()),
            ("video", Some(("clip.mp4", "video/mp4")), payload.clone()),
        ],
    );
    let (status, headers, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/admin/lessons");

    let (status, _, body) = send(
        &app.router,
        Request::get("/api/courses/rust").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let detail: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let video_url = detail["lessons"][0]["video_url"].as_str().unwrap();
    assert!(video_url.starts_with("/videos/video-"));

    // The served path is immediately streamable at original quality (the
    // stub encoder fails, which never touches the served file).
    let (status, _, body) = send(
        &app.router,
        Request::get(video_url).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn lesson_without_video_is_accepted() {
    let app = test_app(1024 * 1024).await;
    app.state.auth.create_user("admin", "pw", true).await.unwrap();
    let course = app
        .state
        .catalog
        .create_course(CourseInput {
            title: "Rust".into(),
            slug: "rust".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    let cookie = login(&app, "admin", "pw").await;

    let request = multipart_request(
        "/admin/lessons",
        &cookie,
        &[
            ("course_id", None, course.id.to_string().into_bytes()),
            ("title", None, b"Theory".to_vec()),
            ("slug", None, b"theory".to_vec()),
        ],
    );
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let (_, _, body) = send(
        &app.router,
        Request::get("/api/courses/rust").body(Body::empty()).unwrap(),
    )
    .await;
    let detail: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(detail["lessons"][0]["video_url"].is_null());
}

#[tokio::test]
async fn progress_roundtrip() {
    let app = test_app(1024 * 1024).await;
    app.state
        .auth
        .create_user("student", "pw", false)
        .await
        .unwrap();
    let course = app
        .state
        .catalog
        .create_course(CourseInput {
            title: "Rust".into(),
            slug: "rust".into(),
            description: String::new(),
        })
        .await
        .unwrap();
    let lesson = app
        .state
        .catalog
        .create_lesson(LessonInput {
            course_id: course.id,
            title: "Ownership".into(),
            slug: "ownership".into(),
            description: String::new(),
            duration_minutes: 12,
            sort_order: 1,
            content: String::new(),
            video_url: None,
        })
        .await
        .unwrap();
    let cookie = login(&app, "student", "pw").await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/lessons/{}/complete", lesson.id))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let request = Request::get("/api/progress")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    let progress: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(progress[0]["lesson_id"], lesson.id.to_string());
    assert_eq!(progress[0]["completed"], true);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/lessons/{}/complete", lesson.id))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let request = Request::get("/api/progress")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(&app.router, request).await;
    let progress: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(progress.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let app = test_app(1024 * 1024).await;
    app.state
        .auth
        .create_user("student", "pw", false)
        .await
        .unwrap();
    let cookie = login(&app, "student", "pw").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/logout")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let request = Request::get("/api/progress")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
