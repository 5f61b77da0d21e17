use std::net::SocketAddr;
use axum::{Json, Router, routing::get};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::state::AppState;
use crate::{accounts, auth};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api",
              Router::new()
                  .merge(auth::router())
                  .merge(accounts::router())
                  .route("/health", get(health))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "cvhub-test-boundary";

    async fn spawn_app() -> (Router, tempfile::TempDir) {
        let (state, dir) = AppState::for_tests().await;
        (build_app(state), dir)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = send(app, req).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, bytes) = send(app, req).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn multipart(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn upload(app: &Router, id: i64, field: &str, filename: &str, data: &[u8]) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(format!("/api/users/{id}/resume"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart(field, filename, data)))
            .unwrap();
        let (status, bytes) = send(app, req).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _dir) = spawn_app().await;
        let (status, body) = get_json(&app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn register_login_upload_download_flow() {
        let (app, _dir) = spawn_app().await;

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "name": "Alice", "email": "a@x.com", "password": "pw1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "id": 1, "name": "Alice", "email": "a@x.com" }));

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "name": "Alice 2", "email": "a@x.com", "password": "other" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "duplicate_identity");
        assert_eq!(body["error"], "Email already exists");

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/login",
            json!({ "email": "a@x.com", "password": "pw1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token"], "1");
        assert_eq!(body["user"]["hasAttachment"], false);
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = upload(&app, 1, "resume", "r.pdf", b"0123456789").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["original"], "r.pdf");
        let stored = body["filename"].as_str().unwrap().to_string();
        assert!(stored.ends_with(".pdf"));

        let (status, body) = get_json(&app, "/api/users/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasAttachment"], true);
        assert_eq!(body["resume_filename"], stored.as_str());
        assert_eq!(body["resume_original_name"], "r.pdf");
        assert!(body.get("password_hash").is_none());

        let req = Request::builder()
            .uri("/api/users/1/resume")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            res.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"r.pdf\""
        );
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"0123456789");
    }

    #[tokio::test]
    async fn login_failures_share_one_response() {
        let (app, _dir) = spawn_app().await;
        send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "name": "Alice", "email": "a@x.com", "password": "pw1" }),
        )
        .await;

        let wrong = send_json(
            &app,
            "POST",
            "/api/auth/login",
            json!({ "email": "a@x.com", "password": "nope" }),
        )
        .await;
        let unknown = send_json(
            &app,
            "POST",
            "/api/auth/login",
            json!({ "email": "ghost@x.com", "password": "pw1" }),
        )
        .await;
        assert_eq!(wrong.0, StatusCode::BAD_REQUEST);
        assert_eq!(wrong, unknown);
        assert_eq!(wrong.1["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn register_reports_missing_fields() {
        let (app, _dir) = spawn_app().await;
        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "email": "a@x.com", "password": "pw1" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");
        assert_eq!(body["error"], "missing fields");
    }

    #[tokio::test]
    async fn null_fields_count_as_missing() {
        let (app, _dir) = spawn_app().await;
        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "name": null, "email": "a@x.com", "password": "pw1" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing fields");

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/login",
            json!({ "email": "a@x.com", "password": null }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_credentials");
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let (app, _dir) = spawn_app().await;

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "name": 5, "email": "a@x.com", "password": "pw1" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email": "a@x.com""#))
            .unwrap();
        let (status, bytes) = send(&app, req).await;
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");
        assert!(body["error"].is_string());

        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .body(Body::from("email=a@x.com"))
            .unwrap();
        let (status, bytes) = send(&app, req).await;
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let (status, body) = get_json(&app, "/api/users/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let req = Request::builder()
            .method("POST")
            .uri("/api/users/1/resume")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("not multipart"))
            .unwrap();
        let (status, bytes) = send(&app, req).await;
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");
    }

    #[tokio::test]
    async fn upload_rejections() {
        let (app, _dir) = spawn_app().await;
        send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "name": "Alice", "email": "a@x.com", "password": "pw1" }),
        )
        .await;

        let (status, body) = upload(&app, 1, "resume", "tool.exe", b"MZ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "unsupported_type");

        let (status, body) = upload(&app, 1, "other", "cv.pdf", b"x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file uploaded");

        let (status, body) = upload(&app, 2, "resume", "cv.pdf", b"x").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let big = vec![b'a'; crate::artifacts::MAX_UPLOAD_BYTES + 1];
        let (status, body) = upload(&app, 1, "resume", "big.pdf", &big).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "too_large");

        let (_, body) = get_json(&app, "/api/users/1").await;
        assert_eq!(body["hasAttachment"], false);
    }

    #[tokio::test]
    async fn missing_resources_are_404() {
        let (app, _dir) = spawn_app().await;
        let (status, body) = get_json(&app, "/api/users/7").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "User not found");

        send_json(
            &app,
            "POST",
            "/api/auth/register",
            json!({ "name": "Alice", "email": "a@x.com", "password": "pw1" }),
        )
        .await;
        let (status, body) = get_json(&app, "/api/users/1/resume").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Resume not found");
    }

    #[tokio::test]
    async fn search_and_profile_update() {
        let (app, _dir) = spawn_app().await;
        for (name, email) in [("Alice", "a@x.com"), ("Bob", "b@x.com"), ("Alicia", "c@x.com")] {
            send_json(
                &app,
                "POST",
                "/api/auth/register",
                json!({ "name": name, "email": email, "password": "pw", "title": "Dev" }),
            )
            .await;
        }

        let (status, body) = send_json(
            &app,
            "PATCH",
            "/api/users/2",
            json!({ "bio": "Builds things" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Dev");
        assert_eq!(body["bio"], "Builds things");

        let (status, body) = get_json(&app, "/api/users?q=ali").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Alicia", "Alice"]);
        assert_eq!(body[0]["hasAttachment"], false);
        assert!(body[0].get("email").is_none());

        let (_, body) = get_json(&app, "/api/users").await;
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["name"], "Alicia");

        let (_, body) = get_json(&app, "/api/users?q=zzz-no-match").await;
        assert_eq!(body, json!([]));
    }
}
