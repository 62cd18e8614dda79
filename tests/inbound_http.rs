use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode},
    routing::post,
};
use chrono::Utc;
use hookrelay::{
    gateway::{GatewayConfig, compute_signature},
    handlers::gateway::inbound_handler,
    queue::QueueConfig,
    state::AppState,
};
use http_body_util::BodyExt;
use serde_json::json;
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::fs;
use tempfile::NamedTempFile;
use tower::ServiceExt;

struct TestDb {
    pool: SqlitePool,
    _db_file: NamedTempFile,
}

async fn setup_db() -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_millis(500));

    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite for migrations");
    run_migrations_on_conn(&mut conn)
        .await
        .expect("run migrations");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("connect sqlite file");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

async fn run_migrations_on_conn(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut entries: Vec<_> = fs::read_dir("migrations")
        .map_err(sqlx::Error::Io)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();

    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let contents = fs::read_to_string(entry.path()).map_err(sqlx::Error::Io)?;
        for statement in contents.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&mut *conn).await?;
        }
    }

    Ok(())
}

fn test_app(pool: SqlitePool, gateway: GatewayConfig) -> Router {
    let state = AppState {
        pool,
        gateway,
        queue: QueueConfig::default(),
    };

    Router::new()
        .route("/webhook/inbound", post(inbound_handler))
        .with_state(state)
        .layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 10], 4242))))
}

fn signed_config() -> GatewayConfig {
    GatewayConfig {
        secret: Some("gateway-secret".to_string()),
        validate_signature: true,
        timestamp_tolerance_secs: 300,
        ip_allowlist: Vec::new(),
    }
}

fn event_body(event_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event_id": event_id,
        "event_type": "lead.created",
        "timestamp": Utc::now().timestamp(),
        "data": {"email": "lead@example.com"},
    }))
    .expect("serialize body")
}

fn inbound_request(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/inbound")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-signature", signature);
    }
    builder.body(Body::from(body)).expect("build request")
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse response json")
}

#[tokio::test]
async fn valid_request_returns_200() {
    let test_db = setup_db().await;
    let app = test_app(test_db.pool.clone(), signed_config());

    let body = event_body("evt-http-1");
    let signature = compute_signature("gateway-secret", &body);

    let response = app
        .oneshot(inbound_request(body, Some(&signature)))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["accepted"], serde_json::json!(true));
    assert_eq!(json["duplicate"], serde_json::json!(false));
    assert!(json["job_id"].is_string());
}

#[tokio::test]
async fn duplicate_request_returns_200_not_5xx() {
    let test_db = setup_db().await;
    let app = test_app(test_db.pool.clone(), signed_config());

    let body = event_body("evt-http-dup");
    let signature = compute_signature("gateway-secret", &body);

    let response = app
        .clone()
        .oneshot(inbound_request(body.clone(), Some(&signature)))
        .await
        .expect("first request");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(inbound_request(body, Some(&signature)))
        .await
        .expect("second request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["accepted"], serde_json::json!(true));
    assert_eq!(json["duplicate"], serde_json::json!(true));
}

#[tokio::test]
async fn bad_signature_returns_401() {
    let test_db = setup_db().await;
    let app = test_app(test_db.pool.clone(), signed_config());

    let body = event_body("evt-http-bad");
    let signature = compute_signature("wrong-secret", &body);

    let response = app
        .oneshot(inbound_request(body, Some(&signature)))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = response_json(response).await;
    assert_eq!(json["error"], serde_json::json!("invalid_signature"));
}

#[tokio::test]
async fn disallowed_ip_returns_403() {
    let test_db = setup_db().await;
    let mut config = signed_config();
    config.ip_allowlist = vec!["10.0.0.0/8".to_string()];
    let app = test_app(test_db.pool.clone(), config);

    let body = event_body("evt-http-ip");
    let signature = compute_signature("gateway-secret", &body);

    let response = app
        .oneshot(inbound_request(body, Some(&signature)))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn forwarded_for_header_wins_over_socket_peer() {
    let test_db = setup_db().await;
    let mut config = signed_config();
    config.ip_allowlist = vec!["203.0.113.10".to_string()];
    let app = test_app(test_db.pool.clone(), config);

    let body = event_body("evt-http-fwd");
    let signature = compute_signature("gateway-secret", &body);

    let mut request = inbound_request(body, Some(&signature));
    request.headers_mut().insert(
        "x-forwarded-for",
        "198.51.100.7".parse().expect("header value"),
    );

    let response = app.oneshot(request).await.expect("request");
    assert_eq!(
        response.status(),
        StatusCode::FORBIDDEN,
        "forwarded ip is not on the allowlist even though the peer is"
    );
}

#[tokio::test]
async fn malformed_json_returns_400() {
    let test_db = setup_db().await;
    let app = test_app(test_db.pool.clone(), signed_config());

    let response = app
        .oneshot(inbound_request(b"not json".to_vec(), None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
