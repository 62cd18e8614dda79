use std::net::IpAddr;

use chrono::Utc;
use hookrelay::{
    gateway::{self, GatewayConfig, compute_signature},
    queue::{self, QueueConfig},
    types::JobStatus,
};
use serde_json::json;
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::fs;
use tempfile::NamedTempFile;

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

fn signed_config() -> GatewayConfig {
    GatewayConfig {
        secret: Some("gateway-secret".to_string()),
        validate_signature: true,
        timestamp_tolerance_secs: 300,
        ip_allowlist: Vec::new(),
    }
}

fn client_ip() -> IpAddr {
    "203.0.113.10".parse().expect("parse ip")
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

#[tokio::test]
async fn record_if_new_is_idempotent() {
    let test_db = setup_db().await;
    let pool = test_db.pool;

    let first = gateway::record_if_new(&pool, "evt-1", "lead.created", "{}")
        .await
        .expect("record first");
    assert!(first.is_new);

    let second = gateway::record_if_new(&pool, "evt-1", "lead.created", "{}")
        .await
        .expect("record second");
    assert!(!second.is_new);
    assert_eq!(second.event.event_id, "evt-1");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events WHERE event_id = ?")
        .bind("evt-1")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 1, "unique constraint keeps a single row");
}

#[tokio::test]
async fn mark_processed_flips_flag() {
    let test_db = setup_db().await;
    let pool = test_db.pool;

    gateway::record_if_new(&pool, "evt-1", "lead.created", "{}")
        .await
        .expect("record");
    gateway::mark_processed(&pool, "evt-1")
        .await
        .expect("mark processed");

    let event = gateway::get_event(&pool, "evt-1").await.expect("get");
    assert!(event.processed);
}

#[tokio::test]
async fn inbound_accepts_signed_event_and_enqueues_job() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = signed_config();
    let queue_config = QueueConfig::default();

    let body = event_body("evt-100");
    let signature = compute_signature("gateway-secret", &body);

    let outcome = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        &body,
        Some(&signature),
        client_ip(),
    )
    .await
    .expect("process inbound");

    assert!(outcome.accepted);
    assert!(!outcome.duplicate);
    assert_eq!(outcome.event_id.as_deref(), Some("evt-100"));

    let job_id = outcome.job_id.expect("job enqueued");
    let job = queue::get_job(&pool, &job_id)
        .await
        .expect("get job")
        .expect("job exists");
    assert_eq!(job.job_type, "inbound_event");
    assert_eq!(job.status, JobStatus::Pending);

    let payload: serde_json::Value = serde_json::from_str(&job.payload).expect("job payload");
    assert_eq!(payload["event_id"], json!("evt-100"));
    assert_eq!(payload["event_type"], json!("lead.created"));
    assert_eq!(payload["data"]["email"], json!("lead@example.com"));
}

#[tokio::test]
async fn inbound_duplicate_event_is_noop() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = signed_config();
    let queue_config = QueueConfig::default();

    let body = event_body("evt-dup");
    let signature = compute_signature("gateway-secret", &body);

    let first = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        &body,
        Some(&signature),
        client_ip(),
    )
    .await
    .expect("first delivery");
    assert!(first.accepted);
    assert!(!first.duplicate);

    let second = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        &body,
        Some(&signature),
        client_ip(),
    )
    .await
    .expect("second delivery");
    assert!(second.accepted, "duplicates are accepted, not errors");
    assert!(second.duplicate);
    assert!(second.job_id.is_none());

    let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&pool)
        .await
        .expect("count jobs");
    assert_eq!(jobs, 1, "duplicate must not enqueue a second job");
}

#[tokio::test]
async fn inbound_rejects_bad_signature() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = signed_config();
    let queue_config = QueueConfig::default();

    let body = event_body("evt-bad-sig");
    let signature = compute_signature("wrong-secret", &body);

    let outcome = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        &body,
        Some(&signature),
        client_ip(),
    )
    .await
    .expect("process inbound");

    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("invalid_signature"));

    let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events")
        .fetch_one(&pool)
        .await
        .expect("count events");
    assert_eq!(events, 0, "rejected events never reach the ledger");
}

#[tokio::test]
async fn inbound_rejects_missing_signature() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = signed_config();
    let queue_config = QueueConfig::default();

    let body = event_body("evt-no-sig");

    let outcome = gateway::process_inbound(&pool, &config, &queue_config, &body, None, client_ip())
        .await
        .expect("process inbound");

    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("missing_signature"));
}

#[tokio::test]
async fn inbound_rejects_stale_timestamp() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = signed_config();
    let queue_config = QueueConfig::default();

    let body = serde_json::to_vec(&json!({
        "event_id": "evt-stale",
        "event_type": "lead.created",
        "timestamp": Utc::now().timestamp() - 3600,
        "data": {},
    }))
    .expect("serialize body");
    let signature = compute_signature("gateway-secret", &body);

    let outcome = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        &body,
        Some(&signature),
        client_ip(),
    )
    .await
    .expect("process inbound");

    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("stale_timestamp"));
}

#[tokio::test]
async fn inbound_rejects_disallowed_ip() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let mut config = signed_config();
    config.ip_allowlist = vec!["10.0.0.0/8".to_string()];
    let queue_config = QueueConfig::default();

    let body = event_body("evt-bad-ip");
    let signature = compute_signature("gateway-secret", &body);

    let outcome = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        &body,
        Some(&signature),
        client_ip(),
    )
    .await
    .expect("process inbound");

    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("ip_not_allowed"));
}

#[tokio::test]
async fn inbound_rejects_malformed_body() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = signed_config();
    let queue_config = QueueConfig::default();

    let outcome = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        b"not json",
        None,
        client_ip(),
    )
    .await
    .expect("process inbound");
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("invalid_json"));

    let outcome = gateway::process_inbound(
        &pool,
        &config,
        &queue_config,
        br#"{"data": {}}"#,
        None,
        client_ip(),
    )
    .await
    .expect("process inbound");
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("missing_event_type"));
}

#[tokio::test]
async fn inbound_signature_check_can_be_disabled() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = GatewayConfig {
        secret: None,
        validate_signature: false,
        timestamp_tolerance_secs: 300,
        ip_allowlist: Vec::new(),
    };
    let queue_config = QueueConfig::default();

    let body = event_body("evt-unsigned");

    let outcome = gateway::process_inbound(&pool, &config, &queue_config, &body, None, client_ip())
        .await
        .expect("process inbound");

    assert!(outcome.accepted);
    assert_eq!(outcome.event_id.as_deref(), Some("evt-unsigned"));
}

#[tokio::test]
async fn inbound_generates_event_id_when_absent() {
    let test_db = setup_db().await;
    let pool = test_db.pool;
    let config = GatewayConfig {
        secret: None,
        validate_signature: false,
        timestamp_tolerance_secs: 300,
        ip_allowlist: Vec::new(),
    };
    let queue_config = QueueConfig::default();

    let body = serde_json::to_vec(&json!({
        "event_type": "lead.created",
        "data": {},
    }))
    .expect("serialize body");

    let outcome = gateway::process_inbound(&pool, &config, &queue_config, &body, None, client_ip())
        .await
        .expect("process inbound");

    assert!(outcome.accepted);
    let event_id = outcome.event_id.expect("generated event id");
    assert!(uuid::Uuid::parse_str(&event_id).is_ok());
}
