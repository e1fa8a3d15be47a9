use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

use reservd::engine::{Engine, SchedulerConfig};
use reservd::notify::NotifyHub;
use reservd::wire::{self, ReservdFactory};

const H: i64 = 3_600_000;
// 2024-01-01T00:00:00Z
const T0: i64 = 1_704_067_200_000;
const DAY: i64 = 86_400_000;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    start_test_server_with(SchedulerConfig::default()).await
}

async fn start_test_server_with(cfg: SchedulerConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("reservd_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();

    let engine = Arc::new(
        Engine::new(dir.join("reservd.wal"), Arc::new(NotifyHub::new()), cfg).unwrap(),
    );
    let factory = Arc::new(ReservdFactory::new(engine, "reservd".to_string()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, None, factory).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("reservd")
        .user("reservd")
        .password("reservd");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

fn data_rows(messages: &[SimpleQueryMessage]) -> Vec<&tokio_postgres::SimpleQueryRow> {
    messages
        .iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_select_by_id() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let id = Ulid::new();
    let room = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester, note) VALUES ('{id}', '{room}', {s}, {e}, 'alice', 'standup')"#,
            s = T0,
            e = T0 + H,
        ))
        .await
        .unwrap();

    let messages = client
        .simple_query(&format!("SELECT * FROM reservations WHERE id = '{id}'"))
        .await
        .unwrap();
    let rows = data_rows(&messages);
    assert_eq!(rows.len(), 1);
    let row = rows[0];
    assert_eq!(row.get("id").unwrap(), id.to_string());
    assert_eq!(row.get("room_id").unwrap(), room.to_string());
    assert_eq!(row.get("start").unwrap(), T0.to_string());
    assert_eq!(row.get("requester").unwrap(), "alice");
    assert_eq!(row.get("note").unwrap(), "standup");
    assert_eq!(row.get("status").unwrap(), "confirmed");
}

#[tokio::test]
async fn conflicting_insert_reports_sqlstate_and_id() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let existing = Ulid::new();
    let room = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{existing}', '{room}', {s}, {e}, 'alice')"#,
            s = T0,
            e = T0 + 2 * H,
        ))
        .await
        .unwrap();

    let err = client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{next}', '{room}', {s}, {e}, 'bob')"#,
            next = Ulid::new(),
            s = T0 + H,
            e = T0 + 3 * H,
        ))
        .await
        .unwrap_err();

    let db_err = err.as_db_error().expect("expected a database error");
    assert_eq!(db_err.code().code(), "23P01");
    assert!(
        db_err.message().contains(&existing.to_string()),
        "conflict message should name the existing reservation: {}",
        db_err.message()
    );
}

#[tokio::test]
async fn list_active_by_room_and_range() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let room = Ulid::new();
    for i in 0..3 {
        client
            .batch_execute(&format!(
                r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{id}', '{room}', {s}, {e}, 'alice')"#,
                id = Ulid::new(),
                s = T0 + i * 2 * H,
                e = T0 + (i * 2 + 1) * H,
            ))
            .await
            .unwrap();
    }

    let messages = client
        .simple_query(&format!(
            "SELECT * FROM reservations WHERE room_id = '{room}' AND start >= {s} AND \"end\" <= {e}",
            s = T0,
            e = T0 + DAY,
        ))
        .await
        .unwrap();
    let rows = data_rows(&messages);
    assert_eq!(rows.len(), 3);
    // Rows come back sorted by start
    let starts: Vec<i64> = rows
        .iter()
        .map(|r| r.get("start").unwrap().parse().unwrap())
        .collect();
    assert!(starts.windows(2).all(|p| p[0] <= p[1]));
}

#[tokio::test]
async fn reschedule_and_confirm_via_update() {
    let cfg = SchedulerConfig {
        default_status: reservd::model::ReservationStatus::Pending,
        ..SchedulerConfig::default()
    };
    let addr = start_test_server_with(cfg).await;
    let client = connect(addr).await;

    let id = Ulid::new();
    let room = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{id}', '{room}', {s}, {e}, 'alice')"#,
            s = T0,
            e = T0 + H,
        ))
        .await
        .unwrap();

    client
        .batch_execute(&format!(
            r#"UPDATE reservations SET start = {s}, "end" = {e} WHERE id = '{id}'"#,
            s = T0 + 3 * H,
            e = T0 + 4 * H,
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!(
            "UPDATE reservations SET status = 'confirmed' WHERE id = '{id}'"
        ))
        .await
        .unwrap();

    let messages = client
        .simple_query(&format!("SELECT * FROM reservations WHERE id = '{id}'"))
        .await
        .unwrap();
    let row = data_rows(&messages)[0];
    assert_eq!(row.get("start").unwrap(), (T0 + 3 * H).to_string());
    assert_eq!(row.get("status").unwrap(), "confirmed");
}

#[tokio::test]
async fn delete_cancels_and_frees_the_slot() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let id = Ulid::new();
    let room = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{id}', '{room}', {s}, {e}, 'alice')"#,
            s = T0,
            e = T0 + H,
        ))
        .await
        .unwrap();
    client
        .batch_execute(&format!("DELETE FROM reservations WHERE id = '{id}'"))
        .await
        .unwrap();

    // Record survives as canceled
    let messages = client
        .simple_query(&format!("SELECT * FROM reservations WHERE id = '{id}'"))
        .await
        .unwrap();
    assert_eq!(data_rows(&messages)[0].get("status").unwrap(), "canceled");

    // Slot can be booked again
    client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{next}', '{room}', {s}, {e}, 'bob')"#,
            next = Ulid::new(),
            s = T0,
            e = T0 + H,
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn availability_marks_booked_days() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let room = Ulid::new();
    // Spans midnight into day two
    client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{id}', '{room}', {s}, {e}, 'alice')"#,
            id = Ulid::new(),
            s = T0 + 23 * H,
            e = T0 + 25 * H,
        ))
        .await
        .unwrap();

    let messages = client
        .simple_query(&format!(
            "SELECT * FROM availability WHERE room_id = '{room}' AND start >= {s} AND \"end\" <= {e}",
            s = T0,
            e = T0 + 3 * DAY,
        ))
        .await
        .unwrap();
    let rows = data_rows(&messages);
    assert_eq!(rows.len(), 3);
    let booked: Vec<bool> = rows
        .iter()
        .map(|r| r.get("booked").unwrap() == "t")
        .collect();
    assert_eq!(booked, vec![true, true, false]);
}

#[tokio::test]
async fn listen_acknowledged_and_validated() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let room = Ulid::new();
    client
        .batch_execute(&format!("LISTEN room_{room}"))
        .await
        .unwrap();

    // A channel outside the room_ namespace is refused
    let err = client.batch_execute("LISTEN kitchen").await.unwrap_err();
    assert!(err.as_db_error().is_some());
}

#[tokio::test]
async fn extended_query_with_parameters() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let id = Ulid::new();
    let room = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO reservations (id, room_id, start, "end", requester) VALUES ('{id}', '{room}', {s}, {e}, 'alice')"#,
            s = T0,
            e = T0 + H,
        ))
        .await
        .unwrap();

    let id_str = id.to_string();
    let rows = client
        .query("SELECT * FROM reservations WHERE id = $1", &[&id_str])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let got: &str = rows[0].get("requester");
    assert_eq!(got, "alice");
}

#[tokio::test]
async fn unknown_reservation_is_not_found() {
    let addr = start_test_server().await;
    let client = connect(addr).await;

    let err = client
        .simple_query(&format!(
            "SELECT * FROM reservations WHERE id = '{}'",
            Ulid::new()
        ))
        .await
        .unwrap_err();
    let db_err = err.as_db_error().expect("expected a database error");
    assert_eq!(db_err.code().code(), "P0002");
}
