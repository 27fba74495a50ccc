// Integration tests for `Connection` against in-memory peers.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::io::DuplexStream;
use tokio_test::io::Builder;
use tokio_util::codec::{Framed, LinesCodec};

use arcl_api::{
    ArclEvent, Category, Command, Connection, ConnectionState, Error, JobLine, QueueStatus,
};

// ── Helpers ─────────────────────────────────────────────────────────

const TIMEOUT: Duration = Duration::from_secs(5);

fn password() -> SecretString {
    SecretString::from("adept".to_owned())
}

/// Log a fresh `Connection` in against a scripted peer and hand back
/// the server half.
async fn logged_in() -> (Connection, Framed<DuplexStream, LinesCodec>) {
    let (client, server) = tokio::io::duplex(16 * 1024);
    let mut server = Framed::new(server, LinesCodec::new());
    let conn = Connection::new();

    let login = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.attach(client, &password(), TIMEOUT).await })
    };

    server.send("Enter password:").await.unwrap();
    assert_eq!(server.next().await.unwrap().unwrap(), "adept");
    server.send("Welcome to the server.").await.unwrap();
    server.send("You can now type commands").await.unwrap();
    server.send("End of commands").await.unwrap();

    login.await.unwrap().unwrap();
    (conn, server)
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_writes_password_with_crlf() {
    let mock = Builder::new()
        .read(b"Enter password:")
        .write(b"adept\r\n")
        .read(b"Welcome to the server.\r\nEnd of commands\r\n")
        .wait(Duration::from_secs(60))
        .build();

    let conn = Connection::new();
    conn.attach(mock, &password(), TIMEOUT).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::LoggedIn);

    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn bad_password_is_rejected_and_fails() {
    let mock = Builder::new()
        .read(b"Enter password:\r\n")
        .write(b"adept\r\n")
        .read(b"Bad password\r\n")
        .build();

    let conn = Connection::new();
    let err = conn.attach(mock, &password(), TIMEOUT).await.unwrap_err();

    assert!(matches!(err, Error::LoginRejected { ref message } if message == "Bad password"));
    assert_eq!(conn.state(), ConnectionState::Failed);
    assert!(matches!(conn.write("onelinestatus").await, Err(Error::NotLoggedIn)));
}

#[tokio::test]
async fn silent_server_times_out_waiting_for_prompt() {
    let (client, _server) = tokio::io::duplex(1024);
    let conn = Connection::new();

    let err = conn
        .attach(client, &password(), Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::LoginTimeout {
            stage: "waiting for the password prompt"
        }
    ));
    assert_eq!(conn.state(), ConnectionState::Failed);
}

// ── Session ─────────────────────────────────────────────────────────

#[tokio::test]
async fn commands_reach_the_server_terminated() {
    let (conn, mut server) = logged_in().await;

    conn.send(&Command::QueueShow).await.unwrap();
    conn.send(&Command::RangeDeviceGetCurrent("Laser_1".into()))
        .await
        .unwrap();

    assert_eq!(server.next().await.unwrap().unwrap(), "QueueShow");
    assert_eq!(
        server.next().await.unwrap().unwrap(),
        "rangeDeviceGetCurrent Laser_1"
    );
}

#[tokio::test]
async fn inbound_lines_reach_only_their_category() {
    let (conn, mut server) = logged_in().await;
    let mut jobs = conn.subscribe(Category::Job);
    let mut status = conn.subscribe(Category::Status);

    server
        .send(r#"QueueShow: PICKUP3 JOB3 10 Completed None Goal "1" "21" 11/14/2012 11:49:23 11/14/2012 11:49:23 "" 0"#)
        .await
        .unwrap();
    server.send("Arrived at Goal1").await.unwrap();
    server.send("EndQueueShow").await.unwrap();

    let first = tokio::time::timeout(TIMEOUT, jobs.recv()).await.unwrap().unwrap();
    let ArclEvent::Job(JobLine::Segment(segment)) = first.as_ref() else {
        panic!("expected a segment, got {first:?}");
    };
    assert_eq!(segment.id, "PICKUP3");
    assert_eq!(segment.status, QueueStatus::Completed);

    let second = tokio::time::timeout(TIMEOUT, jobs.recv()).await.unwrap().unwrap();
    assert!(matches!(second.as_ref(), ArclEvent::Job(JobLine::EndOfList)));
    assert!(status.try_recv().is_err());
}

#[tokio::test]
async fn malformed_lines_are_published_not_fatal() {
    let (conn, mut server) = logged_in().await;
    let mut robots = conn.subscribe(Category::Robot);

    server.send(r#"QueueRobot: "21" Sleeping None """#).await.unwrap();
    server.send("EndQueueShowRobot").await.unwrap();

    let bad = tokio::time::timeout(TIMEOUT, robots.recv()).await.unwrap().unwrap();
    assert!(matches!(bad.as_ref(), ArclEvent::Malformed(e) if e.category == Category::Robot));
    let end = tokio::time::timeout(TIMEOUT, robots.recv()).await.unwrap().unwrap();
    assert!(matches!(end.as_ref(), ArclEvent::Robot(_)));
    assert!(conn.is_logged_in());
}

#[tokio::test]
async fn server_close_moves_to_disconnected() {
    let (conn, server) = logged_in().await;
    let mut state = conn.subscribe_state();

    drop(server);

    tokio::time::timeout(TIMEOUT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(conn.write("stop").await, Err(Error::NotLoggedIn)));
}
