// End-to-end `Engine` lifecycle against a loopback ARCL peer.
#![allow(clippy::unwrap_used)]

use std::net::Ipv4Addr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LinesCodec};

use arcl_api::{Command, ConnectionSettings, ConnectionState};
use arcl_core::{CoreError, Engine, EngineConfig, SyncState};

// ── Helpers ─────────────────────────────────────────────────────────

const TIMEOUT: Duration = Duration::from_secs(5);

/// Accept one client, log it in, and answer every poll with an empty
/// but complete reply.
async fn fake_server() -> (u16, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = Framed::new(socket, LinesCodec::new());
        server.send("Enter password:").await.unwrap();
        assert_eq!(server.next().await.unwrap().unwrap(), "adept");
        server.send("End of commands").await.unwrap();

        while let Some(Ok(line)) = server.next().await {
            let reply: &[&str] = match line.as_str() {
                "QueueShow" => &["EndQueueShow"],
                "queueShowRobot" => &["EndQueueShowRobot"],
                "onelinestatus" => &["Status: Parked StateOfCharge: 99.0 Location: 0 0 0"],
                "rangeDeviceList" => &["EndOfRangeDeviceList"],
                "extIODump" => &["EndExtIODump"],
                "getconfigsectionlist" => &["GetConfigSectionList: General", "EndOfGetConfigSectionList"],
                _ => &[],
            };
            let _ = tx.send(line);
            for out in reply {
                if server.send(*out).await.is_err() {
                    return;
                }
            }
        }
    });

    (port, rx)
}

fn config(port: u16) -> EngineConfig {
    let settings =
        ConnectionSettings::new(Ipv4Addr::LOCALHOST, port, SecretString::from("adept".to_owned()))
            .unwrap();
    let mut config = EngineConfig::new(settings);
    config.timeout = TIMEOUT;
    config.robot_poll_interval = Duration::from_millis(50);
    config.status_poll_interval = Duration::from_millis(50);
    config.range_poll_interval = Duration::from_millis(50);
    config.extio_poll_interval = Duration::from_millis(50);
    config
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn start_all_syncs_every_manager_and_shutdown_stops_them() {
    let (port, mut written) = fake_server().await;
    let engine = Engine::new(config(port));

    engine.connect().await.unwrap();
    assert_eq!(engine.connection().state(), ConnectionState::LoggedIn);

    engine.start_all().await.unwrap();
    assert!(engine.jobs().wait_for_sync(TIMEOUT).await);
    assert!(engine.robots().wait_for_sync(TIMEOUT).await);
    assert!(engine.status().wait_for_sync(TIMEOUT).await);
    assert!(engine.range_devices().wait_for_sync(TIMEOUT).await);
    assert!(engine.extio().wait_for_sync(TIMEOUT).await);
    assert!(engine.config_sections().wait_for_sync(TIMEOUT).await);

    assert_eq!(engine.status().snapshot().unwrap().status, "Parked");
    assert_eq!(engine.config_sections().section_names().await, vec!["General"]);

    engine.send(&Command::Dock).await.unwrap();
    tokio::time::timeout(TIMEOUT, async {
        while let Some(line) = written.recv().await {
            if line == "dock" {
                break;
            }
        }
    })
    .await
    .unwrap();

    engine.shutdown().await;
    assert_eq!(engine.connection().state(), ConnectionState::Disconnected);
    assert!(!engine.jobs().is_running());
    assert!(!engine.robots().is_running());
    assert!(!engine.extio().is_running());
    assert_eq!(engine.robots().sync_status().state, SyncState::Idle);
}

#[tokio::test]
async fn start_all_requires_a_login() {
    let engine = Engine::new(config(9));
    assert!(matches!(engine.start_all().await, Err(CoreError::NotConnected)));
    assert!(!engine.jobs().is_running());
}
