// ── Protocol connection ──
//
// Owns one ARCL session: TCP connect, password handshake, a background
// reader that classifies every line onto the `EventBus`, and a shared
// writer. Cheaply cloneable; all clones drive the same session.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{ArclCodec, PASSWORD_PROMPT};
use crate::command::Command;
use crate::dispatch::{ArclEvent, Category, EventBus};
use crate::error::Error;
use crate::settings::ConnectionSettings;

const LOGIN_COMPLETE: &str = "End of commands";

// ── ConnectionState ──────────────────────────────────────────────────

/// Handshake and session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingPassword,
    AwaitingLoginConfirmation,
    LoggedIn,
    Failed,
}

impl ConnectionState {
    pub fn is_logged_in(self) -> bool {
        self == Self::LoggedIn
    }
}

// ── Transport plumbing ───────────────────────────────────────────────

trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

type Lines = Framed<Box<dyn Transport>, ArclCodec>;
type LineSink = SplitSink<Lines, String>;
type LineStream = SplitStream<Lines>;

struct Session {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

struct ConnectionInner {
    state: watch::Sender<ConnectionState>,
    bus: EventBus,
    writer: Mutex<Option<LineSink>>,
    session: Mutex<Option<Session>>,
}

impl ConnectionInner {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::info!(state = %next, "connection state changed");
        }
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Handle to one ARCL session.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ConnectionInner {
                state,
                bus: EventBus::new(),
                writer: Mutex::new(None),
                session: Mutex::new(None),
            }),
        }
    }

    /// Open a TCP connection and log in. `timeout` bounds the TCP connect
    /// and, separately, the whole handshake.
    pub async fn connect(
        &self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> Result<(), Error> {
        self.disconnect().await;
        self.inner.set_state(ConnectionState::Connecting);

        let addr = settings.socket_addr();
        tracing::debug!(%addr, "connecting");
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.fail(e.into())),
            Err(_) => return Err(self.fail(Error::ConnectTimeout(timeout))),
        };
        if let Err(e) = stream.set_nodelay(true) {
            return Err(self.fail(e.into()));
        }

        self.handshake(stream, &settings.password, timeout).await
    }

    /// Log in over an already-open stream and start the reader.
    pub async fn attach<S>(
        &self,
        stream: S,
        password: &SecretString,
        timeout: Duration,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.disconnect().await;
        self.inner.set_state(ConnectionState::Connecting);
        self.handshake(stream, password, timeout).await
    }

    async fn handshake<S>(
        &self,
        stream: S,
        password: &SecretString,
        timeout: Duration,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn Transport> = Box::new(stream);
        let mut lines = Framed::new(boxed, ArclCodec::new());
        let deadline = Instant::now() + timeout;

        if let Err(e) = self.login(&mut lines, password, deadline).await {
            // Dropping `lines` closes the transport.
            return Err(self.fail(e));
        }

        let (sink, stream) = lines.split();
        *self.inner.writer.lock().await = Some(sink);

        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&self.inner), cancel.clone()));
        *self.inner.session.lock().await = Some(Session { cancel, reader });

        self.inner.set_state(ConnectionState::LoggedIn);
        Ok(())
    }

    async fn login(
        &self,
        lines: &mut Lines,
        password: &SecretString,
        deadline: Instant,
    ) -> Result<(), Error> {
        self.inner.set_state(ConnectionState::AwaitingPassword);
        loop {
            let line = next_line(lines, deadline, "waiting for the password prompt").await?;
            if line
                .to_ascii_lowercase()
                .contains(&PASSWORD_PROMPT.to_ascii_lowercase())
            {
                break;
            }
        }

        lines.send(password.expose_secret().to_owned()).await?;
        self.inner.set_state(ConnectionState::AwaitingLoginConfirmation);

        let mut last = String::new();
        loop {
            match next_line(lines, deadline, "waiting for login confirmation").await {
                Ok(line) if line.contains(LOGIN_COMPLETE) => return Ok(()),
                Ok(line) => last = line,
                Err(Error::ConnectionClosed) => {
                    return Err(Error::LoginRejected {
                        message: if last.is_empty() {
                            "connection closed after password".into()
                        } else {
                            last
                        },
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fail(&self, error: Error) -> Error {
        tracing::warn!(error = %error, "connection failed");
        self.inner.set_state(ConnectionState::Failed);
        error
    }

    /// Stop the reader, close the transport and go `Disconnected`.
    pub async fn disconnect(&self) {
        let session = self.inner.session.lock().await.take();
        if let Some(session) = session {
            session.cancel.cancel();
            let _ = session.reader.await;
        }
        if let Some(mut sink) = self.inner.writer.lock().await.take() {
            let _ = sink.close().await;
        }
        if self.state() != ConnectionState::Failed {
            self.inner.set_state(ConnectionState::Disconnected);
        }
    }

    /// Write one raw line. Success means the bytes were handed to the
    /// transport, not that the server acted on them.
    pub async fn write(&self, line: &str) -> Result<(), Error> {
        if !self.state().is_logged_in() {
            return Err(Error::NotLoggedIn);
        }
        let mut writer = self.inner.writer.lock().await;
        let sink = writer.as_mut().ok_or(Error::NotLoggedIn)?;
        tracing::trace!(command = line, "->");
        sink.send(line.to_owned()).await.inspect_err(|e| {
            tracing::warn!(error = %e, "write failed");
        })
    }

    pub async fn send(&self, command: &Command) -> Result<(), Error> {
        tracing::debug!(command = command.name(), "sending command");
        self.write(&command.to_string()).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state().is_logged_in()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self, category: Category) -> broadcast::Receiver<Arc<ArclEvent>> {
        self.inner.bus.subscribe(category)
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }
}

async fn next_line(
    lines: &mut Lines,
    deadline: Instant,
    stage: &'static str,
) -> Result<String, Error> {
    match tokio::time::timeout_at(deadline, lines.next()).await {
        Err(_) => Err(Error::LoginTimeout { stage }),
        Ok(None) => Err(Error::ConnectionClosed),
        Ok(Some(line)) => {
            let line = line?;
            tracing::trace!(line = %line, "<- (login)");
            Ok(line)
        }
    }
}

// ── Reader task ──────────────────────────────────────────────────────

async fn read_loop(mut stream: LineStream, inner: Arc<ConnectionInner>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(line)) => {
                    tracing::trace!(line = %line, "<-");
                    inner.bus.dispatch(&line);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "read failed");
                    break;
                }
                None => {
                    tracing::info!("server closed the connection");
                    break;
                }
            }
        }
    }

    // Lost the transport without being asked to stop.
    inner.writer.lock().await.take();
    inner.set_state(ConnectionState::Disconnected);
}
