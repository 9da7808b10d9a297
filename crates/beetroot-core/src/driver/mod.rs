//! Async driver for a [`TransferSession`] over the TCP transport.
//!
//! The driver owns the session and runs it on a single tokio task, which
//! keeps every session mutation on one logical actor. It selects over:
//!
//! - requests from [`SessionHandle`]s
//! - transport events
//! - completed chunk reads (each read runs on its own task)
//! - the throttle back-off timer
//! - the disconnect grace deadline
//!
//! Session events are re-published on a broadcast channel. Received files
//! are written to the output directory before their events go out.

use std::path::PathBuf;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::file;
use crate::session::{SendAction, SessionEvent, SessionSettings, TransferSession};
use crate::transfer::ChunkRequest;
use crate::transport::tcp::TcpConnector;
use crate::transport::TransportNotice;

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 1024;

/// Capacity of the request channel.
const REQUEST_CAPACITY: usize = 32;

/// Shows completion notifications to the user.
pub trait Notifier: Send + Sync {
    /// Show a notification.
    fn notify(&self, title: &str, body: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!("{title}: {body}");
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Request {
    StartConnection(Reply<()>),
    ConnectPeer(String, Reply<()>),
    QueueFiles(Vec<PathBuf>, Reply<()>),
    StartTransfer(Reply<()>),
    CancelTransfer(Reply<bool>),
    CheckStatus(Reply<bool>),
    Cleanup(Reply<()>),
    Shutdown,
}

struct ReadCompletion {
    ticket: u64,
    result: std::io::Result<Vec<u8>>,
}

/// Cloneable handle for talking to a running [`SessionDriver`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::StartConnection(_) => "StartConnection",
            Self::ConnectPeer(..) => "ConnectPeer",
            Self::QueueFiles(..) => "QueueFiles",
            Self::StartTransfer(_) => "StartTransfer",
            Self::CancelTransfer(_) => "CancelTransfer",
            Self::CheckStatus(_) => "CheckStatus",
            Self::Cleanup(_) => "Cleanup",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Become the initiator and produce an offer.
    pub async fn start_connection(&self) -> Result<()> {
        self.call(Request::StartConnection).await
    }

    /// Apply pasted signal text.
    pub async fn connect_peer(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.call(|reply| Request::ConnectPeer(text, reply)).await
    }

    /// Replace the send queue with these files.
    pub async fn queue_files(&self, paths: Vec<PathBuf>) -> Result<()> {
        self.call(|reply| Request::QueueFiles(paths, reply)).await
    }

    /// Start sending the queue.
    pub async fn start_transfer(&self) -> Result<()> {
        self.call(Request::StartTransfer).await
    }

    /// Cancel the local send; returns whether one was running.
    pub async fn cancel_transfer(&self) -> Result<bool> {
        self.call(Request::CancelTransfer).await
    }

    /// Report connection status; true when the channel is usable.
    pub async fn check_status(&self) -> Result<bool> {
        self.call(Request::CheckStatus).await
    }

    /// Tear the session down and return to idle.
    pub async fn cleanup(&self) -> Result<()> {
        self.call(Request::Cleanup).await
    }

    /// Stop the driver.
    pub async fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown).await;
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .await
            .map_err(|_| Error::Internal("session driver has stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("session driver dropped the request".to_string()))?
    }
}

/// Runs one [`TransferSession`] on tokio.
pub struct SessionDriver {
    session: TransferSession<TcpConnector>,
    transport_events: mpsc::UnboundedReceiver<TransportNotice>,
    requests: mpsc::Receiver<Request>,
    events: broadcast::Sender<SessionEvent>,
    reads_tx: mpsc::UnboundedSender<ReadCompletion>,
    reads_rx: mpsc::UnboundedReceiver<ReadCompletion>,
    throttled_until: Option<Instant>,
    output_dir: PathBuf,
    notifier: Box<dyn Notifier>,
}

impl SessionDriver {
    /// Create a driver and a handle to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &Config, output_dir: PathBuf) -> Result<(Self, SessionHandle)> {
        config.validate()?;

        let (transport_tx, transport_events) = mpsc::unbounded_channel();
        let connector = TcpConnector::new(
            config.connection.clone(),
            config.general.device_name.clone(),
            transport_tx,
        );
        let session = TransferSession::new(connector, SessionSettings::from_config(config));

        let (requests_tx, requests) = mpsc::channel(REQUEST_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (reads_tx, reads_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            requests: requests_tx,
            events: events.clone(),
        };

        let driver = Self {
            session,
            transport_events,
            requests,
            events,
            reads_tx,
            reads_rx,
            throttled_until: None,
            output_dir,
            notifier: Box::new(LogNotifier),
        };

        Ok((driver, handle))
    }

    /// Use a different notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Create a driver and run it on a new task.
    pub fn spawn(config: &Config, output_dir: PathBuf) -> Result<(JoinHandle<()>, SessionHandle)> {
        let (driver, handle) = Self::new(config, output_dir)?;
        Ok((tokio::spawn(driver.run()), handle))
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("Session driver started");

        loop {
            self.drive_send();
            self.flush_events().await;

            let grace = self.session.next_deadline().map(Instant::from_std);
            let throttle = self.throttled_until;

            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else { break };
                    if !self.handle_request(request).await {
                        break;
                    }
                }
                Some(notice) = self.transport_events.recv() => {
                    self.session
                        .handle_transport_notice(notice, Instant::now().into_std());
                }
                Some(done) = self.reads_rx.recv() => {
                    if let Err(e) = self.session.complete_read(done.ticket, done.result) {
                        tracing::warn!("Send stopped: {e}");
                    }
                }
                () = sleep_until(throttle), if throttle.is_some() => {
                    self.throttled_until = None;
                }
                () = sleep_until(grace), if grace.is_some() => {
                    self.session.handle_timeout(Instant::now().into_std());
                }
            }
        }

        self.session.cleanup();
        self.flush_events().await;
        tracing::debug!("Session driver stopped");
    }

    /// Returns false when the driver should stop.
    async fn handle_request(&mut self, request: Request) -> bool {
        tracing::debug!("Handling {request:?}");
        match request {
            Request::StartConnection(reply) => {
                let _ = reply.send(self.session.start_connection());
            }
            Request::ConnectPeer(text, reply) => {
                let _ = reply.send(self.session.connect_peer(&text));
            }
            Request::QueueFiles(paths, reply) => {
                let result = match file::queue_from_paths(&paths).await {
                    Ok(files) => self.session.queue_files(files),
                    Err(e) => {
                        let _ = self.events.send(SessionEvent::error(&e));
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            Request::StartTransfer(reply) => {
                self.throttled_until = None;
                let _ = reply.send(self.session.start_transfer());
            }
            Request::CancelTransfer(reply) => {
                self.throttled_until = None;
                let _ = reply.send(Ok(self.session.cancel_transfer()));
            }
            Request::CheckStatus(reply) => {
                let _ = reply.send(Ok(self.session.check_connection_status()));
            }
            Request::Cleanup(reply) => {
                self.throttled_until = None;
                self.session.cleanup();
                let _ = reply.send(Ok(()));
            }
            Request::Shutdown => return false,
        }
        true
    }

    fn drive_send(&mut self) {
        if self.throttled_until.is_some() {
            return;
        }

        match self.session.poll_send() {
            SendAction::Idle => {}
            SendAction::Read(request) => self.spawn_read(request),
            SendAction::Throttled(delay) => {
                self.throttled_until = Some(Instant::now() + delay);
            }
        }
    }

    fn spawn_read(&self, request: ChunkRequest) {
        let reads = self.reads_tx.clone();
        tokio::spawn(async move {
            let result = file::read_chunk(&request.path, request.offset, request.len).await;
            let _ = reads.send(ReadCompletion {
                ticket: request.ticket,
                result,
            });
        });
    }

    async fn flush_events(&mut self) {
        while let Some(event) = self.session.poll_event() {
            match &event {
                SessionEvent::FileReceived { .. } => {
                    let _ = self.events.send(event);
                    self.save_received().await;
                    continue;
                }
                SessionEvent::Notify { title, body } => self.notifier.notify(title, body),
                _ => {}
            }
            let _ = self.events.send(event);
        }
    }

    async fn save_received(&mut self) {
        for received in self.session.take_received() {
            match file::save_received(&self.output_dir, &received.name, &received.data).await {
                Ok(path) => {
                    tracing::info!("Saved {} to {}", received.name, path.display());
                    let _ = self.events.send(SessionEvent::status(format!(
                        "Saved {} ({}) to {}",
                        received.name,
                        file::format_size(received.size()),
                        path.display()
                    )));
                }
                Err(e) => {
                    tracing::error!("Failed to save {}: {e}", received.name);
                    let _ = self.events.send(SessionEvent::error(&e));
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
