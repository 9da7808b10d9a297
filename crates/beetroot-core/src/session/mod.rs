//! The transfer session state machine.
//!
//! [`TransferSession`] owns every piece of mutable state for one peer
//! session: role, signaling state, the transport handle, the send pump, the
//! receive accumulator and finished files. It performs no I/O and never
//! waits. The host feeds it user commands, [`TransportEvent`]s, read
//! completions and the current time, and drains [`SessionEvent`]s.
//!
//! ## Signaling
//!
//! ```text
//! initiator: Idle → OfferCreated → AwaitingAnswer → Connected
//! responder: Idle → OfferReceived → AnswerCreated → Connected
//! ```
//!
//! `Connected` follows the transport's connection state, not the signaling
//! exchange. A failed connection, or one still down when the grace period
//! ends, moves the session to `Unrecoverable`.
//!
//! ## Sending
//!
//! [`TransferSession::poll_send`] is called whenever the session may make
//! progress. It sends metadata directly and asks the host to read chunks
//! through [`SendAction::Read`]; the host answers with
//! [`TransferSession::complete_read`]. Only one read is outstanding at a
//! time, so chunks go out strictly in order.

mod event;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub use event::{SessionEvent, SessionState};

use crate::config::{Config, NotificationPermission};
use crate::error::{Error, Result};
use crate::signaling::{encode_signal, parse_signal, Role, SdpKind};
use crate::transfer::{
    chunk_count, ChunkRequest, PumpAction, QueuedFile, ReceiveAccumulator, ReceiveOutcome,
    ReceivedFile, SendPump,
};
use crate::transport::{
    ChannelMessage, ChannelState, ConnectionState, Connector, PeerTransport, TransportEvent,
    TransportNotice,
};

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Bytes per binary chunk
    pub chunk_size: usize,
    /// Buffered bytes above which reads are held back
    pub buffered_high_water: u64,
    /// Delay before re-checking while held back
    pub throttle_backoff: Duration,
    /// How long a disconnected transport may take to come back
    pub disconnect_grace: Duration,
    /// Label of the outbound data channel
    pub channel_label: String,
    /// Marker of lines dropped from emitted signals
    pub strip_marker: String,
    /// Whether completion notifications may be shown
    pub notifications: NotificationPermission,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionSettings {
    /// Settings taken from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.transfer.chunk_size,
            buffered_high_water: config.transfer.buffered_high_water,
            throttle_backoff: config.transfer.throttle_backoff,
            disconnect_grace: config.connection.disconnect_grace,
            channel_label: config.signaling.channel_label.clone(),
            strip_marker: config.signaling.strip_marker.clone(),
            notifications: config.notifications.permission,
        }
    }
}

/// What the host should do to keep a send going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendAction {
    /// Nothing to do right now
    Idle,
    /// Read this chunk and pass it to [`TransferSession::complete_read`]
    Read(ChunkRequest),
    /// The channel is backed up; poll again after this delay
    Throttled(Duration),
}

/// One manual-signaling peer session.
pub struct TransferSession<C: Connector> {
    connector: C,
    settings: SessionSettings,
    transport: Option<C::Transport>,
    generation: u64,
    state: SessionState,
    role: Option<Role>,
    signal_emitted: bool,
    answer_applied: bool,
    disconnect_deadline: Option<Instant>,
    pump: SendPump,
    receiver: ReceiveAccumulator,
    received: Vec<ReceivedFile>,
    events: VecDeque<SessionEvent>,
}

impl<C: Connector> TransferSession<C> {
    /// Create an idle session.
    pub fn new(connector: C, settings: SessionSettings) -> Self {
        let pump = SendPump::new(settings.chunk_size);
        Self {
            connector,
            settings,
            transport: None,
            generation: 0,
            state: SessionState::Idle,
            role: None,
            signal_emitted: false,
            answer_applied: false,
            disconnect_deadline: None,
            pump,
            receiver: ReceiveAccumulator::new(),
            received: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Current signaling state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Local role, once one has been taken.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Whether a send is in flight.
    pub fn is_transfer_in_progress(&self) -> bool {
        self.pump.is_running()
    }

    /// Files in the send queue.
    pub fn queued_files(&self) -> &[QueuedFile] {
        self.pump.files()
    }

    /// The live transport, if any.
    pub fn transport(&self) -> Option<&C::Transport> {
        self.transport.as_ref()
    }

    /// Generation of the most recently created transport; 0 before the first.
    pub fn transport_generation(&self) -> u64 {
        self.generation
    }

    /// When [`handle_timeout`](Self::handle_timeout) should next be called.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.disconnect_deadline
    }

    /// Next pending event.
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// All pending events.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Files received since the last call.
    pub fn take_received(&mut self) -> Vec<ReceivedFile> {
        std::mem::take(&mut self.received)
    }

    /// Become the initiator: open a fresh transport and request an offer.
    ///
    /// Any previous transport is closed first.
    ///
    /// # Errors
    ///
    /// Fails in the `Unrecoverable` state, or if the transport cannot
    /// produce an offer.
    pub fn start_connection(&mut self) -> Result<()> {
        if self.state == SessionState::Unrecoverable {
            return Err(self.report(Error::ConnectionUnrecoverable, None));
        }

        self.close_transport();
        self.reset_signaling();
        self.pump.stop();
        self.receiver.reset();

        let mut transport = self.new_transport()?;
        let created = transport
            .open_channel(&self.settings.channel_label)
            .and_then(|()| transport.create_offer());
        if let Err(e) = created {
            transport.close();
            let status = format!("Error creating offer: {e}");
            return Err(self.report(e, Some(status)));
        }

        self.transport = Some(transport);
        self.role = Some(Role::Initiator);
        self.set_state(SessionState::OfferCreated);
        self.status("Creating offer...");
        Ok(())
    }

    /// Apply signal text pasted by the user.
    ///
    /// # Errors
    ///
    /// - [`Error::SignalingParse`] for malformed text
    /// - [`Error::SignalingState`] for a signal that does not fit the
    ///   current role or state
    ///
    /// Neither changes the session state.
    pub fn connect_peer(&mut self, text: &str) -> Result<()> {
        let descriptor = match parse_signal(text) {
            Ok(descriptor) => descriptor,
            Err(e) => return Err(self.reject(e)),
        };

        match descriptor.kind {
            SdpKind::Offer => {
                if self.state != SessionState::Idle {
                    return Err(self.reject(Error::SignalingState(format!(
                        "cannot accept an offer while {}",
                        self.state
                    ))));
                }

                let mut transport = self.new_transport()?;
                if let Err(e) = transport.accept_offer(&descriptor) {
                    transport.close();
                    let status = format!("Error handling offer: {e}");
                    return Err(self.report(e, Some(status)));
                }

                self.transport = Some(transport);
                self.role = Some(Role::Responder);
                self.set_state(SessionState::OfferReceived);
                self.status("Offer accepted. Preparing answer...");
            }
            SdpKind::Answer => {
                if self.role != Some(Role::Initiator)
                    || self.state != SessionState::AwaitingAnswer
                    || self.answer_applied
                {
                    return Err(self.reject(Error::SignalingState(format!(
                        "cannot accept an answer while {}",
                        self.state
                    ))));
                }

                let Some(transport) = self.transport.as_mut() else {
                    return Err(self.report(Error::NotConnected, None));
                };
                if let Err(e) = transport.accept_answer(&descriptor) {
                    let status = format!("Error setting answer: {e}");
                    return Err(self.report(e, Some(status)));
                }

                self.answer_applied = true;
                self.status("Answer accepted. Waiting for the peer to connect...");
            }
        }

        Ok(())
    }

    /// React to a notification tagged with its transport's generation.
    ///
    /// Notifications from a transport that has been replaced or closed are
    /// dropped.
    pub fn handle_transport_notice(&mut self, notice: TransportNotice, now: Instant) {
        if notice.generation != self.generation {
            tracing::debug!(
                "Dropping event from transport {} (current {}): {:?}",
                notice.generation,
                self.generation,
                notice.event
            );
            return;
        }
        self.handle_transport_event(notice.event, now);
    }

    /// React to a notification from the current transport.
    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        if self.transport.is_none() {
            tracing::debug!("Ignoring transport event without a transport: {event:?}");
            return;
        }

        match event {
            TransportEvent::GatheringComplete => self.on_gathering_complete(),
            TransportEvent::ConnectionStateChanged(state) => {
                self.on_connection_state(state, now);
            }
            TransportEvent::ChannelOpen => {
                tracing::info!("Data channel opened");
                self.pump.stop();
                self.status("Connected! Select a file to send or wait to receive.");
            }
            TransportEvent::ChannelClose => {
                tracing::info!("Data channel closed");
                self.pump.cancel();
                self.status("Connection closed. Start a new connection to transfer files.");
            }
            TransportEvent::ChannelError(detail) => {
                self.pump.stop();
                let status = format!("Data channel error: {detail}");
                self.report(Error::ChannelError(detail), Some(status));
            }
            TransportEvent::Message(ChannelMessage::Text(text)) => self.on_text(&text),
            TransportEvent::Message(ChannelMessage::Binary(data)) => self.on_binary(data),
        }
    }

    /// Check the disconnect grace period.
    ///
    /// If the deadline has passed and the transport is still disconnected,
    /// the session becomes `Unrecoverable`.
    pub fn handle_timeout(&mut self, now: Instant) {
        let Some(deadline) = self.disconnect_deadline else {
            return;
        };
        if now < deadline {
            return;
        }
        self.disconnect_deadline = None;

        let still_down = self
            .transport
            .as_ref()
            .is_some_and(|t| t.connection_state() == ConnectionState::Disconnected);
        if still_down {
            tracing::warn!("Connection did not recover within the grace period");
            self.pump.stop();
            self.set_state(SessionState::Unrecoverable);
            self.report(
                Error::ConnectionUnrecoverable,
                Some("Unable to reconnect. Please start a new connection.".to_string()),
            );
        }
    }

    /// Replace the send queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransferInProgress`] while a send is running.
    pub fn queue_files(&mut self, files: Vec<QueuedFile>) -> Result<()> {
        if self.pump.is_running() {
            return Err(self.report(
                Error::TransferInProgress,
                Some("Transfer in progress. Please wait before adding more files.".to_string()),
            ));
        }

        let count = files.len();
        self.pump.set_files(files);
        self.status(format!("{count} file(s) ready to send."));
        Ok(())
    }

    /// Start sending the queue.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the data channel is not open
    /// - [`Error::NoFilesQueued`] if the queue is empty
    /// - [`Error::TransferInProgress`] if a send is already running
    pub fn start_transfer(&mut self) -> Result<()> {
        if self.channel_state() != ChannelState::Open {
            return Err(self.report(
                Error::NotConnected,
                Some("Connection not ready. Please connect to a peer first.".to_string()),
            ));
        }
        if self.pump.is_empty() {
            return Err(self.report(
                Error::NoFilesQueued,
                Some("No files selected. Please add files to transfer.".to_string()),
            ));
        }
        if self.pump.is_running() {
            return Err(self.report(
                Error::TransferInProgress,
                Some("A transfer is already in progress. Please wait.".to_string()),
            ));
        }

        tracing::info!("Starting transfer of {} file(s)", self.pump.files().len());
        self.pump.start();
        Ok(())
    }

    /// Advance the send as far as possible without I/O.
    ///
    /// Metadata messages are sent immediately. Returns the chunk the host
    /// must read next, a back-off delay when the channel is backed up, or
    /// `Idle` when nothing can happen until another input arrives.
    pub fn poll_send(&mut self) -> SendAction {
        loop {
            if !self.pump.is_running() {
                return SendAction::Idle;
            }

            if self.pump.wants_read() {
                let buffered = self.transport.as_ref().map_or(0, PeerTransport::buffered_amount);
                if buffered > self.settings.buffered_high_water {
                    tracing::debug!("Channel has {buffered} bytes buffered, backing off");
                    return SendAction::Throttled(self.settings.throttle_backoff);
                }
            }

            match self.pump.next_action() {
                PumpAction::Idle => return SendAction::Idle,
                PumpAction::Read(request) => return SendAction::Read(request),
                PumpAction::Metadata {
                    file_index,
                    metadata,
                } => {
                    let sent = metadata
                        .to_json()
                        .and_then(|json| self.send_message(ChannelMessage::Text(json)));
                    if let Err(e) = sent {
                        self.abort_send(e);
                        return SendAction::Idle;
                    }

                    tracing::debug!(
                        "Sending '{}' in {} chunk(s)",
                        metadata.name,
                        chunk_count(metadata.size, self.settings.chunk_size)
                    );
                    self.status(format!(
                        "Sending {} ({:.2} MB)...",
                        metadata.name,
                        metadata.size_mb()
                    ));
                    self.events.push_back(SessionEvent::SendStarted {
                        file_index,
                        name: metadata.name.clone(),
                        size: metadata.size,
                    });
                    let milestones = self.pump.record_sent(0);
                    self.emit_send_milestones(&metadata.name, &milestones);
                }
                PumpAction::FileSent { file_index, name } => {
                    tracing::info!("Sent {name}");
                    self.status(format!("File sent: {name}"));
                    self.events
                        .push_back(SessionEvent::FileSent { file_index, name });
                }
                PumpAction::AllSent => {
                    tracing::info!("All queued files sent");
                    self.status("All files sent successfully!");
                    self.events.push_back(SessionEvent::AllFilesSent);
                    return SendAction::Idle;
                }
            }
        }
    }

    /// Deliver the result of a chunk read requested by [`poll_send`](Self::poll_send).
    ///
    /// Completions for abandoned reads are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the read failed or came back short,
    /// or the channel's error if the chunk could not be sent. Either stops
    /// the send.
    pub fn complete_read(
        &mut self,
        ticket: u64,
        result: std::result::Result<Vec<u8>, std::io::Error>,
    ) -> Result<()> {
        let Some(request) = self.pump.take_read(ticket) else {
            tracing::debug!("Discarding completion of abandoned read {ticket}");
            return Ok(());
        };

        let name = self
            .pump
            .files()
            .get(request.file_index)
            .map_or_else(String::new, |file| file.name.clone());

        let data = match result {
            Ok(data) if data.len() == request.len => data,
            Ok(data) => {
                return Err(self.fail_read(
                    name,
                    format!(
                        "expected {} bytes at offset {}, got {}",
                        request.len,
                        request.offset,
                        data.len()
                    ),
                ));
            }
            Err(e) => return Err(self.fail_read(name, e.to_string())),
        };

        let len = data.len() as u64;
        if let Err(e) = self.send_message(ChannelMessage::Binary(data)) {
            return Err(self.abort_send(e));
        }
        tracing::debug!("Sent {len} bytes of {name} at offset {}", request.offset);

        let milestones = self.pump.record_sent(len);
        let size = self
            .pump
            .files()
            .get(request.file_index)
            .map_or(0, |file| file.size);
        self.events.push_back(SessionEvent::SendProgress {
            file_index: request.file_index,
            sent: self.pump.offset(),
            size,
        });
        self.emit_send_milestones(&name, &milestones);
        Ok(())
    }

    /// Stop the local send and empty the queue. No message goes to the peer.
    ///
    /// Returns whether a send was running.
    pub fn cancel_transfer(&mut self) -> bool {
        if !self.pump.is_running() {
            return false;
        }

        tracing::info!("Transfer cancelled");
        self.pump.cancel();
        self.status("Transfer cancelled.");
        self.events.push_back(SessionEvent::TransferCancelled);
        true
    }

    /// Report connection and channel state; true when both are usable.
    pub fn check_connection_status(&mut self) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            self.status("No connection established. Please start a connection first.");
            return false;
        };

        let connection = transport.connection_state();
        let channel = transport.channel_state();
        self.status(format!(
            "Connection state: {connection}, Data channel: {channel}"
        ));
        connection == ConnectionState::Connected && channel == ChannelState::Open
    }

    /// Release everything and return to `Idle`. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        self.close_transport();
        self.reset_signaling();
        self.pump.cancel();
        self.receiver.reset();
        self.received.clear();
        self.set_state(SessionState::Idle);
        self.status("Connection cleaned up. Ready to start a new session.");
    }

    fn on_gathering_complete(&mut self) {
        if self.signal_emitted {
            return;
        }

        let (next, kind, prompt) = match self.state {
            SessionState::OfferCreated => (
                SessionState::AwaitingAnswer,
                SdpKind::Offer,
                "Copy this offer and send it to your peer.",
            ),
            SessionState::OfferReceived => (
                SessionState::AnswerCreated,
                SdpKind::Answer,
                "Copy this answer and send it back to the initiator.",
            ),
            other => {
                tracing::debug!("Ignoring candidate completion while {other}");
                return;
            }
        };

        let Some(descriptor) = self.transport.as_ref().and_then(PeerTransport::local_description)
        else {
            self.report(
                Error::TransportError("no local description after gathering".to_string()),
                None,
            );
            return;
        };

        match encode_signal(&descriptor, &self.settings.strip_marker) {
            Ok(text) => {
                self.signal_emitted = true;
                self.set_state(next);
                self.events.push_back(SessionEvent::SignalReady { kind, text });
                self.status(prompt);
            }
            Err(e) => {
                self.report(e, None);
            }
        }
    }

    fn on_connection_state(&mut self, state: ConnectionState, now: Instant) {
        if matches!(self.state, SessionState::Idle | SessionState::Unrecoverable) {
            tracing::debug!("Ignoring connection state {state} while {}", self.state);
            return;
        }

        match state {
            ConnectionState::Connected => {
                self.disconnect_deadline = None;
                self.set_state(SessionState::Connected);
                self.status("Connection established! Ready to transfer files.");
            }
            ConnectionState::Disconnected => {
                tracing::warn!("Connection lost");
                self.disconnect_deadline = Some(now + self.settings.disconnect_grace);
                self.report(
                    Error::ConnectionLost,
                    Some("Connection lost. Attempting to reconnect...".to_string()),
                );
            }
            ConnectionState::Failed => {
                tracing::warn!("Connection failed");
                self.disconnect_deadline = None;
                self.pump.stop();
                self.set_state(SessionState::Unrecoverable);
                self.report(
                    Error::ConnectionUnrecoverable,
                    Some("Connection failed. Please try again or check your network.".to_string()),
                );
            }
            other => tracing::debug!("Transport connection state: {other}"),
        }
    }

    fn on_text(&mut self, text: &str) {
        match self.receiver.on_text(text) {
            Ok(ReceiveOutcome::Started(metadata)) => {
                tracing::info!("Receiving {} ({} bytes)", metadata.name, metadata.size);
                self.status(format!(
                    "Receiving {} ({:.2} MB)...",
                    metadata.name,
                    metadata.size_mb()
                ));
                self.events.push_back(SessionEvent::ReceiveStarted {
                    name: metadata.name,
                    size: metadata.size,
                });
                if let Some(file) = self.receiver.try_complete() {
                    self.finish_receive(file);
                }
            }
            Ok(_) => {}
            Err(e) => self.fail_receive(e),
        }
    }

    fn on_binary(&mut self, data: Vec<u8>) {
        match self.receiver.on_binary(data) {
            Ok(ReceiveOutcome::Progress {
                name,
                received,
                size,
                milestones,
            }) => {
                self.events
                    .push_back(SessionEvent::ReceiveProgress { received, size });
                self.emit_receive_milestones(&name, &milestones);
            }
            Ok(ReceiveOutcome::Completed { file, milestones }) => {
                let size = file.size();
                self.events.push_back(SessionEvent::ReceiveProgress {
                    received: size,
                    size,
                });
                self.emit_receive_milestones(&file.name, &milestones);
                self.finish_receive(file);
            }
            Ok(_) => {}
            Err(e) => self.fail_receive(e),
        }
    }

    fn finish_receive(&mut self, file: ReceivedFile) {
        tracing::info!("Received {} ({} bytes)", file.name, file.size());
        self.status("File received successfully!");
        self.events.push_back(SessionEvent::FileReceived {
            name: file.name.clone(),
            size: file.size(),
        });
        if self.settings.notifications.is_granted() {
            self.events.push_back(SessionEvent::Notify {
                title: "File Transfer Complete".to_string(),
                body: format!("{} has been received successfully!", file.name),
            });
        }
        self.received.push(file);
    }

    fn fail_receive(&mut self, error: Error) {
        self.pump.stop();
        let status = format!("Error processing data: {error}");
        self.report(error, Some(status));
    }

    fn fail_read(&mut self, file: String, reason: String) -> Error {
        self.pump.stop();
        let status = format!("Error reading file: {reason}");
        self.report(Error::FileRead { file, reason }, Some(status))
    }

    fn abort_send(&mut self, error: Error) -> Error {
        self.pump.stop();
        let status = format!("Data channel error: {error}");
        self.report(error, Some(status))
    }

    fn send_message(&mut self, message: ChannelMessage) -> Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.send(message),
            None => Err(Error::NotConnected),
        }
    }

    fn emit_send_milestones(&mut self, name: &str, milestones: &[u8]) {
        for &percent in milestones {
            self.status(format!("Sending {name}: {percent}% complete"));
            self.events.push_back(SessionEvent::SendMilestone {
                name: name.to_string(),
                percent,
            });
        }
    }

    fn emit_receive_milestones(&mut self, name: &str, milestones: &[u8]) {
        for &percent in milestones {
            self.status(format!("Receiving {name}: {percent}% complete"));
            self.events.push_back(SessionEvent::ReceiveMilestone {
                name: name.to_string(),
                percent,
            });
        }
    }

    fn channel_state(&self) -> ChannelState {
        self.transport
            .as_ref()
            .map_or(ChannelState::Closed, PeerTransport::channel_state)
    }

    fn new_transport(&mut self) -> Result<C::Transport> {
        self.generation += 1;
        self.connector.connect(self.generation)
    }

    fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    fn reset_signaling(&mut self) {
        self.role = None;
        self.signal_emitted = false;
        self.answer_applied = false;
        self.disconnect_deadline = None;
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::info!("Session state: {} -> {state}", self.state);
            self.state = state;
            self.events.push_back(SessionEvent::StateChanged(state));
        }
    }

    fn status(&mut self, text: impl Into<String>) {
        self.events.push_back(SessionEvent::status(text));
    }

    /// Record a rejected signal; the state is left alone.
    fn reject(&mut self, error: Error) -> Error {
        tracing::warn!("Rejected signal: {error}");
        let status = match error {
            Error::SignalingParse(_) => "Invalid signal data format. Please check and try again.",
            _ => "Invalid signal data or wrong connection state.",
        };
        self.report(error, Some(status.to_string()))
    }

    /// Push a status line (if any) and an error event, handing the error back.
    fn report(&mut self, error: Error, status: Option<String>) -> Error {
        if let Some(status) = status {
            self.status(status);
        }
        self.events.push_back(SessionEvent::error(&error));
        error
    }
}
