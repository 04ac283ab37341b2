use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use rpplink_frame::{
    segment_size_for, AutorunList, MemAddBlock, MemList, MemSpace, Message, MessageType,
    SyncParameters, ThreadList, ThreadPrint, ThreadStart, DEFAULT_SEGMENT_SIZE, MODULE_MEMSPACE,
};
use tracing::{debug, info, warn};

use crate::channel::{Channel, MessageHandler, MessageSender};
use crate::error::{Result, SessionError};
use crate::image::ImageBuilder;

/// Word size assumed for print output before the target has synced.
const DEFAULT_WORD_SIZE: usize = 4;

/// Timeout and retry policy for blocking session calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for an answer to one transmission. Default: 3 s.
    pub timeout: Duration,
    /// Transmissions per operation before giving up. Default: 3.
    pub comm_retries: u32,
    /// Upper bound on a single condition wait. Default: 50 ms.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            comm_retries: 3,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynchronized,
    Synchronizing,
    /// Our Sync was acknowledged and the target's Sync arrived.
    Synchronized,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unsynchronized => "unsynchronized",
            Self::Synchronizing => "synchronizing",
            Self::Synchronized => "synchronized",
        })
    }
}

/// One completed line of target print output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub thread: u64,
    pub text: String,
}

#[derive(Debug, Default)]
struct State {
    parameters: Option<SyncParameters>,
    synchronized_incoming: bool,
    synchronized_outgoing: bool,
    last_message: Option<Message>,
    last_message_at: Option<Instant>,
    thread_list: Option<Vec<u64>>,
    mem_list: Option<BTreeMap<u8, MemSpace>>,
    autorun_list: Option<Vec<String>>,
    print_buffer: Vec<u8>,
    output: VecDeque<OutputLine>,
    broken: Option<String>,
}

impl State {
    fn word_size(&self) -> usize {
        match self.parameters {
            Some(params) if params.word_size > 0 => params.word_size as usize,
            _ => DEFAULT_WORD_SIZE,
        }
    }

    fn last_message_text(&self) -> Option<String> {
        self.last_message.as_ref().map(ToString::to_string)
    }
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
    sender: MessageSender,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut *state);
        drop(state);
        self.changed.notify_all();
        result
    }

    /// Replies from the reader thread bypass the outstanding-message gate.
    fn reply(&self, message: &Message) {
        if let Err(err) = self.sender.send_message(message) {
            warn!(%message, %err, "failed to send reply");
        }
    }
}

/// Applies incoming messages to the session state.
struct IncomingHandler {
    shared: Arc<Shared>,
}

impl MessageHandler for IncomingHandler {
    fn handle_message(&self, message: &Message) {
        match message {
            Message::Sync(params) => self.on_sync(*params),
            Message::Ack => self.on_ack(),
            Message::Nack => self.on_nack(),
            Message::ThreadPrintItem(print) | Message::ThreadPrintExpr(print) => {
                self.on_print(print)
            }
            Message::ThreadList(list) => self.on_thread_list(list),
            Message::MemList(list) => self.on_mem_list(list),
            Message::AutorunList(list) => self.on_autorun_list(list),
            Message::Defective => warn!("dropped defective message"),
            other => debug!(message = %other, "ignoring unexpected message"),
        }
    }

    fn channel_broken(&self, reason: &str) {
        self.shared
            .update(|state| state.broken = Some(reason.to_string()));
    }
}

impl IncomingHandler {
    fn on_sync(&self, params: SyncParameters) {
        debug!(
            reset = params.reset,
            receive_buffer_size = params.receive_buffer_size,
            word_size = params.word_size,
            id = %params.id_string(),
            "target parameters"
        );
        // Full incoming segments carry the whole advertised buffer.
        match params.receive_buffer_size {
            0 => warn!("target advertised an empty receive buffer, keeping segment size"),
            size => self.shared.sender.set_segment_size(usize::from(size)),
        }
        if params.reset {
            self.shared.reply(&Message::Ack);
        }
        self.shared.update(|state| {
            state.parameters = Some(params);
            state.synchronized_incoming = true;
        });
    }

    fn on_ack(&self) {
        self.shared.update(|state| match state.last_message.take() {
            Some(Message::Sync(_)) => {
                debug!("sync acknowledged");
                state.synchronized_outgoing = true;
            }
            Some(message) => debug!(%message, "acknowledged"),
            None => debug!("ack with nothing outstanding"),
        });
    }

    fn on_nack(&self) {
        let outstanding = self.shared.state.lock().last_message.clone();
        match outstanding {
            Some(message) => {
                warn!(%message, "target rejected message, resending");
                self.shared.update(|state| state.last_message_at = Some(Instant::now()));
                self.shared.reply(&message);
            }
            None => warn!("nack with nothing outstanding"),
        }
    }

    fn on_print(&self, print: &ThreadPrint) {
        self.shared.update(|state| {
            let word_size = state.word_size();
            let thread = print.thread_address(word_size);
            state.print_buffer.extend_from_slice(print.text(word_size));
            while let Some(pos) = state.print_buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = state.print_buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..pos]).into_owned();
                info!(target: "rpplink::target", thread, "{text}");
                state.output.push_back(OutputLine { thread, text });
            }
        });
    }

    fn on_thread_list(&self, list: &ThreadList) {
        let word_size = self.shared.state.lock().word_size();
        match list.thread_addresses(word_size) {
            Ok(threads) => self.shared.update(|state| {
                state.thread_list = Some(threads);
                // Targets may send a thread list unrequested.
                if matches!(state.last_message, Some(Message::ThreadList(_))) {
                    state.last_message = None;
                }
            }),
            Err(err) => warn!(%err, "bad thread list"),
        }
        self.shared.reply(&Message::Ack);
    }

    fn on_mem_list(&self, list: &MemList) {
        match list.mem_spaces() {
            Ok(spaces) => self.shared.update(|state| {
                state.mem_list = Some(spaces);
                state.last_message = None;
            }),
            Err(err) => warn!(
                %err,
                data = %String::from_utf8_lossy(list.data()),
                "bad memory space list"
            ),
        }
        self.shared.reply(&Message::Ack);
    }

    fn on_autorun_list(&self, list: &AutorunList) {
        let names = list.names();
        self.shared.update(|state| {
            state.autorun_list = Some(names);
            state.last_message = None;
        });
    }
}

/// A synchronous-looking client for one target.
///
/// At most one message awaits acknowledgment at a time; every blocking call
/// waits at most `timeout` per transmission and transmits at most
/// `comm_retries` times.
pub struct Session {
    channel: Channel,
    shared: Arc<Shared>,
    config: SessionConfig,
}

impl Session {
    /// Attach to `channel` and connect it.
    pub fn open(mut channel: Channel, config: SessionConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            sender: channel.sender(),
        });
        channel.add_message_handler(Arc::new(IncomingHandler {
            shared: Arc::clone(&shared),
        }));
        channel.connect()?;
        Ok(Self {
            channel,
            shared,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Link parameters from the target's last Sync.
    pub fn parameters(&self) -> Option<SyncParameters> {
        self.shared.state.lock().parameters
    }

    pub fn state(&self) -> SyncState {
        let state = self.shared.state.lock();
        if state.synchronized_incoming && state.synchronized_outgoing {
            SyncState::Synchronized
        } else if state.synchronized_incoming
            || state.synchronized_outgoing
            || matches!(state.last_message, Some(Message::Sync(_)))
        {
            SyncState::Synchronizing
        } else {
            SyncState::Unsynchronized
        }
    }

    /// Run the Sync handshake.
    ///
    /// Sends a Sync (with RESET on the first attempt only) and waits for
    /// both its acknowledgment and the target's own Sync. A message still
    /// awaiting acknowledgment is settled before each Sync goes out.
    pub fn synchronize(&self) -> Result<()> {
        self.shared.update(|state| {
            state.synchronized_incoming = false;
            state.synchronized_outgoing = false;
        });

        let retries = self.config.comm_retries;
        for attempt in 1..=retries {
            // A pending Sync is superseded; anything else must be acked first.
            self.shared.update(|state| {
                if matches!(state.last_message, Some(Message::Sync(_))) {
                    state.last_message = None;
                }
            });
            self.wait_outstanding()?;

            let sync = Message::Sync(SyncParameters::host(attempt == 1));
            self.shared.update(|state| {
                state.last_message = Some(sync.clone());
                state.last_message_at = Some(Instant::now());
            });
            debug!(attempt, "sending sync");
            self.shared.sender.send_message(&sync)?;

            let deadline = Instant::now() + self.config.timeout;
            if self
                .wait_until(deadline, |state| {
                    state.synchronized_incoming && state.synchronized_outgoing
                })?
                .is_some()
            {
                info!(attempt, "synchronized with target");
                return Ok(());
            }
            warn!(attempt, retries, "no sync response from target");
        }

        Err(SessionError::Timeout {
            operation: "synchronize",
            attempts: retries,
            last_message: self.shared.state.lock().last_message_text(),
        })
    }

    /// Send `message`, synchronizing first if needed.
    ///
    /// Blocks while an earlier message is still unacknowledged, resending
    /// it on every attempt after the first. Ack, Nack and ThreadList are
    /// never tracked as awaiting acknowledgment.
    pub fn send(&self, message: Message) -> Result<()> {
        let kind = message.kind();
        let needs_sync = !matches!(kind, MessageType::Ack | MessageType::Sync)
            && !self.shared.state.lock().synchronized_outgoing;
        if needs_sync {
            self.synchronize()?;
        }

        self.wait_outstanding()?;

        if !matches!(
            kind,
            MessageType::Ack | MessageType::Nack | MessageType::ThreadList
        ) {
            self.shared.update(|state| {
                state.last_message = Some(message.clone());
                state.last_message_at = Some(Instant::now());
            });
        }
        self.shared.sender.send_message(&message)?;
        Ok(())
    }

    /// Block until no message awaits acknowledgment.
    pub fn wait_outstanding(&self) -> Result<()> {
        let retries = self.config.comm_retries;
        for attempt in 1..=retries {
            let outstanding = {
                let state = self.shared.state.lock();
                state
                    .last_message
                    .clone()
                    .map(|message| (message, state.last_message_at))
            };
            let Some((message, sent_at)) = outstanding else {
                return Ok(());
            };

            let deadline = if attempt > 1 {
                warn!(%message, attempt, "resending message");
                self.shared
                    .update(|state| state.last_message_at = Some(Instant::now()));
                self.shared.sender.send_message(&message)?;
                Instant::now() + self.config.timeout
            } else {
                sent_at.unwrap_or_else(Instant::now) + self.config.timeout
            };

            if self
                .wait_until(deadline, |state| state.last_message.is_none())?
                .is_some()
            {
                return Ok(());
            }
        }

        let last_message = self.shared.state.lock().last_message_text();
        match last_message {
            None => Ok(()),
            Some(text) => Err(SessionError::Timeout {
                operation: "send",
                attempts: retries,
                last_message: Some(text),
            }),
        }
    }

    /// Request the target's thread list.
    pub fn read_thread_list(&self) -> Result<Vec<u64>> {
        self.request(
            "read thread list",
            Message::ThreadList(ThreadList::request()),
            |state| &mut state.thread_list,
        )
    }

    /// Request the target's memory spaces, keyed by index.
    pub fn read_mem_list(&self) -> Result<BTreeMap<u8, MemSpace>> {
        self.request(
            "read memory space list",
            Message::MemList(MemList::request()),
            |state| &mut state.mem_list,
        )
    }

    /// Request the module names the target starts on boot.
    pub fn read_autorun_list(&self) -> Result<Vec<String>> {
        self.request(
            "read autorun list",
            Message::AutorunList(AutorunList::request()),
            |state| &mut state.autorun_list,
        )
    }

    fn request<T>(
        &self,
        operation: &'static str,
        message: Message,
        slot: fn(&mut State) -> &mut Option<T>,
    ) -> Result<T> {
        self.shared.update(|state| *slot(state) = None);

        let retries = self.config.comm_retries;
        let kind = message.kind();
        for attempt in 1..=retries {
            if attempt > 1 {
                // The unanswered request is superseded by the retry.
                self.shared.update(|state| {
                    if state.last_message.as_ref().map(Message::kind) == Some(kind) {
                        state.last_message = None;
                    }
                });
                warn!(operation, attempt, "retrying request");
            }
            self.send(message.clone())?;

            let deadline = Instant::now() + self.config.timeout;
            if let Some(mut state) = self.wait_until(deadline, |state| slot(state).is_some())? {
                if let Some(value) = slot(&mut *state).take() {
                    return Ok(value);
                }
            }
        }

        Err(SessionError::Timeout {
            operation,
            attempts: retries,
            last_message: Some(message.to_string()),
        })
    }

    /// Store a new autorun list on the target.
    pub fn send_autorun_list<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        self.send(Message::AutorunList(AutorunList::from_names(names)))
    }

    /// Start a thread running the loaded module `module`.
    pub fn start_thread(&self, module: &str) -> Result<()> {
        self.send(Message::ThreadStart(ThreadStart::new(module)))
    }

    /// Append `data` to target memory space `memspace`.
    ///
    /// Data longer than one frame is sent as consecutive MemAddBlock
    /// segments, each acknowledged before the next goes out. Returns once
    /// the last segment is acknowledged.
    pub fn add_block(&self, memspace: u8, data: &[u8]) -> Result<()> {
        let segment_size = self.outgoing_segment_size();
        let segments = MemAddBlock::segments(memspace, data, segment_size)?;
        debug!(
            memspace,
            bytes = data.len(),
            segments = segments.len(),
            segment_size,
            "adding block"
        );
        for segment in segments {
            self.send(Message::MemAddBlock(segment))?;
        }
        self.wait_outstanding()
    }

    /// Build an image for module `name` and load it into the module space.
    pub fn add_module(&self, name: &str, source: &[u8], builder: &dyn ImageBuilder) -> Result<()> {
        let image = builder.build(name, source)?;
        info!(module = name, bytes = image.len(), "loading module");
        self.add_block(MODULE_MEMSPACE, &image)
    }

    /// Completed print lines received since the last call.
    pub fn drain_output(&self) -> Vec<OutputLine> {
        self.shared.state.lock().output.drain(..).collect()
    }

    /// Wait up to `timeout` for the next line of print output.
    pub fn next_output(&self, timeout: Duration) -> Result<Option<OutputLine>> {
        let deadline = Instant::now() + timeout;
        Ok(self
            .wait_until(deadline, |state| !state.output.is_empty())?
            .and_then(|mut state| state.output.pop_front()))
    }

    /// Stop the channel and release the link.
    pub fn terminate(&mut self) -> Result<()> {
        self.channel.quit()
    }

    /// Data capacity of one frame the target can receive.
    fn outgoing_segment_size(&self) -> usize {
        self.parameters()
            .and_then(|params| segment_size_for(params.receive_buffer_size))
            .unwrap_or(DEFAULT_SEGMENT_SIZE)
    }

    /// Wait until `done` holds, the deadline passes or the channel breaks.
    ///
    /// Returns the held state guard when `done` became true.
    fn wait_until(
        &self,
        deadline: Instant,
        mut done: impl FnMut(&mut State) -> bool,
    ) -> Result<Option<MutexGuard<'_, State>>> {
        let mut state = self.shared.state.lock();
        loop {
            if done(&mut *state) {
                return Ok(Some(state));
            }
            if let Some(reason) = &state.broken {
                return Err(SessionError::ChannelBroken(reason.clone()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let slice = (deadline - now).min(self.config.poll_interval);
            self.shared.changed.wait_for(&mut state, slice);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
