use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use rpplink_frame::{Decoder, FrameWriter, Message, DEFAULT_INCOMING_SEGMENT_SIZE};
use rpplink_transport::{Link, LinkCloser, LinkConfig, LinkReader, LinkWriter};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SessionError};

const READ_CHUNK_SIZE: usize = 256;

/// Name of the per-channel reader thread.
pub const READER_THREAD_NAME: &str = "rpplink-reader";

/// Receives every message the channel decodes.
///
/// Handlers run on the channel's reader thread, in registration order.
/// They must not block on replies from the target: the reader cannot
/// deliver anything else until the handler returns.
pub trait MessageHandler: Send + Sync {
    fn handle_message(&self, message: &Message);

    /// The link failed while the channel was running.
    fn channel_broken(&self, _reason: &str) {}
}

struct ChannelShared {
    writer: Mutex<Option<FrameWriter<LinkWriter>>>,
    handlers: Mutex<Vec<Arc<dyn MessageHandler>>>,
    segment_size: AtomicUsize,
    running: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl ChannelShared {
    fn dispatch(&self, message: &Message) {
        debug!(%message, "incoming message");
        // Handlers added during dispatch see the next message, not this one.
        let handlers = self.handlers.lock().clone();
        for handler in &handlers {
            handler.handle_message(message);
        }
    }

    fn mark_broken(&self, reason: String) {
        error!(%reason, "channel broken");
        *self.failure.lock() = Some(reason.clone());
        let handlers = self.handlers.lock().clone();
        for handler in &handlers {
            handler.channel_broken(&reason);
        }
    }

    fn send(&self, message: &Message) -> Result<u8> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(SessionError::ChannelBroken(reason));
        }
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(SessionError::NotConnected)?;
        let sequence = writer.send(message)?;
        debug!(%message, sequence, "sent message");
        Ok(sequence)
    }
}

/// Cloneable handle for sending on a channel, e.g. from a handler.
#[derive(Clone)]
pub struct MessageSender {
    shared: Arc<ChannelShared>,
}

impl MessageSender {
    /// Frame and transmit `message` under the next sequence number.
    pub fn send_message(&self, message: &Message) -> Result<u8> {
        self.shared.send(message)
    }

    /// Set the data length at which an incoming frame is an overlong segment.
    pub fn set_segment_size(&self, segment_size: usize) {
        self.shared.segment_size.store(segment_size, Ordering::Release);
    }

    pub fn segment_size(&self) -> usize {
        self.shared.segment_size.load(Ordering::Acquire)
    }

    /// Why the channel broke, if it did.
    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }
}

enum Source {
    Config(LinkConfig),
    Link(Link),
}

/// A duplex message channel to one target.
///
/// `connect` opens the link and starts a reader thread that decodes
/// incoming frames and hands each message to the registered handlers.
pub struct Channel {
    source: Option<Source>,
    description: String,
    shared: Arc<ChannelShared>,
    closer: Option<LinkCloser>,
    reader: Option<JoinHandle<()>>,
}

impl Channel {
    /// A channel that opens `config` on connect.
    pub fn new(config: LinkConfig) -> Self {
        let description = config.to_string();
        Self::with_source(Source::Config(config), description)
    }

    /// A channel over an already open link.
    pub fn from_link(link: Link) -> Self {
        let description = link.description().to_string();
        Self::with_source(Source::Link(link), description)
    }

    fn with_source(source: Source, description: String) -> Self {
        Self {
            source: Some(source),
            description,
            shared: Arc::new(ChannelShared {
                writer: Mutex::new(None),
                handlers: Mutex::new(Vec::new()),
                segment_size: AtomicUsize::new(DEFAULT_INCOMING_SEGMENT_SIZE),
                running: AtomicBool::new(false),
                failure: Mutex::new(None),
            }),
            closer: None,
            reader: None,
        }
    }

    /// Open the link and start the reader thread.
    pub fn connect(&mut self) -> Result<()> {
        let Some(source) = self.source.take() else {
            return if self.reader.is_some() {
                Ok(())
            } else {
                Err(SessionError::NotConnected)
            };
        };

        let mut link = match source {
            Source::Config(config) => config.open()?,
            Source::Link(link) => link,
        };
        self.description = link.description().to_string();

        let reader = link.take_reader()?;
        let (_, writer, closer) = link.into_parts();
        *self.shared.writer.lock() = Some(FrameWriter::new(writer));
        self.closer = Some(closer);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || reader_loop(reader, shared))
            .map_err(rpplink_transport::TransportError::Io)?;
        self.reader = Some(handle);

        info!(link = %self.description, "channel connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.running.load(Ordering::Acquire) && self.failure().is_none()
    }

    /// Register a handler for incoming messages. Each channel owns its list.
    pub fn add_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.shared.handlers.lock().push(handler);
    }

    pub fn sender(&self) -> MessageSender {
        MessageSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Frame and transmit `message`, returning its sequence number.
    pub fn send_message(&self, message: &Message) -> Result<u8> {
        self.shared.send(message)
    }

    /// Set the data length at which an incoming frame is an overlong segment.
    ///
    /// This is the target's advertised receive buffer size, 50 until it syncs.
    pub fn set_segment_size(&self, segment_size: usize) {
        self.shared.segment_size.store(segment_size, Ordering::Release);
    }

    pub fn segment_size(&self) -> usize {
        self.shared.segment_size.load(Ordering::Acquire)
    }

    /// Why the channel broke, if it did.
    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Stop the reader thread and release the link.
    ///
    /// Safe to call repeatedly and while the reader is blocked in a read:
    /// closing the link is what unblocks it.
    pub fn quit(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::Release);
        self.source = None;

        if let Some(closer) = self.closer.as_mut() {
            closer.close()?;
        }
        self.shared.writer.lock().take();

        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!(link = %self.description, "reader thread panicked");
            } else {
                debug!(link = %self.description, "reader thread stopped");
            }
        }
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Err(err) = self.quit() {
            warn!(link = %self.description, %err, "failed to close channel");
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("description", &self.description)
            .field("running", &self.shared.running.load(Ordering::Acquire))
            .field("segment_size", &self.segment_size())
            .field("failure", &self.failure())
            .finish()
    }
}

fn reader_loop(mut reader: LinkReader, shared: Arc<ChannelShared>) {
    let mut decoder = Decoder::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    while shared.running.load(Ordering::Acquire) {
        let read = match reader.read(&mut chunk) {
            Ok(0) => {
                if shared.running.load(Ordering::Acquire) {
                    shared.mark_broken("link unexpectedly closed".to_string());
                }
                return;
            }
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            // Serial ports time out periodically so shutdown is noticed.
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                continue
            }
            Err(err) => {
                if shared.running.load(Ordering::Acquire) {
                    shared.mark_broken(format!("read failed: {err}"));
                }
                return;
            }
        };

        let mut next = decoder.feed(&chunk[..read], shared.segment_size.load(Ordering::Acquire));
        while let Some(message) = next {
            shared.dispatch(&message);
            next = decoder.decode_next(shared.segment_size.load(Ordering::Acquire));
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;
    use std::time::Duration;

    use bytes::BytesMut;
    use rpplink_frame::{encode_frame, AutorunList, ThreadStart};

    use super::*;

    struct Forward(Mutex<mpsc::Sender<Message>>);

    impl MessageHandler for Forward {
        fn handle_message(&self, message: &Message) {
            let _ = self.0.lock().send(message.clone());
        }
    }

    struct BrokenFlag(mpsc::Sender<String>);

    impl MessageHandler for BrokenFlag {
        fn handle_message(&self, _message: &Message) {}

        fn channel_broken(&self, reason: &str) {
            let _ = self.0.send(reason.to_string());
        }
    }

    fn connected_pair() -> (Channel, UnixStream) {
        let (host, target) = UnixStream::pair().unwrap();
        let mut channel = Channel::from_link(Link::from_unix_stream(host).unwrap());
        channel.connect().unwrap();
        (channel, target)
    }

    fn frame(seq: u8, kind: u8, data: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(seq, kind, data, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn dispatches_every_buffered_message() {
        let (channel, mut target) = connected_pair();
        let (tx, rx) = mpsc::channel();
        channel.add_message_handler(Arc::new(Forward(Mutex::new(tx))));

        let mut wire = frame(1, 1, b"");
        wire.extend(frame(2, 9, b"main"));
        wire.extend(frame(3, 2, b""));
        target.write_all(&wire).unwrap();

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Message::Ack);
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            Message::AutorunList(AutorunList::from_names(&["main"]))
        );
        assert_eq!(rx.recv_timeout(timeout).unwrap(), Message::Nack);
    }

    #[test]
    fn every_handler_sees_each_message() {
        let (channel, mut target) = connected_pair();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        channel.add_message_handler(Arc::new(Forward(Mutex::new(tx1))));
        channel.add_message_handler(Arc::new(Forward(Mutex::new(tx2))));

        target.write_all(&frame(1, 1, b"")).unwrap();
        let timeout = Duration::from_secs(2);
        assert_eq!(rx1.recv_timeout(timeout).unwrap(), Message::Ack);
        assert_eq!(rx2.recv_timeout(timeout).unwrap(), Message::Ack);
    }

    #[test]
    fn handler_lists_are_per_channel() {
        let (first, mut first_target) = connected_pair();
        let (second, _second_target) = connected_pair();
        let (tx, rx) = mpsc::channel();
        second.add_message_handler(Arc::new(Forward(Mutex::new(tx))));

        first_target.write_all(&frame(1, 1, b"")).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(first);
    }

    #[test]
    fn send_numbers_frames_from_one() {
        let (channel, mut target) = connected_pair();
        assert_eq!(channel.send_message(&Message::Ack).unwrap(), 1);
        assert_eq!(
            channel
                .send_message(&Message::ThreadStart(ThreadStart::new("m")))
                .unwrap(),
            2
        );

        let mut buf = [0u8; 6 + 7];
        target.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0xFF, 1, 1, 0]);
        assert_eq!(&buf[6..10], &[0xFF, 2, 10, 1]);
    }

    #[test]
    fn segment_size_controls_reassembly() {
        let (channel, mut target) = connected_pair();
        let (tx, rx) = mpsc::channel();
        channel.add_message_handler(Arc::new(Forward(Mutex::new(tx))));
        channel.set_segment_size(4);
        assert_eq!(channel.segment_size(), 4);

        let mut wire = frame(1, 9, b"abcd");
        wire.extend(frame(2, 9, b",e"));
        target.write_all(&wire).unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Message::AutorunList(AutorunList::from_names(&["abcd", "e"]))
        );
    }

    #[test]
    fn full_receive_buffer_frame_continues_message() {
        let (channel, mut target) = connected_pair();
        let (tx, rx) = mpsc::channel();
        channel.add_message_handler(Arc::new(Forward(Mutex::new(tx))));
        assert_eq!(channel.segment_size(), 50);

        let names: Vec<String> = (0..12).map(|i| format!("mod{i}")).collect();
        let list = AutorunList::from_names(&names);
        let data = list.data().clone();
        assert_eq!(data.len(), 61);

        let mut wire = frame(1, 9, &data[..50]);
        wire.extend(frame(2, 9, &data[50..]));
        target.write_all(&wire).unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Message::AutorunList(list)
        );
    }

    #[test]
    fn peer_close_breaks_channel() {
        let (channel, target) = connected_pair();
        let (tx, rx) = mpsc::channel();
        channel.add_message_handler(Arc::new(BrokenFlag(tx)));

        drop(target);
        let reason = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(reason.contains("closed"));
        assert!(channel.failure().is_some());
        assert!(!channel.is_connected());
        assert!(matches!(
            channel.send_message(&Message::Ack),
            Err(SessionError::ChannelBroken(_))
        ));
    }

    #[test]
    fn quit_is_idempotent_and_not_a_failure() {
        let (mut channel, _target) = connected_pair();
        let (tx, rx) = mpsc::channel();
        channel.add_message_handler(Arc::new(BrokenFlag(tx)));

        channel.quit().unwrap();
        channel.quit().unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(channel.failure().is_none());
        assert!(matches!(
            channel.send_message(&Message::Ack),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn send_before_connect_fails() {
        let (host, _target) = UnixStream::pair().unwrap();
        let channel = Channel::from_link(Link::from_unix_stream(host).unwrap());
        assert!(matches!(
            channel.send_message(&Message::Ack),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn pipe_channel_quit_kills_target() {
        let mut channel = Channel::new(LinkConfig::pipe("cat"));
        channel.connect().unwrap();
        assert!(channel.description().starts_with("pipe:cat"));
        channel.send_message(&Message::Ack).unwrap();
        channel.quit().unwrap();
        assert!(channel.failure().is_none());
    }
}
