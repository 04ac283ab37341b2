#![cfg(unix)]

//! Session behaviour against an in-process target emulator.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use rpplink_frame::{
    encode_frame, AutorunList, Decoder, FrameWriter, MemAddBlock, MemList, Message,
    SyncParameters, ThreadList, ThreadPrint, ThreadStart, DEFAULT_SEGMENT_SIZE,
};
use rpplink_session::{Channel, Session, SessionConfig, SessionError, SyncState};
use rpplink_transport::Link;

#[derive(Clone, Copy, Default)]
struct Behaviour {
    /// Never acknowledge the host's Sync.
    ignore_sync: bool,
    /// Acknowledge nothing except Sync.
    ignore_others: bool,
}

struct MockTarget {
    received: Arc<Mutex<Vec<Message>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockTarget {
    fn spawn(stream: UnixStream, behaviour: Behaviour) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        let handle = thread::spawn(move || serve(stream, behaviour, log));
        Self {
            received,
            handle: Some(handle),
        }
    }

    fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Message) -> bool) -> usize {
        self.received().iter().filter(|m| pred(m)).count()
    }
}

impl Drop for MockTarget {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn target_parameters() -> SyncParameters {
    SyncParameters {
        reset: false,
        receive_buffer_size: 20,
        word_size: 4,
        id: SyncParameters::pad_id(b"mock"),
    }
}

/// Writes `message` the way the target flushes its send buffer: frames of
/// exactly `receive_buffer_size` data bytes, ended by a shorter one.
fn send_segmented(stream: &mut UnixStream, sequence: &mut u8, message: &Message) -> bool {
    let kind = message.wire_id().unwrap();
    let data = message.to_bytes().unwrap();
    let size = usize::from(target_parameters().receive_buffer_size);

    let mut chunks: Vec<&[u8]> = data.chunks(size).collect();
    if data.len() % size == 0 {
        chunks.push(&[]);
    }
    let mut wire = BytesMut::new();
    for chunk in chunks {
        *sequence = sequence.wrapping_add(1);
        encode_frame(*sequence, kind, chunk, &mut wire).unwrap();
    }
    stream.write_all(&wire).is_ok()
}

fn serve(mut stream: UnixStream, behaviour: Behaviour, log: Arc<Mutex<Vec<Message>>>) {
    let mut reader = stream.try_clone().unwrap();
    let mut sequence = 0u8;
    let mut decoder = Decoder::new();
    let mut autorun = AutorunList::from_names(&["main"]);
    let mut chunk = [0u8; 256];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let mut next = decoder.feed(&chunk[..n], DEFAULT_SEGMENT_SIZE);
        while let Some(message) = next {
            log.lock().unwrap().push(message.clone());
            let replies = respond(&message, behaviour, &mut autorun);
            for reply in replies {
                if !send_segmented(&mut stream, &mut sequence, &reply) {
                    return;
                }
            }
            next = decoder.decode_next(DEFAULT_SEGMENT_SIZE);
        }
    }
}

fn respond(message: &Message, behaviour: Behaviour, autorun: &mut AutorunList) -> Vec<Message> {
    match message {
        Message::Sync(_) if behaviour.ignore_sync => vec![Message::Sync(target_parameters())],
        Message::Sync(_) => vec![Message::Ack, Message::Sync(target_parameters())],
        _ if behaviour.ignore_others => Vec::new(),
        Message::ThreadList(_) => vec![Message::ThreadList(ThreadList::from_addresses(
            &[0x1000, 0x2000],
            4,
        ))],
        Message::MemList(_) => vec![Message::MemList(MemList::from_text(
            "{ 0:(\"ram\",4096,True), 7:(\"modules\",512,True),}",
        ))],
        Message::AutorunList(list) if list.is_request() => {
            vec![Message::AutorunList(autorun.clone())]
        }
        Message::AutorunList(list) => {
            *autorun = list.clone();
            vec![Message::Ack]
        }
        Message::ThreadStart(start) => {
            let text = format!("started {}\n", start.module_name());
            vec![
                Message::Ack,
                Message::ThreadPrintItem(ThreadPrint::from_parts(0x3000, 4, text.as_bytes())),
            ]
        }
        Message::MemAddBlock(_) => vec![Message::Ack],
        _ => Vec::new(),
    }
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        timeout: Duration::from_millis(200),
        comm_retries: 3,
        poll_interval: Duration::from_millis(10),
    }
}

fn start(behaviour: Behaviour, config: SessionConfig) -> (Session, MockTarget) {
    let (host, target) = UnixStream::pair().unwrap();
    let mock = MockTarget::spawn(target, behaviour);
    let channel = Channel::from_link(Link::from_unix_stream(host).unwrap());
    (Session::open(channel, config).unwrap(), mock)
}

fn is_sync(message: &Message) -> bool {
    matches!(message, Message::Sync(_))
}

#[test]
fn handshake_completes() {
    let (mut session, mock) = start(Behaviour::default(), fast_config());
    assert_eq!(session.state(), SyncState::Unsynchronized);

    session.synchronize().unwrap();
    assert_eq!(session.state(), SyncState::Synchronized);
    assert_eq!(session.parameters(), Some(target_parameters()));
    // Incoming segments are full at the target's advertised buffer.
    assert_eq!(session.channel().segment_size(), 20);

    session.terminate().unwrap();
    let syncs: Vec<_> = mock.received().into_iter().filter(is_sync).collect();
    assert_eq!(syncs, vec![Message::Sync(SyncParameters::host(true))]);
}

#[test]
fn unacknowledged_sync_times_out_after_retries() {
    let (mut session, mock) = start(
        Behaviour {
            ignore_sync: true,
            ..Behaviour::default()
        },
        fast_config(),
    );

    let began = Instant::now();
    let err = session.synchronize().unwrap_err();
    assert!(began.elapsed() >= Duration::from_millis(600));
    assert!(matches!(
        err,
        SessionError::Timeout {
            operation: "synchronize",
            attempts: 3,
            ..
        }
    ));
    assert_eq!(session.state(), SyncState::Synchronizing);

    session.terminate().unwrap();
    let syncs: Vec<_> = mock.received().into_iter().filter(is_sync).collect();
    assert_eq!(syncs.len(), 3);
    assert_eq!(syncs[0], Message::Sync(SyncParameters::host(true)));
    assert_eq!(syncs[1], Message::Sync(SyncParameters::host(false)));
    assert_eq!(syncs[2], Message::Sync(SyncParameters::host(false)));
}

#[test]
fn requests_sync_implicitly() {
    let (mut session, mock) = start(Behaviour::default(), fast_config());

    assert_eq!(session.read_thread_list().unwrap(), vec![0x1000, 0x2000]);
    assert_eq!(session.state(), SyncState::Synchronized);

    session.terminate().unwrap();
    let received = mock.received();
    assert!(is_sync(&received[0]));
    assert_eq!(received[1], Message::ThreadList(ThreadList::request()));
}

#[test]
fn reads_mem_and_autorun_lists() {
    let (mut session, _mock) = start(Behaviour::default(), fast_config());

    // The listing spans three frames at the target's 20-byte buffer.
    let spaces = session.read_mem_list().unwrap();
    assert_eq!(spaces.len(), 2);
    assert_eq!(spaces[&0].name, "ram");
    assert_eq!(spaces[&7].size, 512);
    assert!(spaces[&7].writeable);

    assert_eq!(session.read_autorun_list().unwrap(), vec!["main".to_string()]);
    session.send_autorun_list(&["boot", "app"]).unwrap();
    session.wait_outstanding().unwrap();
    assert_eq!(
        session.read_autorun_list().unwrap(),
        vec!["boot".to_string(), "app".to_string()]
    );

    session.terminate().unwrap();
}

#[test]
fn start_thread_produces_output() {
    let (mut session, mock) = start(Behaviour::default(), fast_config());

    session.start_thread("blink").unwrap();
    let line = session
        .next_output(Duration::from_secs(2))
        .unwrap()
        .expect("print output");
    assert_eq!(line.thread, 0x3000);
    assert_eq!(line.text, "started blink");

    session.terminate().unwrap();
    assert_eq!(
        mock.count(|m| *m == Message::ThreadStart(ThreadStart::new("blink"))),
        1
    );
}

#[test]
fn add_block_sends_every_segment_in_order() {
    let (mut session, mock) = start(Behaviour::default(), fast_config());
    session.synchronize().unwrap();

    let data: Vec<u8> = (0u8..40).collect();
    session.add_block(3, &data).unwrap();
    session.terminate().unwrap();

    // Outgoing segments leave room for the target's frame overhead.
    let expected = MemAddBlock::segments(3, &data, 14).unwrap();
    let sent: Vec<_> = mock
        .received()
        .into_iter()
        .filter_map(|m| match m {
            Message::MemAddBlock(block) => Some(block),
            _ => None,
        })
        .collect();
    assert!(expected.len() > 1);
    assert_eq!(sent, expected);
}

#[test]
fn second_send_waits_and_retransmits_unacknowledged_message() {
    let (mut session, mock) = start(
        Behaviour {
            ignore_others: true,
            ..Behaviour::default()
        },
        fast_config(),
    );
    session.synchronize().unwrap();

    // The first send only has to go out; nobody acknowledges it.
    session.start_thread("first").unwrap();
    let err = session.start_thread("second").unwrap_err();
    assert!(
        matches!(err, SessionError::Timeout { operation: "send", .. }),
        "unexpected {err}"
    );

    session.terminate().unwrap();
    let first = Message::ThreadStart(ThreadStart::new("first"));
    let second = Message::ThreadStart(ThreadStart::new("second"));
    assert_eq!(mock.count(|m| *m == first), 3);
    assert_eq!(mock.count(|m| *m == second), 0);
}

#[test]
fn closed_target_breaks_session() {
    let (host, target) = UnixStream::pair().unwrap();
    let channel = Channel::from_link(Link::from_unix_stream(host).unwrap());
    let session = Session::open(channel, fast_config()).unwrap();

    drop(target);
    let err = session.synchronize().unwrap_err();
    assert!(
        matches!(
            err,
            SessionError::ChannelBroken(_) | SessionError::Frame(_)
        ),
        "unexpected {err}"
    );
}

#[test]
fn raw_writes_reach_the_session() {
    let (host, mut target) = UnixStream::pair().unwrap();
    let channel = Channel::from_link(Link::from_unix_stream(host).unwrap());
    let session = Session::open(channel, fast_config()).unwrap();

    let mut writer = FrameWriter::new(Vec::new());
    writer
        .send(&Message::ThreadPrintExpr(ThreadPrint::from_parts(
            1,
            4,
            b"42\n",
        )))
        .unwrap();
    target.write_all(&writer.into_inner()).unwrap();

    let line = session.next_output(Duration::from_secs(2)).unwrap().unwrap();
    assert_eq!(line.text, "42");
}
