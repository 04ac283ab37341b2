use std::collections::BTreeMap;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::MessageError;

type MessageResult<T> = std::result::Result<T, MessageError>;

/// Message kinds, numbered as on the wire.
///
/// `Invalid` and `Defective` are sentinels: type 0 is reserved on the wire
/// and `Defective` only ever comes out of the decoder for a corrupt frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    Defective,
    Invalid,
    Ack,
    Nack,
    Sync,
    ThreadPrintItem,
    ThreadPrintExpr,
    ThreadList,
    MemList,
    MemAddBlock,
    AutorunList,
    ThreadStart,
}

impl MessageType {
    /// Numeric type id; `-1` for the internal `Defective` sentinel.
    pub const fn id(self) -> i16 {
        match self {
            Self::Defective => -1,
            Self::Invalid => 0,
            Self::Ack => 1,
            Self::Nack => 2,
            Self::Sync => 3,
            Self::ThreadPrintItem => 4,
            Self::ThreadPrintExpr => 5,
            Self::ThreadList => 6,
            Self::MemList => 7,
            Self::MemAddBlock => 8,
            Self::AutorunList => 9,
            Self::ThreadStart => 10,
        }
    }

    /// The type byte used on the wire, if this kind may be sent at all.
    pub const fn wire_id(self) -> Option<u8> {
        match self {
            Self::Defective | Self::Invalid => None,
            other => Some(other.id() as u8),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Defective => "Defective",
            Self::Invalid => "Invalid",
            Self::Ack => "Ack",
            Self::Nack => "Nack",
            Self::Sync => "Sync",
            Self::ThreadPrintItem => "ThreadPrintItem",
            Self::ThreadPrintExpr => "ThreadPrintExpr",
            Self::ThreadList => "ThreadList",
            Self::MemList => "MemList",
            Self::MemAddBlock => "MemAddBlock",
            Self::AutorunList => "AutorunList",
            Self::ThreadStart => "ThreadStart",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A registered wire message kind.
pub struct MessageKind {
    pub kind: MessageType,
    pub id: u8,
    from_bytes: fn(Bytes) -> MessageResult<Message>,
}

impl MessageKind {
    /// Build a message of this kind from a frame's data section.
    pub fn decode(&self, data: Bytes) -> MessageResult<Message> {
        (self.from_bytes)(data)
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl fmt::Debug for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageKind")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Every message kind that may appear on the wire.
pub static REGISTRY: [MessageKind; 10] = [
    MessageKind {
        kind: MessageType::Ack,
        id: 1,
        from_bytes: decode_ack,
    },
    MessageKind {
        kind: MessageType::Nack,
        id: 2,
        from_bytes: decode_nack,
    },
    MessageKind {
        kind: MessageType::Sync,
        id: 3,
        from_bytes: decode_sync,
    },
    MessageKind {
        kind: MessageType::ThreadPrintItem,
        id: 4,
        from_bytes: decode_print_item,
    },
    MessageKind {
        kind: MessageType::ThreadPrintExpr,
        id: 5,
        from_bytes: decode_print_expr,
    },
    MessageKind {
        kind: MessageType::ThreadList,
        id: 6,
        from_bytes: decode_thread_list,
    },
    MessageKind {
        kind: MessageType::MemList,
        id: 7,
        from_bytes: decode_mem_list,
    },
    MessageKind {
        kind: MessageType::MemAddBlock,
        id: 8,
        from_bytes: decode_mem_add_block,
    },
    MessageKind {
        kind: MessageType::AutorunList,
        id: 9,
        from_bytes: decode_autorun_list,
    },
    MessageKind {
        kind: MessageType::ThreadStart,
        id: 10,
        from_bytes: decode_thread_start,
    },
];

/// Find the registered kind for a wire type byte.
pub fn lookup(id: u8) -> Option<&'static MessageKind> {
    REGISTRY.iter().find(|kind| kind.id == id)
}

fn decode_ack(_: Bytes) -> MessageResult<Message> {
    Ok(Message::Ack)
}

fn decode_nack(_: Bytes) -> MessageResult<Message> {
    Ok(Message::Nack)
}

fn decode_sync(data: Bytes) -> MessageResult<Message> {
    SyncParameters::from_bytes(&data).map(Message::Sync)
}

fn decode_print_item(data: Bytes) -> MessageResult<Message> {
    Ok(Message::ThreadPrintItem(ThreadPrint::new(data)))
}

fn decode_print_expr(data: Bytes) -> MessageResult<Message> {
    Ok(Message::ThreadPrintExpr(ThreadPrint::new(data)))
}

fn decode_thread_list(data: Bytes) -> MessageResult<Message> {
    Ok(Message::ThreadList(ThreadList { data }))
}

fn decode_mem_list(data: Bytes) -> MessageResult<Message> {
    Ok(Message::MemList(MemList { data }))
}

fn decode_mem_add_block(data: Bytes) -> MessageResult<Message> {
    Ok(Message::MemAddBlock(MemAddBlock { data }))
}

fn decode_autorun_list(data: Bytes) -> MessageResult<Message> {
    Ok(Message::AutorunList(AutorunList { data }))
}

fn decode_thread_start(data: Bytes) -> MessageResult<Message> {
    Ok(Message::ThreadStart(ThreadStart { module: data }))
}

/// A logical protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Invalid,
    /// A frame failed its checksum.
    Defective,
    Ack,
    Nack,
    Sync(SyncParameters),
    ThreadPrintItem(ThreadPrint),
    ThreadPrintExpr(ThreadPrint),
    ThreadList(ThreadList),
    MemList(MemList),
    MemAddBlock(MemAddBlock),
    AutorunList(AutorunList),
    ThreadStart(ThreadStart),
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Invalid => MessageType::Invalid,
            Self::Defective => MessageType::Defective,
            Self::Ack => MessageType::Ack,
            Self::Nack => MessageType::Nack,
            Self::Sync(_) => MessageType::Sync,
            Self::ThreadPrintItem(_) => MessageType::ThreadPrintItem,
            Self::ThreadPrintExpr(_) => MessageType::ThreadPrintExpr,
            Self::ThreadList(_) => MessageType::ThreadList,
            Self::MemList(_) => MessageType::MemList,
            Self::MemAddBlock(_) => MessageType::MemAddBlock,
            Self::AutorunList(_) => MessageType::AutorunList,
            Self::ThreadStart(_) => MessageType::ThreadStart,
        }
    }

    /// Decode a data section received under wire type `id`.
    pub fn from_wire(id: u8, data: Bytes) -> MessageResult<Self> {
        lookup(id)
            .ok_or(MessageError::UnknownType(id))?
            .decode(data)
    }

    /// The data section this message puts on the wire.
    pub fn to_bytes(&self) -> MessageResult<Bytes> {
        match self {
            Self::Invalid => Err(MessageError::NotEncodable("Invalid")),
            Self::Defective => Err(MessageError::NotEncodable("Defective")),
            Self::Ack | Self::Nack => Ok(Bytes::new()),
            Self::Sync(params) => Ok(params.to_bytes()),
            Self::ThreadPrintItem(print) | Self::ThreadPrintExpr(print) => {
                Ok(print.data.clone())
            }
            Self::ThreadList(list) => Ok(list.data.clone()),
            Self::MemList(list) => Ok(list.data.clone()),
            Self::MemAddBlock(block) => Ok(block.data.clone()),
            Self::AutorunList(list) => Ok(list.data.clone()),
            Self::ThreadStart(start) => Ok(start.module.clone()),
        }
    }

    /// Wire type byte for this message.
    pub fn wire_id(&self) -> MessageResult<u8> {
        self.kind()
            .wire_id()
            .ok_or(MessageError::NotEncodable(self.kind().name()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        write!(f, "<{}, type={}>", kind.name(), kind.id())
    }
}

/// Length of the Sync data section.
pub const SYNC_DATA_LENGTH: usize = 19;

/// Length of the NUL-padded identification string in a Sync message.
pub const SYNC_ID_LENGTH: usize = 16;

/// Link parameters exchanged in the Sync handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncParameters {
    /// The sender has just (re)started and discarded its link state.
    pub reset: bool,
    /// Largest frame the sender can receive, overhead included.
    pub receive_buffer_size: u8,
    /// Width in bytes of a machine word on the sender.
    pub word_size: u8,
    pub id: [u8; SYNC_ID_LENGTH],
}

impl SyncParameters {
    /// Parameters the host announces.
    ///
    /// The host leaves both sizes at zero; targets size their frames by
    /// their own buffers and ignore these fields.
    pub fn host(reset: bool) -> Self {
        Self {
            reset,
            receive_buffer_size: 0,
            word_size: 0,
            id: Self::pad_id(concat!("rpplink ", env!("CARGO_PKG_VERSION")).as_bytes()),
        }
    }

    /// NUL-pad (or truncate) an identification string to its wire width.
    pub fn pad_id(text: &[u8]) -> [u8; SYNC_ID_LENGTH] {
        let mut id = [0u8; SYNC_ID_LENGTH];
        let n = text.len().min(SYNC_ID_LENGTH);
        id[..n].copy_from_slice(&text[..n]);
        id
    }

    /// Identification string with NUL padding removed.
    pub fn id_string(&self) -> String {
        let end = self
            .id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SYNC_ID_LENGTH);
        String::from_utf8_lossy(&self.id[..end]).into_owned()
    }

    pub fn from_bytes(data: &[u8]) -> MessageResult<Self> {
        if data.len() < SYNC_DATA_LENGTH {
            return Err(MessageError::malformed(
                "Sync",
                format!(
                    "{} data bytes, need {SYNC_DATA_LENGTH}",
                    data.len()
                ),
            ));
        }
        let mut id = [0u8; SYNC_ID_LENGTH];
        id.copy_from_slice(&data[3..SYNC_DATA_LENGTH]);
        Ok(Self {
            reset: data[0] != 0,
            receive_buffer_size: data[1],
            word_size: data[2],
            id,
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SYNC_DATA_LENGTH);
        buf.put_u8(u8::from(self.reset));
        buf.put_u8(self.receive_buffer_size);
        buf.put_u8(self.word_size);
        buf.put_slice(&self.id);
        buf.freeze()
    }
}

/// Output printed by a target thread: the thread's address, then text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPrint {
    data: Bytes,
}

impl ThreadPrint {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Build from a thread address and text, as a target sends it.
    pub fn from_parts(thread_address: u64, word_size: usize, text: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(word_size + text.len());
        let address = thread_address.to_le_bytes();
        for i in 0..word_size {
            buf.put_u8(address.get(i).copied().unwrap_or(0));
        }
        buf.put_slice(text);
        Self { data: buf.freeze() }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Address of the printing thread, stored little-endian in the
    /// first `word_size` bytes.
    pub fn thread_address(&self, word_size: usize) -> u64 {
        self.data
            .iter()
            .take(word_size.min(8))
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (8 * i)))
    }

    /// Printed text following the address.
    pub fn text(&self, word_size: usize) -> &[u8] {
        self.data.get(word_size..).unwrap_or(&[])
    }
}

/// Thread list request (empty) or reply (big-endian thread addresses).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadList {
    data: Bytes,
}

impl ThreadList {
    pub fn request() -> Self {
        Self::default()
    }

    /// Encode a reply listing `addresses` at `word_size` bytes each.
    pub fn from_addresses(addresses: &[u64], word_size: usize) -> Self {
        let mut buf = BytesMut::with_capacity(addresses.len() * word_size);
        for address in addresses {
            let be = address.to_be_bytes();
            for i in 0..word_size {
                // Right-align the word; wider-than-u64 words are zero padded.
                let idx = (8 + i).checked_sub(word_size);
                buf.put_u8(idx.and_then(|j| be.get(j).copied()).unwrap_or(0));
            }
        }
        Self { data: buf.freeze() }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn thread_addresses(&self, word_size: usize) -> MessageResult<Vec<u64>> {
        if word_size == 0 {
            return Err(MessageError::malformed("ThreadList", "word size is zero"));
        }
        if self.data.len() % word_size != 0 {
            return Err(MessageError::malformed(
                "ThreadList",
                format!(
                    "{} bytes is not a whole number of {word_size}-byte words",
                    self.data.len()
                ),
            ));
        }
        Ok(self
            .data
            .chunks(word_size)
            .map(|word| word.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
            .collect())
    }
}

/// One memory space as the target reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemSpace {
    pub name: String,
    pub size: u32,
    pub writeable: bool,
}

/// Memory space list request (empty) or reply.
///
/// Replies are text of the form `{ 0:("name",size,writeable), ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemList {
    data: Bytes,
}

impl MemList {
    pub fn request() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            data: Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn mem_spaces(&self) -> MessageResult<BTreeMap<u8, MemSpace>> {
        MemListParser {
            src: &self.data,
            pos: 0,
        }
        .parse()
    }
}

struct MemListParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl MemListParser<'_> {
    fn parse(mut self) -> MessageResult<BTreeMap<u8, MemSpace>> {
        let mut spaces = BTreeMap::new();
        self.expect(b'{')?;
        loop {
            if self.eat(b'}') {
                break;
            }
            let index = self.number()?;
            let index = u8::try_from(index)
                .map_err(|_| self.error(format!("memory space index {index} out of range")))?;
            self.expect(b':')?;
            self.expect(b'(')?;
            let name = self.string()?;
            self.expect(b',')?;
            let size = self.number()?;
            self.expect(b',')?;
            let writeable = self.flag()?;
            self.expect(b')')?;
            spaces.insert(
                index,
                MemSpace {
                    name,
                    size,
                    writeable,
                },
            );
            if !self.eat(b',') {
                self.expect(b'}')?;
                break;
            }
        }
        self.skip_ws();
        if self.pos != self.src.len() {
            return Err(self.error("trailing data after closing brace"));
        }
        Ok(spaces)
    }

    fn error(&self, reason: impl Into<String>) -> MessageError {
        MessageError::malformed("MemList", format!("{} at offset {}", reason.into(), self.pos))
    }

    fn skip_ws(&mut self) {
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace() || *b == 0)
        {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        self.skip_ws();
        if self.src.get(self.pos) == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> MessageResult<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn number(&mut self) -> MessageResult<u32> {
        self.skip_ws();
        let start = self.pos;
        while self.src.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| self.error("expected a number"))
    }

    fn flag(&mut self) -> MessageResult<bool> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        for (word, value) in [(&b"True"[..], true), (&b"False"[..], false)] {
            if rest.starts_with(word) {
                self.pos += word.len();
                return Ok(value);
            }
        }
        Ok(self.number()? != 0)
    }

    fn string(&mut self) -> MessageResult<String> {
        self.skip_ws();
        let quote = match self.src.get(self.pos) {
            Some(&q) if q == b'"' || q == b'\'' => q,
            _ => return Err(self.error("expected a quoted name")),
        };
        let start = self.pos + 1;
        let len = self.src[start..]
            .iter()
            .position(|&b| b == quote)
            .ok_or_else(|| self.error("unterminated name"))?;
        self.pos = start + len + 1;
        Ok(String::from_utf8_lossy(&self.src[start..start + len]).into_owned())
    }
}

/// Memory space the target keeps loadable module images in.
pub const MODULE_MEMSPACE: u8 = 7;

/// One segment of data appended to a target memory space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemAddBlock {
    data: Bytes,
}

impl MemAddBlock {
    /// Split `data` destined for `memspace` into per-frame data sections.
    ///
    /// Data that fits in one frame below `segment_size` travels as
    /// `[memspace, data..]`. Anything longer becomes an overlong message:
    /// the first segment is `[total length u16 LE, memspace, data..]`
    /// filled to `segment_size`, further segments carry raw data, and the
    /// last one is shorter than `segment_size` (empty when the data ends on
    /// a segment boundary).
    pub fn segments(memspace: u8, data: &[u8], segment_size: usize) -> MessageResult<Vec<Self>> {
        if segment_size <= 3 {
            return Err(MessageError::malformed(
                "MemAddBlock",
                format!("segment size {segment_size} cannot carry a block header"),
            ));
        }
        if data.len() + 1 < segment_size {
            let mut buf = BytesMut::with_capacity(data.len() + 1);
            buf.put_u8(memspace);
            buf.put_slice(data);
            return Ok(vec![Self { data: buf.freeze() }]);
        }
        if data.len() > u16::MAX as usize {
            return Err(MessageError::TooLong {
                kind: "MemAddBlock",
                size: data.len(),
                max: u16::MAX as usize,
            });
        }

        let first_len = segment_size - 3;
        let mut first = BytesMut::with_capacity(segment_size);
        first.put_u16_le(data.len() as u16);
        first.put_u8(memspace);
        first.put_slice(&data[..first_len]);

        let rest = &data[first_len..];
        let mut segments = Vec::with_capacity(rest.len() / segment_size + 2);
        segments.push(Self {
            data: first.freeze(),
        });
        segments.extend(rest.chunks(segment_size).map(|chunk| Self {
            data: Bytes::copy_from_slice(chunk),
        }));
        if rest.len() % segment_size == 0 {
            segments.push(Self { data: Bytes::new() });
        }
        Ok(segments)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Autorun list request (empty data), reply or update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutorunList {
    data: Bytes,
}

impl AutorunList {
    pub fn request() -> Self {
        Self::default()
    }

    /// Encode module names comma-joined. An empty list becomes a single
    /// NUL so it is not mistaken for a request.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        if names.is_empty() {
            return Self {
                data: Bytes::from_static(b"\0"),
            };
        }
        let joined = names
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(",");
        Self {
            data: Bytes::from(joined.into_bytes()),
        }
    }

    pub fn is_request(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn names(&self) -> Vec<String> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        let text = String::from_utf8_lossy(&self.data[..end]);
        if text.is_empty() {
            return Vec::new();
        }
        text.split(',').map(str::to_owned).collect()
    }
}

/// Request to start a thread running a loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStart {
    module: Bytes,
}

impl ThreadStart {
    pub fn new(module: &str) -> Self {
        Self {
            module: Bytes::copy_from_slice(module.as_bytes()),
        }
    }

    pub fn module_name(&self) -> String {
        String::from_utf8_lossy(&self.module).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_wire_types() {
        for id in 1..=10u8 {
            let kind = lookup(id).unwrap();
            assert_eq!(kind.id, id);
            assert_eq!(kind.kind.wire_id(), Some(id));
        }
        assert!(lookup(0).is_none());
        assert!(lookup(11).is_none());
        assert!(lookup(0xFF).is_none());
    }

    #[test]
    fn sentinels_are_not_encodable() {
        assert_eq!(MessageType::Defective.id(), -1);
        assert_eq!(MessageType::Invalid.wire_id(), None);
        assert_eq!(
            Message::Defective.to_bytes(),
            Err(MessageError::NotEncodable("Defective"))
        );
        assert!(Message::Invalid.wire_id().is_err());
    }

    #[test]
    fn from_wire_dispatches_by_type() {
        assert_eq!(Message::from_wire(1, Bytes::new()).unwrap(), Message::Ack);
        assert_eq!(
            Message::from_wire(10, Bytes::from_static(b"mod1")).unwrap(),
            Message::ThreadStart(ThreadStart::new("mod1"))
        );
        assert_eq!(
            Message::from_wire(0, Bytes::new()),
            Err(MessageError::UnknownType(0))
        );
    }

    #[test]
    fn display_names_kind_and_id() {
        assert_eq!(Message::Ack.to_string(), "<Ack, type=1>");
        assert_eq!(
            Message::Sync(SyncParameters::host(true)).to_string(),
            "<Sync, type=3>"
        );
        assert_eq!(Message::Defective.to_string(), "<Defective, type=-1>");
    }

    #[test]
    fn sync_layout() {
        let params = SyncParameters {
            reset: true,
            receive_buffer_size: 50,
            word_size: 4,
            id: SyncParameters::pad_id(b"PyMite"),
        };
        let bytes = params.to_bytes();
        assert_eq!(bytes.len(), SYNC_DATA_LENGTH);
        assert_eq!(&bytes[..3], &[1, 50, 4]);
        assert_eq!(&bytes[3..9], b"PyMite");
        assert!(bytes[9..].iter().all(|&b| b == 0));

        let decoded = SyncParameters::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, params);
        assert_eq!(decoded.id_string(), "PyMite");
    }

    #[test]
    fn short_sync_is_malformed() {
        let err = SyncParameters::from_bytes(&[1, 50, 4]).unwrap_err();
        assert!(matches!(err, MessageError::Malformed { kind: "Sync", .. }));
    }

    #[test]
    fn host_sync_id_fits() {
        let host = SyncParameters::host(false);
        assert!(!host.reset);
        assert!(host.id_string().starts_with("rpplink "));
        assert_eq!(
            SyncParameters::pad_id(b"a very long identification string"),
            *b"a very long iden"
        );
    }

    #[test]
    fn thread_print_address_is_little_endian() {
        let print = ThreadPrint::new(Bytes::from_static(b"\x10\x20\x00\x00hi\n"));
        assert_eq!(print.thread_address(4), 0x2010);
        assert_eq!(print.text(4), b"hi\n");
        assert_eq!(print.text(16), b"");

        let built = ThreadPrint::from_parts(0x2010, 4, b"hi\n");
        assert_eq!(built, print);
    }

    #[test]
    fn thread_list_words_are_big_endian() {
        let list = ThreadList {
            data: Bytes::from_static(&[0x00, 0x00, 0x12, 0x34, 0x00, 0x01, 0x00, 0x00]),
        };
        assert_eq!(list.thread_addresses(4).unwrap(), vec![0x1234, 0x10000]);
        assert_eq!(list.thread_addresses(2).unwrap(), vec![0, 0x1234, 1, 0]);
        assert!(list.thread_addresses(3).is_err());
        assert!(list.thread_addresses(0).is_err());

        let built = ThreadList::from_addresses(&[0x1234, 0x10000], 4);
        assert_eq!(built, list);
        assert!(ThreadList::request().data().is_empty());
    }

    #[test]
    fn mem_list_parses_target_text() {
        let list = MemList::from_text(
            "{ 0:(\"RAM\",2048,1), 1:(\"Flash\",32768,0), 7:('EEPROM',512,1),}",
        );
        let spaces = list.mem_spaces().unwrap();
        assert_eq!(spaces.len(), 3);
        assert_eq!(
            spaces[&0],
            MemSpace {
                name: "RAM".into(),
                size: 2048,
                writeable: true
            }
        );
        assert!(!spaces[&1].writeable);
        assert_eq!(spaces[&7].name, "EEPROM");
    }

    #[test]
    fn mem_list_accepts_empty_and_bool_words() {
        assert!(MemList::from_text("{}").mem_spaces().unwrap().is_empty());
        let spaces = MemList::from_text("{0:('a',1,True)}").mem_spaces().unwrap();
        assert!(spaces[&0].writeable);
    }

    #[test]
    fn mem_list_rejects_garbage() {
        for text in ["", "{ 0:(\"RAM\"", "[1,2]", "{ 0:(\"a\",x,1)}", "{}}"] {
            assert!(
                matches!(
                    MemList::from_text(text).mem_spaces(),
                    Err(MessageError::Malformed { kind: "MemList", .. })
                ),
                "accepted {text:?}"
            );
        }
    }

    #[test]
    fn mem_add_block_single_segment() {
        let segments = MemAddBlock::segments(MODULE_MEMSPACE, b"abc", 44).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].data().as_ref(), b"\x07abc");

        // 42 data bytes + memspace = 43 < 44
        let segments = MemAddBlock::segments(2, &[0xAA; 42], 44).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].data().len(), 43);
    }

    #[test]
    fn mem_add_block_overlong_segments() {
        let data: Vec<u8> = (0..100u8).collect();
        let segments = MemAddBlock::segments(7, &data, 44).unwrap();

        assert_eq!(segments.len(), 3);
        let first = segments[0].data();
        assert_eq!(first.len(), 44);
        assert_eq!(&first[..3], &[100, 0, 7]);
        assert_eq!(&first[3..], &data[..41]);
        assert_eq!(segments[1].data().as_ref(), &data[41..85]);
        assert_eq!(segments[2].data().as_ref(), &data[85..]);
        assert!(segments[2].data().len() < 44);
    }

    #[test]
    fn mem_add_block_on_boundary_gets_empty_terminator() {
        // 41 bytes fill the first segment, 44 more fill the second.
        let data = vec![1u8; 41 + 44];
        let segments = MemAddBlock::segments(7, &data, 44).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].data().len(), 44);
        assert!(segments[2].data().is_empty());

        // Exactly one frame's worth is ambiguous as a single segment too.
        let segments = MemAddBlock::segments(7, &[0u8; 43], 44).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].data().len(), 44);
        assert_eq!(segments[1].data().len(), 2);
    }

    #[test]
    fn mem_add_block_limits() {
        assert!(MemAddBlock::segments(7, b"abc", 3).is_err());
        assert!(matches!(
            MemAddBlock::segments(7, &vec![0u8; 70_000], 44),
            Err(MessageError::TooLong { .. })
        ));
    }

    #[test]
    fn autorun_list_encoding() {
        let empty = AutorunList::from_names::<&str>(&[]);
        assert_eq!(empty.data().as_ref(), b"\0");
        assert!(!empty.is_request());
        assert!(empty.names().is_empty());

        let list = AutorunList::from_names(&["main", "blink"]);
        assert_eq!(list.data().as_ref(), b"main,blink");
        assert_eq!(list.names(), vec!["main", "blink"]);

        assert!(AutorunList::request().is_request());
        assert!(AutorunList::request().names().is_empty());
    }

    #[test]
    fn autorun_list_roundtrips_through_registry() {
        let list = AutorunList::from_names(&["a"]);
        let wire = Message::AutorunList(list.clone()).to_bytes().unwrap();
        let decoded = Message::from_wire(9, wire).unwrap();
        assert_eq!(decoded, Message::AutorunList(list));

        let empty = Message::AutorunList(AutorunList::from_names::<String>(&[]));
        match Message::from_wire(9, empty.to_bytes().unwrap()).unwrap() {
            Message::AutorunList(l) => assert!(l.names().is_empty()),
            other => panic!("unexpected {other}"),
        }
    }
}
