//! Binary message framing
//!
//! A message is a fixed 20-byte header followed by `length` payload bytes:
//!
//! ```text
//! op_type:u32  op_count:u32  id:u32  flags:u32  length:u32   (all LE)
//! ```
//!
//! The payload is the concatenation of per-operation encodings in append
//! order. Builders append typed fields (1/4/8-byte little-endian integers,
//! length-prefixed byte runs, NUL-terminated strings); receivers read them
//! back in FIFO order.
//!
//! Bulk write data travels as *side payloads*: appended after the framed
//! message on the stream, never copied into the payload. Bulk read data is
//! likewise received after the framed reply.
//!
//! Ids are assigned from a process-wide monotonic counter; a reply copies
//! the request id so the client can match it.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use reef_core::semantics::Safety;
use reef_core::{Document, Error, Result};
use smallvec::SmallVec;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};

/// Size of the fixed message header.
pub const HEADER_SIZE: usize = 20;

/// Message operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageOp {
    /// Reserved
    None = 0,
    /// Create objects
    ObjectCreate = 1,
    /// Open objects
    ObjectOpen = 2,
    /// Delete objects
    ObjectDelete = 3,
    /// Close objects
    ObjectClose = 4,
    /// Query object modification time and size
    ObjectStatus = 5,
    /// Flush objects to durable media
    ObjectSync = 6,
    /// Read object byte ranges
    ObjectRead = 7,
    /// Write object byte ranges
    ObjectWrite = 8,
    /// List all object names in a namespace
    ObjectGetAll = 9,
    /// List object names with a prefix
    ObjectGetByPrefix = 10,
    /// Store key-value pairs
    KvPut = 11,
    /// Fetch values by key
    KvGet = 12,
    /// Delete key-value pairs
    KvDelete = 13,
    /// List all pairs in a namespace
    KvGetAll = 14,
    /// List pairs with a key prefix
    KvGetByPrefix = 15,
    /// Create database schemas
    DbSchemaCreate = 16,
    /// Fetch database schemas
    DbSchemaGet = 17,
    /// Delete database schemas
    DbSchemaDelete = 18,
    /// Insert database entries
    DbInsert = 19,
    /// Update database entries matching a selector
    DbUpdate = 20,
    /// Delete database entries matching a selector
    DbDelete = 21,
    /// Query database entries matching a selector
    DbQuery = 22,
    /// Fetch server statistics counters
    Statistics = 23,
}

impl MessageOp {
    /// Decode a wire value.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` for unknown values.
    pub fn from_u32(value: u32) -> Result<Self> {
        Ok(match value {
            0 => MessageOp::None,
            1 => MessageOp::ObjectCreate,
            2 => MessageOp::ObjectOpen,
            3 => MessageOp::ObjectDelete,
            4 => MessageOp::ObjectClose,
            5 => MessageOp::ObjectStatus,
            6 => MessageOp::ObjectSync,
            7 => MessageOp::ObjectRead,
            8 => MessageOp::ObjectWrite,
            9 => MessageOp::ObjectGetAll,
            10 => MessageOp::ObjectGetByPrefix,
            11 => MessageOp::KvPut,
            12 => MessageOp::KvGet,
            13 => MessageOp::KvDelete,
            14 => MessageOp::KvGetAll,
            15 => MessageOp::KvGetByPrefix,
            16 => MessageOp::DbSchemaCreate,
            17 => MessageOp::DbSchemaGet,
            18 => MessageOp::DbSchemaDelete,
            19 => MessageOp::DbInsert,
            20 => MessageOp::DbUpdate,
            21 => MessageOp::DbDelete,
            22 => MessageOp::DbQuery,
            23 => MessageOp::Statistics,
            other => return Err(Error::Protocol(format!("unknown op type: {other}"))),
        })
    }
}

/// Header flag bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageFlags(u32);

impl MessageFlags {
    /// This message is a reply.
    pub const REPLY: MessageFlags = MessageFlags(1 << 6);
    /// The sender waits for a network-level acknowledgment.
    pub const SAFETY_NETWORK: MessageFlags = MessageFlags(1 << 7);
    /// The sender waits for a storage-level acknowledgment.
    pub const SAFETY_STORAGE: MessageFlags = MessageFlags(1 << 8);
    /// Reserved for compressed payloads.
    pub const COMPRESSED: MessageFlags = MessageFlags(1 << 9);
    /// All modifier bits.
    pub const MODIFIER_MASK: MessageFlags =
        MessageFlags((1 << 6) | (1 << 7) | (1 << 8));

    /// Empty flag set.
    pub const fn empty() -> Self {
        MessageFlags(0)
    }

    /// Flags derived from a safety aspect: `network` requests a network
    /// acknowledgment, `storage` requests both.
    pub fn from_safety(safety: Safety) -> Self {
        match safety {
            Safety::None => MessageFlags::empty(),
            Safety::Network => MessageFlags::SAFETY_NETWORK,
            Safety::Storage => MessageFlags::SAFETY_NETWORK | MessageFlags::SAFETY_STORAGE,
        }
    }

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: MessageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether a reply is expected for a request carrying these flags.
    pub fn wants_reply(self) -> bool {
        self.contains(MessageFlags::SAFETY_NETWORK) || self.contains(MessageFlags::SAFETY_STORAGE)
    }

    /// Raw wire value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Construct from a raw wire value.
    pub fn from_bits(bits: u32) -> Self {
        MessageFlags(bits)
    }
}

impl std::ops::BitOr for MessageFlags {
    type Output = MessageFlags;

    fn bitor(self, rhs: MessageFlags) -> MessageFlags {
        MessageFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for MessageFlags {
    fn bitor_assign(&mut self, rhs: MessageFlags) {
        self.0 |= rhs.0;
    }
}

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

fn next_id() -> u32 {
    loop {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

/// A framed wire message.
#[derive(Debug)]
pub struct Message {
    op: MessageOp,
    op_count: u32,
    id: u32,
    flags: MessageFlags,
    payload: Vec<u8>,
    cursor: usize,
    send_data: SmallVec<[Bytes; 4]>,
}

impl Message {
    /// Create an empty message of the given op type with a fresh id.
    pub fn new(op: MessageOp) -> Self {
        Self::with_capacity(op, 0)
    }

    /// Create an empty message with an initial payload capacity.
    pub fn with_capacity(op: MessageOp, capacity: usize) -> Self {
        Self {
            op,
            op_count: 0,
            id: next_id(),
            flags: MessageFlags::empty(),
            payload: Vec::with_capacity(capacity),
            cursor: 0,
            send_data: SmallVec::new(),
        }
    }

    /// Create the reply skeleton for a request: same op type, same id,
    /// `REPLY` flag set, empty payload.
    pub fn reply_to(request: &Message) -> Self {
        Self {
            op: request.op,
            op_count: 0,
            id: request.id,
            flags: MessageFlags::REPLY,
            payload: Vec::new(),
            cursor: 0,
            send_data: SmallVec::new(),
        }
    }

    /// The operation type.
    pub fn op(&self) -> MessageOp {
        self.op
    }

    /// Number of sub-operations appended so far.
    pub fn op_count(&self) -> u32 {
        self.op_count
    }

    /// The message id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The header flags.
    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    /// Set additional header flags.
    pub fn add_flags(&mut self, flags: MessageFlags) {
        self.flags |= flags;
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Record one more sub-operation in the header.
    pub fn add_operation(&mut self) {
        self.op_count += 1;
    }

    // ---- builder API ------------------------------------------------------

    /// Append a single byte.
    pub fn append_1(&mut self, value: u8) {
        self.payload.push(value);
    }

    /// Append a little-endian u32.
    pub fn append_4(&mut self, value: u32) {
        self.payload.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian u64.
    pub fn append_8(&mut self, value: u64) {
        self.payload.extend_from_slice(&value.to_le_bytes());
    }

    /// Append raw bytes without a length prefix.
    pub fn append_n(&mut self, bytes: &[u8]) {
        self.payload.extend_from_slice(bytes);
    }

    /// Append a NUL-terminated string.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if the string contains NUL.
    pub fn append_str(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "string contains NUL: {value:?}"
            )));
        }
        self.payload.extend_from_slice(value.as_bytes());
        self.payload.push(0);
        Ok(())
    }

    /// Append a length-prefixed byte run (`u32` length, then the bytes).
    pub fn append_block(&mut self, bytes: &[u8]) {
        self.append_4(bytes.len() as u32);
        self.payload.extend_from_slice(bytes);
    }

    /// Append an encoded document as a length-prefixed block.
    pub fn append_doc(&mut self, doc: &Document) -> Result<()> {
        let bytes = doc.to_bytes()?;
        self.append_block(&bytes);
        Ok(())
    }

    /// Attach a bulk side payload sent after the framed message.
    pub fn add_send_data(&mut self, data: Bytes) {
        self.send_data.push(data);
    }

    /// Total bytes of attached side payloads.
    pub fn side_payload_len(&self) -> usize {
        self.send_data.iter().map(|d| d.len()).sum()
    }

    // ---- reader API -------------------------------------------------------

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        if self.cursor + len > self.payload.len() {
            return Err(Error::Protocol(format!(
                "message payload exhausted: need {len} bytes at {}, have {}",
                self.cursor,
                self.payload.len()
            )));
        }
        let slice = &self.payload[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn get_1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u32.
    pub fn get_4(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read a little-endian u64.
    pub fn get_8(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Read `len` raw bytes.
    pub fn get_n(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(self.take(len)?.to_vec())
    }

    /// Read a NUL-terminated string.
    pub fn get_str(&mut self) -> Result<String> {
        let rest = &self.payload[self.cursor..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Protocol("unterminated string in message".into()))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in message: {e}")))?
            .to_string();
        self.cursor += nul + 1;
        Ok(s)
    }

    /// Read a length-prefixed byte run.
    pub fn get_block(&mut self) -> Result<Vec<u8>> {
        let len = self.get_4()? as usize;
        self.get_n(len)
    }

    /// Read a length-prefixed document.
    pub fn get_doc(&mut self) -> Result<Document> {
        let bytes = self.get_block()?;
        Document::from_bytes(&bytes)
    }

    /// Whether the read cursor has consumed the whole payload.
    pub fn at_end(&self) -> bool {
        self.cursor >= self.payload.len()
    }

    // ---- framing ----------------------------------------------------------

    fn encode_header(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        LittleEndian::write_u32(&mut header[0..4], self.op as u32);
        LittleEndian::write_u32(&mut header[4..8], self.op_count);
        LittleEndian::write_u32(&mut header[8..12], self.id);
        LittleEndian::write_u32(&mut header[12..16], self.flags.bits());
        LittleEndian::write_u32(&mut header[16..20], self.payload.len() as u32);
        header
    }

    /// Write the framed message, then any side payloads.
    ///
    /// # Errors
    ///
    /// Any I/O failure fails the whole message; the caller must discard it
    /// and recycle the connection.
    pub fn send(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&self.encode_header())?;
        writer.write_all(&self.payload)?;
        for data in &self.send_data {
            writer.write_all(data)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read one framed message: exactly 20 header bytes, then exactly
    /// `length` payload bytes. A short read is an error.
    pub fn receive(reader: &mut impl Read) -> Result<Message> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;

        let op = MessageOp::from_u32(LittleEndian::read_u32(&header[0..4]))?;
        let op_count = LittleEndian::read_u32(&header[4..8]);
        let id = LittleEndian::read_u32(&header[8..12]);
        let flags = MessageFlags::from_bits(LittleEndian::read_u32(&header[12..16]));
        let length = LittleEndian::read_u32(&header[16..20]) as usize;

        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload)?;

        Ok(Message {
            op,
            op_count,
            id,
            flags,
            payload,
            cursor: 0,
            send_data: SmallVec::new(),
        })
    }

    /// Validate that `self` is the reply for `request`.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` on an id mismatch or a missing `REPLY` flag.
    pub fn expect_reply_for(&self, request: &Message) -> Result<()> {
        if !self.flags.contains(MessageFlags::REPLY) {
            return Err(Error::Protocol("expected a reply message".into()));
        }
        if self.id != request.id {
            return Err(Error::Protocol(format!(
                "reply id mismatch: expected {}, got {}",
                request.id, self.id
            )));
        }
        Ok(())
    }
}
