//! HIPC (Horizon Inter-Process Communication) message framing.
//!
//! HIPC is the low-level wire format the kernel copies between client and
//! server. It carries the message type, kernel handles, buffer descriptors
//! and raw data words. CMIF ([`crate::cmif`]) lives inside the data words.
//!
//! # Message Layout
//!
//! ```text
//! Offset  Size   Field
//! ──────────────────────────────────────────────────────────────
//! 0x00    0x08   Header (message type, descriptor counts)
//! 0x08    0x04   SpecialHeader (optional: PID flag, handle counts)
//! 0x0C    0x08   ProcessId (optional: if send_pid is set)
//!         var    Copy Handles (4 bytes × num_copy_handles)
//!         var    Move Handles (4 bytes × num_move_handles)
//!         var    Send Statics / Type X (8 bytes each)
//!         var    Send Buffers / Type A (12 bytes each)
//!         var    Recv Buffers / Type B (12 bytes each)
//!         var    Exch Buffers / Type W (12 bytes each)
//!         var    Data Words (raw payload, 4 bytes each)
//! ──────────────────────────────────────────────────────────────
//! ```
//!
//! The sys-clk protocol only emits send (A) and receive (B) buffers. Static
//! and exchange descriptors are still accounted for when parsing so that the
//! data words of any well-formed message are located correctly.
//!
//! # Buffer Descriptor Encoding
//!
//! ```text
//! Bits 0-31:  size[0:31] (32 bits)
//! Bits 32-63: address[0:31] (32 bits)
//! Bits 64-65: mode (2 bits)
//! Bits 66-87: address[36:57] (22 bits)
//! Bits 88-91: size[32:35] (4 bits)
//! Bits 92-95: address[32:35] (4 bits)
//! ```
//!
//! # References
//!
//! - [Switchbrew IPC Marshalling](https://switchbrew.org/wiki/IPC_Marshalling)

use core::{mem::size_of, ops::Range};

use modular_bitfield::prelude::*;
use static_assertions::const_assert_eq;

use crate::{
    buffer::{MESSAGE_BUFFER_SIZE, MessageBuffer},
    kernel::RawHandle,
};

/// Size of a handle slot in the message.
const HANDLE_SIZE: usize = size_of::<RawHandle>();

/// Size of a static (type X) descriptor.
const STATIC_DESCRIPTOR_SIZE: usize = 8;

/// Largest count representable by the 4-bit descriptor and handle fields.
const MAX_DESCRIPTORS: usize = 0xF;

/// Largest count representable by the 10-bit data word field.
const MAX_DATA_WORDS: usize = 0x3FF;

/// Buffer transfer mode for HIPC buffer descriptors.
///
/// Controls how the kernel maps the buffer between processes.
#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq)]
#[bits = 2]
pub enum BufferMode {
    /// Normal buffer mapping.
    Normal = 0,
    /// Non-secure memory area.
    NonSecure = 1,
    /// Invalid/device memory (cannot be mapped).
    Invalid = 2,
    /// Non-device memory area.
    NonDevice = 3,
}

/// HIPC message header (8 bytes).
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
pub struct Header {
    /// Message type. Command type for CMIF.
    pub message_type: B16,
    /// Number of send static descriptors.
    pub num_send_statics: B4,
    /// Number of send buffer descriptors.
    pub num_send_buffers: B4,
    /// Number of receive buffer descriptors.
    pub num_recv_buffers: B4,
    /// Number of exchange buffer descriptors.
    pub num_exch_buffers: B4,
    /// Number of data words in the message.
    pub num_data_words: B10,
    /// Receive static mode (0 = none, 2 = auto, 2+n = n entries).
    pub recv_static_mode: B4,
    #[skip]
    __: B6,
    /// Offset to receive list (unused).
    pub recv_list_offset: B11,
    /// Whether a special header follows.
    pub has_special_header: bool,
}

const_assert_eq!(size_of::<Header>(), 8);

/// HIPC special header (4 bytes).
///
/// Present when the message includes a PID or handles.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialHeader {
    /// Whether the process ID follows.
    pub send_pid: bool,
    /// Number of copy handles.
    pub num_copy_handles: B4,
    /// Number of move handles.
    pub num_move_handles: B4,
    #[skip]
    __: B23,
}

const_assert_eq!(size_of::<SpecialHeader>(), 4);

/// Buffer descriptor for send/receive/exchange buffers (12 bytes).
///
/// Both address and size are split across multiple fields.
#[bitfield]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Size bits 0-31.
    pub size_low: B32,
    /// Address bits 0-31.
    pub address_low: B32,
    /// Buffer mode (Normal, NonSecure, etc.).
    pub mode: BufferMode,
    /// Address bits 36-57.
    pub address_high: B22,
    /// Size bits 32-35.
    pub size_high: B4,
    /// Address bits 32-35.
    pub address_mid: B4,
}

const_assert_eq!(size_of::<BufferDescriptor>(), 12);

impl BufferDescriptor {
    /// Creates a buffer descriptor for `size` bytes at `address`.
    pub fn new_buffer(address: usize, size: usize, mode: BufferMode) -> Self {
        let addr = address as u64;
        let size = size as u64;
        Self::new()
            .with_mode(mode)
            .with_address_low(addr as u32)
            .with_address_mid(((addr >> 32) & 0xF) as u8)
            .with_address_high(((addr >> 36) & 0x3F_FFFF) as u32)
            .with_size_low(size as u32)
            .with_size_high(((size >> 32) & 0xF) as u8)
    }

    /// Reconstructs the full address from the split fields.
    pub fn address(&self) -> usize {
        (self.address_low() as u64
            | ((self.address_mid() as u64) << 32)
            | ((self.address_high() as u64) << 36)) as usize
    }

    /// Reconstructs the full size from the split fields.
    pub fn size(&self) -> usize {
        (self.size_low() as u64 | ((self.size_high() as u64) << 32)) as usize
    }
}

/// Message type stored in the first header field.
///
/// Protocol-specific command types (CMIF) convert into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct MessageType(u16);

impl MessageType {
    /// Creates a message type from a raw value.
    #[inline]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw u16 value.
    #[inline]
    pub const fn to_raw(self) -> u16 {
        self.0
    }
}

/// High-level description of a message's shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Message type (protocol-specific command type).
    pub message_type: MessageType,
    /// Number of send static descriptors.
    pub num_send_statics: usize,
    /// Number of send buffer descriptors.
    pub num_send_buffers: usize,
    /// Number of receive buffer descriptors.
    pub num_recv_buffers: usize,
    /// Number of exchange buffer descriptors.
    pub num_exch_buffers: usize,
    /// Number of data words.
    pub num_data_words: usize,
    /// Whether to send the process ID.
    pub send_pid: bool,
    /// Number of copy handles.
    pub num_copy_handles: usize,
    /// Number of move handles.
    pub num_move_handles: usize,
}

impl Metadata {
    /// Returns whether this metadata requires a special header.
    ///
    /// A special header is needed when sending a PID or any handles.
    #[inline]
    pub const fn has_special_header(&self) -> bool {
        self.send_pid || self.num_copy_handles > 0 || self.num_move_handles > 0
    }
}

/// Offsets of every section of a message inside its [`MessageBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    meta: Metadata,
    pid: Option<usize>,
    copy_handles: usize,
    move_handles: usize,
    send_buffers: usize,
    recv_buffers: usize,
    data_words: usize,
    end: usize,
}

impl Layout {
    fn calc(meta: Metadata, mut cursor: usize) -> Result<Self, LayoutError> {
        let pid = if meta.send_pid {
            let at = cursor;
            cursor += size_of::<u64>();
            Some(at)
        } else {
            None
        };
        let copy_handles = cursor;
        let move_handles = copy_handles + meta.num_copy_handles * HANDLE_SIZE;
        let send_statics = move_handles + meta.num_move_handles * HANDLE_SIZE;
        let send_buffers = send_statics + meta.num_send_statics * STATIC_DESCRIPTOR_SIZE;
        let recv_buffers = send_buffers + meta.num_send_buffers * size_of::<BufferDescriptor>();
        let exch_buffers = recv_buffers + meta.num_recv_buffers * size_of::<BufferDescriptor>();
        let data_words = exch_buffers + meta.num_exch_buffers * size_of::<BufferDescriptor>();
        let end = data_words + meta.num_data_words * size_of::<u32>();

        if end > MESSAGE_BUFFER_SIZE {
            return Err(LayoutError::MessageTooLarge { size: end });
        }

        Ok(Self {
            meta,
            pid,
            copy_handles,
            move_handles,
            send_buffers,
            recv_buffers,
            data_words,
            end,
        })
    }

    /// Returns the metadata this layout was computed from.
    #[inline]
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Returns the byte range of the data words.
    #[inline]
    pub fn data_words(&self) -> Range<usize> {
        self.data_words..self.end
    }

    /// Returns the total message size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.end
    }

    /// Returns `true` if the message is only a header.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= size_of::<Header>()
    }

    /// Reads the process ID slot, if present.
    pub fn pid(&self, buf: &MessageBuffer) -> Option<u64> {
        self.pid.map(|at| u64::from_le_bytes(buf.read_array(at)))
    }

    /// Writes the process ID slot. Used by the kernel side of a transport.
    pub fn set_pid(&self, buf: &mut MessageBuffer, pid: u64) -> Result<(), LayoutError> {
        let at = self.pid.ok_or(LayoutError::SlotOutOfRange)?;
        buf.write_slice(at, &pid.to_le_bytes());
        Ok(())
    }

    /// Reads the copy handle at `idx`.
    pub fn copy_handle(&self, buf: &MessageBuffer, idx: usize) -> Option<RawHandle> {
        (idx < self.meta.num_copy_handles)
            .then(|| buf.read_u32(self.copy_handles + idx * HANDLE_SIZE))
    }

    /// Writes the copy handle at `idx`.
    pub fn set_copy_handle(
        &self,
        buf: &mut MessageBuffer,
        idx: usize,
        handle: RawHandle,
    ) -> Result<(), LayoutError> {
        if idx >= self.meta.num_copy_handles {
            return Err(LayoutError::SlotOutOfRange);
        }
        buf.write_u32(self.copy_handles + idx * HANDLE_SIZE, handle);
        Ok(())
    }

    /// Reads the move handle at `idx`.
    pub fn move_handle(&self, buf: &MessageBuffer, idx: usize) -> Option<RawHandle> {
        (idx < self.meta.num_move_handles)
            .then(|| buf.read_u32(self.move_handles + idx * HANDLE_SIZE))
    }

    /// Writes the move handle at `idx`.
    pub fn set_move_handle(
        &self,
        buf: &mut MessageBuffer,
        idx: usize,
        handle: RawHandle,
    ) -> Result<(), LayoutError> {
        if idx >= self.meta.num_move_handles {
            return Err(LayoutError::SlotOutOfRange);
        }
        buf.write_u32(self.move_handles + idx * HANDLE_SIZE, handle);
        Ok(())
    }

    /// Reads the send buffer (type A) descriptor at `idx`.
    pub fn send_buffer(&self, buf: &MessageBuffer, idx: usize) -> Option<BufferDescriptor> {
        (idx < self.meta.num_send_buffers).then(|| {
            let at = self.send_buffers + idx * size_of::<BufferDescriptor>();
            BufferDescriptor::from_bytes(buf.read_array(at))
        })
    }

    /// Writes the send buffer (type A) descriptor at `idx`.
    pub fn set_send_buffer(
        &self,
        buf: &mut MessageBuffer,
        idx: usize,
        desc: BufferDescriptor,
    ) -> Result<(), LayoutError> {
        if idx >= self.meta.num_send_buffers {
            return Err(LayoutError::SlotOutOfRange);
        }
        let at = self.send_buffers + idx * size_of::<BufferDescriptor>();
        buf.write_slice(at, &desc.into_bytes());
        Ok(())
    }

    /// Reads the receive buffer (type B) descriptor at `idx`.
    pub fn recv_buffer(&self, buf: &MessageBuffer, idx: usize) -> Option<BufferDescriptor> {
        (idx < self.meta.num_recv_buffers).then(|| {
            let at = self.recv_buffers + idx * size_of::<BufferDescriptor>();
            BufferDescriptor::from_bytes(buf.read_array(at))
        })
    }

    /// Writes the receive buffer (type B) descriptor at `idx`.
    pub fn set_recv_buffer(
        &self,
        buf: &mut MessageBuffer,
        idx: usize,
        desc: BufferDescriptor,
    ) -> Result<(), LayoutError> {
        if idx >= self.meta.num_recv_buffers {
            return Err(LayoutError::SlotOutOfRange);
        }
        let at = self.recv_buffers + idx * size_of::<BufferDescriptor>();
        buf.write_slice(at, &desc.into_bytes());
        Ok(())
    }
}

/// Error returned when a message does not fit its buffer or descriptor fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// The message would extend past the end of the message buffer.
    #[error("message of {size} bytes exceeds the IPC buffer")]
    MessageTooLarge {
        /// Size the message would need.
        size: usize,
    },
    /// A descriptor, handle or data word count does not fit its header field.
    #[error("too many {what} for one message")]
    CountOverflow {
        /// Which count overflowed.
        what: &'static str,
    },
    /// A slot index beyond the counts declared in the header.
    #[error("slot index out of range")]
    SlotOutOfRange,
}

/// Writes the HIPC headers described by `meta` and returns the section layout.
///
/// Requests and replies share this framing; only the message type differs.
pub fn make_request(buf: &mut MessageBuffer, meta: Metadata) -> Result<Layout, LayoutError> {
    check_count(meta.num_send_statics, MAX_DESCRIPTORS, "send statics")?;
    check_count(meta.num_send_buffers, MAX_DESCRIPTORS, "send buffers")?;
    check_count(meta.num_recv_buffers, MAX_DESCRIPTORS, "receive buffers")?;
    check_count(meta.num_exch_buffers, MAX_DESCRIPTORS, "exchange buffers")?;
    check_count(meta.num_copy_handles, MAX_DESCRIPTORS, "copy handles")?;
    check_count(meta.num_move_handles, MAX_DESCRIPTORS, "move handles")?;
    check_count(meta.num_data_words, MAX_DATA_WORDS, "data words")?;

    let has_special_header = meta.has_special_header();
    let mut cursor = size_of::<Header>();
    if has_special_header {
        cursor += size_of::<SpecialHeader>();
    }
    let layout = Layout::calc(meta, cursor)?;

    let header = Header::new()
        .with_message_type(meta.message_type.to_raw())
        .with_num_send_statics(meta.num_send_statics as u8)
        .with_num_send_buffers(meta.num_send_buffers as u8)
        .with_num_recv_buffers(meta.num_recv_buffers as u8)
        .with_num_exch_buffers(meta.num_exch_buffers as u8)
        .with_num_data_words(meta.num_data_words as u16)
        .with_recv_static_mode(0)
        .with_recv_list_offset(0)
        .with_has_special_header(has_special_header);
    buf.write_slice(0, &header.into_bytes());

    if has_special_header {
        let special = SpecialHeader::new()
            .with_send_pid(meta.send_pid)
            .with_num_copy_handles(meta.num_copy_handles as u8)
            .with_num_move_handles(meta.num_move_handles as u8);
        buf.write_slice(size_of::<Header>(), &special.into_bytes());
    }

    Ok(layout)
}

/// A message parsed from a buffer, either an incoming request or a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Section layout (includes the metadata).
    pub layout: Layout,
    /// Process ID carried by the message, if any.
    pub pid: Option<u64>,
}

/// Parses an incoming HIPC request (server side).
pub fn parse_request(buf: &MessageBuffer) -> Result<ParsedMessage, LayoutError> {
    parse(buf)
}

/// Parses an HIPC response (client side).
pub fn parse_response(buf: &MessageBuffer) -> Result<ParsedMessage, LayoutError> {
    parse(buf)
}

fn parse(buf: &MessageBuffer) -> Result<ParsedMessage, LayoutError> {
    let header = Header::from_bytes(buf.read_array(0));
    let mut cursor = size_of::<Header>();

    let mut meta = Metadata {
        message_type: MessageType::from_raw(header.message_type()),
        num_send_statics: header.num_send_statics() as usize,
        num_send_buffers: header.num_send_buffers() as usize,
        num_recv_buffers: header.num_recv_buffers() as usize,
        num_exch_buffers: header.num_exch_buffers() as usize,
        num_data_words: header.num_data_words() as usize,
        ..Default::default()
    };

    if header.has_special_header() {
        let special = SpecialHeader::from_bytes(buf.read_array(cursor));
        cursor += size_of::<SpecialHeader>();
        meta.send_pid = special.send_pid();
        meta.num_copy_handles = special.num_copy_handles() as usize;
        meta.num_move_handles = special.num_move_handles() as usize;
    }

    let layout = Layout::calc(meta, cursor)?;
    let pid = layout.pid(buf);
    Ok(ParsedMessage { layout, pid })
}

#[inline]
fn check_count(count: usize, max: usize, what: &'static str) -> Result<(), LayoutError> {
    if count > max {
        Err(LayoutError::CountOverflow { what })
    } else {
        Ok(())
    }
}
