//! CMIF (Command Message Interface Format) protocol implementation.
//!
//! CMIF is the command serialization layer built on top of HIPC. Every
//! request carries a magic-tagged header with the command ID, every reply a
//! magic-tagged header with the result code.
//!
//! # Message Format
//!
//! ```text
//! [HIPC Header + Descriptors]
//! [Padding to 16-byte alignment]
//! [InHeader / OutHeader (16 bytes)]
//! [Payload data]
//! ```
//!
//! # Magic Numbers
//!
//! - `"SFCI"` (0x49434653): Service Framework Command Input
//! - `"SFCO"` (0x4F434653): Service Framework Command Output
//!
//! # Buffers
//!
//! Send (type A) and receive (type B) buffers are passed by address. The
//! server maps them through [`IncomingRequest::in_buffer`] and
//! [`IncomingRequest::out_buffer`], which is only sound while client and
//! server share one address space or the kernel has mapped the memory.
//!
//! # References
//!
//! - [Switchbrew IPC Marshalling](https://switchbrew.org/wiki/IPC_Marshalling)

use alloc::vec::Vec;
use core::{mem::size_of, ops::Range, slice};

use static_assertions::const_assert_eq;

use crate::{
    buffer::MessageBuffer,
    hipc::{self, BufferDescriptor, BufferMode, LayoutError},
    kernel::RawHandle,
    result::{Error, ResultCode, module},
};

/// Magic number for CMIF input headers ("SFCI" - Service Framework Command Input).
pub const IN_HEADER_MAGIC: u32 = 0x49434653;

/// Magic number for CMIF output headers ("SFCO" - Service Framework Command Output).
pub const OUT_HEADER_MAGIC: u32 = 0x4F434653;

/// The request carried a command ID the server does not implement.
pub const RESULT_UNKNOWN_COMMAND_ID: ResultCode = ResultCode::from_parts(module::CMIF, 221);

/// The request header was malformed.
pub const RESULT_INVALID_IN_HEADER: ResultCode = ResultCode::from_parts(module::CMIF, 211);

/// HIPC message type used for replies.
const RESPONSE_MESSAGE_TYPE: u16 = 0;

/// CMIF command type (stored in HIPC message type field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    /// Invalid command.
    Invalid = 0,
    /// Legacy request (pre-5.0.0).
    LegacyRequest = 1,
    /// Close session.
    Close = 2,
    /// Legacy control request.
    LegacyControl = 3,
    /// Standard request.
    Request = 4,
    /// Control request (domain conversion, cloning, etc.).
    Control = 5,
    /// Request with context token (5.0.0+).
    RequestWithContext = 6,
    /// Control request with context token.
    ControlWithContext = 7,
}

impl CommandType {
    /// Decodes a raw HIPC message type.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::Invalid,
            1 => Self::LegacyRequest,
            2 => Self::Close,
            3 => Self::LegacyControl,
            4 => Self::Request,
            5 => Self::Control,
            6 => Self::RequestWithContext,
            7 => Self::ControlWithContext,
            _ => return None,
        })
    }

    /// Returns `true` for the request types that carry a command header.
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::LegacyRequest | Self::Request | Self::RequestWithContext
        )
    }
}

impl From<CommandType> for hipc::MessageType {
    fn from(cmd: CommandType) -> Self {
        hipc::MessageType::from_raw(cmd as u16)
    }
}

/// CMIF input header (16 bytes).
///
/// Present at the start of every CMIF request payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct InHeader {
    /// Magic number (`"SFCI"` = 0x49434653).
    pub magic: u32,
    /// Protocol version (0 = standard, 1 = with context).
    pub version: u32,
    /// Command/method ID to invoke.
    pub command_id: u32,
    /// Context token for versioning.
    pub token: u32,
}

const_assert_eq!(size_of::<InHeader>(), 16);

impl InHeader {
    /// Serializes the header in wire order.
    pub fn to_bytes(&self) -> [u8; 16] {
        words_to_bytes([self.magic, self.version, self.command_id, self.token])
    }

    /// Deserializes a header from wire order.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let [magic, version, command_id, token] = bytes_to_words(bytes);
        Self {
            magic,
            version,
            command_id,
            token,
        }
    }
}

/// CMIF output header (16 bytes).
///
/// Present at the start of every CMIF response payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct OutHeader {
    /// Magic number (`"SFCO"` = 0x4F434653).
    pub magic: u32,
    /// Protocol version.
    pub version: u32,
    /// Result code (0 = success).
    pub result: u32,
    /// Echo of request token.
    pub token: u32,
}

const_assert_eq!(size_of::<OutHeader>(), 16);

impl OutHeader {
    /// Serializes the header in wire order.
    pub fn to_bytes(&self) -> [u8; 16] {
        words_to_bytes([self.magic, self.version, self.result, self.token])
    }

    /// Deserializes a header from wire order.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let [magic, version, result, token] = bytes_to_words(bytes);
        Self {
            magic,
            version,
            result,
            token,
        }
    }
}

/// Describes the shape of a CMIF request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFormat {
    /// Command ID.
    pub request_id: u32,
    /// Context token. Non-zero selects [`CommandType::RequestWithContext`].
    pub context: u32,
    /// Size of the inline payload in bytes.
    pub data_size: usize,
    /// Number of send (type A) buffers.
    pub num_in_buffers: u32,
    /// Number of receive (type B) buffers.
    pub num_out_buffers: u32,
    /// Number of copy handles.
    pub num_handles: u32,
    /// Whether the kernel should stamp the caller's process ID.
    pub send_pid: bool,
}

impl RequestFormat {
    /// Starts a builder for command `request_id`.
    pub fn builder(request_id: u32) -> RequestFormatBuilder {
        RequestFormatBuilder::new(request_id)
    }
}

/// Builder for [`RequestFormat`].
#[derive(Debug, Clone, Copy)]
pub struct RequestFormatBuilder {
    fmt: RequestFormat,
}

impl RequestFormatBuilder {
    /// Creates a builder for command `request_id`.
    pub fn new(request_id: u32) -> Self {
        Self {
            fmt: RequestFormat {
                request_id,
                ..Default::default()
            },
        }
    }

    /// Sets the context token.
    pub fn context(mut self, context: u32) -> Self {
        self.fmt.context = context;
        self
    }

    /// Sets the inline payload size.
    pub fn data_size(mut self, size: usize) -> Self {
        self.fmt.data_size = size;
        self
    }

    /// Sets the number of send buffers.
    pub fn in_buffers(mut self, count: u32) -> Self {
        self.fmt.num_in_buffers = count;
        self
    }

    /// Sets the number of receive buffers.
    pub fn out_buffers(mut self, count: u32) -> Self {
        self.fmt.num_out_buffers = count;
        self
    }

    /// Sets the number of copy handles.
    pub fn handles(mut self, count: u32) -> Self {
        self.fmt.num_handles = count;
        self
    }

    /// Requests the process ID to be sent.
    pub fn send_pid(mut self) -> Self {
        self.fmt.send_pid = true;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> RequestFormat {
        self.fmt
    }
}

/// Builds a CMIF request message in `buf`.
///
/// Writes the HIPC framing and the CMIF header and reserves space for the
/// payload. The returned [`Request`] is used to fill the payload and attach
/// buffers and handles.
pub fn make_request(buf: &mut MessageBuffer, fmt: RequestFormat) -> Result<Request<'_>, LayoutError> {
    let command_type = if fmt.context != 0 {
        CommandType::RequestWithContext
    } else {
        CommandType::Request
    };

    let num_data_words = data_words_for(fmt.data_size);
    let meta = hipc::Metadata {
        message_type: command_type.into(),
        num_send_buffers: fmt.num_in_buffers as usize,
        num_recv_buffers: fmt.num_out_buffers as usize,
        num_data_words,
        send_pid: fmt.send_pid,
        num_copy_handles: fmt.num_handles as usize,
        ..Default::default()
    };

    let layout = hipc::make_request(buf, meta)?;
    let header_at = aligned_start(&layout);
    let header = InHeader {
        magic: IN_HEADER_MAGIC,
        version: if fmt.context != 0 { 1 } else { 0 },
        command_id: fmt.request_id,
        token: fmt.context,
    };
    buf.write_slice(header_at, &header.to_bytes());

    let data_at = header_at + size_of::<InHeader>();
    let data = data_at..data_at + fmt.data_size;
    buf.bytes_mut(data.clone()).fill(0);

    Ok(Request {
        buf,
        layout,
        data,
        send_buffer_idx: 0,
        recv_buffer_idx: 0,
        copy_handle_idx: 0,
    })
}

/// Builds a CMIF close request, telling the server to tear down the session.
pub fn make_close_request(buf: &mut MessageBuffer) -> Result<(), LayoutError> {
    let meta = hipc::Metadata {
        message_type: CommandType::Close.into(),
        ..Default::default()
    };
    hipc::make_request(buf, meta).map(|_| ())
}

/// A CMIF request being built.
#[derive(Debug)]
pub struct Request<'a> {
    buf: &'a mut MessageBuffer,
    layout: hipc::Layout,
    data: Range<usize>,
    send_buffer_idx: usize,
    recv_buffer_idx: usize,
    copy_handle_idx: usize,
}

impl Request<'_> {
    /// Returns the inline payload area.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.buf.bytes_mut(self.data.clone())
    }

    /// Attaches the next send buffer.
    ///
    /// Only the address is recorded; `buffer` must stay alive and unmoved
    /// until the request has been sent.
    pub fn add_in_buffer(&mut self, buffer: &[u8], mode: BufferMode) -> Result<(), LayoutError> {
        let desc = BufferDescriptor::new_buffer(
            buffer.as_ptr().expose_provenance(),
            buffer.len(),
            mode,
        );
        self.layout
            .set_send_buffer(self.buf, self.send_buffer_idx, desc)?;
        self.send_buffer_idx += 1;
        Ok(())
    }

    /// Attaches the next receive buffer.
    ///
    /// Only the address is recorded; `buffer` must stay alive and unmoved
    /// until the reply has been received.
    pub fn add_out_buffer(&mut self, buffer: &mut [u8], mode: BufferMode) -> Result<(), LayoutError> {
        let desc = BufferDescriptor::new_buffer(
            buffer.as_mut_ptr().expose_provenance(),
            buffer.len(),
            mode,
        );
        self.layout
            .set_recv_buffer(self.buf, self.recv_buffer_idx, desc)?;
        self.recv_buffer_idx += 1;
        Ok(())
    }

    /// Attaches the next copy handle.
    pub fn add_handle(&mut self, handle: RawHandle) -> Result<(), LayoutError> {
        self.layout
            .set_copy_handle(self.buf, self.copy_handle_idx, handle)?;
        self.copy_handle_idx += 1;
        Ok(())
    }
}

/// Parses a CMIF response message.
///
/// Validates the magic number and the result code, then checks that at
/// least `size` payload bytes are present.
pub fn parse_response(buf: &MessageBuffer, size: usize) -> Result<Response<'_>, ParseResponseError> {
    let parsed = hipc::parse_response(buf)?;
    let layout = parsed.layout;
    let header_at = aligned_start(&layout);
    let end = layout.data_words().end;

    if header_at + size_of::<OutHeader>() > end {
        return Err(ParseResponseError::InvalidMagic);
    }

    let header = OutHeader::from_bytes(buf.read_array(header_at));
    if header.magic != OUT_HEADER_MAGIC {
        return Err(ParseResponseError::InvalidMagic);
    }

    if let Some(err) = Error::new(ResultCode::from_raw(header.result)) {
        return Err(ParseResponseError::ServiceError(err));
    }

    let data_at = header_at + size_of::<OutHeader>();
    let available = end - data_at;
    if available < size {
        return Err(ParseResponseError::Truncated {
            expected: size,
            actual: available,
        });
    }

    Ok(Response {
        buf,
        layout,
        data: data_at..data_at + size,
    })
}

/// Error returned by [`parse_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseResponseError {
    /// HIPC framing of the reply is malformed.
    #[error("malformed reply framing")]
    Layout(#[from] LayoutError),
    /// Response contains invalid CMIF magic header.
    #[error("invalid CMIF magic header")]
    InvalidMagic,
    /// Service returned a non-zero result code.
    #[error("service error: {0}")]
    ServiceError(Error),
    /// Reply payload is shorter than the command's output.
    #[error("reply payload truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the command expects.
        expected: usize,
        /// Bytes the reply carries.
        actual: usize,
    },
}

/// A parsed CMIF response.
#[derive(Debug)]
pub struct Response<'a> {
    buf: &'a MessageBuffer,
    layout: hipc::Layout,
    data: Range<usize>,
}

impl<'a> Response<'a> {
    /// Returns the payload bytes requested in [`parse_response`].
    pub fn data(&self) -> &'a [u8] {
        self.buf.bytes(self.data.clone())
    }

    /// Returns the move handle at `idx`, if the reply carries one.
    pub fn move_handle(&self, idx: usize) -> Option<RawHandle> {
        self.layout.move_handle(self.buf, idx)
    }

    /// Returns the copy handle at `idx`, if the reply carries one.
    pub fn copy_handle(&self, idx: usize) -> Option<RawHandle> {
        self.layout.copy_handle(self.buf, idx)
    }
}

/// A request received by a server, copied out of the message buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    /// Request kind from the HIPC header.
    pub command_type: CommandType,
    /// Command ID. Zero for [`CommandType::Close`].
    pub command_id: u32,
    /// Context token.
    pub token: u32,
    /// Process ID stamped by the kernel, if requested.
    pub pid: Option<u64>,
    /// Inline payload, up to the end of the data words.
    pub payload: Vec<u8>,
    /// Send (type A) buffer descriptors.
    pub send_buffers: Vec<BufferDescriptor>,
    /// Receive (type B) buffer descriptors.
    pub recv_buffers: Vec<BufferDescriptor>,
    /// Copy handles.
    pub copy_handles: Vec<RawHandle>,
}

impl IncomingRequest {
    /// Returns `true` if the client asked to close the session.
    pub fn is_close(&self) -> bool {
        self.command_type == CommandType::Close
    }

    /// Maps the send buffer at `idx`.
    ///
    /// # Safety
    ///
    /// The descriptor must describe memory readable by this process for the
    /// returned lifetime, i.e. the client is blocked in the same address
    /// space or the kernel has mapped the buffer.
    pub unsafe fn in_buffer<'b>(&self, idx: usize) -> Option<&'b [u8]> {
        let desc = self.send_buffers.get(idx)?;
        if desc.address() == 0 || desc.size() == 0 {
            return Some(&[]);
        }
        let ptr = core::ptr::with_exposed_provenance::<u8>(desc.address());
        // SAFETY: caller guarantees the described range is mapped and readable.
        Some(unsafe { slice::from_raw_parts(ptr, desc.size()) })
    }

    /// Maps the receive buffer at `idx` for writing.
    ///
    /// # Safety
    ///
    /// The descriptor must describe memory writable by this process for the
    /// returned lifetime and not aliased by any other live reference.
    pub unsafe fn out_buffer<'b>(&self, idx: usize) -> Option<&'b mut [u8]> {
        let desc = self.recv_buffers.get(idx)?;
        if desc.address() == 0 || desc.size() == 0 {
            return Some(&mut []);
        }
        let ptr = core::ptr::with_exposed_provenance_mut::<u8>(desc.address());
        // SAFETY: caller guarantees exclusive access to the described range.
        Some(unsafe { slice::from_raw_parts_mut(ptr, desc.size()) })
    }
}

/// Parses an incoming request (server side).
pub fn parse_request(buf: &MessageBuffer) -> Result<IncomingRequest, ParseRequestError> {
    let parsed = hipc::parse_request(buf)?;
    let layout = parsed.layout;
    let meta = *layout.meta();

    let raw_type = meta.message_type.to_raw();
    let command_type =
        CommandType::from_raw(raw_type).ok_or(ParseRequestError::UnknownCommandType(raw_type))?;

    let send_buffers = (0..meta.num_send_buffers)
        .filter_map(|idx| layout.send_buffer(buf, idx))
        .collect();
    let recv_buffers = (0..meta.num_recv_buffers)
        .filter_map(|idx| layout.recv_buffer(buf, idx))
        .collect();
    let copy_handles = (0..meta.num_copy_handles)
        .filter_map(|idx| layout.copy_handle(buf, idx))
        .collect();

    let mut request = IncomingRequest {
        command_type,
        command_id: 0,
        token: 0,
        pid: parsed.pid,
        payload: Vec::new(),
        send_buffers,
        recv_buffers,
        copy_handles,
    };

    if !command_type.is_request() {
        return Ok(request);
    }

    let header_at = aligned_start(&layout);
    let end = layout.data_words().end;
    if header_at + size_of::<InHeader>() > end {
        return Err(ParseRequestError::InvalidHeader);
    }

    let header = InHeader::from_bytes(buf.read_array(header_at));
    if header.magic != IN_HEADER_MAGIC {
        return Err(ParseRequestError::InvalidHeader);
    }

    request.command_id = header.command_id;
    request.token = header.token;
    request.payload = buf
        .bytes(header_at + size_of::<InHeader>()..end)
        .to_vec();
    Ok(request)
}

/// Error returned by [`parse_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseRequestError {
    /// HIPC framing of the request is malformed.
    #[error("malformed request framing")]
    Layout(#[from] LayoutError),
    /// The HIPC message type is not a CMIF command type.
    #[error("unknown command type {0}")]
    UnknownCommandType(u16),
    /// The CMIF header is missing or carries the wrong magic.
    #[error("invalid CMIF request header")]
    InvalidHeader,
}

impl ParseRequestError {
    /// Result code a server replies with for this error.
    pub fn result_code(&self) -> ResultCode {
        RESULT_INVALID_IN_HEADER
    }
}

/// Builds a CMIF reply carrying `result` in `buf`.
///
/// `data_size` payload bytes and `num_move_handles` handle slots are
/// reserved; failure replies normally reserve neither.
pub fn make_response(
    buf: &mut MessageBuffer,
    result: ResultCode,
    data_size: usize,
    num_move_handles: usize,
) -> Result<ResponseWriter<'_>, LayoutError> {
    let meta = hipc::Metadata {
        message_type: hipc::MessageType::from_raw(RESPONSE_MESSAGE_TYPE),
        num_data_words: data_words_for(data_size),
        num_move_handles,
        ..Default::default()
    };

    let layout = hipc::make_request(buf, meta)?;
    let header_at = aligned_start(&layout);
    let header = OutHeader {
        magic: OUT_HEADER_MAGIC,
        version: 0,
        result: result.to_raw(),
        token: 0,
    };
    buf.write_slice(header_at, &header.to_bytes());

    let data_at = header_at + size_of::<OutHeader>();
    let data = data_at..data_at + data_size;
    buf.bytes_mut(data.clone()).fill(0);

    Ok(ResponseWriter {
        buf,
        layout,
        data,
        move_handle_idx: 0,
    })
}

/// A CMIF reply being built.
#[derive(Debug)]
pub struct ResponseWriter<'a> {
    buf: &'a mut MessageBuffer,
    layout: hipc::Layout,
    data: Range<usize>,
    move_handle_idx: usize,
}

impl ResponseWriter<'_> {
    /// Returns the reply payload area.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.buf.bytes_mut(self.data.clone())
    }

    /// Attaches the next move handle.
    pub fn add_move_handle(&mut self, handle: RawHandle) -> Result<(), LayoutError> {
        self.layout
            .set_move_handle(self.buf, self.move_handle_idx, handle)?;
        self.move_handle_idx += 1;
        Ok(())
    }
}

/// Number of data words needed for the alignment padding, a CMIF header
/// and `data_size` payload bytes.
#[inline]
fn data_words_for(data_size: usize) -> usize {
    let mut size = 16 + size_of::<InHeader>() + data_size;
    size = (size + 1) & !1;
    size.div_ceil(4)
}

/// Offset of the 16-byte aligned CMIF header within the data words.
#[inline]
fn aligned_start(layout: &hipc::Layout) -> usize {
    (layout.data_words().start + 0xF) & !0xF
}

#[inline]
fn words_to_bytes(words: [u32; 4]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

#[inline]
fn bytes_to_words(bytes: [u8; 16]) -> [u32; 4] {
    let mut out = [0u32; 4];
    for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_is_sixteen_byte_aligned() {
        let mut buf = MessageBuffer::new();
        let fmt = RequestFormat::builder(11).data_size(8).out_buffers(1).build();
        let mut req = make_request(&mut buf, fmt).expect("fits");
        req.data_mut().copy_from_slice(&[1, 0, 0, 0, 32, 0, 0, 0]);

        let parsed = parse_request(&buf).expect("parses");
        assert_eq!(parsed.command_type, CommandType::Request);
        assert_eq!(parsed.command_id, 11);
        assert_eq!(&parsed.payload[..8], &[1, 0, 0, 0, 32, 0, 0, 0]);
        assert_eq!(parsed.recv_buffers.len(), 1);
    }

    #[test]
    fn context_switches_the_command_type() {
        let mut buf = MessageBuffer::new();
        let fmt = RequestFormat::builder(3).context(7).build();
        make_request(&mut buf, fmt).expect("fits");

        let parsed = parse_request(&buf).expect("parses");
        assert_eq!(parsed.command_type, CommandType::RequestWithContext);
        assert_eq!(parsed.token, 7);
    }

    #[test]
    fn response_round_trips_payload_and_handles() {
        let mut buf = MessageBuffer::new();
        let mut writer = make_response(&mut buf, ResultCode::SUCCESS, 4, 1).expect("fits");
        writer.data_mut().copy_from_slice(&4u32.to_le_bytes());
        writer.add_move_handle(0x1234).expect("slot");

        let resp = parse_response(&buf, 4).expect("success");
        assert_eq!(resp.data(), &4u32.to_le_bytes());
        assert_eq!(resp.move_handle(0), Some(0x1234));
        assert_eq!(resp.move_handle(1), None);
    }

    #[test]
    fn failure_result_is_surfaced() {
        let mut buf = MessageBuffer::new();
        let rc = ResultCode::from_parts(388, 1);
        make_response(&mut buf, rc, 0, 0).expect("fits");

        match parse_response(&buf, 0) {
            Err(ParseResponseError::ServiceError(err)) => assert_eq!(err.result_code(), rc),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn short_reply_is_truncated() {
        let mut buf = MessageBuffer::new();
        make_response(&mut buf, ResultCode::SUCCESS, 0, 0).expect("fits");

        assert!(matches!(
            parse_response(&buf, 64),
            Err(ParseResponseError::Truncated { expected: 64, .. })
        ));
    }

    #[test]
    fn bad_magic_is_rejected_both_ways() {
        let mut buf = MessageBuffer::new();
        make_request(&mut buf, RequestFormat::builder(0).build()).expect("fits");
        assert_eq!(
            parse_response(&buf, 0).map(|_| ()),
            Err(ParseResponseError::InvalidMagic)
        );

        let mut buf = MessageBuffer::new();
        let meta = hipc::Metadata {
            message_type: CommandType::Request.into(),
            num_data_words: 8,
            ..Default::default()
        };
        hipc::make_request(&mut buf, meta).expect("fits");
        assert_eq!(parse_request(&buf), Err(ParseRequestError::InvalidHeader));
    }

    #[test]
    fn close_request_has_no_header() {
        let mut buf = MessageBuffer::new();
        make_close_request(&mut buf).expect("fits");

        let parsed = parse_request(&buf).expect("parses");
        assert!(parsed.is_close());
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn copy_handles_reach_the_server() {
        let mut buf = MessageBuffer::new();
        let fmt = RequestFormat::builder(4).data_size(4).handles(2).build();
        let mut req = make_request(&mut buf, fmt).expect("fits");
        req.data_mut().copy_from_slice(&5u32.to_le_bytes());
        req.add_handle(0x10).expect("slot");
        req.add_handle(0x11).expect("slot");
        assert_eq!(req.add_handle(0x12), Err(LayoutError::SlotOutOfRange));

        let parsed = parse_request(&buf).expect("parses");
        assert_eq!(parsed.copy_handles, [0x10, 0x11]);
        assert_eq!(&parsed.payload[..4], &5u32.to_le_bytes());
    }

    #[test]
    fn parsing_is_deterministic_with_buffers() {
        let mut output = [0u8; 8];

        let mut buf = MessageBuffer::new();
        let fmt = RequestFormat::builder(2).out_buffers(1).build();
        let mut req = make_request(&mut buf, fmt).expect("fits");
        req.add_out_buffer(&mut output, BufferMode::Normal).expect("slot");

        let first = parse_request(&buf).expect("parses");
        let second = parse_request(&buf).expect("parses");
        assert_eq!(first, second);
        assert_eq!(
            first.recv_buffers[0],
            BufferDescriptor::new_buffer(output.as_ptr().expose_provenance(), 8, BufferMode::Normal)
        );
    }

    #[test]
    fn buffers_map_back_to_the_caller_memory() {
        let input = [9u8, 8, 7];
        let mut output = [0u8; 4];

        let mut buf = MessageBuffer::new();
        let fmt = RequestFormat::builder(1).in_buffers(1).out_buffers(1).build();
        let mut req = make_request(&mut buf, fmt).expect("fits");
        req.add_in_buffer(&input, BufferMode::Normal).expect("slot");
        req.add_out_buffer(&mut output, BufferMode::Normal).expect("slot");

        let parsed = parse_request(&buf).expect("parses");
        // SAFETY: both buffers live on this stack frame for the whole test.
        unsafe {
            assert_eq!(parsed.in_buffer(0), Some(&input[..]));
            parsed.out_buffer(0).expect("slot").copy_from_slice(b"ok!\0");
        }
        assert_eq!(&output, b"ok!\0");
    }
}
