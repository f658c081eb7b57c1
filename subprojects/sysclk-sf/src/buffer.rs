//! IPC message buffer.
//!
//! On hardware every thread owns a message area at the start of its TLS
//! region; the kernel reads requests from it and writes replies back into it.
//! Here the buffer is an explicit value, one per in-flight request, so the
//! framing code never touches ambient thread state.

use core::ops::Range;

/// Size of an IPC message buffer in bytes.
pub const MESSAGE_BUFFER_SIZE: usize = 0x100;

/// A 16-byte aligned IPC message area.
#[derive(Clone)]
#[repr(C, align(16))]
pub struct MessageBuffer([u8; MESSAGE_BUFFER_SIZE]);

impl MessageBuffer {
    /// Creates a zeroed message buffer.
    #[inline]
    pub const fn new() -> Self {
        Self([0; MESSAGE_BUFFER_SIZE])
    }

    /// Returns the raw bytes of the message.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; MESSAGE_BUFFER_SIZE] {
        &self.0
    }

    /// Returns the raw bytes of the message for writing.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; MESSAGE_BUFFER_SIZE] {
        &mut self.0
    }

    /// Returns the bytes in `range`.
    ///
    /// Callers pass ranges produced by a validated HIPC layout, which never
    /// extend past the end of the buffer.
    #[inline]
    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.0[range]
    }

    #[inline]
    pub(crate) fn bytes_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.0[range]
    }

    #[inline]
    pub(crate) fn read_array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.0[offset..offset + N]);
        out
    }

    #[inline]
    pub(crate) fn write_slice(&mut self, offset: usize, bytes: &[u8]) {
        self.0[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[inline]
    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.read_array(offset))
    }

    #[inline]
    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_slice(offset, &value.to_le_bytes());
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("header", &format_args!("{:02x?}", &self.0[..16]))
            .finish_non_exhaustive()
    }
}
