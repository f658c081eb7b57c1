//! Kernel transport seam.
//!
//! The IPC layers above only need three kernel services: connecting to a
//! named port, sending a synchronous request on a session and closing a
//! handle. [`Kernel`] captures exactly those. On hardware it is backed by the
//! `ConnectToNamedPort`, `SendSyncRequest` and `CloseHandle` SVCs operating
//! on the thread's message area; tests back it with an in-process router.
//!
//! ## Horizon OS Terminology
//!
//! - **Session**: A bidirectional IPC channel between a client and server.
//! - **Named Port**: A kernel object registered with a string name (e.g., `"sm:"`)
//!   that clients can connect to by name.
//! - **Client Session**: The handle held by the client side of an IPC session,
//!   used to send requests to the server.

use alloc::sync::Arc;
use core::ffi::CStr;

use crate::{
    buffer::MessageBuffer,
    result::{Error, module},
};

/// Raw kernel handle value.
pub type RawHandle = u32;

/// Invalid handle sentinel value.
pub const INVALID_HANDLE: RawHandle = 0;

/// Kernel result descriptions (module [`module::KERNEL`]) this stack reacts to.
pub mod desc {
    /// Port's maximum session limit reached.
    pub const OUT_OF_SESSIONS: u32 = 7;
    /// The calling thread is being terminated.
    pub const TERMINATION_REQUESTED: u32 = 59;
    /// Failed to allocate a kernel object.
    pub const OUT_OF_RESOURCE: u32 = 103;
    /// Process handle table is full.
    pub const OUT_OF_HANDLES: u32 = 105;
    /// The handle does not refer to a live object.
    pub const INVALID_HANDLE: u32 = 114;
    /// A name or value is out of range.
    pub const OUT_OF_RANGE: u32 = 119;
    /// No object registered with the given name.
    pub const NOT_FOUND: u32 = 121;
    /// The other end of the session has been closed.
    pub const SESSION_CLOSED: u32 = 123;
    /// A process resource limit was hit.
    pub const LIMIT_REACHED: u32 = 132;
}

/// A handle to a kernel object (session or port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Handle(RawHandle);

impl Handle {
    /// The invalid handle.
    pub const INVALID: Self = Self(INVALID_HANDLE);

    /// Converts a raw handle to a [`Handle`].
    ///
    /// # Safety
    ///
    /// Caller must guarantee that the raw handle was issued by the kernel the
    /// handle will be used with.
    #[inline]
    pub const unsafe fn from_raw(raw: RawHandle) -> Self {
        Self(raw)
    }

    /// Returns `true` if the handle is valid.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 != INVALID_HANDLE
    }

    /// Converts the [`Handle`] to a raw handle.
    #[inline]
    pub const fn to_raw(&self) -> RawHandle {
        self.0
    }
}

/// The kernel services used by the IPC stack.
pub trait Kernel: Send + Sync {
    /// Connects to a registered named port and returns a session handle.
    fn connect_to_named_port(&self, name: &CStr) -> Result<Handle, ConnectError>;

    /// Sends the request in `msg` on `session` and blocks until the server
    /// has written its reply back into `msg`.
    fn send_sync_request(&self, session: Handle, msg: &mut MessageBuffer)
    -> Result<(), SendSyncError>;

    /// Closes a handle, releasing the kernel object reference.
    fn close_handle(&self, handle: Handle) -> Result<(), CloseHandleError>;
}

impl<K: Kernel + ?Sized> Kernel for &K {
    #[inline]
    fn connect_to_named_port(&self, name: &CStr) -> Result<Handle, ConnectError> {
        (**self).connect_to_named_port(name)
    }

    #[inline]
    fn send_sync_request(
        &self,
        session: Handle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError> {
        (**self).send_sync_request(session, msg)
    }

    #[inline]
    fn close_handle(&self, handle: Handle) -> Result<(), CloseHandleError> {
        (**self).close_handle(handle)
    }
}

impl<K: Kernel + ?Sized> Kernel for Arc<K> {
    #[inline]
    fn connect_to_named_port(&self, name: &CStr) -> Result<Handle, ConnectError> {
        (**self).connect_to_named_port(name)
    }

    #[inline]
    fn send_sync_request(
        &self,
        session: Handle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError> {
        (**self).send_sync_request(session, msg)
    }

    #[inline]
    fn close_handle(&self, handle: Handle) -> Result<(), CloseHandleError> {
        (**self).close_handle(handle)
    }
}

/// Error returned by [`Kernel::connect_to_named_port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Port name exceeds 11 characters or is not null-terminated.
    #[error("Port name out of range")]
    OutOfRange,
    /// No port registered with the given name.
    #[error("Port not found")]
    NotFound,
    /// Process handle table is full.
    #[error("Out of handles")]
    OutOfHandles,
    /// Failed to allocate session object.
    #[error("Out of resource")]
    OutOfResource,
    /// Port's maximum session limit reached.
    #[error("Out of sessions")]
    OutOfSessions,
    /// Process session resource limit exceeded.
    #[error("Limit reached")]
    LimitReached,
    /// Unexpected kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

impl ConnectError {
    /// Classifies a kernel result code.
    pub fn from_error(err: Error) -> Self {
        if err.module() != module::KERNEL {
            return Self::Unknown(err);
        }
        match err.description() {
            desc::OUT_OF_RANGE => Self::OutOfRange,
            desc::NOT_FOUND => Self::NotFound,
            desc::OUT_OF_HANDLES => Self::OutOfHandles,
            desc::OUT_OF_RESOURCE => Self::OutOfResource,
            desc::OUT_OF_SESSIONS => Self::OutOfSessions,
            desc::LIMIT_REACHED => Self::LimitReached,
            _ => Self::Unknown(err),
        }
    }
}

/// Error returned by [`Kernel::send_sync_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendSyncError {
    /// Thread is terminating.
    #[error("Termination requested")]
    TerminationRequested,
    /// Failed to allocate session request.
    #[error("Out of resource")]
    OutOfResource,
    /// Invalid session handle.
    #[error("Invalid handle")]
    InvalidHandle,
    /// Session closed by server.
    #[error("Session closed")]
    SessionClosed,
    /// Unexpected kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

impl SendSyncError {
    /// Classifies a kernel result code.
    pub fn from_error(err: Error) -> Self {
        if err.module() != module::KERNEL {
            return Self::Unknown(err);
        }
        match err.description() {
            desc::TERMINATION_REQUESTED => Self::TerminationRequested,
            desc::OUT_OF_RESOURCE => Self::OutOfResource,
            desc::INVALID_HANDLE => Self::InvalidHandle,
            desc::SESSION_CLOSED => Self::SessionClosed,
            _ => Self::Unknown(err),
        }
    }
}

/// Error returned by [`Kernel::close_handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CloseHandleError {
    /// The handle does not refer to a live object.
    #[error("Invalid handle")]
    InvalidHandle,
    /// Unexpected kernel error.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

impl CloseHandleError {
    /// Classifies a kernel result code.
    pub fn from_error(err: Error) -> Self {
        if err.matches(module::KERNEL, desc::INVALID_HANDLE) {
            Self::InvalidHandle
        } else {
            Self::Unknown(err)
        }
    }
}
