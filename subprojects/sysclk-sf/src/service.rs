//! Service abstraction for IPC communication.
//!
//! A [`Service`] wraps an IPC session handle together with the [`Kernel`]
//! that issued it and sends requests built by the CMIF layer.
//!
//! # Service Types
//!
//! | Type | own_handle | Description |
//! |------|------------|-------------|
//! | Owned | true | Session opened by this process; closed on drop |
//! | Override | false | Pre-connected session supplied by the host; never closed |

use crate::{
    buffer::MessageBuffer,
    cmif,
    kernel::{Handle, Kernel, SendSyncError},
};

/// IPC service wrapper.
#[derive(Debug)]
pub struct Service<K: Kernel> {
    kernel: K,
    session: Handle,
    own_handle: bool,
}

impl<K: Kernel> Service<K> {
    /// Wraps a session handle this process owns.
    ///
    /// The session is closed when the service is closed or dropped.
    pub fn new(kernel: K, session: Handle) -> Self {
        Self {
            kernel,
            session,
            own_handle: true,
        }
    }

    /// Wraps a pre-connected session supplied by the host environment.
    ///
    /// The handle is borrowed: closing the service leaves it open.
    pub fn new_override(kernel: K, session: Handle) -> Self {
        Self {
            kernel,
            session,
            own_handle: false,
        }
    }

    /// Returns the session handle.
    #[inline]
    pub fn session(&self) -> Handle {
        self.session
    }

    /// Returns the kernel backing this service.
    #[inline]
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Returns whether the service has a valid session handle.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.session.is_valid()
    }

    /// Returns whether this is an override service.
    #[inline]
    pub fn is_override(&self) -> bool {
        self.is_active() && !self.own_handle
    }

    /// Sends the request in `msg` and waits for the reply in place.
    pub fn send(&self, msg: &mut MessageBuffer) -> Result<(), SendSyncError> {
        if !self.is_active() {
            return Err(SendSyncError::InvalidHandle);
        }
        self.kernel.send_sync_request(self.session, msg)
    }

    /// Closes the service and releases resources.
    ///
    /// Owned sessions get a CMIF close request followed by closing the
    /// kernel handle. Override sessions are simply forgotten.
    pub fn close(&mut self) {
        if !self.is_active() {
            return;
        }

        if self.own_handle {
            let mut msg = MessageBuffer::new();
            if cmif::make_close_request(&mut msg).is_ok() {
                let _ = self.kernel.send_sync_request(self.session, &mut msg);
            }
            let _ = self.kernel.close_handle(self.session);
        }

        self.session = Handle::INVALID;
        self.own_handle = false;
    }
}

impl<K: Kernel> Drop for Service<K> {
    fn drop(&mut self) {
        self.close();
    }
}
