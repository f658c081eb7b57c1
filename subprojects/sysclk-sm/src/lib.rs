//! Service Manager Protocol Implementation.
//!
//! This crate provides stateless SM protocol operations. All operations are
//! methods on [`SmService`], which wraps an SM session handle.
//!
//! Only the CMIF protocol is implemented.

#![no_std]

use sysclk_sf::{Handle, Kernel, kernel, service::Service};
pub use sysclk_sf::ServiceName;

mod cmif;
pub mod proto;

pub use self::{
    cmif::{GetServiceError, RegisterClientError, RegisterServiceError, UnregisterServiceError},
    proto::SM_PORT_NAME,
};

/// Service Manager session wrapper.
///
/// Provides type safety to distinguish SM sessions from regular services.
#[derive(Debug)]
#[repr(transparent)]
pub struct SmService<K: Kernel>(Service<K>);

impl<K: Kernel> SmService<K> {
    /// Returns the underlying session handle.
    #[inline]
    pub fn session(&self) -> Handle {
        self.0.session()
    }

    /// Returns the kernel the session belongs to.
    #[inline]
    pub fn kernel(&self) -> &K {
        self.0.kernel()
    }

    /// Consumes and closes the SM session.
    #[inline]
    pub fn close(mut self) {
        self.0.close();
    }

    /// Gets a service handle by name.
    #[inline]
    pub fn get_service_handle(&self, name: ServiceName) -> Result<Handle, GetServiceError> {
        cmif::get_service_handle(&self.0, name)
    }

    /// Registers a service and returns its server port handle.
    #[inline]
    pub fn register_service(
        &self,
        name: ServiceName,
        is_light: bool,
        max_sessions: i32,
    ) -> Result<Handle, RegisterServiceError> {
        cmif::register_service(&self.0, name, is_light, max_sessions)
    }

    /// Unregisters a service.
    #[inline]
    pub fn unregister_service(&self, name: ServiceName) -> Result<(), UnregisterServiceError> {
        cmif::unregister_service(&self.0, name)
    }
}

/// Connects to the _Service Manager_.
///
/// Connects to the "sm:" named port and registers as a client. An absent
/// port is reported as [`ConnectError::Connect`]; the caller decides whether
/// to retry.
pub fn connect<K: Kernel>(kernel: K) -> Result<SmService<K>, ConnectError> {
    let handle = kernel
        .connect_to_named_port(SM_PORT_NAME)
        .map_err(ConnectError::Connect)?;

    let service = Service::new(kernel, handle);
    cmif::register_client(&service).map_err(ConnectError::RegisterClient)?;

    tracing::trace!(session = handle.to_raw(), "connected to sm");
    Ok(SmService(service))
}

/// Error returned by [`connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Failed to connect to the "sm:" named port.
    #[error("failed to connect to sm:")]
    Connect(#[source] kernel::ConnectError),
    /// Failed to register client with SM.
    #[error("failed to register client")]
    RegisterClient(#[source] RegisterClientError),
}
