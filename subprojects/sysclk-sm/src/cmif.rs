//! CMIF protocol operations for Service Manager.

use core::mem::size_of;

use sysclk_sf::{
    Error, Handle, Kernel, MessageBuffer, ServiceName,
    cmif::{self, ParseResponseError},
    hipc::LayoutError,
    kernel::SendSyncError,
    service::Service,
};

use crate::proto::{self, RegisterServiceIn};

/// Registers the client with the Service Manager.
///
/// Sends the RegisterClient command (cmd 0) with PID.
pub fn register_client<K: Kernel>(service: &Service<K>) -> Result<(), RegisterClientError> {
    let mut msg = MessageBuffer::new();

    let fmt = cmif::RequestFormatBuilder::new(proto::REGISTER_CLIENT)
        .data_size(size_of::<u64>())
        .send_pid()
        .build();

    let mut req = cmif::make_request(&mut msg, fmt).map_err(RegisterClientError::BuildRequest)?;
    req.data_mut().copy_from_slice(&0u64.to_le_bytes());

    service
        .send(&mut msg)
        .map_err(RegisterClientError::SendRequest)?;

    cmif::parse_response(&msg, 0).map_err(RegisterClientError::ParseResponse)?;
    Ok(())
}

/// Error returned by [`register_client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterClientError {
    /// The request does not fit the message buffer.
    #[error("failed to build request")]
    BuildRequest(#[source] LayoutError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] SendSyncError),
    /// Failed to parse the CMIF response.
    #[error("failed to parse response")]
    ParseResponse(#[source] ParseResponseError),
}

/// Gets a service session handle by name.
pub fn get_service_handle<K: Kernel>(
    service: &Service<K>,
    name: ServiceName,
) -> Result<Handle, GetServiceError> {
    let mut msg = MessageBuffer::new();

    let fmt = cmif::RequestFormatBuilder::new(proto::GET_SERVICE_HANDLE)
        .data_size(size_of::<ServiceName>())
        .build();

    let mut req = cmif::make_request(&mut msg, fmt).map_err(GetServiceError::BuildRequest)?;
    req.data_mut().copy_from_slice(name.as_bytes());

    service.send(&mut msg).map_err(GetServiceError::SendRequest)?;

    let resp = cmif::parse_response(&msg, 0).map_err(GetServiceError::ParseResponse)?;
    let raw = resp.move_handle(0).ok_or(GetServiceError::MissingHandle)?;

    // SAFETY: the handle was moved to us by the kernel backing `service`.
    Ok(unsafe { Handle::from_raw(raw) })
}

/// Error returned by [`get_service_handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GetServiceError {
    /// The request does not fit the message buffer.
    #[error("failed to build request")]
    BuildRequest(#[source] LayoutError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] SendSyncError),
    /// Failed to parse the CMIF response.
    #[error("failed to parse response")]
    ParseResponse(#[source] ParseResponseError),
    /// Response did not contain the expected handle.
    #[error("missing handle in response")]
    MissingHandle,
}

impl GetServiceError {
    /// Returns the result code SM replied with, if the request reached SM.
    pub fn service_error(&self) -> Option<Error> {
        match self {
            Self::ParseResponse(ParseResponseError::ServiceError(err)) => Some(*err),
            _ => None,
        }
    }

    /// Returns `true` if no service is registered under the requested name.
    pub fn is_not_registered(&self) -> bool {
        self.service_error()
            .is_some_and(|err| err.result_code() == proto::RESULT_NOT_REGISTERED)
    }
}

/// Registers a service with the Service Manager.
///
/// Returns the server port handle on success.
pub fn register_service<K: Kernel>(
    service: &Service<K>,
    name: ServiceName,
    is_light: bool,
    max_sessions: i32,
) -> Result<Handle, RegisterServiceError> {
    let mut msg = MessageBuffer::new();

    let input = RegisterServiceIn {
        name,
        is_light,
        max_sessions,
    };

    let fmt = cmif::RequestFormatBuilder::new(proto::REGISTER_SERVICE)
        .data_size(RegisterServiceIn::SIZE)
        .build();

    let mut req = cmif::make_request(&mut msg, fmt).map_err(RegisterServiceError::BuildRequest)?;
    req.data_mut().copy_from_slice(&input.to_bytes());

    service
        .send(&mut msg)
        .map_err(RegisterServiceError::SendRequest)?;

    let resp = cmif::parse_response(&msg, 0).map_err(RegisterServiceError::ParseResponse)?;
    let raw = resp
        .move_handle(0)
        .ok_or(RegisterServiceError::MissingHandle)?;

    // SAFETY: the handle was moved to us by the kernel backing `service`.
    Ok(unsafe { Handle::from_raw(raw) })
}

/// Error returned by [`register_service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterServiceError {
    /// The request does not fit the message buffer.
    #[error("failed to build request")]
    BuildRequest(#[source] LayoutError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] SendSyncError),
    /// Failed to parse the CMIF response.
    #[error("failed to parse response")]
    ParseResponse(#[source] ParseResponseError),
    /// Response did not contain the expected handle.
    #[error("missing handle in response")]
    MissingHandle,
}

impl RegisterServiceError {
    /// Returns the result code SM replied with, if the request reached SM.
    pub fn service_error(&self) -> Option<Error> {
        match self {
            Self::ParseResponse(ParseResponseError::ServiceError(err)) => Some(*err),
            _ => None,
        }
    }

    /// Returns `true` if another process already owns the name.
    pub fn is_already_registered(&self) -> bool {
        self.service_error()
            .is_some_and(|err| err.result_code() == proto::RESULT_ALREADY_REGISTERED)
    }
}

/// Unregisters a service from the Service Manager.
pub fn unregister_service<K: Kernel>(
    service: &Service<K>,
    name: ServiceName,
) -> Result<(), UnregisterServiceError> {
    let mut msg = MessageBuffer::new();

    let fmt = cmif::RequestFormatBuilder::new(proto::UNREGISTER_SERVICE)
        .data_size(size_of::<ServiceName>())
        .build();

    let mut req =
        cmif::make_request(&mut msg, fmt).map_err(UnregisterServiceError::BuildRequest)?;
    req.data_mut().copy_from_slice(name.as_bytes());

    service
        .send(&mut msg)
        .map_err(UnregisterServiceError::SendRequest)?;

    cmif::parse_response(&msg, 0).map_err(UnregisterServiceError::ParseResponse)?;
    Ok(())
}

/// Error returned by [`unregister_service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UnregisterServiceError {
    /// The request does not fit the message buffer.
    #[error("failed to build request")]
    BuildRequest(#[source] LayoutError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] SendSyncError),
    /// Failed to parse the CMIF response.
    #[error("failed to parse response")]
    ParseResponse(#[source] ParseResponseError),
}

impl UnregisterServiceError {
    /// Returns the result code SM replied with, if the request reached SM.
    pub fn service_error(&self) -> Option<Error> {
        match self {
            Self::ParseResponse(ParseResponseError::ServiceError(err)) => Some(*err),
            _ => None,
        }
    }
}
