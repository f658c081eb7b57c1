//! Session manager errors.

/// Error returned by [`SysClkClient::acquire`](crate::SysClkClient::acquire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// Failed to reach the service manager.
    #[error("failed to connect to SM")]
    ConnectSm(#[source] sysclk_sm::ConnectError),
    /// The service manager could not hand out a session to the daemon.
    #[error("failed to connect to sys:clk")]
    Connect(#[source] sysclk_ipc::ConnectError),
    /// The configured service override is not a valid session handle.
    #[error("service override handle is invalid")]
    InvalidOverride,
}

impl AcquireError {
    /// Returns `true` if the daemon is not registered with SM.
    pub fn is_not_running(&self) -> bool {
        match self {
            Self::Connect(sysclk_ipc::ConnectError::GetService(err)) => err.is_not_registered(),
            Self::ConnectSm(_) | Self::InvalidOverride => false,
        }
    }
}

/// Error returned by [`SysClkClient::is_running`](crate::SysClkClient::is_running).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// This client holds a session; probing would claim the daemon's name
    /// from under it.
    #[error("cannot probe while a session is held")]
    SessionHeld,
    /// Failed to reach the service manager.
    #[error("failed to connect to SM")]
    ConnectSm(#[source] sysclk_sm::ConnectError),
    /// The registration probe itself failed.
    #[error("registration probe failed")]
    Probe(#[source] sysclk_ipc::IsRunningError),
}
