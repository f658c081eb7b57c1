//! Client configuration.

use sysclk_sf::{Handle, ServiceName};

/// How a [`SysClkClient`](crate::SysClkClient) reaches the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Name looked up through SM and claimed by the discovery probe.
    pub service_name: ServiceName,
    /// Pre-connected session to use instead of an SM lookup.
    ///
    /// The handle belongs to whoever supplied it and is never closed by
    /// the client.
    pub service_override: Option<Handle>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_name: sysclk_ipc::SERVICE_NAME,
            service_override: None,
        }
    }
}

impl ClientConfig {
    /// Starts a builder from the defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the service name.
    pub fn service_name(mut self, name: ServiceName) -> Self {
        self.config.service_name = name;
        self
    }

    /// Uses `session` instead of looking the service up.
    pub fn service_override(mut self, session: Handle) -> Self {
        self.config.service_override = Some(session);
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
