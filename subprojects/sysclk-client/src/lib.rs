//! sys-clk client session manager.
//!
//! A process talks to the sys-clk daemon over a single IPC channel. Many
//! components may need it at once, so the channel is reference counted: the
//! first [`SysClkClient::acquire`] opens it and the drop of the last
//! [`Session`] closes it again.
//!
//! ```ignore
//! let client = SysClkClient::new(kernel, ClientConfig::default());
//! let session = client.acquire()?;
//! session.set_override(Module::Gpu, 768_000_000)?;
//! let context = session.get_current_context()?;
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use sysclk_ipc::{
    ClockContext, CommandError, ConfigValueList, MAX_FREQ_LIST_COUNT, Module, SysClkService,
    TitleProfileList,
};
use sysclk_sf::Kernel;

mod config;
mod error;

pub use self::{
    config::{ClientConfig, ClientConfigBuilder},
    error::{AcquireError, ProbeError},
};

/// Size of the buffer [`Session::version_string`] hands to the daemon.
pub const VERSION_STRING_CAPACITY: usize = 0x100;

/// Owner of the process's connection to the sys-clk daemon.
#[derive(Debug)]
pub struct SysClkClient<K: Kernel + Clone> {
    kernel: K,
    config: ClientConfig,
    state: Mutex<State<K>>,
}

#[derive(Debug)]
struct State<K: Kernel> {
    refs: usize,
    service: Option<SysClkService<K>>,
}

impl<K: Kernel + Clone> SysClkClient<K> {
    /// Creates a client. Nothing is connected until the first acquire.
    pub fn new(kernel: K, config: ClientConfig) -> Self {
        Self {
            kernel,
            config,
            state: Mutex::new(State {
                refs: 0,
                service: None,
            }),
        }
    }

    /// Returns the configuration the client was created with.
    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Takes a reference on the daemon channel, opening it if needed.
    ///
    /// On failure the reference count is left untouched and nothing stays
    /// open.
    pub fn acquire(&self) -> Result<Session<'_, K>, AcquireError> {
        let mut state = self.lock();
        if state.refs == 0 {
            state.service = Some(self.open()?);
        }
        state.refs += 1;
        tracing::debug!(service = %self.config.service_name, refs = state.refs, "acquired");
        Ok(Session { client: self })
    }

    /// Checks whether the daemon is running.
    ///
    /// The check briefly claims the daemon's service name, so it is refused
    /// while this client holds the channel.
    pub fn is_running(&self) -> Result<bool, ProbeError> {
        let state = self.lock();
        if state.refs > 0 {
            return Err(ProbeError::SessionHeld);
        }

        let sm = sysclk_sm::connect(self.kernel.clone()).map_err(ProbeError::ConnectSm)?;
        let running = sysclk_ipc::is_running_named(&sm, self.config.service_name);
        sm.close();
        drop(state);

        running.map_err(ProbeError::Probe)
    }

    /// Number of live [`Session`]s.
    pub fn ref_count(&self) -> usize {
        self.lock().refs
    }

    /// Returns `true` while the daemon channel is open.
    pub fn is_connected(&self) -> bool {
        self.lock().service.is_some()
    }

    fn open(&self) -> Result<SysClkService<K>, AcquireError> {
        if let Some(session) = self.config.service_override {
            if !session.is_valid() {
                return Err(AcquireError::InvalidOverride);
            }
            tracing::debug!(session = session.to_raw(), "using service override");
            return Ok(SysClkService::from_override(self.kernel.clone(), session));
        }

        let sm = sysclk_sm::connect(self.kernel.clone()).map_err(AcquireError::ConnectSm)?;
        let service = sysclk_ipc::connect_named(&sm, self.config.service_name);
        sm.close();

        service.map_err(AcquireError::Connect)
    }

    fn release(&self) {
        let mut state = self.lock();
        state.refs = state.refs.saturating_sub(1);
        tracing::debug!(service = %self.config.service_name, refs = state.refs, "released");

        if state.refs == 0 {
            if let Some(service) = state.service.take() {
                service.close();
                tracing::debug!(service = %self.config.service_name, "closed");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_service<T>(
        &self,
        f: impl FnOnce(&SysClkService<K>) -> Result<T, CommandError>,
    ) -> Result<T, CommandError> {
        let state = self.lock();
        let service = state.service.as_ref().ok_or(CommandError::NotConnected)?;
        f(service)
    }
}

/// A reference on the daemon channel.
///
/// Commands sent through sessions of the same client are serialized.
/// Cloning takes another reference; dropping releases one.
#[derive(Debug)]
#[must_use = "dropping the session releases the channel"]
pub struct Session<'a, K: Kernel + Clone> {
    client: &'a SysClkClient<K>,
}

impl<K: Kernel + Clone> Clone for Session<'_, K> {
    fn clone(&self) -> Self {
        let mut state = self.client.lock();
        state.refs += 1;
        Self {
            client: self.client,
        }
    }
}

impl<K: Kernel + Clone> Drop for Session<'_, K> {
    fn drop(&mut self) {
        self.client.release();
    }
}

impl<'a, K: Kernel + Clone> Session<'a, K> {
    /// Returns the client this session belongs to.
    #[inline]
    pub fn client(&self) -> &'a SysClkClient<K> {
        self.client
    }

    /// Checks the daemon still answers on the open channel.
    pub fn ping(&self) -> bool {
        match self.get_api_version() {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "ping failed");
                false
            }
        }
    }

    /// Returns the daemon's protocol version.
    pub fn get_api_version(&self) -> Result<u32, CommandError> {
        self.client.with_service(|s| s.get_api_version())
    }

    /// Writes the version string into `out`, returning its length.
    pub fn get_version_string(&self, out: &mut [u8]) -> Result<usize, CommandError> {
        self.client.with_service(|s| s.get_version_string(out))
    }

    /// Returns the daemon version string.
    pub fn version_string(&self) -> Result<String, CommandError> {
        let mut buf = [0u8; VERSION_STRING_CAPACITY];
        let len = self.get_version_string(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    /// Returns a snapshot of the daemon's live state.
    pub fn get_current_context(&self) -> Result<ClockContext, CommandError> {
        self.client.with_service(|s| s.get_current_context())
    }

    /// Asks the daemon to shut down.
    ///
    /// The channel stays open until the last session is dropped.
    pub fn exit(&self) -> Result<(), CommandError> {
        self.client.with_service(|s| s.exit())
    }

    /// Returns how many profile entries are configured for `tid`.
    pub fn get_profile_count(&self, tid: u64) -> Result<u8, CommandError> {
        self.client.with_service(|s| s.get_profile_count(tid))
    }

    /// Returns the whole profile list of `tid`.
    pub fn get_profiles(&self, tid: u64) -> Result<TitleProfileList, CommandError> {
        self.client.with_service(|s| s.get_profiles(tid))
    }

    /// Replaces the whole profile list of `tid`.
    pub fn set_profiles(&self, tid: u64, profiles: &TitleProfileList) -> Result<(), CommandError> {
        self.client.with_service(|s| s.set_profiles(tid, profiles))
    }

    /// Enables or disables clock management.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), CommandError> {
        self.client.with_service(|s| s.set_enabled(enabled))
    }

    /// Sets a temporary override for `module`. Zero returns it to automatic.
    pub fn set_override(&self, module: Module, hz: u32) -> Result<(), CommandError> {
        self.client.with_service(|s| s.set_override(module, hz))
    }

    /// Returns the whole daemon configuration.
    pub fn get_config_values(&self) -> Result<ConfigValueList, CommandError> {
        self.client.with_service(|s| s.get_config_values())
    }

    /// Replaces the whole daemon configuration.
    pub fn set_config_values(&self, values: &ConfigValueList) -> Result<(), CommandError> {
        self.client.with_service(|s| s.set_config_values(values))
    }

    /// Copies up to `out.len()` entries of `module`'s frequency table.
    pub fn get_freq_list(&self, module: Module, out: &mut [u32]) -> Result<usize, CommandError> {
        self.client.with_service(|s| s.get_freq_list(module, out))
    }

    /// Returns as much of `module`'s frequency table as one call allows.
    pub fn freq_list(&self, module: Module) -> Result<Vec<u32>, CommandError> {
        let mut buf = [0u32; MAX_FREQ_LIST_COUNT];
        let count = self.get_freq_list(module, &mut buf)?;
        Ok(buf[..count].to_vec())
    }
}
