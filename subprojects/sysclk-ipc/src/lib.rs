//! sys-clk Service Implementation.
//!
//! This crate speaks the IPC protocol of the sys-clk clock management daemon
//! (`sys:clk`): it defines the command set, the data model exchanged over it
//! and the frequency tables the daemon validates overrides against.
//!
//! ## Architecture
//!
//! - [`SysClkService`]: client session wrapper, one method per command
//! - [`server`]: daemon-side dispatch onto a [`server::SysClkHandler`]
//! - [`is_running`]: discovery probe via service registration

#![no_std]

use sysclk_sf::{Handle, Kernel, ServiceName, service::Service};
use sysclk_sm::{GetServiceError, RegisterServiceError, SmService, UnregisterServiceError};

mod cmif;
mod config;
mod context;
mod error;
pub mod freq;
mod profiles;
mod proto;
pub mod server;
mod types;
mod wire;

pub use self::{
    cmif::CommandError,
    config::{ConfigValue, ConfigValueList, InvalidConfigValue},
    context::ClockContext,
    error::{SYSCLK_ERROR_MODULE, SysClkError},
    freq::FreqTable,
    profiles::{DuplicateEntry, TitleProfileList},
    proto::{API_VERSION, Command, MAX_FREQ_LIST_COUNT, SERVICE_NAME},
    types::{Module, PowerSensor, Profile, ThermalSensor},
};

/// sys-clk service session wrapper.
#[derive(Debug)]
#[repr(transparent)]
pub struct SysClkService<K: Kernel>(Service<K>);

impl<K: Kernel> SysClkService<K> {
    /// Wraps a pre-connected session that this process does not own.
    ///
    /// Closing the service leaves the handle open.
    pub fn from_override(kernel: K, session: Handle) -> Self {
        Self(Service::new_override(kernel, session))
    }

    /// Returns the underlying session handle.
    #[inline]
    pub fn session(&self) -> Handle {
        self.0.session()
    }

    /// Returns whether the session is an override.
    #[inline]
    pub fn is_override(&self) -> bool {
        self.0.is_override()
    }

    /// Consumes and closes the session.
    #[inline]
    pub fn close(mut self) {
        self.0.close();
    }

    /// Returns the daemon's protocol version.
    #[inline]
    pub fn get_api_version(&self) -> Result<u32, CommandError> {
        cmif::get_api_version(&self.0)
    }

    /// Writes the daemon version string into `out`, returning its length.
    #[inline]
    pub fn get_version_string(&self, out: &mut [u8]) -> Result<usize, CommandError> {
        cmif::get_version_string(&self.0, out)
    }

    /// Returns a snapshot of the daemon's live state.
    #[inline]
    pub fn get_current_context(&self) -> Result<ClockContext, CommandError> {
        cmif::get_current_context(&self.0)
    }

    /// Asks the daemon to shut down.
    #[inline]
    pub fn exit(&self) -> Result<(), CommandError> {
        cmif::exit(&self.0)
    }

    /// Returns how many profile entries are configured for `tid`.
    #[inline]
    pub fn get_profile_count(&self, tid: u64) -> Result<u8, CommandError> {
        cmif::get_profile_count(&self.0, tid)
    }

    /// Returns the whole profile list of `tid`.
    #[inline]
    pub fn get_profiles(&self, tid: u64) -> Result<TitleProfileList, CommandError> {
        cmif::get_profiles(&self.0, tid)
    }

    /// Replaces the whole profile list of `tid`.
    #[inline]
    pub fn set_profiles(&self, tid: u64, profiles: &TitleProfileList) -> Result<(), CommandError> {
        cmif::set_profiles(&self.0, tid, profiles)
    }

    /// Enables or disables clock management.
    #[inline]
    pub fn set_enabled(&self, enabled: bool) -> Result<(), CommandError> {
        cmif::set_enabled(&self.0, enabled)
    }

    /// Sets a temporary override for `module`; zero returns it to automatic.
    #[inline]
    pub fn set_override(&self, module: Module, hz: u32) -> Result<(), CommandError> {
        cmif::set_override(&self.0, module, hz)
    }

    /// Returns the whole daemon configuration.
    #[inline]
    pub fn get_config_values(&self) -> Result<ConfigValueList, CommandError> {
        cmif::get_config_values(&self.0)
    }

    /// Replaces the whole daemon configuration.
    #[inline]
    pub fn set_config_values(&self, values: &ConfigValueList) -> Result<(), CommandError> {
        cmif::set_config_values(&self.0, values)
    }

    /// Copies up to `out.len()` entries of `module`'s frequency table.
    #[inline]
    pub fn get_freq_list(&self, module: Module, out: &mut [u32]) -> Result<usize, CommandError> {
        cmif::get_freq_list(&self.0, module, out)
    }
}

/// Connects to the sys-clk service.
pub fn connect<K: Kernel + Clone>(sm: &SmService<K>) -> Result<SysClkService<K>, ConnectError> {
    connect_named(sm, SERVICE_NAME)
}

/// Connects to a sys-clk compatible service registered under `name`.
pub fn connect_named<K: Kernel + Clone>(
    sm: &SmService<K>,
    name: ServiceName,
) -> Result<SysClkService<K>, ConnectError> {
    let handle = sm
        .get_service_handle(name)
        .map_err(ConnectError::GetService)?;

    tracing::debug!(service = %name, session = handle.to_raw(), "connected");
    Ok(SysClkService(Service::new(sm.kernel().clone(), handle)))
}

/// Error returned by [`connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Failed to get service handle from SM.
    #[error("failed to get service")]
    GetService(#[source] GetServiceError),
}

/// Checks whether the sys-clk daemon is running.
///
/// Tries to register the service name. If another process already owns it
/// the daemon is running. If the registration succeeds nobody owns it; the
/// claim is released at once and `false` is returned.
///
/// Must not race with the daemon's own startup, which would see the name
/// taken for the duration of the probe.
pub fn is_running<K: Kernel>(sm: &SmService<K>) -> Result<bool, IsRunningError> {
    is_running_named(sm, SERVICE_NAME)
}

/// [`is_running`] for a service registered under `name`.
pub fn is_running_named<K: Kernel>(
    sm: &SmService<K>,
    name: ServiceName,
) -> Result<bool, IsRunningError> {
    match sm.register_service(name, false, 1) {
        Ok(port) => {
            if let Err(err) = sm.kernel().close_handle(port) {
                tracing::warn!(service = %name, error = %err, "failed to close probe port");
            }
            sm.unregister_service(name)
                .map_err(IsRunningError::Unregister)?;
            tracing::debug!(service = %name, "probe claimed name, daemon not running");
            Ok(false)
        }
        Err(err) if err.is_already_registered() => {
            tracing::debug!(service = %name, "name already registered, daemon running");
            Ok(true)
        }
        Err(err) => Err(IsRunningError::Register(err)),
    }
}

/// Error returned by [`is_running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IsRunningError {
    /// Registration failed for a reason other than the name being taken.
    #[error("failed to register probe")]
    Register(#[source] RegisterServiceError),
    /// The probe claimed the name but could not release it.
    #[error("failed to release probe registration")]
    Unregister(#[source] UnregisterServiceError),
}
