//! Reference sys-clk daemon.
//!
//! Stores what clients send and reports it back the way the real daemon
//! does: overrides are clamped to the frequency table, profile lists and
//! configuration are replaced whole, and a missing configuration file makes
//! the configuration commands fail. There is no scheduling loop; the context
//! reports the target frequencies as if they had been applied.

use std::{
    array,
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use sysclk_ipc::{
    ClockContext, ConfigValueList, FreqTable, Module, PowerSensor, Profile, SysClkError,
    ThermalSensor, TitleProfileList, server::SysClkHandler,
};

/// Version string reported by default.
pub const DEFAULT_VERSION: &str = "sys-clk 2.0.1 (loopback)";

/// Frequency each module runs at when nothing else applies.
pub const fn stock_freq(module: Module) -> u32 {
    match module {
        Module::Cpu => 1_020_000_000,
        Module::Gpu => 384_000_000,
        Module::Mem => 1_600_000_000,
    }
}

/// Fixed temperature reading, in milli-degrees Celsius.
const fn sample_temp(sensor: ThermalSensor) -> u32 {
    match sensor {
        ThermalSensor::Soc => 48_500,
        ThermalSensor::Pcb => 41_000,
        ThermalSensor::Skin => 36_250,
    }
}

/// Fixed power reading, in milliwatts. Negative while charging.
const fn sample_power(sensor: PowerSensor) -> i32 {
    match sensor {
        PowerSensor::Now => -4_250,
        PowerSensor::Avg => -4_100,
    }
}

/// A daemon implementing the sys-clk command contract in memory.
#[derive(Debug)]
pub struct ReferenceDaemon {
    version: String,
    state: Mutex<DaemonState>,
}

#[derive(Debug)]
struct DaemonState {
    enabled: bool,
    application_id: u64,
    profile: Profile,
    overrides: [u32; Module::COUNT],
    profiles: HashMap<u64, TitleProfileList>,
    config: ConfigValueList,
    config_loaded: bool,
    fail_saves: bool,
    exit_requested: bool,
}

impl Default for ReferenceDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceDaemon {
    /// Creates a disabled daemon with a loaded default configuration.
    pub fn new() -> Self {
        Self::with_version(DEFAULT_VERSION)
    }

    /// Creates a daemon reporting `version`.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            state: Mutex::new(DaemonState {
                enabled: false,
                application_id: 0,
                profile: Profile::Handheld,
                overrides: [0; Module::COUNT],
                profiles: HashMap::new(),
                config: ConfigValueList::default(),
                config_loaded: true,
                fail_saves: false,
                exit_requested: false,
            }),
        }
    }

    /// Simulates a title launch under `profile`.
    pub fn set_foreground(&self, application_id: u64, profile: Profile) {
        let mut state = self.lock();
        state.application_id = application_id;
        state.profile = profile;
    }

    /// Controls whether the configuration file is considered loaded.
    pub fn set_config_loaded(&self, loaded: bool) {
        self.lock().config_loaded = loaded;
    }

    /// Makes every later save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Returns `true` once a client has sent Exit.
    pub fn exit_requested(&self) -> bool {
        self.lock().exit_requested
    }

    /// Returns whether clock management is enabled.
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Returns the stored override of `module`, zero if none.
    pub fn override_freq(&self, module: Module) -> u32 {
        self.lock().overrides[module.index()]
    }

    /// Number of titles with a stored profile list.
    pub fn stored_titles(&self) -> usize {
        self.lock().profiles.len()
    }

    fn lock(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DaemonState {
    fn loaded(&self) -> Result<(), SysClkError> {
        if self.config_loaded {
            Ok(())
        } else {
            Err(SysClkError::ConfigNotLoaded)
        }
    }

    fn saved(&self) -> Result<(), SysClkError> {
        if self.fail_saves {
            Err(SysClkError::ConfigSaveFailed)
        } else {
            Ok(())
        }
    }

    fn target(&self, module: Module) -> u32 {
        let forced = self.overrides[module.index()];
        if forced != 0 {
            return forced;
        }

        let profiled = self
            .profiles
            .get(&self.application_id)
            .map(|list| list.get(self.profile, module))
            .filter(|&hz| self.enabled && hz != 0);
        profiled
            .and_then(|hz| FreqTable::for_module(module).nearest_at_most(hz))
            .unwrap_or(stock_freq(module))
    }
}

impl SysClkHandler for ReferenceDaemon {
    fn version_string(&self) -> &str {
        &self.version
    }

    fn current_context(&self) -> Result<ClockContext, SysClkError> {
        let state = self.lock();
        let freqs: [u32; Module::COUNT] = array::from_fn(|i| state.target(Module::ALL[i]));
        Ok(ClockContext {
            enabled: state.enabled,
            application_id: state.application_id,
            profile: state.profile,
            freqs,
            override_freqs: state.overrides,
            temps: array::from_fn(|i| sample_temp(ThermalSensor::ALL[i])),
            power: array::from_fn(|i| sample_power(PowerSensor::ALL[i])),
            real_freqs: freqs,
        })
    }

    fn exit(&self) -> Result<(), SysClkError> {
        tracing::debug!("exit requested");
        self.lock().exit_requested = true;
        Ok(())
    }

    fn profile_count(&self, tid: u64) -> Result<u8, SysClkError> {
        let state = self.lock();
        state.loaded()?;
        let count = state.profiles.get(&tid).map_or(0, TitleProfileList::count);
        u8::try_from(count).map_err(|_| SysClkError::Generic)
    }

    fn profiles(&self, tid: u64) -> Result<TitleProfileList, SysClkError> {
        let state = self.lock();
        state.loaded()?;
        Ok(state.profiles.get(&tid).copied().unwrap_or_default())
    }

    fn set_profiles(&self, tid: u64, profiles: TitleProfileList) -> Result<(), SysClkError> {
        let mut state = self.lock();
        state.loaded()?;
        state.saved()?;
        if profiles.is_empty() {
            state.profiles.remove(&tid);
        } else {
            state.profiles.insert(tid, profiles);
        }
        tracing::debug!(tid, entries = profiles.count(), "profiles replaced");
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), SysClkError> {
        self.lock().enabled = enabled;
        Ok(())
    }

    fn set_override(&self, module: Module, hz: u32) -> Result<(), SysClkError> {
        let applied = if hz == 0 {
            0
        } else {
            self.freq_table(module)
                .nearest_at_most(hz)
                .ok_or(SysClkError::Generic)?
        };
        self.lock().overrides[module.index()] = applied;
        tracing::debug!(%module, requested = hz, applied, "override set");
        Ok(())
    }

    fn config_values(&self) -> Result<ConfigValueList, SysClkError> {
        let state = self.lock();
        state.loaded()?;
        Ok(state.config)
    }

    fn set_config_values(&self, values: ConfigValueList) -> Result<(), SysClkError> {
        let mut state = self.lock();
        state.loaded()?;
        values.validate().map_err(|_| SysClkError::Generic)?;
        state.saved()?;
        state.config = values;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_clamp_down_to_the_table() {
        let daemon = ReferenceDaemon::new();
        daemon.set_override(Module::Gpu, 800_000_000).expect("accepted");
        assert_eq!(daemon.override_freq(Module::Gpu), 768_000_000);

        daemon.set_override(Module::Gpu, 1).expect("accepted");
        assert_eq!(daemon.override_freq(Module::Gpu), 76_800_000);

        daemon.set_override(Module::Gpu, 0).expect("accepted");
        assert_eq!(daemon.override_freq(Module::Gpu), 0);
    }

    #[test]
    fn profiles_apply_only_while_enabled() {
        let daemon = ReferenceDaemon::new();
        let tid = 0x0100_0000_0000_1000;
        let mut list = TitleProfileList::new();
        list.set(Profile::Docked, Module::Cpu, 1_785_000_000);
        daemon.set_profiles(tid, list).expect("stored");
        daemon.set_foreground(tid, Profile::Docked);

        let ctx = daemon.current_context().expect("context");
        assert_eq!(ctx.freq(Module::Cpu), stock_freq(Module::Cpu));

        daemon.set_enabled(true).expect("enabled");
        let ctx = daemon.current_context().expect("context");
        assert_eq!(ctx.freq(Module::Cpu), 1_785_000_000);
        assert_eq!(ctx.freq(Module::Mem), stock_freq(Module::Mem));
    }

    #[test]
    fn configuration_commands_need_a_loaded_config() {
        let daemon = ReferenceDaemon::new();
        daemon.set_config_loaded(false);
        assert_eq!(daemon.config_values(), Err(SysClkError::ConfigNotLoaded));
        assert_eq!(daemon.profile_count(1), Err(SysClkError::ConfigNotLoaded));

        daemon.set_config_loaded(true);
        daemon.set_fail_saves(true);
        assert_eq!(
            daemon.set_config_values(ConfigValueList::default()),
            Err(SysClkError::ConfigSaveFailed)
        );
    }
}
