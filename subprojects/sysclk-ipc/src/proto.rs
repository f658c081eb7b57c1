//! sys-clk protocol constants.

use sysclk_sf::ServiceName;

/// Service name the daemon registers with SM.
pub const SERVICE_NAME: ServiceName = ServiceName::new_truncate("sys:clk");

/// Protocol version reported by GetApiVersion.
///
/// Bumped whenever a command is added or a wire shape changes.
pub const API_VERSION: u32 = 4;

/// Maximum number of entries a single GetFreqList call may request.
pub const MAX_FREQ_LIST_COUNT: usize = 32;

/// Commands understood by the daemon.
///
/// IDs are stable across versions; new commands only ever get new IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Returns [`API_VERSION`] of the daemon.
    GetApiVersion = 0,
    /// Writes the daemon version string into a receive buffer.
    GetVersionString = 1,
    /// Returns the live [`ClockContext`](crate::ClockContext).
    GetCurrentContext = 2,
    /// Asks the daemon to shut down.
    Exit = 3,
    /// Returns the number of configured entries for a title.
    GetProfileCount = 4,
    /// Returns a title's whole profile list.
    GetProfiles = 5,
    /// Replaces a title's whole profile list.
    SetProfiles = 6,
    /// Enables or disables clock management.
    SetEnabled = 7,
    /// Sets or clears a temporary per-module override.
    SetOverride = 8,
    /// Returns the whole daemon configuration.
    GetConfigValues = 9,
    /// Replaces the whole daemon configuration.
    SetConfigValues = 10,
    /// Copies a module's frequency table into a receive buffer.
    GetFreqList = 11,
}

impl Command {
    /// Every command, in ID order.
    pub const ALL: [Self; 12] = [
        Self::GetApiVersion,
        Self::GetVersionString,
        Self::GetCurrentContext,
        Self::Exit,
        Self::GetProfileCount,
        Self::GetProfiles,
        Self::SetProfiles,
        Self::SetEnabled,
        Self::SetOverride,
        Self::GetConfigValues,
        Self::SetConfigValues,
        Self::GetFreqList,
    ];

    /// Decodes a CMIF command ID.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Returns the CMIF command ID.
    #[inline]
    pub const fn id(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        for (idx, cmd) in Command::ALL.iter().enumerate() {
            assert_eq!(cmd.id() as usize, idx);
            assert_eq!(Command::from_raw(cmd.id()), Some(*cmd));
        }
        assert_eq!(Command::GetFreqList.id(), 11);
        assert_eq!(Command::from_raw(12), None);
    }

    #[test]
    fn service_name_is_not_truncated() {
        assert_eq!(SERVICE_NAME, "sys:clk");
    }
}
