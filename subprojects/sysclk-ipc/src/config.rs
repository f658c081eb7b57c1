//! Daemon-wide configuration values.

use crate::wire::{Reader, Writer};

/// Configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ConfigValue {
    /// Interval between clock adjustments.
    PollingIntervalMs = 0,
    /// Interval between temperature log lines. Zero disables.
    TempLogIntervalMs = 1,
    /// Interval between frequency log lines. Zero disables.
    FreqLogIntervalMs = 2,
    /// Interval between power log lines. Zero disables.
    PowerLogIntervalMs = 3,
    /// Interval between CSV context dumps. Zero disables.
    CsvWriteIntervalMs = 4,
}

impl ConfigValue {
    /// Every key, in wire order.
    pub const ALL: [Self; 5] = [
        Self::PollingIntervalMs,
        Self::TempLogIntervalMs,
        Self::FreqLogIntervalMs,
        Self::PowerLogIntervalMs,
        Self::CsvWriteIntervalMs,
    ];

    /// Number of keys.
    pub const COUNT: usize = Self::ALL.len();

    /// Decodes a wire value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Short name, as used in the daemon's config file.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PollingIntervalMs => "poll_interval_ms",
            Self::TempLogIntervalMs => "temp_log_interval_ms",
            Self::FreqLogIntervalMs => "freq_log_interval_ms",
            Self::PowerLogIntervalMs => "power_log_interval_ms",
            Self::CsvWriteIntervalMs => "csv_write_interval_ms",
        }
    }

    /// Human readable name.
    pub const fn pretty_name(self) -> &'static str {
        match self {
            Self::PollingIntervalMs => "Polling Interval (ms)",
            Self::TempLogIntervalMs => "Temperature Log Interval (ms)",
            Self::FreqLogIntervalMs => "Frequency Log Interval (ms)",
            Self::PowerLogIntervalMs => "Power Log Interval (ms)",
            Self::CsvWriteIntervalMs => "CSV Write Interval (ms)",
        }
    }

    /// Value used when the key is not configured.
    pub const fn default_value(self) -> u64 {
        match self {
            Self::PollingIntervalMs => 300,
            _ => 0,
        }
    }

    /// Returns `true` if `value` is acceptable for this key.
    pub const fn is_valid(self, value: u64) -> bool {
        match self {
            Self::PollingIntervalMs => value > 0,
            _ => true,
        }
    }
}

impl core::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.pretty_name())
    }
}

/// Error returned by [`ConfigValueList::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid value {value} for {key}")]
pub struct InvalidConfigValue {
    /// Offending key.
    pub key: ConfigValue,
    /// Rejected value.
    pub value: u64,
}

/// One value per [`ConfigValue`] key, exchanged whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigValueList {
    values: [u64; ConfigValue::COUNT],
}

impl Default for ConfigValueList {
    fn default() -> Self {
        Self {
            values: ConfigValue::ALL.map(ConfigValue::default_value),
        }
    }
}

impl ConfigValueList {
    /// Wire size in bytes.
    pub const SIZE: usize = ConfigValue::COUNT * 8;

    /// Returns the value of `key`.
    #[inline]
    pub fn get(&self, key: ConfigValue) -> u64 {
        self.values[key as usize]
    }

    /// Sets the value of `key`. Not validated until [`Self::validate`].
    #[inline]
    pub fn set(&mut self, key: ConfigValue, value: u64) {
        self.values[key as usize] = value;
    }

    /// Iterates `(key, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (ConfigValue, u64)> + '_ {
        ConfigValue::ALL.into_iter().zip(self.values.iter().copied())
    }

    /// Checks every value, reporting the first invalid one.
    pub fn validate(&self) -> Result<(), InvalidConfigValue> {
        match self.iter().find(|&(key, value)| !key.is_valid(value)) {
            Some((key, value)) => Err(InvalidConfigValue { key, value }),
            None => Ok(()),
        }
    }

    /// Serializes the list.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut w = Writer(&mut out);
        for (i, value) in self.values.iter().enumerate() {
            w.u64(8 * i, *value);
        }
        out
    }

    /// Deserializes a list. Returns `None` if `bytes` is too short.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let r = Reader(bytes);
        let mut values = [0u64; ConfigValue::COUNT];
        for (i, slot) in values.iter_mut().enumerate() {
            *slot = r.u64(8 * i)?;
        }
        Some(Self { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let list = ConfigValueList::default();
        assert_eq!(list.get(ConfigValue::PollingIntervalMs), 300);
        assert_eq!(list.get(ConfigValue::CsvWriteIntervalMs), 0);
        assert_eq!(list.validate(), Ok(()));
    }

    #[test]
    fn zero_polling_interval_is_rejected() {
        let mut list = ConfigValueList::default();
        list.set(ConfigValue::PollingIntervalMs, 0);
        list.set(ConfigValue::FreqLogIntervalMs, 0);
        assert_eq!(
            list.validate(),
            Err(InvalidConfigValue {
                key: ConfigValue::PollingIntervalMs,
                value: 0
            })
        );
    }

    #[test]
    fn decode_inverts_encode() {
        let mut list = ConfigValueList::default();
        list.set(ConfigValue::PowerLogIntervalMs, 5_000);
        let bytes = list.encode();
        assert_eq!(&bytes[24..32], &5_000u64.to_le_bytes());
        assert_eq!(ConfigValueList::decode(&bytes), Some(list));
        assert_eq!(ConfigValueList::decode(&bytes[..39]), None);
        assert_eq!(ConfigValue::from_raw(5), None);
    }
}
