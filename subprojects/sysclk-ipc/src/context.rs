//! Live clock context snapshot.

use crate::{
    types::{Module, PowerSensor, Profile, ThermalSensor},
    wire::{Reader, Writer},
};

const OFF_ENABLED: usize = 0;
const OFF_APPLICATION_ID: usize = 8;
const OFF_PROFILE: usize = 16;
const OFF_FREQS: usize = 20;
const OFF_OVERRIDE_FREQS: usize = OFF_FREQS + 4 * Module::COUNT;
const OFF_TEMPS: usize = OFF_OVERRIDE_FREQS + 4 * Module::COUNT;
const OFF_POWER: usize = OFF_TEMPS + 4 * ThermalSensor::COUNT;
const OFF_REAL_FREQS: usize = OFF_POWER + 4 * PowerSensor::COUNT;
const END: usize = OFF_REAL_FREQS + 4 * Module::COUNT;

/// Point-in-time state of the daemon and the hardware it drives.
///
/// A context is only ever produced whole: [`ClockContext::decode`] either
/// yields every field or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockContext {
    /// Whether the daemon is applying clocks.
    pub enabled: bool,
    /// Title ID of the foreground application.
    pub application_id: u64,
    /// Power profile currently in effect.
    pub profile: Profile,
    /// Target frequency per module, in Hz.
    pub freqs: [u32; Module::COUNT],
    /// Temporary override per module, in Hz. Zero means none.
    pub override_freqs: [u32; Module::COUNT],
    /// Temperatures in milli-degrees Celsius.
    pub temps: [u32; ThermalSensor::COUNT],
    /// Power draw in milliwatts. Negative while charging.
    pub power: [i32; PowerSensor::COUNT],
    /// Frequency actually measured per module, in Hz.
    pub real_freqs: [u32; Module::COUNT],
}

static_assertions::const_assert!(END <= ClockContext::SIZE);

impl Default for ClockContext {
    fn default() -> Self {
        Self {
            enabled: false,
            application_id: 0,
            profile: Profile::Handheld,
            freqs: [0; Module::COUNT],
            override_freqs: [0; Module::COUNT],
            temps: [0; ThermalSensor::COUNT],
            power: [0; PowerSensor::COUNT],
            real_freqs: [0; Module::COUNT],
        }
    }
}

impl ClockContext {
    /// Wire size in bytes.
    pub const SIZE: usize = 80;

    /// Target frequency of `module`.
    #[inline]
    pub fn freq(&self, module: Module) -> u32 {
        self.freqs[module.index()]
    }

    /// Override frequency of `module`, if one is set.
    #[inline]
    pub fn override_freq(&self, module: Module) -> Option<u32> {
        Some(self.override_freqs[module.index()]).filter(|&hz| hz != 0)
    }

    /// Measured frequency of `module`.
    #[inline]
    pub fn real_freq(&self, module: Module) -> u32 {
        self.real_freqs[module.index()]
    }

    /// Temperature of `sensor` in milli-degrees Celsius.
    #[inline]
    pub fn temp(&self, sensor: ThermalSensor) -> u32 {
        self.temps[sensor.index()]
    }

    /// Power reading of `sensor` in milliwatts.
    #[inline]
    pub fn power(&self, sensor: PowerSensor) -> i32 {
        self.power[sensor.index()]
    }

    /// Serializes the context.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut w = Writer(&mut out);
        w.u8(OFF_ENABLED, u8::from(self.enabled));
        w.u64(OFF_APPLICATION_ID, self.application_id);
        w.u32(OFF_PROFILE, self.profile.to_raw());
        for i in 0..Module::COUNT {
            w.u32(OFF_FREQS + 4 * i, self.freqs[i]);
            w.u32(OFF_OVERRIDE_FREQS + 4 * i, self.override_freqs[i]);
            w.u32(OFF_REAL_FREQS + 4 * i, self.real_freqs[i]);
        }
        for (i, temp) in self.temps.iter().enumerate() {
            w.u32(OFF_TEMPS + 4 * i, *temp);
        }
        for (i, power) in self.power.iter().enumerate() {
            w.i32(OFF_POWER + 4 * i, *power);
        }
        out
    }

    /// Deserializes a context.
    ///
    /// Returns `None` if `bytes` is shorter than [`ClockContext::SIZE`] or
    /// the profile is unknown.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let r = Reader(bytes);
        let array = |base: usize| -> Option<[u32; Module::COUNT]> {
            let mut out = [0u32; Module::COUNT];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = r.u32(base + 4 * i)?;
            }
            Some(out)
        };

        let mut temps = [0u32; ThermalSensor::COUNT];
        for (i, slot) in temps.iter_mut().enumerate() {
            *slot = r.u32(OFF_TEMPS + 4 * i)?;
        }
        let mut power = [0i32; PowerSensor::COUNT];
        for (i, slot) in power.iter_mut().enumerate() {
            *slot = r.i32(OFF_POWER + 4 * i)?;
        }

        Some(Self {
            enabled: r.u8(OFF_ENABLED)? != 0,
            application_id: r.u64(OFF_APPLICATION_ID)?,
            profile: Profile::from_raw(r.u32(OFF_PROFILE)?)?,
            freqs: array(OFF_FREQS)?,
            override_freqs: array(OFF_OVERRIDE_FREQS)?,
            temps,
            power,
            real_freqs: array(OFF_REAL_FREQS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClockContext {
        ClockContext {
            enabled: true,
            application_id: 0x0100_0000_0000_1000,
            profile: Profile::Docked,
            freqs: [1_020_000_000, 768_000_000, 1_600_000_000],
            override_freqs: [0, 768_000_000, 0],
            temps: [45_000, 38_500, 31_000],
            power: [-1200, 4_800],
            real_freqs: [1_019_000_000, 767_500_000, 1_600_000_000],
        }
    }

    #[test]
    fn fields_land_at_fixed_offsets() {
        let bytes = sample().encode();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[8..16], &0x0100_0000_0000_1000u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &4u32.to_le_bytes());
        assert_eq!(&bytes[56..60], &(-1200i32).to_le_bytes());
        assert!(bytes[END..].iter().all(|&b| b == 0));
    }

    #[test]
    fn decode_is_all_or_nothing() {
        let ctx = sample();
        let bytes = ctx.encode();
        assert_eq!(ClockContext::decode(&bytes), Some(ctx));
        assert_eq!(ClockContext::decode(&bytes[..ClockContext::SIZE - 1]), None);

        let mut bad_profile = bytes;
        bad_profile[16] = 9;
        assert_eq!(ClockContext::decode(&bad_profile), None);
    }

    #[test]
    fn accessors_index_by_key() {
        let ctx = sample();
        assert_eq!(ctx.freq(Module::Gpu), 768_000_000);
        assert_eq!(ctx.override_freq(Module::Cpu), None);
        assert_eq!(ctx.override_freq(Module::Gpu), Some(768_000_000));
        assert_eq!(ctx.temp(ThermalSensor::Skin), 31_000);
        assert_eq!(ctx.power(PowerSensor::Now), -1200);
    }
}
