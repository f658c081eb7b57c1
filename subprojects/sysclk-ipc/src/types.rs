//! Enumerations used as keys across the protocol.
//!
//! Each enum is a dense `u32` on the wire starting at zero. Values outside
//! the range decode to `None` rather than to a sentinel variant.

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => ($short:literal, $pretty:literal),
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(u32)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )+
        }

        impl $name {
            /// Every variant, in wire order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Number of variants.
            pub const COUNT: usize = Self::ALL.len();

            /// Decodes a wire value.
            pub const fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Returns the wire value.
            #[inline]
            pub const fn to_raw(self) -> u32 {
                self as u32
            }

            /// Returns the index of this variant in per-key arrays.
            #[inline]
            pub const fn index(self) -> usize {
                self as usize
            }

            /// Short lowercase name, stable for config files and logs.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $short,)+
                }
            }

            /// Human readable name.
            pub const fn pretty_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $pretty,)+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.pretty_name())
            }
        }
    };
}

wire_enum! {
    /// A hardware clock domain.
    pub enum Module {
        /// CPU cluster.
        Cpu = 0 => ("cpu", "CPU"),
        /// GPU.
        Gpu = 1 => ("gpu", "GPU"),
        /// External memory controller.
        Mem = 2 => ("mem", "Memory"),
    }
}

wire_enum! {
    /// Power/dock state selecting which per-title profile applies.
    pub enum Profile {
        /// On battery.
        Handheld = 0 => ("handheld", "Handheld"),
        /// Handheld, charging from an unrecognized source.
        HandheldCharging = 1 => ("handheld_charging", "Charging"),
        /// Handheld, charging from a USB port.
        HandheldChargingUsb = 2 => ("handheld_charging_usb", "USB Charger"),
        /// Handheld, charging from the official charger.
        HandheldChargingOfficial = 3 => ("handheld_charging_official", "Official Charger"),
        /// Docked.
        Docked = 4 => ("docked", "Docked"),
    }
}

wire_enum! {
    /// Temperature sensors reported in the context.
    pub enum ThermalSensor {
        /// System on chip.
        Soc = 0 => ("soc", "SOC"),
        /// Main board.
        Pcb = 1 => ("pcb", "PCB"),
        /// Console skin.
        Skin = 2 => ("skin", "Skin"),
    }
}

wire_enum! {
    /// Power readings reported in the context.
    pub enum PowerSensor {
        /// Instantaneous draw.
        Now = 0 => ("now", "Now"),
        /// Averaged draw.
        Avg = 1 => ("avg", "Avg"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip_and_reject_out_of_range() {
        for module in Module::ALL {
            assert_eq!(Module::from_raw(module.to_raw()), Some(*module));
        }
        assert_eq!(Module::COUNT, 3);
        assert_eq!(Module::from_raw(3), None);
        assert_eq!(Profile::COUNT, 5);
        assert_eq!(Profile::from_raw(u32::MAX), None);
    }

    #[test]
    fn names_are_distinct() {
        let names: [&str; 5] = core::array::from_fn(|i| Profile::ALL[i].name());
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(Module::Mem.pretty_name(), "Memory");
        assert_eq!(PowerSensor::Avg.name(), "avg");
    }
}
