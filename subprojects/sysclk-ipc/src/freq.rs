//! Hardware frequency tables.
//!
//! Each table lists the frequencies (Hz) a clock domain can be set to, in
//! ascending order, followed by a zero terminator. The terminator marks the
//! end of the list and is never a valid frequency.

use crate::types::Module;

/// CPU frequencies in Hz.
pub static CPU_FREQ_TABLE_HZ: [u32; 13] = [
    612_000_000,
    714_000_000,
    816_000_000,
    918_000_000,
    1_020_000_000,
    1_122_000_000,
    1_224_000_000,
    1_326_000_000,
    1_428_000_000,
    1_581_000_000,
    1_683_000_000,
    1_785_000_000,
    0,
];

/// GPU frequencies in Hz.
pub static GPU_FREQ_TABLE_HZ: [u32; 13] = [
    76_800_000,
    153_600_000,
    230_400_000,
    307_200_000,
    384_000_000,
    460_800_000,
    537_600_000,
    614_400_000,
    691_200_000,
    768_000_000,
    844_800_000,
    921_600_000,
    0,
];

/// Memory frequencies in Hz.
pub static MEM_FREQ_TABLE_HZ: [u32; 6] = [
    665_600_000,
    800_000_000,
    1_065_600_000,
    1_331_200_000,
    1_600_000_000,
    0,
];

/// Read-only view over a zero-terminated frequency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreqTable {
    raw: &'static [u32],
}

impl FreqTable {
    /// Wraps a zero-terminated table. Entries after the first zero are ignored.
    pub const fn new(raw: &'static [u32]) -> Self {
        Self { raw }
    }

    /// Returns the table for `module`.
    pub fn for_module(module: Module) -> Self {
        match module {
            Module::Cpu => Self::new(&CPU_FREQ_TABLE_HZ),
            Module::Gpu => Self::new(&GPU_FREQ_TABLE_HZ),
            Module::Mem => Self::new(&MEM_FREQ_TABLE_HZ),
        }
    }

    /// Returns the entries before the terminator.
    pub fn as_slice(&self) -> &'static [u32] {
        let end = self
            .raw
            .iter()
            .position(|&hz| hz == 0)
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }

    /// Iterates the frequencies, stopping at the terminator.
    pub fn iter(&self) -> impl Iterator<Item = u32> + 'static {
        self.as_slice().iter().copied()
    }

    /// Number of frequencies.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns `true` if the table has no frequencies.
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Lowest frequency.
    pub fn min(&self) -> Option<u32> {
        self.iter().min()
    }

    /// Highest frequency.
    pub fn max(&self) -> Option<u32> {
        self.iter().max()
    }

    /// Returns `true` if `hz` is a listed frequency.
    pub fn contains(&self, hz: u32) -> bool {
        hz != 0 && self.iter().any(|f| f == hz)
    }

    /// Returns the highest listed frequency not above `hz`.
    ///
    /// Requests below the lowest entry clamp up to it. Returns `None` only
    /// for an empty table.
    pub fn nearest_at_most(&self, hz: u32) -> Option<u32> {
        self.iter().filter(|&f| f <= hz).max().or_else(|| self.min())
    }

    /// Returns `true` if the entries are in non-decreasing order.
    pub fn is_sorted(&self) -> bool {
        self.as_slice().windows(2).all(|w| w[0] <= w[1])
    }

    /// Copies up to `out.len()` leading entries into `out`.
    ///
    /// Returns the number of entries written.
    pub fn copy_into(&self, out: &mut [u32]) -> usize {
        let src = self.as_slice();
        let n = src.len().min(out.len());
        out[..n].copy_from_slice(&src[..n]);
        n
    }
}

impl IntoIterator for FreqTable {
    type Item = u32;
    type IntoIter = core::iter::Copied<core::slice::Iter<'static, u32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_sorted_and_terminated() {
        for &module in Module::ALL {
            let table = FreqTable::for_module(module);
            assert!(table.is_sorted(), "{module} table out of order");
            assert!(!table.is_empty());
            assert!(table.iter().all(|hz| hz != 0));
        }
        assert_eq!(CPU_FREQ_TABLE_HZ.last(), Some(&0));
        assert_eq!(GPU_FREQ_TABLE_HZ.last(), Some(&0));
        assert_eq!(MEM_FREQ_TABLE_HZ.last(), Some(&0));
    }

    #[test]
    fn terminator_is_never_a_frequency() {
        let gpu = FreqTable::for_module(Module::Gpu);
        assert_eq!(gpu.len(), 12);
        assert!(!gpu.contains(0));
        assert!(gpu.contains(768_000_000));
        assert_eq!(gpu.max(), Some(921_600_000));

        static EARLY_END: [u32; 4] = [10, 0, 20, 0];
        assert_eq!(FreqTable::new(&EARLY_END).len(), 1);
    }

    #[test]
    fn nearest_clamps_down_then_up() {
        let mem = FreqTable::for_module(Module::Mem);
        assert_eq!(mem.nearest_at_most(1_600_000_000), Some(1_600_000_000));
        assert_eq!(mem.nearest_at_most(1_500_000_000), Some(1_331_200_000));
        assert_eq!(mem.nearest_at_most(u32::MAX), Some(1_600_000_000));
        assert_eq!(mem.nearest_at_most(1), Some(665_600_000));
        assert_eq!(FreqTable::new(&[0]).nearest_at_most(5), None);
    }

    #[test]
    fn copy_into_truncates() {
        let cpu = FreqTable::for_module(Module::Cpu);
        let mut out = [0u32; 3];
        assert_eq!(cpu.copy_into(&mut out), 3);
        assert_eq!(out, [612_000_000, 714_000_000, 816_000_000]);

        let mut big = [0u32; 32];
        assert_eq!(cpu.copy_into(&mut big), 12);
        assert_eq!(big[12], 0);
        assert_eq!(cpu.copy_into(&mut []), 0);
    }
}
