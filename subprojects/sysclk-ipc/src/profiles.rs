//! Per-title clock profiles.

use crate::{
    types::{Module, Profile},
    wire::{Reader, Writer},
};

/// The clock overrides stored for one title.
///
/// Holds one frequency per (profile, module) pair; zero means the daemon
/// picks the clock automatically. Lists are exchanged whole: a set replaces
/// every entry of the title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TitleProfileList {
    hz: [[u32; Module::COUNT]; Profile::COUNT],
}

/// Error returned by [`TitleProfileList::from_entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{profile}/{module} listed more than once")]
pub struct DuplicateEntry {
    /// Profile of the repeated entry.
    pub profile: Profile,
    /// Module of the repeated entry.
    pub module: Module,
}

impl TitleProfileList {
    /// Maximum number of entries.
    pub const CAPACITY: usize = Profile::COUNT * Module::COUNT;

    /// Wire size in bytes.
    pub const SIZE: usize = Self::CAPACITY * 4;

    /// Creates an empty list.
    pub const fn new() -> Self {
        Self {
            hz: [[0; Module::COUNT]; Profile::COUNT],
        }
    }

    /// Builds a list from `(profile, module, hz)` entries.
    ///
    /// Each (profile, module) pair may appear once. Zero frequencies are
    /// accepted and leave the pair automatic.
    pub fn from_entries<I>(entries: I) -> Result<Self, DuplicateEntry>
    where
        I: IntoIterator<Item = (Profile, Module, u32)>,
    {
        let mut list = Self::new();
        let mut seen = [[false; Module::COUNT]; Profile::COUNT];
        for (profile, module, hz) in entries {
            let slot = &mut seen[profile.index()][module.index()];
            if *slot {
                return Err(DuplicateEntry { profile, module });
            }
            *slot = true;
            list.set(profile, module, hz);
        }
        Ok(list)
    }

    /// Returns the frequency for `profile`/`module`, zero if automatic.
    #[inline]
    pub fn get(&self, profile: Profile, module: Module) -> u32 {
        self.hz[profile.index()][module.index()]
    }

    /// Sets the frequency for `profile`/`module`. Zero clears it.
    #[inline]
    pub fn set(&mut self, profile: Profile, module: Module, hz: u32) {
        self.hz[profile.index()][module.index()] = hz;
    }

    /// Clears the frequency for `profile`/`module`.
    #[inline]
    pub fn clear(&mut self, profile: Profile, module: Module) {
        self.set(profile, module, 0);
    }

    /// Iterates the configured (non-zero) entries in wire order.
    pub fn entries(&self) -> impl Iterator<Item = (Profile, Module, u32)> + '_ {
        Profile::ALL.iter().flat_map(move |&profile| {
            Module::ALL.iter().filter_map(move |&module| {
                let hz = self.get(profile, module);
                (hz != 0).then_some((profile, module, hz))
            })
        })
    }

    /// Number of configured entries.
    pub fn count(&self) -> usize {
        self.hz.iter().flatten().filter(|&&hz| hz != 0).count()
    }

    /// Returns `true` if every entry is automatic.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Serializes the list, profile-major.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut w = Writer(&mut out);
        for (i, hz) in self.hz.iter().flatten().enumerate() {
            w.u32(4 * i, *hz);
        }
        out
    }

    /// Deserializes a list. Returns `None` if `bytes` is too short.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let r = Reader(bytes);
        let mut list = Self::new();
        for (i, slot) in list.hz.iter_mut().flatten().enumerate() {
            *slot = r.u32(4 * i)?;
        }
        Some(list)
    }
}
