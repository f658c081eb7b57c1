//! Service name type.
//!
//! Service names are up to 8 ASCII characters, zero padded, so a whole name
//! fits in a single `u64` and travels inline in service manager requests.

use static_assertions::const_assert_eq;

/// Fixed-capacity ASCII string for service names (max 8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct ServiceName {
    name: [u8; 8],
}

const_assert_eq!(size_of::<ServiceName>(), size_of::<u64>());

impl ServiceName {
    /// Maximum length of a service name (8 characters).
    pub const MAX_LEN: usize = 8;

    /// Creates a service name from a string slice.
    ///
    /// Returns `None` if the name is empty, longer than 8 bytes, or not ASCII.
    pub const fn new(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > Self::MAX_LEN {
            return None;
        }

        let mut result = [0u8; 8];
        let mut c = 0;
        while c < bytes.len() {
            if !bytes[c].is_ascii() || bytes[c] == 0 {
                return None;
            }
            result[c] = bytes[c];
            c += 1;
        }
        Some(Self { name: result })
    }

    /// Creates a service name, keeping at most the first 8 ASCII bytes.
    ///
    /// Copying stops at the first non-ASCII or NUL byte.
    pub const fn new_truncate(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut result = [0u8; 8];
        let mut c = 0;
        while c < bytes.len() && c < Self::MAX_LEN {
            if !bytes[c].is_ascii() || bytes[c] == 0 {
                break;
            }
            result[c] = bytes[c];
            c += 1;
        }
        Self { name: result }
    }

    /// Decodes a name from its `u64` wire form.
    ///
    /// Returns `None` if any byte before the padding is non-ASCII.
    pub const fn from_u64(value: u64) -> Option<Self> {
        let name = value.to_le_bytes();
        let mut c = 0;
        while c < Self::MAX_LEN {
            if !name[c].is_ascii() {
                return None;
            }
            c += 1;
        }
        Some(Self { name })
    }

    /// Returns the name as its `u64` wire form.
    #[inline]
    pub const fn to_u64(self) -> u64 {
        u64::from_le_bytes(self.name)
    }

    /// Returns the raw zero-padded bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.name
    }

    /// Returns the length of the name, excluding padding.
    pub const fn len(&self) -> usize {
        let mut len = 0;
        while len < Self::MAX_LEN && self.name[len] != 0 {
            len += 1;
        }
        len
    }

    /// Returns `true` if the name is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII bytes.
        core::str::from_utf8(&self.name[..self.len()]).unwrap_or_default()
    }
}

impl core::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<&str> for ServiceName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_into_a_little_endian_word() {
        let name = ServiceName::new("sys:clk").expect("valid");
        assert_eq!(name.len(), 7);
        assert_eq!(name, "sys:clk");
        assert_eq!(name.to_u64(), u64::from_le_bytes(*b"sys:clk\0"));
        assert_eq!(ServiceName::from_u64(name.to_u64()), Some(name));
    }

    #[test]
    fn rejects_names_that_do_not_fit() {
        assert!(ServiceName::new("").is_none());
        assert!(ServiceName::new("too-long-name").is_none());
        assert!(ServiceName::new("cl\u{f6}ck").is_none());
        assert_eq!(ServiceName::new_truncate("too-long-name"), "too-long");
    }
}
