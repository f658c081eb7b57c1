//! SM protocol constants and wire structs.

use core::ffi::CStr;

use static_assertions::const_assert_eq;
use sysclk_sf::{ResultCode, ServiceName, result::module};

/// SM named port.
pub const SM_PORT_NAME: &CStr = c"sm:";

/// Register client (sends PID).
pub const REGISTER_CLIENT: u32 = 0;

/// Get service handle by name.
pub const GET_SERVICE_HANDLE: u32 = 1;

/// Register a new service.
pub const REGISTER_SERVICE: u32 = 2;

/// Unregister a service.
pub const UNREGISTER_SERVICE: u32 = 3;

/// A service with this name is already registered.
pub const RESULT_ALREADY_REGISTERED: ResultCode = ResultCode::from_parts(module::SM, 4);

/// No service is registered with this name.
pub const RESULT_NOT_REGISTERED: ResultCode = ResultCode::from_parts(module::SM, 7);

/// The caller may not register or unregister this name.
pub const RESULT_NOT_ALLOWED: ResultCode = ResultCode::from_parts(module::SM, 8);

/// Input of the RegisterService command (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RegisterServiceIn {
    /// Service name to claim.
    pub name: ServiceName,
    /// Whether the port is a light session port.
    pub is_light: bool,
    /// Maximum number of concurrent sessions.
    pub max_sessions: i32,
}

const_assert_eq!(size_of::<RegisterServiceIn>(), RegisterServiceIn::SIZE);

impl RegisterServiceIn {
    /// Wire size in bytes.
    pub const SIZE: usize = 16;

    /// Serializes in wire order: name, is_light, 3 bytes padding, max_sessions.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.name.to_u64().to_le_bytes());
        out[8] = u8::from(self.is_light);
        out[12..].copy_from_slice(&self.max_sessions.to_le_bytes());
        out
    }

    /// Deserializes from wire order. Returns `None` for a malformed name.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let name = bytes.get(..8)?.try_into().ok().map(u64::from_le_bytes)?;
        let is_light = *bytes.get(8)? != 0;
        let max_sessions = bytes.get(12..16)?.try_into().ok().map(i32::from_le_bytes)?;
        Some(Self {
            name: ServiceName::from_u64(name)?,
            is_light,
            max_sessions,
        })
    }
}
