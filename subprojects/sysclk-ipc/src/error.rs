//! Daemon error codes.
//!
//! All failures the daemon reports carry module [`SYSCLK_ERROR_MODULE`] and
//! one of the [`SysClkError`] descriptions, packed into a single result code.

use sysclk_sf::{Error, ResultCode};

/// Result module owned by sys-clk.
pub const SYSCLK_ERROR_MODULE: u32 = 388;

/// Reasons the daemon can fail a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[repr(u32)]
pub enum SysClkError {
    /// Unspecified failure, including rejected arguments.
    #[error("generic failure")]
    Generic = 0,
    /// Configuration has not been loaded yet.
    #[error("configuration not loaded")]
    ConfigNotLoaded = 1,
    /// Configuration could not be persisted.
    #[error("configuration save failed")]
    ConfigSaveFailed = 2,
}

impl SysClkError {
    /// Decodes a description value.
    pub const fn from_description(desc: u32) -> Option<Self> {
        match desc {
            0 => Some(Self::Generic),
            1 => Some(Self::ConfigNotLoaded),
            2 => Some(Self::ConfigSaveFailed),
            _ => None,
        }
    }

    /// Returns the description value.
    #[inline]
    pub const fn description(self) -> u32 {
        self as u32
    }

    /// Encodes the error as a result code.
    #[inline]
    pub const fn to_result(self) -> ResultCode {
        ResultCode::from_parts(SYSCLK_ERROR_MODULE, self.description())
    }

    /// Decodes a result code produced by [`SysClkError::to_result`].
    ///
    /// Returns `None` for success, codes of other modules, and unknown
    /// descriptions.
    pub const fn from_result(rc: ResultCode) -> Option<Self> {
        if rc.module() != SYSCLK_ERROR_MODULE {
            return None;
        }
        Self::from_description(rc.description())
    }

    /// Decodes a failure code.
    #[inline]
    pub const fn from_error(err: Error) -> Option<Self> {
        Self::from_result(err.result_code())
    }
}

impl From<SysClkError> for ResultCode {
    fn from(err: SysClkError) -> Self {
        err.to_result()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::format;

    use super::*;

    #[test]
    fn every_reason_survives_encoding() {
        for err in [
            SysClkError::Generic,
            SysClkError::ConfigNotLoaded,
            SysClkError::ConfigSaveFailed,
        ] {
            let rc = err.to_result();
            assert!(rc.is_failure());
            assert_eq!(rc.module(), SYSCLK_ERROR_MODULE);
            assert_eq!(SysClkError::from_result(rc), Some(err));
        }
    }

    #[test]
    fn foreign_and_unknown_codes_do_not_decode() {
        assert_eq!(SysClkError::from_result(ResultCode::SUCCESS), None);
        assert_eq!(
            SysClkError::from_result(ResultCode::from_parts(21, 1)),
            None
        );
        assert_eq!(
            SysClkError::from_result(ResultCode::from_parts(SYSCLK_ERROR_MODULE, 3)),
            None
        );
    }

    #[test]
    fn displays_as_horizon_error_code() {
        let err = Error::new(SysClkError::ConfigNotLoaded.to_result()).expect("failure");
        assert_eq!(format!("{err}"), "2388-0001");
    }
}
