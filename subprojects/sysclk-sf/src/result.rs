//! Horizon OS result codes.
//!
//! Every failure that crosses the IPC boundary is a single 32-bit word that
//! packs the subsystem (module) which raised it together with a
//! module-specific description:
//!
//! - **Bits 0-8:** Module ID
//! - **Bits 9-21:** Description
//! - **Bits 22-31:** Reserved
//!
//! A raw value of zero means success. Packing is lossless for every module
//! below 512 and every description below 8192, so daemons and clients can
//! exchange codes without a shared table.
//!
//! # References
//! - [Switchbrew Wiki: Error Codes](https://switchbrew.org/wiki/Error_codes)

use core::num::NonZeroU32;

/// Mask for the module field (9 bits)
const MODULE_MASK: u32 = 0x1FF;
/// Mask for the description field (13 bits)
const DESCRIPTION_MASK: u32 = 0x1FFF;
/// Shift amount for the description field
const DESCRIPTION_SHIFT: u32 = 9;

/// Well-known module IDs used by this IPC stack.
pub mod module {
    /// Kernel (SVC) errors.
    pub const KERNEL: u32 = 1;
    /// CMIF serialization errors.
    pub const CMIF: u32 = 10;
    /// Service Manager errors.
    pub const SM: u32 = 21;
}

/// A raw result code, either success or failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
#[repr(transparent)]
pub struct ResultCode(u32);

impl ResultCode {
    /// The successful result code.
    pub const SUCCESS: Self = Self(0);

    /// Creates a [`ResultCode`] from its raw value.
    #[inline]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Packs a module ID and a description into a result code.
    ///
    /// Out-of-range bits of either field are discarded.
    #[inline]
    pub const fn from_parts(module: u32, description: u32) -> Self {
        let module_val = module & MODULE_MASK;
        let desc_val = (description & DESCRIPTION_MASK) << DESCRIPTION_SHIFT;
        Self(module_val | desc_val)
    }

    /// Returns `true` if this code represents success.
    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this code represents a failure.
    #[inline]
    pub const fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Returns the module that raised the result.
    #[inline]
    pub const fn module(self) -> u32 {
        self.0 & MODULE_MASK
    }

    /// Returns the module-specific description.
    #[inline]
    pub const fn description(self) -> u32 {
        (self.0 >> DESCRIPTION_SHIFT) & DESCRIPTION_MASK
    }

    /// Converts the code into a [`core::result::Result`].
    #[inline]
    pub fn into_result(self) -> Result<(), Error> {
        match Error::new(self) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl From<Error> for ResultCode {
    fn from(err: Error) -> Self {
        err.result_code()
    }
}

/// A failed result code (guaranteed non-zero).
///
/// # Formatting
///
/// Display renders `2XXX-YYYY` where `XXX` is the module and `YYYY` the
/// description, e.g. module 388 description 1 is `2388-0001`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Error(NonZeroU32);

impl Error {
    /// Wraps a result code, returning `None` for success.
    #[inline]
    pub const fn new(rc: ResultCode) -> Option<Self> {
        match NonZeroU32::new(rc.to_raw()) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Builds an error from a module and description.
    ///
    /// Returns `None` when both fields pack to zero.
    #[inline]
    pub const fn from_parts(module: u32, description: u32) -> Option<Self> {
        Self::new(ResultCode::from_parts(module, description))
    }

    /// Returns the module that caused the error.
    #[inline]
    pub const fn module(&self) -> u32 {
        self.result_code().module()
    }

    /// Returns the description value.
    #[inline]
    pub const fn description(&self) -> u32 {
        self.result_code().description()
    }

    /// Returns the underlying result code.
    #[inline]
    pub const fn result_code(&self) -> ResultCode {
        ResultCode(self.0.get())
    }

    /// Returns the raw value of this error code.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0.get()
    }

    /// Returns `true` if this error has the given module and description.
    #[inline]
    pub const fn matches(&self, module: u32, description: u32) -> bool {
        self.module() == module && self.description() == description
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:04}", 2000 + self.module(), self.description())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Error")
            .field("code", &format_args!("{}", self))
            .field("module", &self.module())
            .field("description", &self.description())
            .field("raw", &format_args!("{:#x}", self.to_raw()))
            .finish()
    }
}

impl core::error::Error for Error {}
