//! CMIF protocol operations for the sys-clk service.
//!
//! One function per daemon command. Scalars and fixed-size structs travel
//! inline; the version string and frequency lists use receive buffers.

use sysclk_sf::{
    Error, Kernel, MessageBuffer,
    cmif::{self, ParseResponseError},
    hipc::{BufferMode, LayoutError},
    kernel::SendSyncError,
    service::Service,
};

use crate::{
    config::ConfigValueList,
    context::ClockContext,
    error::SysClkError,
    profiles::TitleProfileList,
    proto::{Command, MAX_FREQ_LIST_COUNT},
    types::Module,
};

/// Error returned by every sys-clk command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The service has no open session.
    #[error("not connected to sys:clk")]
    NotConnected,
    /// The request does not fit the message buffer.
    #[error("failed to build request")]
    BuildRequest(#[source] LayoutError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] SendSyncError),
    /// Failed to parse the CMIF response, or the daemon returned an error.
    #[error("failed to parse response")]
    ParseResponse(#[source] ParseResponseError),
    /// The reply parsed but carried values outside the protocol.
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
    /// The caller's buffer asks for more entries than one call may return.
    #[error("buffer of {len} entries exceeds the limit of {max}")]
    BufferTooLarge {
        /// Entries requested.
        len: usize,
        /// Entries allowed.
        max: usize,
    },
}

impl CommandError {
    /// Returns the result code the daemon replied with, if any.
    pub fn service_error(&self) -> Option<Error> {
        match self {
            Self::ParseResponse(ParseResponseError::ServiceError(err)) => Some(*err),
            _ => None,
        }
    }

    /// Returns the daemon's reason, if the daemon rejected the request.
    pub fn sysclk_error(&self) -> Option<SysClkError> {
        self.service_error().and_then(SysClkError::from_error)
    }
}

/// Sends `cmd` with an inline `input` and returns `out_size` reply bytes.
///
/// When `out_buffer` is given it is attached as the single receive buffer
/// and stays borrowed until the reply has arrived.
fn transact<'m, K: Kernel>(
    service: &Service<K>,
    msg: &'m mut MessageBuffer,
    cmd: Command,
    input: &[u8],
    out_buffer: Option<&mut [u8]>,
    out_size: usize,
) -> Result<&'m [u8], CommandError> {
    if !service.is_active() {
        return Err(CommandError::NotConnected);
    }

    let fmt = cmif::RequestFormatBuilder::new(cmd.id())
        .data_size(input.len())
        .out_buffers(u32::from(out_buffer.is_some()))
        .build();

    let mut req = cmif::make_request(msg, fmt).map_err(CommandError::BuildRequest)?;
    req.data_mut().copy_from_slice(input);
    if let Some(buffer) = out_buffer {
        req.add_out_buffer(buffer, BufferMode::Normal)
            .map_err(CommandError::BuildRequest)?;
    }

    service.send(msg).map_err(CommandError::SendRequest)?;

    let msg: &'m MessageBuffer = msg;
    let resp = cmif::parse_response(msg, out_size).map_err(CommandError::ParseResponse)?;
    Ok(resp.data())
}

#[inline]
fn read_u32(data: &[u8]) -> Result<u32, CommandError> {
    data.get(..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(CommandError::InvalidResponse("short u32"))
}

/// Returns the daemon's protocol version.
pub fn get_api_version<K: Kernel>(service: &Service<K>) -> Result<u32, CommandError> {
    let mut msg = MessageBuffer::new();
    let data = transact(service, &mut msg, Command::GetApiVersion, &[], None, 4)?;
    read_u32(data)
}

/// Writes the daemon version string into `out`.
///
/// Never writes past `out`. The daemon NUL-terminates when there is room;
/// the returned length excludes the terminator.
pub fn get_version_string<K: Kernel>(
    service: &Service<K>,
    out: &mut [u8],
) -> Result<usize, CommandError> {
    if out.is_empty() {
        return Ok(0);
    }

    let mut msg = MessageBuffer::new();
    transact(
        service,
        &mut msg,
        Command::GetVersionString,
        &[],
        Some(&mut *out),
        0,
    )?;
    Ok(out.iter().position(|&b| b == 0).unwrap_or(out.len()))
}

/// Returns a snapshot of the daemon's live state.
pub fn get_current_context<K: Kernel>(service: &Service<K>) -> Result<ClockContext, CommandError> {
    let mut msg = MessageBuffer::new();
    let data = transact(
        service,
        &mut msg,
        Command::GetCurrentContext,
        &[],
        None,
        ClockContext::SIZE,
    )?;
    ClockContext::decode(data).ok_or(CommandError::InvalidResponse("malformed context"))
}

/// Asks the daemon to shut down.
pub fn exit<K: Kernel>(service: &Service<K>) -> Result<(), CommandError> {
    let mut msg = MessageBuffer::new();
    transact(service, &mut msg, Command::Exit, &[], None, 0)?;
    Ok(())
}

/// Returns how many profile entries are configured for `tid`.
pub fn get_profile_count<K: Kernel>(service: &Service<K>, tid: u64) -> Result<u8, CommandError> {
    let mut msg = MessageBuffer::new();
    let data = transact(
        service,
        &mut msg,
        Command::GetProfileCount,
        &tid.to_le_bytes(),
        None,
        1,
    )?;
    data.first()
        .copied()
        .ok_or(CommandError::InvalidResponse("missing count"))
}

/// Returns the whole profile list of `tid`.
pub fn get_profiles<K: Kernel>(
    service: &Service<K>,
    tid: u64,
) -> Result<TitleProfileList, CommandError> {
    let mut msg = MessageBuffer::new();
    let data = transact(
        service,
        &mut msg,
        Command::GetProfiles,
        &tid.to_le_bytes(),
        None,
        TitleProfileList::SIZE,
    )?;
    TitleProfileList::decode(data).ok_or(CommandError::InvalidResponse("malformed profile list"))
}

/// Replaces the whole profile list of `tid`.
pub fn set_profiles<K: Kernel>(
    service: &Service<K>,
    tid: u64,
    profiles: &TitleProfileList,
) -> Result<(), CommandError> {
    let mut input = [0u8; 8 + TitleProfileList::SIZE];
    input[..8].copy_from_slice(&tid.to_le_bytes());
    input[8..].copy_from_slice(&profiles.encode());

    let mut msg = MessageBuffer::new();
    transact(service, &mut msg, Command::SetProfiles, &input, None, 0)?;
    Ok(())
}

/// Enables or disables clock management.
pub fn set_enabled<K: Kernel>(service: &Service<K>, enabled: bool) -> Result<(), CommandError> {
    let mut msg = MessageBuffer::new();
    transact(
        service,
        &mut msg,
        Command::SetEnabled,
        &[u8::from(enabled)],
        None,
        0,
    )?;
    Ok(())
}

/// Sets a temporary override for `module`. Zero returns it to automatic.
///
/// The daemon clamps `hz` to its frequency table.
pub fn set_override<K: Kernel>(
    service: &Service<K>,
    module: Module,
    hz: u32,
) -> Result<(), CommandError> {
    let mut input = [0u8; 8];
    input[..4].copy_from_slice(&module.to_raw().to_le_bytes());
    input[4..].copy_from_slice(&hz.to_le_bytes());

    let mut msg = MessageBuffer::new();
    transact(service, &mut msg, Command::SetOverride, &input, None, 0)?;
    Ok(())
}

/// Returns the whole daemon configuration.
pub fn get_config_values<K: Kernel>(service: &Service<K>) -> Result<ConfigValueList, CommandError> {
    let mut msg = MessageBuffer::new();
    let data = transact(
        service,
        &mut msg,
        Command::GetConfigValues,
        &[],
        None,
        ConfigValueList::SIZE,
    )?;
    ConfigValueList::decode(data).ok_or(CommandError::InvalidResponse("malformed config list"))
}

/// Replaces the whole daemon configuration.
pub fn set_config_values<K: Kernel>(
    service: &Service<K>,
    values: &ConfigValueList,
) -> Result<(), CommandError> {
    let mut msg = MessageBuffer::new();
    transact(
        service,
        &mut msg,
        Command::SetConfigValues,
        &values.encode(),
        None,
        0,
    )?;
    Ok(())
}

/// Copies the leading entries of `module`'s frequency table into `out`.
///
/// At most `out.len()` entries are requested; the returned count is the
/// number of entries written. Buffers longer than [`MAX_FREQ_LIST_COUNT`]
/// are rejected before anything is sent, and an empty buffer returns zero
/// without a request.
pub fn get_freq_list<K: Kernel>(
    service: &Service<K>,
    module: Module,
    out: &mut [u32],
) -> Result<usize, CommandError> {
    let max = out.len();
    if max > MAX_FREQ_LIST_COUNT {
        return Err(CommandError::BufferTooLarge {
            len: max,
            max: MAX_FREQ_LIST_COUNT,
        });
    }
    if max == 0 {
        return Ok(0);
    }

    let mut input = [0u8; 8];
    input[..4].copy_from_slice(&module.to_raw().to_le_bytes());
    input[4..].copy_from_slice(&(max as u32).to_le_bytes());

    let mut raw = [0u8; MAX_FREQ_LIST_COUNT * 4];
    let mut msg = MessageBuffer::new();
    let data = transact(
        service,
        &mut msg,
        Command::GetFreqList,
        &input,
        Some(&mut raw[..max * 4]),
        4,
    )?;

    let count = read_u32(data)? as usize;
    if count > max {
        return Err(CommandError::InvalidResponse("frequency count exceeds request"));
    }

    for (slot, chunk) in out.iter_mut().zip(raw.chunks_exact(4)).take(count) {
        *slot = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(count)
}
