//! Daemon side of the protocol.
//!
//! [`handle_request`] decodes one CMIF request from a message buffer, calls
//! the matching [`SysClkHandler`] method and writes the reply back into the
//! same buffer. Argument decoding is strict: malformed payloads are answered
//! with [`SysClkError::Generic`] without reaching the handler.

use sysclk_sf::{
    MessageBuffer, ResultCode,
    cmif::{self, IncomingRequest},
    hipc::LayoutError,
};

use crate::{
    config::ConfigValueList,
    context::ClockContext,
    error::SysClkError,
    freq::FreqTable,
    profiles::TitleProfileList,
    proto::{API_VERSION, Command, MAX_FREQ_LIST_COUNT},
    types::Module,
    wire::Reader,
};

/// The daemon's implementation of each command.
///
/// Methods take `&self`; implementations synchronize their own state.
pub trait SysClkHandler {
    /// Protocol version reported to clients.
    fn api_version(&self) -> u32 {
        API_VERSION
    }

    /// Human readable daemon version.
    fn version_string(&self) -> &str;

    /// Current live state.
    fn current_context(&self) -> Result<ClockContext, SysClkError>;

    /// Requests shutdown. The reply is still sent.
    fn exit(&self) -> Result<(), SysClkError>;

    /// Number of configured profile entries for `tid`.
    fn profile_count(&self, tid: u64) -> Result<u8, SysClkError>;

    /// Whole profile list of `tid`.
    fn profiles(&self, tid: u64) -> Result<TitleProfileList, SysClkError>;

    /// Replaces the whole profile list of `tid`.
    fn set_profiles(&self, tid: u64, profiles: TitleProfileList) -> Result<(), SysClkError>;

    /// Enables or disables clock management.
    fn set_enabled(&self, enabled: bool) -> Result<(), SysClkError>;

    /// Sets (or with zero, clears) the override of `module`.
    fn set_override(&self, module: Module, hz: u32) -> Result<(), SysClkError>;

    /// Whole daemon configuration.
    fn config_values(&self) -> Result<ConfigValueList, SysClkError>;

    /// Replaces the whole daemon configuration.
    fn set_config_values(&self, values: ConfigValueList) -> Result<(), SysClkError>;

    /// Frequency table published for `module`.
    fn freq_table(&self, module: Module) -> FreqTable {
        FreqTable::for_module(module)
    }
}

/// Outcome of [`handle_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A reply has been written into the message buffer.
    Replied,
    /// The client closed the session; there is nothing to reply.
    Closed,
}

/// Handles the request in `msg` and writes the reply in its place.
///
/// # Safety
///
/// Receive buffer descriptors in the request must describe memory that is
/// writable by this process and not otherwise borrowed until this call
/// returns. This holds when the client is blocked in the same address space
/// or the kernel has mapped the buffers.
pub unsafe fn handle_request<H>(handler: &H, msg: &mut MessageBuffer) -> Result<Dispatched, LayoutError>
where
    H: SysClkHandler + ?Sized,
{
    let request = match cmif::parse_request(msg) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting malformed request");
            cmif::make_response(msg, err.result_code(), 0, 0)?;
            return Ok(Dispatched::Replied);
        }
    };

    if request.is_close() {
        tracing::debug!("client closed session");
        return Ok(Dispatched::Closed);
    }

    let Some(cmd) = Command::from_raw(request.command_id) else {
        tracing::warn!(cmd = request.command_id, "unknown command");
        cmif::make_response(msg, cmif::RESULT_UNKNOWN_COMMAND_ID, 0, 0)?;
        return Ok(Dispatched::Replied);
    };

    tracing::trace!(?cmd, "dispatching");
    // SAFETY: forwarded from the caller's contract.
    let reply = unsafe { dispatch(handler, cmd, &request) };
    match reply {
        Ok(reply) => {
            let mut writer = cmif::make_response(msg, ResultCode::SUCCESS, reply.len, 0)?;
            writer.data_mut().copy_from_slice(reply.as_bytes());
        }
        Err(err) => {
            tracing::debug!(?cmd, error = %err, "command failed");
            cmif::make_response(msg, err.to_result(), 0, 0)?;
        }
    }
    Ok(Dispatched::Replied)
}

/// Inline reply payload; sized for the largest fixed reply.
struct Reply {
    bytes: [u8; ClockContext::SIZE],
    len: usize,
}

impl Reply {
    fn empty() -> Self {
        Self {
            bytes: [0; ClockContext::SIZE],
            len: 0,
        }
    }

    fn with(data: &[u8]) -> Self {
        let mut reply = Self::empty();
        reply.bytes[..data.len()].copy_from_slice(data);
        reply.len = data.len();
        reply
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

static_assertions::const_assert!(TitleProfileList::SIZE <= ClockContext::SIZE);
static_assertions::const_assert!(ConfigValueList::SIZE <= ClockContext::SIZE);

/// # Safety
///
/// See [`handle_request`].
unsafe fn dispatch<H>(handler: &H, cmd: Command, request: &IncomingRequest) -> Result<Reply, SysClkError>
where
    H: SysClkHandler + ?Sized,
{
    let args = Reader(&request.payload);
    let arg_u32 = |at| args.u32(at).ok_or(SysClkError::Generic);
    let arg_u64 = |at| args.u64(at).ok_or(SysClkError::Generic);

    match cmd {
        Command::GetApiVersion => Ok(Reply::with(&handler.api_version().to_le_bytes())),
        Command::GetVersionString => {
            // SAFETY: caller guarantees receive buffers are mapped and unaliased.
            let out = unsafe { request.out_buffer(0) }.ok_or(SysClkError::Generic)?;
            if let Some((last, body)) = out.split_last_mut() {
                let version = handler.version_string().as_bytes();
                let n = version.len().min(body.len());
                body[..n].copy_from_slice(&version[..n]);
                if n < body.len() {
                    body[n] = 0;
                } else {
                    *last = 0;
                }
            }
            Ok(Reply::empty())
        }
        Command::GetCurrentContext => Ok(Reply::with(&handler.current_context()?.encode())),
        Command::Exit => handler.exit().map(|()| Reply::empty()),
        Command::GetProfileCount => {
            let count = handler.profile_count(arg_u64(0)?)?;
            Ok(Reply::with(&[count]))
        }
        Command::GetProfiles => Ok(Reply::with(&handler.profiles(arg_u64(0)?)?.encode())),
        Command::SetProfiles => {
            let tid = arg_u64(0)?;
            let list = request
                .payload
                .get(8..)
                .and_then(TitleProfileList::decode)
                .ok_or(SysClkError::Generic)?;
            handler.set_profiles(tid, list).map(|()| Reply::empty())
        }
        Command::SetEnabled => {
            let enabled = args.u8(0).ok_or(SysClkError::Generic)? != 0;
            handler.set_enabled(enabled).map(|()| Reply::empty())
        }
        Command::SetOverride => {
            let module = Module::from_raw(arg_u32(0)?).ok_or(SysClkError::Generic)?;
            handler
                .set_override(module, arg_u32(4)?)
                .map(|()| Reply::empty())
        }
        Command::GetConfigValues => Ok(Reply::with(&handler.config_values()?.encode())),
        Command::SetConfigValues => {
            let values = ConfigValueList::decode(&request.payload).ok_or(SysClkError::Generic)?;
            handler.set_config_values(values).map(|()| Reply::empty())
        }
        Command::GetFreqList => {
            let module = Module::from_raw(arg_u32(0)?).ok_or(SysClkError::Generic)?;
            let max = arg_u32(4)? as usize;
            if max > MAX_FREQ_LIST_COUNT {
                return Err(SysClkError::Generic);
            }
            // SAFETY: caller guarantees receive buffers are mapped and unaliased.
            let out = unsafe { request.out_buffer(0) }.ok_or(SysClkError::Generic)?;
            if out.len() < max * 4 {
                return Err(SysClkError::Generic);
            }

            let mut freqs = [0u32; MAX_FREQ_LIST_COUNT];
            let count = handler.freq_table(module).copy_into(&mut freqs[..max]);
            for (chunk, hz) in out.chunks_exact_mut(4).zip(&freqs[..count]) {
                chunk.copy_from_slice(&hz.to_le_bytes());
            }
            Ok(Reply::with(&(count as u32).to_le_bytes()))
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use sysclk_sf::{
        cmif::{ParseResponseError, RequestFormat},
        hipc::BufferMode,
    };

    use super::*;

    #[derive(Default)]
    struct Stub {
        enabled: Cell<bool>,
    }

    impl SysClkHandler for Stub {
        fn version_string(&self) -> &str {
            "1.2.3"
        }
        fn current_context(&self) -> Result<ClockContext, SysClkError> {
            Ok(ClockContext {
                enabled: self.enabled.get(),
                ..Default::default()
            })
        }
        fn exit(&self) -> Result<(), SysClkError> {
            Ok(())
        }
        fn profile_count(&self, _tid: u64) -> Result<u8, SysClkError> {
            Err(SysClkError::ConfigNotLoaded)
        }
        fn profiles(&self, _tid: u64) -> Result<TitleProfileList, SysClkError> {
            Ok(TitleProfileList::new())
        }
        fn set_profiles(&self, _tid: u64, _profiles: TitleProfileList) -> Result<(), SysClkError> {
            Ok(())
        }
        fn set_enabled(&self, enabled: bool) -> Result<(), SysClkError> {
            self.enabled.set(enabled);
            Ok(())
        }
        fn set_override(&self, _module: Module, _hz: u32) -> Result<(), SysClkError> {
            Ok(())
        }
        fn config_values(&self) -> Result<ConfigValueList, SysClkError> {
            Ok(ConfigValueList::default())
        }
        fn set_config_values(&self, _values: ConfigValueList) -> Result<(), SysClkError> {
            Ok(())
        }
    }

    fn call(handler: &Stub, cmd: u32, input: &[u8], out: Option<&mut [u8]>) -> MessageBuffer {
        let mut msg = MessageBuffer::new();
        let fmt = RequestFormat::builder(cmd)
            .data_size(input.len())
            .out_buffers(u32::from(out.is_some()))
            .build();
        let mut req = cmif::make_request(&mut msg, fmt).expect("fits");
        req.data_mut().copy_from_slice(input);
        if let Some(out) = out {
            req.add_out_buffer(out, BufferMode::Normal).expect("slot");
        }
        // SAFETY: `out` outlives this call and is not otherwise borrowed.
        let dispatched = unsafe { handle_request(handler, &mut msg) }.expect("reply fits");
        assert_eq!(dispatched, Dispatched::Replied);
        msg
    }

    #[test]
    fn set_enabled_reaches_the_handler() {
        let stub = Stub::default();
        let msg = call(&stub, Command::SetEnabled.id(), &[1], None);
        cmif::parse_response(&msg, 0).expect("success");
        assert!(stub.enabled.get());
    }

    #[test]
    fn handler_errors_become_result_codes() {
        let stub = Stub::default();
        let msg = call(&stub, Command::GetProfileCount.id(), &7u64.to_le_bytes(), None);
        match cmif::parse_response(&msg, 1) {
            Err(ParseResponseError::ServiceError(err)) => {
                assert_eq!(SysClkError::from_error(err), Some(SysClkError::ConfigNotLoaded));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bad_arguments_are_generic_errors() {
        let stub = Stub::default();
        let msg = call(&stub, Command::SetOverride.id(), &[9, 0, 0, 0, 0, 0, 0, 0], None);
        let err = cmif::parse_response(&msg, 0).expect_err("invalid module");
        assert_eq!(
            err,
            ParseResponseError::ServiceError(
                sysclk_sf::Error::new(SysClkError::Generic.to_result()).expect("failure")
            )
        );
    }

    #[test]
    fn unknown_commands_get_the_cmif_result() {
        let stub = Stub::default();
        let msg = call(&stub, 99, &[], None);
        match cmif::parse_response(&msg, 0) {
            Err(ParseResponseError::ServiceError(err)) => {
                assert_eq!(err.result_code(), cmif::RESULT_UNKNOWN_COMMAND_ID);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn version_string_is_truncated_and_terminated() {
        let stub = Stub::default();
        let mut out = [0xFFu8; 4];
        let msg = call(&stub, Command::GetVersionString.id(), &[], Some(&mut out));
        cmif::parse_response(&msg, 0).expect("success");
        assert_eq!(&out, b"1.2\0");
    }

    #[test]
    fn freq_list_writes_at_most_max_entries() {
        let stub = Stub::default();
        let mut out = [0u8; 8];
        let mut input = [0u8; 8];
        input[..4].copy_from_slice(&Module::Mem.to_raw().to_le_bytes());
        input[4..].copy_from_slice(&2u32.to_le_bytes());

        let msg = call(&stub, Command::GetFreqList.id(), &input, Some(&mut out));
        let resp = cmif::parse_response(&msg, 4).expect("success");
        assert_eq!(resp.data(), &2u32.to_le_bytes());
        assert_eq!(&out[..4], &665_600_000u32.to_le_bytes());
        assert_eq!(&out[4..], &800_000_000u32.to_le_bytes());
    }

    #[test]
    fn close_needs_no_reply() {
        let stub = Stub::default();
        let mut msg = MessageBuffer::new();
        cmif::make_close_request(&mut msg).expect("fits");
        // SAFETY: the request carries no buffers.
        let dispatched = unsafe { handle_request(&stub, &mut msg) }.expect("no reply");
        assert_eq!(dispatched, Dispatched::Closed);
    }
}
