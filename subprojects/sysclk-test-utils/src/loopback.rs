//! In-process kernel for driving the IPC stack without hardware.
//!
//! [`LoopbackKernel`] owns a handle table and a service registry. Connecting
//! to `sm:` yields a session served by a small service manager built into the
//! kernel; sessions obtained from it are routed to whichever
//! [`SessionHandler`] is registered under the service name. Requests are
//! handled synchronously on the caller's thread, which matches the kernel's
//! blocking `SendSyncRequest` semantics.

use std::{
    collections::HashMap,
    ffi::CStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use sysclk_ipc::server::{self, Dispatched, SysClkHandler};
use sysclk_sf::{
    Handle, Kernel, MessageBuffer, RawHandle, ResultCode, ServiceName,
    cmif::{self, IncomingRequest},
    hipc::{self, LayoutError},
    kernel::{CloseHandleError, ConnectError, SendSyncError},
};
use sysclk_sm::proto::{self as sm, RegisterServiceIn};

/// Process ID the kernel stamps into requests that ask for one.
pub const LOOPBACK_PID: u64 = 0x51;

/// Server side of a session.
pub trait SessionHandler: Send + Sync {
    /// Handles the request in `msg` and writes the reply in its place.
    ///
    /// # Safety
    ///
    /// Buffer descriptors in `msg` must describe memory of this process that
    /// stays valid, and is not otherwise borrowed, until the call returns.
    unsafe fn handle(&self, msg: &mut MessageBuffer) -> Result<Dispatched, LayoutError>;
}

impl<H: SysClkHandler + Send + Sync> SessionHandler for H {
    unsafe fn handle(&self, msg: &mut MessageBuffer) -> Result<Dispatched, LayoutError> {
        // SAFETY: forwarded from the caller's contract.
        unsafe { server::handle_request(self, msg) }
    }
}

/// Error returned by [`LoopbackKernel::register_server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("service {0} is already registered")]
pub struct NameTaken(pub ServiceName);

/// A kernel whose IPC never leaves the process.
#[derive(Default)]
pub struct LoopbackKernel {
    inner: Mutex<Inner>,
}

impl core::fmt::Debug for LoopbackKernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LoopbackKernel")
            .field("handles", &inner.handles.len())
            .field("services", &inner.registry.len())
            .field("sm_available", &inner.sm_available)
            .finish()
    }
}

struct Inner {
    next_handle: RawHandle,
    handles: HashMap<RawHandle, Object>,
    registry: HashMap<ServiceName, Registration>,
    sm_available: bool,
    registered_pid: Option<u64>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            next_handle: 1,
            handles: HashMap::new(),
            registry: HashMap::new(),
            sm_available: true,
            registered_pid: None,
        }
    }
}

impl Inner {
    fn insert(&mut self, object: Object) -> RawHandle {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(raw, object);
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Object {
    SmSession,
    ClientSession { name: ServiceName },
    ServerPort { name: ServiceName },
}

#[derive(Clone)]
enum Registration {
    /// Claimed through SM RegisterService. Nobody answers on it.
    Port,
    /// An in-process server.
    Server(Arc<dyn SessionHandler>),
}

impl LoopbackKernel {
    /// Creates a kernel with an available SM and no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` as the server for `name`.
    pub fn register_server(
        &self,
        name: ServiceName,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<(), NameTaken> {
        let mut inner = self.lock();
        if inner.registry.contains_key(&name) {
            return Err(NameTaken(name));
        }
        inner.registry.insert(name, Registration::Server(handler));
        tracing::debug!(service = %name, "server registered");
        Ok(())
    }

    /// Removes the server for `name`. Sessions already open to it start
    /// failing with [`SendSyncError::SessionClosed`].
    pub fn unregister_server(&self, name: ServiceName) -> bool {
        let mut inner = self.lock();
        let removed = matches!(
            inner.registry.get(&name),
            Some(Registration::Server(_))
        );
        if removed {
            inner.registry.remove(&name);
            tracing::debug!(service = %name, "server unregistered");
        }
        removed
    }

    /// Makes `sm:` connectable or not.
    pub fn set_sm_available(&self, available: bool) {
        self.lock().sm_available = available;
    }

    /// Returns `true` if anything is registered under `name`.
    pub fn is_registered(&self, name: ServiceName) -> bool {
        self.lock().registry.contains_key(&name)
    }

    /// Number of open client sessions to `name`.
    pub fn open_sessions(&self, name: ServiceName) -> usize {
        self.lock()
            .handles
            .values()
            .filter(|obj| matches!(obj, Object::ClientSession { name: n } if *n == name))
            .count()
    }

    /// Number of open SM sessions.
    pub fn open_sm_sessions(&self) -> usize {
        self.lock()
            .handles
            .values()
            .filter(|obj| matches!(obj, Object::SmSession))
            .count()
    }

    /// Number of open handles of any kind.
    pub fn open_handles(&self) -> usize {
        self.lock().handles.len()
    }

    /// PID received with the last SM RegisterClient.
    pub fn registered_pid(&self) -> Option<u64> {
        self.lock().registered_pid
    }

    /// Opens a client session to `name` without going through SM.
    ///
    /// Models a session handed to the process by its loader.
    pub fn open_session(&self, name: ServiceName) -> Handle {
        let raw = self.lock().insert(Object::ClientSession { name });
        // SAFETY: issued by this kernel.
        unsafe { Handle::from_raw(raw) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_sm(&self, msg: &mut MessageBuffer) -> Result<(), LayoutError> {
        let request = match cmif::parse_request(msg) {
            Ok(request) => request,
            Err(err) => {
                cmif::make_response(msg, err.result_code(), 0, 0)?;
                return Ok(());
            }
        };
        if request.is_close() {
            return Ok(());
        }

        let mut inner = self.lock();
        let reply = sm_command(&mut inner, &request);
        drop(inner);

        match reply {
            SmReply::Empty => {
                cmif::make_response(msg, ResultCode::SUCCESS, 0, 0)?;
            }
            SmReply::Handle(raw) => {
                let mut writer = cmif::make_response(msg, ResultCode::SUCCESS, 0, 1)?;
                writer.add_move_handle(raw)?;
            }
            SmReply::Failure(rc) => {
                cmif::make_response(msg, rc, 0, 0)?;
            }
        }
        Ok(())
    }
}

enum SmReply {
    Empty,
    Handle(RawHandle),
    Failure(ResultCode),
}

fn read_name(payload: &[u8]) -> Option<ServiceName> {
    let raw = payload.get(..8)?.try_into().ok().map(u64::from_le_bytes)?;
    ServiceName::from_u64(raw)
}

fn sm_command(inner: &mut Inner, request: &IncomingRequest) -> SmReply {
    tracing::trace!(cmd = request.command_id, "sm request");
    match request.command_id {
        sm::REGISTER_CLIENT => {
            inner.registered_pid = request.pid;
            SmReply::Empty
        }
        sm::GET_SERVICE_HANDLE => {
            let Some(name) = read_name(&request.payload) else {
                return SmReply::Failure(sm::RESULT_NOT_REGISTERED);
            };
            if !inner.registry.contains_key(&name) {
                return SmReply::Failure(sm::RESULT_NOT_REGISTERED);
            }
            SmReply::Handle(inner.insert(Object::ClientSession { name }))
        }
        sm::REGISTER_SERVICE => {
            let Some(input) = RegisterServiceIn::from_bytes(&request.payload) else {
                return SmReply::Failure(cmif::RESULT_INVALID_IN_HEADER);
            };
            if inner.registry.contains_key(&input.name) {
                return SmReply::Failure(sm::RESULT_ALREADY_REGISTERED);
            }
            inner.registry.insert(input.name, Registration::Port);
            SmReply::Handle(inner.insert(Object::ServerPort { name: input.name }))
        }
        sm::UNREGISTER_SERVICE => {
            let Some(name) = read_name(&request.payload) else {
                return SmReply::Failure(sm::RESULT_NOT_REGISTERED);
            };
            match inner.registry.get(&name) {
                Some(Registration::Port) => {
                    inner.registry.remove(&name);
                    SmReply::Empty
                }
                Some(Registration::Server(_)) => SmReply::Failure(sm::RESULT_NOT_ALLOWED),
                None => SmReply::Failure(sm::RESULT_NOT_REGISTERED),
            }
        }
        _ => SmReply::Failure(cmif::RESULT_UNKNOWN_COMMAND_ID),
    }
}

impl Kernel for LoopbackKernel {
    fn connect_to_named_port(&self, name: &CStr) -> Result<Handle, ConnectError> {
        let mut inner = self.lock();
        if name != sm::SM_PORT_NAME || !inner.sm_available {
            return Err(ConnectError::NotFound);
        }
        let raw = inner.insert(Object::SmSession);
        // SAFETY: issued by this kernel.
        Ok(unsafe { Handle::from_raw(raw) })
    }

    fn send_sync_request(
        &self,
        session: Handle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError> {
        let object = self
            .lock()
            .handles
            .get(&session.to_raw())
            .copied()
            .ok_or(SendSyncError::InvalidHandle)?;

        if let Ok(parsed) = hipc::parse_request(msg)
            && parsed.layout.meta().send_pid
        {
            if let Err(err) = parsed.layout.set_pid(msg, LOOPBACK_PID) {
                tracing::warn!(error = %err, "request has no pid slot");
            }
        }

        match object {
            Object::SmSession => self.handle_sm(msg).map_err(|err| {
                tracing::warn!(error = %err, "sm reply does not fit");
                SendSyncError::SessionClosed
            }),
            Object::ClientSession { name } => {
                let handler = match self.lock().registry.get(&name) {
                    Some(Registration::Server(handler)) => Arc::clone(handler),
                    _ => return Err(SendSyncError::SessionClosed),
                };
                tracing::trace!(service = %name, session = session.to_raw(), "routing request");

                // SAFETY: the client is blocked in this call and its buffers
                // live in this address space.
                match unsafe { handler.handle(msg) } {
                    Ok(_) => Ok(()),
                    Err(err) => {
                        tracing::warn!(service = %name, error = %err, "server reply does not fit");
                        Err(SendSyncError::SessionClosed)
                    }
                }
            }
            Object::ServerPort { .. } => Err(SendSyncError::InvalidHandle),
        }
    }

    fn close_handle(&self, handle: Handle) -> Result<(), CloseHandleError> {
        self.lock()
            .handles
            .remove(&handle.to_raw())
            .map(|_| ())
            .ok_or(CloseHandleError::InvalidHandle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ServiceName {
        ServiceName::new(s).expect("valid name")
    }

    #[test]
    fn sm_is_only_reachable_when_available() {
        let kernel = LoopbackKernel::new();
        assert!(sysclk_sm::connect(&kernel).is_ok());

        kernel.set_sm_available(false);
        assert!(matches!(
            sysclk_sm::connect(&kernel),
            Err(sysclk_sm::ConnectError::Connect(ConnectError::NotFound))
        ));
    }

    #[test]
    fn register_client_carries_the_pid() {
        let kernel = LoopbackKernel::new();
        let sm = sysclk_sm::connect(&kernel).expect("sm");
        assert_eq!(kernel.registered_pid(), Some(LOOPBACK_PID));
        sm.close();
        assert_eq!(kernel.open_handles(), 0);
    }

    #[test]
    fn registration_claims_and_releases_names() {
        let kernel = LoopbackKernel::new();
        let sm = sysclk_sm::connect(&kernel).expect("sm");
        let probe = name("probe");

        let port = sm.register_service(probe, false, 1).expect("free name");
        assert!(kernel.is_registered(probe));

        let err = sm.register_service(probe, false, 1).expect_err("taken");
        assert!(err.is_already_registered());

        kernel.close_handle(port).expect("port handle");
        sm.unregister_service(probe).expect("registered");
        assert!(!kernel.is_registered(probe));
    }

    #[test]
    fn servers_cannot_be_unregistered_through_sm() {
        let kernel = LoopbackKernel::new();
        let daemon = Arc::new(crate::ReferenceDaemon::new());
        kernel
            .register_server(sysclk_ipc::SERVICE_NAME, daemon)
            .expect("free name");

        let sm = sysclk_sm::connect(&kernel).expect("sm");
        let err = sm
            .unregister_service(sysclk_ipc::SERVICE_NAME)
            .expect_err("owned by a server");
        assert_eq!(
            err.service_error().map(|e| e.result_code()),
            Some(sm::RESULT_NOT_ALLOWED)
        );
    }

    #[test]
    fn sessions_to_a_departed_server_are_closed() {
        let kernel = LoopbackKernel::new();
        let daemon = Arc::new(crate::ReferenceDaemon::new());
        kernel
            .register_server(sysclk_ipc::SERVICE_NAME, daemon)
            .expect("free name");

        let session = kernel.open_session(sysclk_ipc::SERVICE_NAME);
        assert_eq!(kernel.open_sessions(sysclk_ipc::SERVICE_NAME), 1);
        assert!(kernel.unregister_server(sysclk_ipc::SERVICE_NAME));

        let mut msg = MessageBuffer::new();
        assert_eq!(
            kernel.send_sync_request(session, &mut msg),
            Err(SendSyncError::SessionClosed)
        );
        kernel.close_handle(session).expect("still in the table");
        assert_eq!(
            kernel.close_handle(session),
            Err(CloseHandleError::InvalidHandle)
        );
    }
}
