//! Test fixtures for the sys-clk IPC stack.
//!
//! - [`loopback`]: an in-process kernel with a service manager, routing
//!   requests to server objects living in the same process
//! - [`daemon`]: a reference sys-clk daemon implementing the command
//!   contract (storage and clamping, no scheduling)
//! - [`tracing_setup`]: subscriber setup for tests

use std::sync::Arc;

pub mod daemon;
pub mod loopback;
pub mod tracing_setup;

pub use self::{daemon::ReferenceDaemon, loopback::LoopbackKernel};

/// Builds a loopback kernel with a reference daemon registered as `sys:clk`.
pub fn daemon_fixture() -> (Arc<LoopbackKernel>, Arc<ReferenceDaemon>) {
    tracing_setup::init_test_tracing();

    let kernel = Arc::new(LoopbackKernel::new());
    let daemon = Arc::new(ReferenceDaemon::new());
    let registered = kernel.register_server(sysclk_ipc::SERVICE_NAME, daemon.clone());
    debug_assert!(registered.is_ok(), "fresh kernel has no registrations");
    (kernel, daemon)
}

/// Builds a loopback kernel with nothing registered.
pub fn empty_fixture() -> Arc<LoopbackKernel> {
    tracing_setup::init_test_tracing();
    Arc::new(LoopbackKernel::new())
}
