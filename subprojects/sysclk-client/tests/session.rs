//! Reference counting and discovery against the loopback kernel.

use std::sync::Arc;

use sysclk_client::{AcquireError, ClientConfig, ProbeError, SysClkClient};
use sysclk_ipc::{CommandError, Module, SERVICE_NAME, SysClkService};
use sysclk_sf::{Handle, kernel::ConnectError};
use sysclk_test_utils::{LoopbackKernel, daemon_fixture, empty_fixture};

fn client(kernel: &Arc<LoopbackKernel>) -> SysClkClient<Arc<LoopbackKernel>> {
    SysClkClient::new(Arc::clone(kernel), ClientConfig::default())
}

#[test]
fn channel_is_open_exactly_while_sessions_live() {
    let (kernel, _daemon) = daemon_fixture();
    let client = client(&kernel);
    assert!(!client.is_connected());

    let first = client.acquire().expect("daemon registered");
    assert_eq!(client.ref_count(), 1);
    assert!(client.is_connected());
    assert_eq!(kernel.open_sessions(SERVICE_NAME), 1);

    let second = client.acquire().expect("already open");
    let third = second.clone();
    assert_eq!(client.ref_count(), 3);
    assert_eq!(kernel.open_sessions(SERVICE_NAME), 1);

    drop(first);
    drop(third);
    assert!(client.is_connected());
    assert_eq!(kernel.open_sessions(SERVICE_NAME), 1);

    drop(second);
    assert_eq!(client.ref_count(), 0);
    assert!(!client.is_connected());
    assert_eq!(kernel.open_handles(), 0);
}

#[test]
fn sm_is_closed_once_the_service_is_resolved() {
    let (kernel, _daemon) = daemon_fixture();
    let client = client(&kernel);

    let session = client.acquire().expect("daemon registered");
    assert_eq!(kernel.open_sm_sessions(), 0);
    assert_eq!(kernel.open_handles(), 1);
    drop(session);
}

#[test]
fn reacquire_after_full_release_reopens() {
    let (kernel, _daemon) = daemon_fixture();
    let client = client(&kernel);

    for _ in 0..3 {
        let session = client.acquire().expect("daemon registered");
        assert!(session.ping());
        drop(session);
        assert!(!client.is_connected());
    }
    assert_eq!(kernel.open_handles(), 0);
}

#[test]
fn failed_acquire_leaves_nothing_open() {
    let kernel = empty_fixture();
    let client = client(&kernel);

    let err = client.acquire().expect_err("nothing registered");
    assert!(err.is_not_running());
    assert_eq!(client.ref_count(), 0);
    assert!(!client.is_connected());
    assert_eq!(kernel.open_handles(), 0);
}

#[test]
fn acquire_reports_an_unreachable_sm() {
    let (kernel, _daemon) = daemon_fixture();
    kernel.set_sm_available(false);
    let client = client(&kernel);

    let err = client.acquire().expect_err("sm gone");
    assert!(matches!(
        err,
        AcquireError::ConnectSm(sysclk_sm::ConnectError::Connect(ConnectError::NotFound))
    ));
    assert!(!err.is_not_running());
    assert_eq!(client.ref_count(), 0);
}

#[test]
fn probe_sees_a_registered_daemon() {
    let (kernel, _daemon) = daemon_fixture();
    let client = client(&kernel);

    assert_eq!(client.is_running(), Ok(true));
    assert!(kernel.is_registered(SERVICE_NAME));
    assert_eq!(kernel.open_handles(), 0);
}

#[test]
fn probe_releases_its_claim() {
    let kernel = empty_fixture();
    let client = client(&kernel);

    assert_eq!(client.is_running(), Ok(false));
    assert!(!kernel.is_registered(SERVICE_NAME));
    assert_eq!(kernel.open_handles(), 0);

    // the name is free again for a daemon starting later
    assert_eq!(client.is_running(), Ok(false));
}

#[test]
fn probe_is_refused_while_a_session_is_held() {
    let (kernel, _daemon) = daemon_fixture();
    let client = client(&kernel);

    let session = client.acquire().expect("daemon registered");
    assert_eq!(client.is_running(), Err(ProbeError::SessionHeld));
    drop(session);

    assert_eq!(client.is_running(), Ok(true));
}

#[test]
fn probe_reports_an_unreachable_sm() {
    let kernel = empty_fixture();
    kernel.set_sm_available(false);
    let client = client(&kernel);

    assert!(matches!(client.is_running(), Err(ProbeError::ConnectSm(_))));
}

#[test]
fn override_session_bypasses_sm_and_stays_open() {
    let (kernel, _daemon) = daemon_fixture();
    kernel.set_sm_available(false);

    let handle = kernel.open_session(SERVICE_NAME);
    let config = ClientConfig::builder().service_override(handle).build();
    let client = SysClkClient::new(Arc::clone(&kernel), config);

    let session = client.acquire().expect("override needs no SM");
    assert_eq!(session.get_api_version(), Ok(sysclk_ipc::API_VERSION));
    drop(session);

    assert!(!client.is_connected());
    assert_eq!(kernel.registered_pid(), None);
    assert_eq!(kernel.open_sessions(SERVICE_NAME), 1);
}

#[test]
fn invalid_override_fails_acquire() {
    let (kernel, _daemon) = daemon_fixture();
    let config = ClientConfig::builder()
        .service_override(Handle::INVALID)
        .build();
    let client = SysClkClient::new(Arc::clone(&kernel), config);

    assert_eq!(
        client.acquire().map(|_| ()),
        Err(AcquireError::InvalidOverride)
    );
    assert_eq!(client.ref_count(), 0);
    assert!(!client.is_connected());
    assert_eq!(kernel.open_handles(), 0);
}

#[test]
fn commands_without_a_session_are_not_connected() {
    let kernel = empty_fixture();
    let service = SysClkService::from_override(Arc::clone(&kernel), Handle::INVALID);

    assert_eq!(service.get_api_version(), Err(CommandError::NotConnected));
    assert_eq!(
        service.set_override(Module::Gpu, 768_000_000),
        Err(CommandError::NotConnected)
    );
    let mut out = [0u32; 4];
    assert_eq!(
        service.get_freq_list(Module::Cpu, &mut out),
        Err(CommandError::NotConnected)
    );
}

#[test]
fn sessions_are_shared_across_threads() {
    let (kernel, _daemon) = daemon_fixture();
    let client = Arc::new(client(&kernel));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let client = Arc::clone(&client);
            std::thread::spawn(move || {
                let session = client.acquire().expect("daemon registered");
                session.set_enabled(i % 2 == 0).expect("accepted");
                session.get_current_context().expect("context")
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }
    assert_eq!(client.ref_count(), 0);
    assert_eq!(kernel.open_handles(), 0);
}
