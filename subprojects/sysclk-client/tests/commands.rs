//! Each daemon command through a client session.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sysclk_client::{ClientConfig, SysClkClient};
use sysclk_ipc::{
    API_VERSION, CommandError, ConfigValue, ConfigValueList, MAX_FREQ_LIST_COUNT, Module,
    Profile, SERVICE_NAME, SysClkError, TitleProfileList,
    freq::{GPU_FREQ_TABLE_HZ, MEM_FREQ_TABLE_HZ},
};
use sysclk_sf::kernel::SendSyncError;
use sysclk_test_utils::{
    LoopbackKernel, ReferenceDaemon, daemon::DEFAULT_VERSION, daemon_fixture,
};

const TID: u64 = 0x0100_0000_0000_1000;

struct Fixture {
    kernel: Arc<LoopbackKernel>,
    daemon: Arc<ReferenceDaemon>,
    client: SysClkClient<Arc<LoopbackKernel>>,
}

fn fixture() -> Fixture {
    let (kernel, daemon) = daemon_fixture();
    let client = SysClkClient::new(Arc::clone(&kernel), ClientConfig::default());
    Fixture {
        kernel,
        daemon,
        client,
    }
}

#[test]
fn reports_the_protocol_version() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");
    assert_eq!(session.get_api_version(), Ok(API_VERSION));
}

#[test]
fn version_string_fits_the_caller_buffer() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    assert_eq!(session.version_string().as_deref(), Ok(DEFAULT_VERSION));

    let mut small = [0xFFu8; 8];
    let len = session.get_version_string(&mut small).expect("reply");
    assert_eq!(len, 7);
    assert_eq!(&small[..len], b"sys-clk");
    assert_eq!(small[7], 0);

    assert_eq!(session.get_version_string(&mut []), Ok(0));
}

#[test]
fn fresh_daemon_context() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    let ctx = session.get_current_context().expect("context");
    assert!(!ctx.enabled);
    assert_eq!(ctx.profile, Profile::Handheld);
    assert_eq!(ctx.freq(Module::Gpu), 384_000_000);
    assert_eq!(ctx.override_freq(Module::Gpu), None);
    assert_eq!(ctx.real_freq(Module::Mem), 1_600_000_000);
}

#[test]
fn profile_lists_are_replaced_whole() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    let first = TitleProfileList::from_entries([
        (Profile::Docked, Module::Cpu, 1_785_000_000),
        (Profile::Docked, Module::Gpu, 921_600_000),
    ])
    .expect("unique");
    session.set_profiles(TID, &first).expect("stored");
    assert_eq!(session.get_profiles(TID), Ok(first));
    assert_eq!(session.get_profile_count(TID), Ok(2));

    let second =
        TitleProfileList::from_entries([(Profile::Handheld, Module::Mem, 1_331_200_000)])
            .expect("unique");
    session.set_profiles(TID, &second).expect("stored");
    assert_eq!(session.get_profiles(TID), Ok(second));
    assert_eq!(session.get_profile_count(TID), Ok(1));

    session
        .set_profiles(TID, &TitleProfileList::new())
        .expect("stored");
    assert_eq!(session.get_profile_count(TID), Ok(0));
    assert_eq!(f.daemon.stored_titles(), 0);
}

#[test]
fn unknown_titles_have_no_profiles() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");
    assert_eq!(session.get_profiles(42), Ok(TitleProfileList::new()));
    assert_eq!(session.get_profile_count(42), Ok(0));
}

#[test]
fn set_enabled_is_idempotent() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    session.set_enabled(true).expect("accepted");
    session.set_enabled(true).expect("accepted");
    assert!(f.daemon.is_enabled());
    assert!(session.get_current_context().expect("context").enabled);

    session.set_enabled(false).expect("accepted");
    assert!(!session.get_current_context().expect("context").enabled);
}

#[test]
fn override_is_clamped_and_cleared() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    session.set_override(Module::Cpu, 1_100_000_000).expect("accepted");
    let ctx = session.get_current_context().expect("context");
    assert_eq!(ctx.override_freq(Module::Cpu), Some(1_020_000_000));

    session.set_override(Module::Cpu, 0).expect("accepted");
    let ctx = session.get_current_context().expect("context");
    assert_eq!(ctx.override_freq(Module::Cpu), None);
    assert_eq!(ctx.freq(Module::Cpu), 1_020_000_000);
}

#[test]
fn freq_list_of_zero_entries_sends_nothing() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");
    assert_eq!(session.get_freq_list(Module::Gpu, &mut []), Ok(0));
}

#[test]
fn freq_list_is_truncated_to_the_buffer() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    let mut out = [0u32; 4];
    assert_eq!(session.get_freq_list(Module::Gpu, &mut out), Ok(4));
    assert_eq!(out, [76_800_000, 153_600_000, 230_400_000, 307_200_000]);
}

#[test]
fn freq_list_returns_the_whole_table() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    let list = session.freq_list(Module::Mem).expect("reply");
    assert_eq!(list, &MEM_FREQ_TABLE_HZ[..MEM_FREQ_TABLE_HZ.len() - 1]);

    let list = session.freq_list(Module::Gpu).expect("reply");
    assert_eq!(list.len(), GPU_FREQ_TABLE_HZ.len() - 1);
    assert!(!list.contains(&0));
}

#[test]
fn freq_list_rejects_oversized_buffers() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    let mut out = [0u32; MAX_FREQ_LIST_COUNT + 1];
    assert_eq!(
        session.get_freq_list(Module::Cpu, &mut out),
        Err(CommandError::BufferTooLarge {
            len: MAX_FREQ_LIST_COUNT + 1,
            max: MAX_FREQ_LIST_COUNT,
        })
    );
}

#[test]
fn config_values_round_trip() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    assert_eq!(session.get_config_values(), Ok(ConfigValueList::default()));

    let mut values = ConfigValueList::default();
    values.set(ConfigValue::PollingIntervalMs, 500);
    values.set(ConfigValue::CsvWriteIntervalMs, 1_000);
    session.set_config_values(&values).expect("stored");
    assert_eq!(session.get_config_values(), Ok(values));
}

#[test]
fn invalid_config_is_a_generic_error() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    let mut values = ConfigValueList::default();
    values.set(ConfigValue::PollingIntervalMs, 0);
    let err = session.set_config_values(&values).expect_err("rejected");
    assert_eq!(err.sysclk_error(), Some(SysClkError::Generic));
    assert_eq!(session.get_config_values(), Ok(ConfigValueList::default()));
}

#[test]
fn daemon_errors_decode_to_their_reason() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");

    f.daemon.set_config_loaded(false);
    let err = session.get_config_values().expect_err("not loaded");
    assert_eq!(err.sysclk_error(), Some(SysClkError::ConfigNotLoaded));
    let code = err.service_error().expect("daemon replied");
    assert_eq!(code.to_string(), "2388-0001");

    f.daemon.set_config_loaded(true);
    f.daemon.set_fail_saves(true);
    let err = session
        .set_profiles(TID, &TitleProfileList::new())
        .expect_err("save fails");
    assert_eq!(err.sysclk_error(), Some(SysClkError::ConfigSaveFailed));
}

#[test]
fn exit_reaches_the_daemon() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");
    session.exit().expect("accepted");
    assert!(f.daemon.exit_requested());
}

#[test]
fn commands_fail_once_the_daemon_is_gone() {
    let f = fixture();
    let session = f.client.acquire().expect("daemon registered");
    assert!(session.ping());

    assert!(f.kernel.unregister_server(SERVICE_NAME));
    assert!(!session.ping());
    assert_eq!(
        session.set_enabled(true),
        Err(CommandError::SendRequest(SendSyncError::SessionClosed))
    );

    drop(session);
    assert_eq!(f.kernel.open_handles(), 0);
}
