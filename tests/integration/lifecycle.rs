//! End-to-end start/stop lifecycle tests against real subprocesses.

#[path = "common/mod.rs"]
mod common;

use std::{
    fs,
    sync::{Arc, Mutex},
};

use common::{
    HomeEnvGuard, wait_for_exit, wait_for_public_url, write_failing_forwarder,
    write_stub_forwarder,
};
use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tempfile::tempdir;
use tunnelg::{
    error::TunnelManagerError,
    events::TunnelEvent,
    manager::{StopOutcome, TunnelManager},
    probe,
    store::{PidEntry, Protocol},
};

fn read_pid(manager: &TunnelManager, id: &str) -> u32 {
    match manager.store().read_pid(id) {
        PidEntry::Pid(pid) => pid,
        other => panic!("expected PID record for '{id}', got {other:?}"),
    }
}

#[test]
fn start_writes_records_and_leaves_a_live_process() {
    let temp = tempdir().expect("tempdir");
    let forwarder = write_stub_forwarder(temp.path());
    let base = temp.path().join("state");
    let manager = TunnelManager::with_forwarder(base, forwarder.display().to_string());

    let id = manager
        .start_tunnel("demo", 3000, Protocol::Http)
        .expect("start tunnel");
    assert_eq!(id, "demo");

    let pid = read_pid(&manager, "demo");
    assert!(probe::is_alive(pid), "forwarder should be running");

    let config = fs::read_to_string(manager.store().config_path("demo"))
        .expect("descriptor present");
    assert!(config.contains("NAME=demo"));
    assert!(config.contains("PORT=3000"));
    assert!(config.contains("PROTOCOL=http"));
    assert!(config.contains("START_TIME="));

    let views = manager.list_tunnels();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, "demo");
    assert_eq!(views[0].port, 3000);
    assert!(views[0].is_running);

    // The stub logs its URL asynchronously; it must eventually surface.
    let url = wait_for_public_url(&manager, "demo");
    assert_eq!(url, "https://stub-test.trycloudflare.com");

    manager.stop_tunnel("demo").expect("stop tunnel");
    wait_for_exit(pid);
}

#[test]
fn start_sanitizes_the_requested_name() {
    let temp = tempdir().expect("tempdir");
    let forwarder = write_stub_forwarder(temp.path());
    let base = temp.path().join("state");
    let manager = TunnelManager::with_forwarder(base, forwarder.display().to_string());

    let id = manager
        .start_tunnel("my app!", 3000, Protocol::Http)
        .expect("start tunnel");
    assert_eq!(id, "my_app_");

    let config = fs::read_to_string(manager.store().config_path("my_app_"))
        .expect("descriptor present");
    assert!(config.contains("NAME=my_app_"));

    manager.stop_tunnel(&id).expect("stop tunnel");
}

#[test]
fn missing_forwarder_fails_without_leftover_state() {
    let temp = tempdir().expect("tempdir");
    let base = temp.path().join("state");
    let missing = temp.path().join("no-such-binary");
    let manager = TunnelManager::with_forwarder(base, missing.display().to_string());

    let err = manager
        .start_tunnel("demo", 3000, Protocol::Http)
        .expect_err("spawn must fail");
    assert!(matches!(err, TunnelManagerError::ForwarderMissing { .. }));

    assert!(manager.store().list_candidate_ids().is_empty());
    assert!(!manager.store().config_path("demo").exists());
}

#[test]
fn immediately_exiting_forwarder_is_reported_and_cleaned_up() {
    let temp = tempdir().expect("tempdir");
    let forwarder = write_failing_forwarder(temp.path());
    let base = temp.path().join("state");
    let manager = TunnelManager::with_forwarder(base, forwarder.display().to_string());

    let err = manager
        .start_tunnel("demo", 3000, Protocol::Http)
        .expect_err("forwarder exits immediately");
    assert!(matches!(
        err,
        TunnelManagerError::ExitedImmediately { code: Some(1), .. }
    ));

    assert!(!manager.store().pid_path("demo").exists());
    assert!(!manager.store().config_path("demo").exists());
}

#[test]
fn stop_terminates_the_process_and_purges_both_files() {
    let temp = tempdir().expect("tempdir");
    let forwarder = write_stub_forwarder(temp.path());
    let base = temp.path().join("state");
    let manager = TunnelManager::with_forwarder(base, forwarder.display().to_string());

    let id = manager
        .start_tunnel("demo", 3000, Protocol::Http)
        .expect("start tunnel");
    let pid = read_pid(&manager, &id);

    let outcome = manager.stop_tunnel(&id).expect("stop tunnel");
    assert_eq!(outcome, StopOutcome::Stopped);
    wait_for_exit(pid);

    assert!(!manager.store().pid_path(&id).exists());
    assert!(!manager.store().config_path(&id).exists());

    // Idempotent: the second stop finds nothing and does not error.
    let outcome = manager.stop_tunnel(&id).expect("second stop");
    assert_eq!(outcome, StopOutcome::NotFound);
}

#[test]
fn manager_rooted_at_runtime_base_dir_is_home_scoped() {
    let temp = tempdir().expect("tempdir");
    let _home = HomeEnvGuard::set(temp.path());

    let manager = TunnelManager::new(tunnelg::runtime::base_dir());
    assert_eq!(manager.store().base(), temp.path().join(".tunnelg"));
    assert!(manager.list_tunnels().is_empty());
}

#[test]
fn stop_of_ghost_id_mutates_nothing() {
    let temp = tempdir().expect("tempdir");
    let base = temp.path().join("state");
    let manager = TunnelManager::with_forwarder(base.clone(), "unused");

    let outcome = manager.stop_tunnel("ghost").expect("stop ghost");
    assert_eq!(outcome, StopOutcome::NotFound);
    assert!(!base.exists(), "no state directory should be created");
}

#[test]
fn duplicate_names_get_suffixed_and_freed_slots_are_reused() {
    let temp = tempdir().expect("tempdir");
    let forwarder = write_stub_forwarder(temp.path());
    let base = temp.path().join("state");
    let manager = TunnelManager::with_forwarder(base, forwarder.display().to_string());

    let first = manager
        .start_tunnel("svc", 3000, Protocol::Http)
        .expect("first start");
    let second = manager
        .start_tunnel("svc", 3001, Protocol::Http)
        .expect("second start");
    assert_eq!(first, "svc");
    assert_eq!(second, "svc_1");

    // Kill the first forwarder behind the supervisor's back, then let a
    // listing reconcile the carcass.
    let first_pid = read_pid(&manager, "svc");
    signal::kill(Pid::from_raw(first_pid as i32), Signal::SIGKILL).expect("kill first");
    wait_for_exit(first_pid);

    let views = manager.list_tunnels();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, "svc_1");
    assert!(!manager.store().pid_path("svc").exists());

    let third = manager
        .start_tunnel("svc", 3002, Protocol::Http)
        .expect("third start");
    assert_eq!(third, "svc");

    assert_eq!(manager.stop_all(), 2);
}

#[test]
fn stop_all_reports_the_number_of_stopped_tunnels() {
    let temp = tempdir().expect("tempdir");
    let forwarder = write_stub_forwarder(temp.path());
    let base = temp.path().join("state");
    let manager = TunnelManager::with_forwarder(base, forwarder.display().to_string());

    manager
        .start_tunnel("one", 3000, Protocol::Http)
        .expect("start one");
    manager
        .start_tunnel("two", 3001, Protocol::Https)
        .expect("start two");

    assert_eq!(manager.stop_all(), 2);
    assert!(manager.store().list_candidate_ids().is_empty());
    assert!(manager.list_tunnels().is_empty());
}

#[test]
fn lifecycle_changes_notify_subscribers() {
    let temp = tempdir().expect("tempdir");
    let forwarder = write_stub_forwarder(temp.path());
    let base = temp.path().join("state");
    let mut manager =
        TunnelManager::with_forwarder(base, forwarder.display().to_string());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    manager.subscribe(move |event: &TunnelEvent| {
        sink_events.lock().unwrap().push(event.clone());
    });

    let id = manager
        .start_tunnel("demo", 3000, Protocol::Http)
        .expect("start tunnel");
    manager.stop_tunnel(&id).expect("stop tunnel");

    let recorded = events.lock().unwrap();
    let changes = recorded
        .iter()
        .filter(|event| **event == TunnelEvent::TunnelsChanged)
        .count();
    assert_eq!(changes, 2, "one change per mutation, got {recorded:?}");
    assert!(
        recorded
            .iter()
            .any(|event| matches!(event, TunnelEvent::Message(text) if text.contains("Started tunnel 'demo'")))
    );
}
