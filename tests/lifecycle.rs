//! End-to-end lifecycle scenarios against a scripted daemon on a real
//! Unix socket.

mod common;

use qemuctl::driver::{DomainState, Hypervisor, OpenOptions};
use qemuctl::error::{DriverError, Result};
use qemuctl::qemud::autostart::DaemonLauncher;
use qemuctl::qemud::connect::Endpoint;
use qemuctl::qemud::protocol::MAX_CONFIG_LEN;
use qemuctl::qemud::QemudConnection;

use common::MockDaemon;

/// The scripted daemon is already listening, so connecting must never
/// reach the launcher.
struct NoDaemonHere;

impl DaemonLauncher for NoDaemonHere {
    fn launch(&self) -> Result<()> {
        panic!("autostart attempted against a live daemon");
    }
}

fn connect(daemon: &MockDaemon) -> QemudConnection {
    let endpoint = Endpoint::Filesystem(daemon.socket_path.clone());
    QemudConnection::open(&endpoint, OpenOptions::default(), &NoDaemonHere)
        .expect("connect to scripted daemon")
}

fn domain_config(name: &str) -> String {
    format!("<domain type='qemu'><name>{name}</name></domain>")
}

fn network_config(name: &str) -> String {
    format!("<network><name>{name}</name></network>")
}

#[test]
fn version_and_node_info() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    assert_eq!(conn.version().unwrap(), 2_000_042);

    let node = conn.node_info().unwrap();
    assert_eq!(node.model, "x86_64");
    assert_eq!(node.cpus, 4);
    assert_eq!(node.memory, 8 * 1024 * 1024);
}

#[test]
fn create_destroy_then_lookup_by_id_fails() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let mut domain = conn.domain_create(&domain_config("vm1")).unwrap();
    assert!(domain.is_running());
    let id = domain.id.unwrap();

    assert_eq!(conn.num_domains().unwrap(), 1);
    assert_eq!(conn.list_domains(100).unwrap(), vec![id]);

    let found = conn.domain_lookup_by_id(id).unwrap();
    assert_eq!(found.name, "vm1");
    assert_eq!(found.uuid, domain.uuid);

    conn.domain_destroy(&mut domain).unwrap();
    assert!(!domain.is_running());

    assert!(matches!(
        conn.domain_lookup_by_id(id).unwrap_err(),
        DriverError::NotFound(_)
    ));
    assert_eq!(conn.num_domains().unwrap(), 0);
}

#[test]
fn define_start_suspend_resume_undefine() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let mut domain = conn.domain_define(&domain_config("vm2")).unwrap();
    assert_eq!(domain.id, None);
    assert_eq!(conn.num_defined_domains().unwrap(), 1);
    assert_eq!(conn.list_defined_domains(100).unwrap(), vec!["vm2"]);

    let info = conn.domain_info(&domain).unwrap();
    assert_eq!(info.state, DomainState::Shutoff);

    conn.domain_start(&mut domain).unwrap();
    assert!(domain.is_running());
    assert_eq!(conn.num_defined_domains().unwrap(), 0);
    assert_eq!(conn.domain_info(&domain).unwrap().state, DomainState::Running);

    conn.domain_suspend(&domain).unwrap();
    assert_eq!(conn.domain_info(&domain).unwrap().state, DomainState::Paused);

    conn.domain_resume(&domain).unwrap();
    assert_eq!(conn.domain_info(&domain).unwrap().state, DomainState::Running);

    conn.domain_destroy(&mut domain).unwrap();

    // Destroying a transient instance removed it outright, so undefine
    // reports it gone.
    assert!(conn.domain_undefine(domain).is_err());
}

#[test]
fn lookup_by_uuid_and_name_carry_runtime_id() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let running = conn.domain_create(&domain_config("vm1")).unwrap();
    let defined = conn.domain_define(&domain_config("vm2")).unwrap();

    let by_uuid = conn.domain_lookup_by_uuid(&running.uuid).unwrap();
    assert_eq!(by_uuid.id, running.id);
    assert_eq!(by_uuid.name, "vm1");

    let by_name = conn.domain_lookup_by_name("vm2").unwrap();
    assert_eq!(by_name.id, None);
    assert_eq!(by_name.uuid, defined.uuid);

    assert!(matches!(
        conn.domain_lookup_by_name("no-such-vm").unwrap_err(),
        DriverError::NotFound(_)
    ));
}

#[test]
fn list_truncates_to_caller_capacity() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    for i in 0..5 {
        conn.domain_create(&domain_config(&format!("vm{i}"))).unwrap();
    }
    assert_eq!(conn.num_domains().unwrap(), 5);

    // The daemon reports five; the caller asked for two.
    let ids = conn.list_domains(2).unwrap();
    assert_eq!(ids.len(), 2);

    for i in 0..5 {
        conn.domain_define(&domain_config(&format!("defined{i}")))
            .unwrap();
    }
    assert_eq!(conn.list_defined_domains(3).unwrap().len(), 3);
}

#[test]
fn oversize_config_fails_locally_without_any_round_trip() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    // Prove the counter moves at all.
    conn.version().unwrap();
    assert_eq!(daemon.requests_served(), 1);

    let config = "x".repeat(MAX_CONFIG_LEN);
    assert!(matches!(
        conn.domain_define(&config).unwrap_err(),
        DriverError::TooLarge { .. }
    ));
    assert!(matches!(
        conn.network_create(&config).unwrap_err(),
        DriverError::TooLarge { .. }
    ));

    // Another exchange still works and the counter shows the oversize
    // calls sent nothing.
    conn.version().unwrap();
    assert_eq!(daemon.requests_served(), 2);
}

#[test]
fn daemon_refusal_surfaces_code_and_message() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let domain = conn.domain_define(&domain_config("vm1")).unwrap();
    // Starting twice: the second start hits the daemon's refusal path.
    let mut first = domain.clone();
    conn.domain_start(&mut first).unwrap();
    let mut second = domain.clone();
    match conn.domain_start(&mut second).unwrap_err() {
        DriverError::Daemon { code, message } => {
            assert_eq!(code, 1);
            assert!(message.contains("already running"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    // The handle is untouched on failure.
    assert_eq!(second.id, None);
}

#[test]
fn dump_config_returns_the_stored_document() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let config = domain_config("vm1");
    let domain = conn.domain_create(&config).unwrap();
    assert_eq!(conn.domain_dump_config(&domain).unwrap(), config);
}

#[test]
fn shutdown_falls_back_to_destroy() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let mut domain = conn.domain_create(&domain_config("vm1")).unwrap();
    conn.domain_shutdown(&mut domain).unwrap();
    assert!(!domain.is_running());
    assert_eq!(conn.num_domains().unwrap(), 0);
}

#[test]
fn save_and_restore_are_unsupported() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let domain = conn.domain_create(&domain_config("vm1")).unwrap();
    assert!(matches!(
        conn.domain_save(&domain, "/tmp/image").unwrap_err(),
        DriverError::Unsupported(_)
    ));
    assert!(matches!(
        conn.domain_restore("/tmp/image").unwrap_err(),
        DriverError::Unsupported(_)
    ));
}

#[test]
fn network_lifecycle() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    let active = conn.network_create(&network_config("default")).unwrap();
    let inactive = conn.network_define(&network_config("isolated")).unwrap();

    assert_eq!(conn.num_networks().unwrap(), 1);
    assert_eq!(conn.list_networks(100).unwrap(), vec!["default"]);
    assert_eq!(conn.num_defined_networks().unwrap(), 1);
    assert_eq!(conn.list_defined_networks(100).unwrap(), vec!["isolated"]);

    let by_name = conn.network_lookup_by_name("default").unwrap();
    assert_eq!(by_name.uuid, active.uuid);
    let by_uuid = conn.network_lookup_by_uuid(&inactive.uuid).unwrap();
    assert_eq!(by_uuid.name, "isolated");

    assert_eq!(conn.network_bridge_name(&active).unwrap(), "virbr0");
    assert_eq!(
        conn.network_dump_config(&inactive).unwrap(),
        network_config("isolated")
    );

    conn.network_start(&inactive).unwrap();
    assert_eq!(conn.num_networks().unwrap(), 2);

    conn.network_destroy(&active).unwrap();
    assert_eq!(conn.list_networks(100).unwrap(), vec!["isolated"]);

    conn.network_undefine(active).unwrap();
    assert!(matches!(
        conn.network_lookup_by_name("default").unwrap_err(),
        DriverError::NotFound(_)
    ));
}

#[test]
fn network_list_truncates_to_caller_capacity() {
    let daemon = MockDaemon::spawn();
    let conn = connect(&daemon);

    for i in 0..4 {
        conn.network_create(&network_config(&format!("net{i}")))
            .unwrap();
    }
    assert_eq!(conn.list_networks(2).unwrap().len(), 2);
}

#[test]
fn close_then_reopen_through_a_fresh_connection() {
    let daemon = MockDaemon::spawn();
    let mut conn = connect(&daemon);

    conn.domain_create(&domain_config("vm1")).unwrap();
    conn.close().unwrap();
    assert!(matches!(
        conn.version().unwrap_err(),
        DriverError::ConnectionClosed
    ));

    // State lives in the daemon, not the connection.
    let conn = connect(&daemon);
    assert_eq!(conn.num_domains().unwrap(), 1);
}
