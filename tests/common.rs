//! Common test utilities.
//!
//! Shared helpers for integration tests. Import with `mod common;` in test
//! files.

use bytes::Bytes;
use keel::core::error::NodeResult;
use keel::machine::Machine;
use keel::protocol::{Command, RespValue};
use keel::replication::DirectApplier;
use keel::store::StoreOptions;
use std::path::Path;

/// Create a temporary directory for test data.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create temp directory")
}

/// Open a machine over a fresh store in `dir`.
pub fn open_machine(dir: &Path) -> Machine {
    Machine::open(dir, StoreOptions::default()).expect("failed to open machine")
}

/// Build a command from string parts; the first part is the verb.
pub fn cmd(parts: &[&str]) -> Command {
    Command::new(
        parts
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect(),
    )
    .expect("failed to build command")
}

/// Build a command from raw byte parts.
pub fn cmd_bytes(parts: &[&[u8]]) -> Command {
    Command::new(parts.iter().map(|p| Bytes::copy_from_slice(p)).collect())
        .expect("failed to build command")
}

/// Execute a command against `machine` through the direct applier.
pub fn run(machine: &Machine, parts: &[&str]) -> NodeResult<RespValue> {
    machine.command(&DirectApplier, &cmd(parts))
}

/// Execute a command and unwrap the reply.
pub fn run_ok(machine: &Machine, parts: &[&str]) -> RespValue {
    run(machine, parts).expect("command failed")
}

/// Assert an OK simple-string reply.
#[track_caller]
pub fn expect_ok(reply: RespValue) {
    assert_eq!(reply, RespValue::Simple("OK".to_string()));
}

/// Assert an integer reply and return it.
#[track_caller]
pub fn expect_int(reply: RespValue) -> i64 {
    match reply {
        RespValue::Integer(n) => n,
        other => panic!("expected integer reply, got {:?}", other),
    }
}

/// Assert a bulk reply with the given payload.
#[track_caller]
pub fn expect_bulk(reply: RespValue, expected: &[u8]) {
    match reply {
        RespValue::Bulk(b) => assert_eq!(b.as_ref(), expected),
        other => panic!("expected bulk reply, got {:?}", other),
    }
}

/// Assert a null reply.
#[track_caller]
pub fn expect_null(reply: RespValue) {
    assert!(reply.is_null(), "expected null reply, got {:?}", reply);
}

/// Assert an array reply and flatten bulks/nulls into options.
#[track_caller]
pub fn expect_array(reply: RespValue) -> Vec<Option<Vec<u8>>> {
    match reply {
        RespValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                RespValue::Bulk(b) => Some(b.to_vec()),
                RespValue::Null => None,
                other => panic!("expected bulk or null element, got {:?}", other),
            })
            .collect(),
        other => panic!("expected array reply, got {:?}", other),
    }
}

/// Assert an array reply of bulk strings.
#[track_caller]
pub fn expect_keys(reply: RespValue) -> Vec<Vec<u8>> {
    expect_array(reply)
        .into_iter()
        .map(|item| item.expect("unexpected null element"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_builds_lowercased_verbs() {
        let c = cmd(&["SET", "a", "1"]);
        assert_eq!(c.name(), "set");
        assert_eq!(c.argc(), 3);
    }

    #[test]
    fn machine_helper_round_trip() {
        let dir = temp_test_dir();
        let machine = open_machine(dir.path());
        expect_ok(run_ok(&machine, &["set", "a", "1"]));
        expect_bulk(run_ok(&machine, &["get", "a"]), b"1");
    }
}
