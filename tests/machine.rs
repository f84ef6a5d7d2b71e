//! Tests for the state machine's command semantics.

mod common;

use common::*;
use keel::core::error::NodeError;
use keel::protocol::RespValue;
use keel::replication::DirectApplier;

// ============================================================================
// Basic string commands
// ============================================================================

#[test]
fn set_then_get() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    expect_ok(run_ok(&machine, &["SET", "foo", "bar"]));
    expect_bulk(run_ok(&machine, &["GET", "foo"]), b"bar");
}

#[test]
fn get_missing_is_null() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    expect_null(run_ok(&machine, &["get", "missing"]));
}

#[test]
fn set_overwrites_in_order() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["set", "k", "one"]);
    run_ok(&machine, &["set", "k", "two"]);
    expect_bulk(run_ok(&machine, &["get", "k"]), b"two");
}

#[test]
fn echo_replies_with_argument() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    expect_bulk(run_ok(&machine, &["echo", "hello"]), b"hello");
}

#[test]
fn empty_key_and_empty_value() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    expect_ok(run_ok(&machine, &["set", "", "value-for-empty"]));
    expect_bulk(run_ok(&machine, &["get", ""]), b"value-for-empty");

    expect_ok(run_ok(&machine, &["set", "empty-value", ""]));
    expect_bulk(run_ok(&machine, &["get", "empty-value"]), b"");
}

#[test]
fn binary_values_round_trip_exactly() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    let key: &[u8] = b"bin\x00key";
    let value: &[u8] = b"\x00\x01\xff\xfe\r\n";
    machine
        .command(&DirectApplier, &cmd_bytes(&[b"set", key, value]))
        .unwrap();
    let reply = machine
        .command(&DirectApplier, &cmd_bytes(&[b"get", key]))
        .unwrap();
    expect_bulk(reply, value);
}

#[test]
fn mset_then_mget_with_duplicate_keys() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    // Later assignment of `a` wins.
    expect_ok(run_ok(&machine, &["MSET", "a", "1", "b", "2", "a", "3"]));
    let values = expect_array(run_ok(&machine, &["MGET", "a", "b", "c"]));
    assert_eq!(
        values,
        vec![Some(b"3".to_vec()), Some(b"2".to_vec()), None]
    );
}

#[test]
fn mget_preserves_request_order() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "x", "10", "y", "20"]);
    let values = expect_array(run_ok(&machine, &["mget", "y", "nope", "x"]));
    assert_eq!(
        values,
        vec![Some(b"20".to_vec()), None, Some(b"10".to_vec())]
    );
}

// ============================================================================
// DEL / DELIF
// ============================================================================

#[test]
fn del_counts_only_present_keys() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2"]);
    assert_eq!(expect_int(run_ok(&machine, &["del", "a", "b", "c"])), 2);
    expect_null(run_ok(&machine, &["get", "a"]));
    expect_null(run_ok(&machine, &["get", "b"]));
}

#[test]
fn del_then_get_is_null() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["set", "k", "v"]);
    assert_eq!(expect_int(run_ok(&machine, &["del", "k"])), 1);
    expect_null(run_ok(&machine, &["get", "k"]));
    assert_eq!(expect_int(run_ok(&machine, &["del", "k"])), 0);
}

#[test]
fn delif_deletes_on_value_substring() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "x", "alpha", "y", "beta"]);
    // Only "beta" contains "eta".
    assert_eq!(expect_int(run_ok(&machine, &["delif", "eta", "x", "y"])), 1);
    expect_bulk(run_ok(&machine, &["get", "x"]), b"alpha");
    expect_null(run_ok(&machine, &["get", "y"]));
}

#[test]
fn delif_with_empty_needle_matches_everything() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2"]);
    assert_eq!(expect_int(run_ok(&machine, &["delif", "", "a", "b", "c"])), 2);
}

// ============================================================================
// PDEL / KEYS
// ============================================================================

#[test]
fn pdel_removes_matches_and_returns_count() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(
        &machine,
        &["mset", "user:1", "a", "user:2", "b", "item:1", "c"],
    );
    assert_eq!(expect_int(run_ok(&machine, &["pdel", "user:*"])), 2);

    let keys = expect_keys(run_ok(&machine, &["keys", "*"]));
    assert_eq!(keys, vec![b"item:1".to_vec()]);
}

#[test]
fn pdel_on_empty_store_returns_zero() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    assert_eq!(expect_int(run_ok(&machine, &["pdel", "*"])), 0);
}

#[test]
fn keys_star_on_empty_store() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    assert!(expect_keys(run_ok(&machine, &["keys", "*"])).is_empty());
}

#[test]
fn keys_returns_store_order() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "c", "3", "a", "1", "b", "2"]);
    let keys = expect_keys(run_ok(&machine, &["keys", "*"]));
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn keys_filters_by_pattern() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(
        &machine,
        &["mset", "user:1", "a", "user:2", "b", "item:1", "c"],
    );
    let keys = expect_keys(run_ok(&machine, &["keys", "user:*"]));
    assert_eq!(keys, vec![b"user:1".to_vec(), b"user:2".to_vec()]);

    let keys = expect_keys(run_ok(&machine, &["keys", "user:?"]));
    assert_eq!(keys, vec![b"user:1".to_vec(), b"user:2".to_vec()]);
}

#[test]
fn keys_pivot_ascending_is_strict() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2", "c", "3", "d", "4"]);
    let keys = expect_keys(run_ok(&machine, &["KEYS", "*", "PIVOT", "b", "LIMIT", "2"]));
    assert_eq!(keys, vec![b"c".to_vec(), b"d".to_vec()]);
}

#[test]
fn keys_pivot_descending_is_strict() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2", "c", "3", "d", "4"]);
    let keys = expect_keys(run_ok(
        &machine,
        &["KEYS", "*", "DESC", "PIVOT", "c", "LIMIT", "10"],
    ));
    assert_eq!(keys, vec![b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn keys_pivot_equal_to_existing_key_is_excluded() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2", "c", "3"]);
    let keys = expect_keys(run_ok(&machine, &["keys", "*", "pivot", "a"]));
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn keys_desc_without_pivot_walks_from_the_top() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2", "c", "3"]);
    let keys = expect_keys(run_ok(&machine, &["keys", "*", "desc"]));
    assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn keys_desc_pivot_past_end_of_store() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2"]);
    let keys = expect_keys(run_ok(&machine, &["keys", "*", "desc", "pivot", "zzz"]));
    assert_eq!(keys, vec![b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn keys_pivot_outside_pattern_bounds_yields_empty() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "b:1", "1", "b:2", "2"]);
    // Ascending pivot past the pattern's upper bound.
    assert!(expect_keys(run_ok(&machine, &["keys", "b:*", "pivot", "z"])).is_empty());
    // Descending pivot below the pattern's lower bound.
    assert!(expect_keys(run_ok(&machine, &["keys", "b:*", "desc", "pivot", "a"])).is_empty());
}

#[test]
fn keys_limit_zero_returns_nothing() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2"]);
    assert!(expect_keys(run_ok(&machine, &["keys", "*", "limit", "0"])).is_empty());
}

#[test]
fn keys_limit_caps_results() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2", "c", "3"]);
    let keys = expect_keys(run_ok(&machine, &["keys", "*", "limit", "2"]));
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn keys_withvalues_alternates_keys_and_values() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2"]);
    let entries = expect_keys(run_ok(&machine, &["keys", "*", "withvalues"]));
    assert_eq!(
        entries,
        vec![
            b"a".to_vec(),
            b"1".to_vec(),
            b"b".to_vec(),
            b"2".to_vec()
        ]
    );
}

#[test]
fn keys_key_equal_to_pattern_lower_bound_is_included() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "user:", "root", "user:1", "a"]);
    let keys = expect_keys(run_ok(&machine, &["keys", "user:*"]));
    assert_eq!(keys, vec![b"user:".to_vec(), b"user:1".to_vec()]);
}

#[test]
fn keys_option_errors() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    for parts in [
        &["keys", "*", "bogus"][..],
        &["keys", "*", "pivot"][..],
        &["keys", "*", "limit"][..],
        &["keys", "*", "limit", "abc"][..],
        &["keys", "*", "limit", "-1"][..],
    ] {
        let err = run(&machine, parts).unwrap_err();
        assert!(
            matches!(err, NodeError::Syntax),
            "expected syntax error for {:?}, got {:?}",
            parts,
            err
        );
    }
}

// ============================================================================
// Arity and dispatch errors
// ============================================================================

#[test]
fn arity_violations_cause_no_state_change() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["set", "k", "v"]);

    for parts in [
        &["set", "k"][..],
        &["set", "k", "v", "extra"][..],
        &["get"][..],
        &["get", "a", "b"][..],
        &["mset", "a"][..],
        &["mset", "a", "1", "b"][..],
        &["del"][..],
        &["delif", "needle"][..],
        &["pdel"][..],
        &["pdel", "a", "b"][..],
        &["keys"][..],
        &["echo"][..],
        &["flushdb", "now"][..],
        &["mget"][..],
    ] {
        let err = run(&machine, parts).unwrap_err();
        assert!(
            matches!(err, NodeError::WrongArity(_)),
            "expected arity error for {:?}, got {:?}",
            parts,
            err
        );
    }

    // The store is untouched.
    expect_bulk(run_ok(&machine, &["get", "k"]), b"v");
    assert_eq!(expect_keys(run_ok(&machine, &["keys", "*"])).len(), 1);
}

#[test]
fn unknown_command_is_an_error() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    let err = run(&machine, &["frobnicate", "x"]).unwrap_err();
    assert!(matches!(err, NodeError::UnknownCommand(name) if name == "frobnicate"));
}

#[test]
fn verbs_are_case_insensitive() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    expect_ok(run_ok(&machine, &["SeT", "k", "v"]));
    expect_bulk(run_ok(&machine, &["GET", "k"]), b"v");
    assert_eq!(expect_int(run_ok(&machine, &["DEL", "k"])), 1);
}

// ============================================================================
// FLUSHDB / lifecycle
// ============================================================================

#[test]
fn flushdb_empties_the_store() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["mset", "a", "1", "b", "2"]);
    expect_ok(run_ok(&machine, &["flushdb"]));
    assert!(expect_keys(run_ok(&machine, &["keys", "*"])).is_empty());

    // The fresh store accepts writes.
    expect_ok(run_ok(&machine, &["set", "after", "flush"]));
    expect_bulk(run_ok(&machine, &["get", "after"]), b"flush");
}

#[test]
fn closed_machine_rejects_commands() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    run_ok(&machine, &["set", "k", "v"]);
    machine.close().unwrap();
    assert!(machine.is_closed());

    let err = run(&machine, &["get", "k"]).unwrap_err();
    assert!(matches!(err, NodeError::Closed));
    let err = run(&machine, &["set", "k", "v2"]).unwrap_err();
    assert!(matches!(err, NodeError::Closed));
}

#[test]
fn reopen_preserves_state() {
    let dir = temp_test_dir();
    {
        let machine = open_machine(dir.path());
        run_ok(&machine, &["set", "persist", "yes"]);
        machine.close().unwrap();
    }
    let machine = open_machine(dir.path());
    expect_bulk(run_ok(&machine, &["get", "persist"]), b"yes");
}

#[test]
fn concurrent_readers_never_observe_torn_values() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());
    run_ok(&machine, &["set", "k", "aaaaaaaa"]);

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..200 {
                let value = if i % 2 == 0 { "aaaaaaaa" } else { "bbbbbbbb" };
                run_ok(&machine, &["set", "k", value]);
            }
        });
        s.spawn(|| {
            for _ in 0..200 {
                match run_ok(&machine, &["get", "k"]) {
                    RespValue::Bulk(b) => assert!(
                        b.as_ref() == b"aaaaaaaa" || b.as_ref() == b"bbbbbbbb",
                        "torn value: {:?}",
                        b
                    ),
                    other => panic!("expected bulk reply, got {:?}", other),
                }
            }
        });
    });
}

#[test]
fn shutdown_replies_ok_and_signals() {
    let dir = temp_test_dir();
    let machine = open_machine(dir.path());

    let signal = machine.shutdown_signal();
    assert!(!*signal.borrow());

    let reply = run_ok(&machine, &["shutdown"]);
    assert_eq!(reply, RespValue::Simple("OK".to_string()));
    assert!(*signal.borrow());
}
