//! Batch chunking behavior: round-trip counts, result ordering and chunk
//! failure policies.

use crate::common::{engine, user, User};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use gantry::value::Value;
use gantry::{ChunkPolicy, GantryError};
use rand::Rng;

fn fake_users(n: usize) -> Vec<User> {
    (0..n)
        .map(|_| {
            user(
                0,
                &FirstName().fake::<String>(),
                &LastName().fake::<String>(),
                &SafeEmail().fake::<String>(),
            )
        })
        .collect()
}

// ============================================================================
// Chunk arithmetic
// ============================================================================

#[test]
fn test_batch_insert_of_1001_rows_at_500_issues_three_chunks() {
    let (engine, provider) = engine();
    let users = fake_users(1001);

    let report = engine
        .insert_batch(&users, Some(500), None)
        .expect("batch succeeds");

    // ceil(1001 / 500) == 3 round trips, sized 500, 500, 1.
    assert_eq!(provider.journal().batch_set_sizes(), vec![500, 500, 1]);
    assert_eq!(report.chunks_attempted, 3);
    assert_eq!(report.chunks_succeeded, 3);
    assert_eq!(report.rows_affected.len(), 1001);

    // 1001 generated keys, in input order.
    let keys: Vec<i64> = report
        .generated_keys
        .iter()
        .map(|k| match k {
            Value::BigInt(Some(id)) => *id,
            other => panic!("unexpected key {other:?}"),
        })
        .collect();
    let expected: Vec<i64> = (1..=1001).collect();
    assert_eq!(keys, expected);
}

#[test]
fn test_round_trips_equal_ceil_of_n_over_b() {
    for (n, b, expected) in [(10usize, 3usize, vec![3, 3, 3, 1]), (4, 4, vec![4]), (5, 10, vec![5])] {
        let (engine, provider) = engine();
        let users = fake_users(n);
        engine
            .insert_batch(&users, Some(b), None)
            .expect("batch succeeds");
        assert_eq!(provider.journal().batch_set_sizes(), expected);
    }

    // Same property over randomized sizes.
    let mut rng = rand::thread_rng();
    for _ in 0..10 {
        let n = rng.gen_range(1..400);
        let b = rng.gen_range(1..50);
        let (engine, provider) = engine();
        let report = engine
            .insert_batch(&fake_users(n), Some(b), None)
            .expect("batch succeeds");
        let sizes = provider.journal().batch_set_sizes();
        assert_eq!(sizes.len(), n.div_ceil(b));
        assert_eq!(sizes.iter().sum::<usize>(), n);
        assert_eq!(report.generated_keys.len(), n);
    }
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let (engine, provider) = engine();
    let report = engine
        .insert_batch::<User>(&[], Some(500), None)
        .expect("batch succeeds");
    assert_eq!(report.chunks_attempted, 0);
    assert!(provider.journal().sql_log().is_empty());
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let (engine, _provider) = engine();
    let err = engine
        .insert_batch(&fake_users(3), Some(0), None)
        .unwrap_err();
    assert!(matches!(err, GantryError::Configuration(_)));
}

// ============================================================================
// Failure policies
// ============================================================================

#[test]
fn test_abort_policy_stops_at_the_first_failing_chunk() {
    let (engine, provider) = engine();
    // First chunk succeeds from the script, the second hits the failure.
    provider.append_batch_results(vec![gantry::BatchResult {
        rows_affected: vec![1; 500],
        generated_keys: (1..=500).map(|i| Value::BigInt(Some(i))).collect(),
    }]);
    provider.fail_statements_containing("INSERT INTO user1");

    let err = engine
        .insert_batch(&fake_users(1001), Some(500), None)
        .unwrap_err();
    match err {
        GantryError::Execution { message, .. } => {
            assert!(message.contains("1 chunks completed"), "got: {message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    // The third chunk never ran.
    assert_eq!(provider.journal().batch_set_sizes(), vec![500, 500]);
}

#[test]
fn test_continue_policy_collects_failures_and_keeps_going() {
    let (engine, provider) = engine();
    provider.append_batch_results(vec![gantry::BatchResult {
        rows_affected: vec![1; 500],
        generated_keys: (1..=500).map(|i| Value::BigInt(Some(i))).collect(),
    }]);
    provider.fail_statements_containing("INSERT INTO user1");

    let report = engine
        .insert_batch_with(
            &fake_users(1001),
            Some(500),
            ChunkPolicy::ContinueOnError,
            None,
        )
        .expect("batch returns a report");

    assert_eq!(report.chunks_attempted, 3);
    assert_eq!(report.chunks_succeeded, 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].0, 1);
    assert_eq!(report.rows_affected.len(), 500);
    assert_eq!(provider.journal().batch_set_sizes(), vec![500, 500, 1]);
}

// ============================================================================
// Other batch shapes
// ============================================================================

#[test]
fn test_update_batch_binds_set_values_then_key() {
    let (engine, provider) = engine();
    let users = vec![
        user(1, "Ada", "Lovelace", "ada@example.com"),
        user(2, "Grace", "Hopper", "grace@example.com"),
    ];
    let report = engine
        .update_batch(&users, Some(10), None)
        .expect("batch succeeds");
    assert_eq!(report.rows_affected.len(), 2);

    let calls = provider.journal().calls();
    assert_eq!(
        calls[0].sql,
        "UPDATE user1 SET FIRST_NAME = ?, LAST_NAME = ?, EMAIL = ? WHERE ID = ?"
    );
    assert_eq!(provider.journal().batch_set_sizes(), vec![2]);
}

#[test]
fn test_delete_batch_binds_keys_only() {
    let (engine, provider) = engine();
    let users = vec![
        user(1, "Ada", "Lovelace", "ada@example.com"),
        user(2, "Grace", "Hopper", "grace@example.com"),
        user(3, "Edsger", "Dijkstra", "ewd@example.com"),
    ];
    engine
        .delete_batch(&users, Some(2), None)
        .expect("batch succeeds");

    let calls = provider.journal().calls();
    assert_eq!(calls[0].sql, "DELETE FROM user1 WHERE ID = ?");
    assert_eq!(provider.journal().batch_set_sizes(), vec![2, 1]);
}
