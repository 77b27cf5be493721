//! Propagation semantics and terminal-action guarantees.

use crate::common::{engine, user};
use gantry::{GantryError, IsolationLevel, Propagation};

// ============================================================================
// Scoped execution
// ============================================================================

#[test]
fn test_all_work_in_a_scope_shares_one_connection() {
    let (engine, provider) = engine();
    engine
        .transaction(|mut tx| {
            engine.insert(&user(0, "Ada", "Lovelace", "ada@example.com"), tx.as_deref_mut())?;
            engine.insert(&user(0, "Grace", "Hopper", "grace@example.com"), tx)
        })
        .expect("transaction succeeds");

    // One connection for the whole scope, no per-call acquires.
    assert_eq!(provider.journal().acquired(), 1);
    assert_eq!(provider.journal().released(), 1);
    assert_eq!(
        provider.journal().transaction_events(),
        vec!["BEGIN", "COMMIT"]
    );
}

#[test]
fn test_a_failing_scope_rolls_back() {
    let (engine, provider) = engine();
    let result: Result<(), GantryError> = engine.transaction(|tx| {
        engine.insert(&user(0, "Ada", "Lovelace", "ada@example.com"), tx)?;
        Err(GantryError::Configuration("business rule violated".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(
        provider.journal().transaction_events(),
        vec!["BEGIN", "ROLLBACK"]
    );
}

#[test]
fn test_an_explicit_rollback_inside_the_scope_is_honored() {
    let (engine, provider) = engine();
    engine
        .transaction(|mut tx| {
            engine.insert(&user(0, "Ada", "Lovelace", "ada@example.com"), tx.as_deref_mut())?;
            tx.expect("scope owns a context").rollback()
        })
        .expect("scope returns Ok after rollback");

    assert_eq!(
        provider.journal().transaction_events(),
        vec!["BEGIN", "ROLLBACK"]
    );
}

// ============================================================================
// Propagation
// ============================================================================

#[test]
fn test_required_joins_the_active_context() {
    let (engine, provider) = engine();
    engine
        .transaction(|mut tx| {
            engine.insert(&user(0, "A", "A", "a@example.com"), tx.as_deref_mut())?;
            engine.transaction_with(
                Propagation::Required,
                IsolationLevel::default(),
                tx.as_deref_mut(),
                |mut inner| {
                    engine.insert(&user(0, "B", "B", "b@example.com"), inner.as_deref_mut())
                },
            )
        })
        .expect("nested scopes succeed");

    // The joined scope opened no second transaction.
    assert_eq!(
        provider.journal().transaction_events(),
        vec!["BEGIN", "COMMIT"]
    );
    assert_eq!(provider.journal().acquired(), 1);
}

#[test]
fn test_a_joined_scope_cannot_commit_the_outer_context() {
    let (engine, _provider) = engine();
    engine
        .transaction(|mut tx| {
            let result = engine.transaction_with(
                Propagation::Required,
                IsolationLevel::default(),
                tx.as_deref_mut(),
                |inner| inner.expect("joined context").commit(),
            );
            assert!(matches!(result, Err(GantryError::TransactionState(_))));
            Ok(())
        })
        .expect("outer scope still commits");
}

#[test]
fn test_requires_new_commits_independently_of_the_outer_rollback() {
    let (engine, provider) = engine();
    let result: Result<(), GantryError> = engine.transaction(|mut tx| {
        engine.insert(&user(0, "Outer", "Write", "outer@example.com"), tx.as_deref_mut())?;

        // Inner context on its own connection; commits on success.
        engine.transaction_with(
            Propagation::RequiresNew,
            IsolationLevel::default(),
            tx.as_deref_mut(),
            |mut inner| {
                engine.insert(&user(0, "Inner", "Write", "inner@example.com"), inner.as_deref_mut())
            },
        )?;

        // Outer scope now fails; only the outer writes roll back.
        Err(GantryError::Configuration("outer failure".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(
        provider.journal().transaction_events(),
        vec!["BEGIN", "BEGIN", "COMMIT", "ROLLBACK"]
    );
    assert_eq!(provider.journal().acquired(), 2);
}

#[test]
fn test_supports_runs_autocommit_without_an_active_context() {
    let (engine, provider) = engine();
    engine
        .transaction_with(
            Propagation::Supports,
            IsolationLevel::default(),
            None,
            |tx| {
                assert!(tx.is_none());
                engine.insert(&user(0, "Solo", "Call", "solo@example.com"), tx)
            },
        )
        .expect("autocommit call succeeds");

    assert!(provider.journal().transaction_events().is_empty());
    assert_eq!(provider.journal().acquired(), 1);
}

#[test]
fn test_not_supported_steps_outside_the_active_context() {
    let (engine, provider) = engine();
    engine
        .transaction(|mut tx| {
            engine.insert(&user(0, "In", "Tx", "in@example.com"), tx.as_deref_mut())?;
            engine.transaction_with(
                Propagation::NotSupported,
                IsolationLevel::default(),
                tx.as_deref_mut(),
                |outside| {
                    assert!(outside.is_none());
                    engine.insert(&user(0, "Out", "SideTx", "out@example.com"), outside)
                },
            )
        })
        .expect("both calls succeed");

    // The autocommit call acquired its own connection next to the context's.
    assert_eq!(provider.journal().acquired(), 2);
    assert_eq!(
        provider.journal().transaction_events(),
        vec!["BEGIN", "COMMIT"]
    );
}

#[test]
fn test_isolation_is_fixed_at_context_creation() {
    let (engine, provider) = engine();
    engine
        .transaction_with(
            Propagation::Required,
            IsolationLevel::Serializable,
            None,
            |tx| engine.insert(&user(0, "Ser", "Ial", "ser@example.com"), tx),
        )
        .expect("transaction succeeds");

    let begin = &provider.journal().calls()[0];
    assert_eq!(begin.sql, "BEGIN SERIALIZABLE");
}
