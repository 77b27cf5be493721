//! End-to-end CRUD, lookup, template and streaming behavior against the
//! mock backend.

use crate::common::{count_row, engine, engine_with_config, user, user_row, User};
use gantry::value::Value;
use gantry::{Col, Criteria, EngineConfig, GantryError, SortDir};
use std::collections::HashMap;

// ============================================================================
// Inserts
// ============================================================================

#[test]
fn test_insert_binds_values_in_declaration_order() {
    let (engine, provider) = engine();
    let ada = user(0, "Ada", "Lovelace", "ada@example.com");
    let key = engine.insert(&ada, None).expect("insert succeeds");

    assert_eq!(key, Some(Value::BigInt(Some(1))));
    let calls = provider.journal().calls();
    let insert = &calls[0];
    assert_eq!(
        insert.sql,
        "INSERT INTO user1 (FIRST_NAME, LAST_NAME, EMAIL) VALUES (?, ?, ?)"
    );
    assert_eq!(
        insert.params,
        vec![
            Value::from("Ada"),
            Value::from("Lovelace"),
            Value::from("ada@example.com"),
        ]
    );
}

#[test]
fn test_insert_round_trips_through_a_result_row() {
    let (engine, provider) = engine();
    let ada = user(0, "Ada", "Lovelace", "ada@example.com");
    let key = engine.insert(&ada, None).expect("insert succeeds");
    let id = match key {
        Some(Value::BigInt(Some(id))) => id as i32,
        other => panic!("unexpected generated key: {other:?}"),
    };

    // The row the database would hand back for that insert.
    provider.append_query_results(vec![vec![user_row(
        id,
        "Ada",
        "Lovelace",
        "ada@example.com",
    )]]);
    let loaded: User = engine
        .find_by_id(id, None)
        .expect("lookup succeeds")
        .expect("row maps");

    // Field-for-field equal modulo the generated id.
    assert_eq!(loaded.first_name, ada.first_name);
    assert_eq!(loaded.last_name, ada.last_name);
    assert_eq!(loaded.email, ada.email);
    assert_eq!(loaded.id, id);
}

// ============================================================================
// Updates and deletes
// ============================================================================

#[test]
fn test_update_by_id_scopes_on_the_key() {
    let (engine, provider) = engine();
    let ada = user(7, "Ada", "Lovelace", "ada@example.com");
    let affected = engine.update(&ada, None).expect("update succeeds");

    assert_eq!(affected, 1);
    let calls = provider.journal().calls();
    assert_eq!(
        calls[0].sql,
        "UPDATE user1 SET FIRST_NAME = ?, LAST_NAME = ?, EMAIL = ? WHERE ID = ?"
    );
    assert_eq!(calls[0].params.last(), Some(&Value::from(7)));
}

#[test]
fn test_update_where_refuses_an_unscoped_statement() {
    let (engine, provider) = engine();
    let ada = user(7, "Ada", "Lovelace", "ada@example.com");
    let err = engine
        .update_where(&ada, &["email"], &Criteria::new(), None)
        .unwrap_err();
    assert!(matches!(err, GantryError::UnsafeStatement { .. }));
    // Refused at build time; nothing reached the database.
    assert!(provider.journal().sql_log().is_empty());
}

#[test]
fn test_delete_where_with_explicit_always_true_runs() {
    let (engine, provider) = engine();
    engine
        .delete_where::<User>(&Criteria::always(), None)
        .expect("delete succeeds");
    assert_eq!(
        provider.journal().sql_log(),
        vec!["DELETE FROM user1 WHERE 1 = 1"]
    );
}

#[test]
fn test_delete_by_id_checks_key_arity() {
    let (engine, _provider) = engine();
    let affected = engine
        .delete_by_id::<User>(7.into(), None)
        .expect("delete succeeds");
    assert_eq!(affected, 1);

    let err = engine
        .delete_by_id::<User>(
            gantry::ValueTuple::Two(Value::from(1), Value::from(2)),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, GantryError::Configuration(_)));
}

// ============================================================================
// Lookups
// ============================================================================

#[test]
fn test_find_by_id_emits_the_documented_select() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![user_row(100, "Grace", "Hopper", "g@example.com")]]);

    let found: Option<User> = engine.find_by_id(100, None).expect("lookup succeeds");
    let grace = found.expect("row maps");
    assert_eq!(grace.id, 100);
    assert_eq!(grace.first_name, "Grace");

    let calls = provider.journal().calls();
    assert_eq!(
        calls[0].sql,
        "SELECT ID, FIRST_NAME, LAST_NAME, EMAIL FROM user1 WHERE ID = ?"
    );
    assert_eq!(calls[0].params, vec![Value::from(100)]);
}

#[test]
fn test_find_by_id_misses_cleanly() {
    let (engine, _provider) = engine();
    let found: Option<User> = engine.find_by_id(404, None).expect("lookup succeeds");
    assert!(found.is_none());
}

#[test]
fn test_list_applies_criteria_and_maps_all_rows() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![
        user_row(1, "Ada", "Lovelace", "ada@example.com"),
        user_row(2, "Grace", "Hopper", "grace@example.com"),
    ]]);

    let users: Vec<User> = engine
        .list(
            &Criteria::new()
                .filter(Col::new("email").like("%@example.com"))
                .order_by("id", SortDir::Asc),
            None,
        )
        .expect("list succeeds");

    assert_eq!(users.len(), 2);
    assert_eq!(users[0].first_name, "Ada");
    assert_eq!(users[1].first_name, "Grace");
    assert!(provider.journal().calls()[0]
        .sql
        .ends_with("WHERE EMAIL LIKE ? ORDER BY ID ASC"));
}

#[test]
fn test_page_combines_count_and_window() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![
        vec![count_row(23)],
        vec![user_row(21, "Row", "TwentyOne", "u21@example.com")],
    ]);

    let page = engine
        .page::<User>(&Criteria::new().order_by("id", SortDir::Asc), 2, 10, None)
        .expect("page succeeds");

    assert_eq!(page.total_items, 23);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items.len(), 1);
    let log = provider.journal().sql_log();
    assert!(log[0].starts_with("SELECT COUNT(*) FROM user1"));
    assert!(log[1].ends_with("ORDER BY ID ASC LIMIT 10 OFFSET 20"));
}

// ============================================================================
// Templates
// ============================================================================

#[test]
fn test_template_query_resolves_placeholders_and_binds() {
    let (engine, provider) = {
        let provider = std::sync::Arc::new(gantry::mock::MockProvider::new());
        let mut registry = gantry::DaoRegistry::new(
            gantry::NamingPolicy::UpperSnake,
            gantry::ParameterStyle::Positional,
        );
        registry.register_entity::<User>().expect("registers");
        registry
            .register_template(
                "user.findByDomain",
                "SELECT {cols} FROM user1 WHERE EMAIL LIKE :domain ORDER BY ID",
            )
            .expect("template registers");
        let engine =
            gantry::DaoEngine::new(provider.clone(), registry, EngineConfig::default())
                .expect("engine builds");
        (engine, provider)
    };

    provider.append_query_results(vec![vec![user_row(1, "Ada", "Lovelace", "ada@example.com")]]);

    let mut placeholders = HashMap::new();
    placeholders.insert(
        "cols".to_string(),
        "ID, FIRST_NAME, LAST_NAME, EMAIL".to_string(),
    );
    let mut binds = HashMap::new();
    binds.insert("domain".to_string(), Value::from("%@example.com"));

    let users: Vec<User> = engine
        .query_template("user.findByDomain", &placeholders, &binds, None)
        .expect("template query succeeds");
    assert_eq!(users.len(), 1);

    let calls = provider.journal().calls();
    assert_eq!(
        calls[0].sql,
        "SELECT ID, FIRST_NAME, LAST_NAME, EMAIL FROM user1 WHERE EMAIL LIKE ? ORDER BY ID"
    );
    assert_eq!(calls[0].params, vec![Value::from("%@example.com")]);
}

#[test]
fn test_named_tokens_resolve_from_an_entity() {
    use gantry::executor::{resolve, RecordParams};
    use gantry::SqlStatement;

    let stmt = SqlStatement::named_unbound(
        "UPDATE user1 SET EMAIL = :email WHERE ID = :id",
        vec!["email".to_string(), "id".to_string()],
    );
    let ada = user(7, "Ada", "Lovelace", "ada@example.com");
    let (sql, values) = resolve(&stmt, &RecordParams(&ada)).expect("resolves");
    assert_eq!(sql, "UPDATE user1 SET EMAIL = ? WHERE ID = ?");
    assert_eq!(values, vec![Value::from("ada@example.com"), Value::from(7)]);
}

#[test]
fn test_template_with_unresolved_bind_fails_before_execution() {
    let (engine, provider) = {
        let provider = std::sync::Arc::new(gantry::mock::MockProvider::new());
        let mut registry = gantry::DaoRegistry::new(
            gantry::NamingPolicy::UpperSnake,
            gantry::ParameterStyle::Positional,
        );
        registry.register_entity::<User>().expect("registers");
        registry
            .register_template("user.purge", "DELETE FROM user1 WHERE ID = :id")
            .expect("template registers");
        let engine =
            gantry::DaoEngine::new(provider.clone(), registry, EngineConfig::default())
                .expect("engine builds");
        (engine, provider)
    };

    let err = engine
        .execute_template("user.purge", &HashMap::new(), &HashMap::new(), None)
        .unwrap_err();
    assert!(matches!(err, GantryError::MissingParameter { name, .. } if name == "id"));
    assert!(provider.journal().sql_log().is_empty());
}

// ============================================================================
// Streaming
// ============================================================================

#[test]
fn test_stream_is_lazy_and_releases_exactly_once() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![
        user_row(1, "A", "A", "a@example.com"),
        user_row(2, "B", "B", "b@example.com"),
        user_row(3, "C", "C", "c@example.com"),
    ]]);

    let mut stream = engine
        .stream::<User>(&Criteria::new().order_by("id", SortDir::Asc))
        .expect("stream opens");
    assert_eq!(provider.journal().acquired(), 1);
    assert_eq!(provider.journal().released(), 0);

    let ids: Vec<i32> = stream
        .by_ref()
        .map(|r| r.expect("row maps").id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(stream.is_closed());
    assert_eq!(provider.journal().released(), 1);

    // Exhausting again neither yields nor releases twice.
    assert!(stream.next().is_none());
    assert_eq!(provider.journal().released(), 1);
}

#[test]
fn test_dropping_a_stream_early_still_releases_its_connection() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![
        user_row(1, "A", "A", "a@example.com"),
        user_row(2, "B", "B", "b@example.com"),
    ]]);

    {
        let mut stream = engine
            .stream::<User>(&Criteria::new().order_by("id", SortDir::Asc))
            .expect("stream opens");
        let first = stream.next().expect("one row").expect("row maps");
        assert_eq!(first.id, 1);
        // Dropped here with rows left on the cursor.
    }
    assert_eq!(provider.journal().acquired(), 1);
    assert_eq!(provider.journal().released(), 1);
}

// ============================================================================
// Timeouts and failures
// ============================================================================

#[test]
fn test_slow_statements_surface_timeout_errors() {
    let config = EngineConfig {
        statement_timeout_ms: Some(50),
        ..EngineConfig::default()
    };
    let (engine, provider) = engine_with_config(config);
    provider.slow_statements_containing("user1");

    let err = engine.list::<User>(&Criteria::new(), None).unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn test_driver_failures_carry_statement_and_parameters() {
    let (engine, provider) = engine();
    provider.fail_statements_containing("INSERT INTO user1");

    let err = engine
        .insert(&user(0, "Ada", "Lovelace", "ada@example.com"), None)
        .unwrap_err();
    match err {
        GantryError::Execution { sql, params, .. } => {
            assert!(sql.contains("INSERT INTO user1"));
            assert_eq!(params.len(), 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    // The failed call still released its connection.
    assert_eq!(provider.journal().acquired(), provider.journal().released());
}
