//! Join-entity loading: one secondary query for many roots, cardinality
//! handling and idempotent refills.

use crate::common::{engine, post_row, user, Post};
use gantry::{Cardinality, GantryError, JoinSpec, SortDir};

fn posts_join() -> JoinSpec {
    JoinSpec::new("posts", Cardinality::ManyList)
        .key("id", "userId")
        .order_by("id", SortDir::Asc)
}

fn latest_post_join() -> JoinSpec {
    JoinSpec::new("latestPost", Cardinality::One)
        .key("id", "userId")
        .order_by("id", SortDir::Desc)
}

// ============================================================================
// N+1 avoidance
// ============================================================================

#[test]
fn test_three_roots_issue_exactly_one_secondary_query() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![
        post_row(10, 1, "Ada's first"),
        post_row(11, 1, "Ada's second"),
        post_row(12, 2, "Grace's first"),
    ]]);

    let mut users = vec![
        user(1, "Ada", "Lovelace", "ada@example.com"),
        user(2, "Grace", "Hopper", "grace@example.com"),
        user(3, "Edsger", "Dijkstra", "ewd@example.com"),
    ];
    engine
        .load_related(&mut users, &posts_join(), false, None)
        .expect("load succeeds");

    assert_eq!(provider.journal().query_count(), 1);
    let query = &provider.journal().calls()[0];
    assert_eq!(
        query.sql,
        "SELECT ID, USER_ID, TITLE FROM posts WHERE USER_ID IN (?, ?, ?) ORDER BY ID ASC"
    );

    assert_eq!(users[0].posts.len(), 2);
    assert_eq!(users[0].posts[0].title, "Ada's first");
    assert_eq!(users[0].posts[1].title, "Ada's second");
    assert_eq!(users[1].posts.len(), 1);
    assert!(users[2].posts.is_empty());
}

#[test]
fn test_duplicate_root_keys_collapse_in_the_in_list() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![post_row(10, 1, "shared")]]);

    let mut users = vec![
        user(1, "Ada", "Lovelace", "ada@example.com"),
        user(1, "Ada", "Clone", "clone@example.com"),
    ];
    engine
        .load_related(&mut users, &posts_join(), false, None)
        .expect("load succeeds");

    let query = &provider.journal().calls()[0];
    assert!(query.sql.contains("USER_ID IN (?)"));
    // Both roots with the same key get the match.
    assert_eq!(users[0].posts.len(), 1);
    assert_eq!(users[1].posts.len(), 1);
}

// ============================================================================
// Cardinality
// ============================================================================

#[test]
fn test_to_one_join_attaches_the_first_row_under_the_declared_ordering() {
    let (engine, provider) = engine();
    // Ordered by id descending: 42 is the latest.
    provider.append_query_results(vec![vec![
        post_row(42, 1, "newest"),
        post_row(41, 1, "older"),
    ]]);

    let mut ada = user(1, "Ada", "Lovelace", "ada@example.com");
    engine
        .load_related_one(&mut ada, &latest_post_join(), false, None)
        .expect("load succeeds");

    let latest = ada.latest_post.expect("relation attached");
    assert_eq!(latest.id, 42);
    assert!(provider.journal().calls()[0].sql.ends_with("ORDER BY ID DESC"));
}

#[test]
fn test_to_one_join_without_ordering_fails_before_any_query() {
    let (engine, provider) = engine();
    let spec = JoinSpec::new("latestPost", Cardinality::One).key("id", "userId");

    let mut ada = user(1, "Ada", "Lovelace", "ada@example.com");
    let err = engine
        .load_related_one(&mut ada, &spec, false, None)
        .unwrap_err();

    assert!(matches!(err, GantryError::JoinConfiguration(_)));
    assert_eq!(provider.journal().query_count(), 0);
}

#[test]
fn test_key_arity_mismatch_fails_before_any_query() {
    let (engine, provider) = engine();
    let spec = JoinSpec::new("posts", Cardinality::ManyList)
        .key("id", "userId")
        .key("email", "title");
    // The pairs themselves are fine; remove one side to break arity.
    let broken = JoinSpec::new("posts", Cardinality::ManyList);

    let mut users = vec![user(1, "Ada", "Lovelace", "ada@example.com")];
    assert!(engine
        .load_related(&mut users, &broken, false, None)
        .is_err());
    assert!(engine.load_related(&mut users, &spec, false, None).is_ok());
    // Only the valid spec reached the database.
    assert_eq!(provider.journal().query_count(), 1);
}

#[test]
fn test_many_set_deduplicates_identical_rows() {
    let (engine, provider) = engine();
    let spec = JoinSpec::new("posts", Cardinality::ManySet)
        .key("id", "userId")
        .order_by("id", SortDir::Asc);

    provider.append_query_results(vec![vec![
        post_row(10, 1, "dup"),
        post_row(10, 1, "dup"),
        post_row(11, 1, "unique"),
    ]]);

    let mut ada = user(1, "Ada", "Lovelace", "ada@example.com");
    engine
        .load_related_one(&mut ada, &spec, false, None)
        .expect("load succeeds");
    assert_eq!(ada.posts.len(), 2);
}

// ============================================================================
// only_if_null refills
// ============================================================================

#[test]
fn test_only_if_null_loading_is_idempotent() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![
        post_row(10, 1, "Ada's first"),
        post_row(12, 2, "Grace's first"),
    ]]);

    let mut users = vec![
        user(1, "Ada", "Lovelace", "ada@example.com"),
        user(2, "Grace", "Hopper", "grace@example.com"),
    ];
    engine
        .load_related(&mut users, &posts_join(), true, None)
        .expect("first load succeeds");
    let after_first = users.clone();

    // Second load: every root already has its relation, so no query runs.
    engine
        .load_related(&mut users, &posts_join(), true, None)
        .expect("second load succeeds");

    assert_eq!(users, after_first);
    assert_eq!(provider.journal().query_count(), 1);
}

#[test]
fn test_only_if_null_fills_just_the_missing_roots() {
    let (engine, provider) = engine();
    provider.append_query_results(vec![vec![post_row(12, 2, "Grace's first")]]);

    let mut hydrated = user(1, "Ada", "Lovelace", "ada@example.com");
    hydrated.posts = vec![Post {
        id: 99,
        user_id: 1,
        title: "already here".to_string(),
    }];
    let mut users = vec![hydrated, user(2, "Grace", "Hopper", "grace@example.com")];

    engine
        .load_related(&mut users, &posts_join(), true, None)
        .expect("load succeeds");

    // The hydrated root was skipped entirely: its key is not in the query.
    let query = &provider.journal().calls()[0];
    assert!(query.sql.contains("USER_ID IN (?)"));
    assert_eq!(users[0].posts[0].id, 99);
    assert_eq!(users[1].posts.len(), 1);
}

// ============================================================================
// Registered joins
// ============================================================================

#[test]
fn test_registered_joins_load_by_name() {
    let provider = std::sync::Arc::new(gantry::mock::MockProvider::new());
    let mut registry = gantry::DaoRegistry::new(
        gantry::NamingPolicy::UpperSnake,
        gantry::ParameterStyle::Positional,
    );
    registry
        .register_entity::<crate::common::User>()
        .expect("user registers");
    registry.register_entity::<Post>().expect("post registers");
    registry
        .register_join("user.posts", posts_join())
        .expect("join registers");
    assert!(registry.register_join("user.posts", posts_join()).is_err());
    let engine = gantry::DaoEngine::new(provider.clone(), registry, gantry::EngineConfig::default())
        .expect("engine builds");

    provider.append_query_results(vec![vec![post_row(10, 1, "by name")]]);
    let mut users = vec![user(1, "Ada", "Lovelace", "ada@example.com")];
    engine
        .load_related_named("user.posts", &mut users, false, None)
        .expect("named load succeeds");
    assert_eq!(users[0].posts.len(), 1);

    let err = engine
        .load_related_named::<crate::common::User, Post>("user.missing", &mut users, false, None)
        .unwrap_err();
    assert!(matches!(err, GantryError::Configuration(_)));
}

// ============================================================================
// Composite keys
// ============================================================================

#[test]
fn test_composite_keys_render_an_or_of_and_groups() {
    let (engine, provider) = engine();
    let spec = JoinSpec::new("posts", Cardinality::ManyList)
        .key("id", "userId")
        .key("firstName", "title")
        .order_by("id", SortDir::Asc);

    let mut users = vec![
        user(1, "Ada", "Lovelace", "ada@example.com"),
        user(2, "Grace", "Hopper", "grace@example.com"),
    ];
    engine
        .load_related(&mut users, &spec, false, None)
        .expect("load succeeds");

    let query = &provider.journal().calls()[0];
    assert!(query
        .sql
        .contains("WHERE ((USER_ID = ? AND TITLE = ?) OR (USER_ID = ? AND TITLE = ?))"));
    assert_eq!(query.params.len(), 4);
}
