//! Read-through cache behavior in front of `find_by_id`.

use crate::common::{engine_with_config, user, user_row, User};
use gantry::config::CacheConfig;
use gantry::EngineConfig;
use std::time::Duration;

fn cached_config(delay_ms: u64) -> EngineConfig {
    EngineConfig {
        cache: CacheConfig {
            enabled: true,
            invalidation_delay_ms: delay_ms,
            ..CacheConfig::default()
        },
        ..EngineConfig::default()
    }
}

#[test]
fn test_repeated_lookups_hit_the_cache() {
    let (engine, provider) = engine_with_config(cached_config(0));
    provider.append_query_results(vec![vec![user_row(1, "Ada", "Lovelace", "ada@example.com")]]);

    let first: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    let second: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");

    assert_eq!(first, second);
    assert!(first.is_some());
    // Only the first lookup reached the database.
    assert_eq!(provider.journal().query_count(), 1);
}

#[test]
fn test_a_mutating_operation_invalidates_the_entity_shard() {
    let (engine, provider) = engine_with_config(cached_config(0));
    provider.append_query_results(vec![
        vec![user_row(1, "Ada", "Lovelace", "ada@example.com")],
        vec![user_row(1, "Ada", "King", "ada@example.com")],
    ]);

    let _: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    engine
        .update(&user(1, "Ada", "King", "ada@example.com"), None)
        .expect("update succeeds");

    let after: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    assert_eq!(after.expect("row maps").last_name, "King");
    assert_eq!(provider.journal().query_count(), 2);
}

#[test]
fn test_delayed_invalidation_serves_stale_reads_inside_the_window() {
    let (engine, provider) = engine_with_config(cached_config(40));
    provider.append_query_results(vec![
        vec![user_row(1, "Ada", "Lovelace", "ada@example.com")],
        vec![user_row(1, "Ada", "King", "ada@example.com")],
    ]);

    let _: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    engine
        .update(&user(1, "Ada", "King", "ada@example.com"), None)
        .expect("update succeeds");

    // Inside the window the stale snapshot is still served.
    let stale: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    assert_eq!(stale.expect("cached row").last_name, "Lovelace");
    assert_eq!(provider.journal().query_count(), 1);

    std::thread::sleep(Duration::from_millis(120));
    let fresh: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    assert_eq!(fresh.expect("row maps").last_name, "King");
    assert_eq!(provider.journal().query_count(), 2);
}

#[test]
fn test_lookups_of_different_entities_do_not_collide() {
    let (engine, provider) = engine_with_config(cached_config(0));
    provider.append_query_results(vec![
        vec![user_row(1, "Ada", "Lovelace", "ada@example.com")],
        vec![user_row(2, "Grace", "Hopper", "grace@example.com")],
    ]);

    let ada: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    let grace: Option<User> = engine.find_by_id(2, None).expect("lookup succeeds");
    assert_ne!(ada, grace);
    assert_eq!(provider.journal().query_count(), 2);

    // Both now served from the cache.
    let _: Option<User> = engine.find_by_id(1, None).expect("lookup succeeds");
    let _: Option<User> = engine.find_by_id(2, None).expect("lookup succeeds");
    assert_eq!(provider.journal().query_count(), 2);
}
