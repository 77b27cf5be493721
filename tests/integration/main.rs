//! Integration suites over the in-memory mock backend.


mod batching;
mod caching;
mod engine_crud;
mod join_loading;
mod transactions;
