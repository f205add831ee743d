//! Concurrency Integration Tests
//!
//! Tests for the client-side OCC protocol against in-process stores.

#[path = "../common/mod.rs"]
mod common;

mod end_to_end;
mod futures;
mod lifecycle;
mod read_write_set;
