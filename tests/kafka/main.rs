//! Kafka E2E tests
//!
//! These tests need a broker reachable at `kafka:9092` and are ignored by
//! default. Run them with `cargo test --test kafka -- --ignored`.

mod consume_publish;
