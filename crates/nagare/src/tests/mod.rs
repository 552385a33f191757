//! Behavioral tests for the listener.
//!
//! - `harness.rs`      - MockStore, recording handlers and sinks, TestHarness
//! - `startup.rs`      - channel selection and startup exits
//! - `resume.rs`       - cursors seeded from checkpoints
//! - `ordering.rs`     - checkpoint-after-dispatch, strict sequencing
//! - `isolation.rs`    - failing and panicking handlers
//! - `naming.rs`       - store key prefix and unknown channels
//! - `crash_safety.rs` - store failures and mid-batch crashes
//! - `shutdown.rs`     - graceful shutdown and block timeouts
//! - `content.rs`      - producer to listener payload flow

pub(crate) mod harness;
