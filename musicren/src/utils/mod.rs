//! Utility modules for musicren

pub mod retry;

pub use retry::{with_backoff, Transient};
