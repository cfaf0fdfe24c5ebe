//! Queue module for the durable relay queue.
//!
//! This module provides:
//! - Trace token generation and the space-delimited record format
//! - A bounded, authenticated Redis connection pool
//! - The push/pop backend used by the intake service and delivery worker
//!
//! ## Architecture
//!
//! ```text
//! Intake → encode → pool → Redis list → pool → decode → Worker → sink
//! ```

pub mod backend;
pub mod envelope;
pub mod memory;
pub mod pool;
pub mod token;

pub use backend::{QueueBackend, RedisQueue};
pub use envelope::{decode, encode, Envelope, SEPARATOR};
pub use memory::MemoryQueue;
pub use pool::{ConnectionPool, PoolConfig, PoolStatus, PooledConnection, RedisConnector};
pub use token::{generate_token, DEFAULT_TOKEN_LENGTH, TOKEN_ALPHABET};
