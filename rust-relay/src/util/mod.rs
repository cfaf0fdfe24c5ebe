//! Small process-level helpers shared by the binaries.

pub mod signal;

pub use signal::shutdown_signal;
