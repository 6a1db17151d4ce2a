//! Common module
//!
//! Shared error type, logging setup and network helpers.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{TunnelError, Result};
pub use log::init_logger;
pub use net::{parse_socket_addr, host_of};
