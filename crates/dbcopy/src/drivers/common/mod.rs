//! Utilities shared by the database drivers.
//!
//! - [`tls`]: TLS configuration for PostgreSQL connections
//! - [`defaults`]: parsing of introspected column defaults

pub mod defaults;
pub mod tls;

pub use defaults::parse_default;
pub use tls::{SslMode, TlsBuilder};
