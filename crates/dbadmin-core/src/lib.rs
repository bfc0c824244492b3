//! dbadmin - Core Library
//!
//! Configuration with hot reload, the storage port traits implemented by the
//! server, the SQL text synthesis used by the data-access gateway and the
//! table import routine shared by its implementations.

pub mod config;
pub mod error;
pub mod import;
pub mod ports;
pub mod sql;
pub mod watcher;

pub use config::*;
pub use error::*;
pub use import::{import_backup, ImportTarget};
pub use ports::*;
