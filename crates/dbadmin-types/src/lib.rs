//! dbadmin types - pure data model shared by the core and server crates
//!
//! Every type here is a transient view over the relational engine or the
//! cache server. Nothing in this crate performs I/O.

pub mod cache;
pub mod message;
pub mod table;
pub mod user;

pub use cache::*;
pub use message::*;
pub use table::*;
pub use user::*;
