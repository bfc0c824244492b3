//! Storage layer
//!
//! MySQL through sqlx for users and schema administration, Redis (single node
//! or cluster) for the key browser. In-memory stand-ins back the handler tests.

pub mod cache;
pub mod db;
#[cfg(test)]
pub mod memory;
pub mod values;

pub use db::MySqlGateway;
