//! HTTP handlers

pub mod health;
pub mod redis;
pub mod tables;
pub mod users;

#[cfg(test)]
mod testing;

pub use health::health;
