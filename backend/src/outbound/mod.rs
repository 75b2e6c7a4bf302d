//! Outbound adapters implementing the domain ports against real backends.

pub mod cache;
pub mod persistence;
