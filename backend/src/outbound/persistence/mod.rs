//! PostgreSQL persistence adapters for the durable store ports.

mod diesel_stroke_repository;
mod models;
mod pool;
mod schema;

pub use diesel_stroke_repository::DieselStrokeRepository;
pub use pool::{DbPool, PoolError};
