//! Persistence layer: key-value contract and typed per-user repositories

mod kv;
mod repo;

pub use kv::{KvStore, SqliteStore};
pub use repo::UserRepo;
