//! Alembic Save -- persistence for Alembic player state.
//!
//! Loading follows a fixed pipeline (see [`pipeline`]): start from the
//! default state, merge the persisted object onto it field by field
//! ([`merge`]), run pending migrations ([`migration`]), repair machines
//! against their current definitions, then turn time away into fast time.
//!
//! # Key Types
//!
//! - [`session::Session`] -- Owns the engine, the player and a storage
//!   backend; load, save, autosave, export and import.
//! - [`storage::Storage`] -- Key/value persistence boundary, with
//!   [`storage::MemoryStorage`] and [`storage::FileStorage`].
//! - [`migration::MigrationList`] -- Ordered one-shot migrations.
//! - [`config::SessionConfig`] -- Session tunables, loadable from RON,
//!   TOML or JSON.

pub mod codec;
pub mod config;
pub mod merge;
pub mod migration;
pub mod pipeline;
pub mod session;
pub mod storage;
