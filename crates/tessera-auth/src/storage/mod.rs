//! Storage traits for account data.
//!
//! This module defines the interface the authentication schemes use to read
//! and write accounts, auth bindings and contact credentials.
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `tessera-auth-memory` - In-process storage
//! - `tessera-auth-postgres` - PostgreSQL storage backend

pub mod account;

pub use account::{AccountStore, StoreError, StoreResult};
