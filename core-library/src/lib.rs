//! # Work Catalog
//!
//! Owns the SQLite catalog of works and provides repository patterns for data
//! access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and schema migrations
//! - Domain models for works, circles, tags and voice actors
//! - The work id codec ([`models::WorkId`])
//! - Repositories for works and users

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use repositories::{
    NewWork, SqliteUserRepository, SqliteWorkRepository, UserRepository, WorkRepository,
    WorkTransaction,
};
