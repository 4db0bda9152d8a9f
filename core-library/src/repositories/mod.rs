//! Repository traits and their SQLite implementations

pub mod user;
pub mod work;

pub use user::{hash_password, SqliteUserRepository, UserRepository};
pub use work::{NewWork, SqliteWorkRepository, SqliteWorkTransaction, WorkRepository, WorkTransaction};
