//! User repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::NewUser;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{query, SqlitePool};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create an account with a hashed password.
    ///
    /// # Errors
    /// Returns [`LibraryError::AlreadyExists`] if the name is taken.
    async fn create_user(&self, user: &NewUser) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;
}

/// SHA-256 hex digest of a password.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, user: &NewUser) -> Result<()> {
        if user.name.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "name".to_string(),
                message: "user name must not be empty".to_string(),
            });
        }

        let result = query(r#"INSERT INTO t_user (name, password, "group") VALUES (?, ?, ?)"#)
            .bind(&user.name)
            .bind(hash_password(&user.password))
            .bind(user.group.as_str())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(LibraryError::AlreadyExists {
                    entity_type: "User".to_string(),
                    id: user.name.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let row = query("SELECT 1 FROM t_user WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash_password("admin"),
            "8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918"
        );
    }

    #[tokio::test]
    async fn test_create_admin_twice() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteUserRepository::new(pool.clone());

        repo.create_user(&NewUser::default_admin()).await.unwrap();
        assert!(repo.exists("admin").await.unwrap());

        let err = repo.create_user(&NewUser::default_admin()).await.unwrap_err();
        assert!(err.is_already_exists());

        let (stored,): (String,) = sqlx::query_as("SELECT password FROM t_user WHERE name = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, hash_password("admin"));
    }
}
