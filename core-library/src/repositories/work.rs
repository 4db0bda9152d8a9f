//! Work repository trait and SQLite implementation
//!
//! Individual inserts and updates run in their own short transaction, so a
//! work row is always written together with its circle, tags and voice
//! actors. The long-lived [`WorkTransaction`] is reserved for cleanup, which
//! needs one exclusive scope over every removal decision.

use crate::error::{LibraryError, Result};
use crate::models::{
    DynamicMetadata, Tag, UpdateOptions, VoiceActor, WorkId, WorkLocation, WorkMetadata,
    SUBTITLE_TAG_ID,
};
use async_trait::async_trait;
use sqlx::{query, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

/// A work ready to be inserted: scraped metadata plus its location on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWork {
    pub metadata: WorkMetadata,
    pub location: WorkLocation,
}

/// Catalog access used by the sync engine.
#[async_trait]
pub trait WorkRepository: Send + Sync {
    /// Whether a work with this id is catalogued.
    async fn exists(&self, id: WorkId) -> Result<bool>;

    /// Insert a work with its circle, tags and voice actors.
    ///
    /// # Errors
    /// Returns [`LibraryError::AlreadyExists`] if the id is taken.
    async fn insert(&self, work: &NewWork) -> Result<()>;

    /// Refresh the column groups selected by `options`.
    ///
    /// # Errors
    /// Returns [`LibraryError::NotFound`] if the work is not catalogued.
    async fn update(&self, metadata: &WorkMetadata, options: UpdateOptions) -> Result<()>;

    /// Refresh only the sales and rating columns.
    async fn update_dynamic(&self, id: WorkId, dynamic: &DynamicMetadata) -> Result<()>;

    /// All catalogued ids, ascending.
    async fn list_ids(&self) -> Result<Vec<WorkId>>;

    /// Ids of works related to any of the given voice actors, ascending and
    /// without duplicates.
    async fn list_ids_by_voice_actors(&self, va_ids: &[Uuid]) -> Result<Vec<WorkId>>;

    /// Open an exclusive write scope for reconciliation.
    async fn begin_transaction(&self) -> Result<Box<dyn WorkTransaction>>;
}

/// Write scope used by cleanup. Dropping it without `commit` rolls back.
#[async_trait]
pub trait WorkTransaction: Send {
    /// Id, root folder alias and relative directory of every work.
    async fn list_locations(&mut self) -> Result<Vec<WorkLocation>>;

    /// Remove a work, its relations, and any circle, tag or voice actor left
    /// without works.
    async fn remove_work(&mut self, id: WorkId) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// SQLite implementation of WorkRepository
#[derive(Clone)]
pub struct SqliteWorkRepository {
    pool: SqlitePool,
}

impl SqliteWorkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_json_text(value: &Option<serde_json::Value>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(LibraryError::from)
}

fn row_to_work_id(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<WorkId> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw)
        .map(WorkId)
        .map_err(|_| LibraryError::InvalidInput {
            field: column.to_string(),
            message: format!("work id {} out of range", raw),
        })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn ensure_exists(conn: &mut SqliteConnection, id: WorkId) -> Result<()> {
    let found = query("SELECT 1 FROM t_work WHERE id = ?")
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(LibraryError::NotFound {
            entity_type: "Work".to_string(),
            id: id.to_string(),
        }),
    }
}

async fn write_dynamic(
    conn: &mut SqliteConnection,
    id: WorkId,
    dynamic: &DynamicMetadata,
) -> Result<()> {
    let result = query(
        r#"
        UPDATE t_work
        SET dl_count = ?, price = ?, review_count = ?, rate_count = ?,
            rate_average_2dp = ?, rate_count_detail = ?, rank = ?
        WHERE id = ?
        "#,
    )
    .bind(dynamic.dl_count)
    .bind(dynamic.price)
    .bind(dynamic.review_count)
    .bind(dynamic.rate_count)
    .bind(dynamic.rate_average_2dp)
    .bind(to_json_text(&dynamic.rate_count_detail)?)
    .bind(to_json_text(&dynamic.rank)?)
    .bind(id.as_i64())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LibraryError::NotFound {
            entity_type: "Work".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

async fn link_tags(conn: &mut SqliteConnection, id: WorkId, tags: &[Tag]) -> Result<()> {
    for tag in tags {
        query("INSERT INTO t_tag (id, name) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(tag.id)
            .bind(&tag.name)
            .execute(&mut *conn)
            .await?;
        query("INSERT OR IGNORE INTO r_tag_work (tag_id, work_id) VALUES (?, ?)")
            .bind(tag.id)
            .bind(id.as_i64())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn link_voice_actors(
    conn: &mut SqliteConnection,
    id: WorkId,
    vas: &[VoiceActor],
) -> Result<()> {
    for va in vas {
        let va_id = va.id.to_string();
        query("INSERT INTO t_va (id, name) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(&va_id)
            .bind(&va.name)
            .execute(&mut *conn)
            .await?;
        query("INSERT OR IGNORE INTO r_va_work (va_id, work_id) VALUES (?, ?)")
            .bind(&va_id)
            .bind(id.as_i64())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn remove_orphans(conn: &mut SqliteConnection) -> Result<()> {
    query("DELETE FROM t_circle WHERE id NOT IN (SELECT circle_id FROM t_work)")
        .execute(&mut *conn)
        .await?;
    query("DELETE FROM t_tag WHERE id NOT IN (SELECT tag_id FROM r_tag_work)")
        .execute(&mut *conn)
        .await?;
    query("DELETE FROM t_va WHERE id NOT IN (SELECT va_id FROM r_va_work)")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl WorkRepository for SqliteWorkRepository {
    async fn exists(&self, id: WorkId) -> Result<bool> {
        let row = query("SELECT 1 FROM t_work WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, work: &NewWork) -> Result<()> {
        let metadata = &work.metadata;
        let id = metadata.id;
        if work.location.id != id {
            return Err(LibraryError::InvalidInput {
                field: "location".to_string(),
                message: format!("location is for {} but metadata is for {}", work.location.id, id),
            });
        }

        let mut tx = self.pool.begin().await?;

        query("INSERT INTO t_circle (id, name) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET name = excluded.name")
            .bind(metadata.circle.id)
            .bind(&metadata.circle.name)
            .execute(&mut *tx)
            .await?;

        let inserted = query(
            r#"
            INSERT INTO t_work (
                id, root_folder, dir, title, circle_id, nsfw, release,
                dl_count, price, review_count, rate_count, rate_average_2dp,
                rate_count_detail, rank, has_subtitle
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_i64())
        .bind(&work.location.root_folder)
        .bind(&work.location.dir)
        .bind(&metadata.title)
        .bind(metadata.circle.id)
        .bind(metadata.nsfw)
        .bind(&metadata.release)
        .bind(metadata.dynamic.dl_count)
        .bind(metadata.dynamic.price)
        .bind(metadata.dynamic.review_count)
        .bind(metadata.dynamic.rate_count)
        .bind(metadata.dynamic.rate_average_2dp)
        .bind(to_json_text(&metadata.dynamic.rate_count_detail)?)
        .bind(to_json_text(&metadata.dynamic.rank)?)
        .bind(metadata.has_subtitle)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(LibraryError::AlreadyExists {
                    entity_type: "Work".to_string(),
                    id: id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        link_tags(&mut tx, id, &metadata.tags).await?;
        link_voice_actors(&mut tx, id, &metadata.vas).await?;

        tx.commit().await?;
        debug!(work = %id, tags = metadata.tags.len(), vas = metadata.vas.len(), "Inserted work");
        Ok(())
    }

    async fn update(&self, metadata: &WorkMetadata, options: UpdateOptions) -> Result<()> {
        let id = metadata.id;
        let mut tx = self.pool.begin().await?;

        ensure_exists(&mut tx, id).await?;

        if options.include_dynamic {
            write_dynamic(&mut tx, id, &metadata.dynamic).await?;
        }

        if options.include_tags {
            // The subtitle tag is derived from disk, not from the provider.
            query("DELETE FROM r_tag_work WHERE work_id = ? AND tag_id != ?")
                .bind(id.as_i64())
                .bind(SUBTITLE_TAG_ID)
                .execute(&mut *tx)
                .await?;
            link_tags(&mut tx, id, &metadata.tags).await?;
        }

        if options.include_va {
            query("DELETE FROM r_va_work WHERE work_id = ?")
                .bind(id.as_i64())
                .execute(&mut *tx)
                .await?;
            link_voice_actors(&mut tx, id, &metadata.vas).await?;
        }

        if options.include_tags || options.include_va {
            remove_orphans(&mut tx).await?;
        }

        tx.commit().await?;
        debug!(work = %id, fields = ?options.field_names(), "Updated work");
        Ok(())
    }

    async fn update_dynamic(&self, id: WorkId, dynamic: &DynamicMetadata) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_dynamic(&mut conn, id, dynamic).await
    }

    async fn list_ids(&self) -> Result<Vec<WorkId>> {
        let rows = query("SELECT id FROM t_work ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| row_to_work_id(row, "id")).collect()
    }

    async fn list_ids_by_voice_actors(&self, va_ids: &[Uuid]) -> Result<Vec<WorkId>> {
        if va_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; va_ids.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT work_id FROM r_va_work WHERE va_id IN ({}) ORDER BY work_id ASC",
            placeholders
        );

        let mut q = query(&sql);
        for va_id in va_ids {
            q = q.bind(va_id.to_string());
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(|row| row_to_work_id(row, "work_id")).collect()
    }

    async fn begin_transaction(&self) -> Result<Box<dyn WorkTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteWorkTransaction { tx }))
    }
}

/// SQLite implementation of WorkTransaction
pub struct SqliteWorkTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl WorkTransaction for SqliteWorkTransaction {
    async fn list_locations(&mut self) -> Result<Vec<WorkLocation>> {
        let rows = query("SELECT id, root_folder, dir FROM t_work ORDER BY id ASC")
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(WorkLocation {
                    id: row_to_work_id(row, "id")?,
                    root_folder: row.try_get("root_folder")?,
                    dir: row.try_get("dir")?,
                })
            })
            .collect()
    }

    async fn remove_work(&mut self, id: WorkId) -> Result<()> {
        query("DELETE FROM r_tag_work WHERE work_id = ?")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        query("DELETE FROM r_va_work WHERE work_id = ?")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        query("DELETE FROM t_work WHERE id = ?")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        remove_orphans(&mut self.tx).await?;
        debug!(work = %id, "Removed work");
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Circle, COLLIDING_VOICE_ACTOR_NAMES};
    use serde_json::json;

    fn sample(id: u32, circle_id: i64) -> NewWork {
        NewWork {
            metadata: WorkMetadata {
                id: WorkId(id),
                title: format!("Work {}", id),
                circle: Circle {
                    id: circle_id,
                    name: format!("Circle {}", circle_id),
                },
                nsfw: false,
                release: Some("2024-01-01".to_string()),
                dynamic: DynamicMetadata {
                    dl_count: Some(10),
                    rank: Some(json!([{ "term": "day", "rank": 3 }])),
                    ..DynamicMetadata::default()
                },
                tags: vec![Tag {
                    id: 1,
                    name: "ASMR".to_string(),
                }],
                vas: vec![VoiceActor::from_name("Alice")],
                has_subtitle: false,
            },
            location: WorkLocation {
                id: WorkId(id),
                root_folder: "main".to_string(),
                dir: format!("RJ{:06}", id),
            },
        }
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
        n
    }

    #[tokio::test]
    async fn test_insert_and_exists() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool.clone());

        assert!(!repo.exists(WorkId(123)).await.unwrap());
        repo.insert(&sample(123, 7)).await.unwrap();
        assert!(repo.exists(WorkId(123)).await.unwrap());

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM r_tag_work").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM r_va_work").await, 1);
        let rank: (String,) = sqlx::query_as("SELECT rank FROM t_work WHERE id = 123")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(rank.0.contains("\"term\""));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_already_exists() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool);

        repo.insert(&sample(123, 7)).await.unwrap();
        let err = repo.insert(&sample(123, 7)).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_missing_work_is_not_found() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool);

        let err = repo
            .update(&sample(5, 1).metadata, UpdateOptions::full())
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_replaces_voice_actors() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool.clone());
        repo.insert(&sample(123, 7)).await.unwrap();

        let mut refreshed = sample(123, 7).metadata;
        refreshed.vas = vec![VoiceActor::from_name("Bob")];
        repo.update(&refreshed, UpdateOptions::voice_actors())
            .await
            .unwrap();

        let (name,): (String,) = sqlx::query_as(
            "SELECT v.name FROM r_va_work r JOIN t_va v ON v.id = r.va_id WHERE r.work_id = 123",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(name, "Bob");
        // Alice lost her only work.
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM t_va").await, 1);
    }

    #[tokio::test]
    async fn test_update_tags_keeps_subtitle_tag() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool.clone());
        let mut work = sample(123, 7);
        work.metadata.mark_subtitled();
        repo.insert(&work).await.unwrap();

        let mut refreshed = sample(123, 7).metadata;
        refreshed.tags = vec![Tag {
            id: 2,
            name: "Binaural".to_string(),
        }];
        refreshed.dynamic.dl_count = Some(99);
        repo.update(&refreshed, UpdateOptions::full()).await.unwrap();

        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT tag_id FROM r_tag_work WHERE work_id = 123 ORDER BY tag_id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows, vec![(-1,), (2,)]);

        let (dl_count,): (i64,) = sqlx::query_as("SELECT dl_count FROM t_work WHERE id = 123")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(dl_count, 99);
    }

    #[tokio::test]
    async fn test_update_dynamic() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool.clone());
        repo.insert(&sample(123, 7)).await.unwrap();

        let dynamic = DynamicMetadata {
            price: Some(1320),
            ..DynamicMetadata::default()
        };
        repo.update_dynamic(WorkId(123), &dynamic).await.unwrap();

        let (price,): (i64,) = sqlx::query_as("SELECT price FROM t_work WHERE id = 123")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(price, 1320);

        let err = repo
            .update_dynamic(WorkId(999), &dynamic)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_ids_by_voice_actors() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool);

        let mut first = sample(1, 1);
        first.metadata.vas = COLLIDING_VOICE_ACTOR_NAMES
            .iter()
            .map(|name| VoiceActor::from_name(*name))
            .collect();
        repo.insert(&first).await.unwrap();
        repo.insert(&sample(2, 1)).await.unwrap();

        let ids: Vec<Uuid> = COLLIDING_VOICE_ACTOR_NAMES
            .iter()
            .map(|name| crate::models::voice_actor_id(name))
            .collect();
        let found = repo.list_ids_by_voice_actors(&ids).await.unwrap();

        assert_eq!(found, vec![WorkId(1)]);
        assert!(repo.list_ids_by_voice_actors(&[]).await.unwrap().is_empty());
        assert_eq!(repo.list_ids().await.unwrap(), vec![WorkId(1), WorkId(2)]);
    }

    #[tokio::test]
    async fn test_transaction_remove_and_orphans() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool.clone());
        repo.insert(&sample(1, 1)).await.unwrap();
        repo.insert(&sample(2, 2)).await.unwrap();

        let mut tx = repo.begin_transaction().await.unwrap();
        let locations = tx.list_locations().await.unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].dir, "RJ000001");
        tx.remove_work(WorkId(2)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(repo.list_ids().await.unwrap(), vec![WorkId(1)]);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM t_circle").await, 1);
        // Tag and voice actor are still used by work 1.
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM t_tag").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM t_va").await, 1);
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteWorkRepository::new(pool);
        repo.insert(&sample(1, 1)).await.unwrap();

        let mut tx = repo.begin_transaction().await.unwrap();
        tx.remove_work(WorkId(1)).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(repo.exists(WorkId(1)).await.unwrap());
    }
}
