use crate::config::Config;
use rusqlite::{Connection, Result};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The one-record-per-day invariant: a second insert for the same date
    /// loses the race and must re-read instead of retrying.
    #[error("a message for {0} already exists")]
    DuplicateDate(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone)]
pub struct MotdRecord {
    pub date: String,
    pub content: String,
    pub content_hash: String,
    pub embedding: Option<Vec<f32>>,
    pub posted_at: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> Result<Self> {
        let conn = Connection::open(&config.database_url)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let sql = "
            CREATE TABLE IF NOT EXISTS motd_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB,
                posted_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_motd_date ON motd_messages (date);
            CREATE INDEX IF NOT EXISTS idx_motd_hash ON motd_messages (content_hash);
        ";
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a blocking database closure on the tokio blocking pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// Inserts the message for a date. Fails with `DuplicateDate` when a
    /// record for that date is already present; the UNIQUE constraint on
    /// `date` is the serialization point for concurrent generation.
    pub fn insert_message(
        &self,
        date: &str,
        content: &str,
        content_hash: &str,
        embedding: Option<&[f32]>,
    ) -> std::result::Result<(), StoreError> {
        debug!("Database: Inserting message for {}", date);
        let blob = embedding.map(embedding_to_blob);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO motd_messages (date, content, content_hash, embedding)
             VALUES (?1, ?2, ?3, ?4)",
            (date, content, content_hash, blob),
        )
        .map_err(|e| match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::DuplicateDate(date.to_string())
            }
            _ => StoreError::Sqlite(e),
        })?;
        Ok(())
    }

    pub fn get_message_by_date(&self, date: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT content FROM motd_messages WHERE date = ?1")?;
        let mut rows = stmt.query([date])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_record_by_date(&self, date: &str) -> anyhow::Result<Option<MotdRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT date, content, content_hash, embedding, posted_at
             FROM motd_messages WHERE date = ?1",
        )?;
        let mut rows = stmt.query([date])?;

        if let Some(row) = rows.next()? {
            let blob: Option<Vec<u8>> = row.get(3)?;
            Ok(Some(MotdRecord {
                date: row.get(0)?,
                content: row.get(1)?,
                content_hash: row.get(2)?,
                embedding: blob.map(|b| blob_to_embedding(&b)),
                posted_at: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Message texts on or after `cutoff_date`, newest first. Used as the
    /// avoid-repetition context fed to the generator.
    pub fn get_messages_since(&self, cutoff_date: &str) -> anyhow::Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT content FROM motd_messages WHERE date >= ?1 ORDER BY date DESC")?;
        let rows = stmt.query_map([cutoff_date], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// `(content, embedding)` pairs on or after `cutoff_date`, newest
    /// first. Rows without an embedding are skipped; they cannot take part
    /// in similarity scoring.
    pub fn get_embeddings_since(
        &self,
        cutoff_date: &str,
    ) -> anyhow::Result<Vec<(String, Vec<f32>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT content, embedding FROM motd_messages
             WHERE date >= ?1 AND embedding IS NOT NULL ORDER BY date DESC",
        )?;
        let rows = stmt.query_map([cutoff_date], |row| {
            let content: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((content, blob))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (content, blob) = row?;
            let embedding = blob_to_embedding(&blob);
            if !embedding.is_empty() {
                results.push((content, embedding));
            }
        }
        Ok(results)
    }

    /// Removes messages dated strictly before `cutoff_date`.
    /// Returns the number of messages deleted. Safe to run repeatedly.
    pub fn delete_messages_before(&self, cutoff_date: &str) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM motd_messages WHERE date < ?1", (cutoff_date,))?;
        Ok(count)
    }

    pub fn count_messages(&self) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM motd_messages", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Serializes an embedding as little-endian f32 bytes for BLOB storage.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Inverse of `embedding_to_blob`. A trailing partial chunk is ignored.
pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        Config {
            discord_token: "test".to_string(),
            application_id: 0,
            channel_id: 1,
            llm_url: "test".to_string(),
            llm_model: "test".to_string(),
            llm_api_key: None,
            embedding_url: "test".to_string(),
            embedding_model: "test".to_string(),
            embedding_api_key: None,
            database_url: ":memory:".to_string(),
            personality_file: "data/personality.md".to_string(),
            posts_file: "data/posts.json".to_string(),
            timezone: chrono_tz::Tz::UTC,
            daily_post_hour: 9,
            daily_post_minute: 0,
            dry_run: false,
            history_days: 365,
            similarity_check_days: 90,
            similarity_threshold: 0.85,
            max_generation_attempts: 5,
            status_message: "test".to_string(),
        }
    }

    fn test_db() -> Database {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_insert_and_get() {
        let db = test_db();

        db.insert_message("2026-08-07", "hello\n\nthanks", "abc123", Some(&[0.1, 0.2]))
            .unwrap();

        let content = db.get_message_by_date("2026-08-07").unwrap();
        assert_eq!(content.as_deref(), Some("hello\n\nthanks"));
        assert_eq!(db.get_message_by_date("2026-08-08").unwrap(), None);

        let record = db.get_record_by_date("2026-08-07").unwrap().unwrap();
        assert_eq!(record.content_hash, "abc123");
        assert_eq!(record.embedding, Some(vec![0.1, 0.2]));
        assert!(!record.posted_at.is_empty());
    }

    #[test]
    fn test_duplicate_date_rejected() {
        let db = test_db();

        db.insert_message("2026-08-07", "first", "h1", None).unwrap();
        let err = db
            .insert_message("2026-08-07", "second", "h2", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDate(_)));

        // The first write wins and is untouched.
        let content = db.get_message_by_date("2026-08-07").unwrap();
        assert_eq!(content.as_deref(), Some("first"));
        assert_eq!(db.count_messages().unwrap(), 1);
    }

    #[test]
    fn test_windowed_reads() {
        let db = test_db();

        db.insert_message("2026-05-01", "old", "h1", Some(&[1.0, 0.0]))
            .unwrap();
        db.insert_message("2026-08-01", "recent", "h2", Some(&[0.0, 1.0]))
            .unwrap();
        db.insert_message("2026-08-05", "newest", "h3", None).unwrap();

        let messages = db.get_messages_since("2026-07-01").unwrap();
        assert_eq!(messages, vec!["newest".to_string(), "recent".to_string()]);

        // Rows without embeddings are excluded from the similarity window.
        let embeddings = db.get_embeddings_since("2026-01-01").unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].0, "recent");
        assert_eq!(embeddings[0].1, vec![0.0, 1.0]);
    }

    #[test]
    fn test_prune_deletes_only_expired() {
        let db = test_db();

        db.insert_message("2025-01-01", "expired1", "h1", None).unwrap();
        db.insert_message("2025-02-01", "expired2", "h2", None).unwrap();
        db.insert_message("2026-08-01", "kept", "h3", None).unwrap();
        assert_eq!(db.count_messages().unwrap(), 3);

        let deleted = db.delete_messages_before("2025-08-07").unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.count_messages().unwrap(), 1);
        assert!(db.get_message_by_date("2026-08-01").unwrap().is_some());

        // Idempotent: a second sweep deletes nothing.
        assert_eq!(db.delete_messages_before("2025-08-07").unwrap(), 0);
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let embedding = vec![0.25f32, -1.5, 3.25, 0.0];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob), embedding);

        // A truncated blob drops the partial value rather than erroring.
        assert_eq!(blob_to_embedding(&blob[..10]), vec![0.25f32, -1.5]);
        assert!(blob_to_embedding(&[]).is_empty());
    }
}
