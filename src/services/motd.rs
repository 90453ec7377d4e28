//! The single entry point behind both the daily schedule and `/motd`.
//!
//! "Today's message" is always a query against the store keyed by the
//! civil date in the configured time zone, never an in-memory singleton.
//! The check-generate-insert sequence is not atomic; the UNIQUE date
//! constraint resolves concurrent episodes, and the loser re-reads the
//! winning row.

use crate::db::{Database, MotdRecord, StoreError};
use crate::generator::MotdGenerator;
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::{info, warn};

pub struct MotdService {
    db: Database,
    generator: MotdGenerator,
    tz: Tz,
    history_days: i64,
    similarity_check_days: i64,
}

impl MotdService {
    pub fn new(
        db: Database,
        generator: MotdGenerator,
        tz: Tz,
        history_days: i64,
        similarity_check_days: i64,
    ) -> Self {
        Self {
            db,
            generator,
            tz,
            history_days,
            similarity_check_days,
        }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    fn cutoff(&self, days: i64) -> String {
        (self.today() - Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Returns today's message, generating and persisting it first when
    /// today's slot is still empty.
    pub async fn get_or_create_today(&self) -> anyhow::Result<String> {
        let today = self.today().format("%Y-%m-%d").to_string();

        {
            let date = today.clone();
            let existing = self
                .db
                .run_blocking(move |db| db.get_message_by_date(&date))
                .await?;
            if let Some(message) = existing {
                info!("Returning existing message for {}", today);
                return Ok(message);
            }
        }

        let context_cutoff = self.cutoff(self.history_days);
        let window_cutoff = self.cutoff(self.similarity_check_days);
        let (previous, window) = self
            .db
            .run_blocking(move |db| {
                let previous = db.get_messages_since(&context_cutoff)?;
                let window = db.get_embeddings_since(&window_cutoff)?;
                Ok((previous, window))
            })
            .await?;
        info!(
            "Generating message for {} ({} context messages, {} embeddings in window)",
            today,
            previous.len(),
            window.len()
        );

        let generated = self.generator.generate_with_retry(&previous, &window).await?;
        let content_hash = hash_content(&generated.content);

        let inserted = {
            let date = today.clone();
            let content = generated.content.clone();
            let embedding = generated.embedding.clone();
            self.db
                .run_blocking(move |db| {
                    match db.insert_message(&date, &content, &content_hash, Some(&embedding)) {
                        Ok(()) => Ok(true),
                        Err(StoreError::DuplicateDate(_)) => Ok(false),
                        Err(e) => Err(e.into()),
                    }
                })
                .await?
        };

        if !inserted {
            // Lost the insert race to a concurrent episode; the stored row wins.
            warn!(
                "A concurrent episode already stored a message for {}; returning it",
                today
            );
            let date = today.clone();
            return self
                .db
                .run_blocking(move |db| db.get_message_by_date(&date))
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!("message for {} vanished after losing the insert race", today)
                });
        }

        if generated.cleared_threshold {
            info!(
                "Stored message for {} (attempt {}, similarity {:.1}%)",
                today,
                generated.attempt,
                generated.similarity * 100.0
            );
        } else {
            warn!(
                "Stored fallback message for {} at {:.1}% similarity",
                today,
                generated.similarity * 100.0
            );
        }

        let retention_cutoff = self.cutoff(self.history_days);
        let pruned = self
            .db
            .run_blocking(move |db| db.delete_messages_before(&retention_cutoff))
            .await?;
        if pruned > 0 {
            info!("Pruned {} messages past the retention window", pruned);
        }

        Ok(generated.content)
    }

    pub async fn message_count(&self) -> anyhow::Result<i64> {
        self.db.run_blocking(|db| db.count_messages()).await
    }

    pub async fn today_record(&self) -> anyhow::Result<Option<MotdRecord>> {
        let date = self.today().format("%Y-%m-%d").to_string();
        self.db
            .run_blocking(move |db| db.get_record_by_date(&date))
            .await
    }
}

/// SHA-256 hex digest used for exact-duplicate detection in the store.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
