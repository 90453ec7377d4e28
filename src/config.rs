use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub application_id: u64,
    /// Channel that receives the scheduled daily post.
    pub channel_id: u64,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
    pub database_url: String,
    pub personality_file: String,
    pub posts_file: String,
    /// Civil time zone for the daily date key and the posting schedule.
    pub timezone: Tz,
    pub daily_post_hour: u32,
    pub daily_post_minute: u32,
    /// Log the daily message instead of sending it to Discord.
    pub dry_run: bool,
    /// Retention window and textual-context window, in days.
    pub history_days: i64,
    /// Shorter window used for embedding similarity checks.
    pub similarity_check_days: i64,
    /// Reject candidates whose worst-case similarity exceeds this (0-1).
    pub similarity_threshold: f32,
    pub max_generation_attempts: u32,
    pub status_message: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let llm_url =
            env::var("LLM_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let config = Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            application_id: env::var("APPLICATION_ID")
                .map_err(|_| anyhow::anyhow!("APPLICATION_ID must be set"))?
                .parse()
                .map_err(|_| anyhow::anyhow!("APPLICATION_ID must be a valid u64"))?,
            channel_id: env::var("MOTD_CHANNEL_ID")
                .map_err(|_| anyhow::anyhow!("MOTD_CHANNEL_ID must be set"))?
                .parse()
                .map_err(|_| anyhow::anyhow!("MOTD_CHANNEL_ID must be a valid u64"))?,
            embedding_url: env::var("EMBEDDING_URL").unwrap_or_else(|_| llm_url.clone()),
            llm_url,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok(),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            embedding_api_key: env::var("EMBEDDING_API_KEY").ok(),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "data/motd.db".to_string()),
            personality_file: env::var("PERSONALITY_FILE")
                .unwrap_or_else(|_| "data/personality.md".to_string()),
            posts_file: env::var("POSTS_FILE").unwrap_or_else(|_| "data/posts.json".to_string()),
            timezone: env::var("TIMEZONE")
                .unwrap_or_else(|_| "UTC".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TIMEZONE must be a valid IANA timezone name"))?,
            daily_post_hour: env::var("DAILY_POST_HOUR")
                .unwrap_or_else(|_| "9".to_string())
                .parse()
                .unwrap_or(9),
            daily_post_minute: env::var("DAILY_POST_MINUTE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            dry_run: env::var("DRY_RUN")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            history_days: env::var("HISTORY_DAYS")
                .unwrap_or_else(|_| "365".to_string())
                .parse()
                .unwrap_or(365),
            similarity_check_days: env::var("SIMILARITY_CHECK_DAYS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .unwrap_or(90),
            similarity_threshold: env::var("SIMILARITY_THRESHOLD")
                .unwrap_or_else(|_| "0.85".to_string())
                .parse()
                .unwrap_or(0.85),
            max_generation_attempts: env::var("MAX_GENERATION_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Message of the day, every day".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.daily_post_hour > 23 {
            anyhow::bail!("DAILY_POST_HOUR must be 0-23");
        }
        if self.daily_post_minute > 59 {
            anyhow::bail!("DAILY_POST_MINUTE must be 0-59");
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            anyhow::bail!("SIMILARITY_THRESHOLD must be within (0, 1]");
        }
        if self.max_generation_attempts == 0 {
            anyhow::bail!("MAX_GENERATION_ATTEMPTS must be at least 1");
        }
        if self.history_days <= 0 || self.similarity_check_days <= 0 {
            anyhow::bail!("HISTORY_DAYS and SIMILARITY_CHECK_DAYS must be positive");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("application_id", &self.application_id)
            .field("channel_id", &self.channel_id)
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                &self.llm_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("embedding_url", &self.embedding_url)
            .field("embedding_model", &self.embedding_model)
            .field(
                "embedding_api_key",
                &self.embedding_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("database_url", &self.database_url)
            .field("personality_file", &self.personality_file)
            .field("posts_file", &self.posts_file)
            .field("timezone", &self.timezone)
            .field("daily_post_hour", &self.daily_post_hour)
            .field("daily_post_minute", &self.daily_post_minute)
            .field("dry_run", &self.dry_run)
            .field("history_days", &self.history_days)
            .field("similarity_check_days", &self.similarity_check_days)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("max_generation_attempts", &self.max_generation_attempts)
            .field("status_message", &self.status_message)
            .finish()
    }
}
