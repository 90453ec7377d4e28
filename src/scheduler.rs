//! Daily posting schedule.
//!
//! Sleeps until the next occurrence of the configured post time in the
//! configured time zone, then generates (or fetches) today's message and
//! publishes it. Persistence happens inside the service before the
//! Discord send, so a failed publish never loses the generated content.

use crate::config::Config;
use crate::services::motd::MotdService;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serenity::all::{ChannelId, CreateMessage};
use serenity::http::Http;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Builds the six-field cron expression for a daily post at `hour:minute`.
pub fn post_schedule(hour: u32, minute: u32) -> anyhow::Result<Schedule> {
    let expression = format!("0 {} {} * * *", minute, hour);
    Schedule::from_str(&expression)
        .map_err(|e| anyhow::anyhow!("invalid daily post schedule '{}': {}", expression, e))
}

fn next_occurrence(schedule: &Schedule, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
    schedule.after(&after).next()
}

pub struct DailyPoster {
    service: Arc<MotdService>,
    http: Arc<Http>,
    channel_id: u64,
    schedule: Schedule,
    tz: Tz,
    dry_run: bool,
}

impl DailyPoster {
    pub fn new(service: Arc<MotdService>, http: Arc<Http>, config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            service,
            http,
            channel_id: config.channel_id,
            schedule: post_schedule(config.daily_post_hour, config.daily_post_minute)?,
            tz: config.timezone,
            dry_run: config.dry_run,
        })
    }

    pub async fn run(self) {
        loop {
            let now = Utc::now().with_timezone(&self.tz);
            let Some(next) = next_occurrence(&self.schedule, now) else {
                error!("Daily poster: schedule has no future occurrence, stopping");
                return;
            };

            let wait = (next - now)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            info!(
                "Daily poster: next post at {}",
                next.format("%Y-%m-%d %H:%M %Z")
            );
            tokio::time::sleep(wait).await;

            if let Err(e) = self.post().await {
                error!("Daily post cycle failed: {}", e);
            }
        }
    }

    async fn post(&self) -> anyhow::Result<()> {
        info!("Daily poster: starting posting job");
        let message = self.service.get_or_create_today().await?;

        if self.dry_run {
            info!("DRY RUN MODE - would have posted:\n{}", message);
            return Ok(());
        }

        let builder = CreateMessage::new().content(message);
        ChannelId::new(self.channel_id)
            .send_message(&self.http, builder)
            .await?;
        info!("Daily message posted to channel {}", self.channel_id);
        Ok(())
    }
}
