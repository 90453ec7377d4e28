use crate::{Context, Error};
use tracing::{error, info};

/// Get today's message of the day
#[poise::command(slash_command)]
pub async fn motd(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;
    info!("MOTD command received from {}", ctx.author().id);

    match ctx.data().motd.get_or_create_today().await {
        Ok(message) => {
            ctx.say(message).await?;
        }
        Err(e) => {
            error!("MOTD command failed: {:#}", e);
            ctx.say("❌ Could not produce today's message. Please try again later.")
                .await?;
        }
    }
    Ok(())
}

/// Show the welcome message and available commands
#[poise::command(slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "Welcome to the Message of the Day bot!\n\n\
         Commands:\n\
         `/motd` - Get today's message\n\
         `/stats` - Message history diagnostics\n\
         `/start` - Show this welcome message",
    )
    .await?;
    Ok(())
}

/// Show message history diagnostics
#[poise::command(slash_command)]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let config = &ctx.data().config;
    let service = &ctx.data().motd;
    let count = service.message_count().await?;
    let today = service.today_record().await?;

    let status = match today {
        Some(record) => format!("stored at {}", record.posted_at),
        None => "not generated yet".to_string(),
    };

    ctx.say(format!(
        "📊 {} messages in history. Today's message: {}.\nDaily post at {:02}:{:02} {}.",
        count, status, config.daily_post_hour, config.daily_post_minute, config.timezone
    ))
    .await?;
    Ok(())
}
