use motdcord::commands::motd;
use motdcord::{config::Config, Data};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![motd::motd(), motd::start(), motd::stats()],
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let db = motdcord::db::Database::new(&config)?;
                db.execute_init()?;
                info!(
                    "History store ready ({} messages)",
                    db.count_messages().unwrap_or(0)
                );

                let llm_client = Arc::new(motdcord::llm::LlmClient::new(&config));
                let persona = motdcord::persona::PersonaContext::load(
                    &config.personality_file,
                    &config.posts_file,
                );
                let generator = motdcord::generator::MotdGenerator::new(
                    llm_client,
                    persona,
                    config.max_generation_attempts,
                    config.similarity_threshold,
                );
                let motd_service = Arc::new(motdcord::services::motd::MotdService::new(
                    db.clone(),
                    generator,
                    config.timezone,
                    config.history_days,
                    config.similarity_check_days,
                ));

                // Daily posting schedule runs for the life of the process.
                let poster = motdcord::scheduler::DailyPoster::new(
                    motd_service.clone(),
                    ctx.http.clone(),
                    &config,
                )?;
                tokio::spawn(poster.run());

                Ok(Data {
                    config,
                    motd: motd_service,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
