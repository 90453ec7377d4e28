pub mod commands;
pub mod config;
pub mod db;
pub mod generator;
pub mod llm;
pub mod persona;
pub mod scheduler;
pub mod services;
pub mod similarity;
pub mod validate;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub motd: std::sync::Arc<services::motd::MotdService>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
