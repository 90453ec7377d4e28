//! Persona context and prompt assembly for the daily message.
//!
//! The voice lives in two data files: a guidelines markdown file and a
//! JSON archive of sample posts. Both are optional at runtime; a missing
//! file degrades to an empty context with a warning rather than stopping
//! the bot.

use serde::Deserialize;
use std::fs;
use tracing::warn;

/// Sample every Nth archived post to keep the prompt small.
const POST_SAMPLE_STRIDE: usize = 10;
const POST_SAMPLE_LIMIT: usize = 50;
/// Posts at or below this length carry too little voice to be useful.
const MIN_SAMPLE_POST_CHARS: usize = 20;
/// Hard cap on the posts context included in the user prompt.
const POSTS_CONTEXT_CHARS: usize = 3000;
/// How many recent messages are shown as the avoid-repetition list.
const MAX_RECENT_MESSAGES: usize = 10;

#[derive(Deserialize)]
struct PostsFile {
    #[serde(default)]
    posts: Vec<SamplePost>,
}

#[derive(Deserialize)]
struct SamplePost {
    #[serde(default)]
    date: String,
    #[serde(default)]
    content: String,
}

pub struct PersonaContext {
    personality: String,
    posts_context: String,
}

impl PersonaContext {
    pub fn new(personality: String, posts_context: String) -> Self {
        Self {
            personality,
            posts_context,
        }
    }

    /// Loads the persona guidelines and sample-post archive from disk.
    pub fn load(personality_file: &str, posts_file: &str) -> Self {
        let personality = match fs::read_to_string(personality_file) {
            Ok(text) => text,
            Err(e) => {
                warn!("Persona: could not read {}: {}", personality_file, e);
                String::new()
            }
        };

        let posts_context = match fs::read_to_string(posts_file) {
            Ok(raw) => match serde_json::from_str::<PostsFile>(&raw) {
                Ok(file) => Self::format_posts(&file.posts),
                Err(e) => {
                    warn!("Persona: could not parse {}: {}", posts_file, e);
                    String::new()
                }
            },
            Err(e) => {
                warn!("Persona: could not read {}: {}", posts_file, e);
                String::new()
            }
        };

        Self::new(personality, posts_context)
    }

    fn format_posts(posts: &[SamplePost]) -> String {
        let mut context = String::from("Sample posts from the archive:\n\n");
        let mut included = 0usize;

        for post in posts.iter().step_by(POST_SAMPLE_STRIDE) {
            if included >= POST_SAMPLE_LIMIT {
                break;
            }
            let content = post.content.trim();
            if content.chars().count() <= MIN_SAMPLE_POST_CHARS {
                continue;
            }
            context.push_str(&format!("[{}] {}\n\n", post.date, content));
            included += 1;
        }

        if included == 0 {
            return String::new();
        }
        context
    }

    /// System prompt: the persona guidelines plus the two-part format
    /// contract every candidate is validated against.
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::new();
        if !self.personality.trim().is_empty() {
            prompt.push_str(self.personality.trim());
            prompt.push_str("\n\n");
        }

        prompt.push_str(
            "Generate a brief daily message with TWO parts.\n\n\
             Part 1 - Main message (2-4 sentences): a unique insight, observation, or \
             reflection in your documented voice. Rotate through different themes across \
             days (technical, philosophical, community, critical, visionary).\n\n\
             Part 2 - Contributor thanks (1-2 sentences): thank the people who actually \
             do the work - developers, community managers, architects, researchers, \
             shitposters on X. Never thank node operators or pillar operators. Be genuine \
             and vary the recognition daily.\n\n\
             FORMAT REQUIREMENT: separate the two parts with exactly one blank line.",
        );
        prompt
    }

    /// User prompt: archive context plus the recent messages the new one
    /// must not repeat.
    pub fn user_prompt(&self, recent_messages: &[String]) -> String {
        let posts: String = self.posts_context.chars().take(POSTS_CONTEXT_CHARS).collect();

        let mut prompt = String::new();
        if !posts.is_empty() {
            prompt.push_str("Context from past posts:\n\n");
            prompt.push_str(&posts);
            prompt.push_str("\n\n");
        }

        prompt.push_str("Recent messages to avoid repeating:\n");
        prompt.push_str(&Self::format_recent(recent_messages));
        prompt.push_str(
            "\n\nWrite today's message of the day in the two-part format with the blank \
             line separator.",
        );
        prompt
    }

    fn format_recent(messages: &[String]) -> String {
        if messages.is_empty() {
            return "None".to_string();
        }
        messages
            .iter()
            .take(MAX_RECENT_MESSAGES)
            .map(|msg| format!("- {}", msg))
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}
