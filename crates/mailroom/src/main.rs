//! `Mailroom` - administrative entry point for the message engine
//!
//! Opens the local database and runs one command against it.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, bail};
use mailroom_core::{Compose, Cursor, EngineConfig, MailService, NewProfile, Scope};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage:
  mailroom provision <email> <display-name>
  mailroom folders <email>
  mailroom inbox <email> [limit]
  mailroom send <from> <to> <topic> <text>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_dir().join("config.json");
    let mut config = EngineConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !config_path.exists() {
        let data_dir = data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating {}", data_dir.display()))?;
        config.database_path = data_dir.join("mailroom.db").display().to_string();
    }

    info!(database = %config.database_path, "Starting Mailroom");
    let service = MailService::open(&config, None)
        .await
        .context("opening message store")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["provision", email, name] => {
            let profile = service
                .create_profile(&NewProfile::new(*email, *name))
                .await?;
            println!("profile {} <{}>", profile.id, profile.email);
        }
        ["folders", email] => {
            let profile = service.profile_by_email(email).await?;
            for summary in service.get_folders(profile.id).await? {
                println!(
                    "{:>6} {:<8} {:<24} {:>5} total {:>5} unread",
                    summary.folder.id.0,
                    summary.folder.folder_type.as_str(),
                    summary.folder.name,
                    summary.info.total,
                    summary.info.unread
                );
            }
        }
        ["inbox", email, rest @ ..] => {
            let profile = service.profile_by_email(email).await?;
            let limit = service.parse_limit(rest.first().copied());
            let listing = service
                .get_folder(profile.id, Scope::Inbox, Cursor::start(), limit)
                .await?;
            for row in &listing.page.messages {
                println!(
                    "{} {:>6} {:<32} {}{}",
                    row.created_at.format("%Y-%m-%d %H:%M"),
                    row.id.0,
                    row.sender.email,
                    if row.is_read { "" } else { "* " },
                    row.topic
                );
            }
            println!(
                "{} messages, {} unread{}",
                listing.info.total,
                listing.info.unread,
                if listing.page.has_next { ", more available" } else { "" }
            );
        }
        ["send", from, to, topic, text] => {
            let profile = service.profile_by_email(from).await?;
            let sent = service
                .send(profile.id, &Compose::new(*topic, *text, [*to]))
                .await?;
            println!("message {} in thread {}", sent.id, sent.thread_id);
        }
        _ => bail!("{USAGE}"),
    }

    Ok(())
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailroom")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailroom")
}
