//! gridword - plays a bot-only demonstration game and prints the result.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use gridword::config::Config;
use gridword::game::Dictionary;
use gridword::lobby::{LobbyConfig, MemberRole};
use gridword::storage::{MemoryStore, PlayerStore, SqliteStore};
use gridword::GameServer;

const DEFAULT_CONFIG: &str = "gridword.toml";

fn main() -> Result<()> {
    init_tracing()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let dictionary = match &config.dictionary_path {
        Some(path) => Arc::new(
            Dictionary::load_file(path)
                .with_context(|| format!("failed to load dictionary {}", path.display()))?,
        ),
        None => {
            warn!("no dictionary_path configured, using the small embedded starter list");
            Dictionary::embedded()
        }
    };
    info!(words = dictionary.len(), "dictionary loaded");

    let store = open_store(&config);
    let grid_size = config.default_grid_size;
    let server = GameServer::new(config, dictionary, store)?;

    let (host, _) = server.create_guest("Host")?;
    let code = server.create_lobby(&host.id)?.code;
    server.update_config(&code, &host.id, LobbyConfig { grid_size })?;
    server.add_bot(&code, &host.id, Some("random"))?;
    server.add_bot(&code, &host.id, Some("frequency"))?;
    server.set_role(&code, &host.id, &host.id, MemberRole::Spectator)?;

    // Bots play the whole game before start_game returns.
    let game = server.start_game(&code, &host.id)?;
    let lobby = server.get_lobby(&code)?;
    let summary = lobby
        .history
        .last()
        .context("demonstration game did not finish")?;

    println!("lobby {} game {} ({}x{})", code, game.id, grid_size, grid_size);
    for score in &summary.scores {
        let name = lobby
            .member(&score.player_id)
            .map(|m| m.player.display_name.as_str())
            .unwrap_or("?");
        let words: Vec<&str> = score.matches.iter().map(|m| m.word.as_str()).collect();
        println!("  {:<8} {:>3}  {}", name, score.total, words.join(" "));
    }
    match &summary.winner {
        Some(winner) if summary.tied => println!(
            "tie at {}, {} wins on seat order",
            summary.winning_score, winner
        ),
        Some(winner) => println!("winner {} with {}", winner, summary.winning_score),
        None => println!("no winner"),
    }

    Ok(())
}

/// SQLite in the configured or OS data location, or memory if that fails.
fn open_store(config: &Config) -> Arc<dyn PlayerStore> {
    let opened = match &config.database_path {
        Some(path) => SqliteStore::open_at(path),
        None => SqliteStore::open(),
    };
    match opened {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "player database unavailable, using memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

fn init_tracing() -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridword=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
