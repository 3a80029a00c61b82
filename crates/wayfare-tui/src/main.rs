use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use tracing::{error, info};
use wayfare_core::view;
use wayfare_core::{
    CompletionClient, Config, FileStore, KeyValueStore, Role, SessionManager, SessionStore,
};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "wayfare")]
#[command(version, about = "Travel assistant chat with saved conversations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding sessions, the API key and the log file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Model identifier sent to the completion endpoint
    #[arg(long, global = true)]
    model: Option<String>,

    /// Chat completions endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved conversations, most recent first
    Sessions,
    /// Print one conversation
    Show {
        /// Session id as printed by `sessions`
        id: String,
    },
    /// Delete all saved conversations
    Clear,
    /// Forget the stored API key
    ResetKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config, letting flags override file values
    let mut config = Config::load().unwrap_or_else(|_| Config::new());
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    if cli.model.is_some() {
        config.model = cli.model.clone();
    }
    if cli.endpoint.is_some() {
        config.endpoint = cli.endpoint.clone();
    }

    let data_dir = config.data_dir()?;
    logging::init(&data_dir, cli.verbose)?;
    info!(data_dir = %data_dir.display(), model = config.model(), "starting wayfare");

    let mut store = SessionStore::new(FileStore::new(&data_dir));

    match cli.command {
        None => {
            let manager = SessionManager::open(store, Config::env_api_key());
            run_tui(manager, &config).await?;
        }
        // Read-only: no registry, no writes
        Some(Commands::Sessions) => print!("{}", list_sessions(&store)),
        Some(Commands::Show { id }) => print!("{}", show_session(&store, &id)),
        Some(Commands::Clear) => {
            let mut manager = SessionManager::open(store, Config::env_api_key());
            manager.clear_history();
            println!("{}", "All conversation history cleared.".green());
        }
        Some(Commands::ResetKey) => {
            store.clear_credential()?;
            info!("API key reset from the command line");
            println!("{}", "API key removed. You will be asked for a new one next time.".green());
        }
    }

    Ok(())
}

async fn run_tui(manager: SessionManager<FileStore>, config: &Config) -> Result<()> {
    let client = CompletionClient::new(config.endpoint(), config.model(), config.system_prompt());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(manager, client, events.sender());

    let result = async {
        loop {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            if let Some(event) = events.next().await {
                handler::handle_event(&mut app, event).await?;
            }

            if app.should_quit {
                break;
            }
        }
        anyhow::Ok(())
    }
    .await;

    tui::restore()?;
    if let Err(e) = &result {
        error!(error = %e, "terminal UI exited with an error");
    }
    result
}

fn list_sessions<S: KeyValueStore>(store: &SessionStore<S>) -> String {
    let items = view::stored_session_list(&store.load_sessions());
    if items.is_empty() {
        return format!("{}\n", "No saved conversations.".dimmed());
    }

    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "🧳 Saved Conversations".bold().blue()));
    out.push_str(&format!("{}\n", "=".repeat(40).dimmed()));

    for item in items {
        out.push_str(&format!(
            "{}  {} {}\n",
            item.id.dimmed(),
            item.label.bold(),
            format!("({} messages)", item.message_count).dimmed()
        ));
    }
    out
}

fn show_session<S: KeyValueStore>(store: &SessionStore<S>, id: &str) -> String {
    let sessions = store.load_sessions();
    let Some(session) = sessions.get(id) else {
        return format!("{} {}\n", "No conversation with id".red(), id.bold());
    };

    if session.is_empty() {
        return format!("{}\n", view::EMPTY_SESSION_LABEL.dimmed());
    }

    let mut out = String::new();
    for entry in view::transcript(session) {
        let label = match entry.role {
            Role::User => "You".bold().cyan(),
            Role::Assistant => "Assistant".bold().yellow(),
        };
        out.push_str(&format!("\n{}  {}\n", label, entry.time_label.dimmed()));
        for line in entry.lines {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_core::store::SESSIONS_KEY;
    use wayfare_core::MemoryStore;

    const ONE_SESSION: &str = r#"{
        "session_x": [
            {"role": "user", "content": "Rome in winter?", "time": "2024-01-10T08:00:00Z"},
            {"role": "assistant", "content": "Mild days,\ncold nights.", "time": "2024-01-10T08:00:05Z"}
        ]
    }"#;

    fn store_with(raw: Option<&str>) -> SessionStore<MemoryStore> {
        let mut backend = MemoryStore::new();
        if let Some(raw) = raw {
            backend.set(SESSIONS_KEY, raw).unwrap();
        }
        SessionStore::new(backend)
    }

    #[test]
    fn test_listing_empty_store_writes_nothing() {
        let store = store_with(None);
        let out = list_sessions(&store);
        assert!(out.contains("No saved conversations."));
        assert_eq!(store.backend().get(SESSIONS_KEY).unwrap(), None);

        let out = show_session(&store, "session_x");
        assert!(out.contains("No conversation with id"));
        assert_eq!(store.backend().get(SESSIONS_KEY).unwrap(), None);
    }

    #[test]
    fn test_list_and_show_stored_session() {
        let store = store_with(Some(ONE_SESSION));
        let listing = list_sessions(&store);
        assert!(listing.contains("session_x"));
        assert!(listing.contains("Rome in winter?"));
        assert!(listing.contains("(2 messages)"));

        let shown = show_session(&store, "session_x");
        assert!(shown.contains("Rome in winter?"));
        assert!(shown.contains("Mild days,\ncold nights."));
        assert_eq!(store.backend().get(SESSIONS_KEY).unwrap().as_deref(), Some(ONE_SESSION));
    }
}
