use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use chess_ledger::board::Grid;
use chess_ledger::config::Config;
use chess_ledger::engine::MoveEngine;
use chess_ledger::protocol::ProtocolHandler;
use chess_ledger::session::SessionStore;

#[derive(Parser)]
#[command(name = "chess-ledger", version, about = "Chess move engine and game ledger")]
struct Cli {
    /// YAML config file. Falls back to CHESS_LEDGER_CONFIG.
    #[arg(long, env = "CHESS_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin (default)
    Serve,
    /// Print the board of a FEN record
    Decode { fen: String },
}

fn main() -> Result<()> {
    let env = Env::default().filter_or("CHESS_LEDGER_LOG", "info");
    env_logger::Builder::from_env(env).init();

    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;
    let engine = MoveEngine::with_mode(cfg.decode_mode());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let store = SessionStore::with_start_fen(engine, &cfg.start_fen)
                .context("invalid start_fen in config")?;
            info!("reading commands from stdin");
            ProtocolHandler::new(store).run()
        }
        Commands::Decode { fen } => {
            let grid = Grid::from_fen_with(&fen, engine.decode_mode())?;
            println!("{}", grid);
            Ok(())
        }
    }
}
