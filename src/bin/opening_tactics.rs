use clap::{Parser, Subcommand};
use opening_tactics::{run_search, LichessExplorer, PositionStore, SearchParams, TacticStore, UciEngine};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "opening-tactics", version, about = "Find forced tactics in popular opening lines")]
struct Cli {
    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Explore from the start position and store every tactic found
    Search {
        /// JSON run parameters
        params: PathBuf,
        /// Position memo database
        #[arg(short = 'c', long, default_value = "positions.db")]
        positions: PathBuf,
        /// Directory receiving one JSON file per tactic
        #[arg(short, long)]
        puzzles: PathBuf,
    },
    /// Print the tactics stored in a puzzle directory
    List {
        #[arg(short, long)]
        puzzles: PathBuf,
    },
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn search(params: PathBuf, positions: PathBuf, puzzles: PathBuf) -> opening_tactics::Result<()> {
    let params = SearchParams::from_file(&params)?;
    let store = PositionStore::new(&positions);
    let tactics = TacticStore::new(&puzzles)?;

    info!(
        start = %params.start_fen,
        engine = %params.engine.exec.display(),
        depth = params.engine.depth,
        max_depth = params.search.max_depth,
        "starting search"
    );

    let mut engine = UciEngine::spawn(&params.engine)?;
    let stats = LichessExplorer::new(params.stats.clone());
    let summary = run_search(&params, &store, &tactics, &mut engine, stats)?;
    engine.close()?;

    println!(
        "Examined {} positions, {} new tactics, {} rejected, {} engine queries",
        summary.positions_examined, summary.tactics_found, summary.tactics_rejected, summary.engine_queries
    );
    Ok(())
}

fn list(puzzles: PathBuf) -> opening_tactics::Result<()> {
    let store = TacticStore::new(&puzzles)?;
    for tactic in store.list()? {
        let variation = tactic.variation_san()?;
        println!("{}\t{}\t{}", tactic.filename(), variation, tactic);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result = match cli.command {
        Command::Search { params, positions, puzzles } => search(params, positions, puzzles),
        Command::List { puzzles } => list(puzzles),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
