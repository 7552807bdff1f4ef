#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tg: event-sourced graph store with federated reads",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Project",
        about = "Initialize a tangle project",
        long_about = "Create .tangle/ in the current directory with a default config and an empty database.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    tg init\n\n    # Rewrite the config of an existing project\n    tg init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Write",
        about = "Submit operations as one transaction",
        long_about = "Append a JSON array of graph operations to a checkout's revision log as one transaction, under the project writer lock. With --play the transaction is applied to the entity store immediately.",
        after_help = "EXAMPLES:\n    # Submit a batch and apply it\n    tg submit --graph people --play ops.json\n\n    # Read operations from stdin\n    cat ops.json | tg submit --graph people --branch dev -"
    )]
    Submit(cmd::submit::SubmitArgs),

    #[command(
        next_help_heading = "Write",
        about = "Rebuild a checkout's store from its revision log",
        long_about = "Clear the node and edge stores of a checkout and replay its whole revision log, under the project writer lock.",
        after_help = "EXAMPLES:\n    # Rebuild the people graph\n    tg replay --graph people\n\n    # Skip operations of uncommitted transactions\n    tg replay --graph people --committed-only --json"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one node or edge",
        long_about = "Look up a node (or, with --edge, an edge) in a checkout's store by uid or by type and name.",
        after_help = "EXAMPLES:\n    # By type and name\n    tg show --graph people --type Person --name alice\n\n    # An edge by uid, as JSON\n    tg show --graph people --uid edge-3f2a --edge --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "List the edges of a node",
        long_about = "List the outgoing (or, with --incoming, incoming) edges of a node in a checkout's store, or count them per edge type.",
        after_help = "EXAMPLES:\n    # Who alice links to\n    tg edges --graph people --type Person --name alice\n\n    # Incoming edge counts per type, as JSON\n    tg edges --graph people --uid node-3f2a --incoming --count --json"
    )]
    Edges(cmd::edges::EdgesArgs),

    #[command(
        next_help_heading = "Read",
        about = "Print a checkout's revision log",
        long_about = "Print the revision items of a checkout in log order, optionally only one transaction.",
        after_help = "EXAMPLES:\n    # Whole log\n    tg log --graph people\n\n    # One transaction as JSON\n    tg log --graph people --txn txn-0123456789abcdef --json"
    )]
    Log(cmd::log::LogArgs),

    #[command(
        next_help_heading = "Read",
        about = "Read across several graphs",
        long_about = "Resolve entities across graphs of this project and the [[graphs]] sources of the user config, merging documents until their identity stops growing.",
        after_help = "EXAMPLES:\n    # Merge alice from two local graphs\n    tg federate --graph crm --graph hr get --type Person --name alice\n\n    # Count nodes across every configured source\n    tg federate count"
    )]
    Federate(cmd::federate::FederateArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TANGLE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tangle=debug,info"
        } else {
            "tangle=info,warn"
        })
    });

    let format = env::var("TANGLE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = std::env::current_dir()?;
    let config = tangle_core::config::resolve_config(&project_root, cli.json)?;
    let output = OutputMode::from_resolved(&config.resolved_output);

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Submit(ref args) => {
            cmd::submit::run_submit(args, output, &project_root, &config.project)
        }
        Commands::Replay(ref args) => {
            cmd::replay::run_replay(args, output, &project_root, &config.project)
        }
        Commands::Show(ref args) => cmd::show::run_show(args, output, &project_root, &config.project),
        Commands::Edges(ref args) => cmd::edges::run_edges(args, output, &project_root, &config.project),
        Commands::Log(ref args) => cmd::log::run_log(args, output, &project_root, &config.project),
        Commands::Federate(ref args) => cmd::federate::run_federate(
            args,
            output,
            &project_root,
            &config.project,
            &config.user,
        ),
    }
}
