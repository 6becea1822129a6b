//! CLI for tracegraph — drive a trace dashboard's telemetry store from a message stream.

mod commands;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tracegraph")]
#[command(about = "tracegraph — replay and follow trace dashboard message streams")]
#[command(version = tracegraph_core::VERSION)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Store tuning shared by every command.
#[derive(Args)]
struct StoreArgs {
    /// Deferred listener appends applied per dispatch before further appends are discarded
    #[arg(long, default_value_t = tracegraph_core::DEFAULT_REENTRANCY_LIMIT)]
    reentrancy_limit: usize,

    /// Drop data/program-counter messages without a timestamp instead of stamping them
    #[arg(long)]
    strict_timestamps: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a newline-delimited message file into a session and print a JSON report
    Replay {
        /// Message file, or "-" for stdin
        input: String,

        /// Channel to run a range query on
        #[arg(long)]
        channel: Option<String>,

        /// Query window start in ms (default: channel's earliest sample)
        #[arg(long)]
        from: Option<u64>,

        /// Query window end in ms (default: channel's latest sample)
        #[arg(long)]
        to: Option<u64>,

        /// Flat-extend the query result to the window edges
        #[arg(long)]
        clamp: bool,

        /// Also include a downsampled overview of at most N points
        #[arg(long)]
        overview: Option<usize>,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Read messages from stdin and print every sample delivered to the chosen channels
    Follow {
        /// Comma-separated channel ids (default: every configured channel)
        #[arg(long)]
        channels: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    commands::init_logging(cli.verbose);

    match cli.command {
        Commands::Replay {
            input,
            channel,
            from,
            to,
            clamp,
            overview,
            output,
            store,
        } => commands::replay::run(commands::replay::ReplayCommandConfig {
            input: &input,
            channel: channel.as_deref(),
            from,
            to,
            clamp,
            overview_width: overview,
            output_path: output.as_deref(),
            store: commands::store_config(store.reentrancy_limit, store.strict_timestamps),
        }),
        Commands::Follow { channels, store } => commands::follow::run(
            channels.as_deref(),
            commands::store_config(store.reentrancy_limit, store.strict_timestamps),
        ),
    }
}
