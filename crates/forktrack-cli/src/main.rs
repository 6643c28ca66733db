mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "forktrack",
    version,
    about = "Track follow-up commits for fork-carried changes",
    long_about = "Forktrack checks whether the commits carried in a downstream fork have\n\
        received follow-up fixes or mentions in the upstream history, whether those\n\
        follow-ups were backported, and keeps the answers fresh incrementally as\n\
        both histories move.\n\n\
        Quick start:\n  \
        forktrack track --upstream v5.4..master > followups.txt\n  \
        forktrack track --upstream v5.4..master --prev-results followups.txt\n  \
        forktrack report followups.txt\n  \
        forktrack summary followups.txt"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track follow-up status of downstream commits in the upstream
    ///
    /// For each downstream commit title, finds the same-titled upstream
    /// commit, scans the newer upstream history for commits fixing or
    /// mentioning it, and checks which of those follow-ups were backported.
    /// The output doubles as the checkpoint for the next incremental run.
    ///
    /// Examples:
    ///   forktrack track --upstream v5.4..master
    ///   forktrack track --upstream v5.4..master --downstream v5.4..fork
    ///   forktrack track --upstream v5.4..master --prev-results followups.txt
    Track {
        /// Path to the git repository to inspect
        #[arg(long, default_value = "./")]
        repo: String,

        /// The upstream history as a revision range
        #[arg(long)]
        upstream: String,

        /// The downstream history (default: <latest tag>..HEAD)
        #[arg(long)]
        downstream: Option<String>,

        /// Track only this downstream commit title (repeatable; default: all)
        #[arg(long = "title")]
        titles: Vec<String>,

        /// File containing the output of a previous run
        #[arg(long)]
        prev_results: Option<String>,

        /// Treat titles starting with this prefix as downstream-only
        #[arg(long)]
        downstream_prefix: Option<String>,

        /// TOML file listing follow-ups to suppress
        #[arg(long)]
        ignore: Option<String>,

        /// Only print commits that have follow-ups
        #[arg(long)]
        followups_only: bool,

        /// Restrict the highlights to results with unmerged follow-ups
        #[arg(long)]
        unmerged_only: bool,

        /// Scan the whole tree instead of only the files the tracked commit touched
        #[arg(long)]
        all_files: bool,
    },
    /// Build a backport-request report from saved track output
    ///
    /// Groups the unmerged follow-ups by upstream commit, checks whether
    /// each cherry-picks cleanly onto the downstream end, and formats a
    /// message to the involved authors.
    ///
    /// Example: forktrack report followups.txt
    Report {
        /// File containing output of `forktrack track`
        output: String,

        /// Path to the git repository to inspect
        #[arg(long, default_value = "./")]
        repo: String,
    },
    /// Print the summary counts of saved track outputs, one row per file
    ///
    /// Example: forktrack summary january.txt february.txt
    Summary {
        /// Files containing output of `forktrack track`
        #[arg(required = true)]
        outputs: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is the parseable output.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Track {
            repo,
            upstream,
            downstream,
            titles,
            prev_results,
            downstream_prefix,
            ignore,
            followups_only,
            unmerged_only,
            all_files,
        } => commands::track::run(commands::track::TrackArgs {
            repo,
            upstream,
            downstream,
            titles,
            prev_results,
            downstream_prefix,
            ignore,
            followups_only,
            unmerged_only,
            all_files,
        })?,
        Commands::Report { output, repo } => commands::report::run(&output, &repo)?,
        Commands::Summary { outputs } => commands::summary::run(&outputs)?,
    }

    Ok(())
}
