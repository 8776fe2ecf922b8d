//! Podcast TTS CLI - renders dialogue scripts into podcast audio.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ConfigCommand, ConvertCommand, DailyCommand, SynthesizeCommand};

/// Podcast TTS CLI - renders dialogue scripts into podcast audio.
///
/// Scripts are JSON or YAML documents of the form
/// `{"segments": [{"speaker": "host", "text": "..."}]}`. Each segment
/// becomes one synthesis round; a dropped connection resumes from the last
/// finished round instead of starting over.
///
/// Configuration is stored in ~/.dailycast/podcasttts/ and supports multiple
/// contexts, similar to kubectl's context management.
#[derive(Parser)]
#[command(name = "podcasttts")]
#[command(about = "Resumable podcast synthesis CLI")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.dailycast/podcasttts/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Context name to use
    #[arg(short = 'c', long, global = true)]
    pub context: Option<String>,

    /// Output file
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Input script file (YAML or JSON, `-` for stdin)
    #[arg(short = 'f', long = "file", global = true)]
    pub input: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage CLI configuration
    Config(ConfigCommand),
    /// Render a script into an audio file
    Synthesize(SynthesizeCommand),
    /// Render today's episode unless it already exists
    Daily(DailyCommand),
    /// Print the synthesis request for a script without connecting
    Convert(ConvertCommand),
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Both ring and aws-lc may be linked; pick one for wss://.
    let _ = rustls::crypto::ring::default_provider().install_default();

    match &cli.command {
        Commands::Config(cmd) => cmd.run(&cli).await,
        Commands::Synthesize(cmd) => cmd.run(&cli).await,
        Commands::Daily(cmd) => cmd.run(&cli).await,
        Commands::Convert(cmd) => cmd.run(&cli).await,
    }
}
