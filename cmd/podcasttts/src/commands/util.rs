//! Utility functions for CLI commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dailycast_cli::config::{load_config, Config, Context};
use dailycast_cli::{audio_extension, load_request, Output, OutputFormat};
use dailycast_podcasttts::{AudioConfig, Client, DialogueScript, PodcastOptions, VoiceMap};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::Cli;

const APP_NAME: &str = "podcasttts";

/// Directory used by `daily` when neither the flag nor the context sets one.
pub const DEFAULT_OUTPUT_DIR: &str = "podcasts";

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(APP_NAME, cli.config.as_deref())
}

/// Gets the context configuration to use.
///
/// With no context selected and none current, returns an empty context so
/// that credentials can still come from the environment.
pub fn get_context(cli: &Cli) -> anyhow::Result<Context> {
    let cfg = get_config(cli)?;

    match (cfg.resolve_context(cli.context.as_deref()), &cli.context) {
        (Some(ctx), _) => Ok(ctx.clone()),
        (None, Some(name)) => anyhow::bail!("context '{}' not found", name),
        (None, None) => Ok(Context::default()),
    }
}

/// Requires input file to be provided.
pub fn require_input_file(cli: &Cli) -> anyhow::Result<&str> {
    cli.input
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("input file is required, use -f flag"))
}

/// Loads the dialogue script named by `-f`.
pub fn load_script(cli: &Cli) -> anyhow::Result<DialogueScript> {
    let path = require_input_file(cli)?;
    load_request(path).map_err(|e| anyhow::anyhow!("load script {}: {}", path, e))
}

/// Creates a podcast client from context configuration.
pub fn create_client(ctx: &Context) -> anyhow::Result<Client> {
    let creds = ctx.credentials()?;

    let mut builder = Client::builder(&creds.app_id).access_key(&creds.access_key);

    if !creds.resource_id.is_empty() {
        builder = builder.resource_id(&creds.resource_id);
    }
    if !ctx.endpoint.is_empty() {
        builder = builder.endpoint(&ctx.endpoint);
    }
    if ctx.max_attempts > 0 {
        builder = builder.max_attempts(ctx.max_attempts as u32);
    }
    if ctx.timeout > 0 {
        builder = builder.timeout(Duration::from_secs(ctx.timeout as u64));
    }

    Ok(builder.build()?)
}

/// Synthesis options from context configuration, defaults elsewhere.
pub fn podcast_options(ctx: &Context) -> PodcastOptions {
    let mut voices = VoiceMap::default();
    for (role, voice) in &ctx.speakers {
        voices = voices.with(role, voice);
    }

    let mut audio_config = AudioConfig::default();
    if !ctx.audio_format.is_empty() {
        audio_config.format = ctx.audio_format.clone();
    }
    if ctx.sample_rate > 0 {
        audio_config.sample_rate = ctx.sample_rate;
    }
    audio_config.speech_rate = ctx.speech_rate;

    PodcastOptions {
        voices,
        audio_config,
        use_head_music: ctx.use_head_music,
        use_tail_music: ctx.use_tail_music,
    }
}

/// Date-keyed artifact path: `<dir>/<date>.<ext>`.
pub fn daily_path(dir: &Path, date: &str, format: &str) -> PathBuf {
    dir.join(format!("{}.{}", date, audio_extension(format)))
}

/// Result printer for the global `--json` flag. Results always go to
/// stdout; `-o` names the audio file.
pub fn result_output(cli: &Cli) -> Output {
    Output::new(OutputFormat::from_json_flag(cli.json), None)
}

/// A token cancelled on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current attempt");
            child.cancel();
        }
    });
    token
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints info message.
pub fn print_info(msg: &str) {
    eprintln!("\x1b[34mℹ\x1b[0m {}", msg);
}
