//! Date-keyed daily episode command.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::Args;
use dailycast_cli::format_bytes;
use serde::Serialize;
use tracing::info;

use super::{
    cancel_on_ctrl_c, create_client, daily_path, get_context, load_script, podcast_options,
    print_info, print_success, result_output, DEFAULT_OUTPUT_DIR,
};
use crate::Cli;

/// Render the episode for a date unless it already exists.
///
/// The artifact is `<output-dir>/<date>.<format>`. An existing file is
/// reported and reused without connecting.
///
/// Example:
///   podcasttts daily -f script.json --date 2026-10-19
#[derive(Args)]
pub struct DailyCommand {
    /// Episode date, YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<String>,
    /// Output directory (default: context output_dir, then ./podcasts)
    #[arg(long)]
    output_dir: Option<String>,
}

#[derive(Debug, Serialize)]
struct DailyResult {
    date: String,
    cached: bool,
    path: PathBuf,
    bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    rounds: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
}

/// Validates a YYYY-MM-DD date, defaulting to today.
fn episode_date(date: Option<&str>) -> anyhow::Result<String> {
    match date {
        Some(d) => {
            let parsed = NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("invalid date '{}': {}", d, e))?;
            Ok(parsed.format("%Y-%m-%d").to_string())
        }
        None => Ok(Local::now().date_naive().format("%Y-%m-%d").to_string()),
    }
}

impl DailyCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let ctx = get_context(cli)?;
        let opts = podcast_options(&ctx);
        let date = episode_date(self.date.as_deref())?;

        let dir = match (&self.output_dir, ctx.output_dir.as_str()) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, "") => PathBuf::from(DEFAULT_OUTPUT_DIR),
            (None, dir) => PathBuf::from(dir),
        };
        let path = daily_path(&dir, &date, &opts.audio_config.format);

        if path.exists() {
            let bytes = std::fs::metadata(&path)?.len();
            print_info(&format!("Episode for {} already exists", date));
            return result_output(cli).write(&DailyResult {
                date,
                cached: true,
                path,
                bytes,
                rounds: None,
                attempts: None,
                task_id: None,
            });
        }

        let script = load_script(cli)?;
        let client = create_client(&ctx)?;
        info!("rendering episode {} ({} segments)", date, script.len());

        let result = client
            .podcast()
            .synthesize_with_cancel(&script, &opts, &path, &cancel_on_ctrl_c())
            .await?;

        print_success(&format!(
            "Episode for {} saved to {} ({})",
            date,
            result.path.display(),
            format_bytes(result.bytes)
        ));
        result_output(cli).write(&DailyResult {
            date,
            cached: false,
            path: result.path,
            bytes: result.bytes as u64,
            rounds: Some(result.rounds),
            attempts: Some(result.attempts),
            task_id: Some(result.task_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn date_validation() {
        assert_eq!(episode_date(Some("2026-10-19")).unwrap(), "2026-10-19");
        assert!(episode_date(Some("2026-13-01")).is_err());
        assert!(episode_date(Some("yesterday")).is_err());
        assert_eq!(episode_date(None).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn existing_episode_is_reused_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let episode = dir.path().join("2026-10-19.mp3");
        std::fs::write(&episode, b"cached").unwrap();
        let config = dir.path().join("config.yaml");

        let cli = Cli::try_parse_from([
            "podcasttts",
            "--config",
            config.to_str().unwrap(),
            "daily",
            "--date",
            "2026-10-19",
            "--output-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();

        let crate::Commands::Daily(cmd) = &cli.command else {
            panic!("expected daily");
        };
        // No script, no credentials: only the cache check can succeed.
        cmd.run(&cli).await.unwrap();
        assert_eq!(std::fs::read(&episode).unwrap(), b"cached");
    }
}
