//! Script synthesis command.

use std::path::PathBuf;

use clap::Args;
use dailycast_cli::format_bytes;
use tracing::info;

use super::{
    cancel_on_ctrl_c, create_client, get_context, load_script, podcast_options, print_success,
    result_output,
};
use crate::Cli;

/// Render a script into an audio file.
///
/// Example:
///   podcasttts synthesize -f script.json -o episode.mp3
#[derive(Args)]
pub struct SynthesizeCommand {
    /// Use intro music (overrides the context)
    #[arg(long)]
    head_music: bool,
    /// Use outro music (overrides the context)
    #[arg(long)]
    tail_music: bool,
}

impl SynthesizeCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let output = cli
            .output
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("output file is required, use -o flag"))?;

        let ctx = get_context(cli)?;
        let script = load_script(cli)?;
        let client = create_client(&ctx)?;

        let mut opts = podcast_options(&ctx);
        opts.use_head_music |= self.head_music;
        opts.use_tail_music |= self.tail_music;

        if !ctx.name.is_empty() {
            info!("using context: {}", ctx.name);
        }
        info!("segments: {}", script.len());

        let result = client
            .podcast()
            .synthesize_with_cancel(&script, &opts, &PathBuf::from(output), &cancel_on_ctrl_c())
            .await?;

        print_success(&format!(
            "Audio saved to {} ({})",
            result.path.display(),
            format_bytes(result.bytes)
        ));
        result_output(cli).write(&result)
    }
}
