//! Script conversion command (dry run).

use clap::Args;
use dailycast_podcasttts::build_request;

use super::{get_context, load_script, podcast_options, result_output};
use crate::Cli;

/// Print the StartSession request for a script without connecting.
///
/// Example:
///   podcasttts convert -f script.yaml --json
#[derive(Args)]
pub struct ConvertCommand {}

impl ConvertCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let ctx = get_context(cli)?;
        let script = load_script(cli)?;
        let request = build_request(&script, &podcast_options(&ctx))?;
        result_output(cli).write(&request)
    }
}
