//! Configuration management commands.

use clap::{Args, Subcommand};

use dailycast_cli::config::{mask_api_key, Context as CliContext, VolcengineCredentials};

use super::{get_config, print_success};
use crate::Cli;

/// Manage CLI configuration.
///
/// Contexts allow you to manage multiple API configurations,
/// similar to kubectl's context management.
///
/// Configuration is stored in ~/.dailycast/podcasttts/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Add a new context
    #[command(name = "add-context")]
    AddContext(AddContextArgs),
    /// Delete a context
    #[command(name = "delete-context")]
    DeleteContext {
        /// Context name
        name: String,
    },
    /// Set the current context
    #[command(name = "use-context")]
    UseContext {
        /// Context name
        name: String,
    },
    /// Display the current context
    #[command(name = "get-context")]
    GetContext,
    /// List all contexts
    #[command(name = "list-contexts", alias = "get-contexts")]
    ListContexts,
    /// View the current configuration
    View,
}

#[derive(Args)]
struct AddContextArgs {
    /// Context name
    name: String,
    /// App ID (falls back to $VOLCENGINE_APP_ID)
    #[arg(long)]
    app_id: Option<String>,
    /// Access key (falls back to $VOLCENGINE_ACCESS_KEY)
    #[arg(long)]
    access_key: Option<String>,
    /// Resource ID
    #[arg(long)]
    resource_id: Option<String>,
    /// WebSocket endpoint
    #[arg(long)]
    endpoint: Option<String>,
    /// Host voice
    #[arg(long)]
    host_voice: Option<String>,
    /// Guest voice
    #[arg(long)]
    guest_voice: Option<String>,
    /// Audio format (mp3, wav, pcm, ogg_opus)
    #[arg(long)]
    format: Option<String>,
    /// Sample rate in Hz
    #[arg(long)]
    sample_rate: Option<i32>,
    /// Speech rate (-50..100)
    #[arg(long, allow_hyphen_values = true)]
    speech_rate: Option<i32>,
    /// Add intro music
    #[arg(long)]
    head_music: bool,
    /// Add outro music
    #[arg(long)]
    tail_music: bool,
    /// Maximum attempts per episode
    #[arg(long)]
    max_attempts: Option<i32>,
    /// Per-operation timeout in seconds
    #[arg(long)]
    timeout: Option<i32>,
    /// Directory for daily episodes
    #[arg(long)]
    output_dir: Option<String>,
}

impl AddContextArgs {
    fn to_context(&self) -> CliContext {
        let volcengine = if self.app_id.is_some()
            || self.access_key.is_some()
            || self.resource_id.is_some()
        {
            Some(VolcengineCredentials {
                app_id: self.app_id.clone().unwrap_or_default(),
                access_key: self.access_key.clone().unwrap_or_default(),
                resource_id: self.resource_id.clone().unwrap_or_default(),
            })
        } else {
            None
        };

        let mut ctx = CliContext {
            volcengine,
            endpoint: self.endpoint.clone().unwrap_or_default(),
            audio_format: self.format.clone().unwrap_or_default(),
            sample_rate: self.sample_rate.unwrap_or(0),
            speech_rate: self.speech_rate.unwrap_or(0),
            use_head_music: self.head_music,
            use_tail_music: self.tail_music,
            max_attempts: self.max_attempts.unwrap_or(0),
            timeout: self.timeout.unwrap_or(0),
            output_dir: self.output_dir.clone().unwrap_or_default(),
            ..Default::default()
        };
        if let Some(voice) = &self.host_voice {
            ctx.speakers.insert("host".to_string(), voice.clone());
        }
        if let Some(voice) = &self.guest_voice {
            ctx.speakers.insert("guest".to_string(), voice.clone());
        }
        ctx
    }
}

impl ConfigCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::AddContext(args) => {
                let mut cfg = get_config(cli)?;
                cfg.add_context(&args.name, args.to_context())?;
                print_success(&format!("Context \"{}\" added successfully", args.name));
                Ok(())
            }

            ConfigSubcommand::DeleteContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.delete_context(name)?;
                print_success(&format!("Context \"{}\" deleted", name));
                Ok(())
            }

            ConfigSubcommand::UseContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.use_context(name)?;
                print_success(&format!("Switched to context \"{}\"", name));
                Ok(())
            }

            ConfigSubcommand::GetContext => {
                let cfg = get_config(cli)?;
                if cfg.current_context.is_empty() {
                    println!("No current context set");
                } else {
                    println!("{}", cfg.current_context);
                }
                Ok(())
            }

            ConfigSubcommand::ListContexts => {
                let cfg = get_config(cli)?;

                if cfg.contexts.is_empty() {
                    println!("No contexts configured");
                    return Ok(());
                }

                println!(
                    "{:<8} {:<20} {:<20} {:<10}",
                    "CURRENT", "NAME", "APP_ID", "FORMAT"
                );

                for name in cfg.list_contexts() {
                    let Some(ctx) = cfg.get_context(name) else {
                        continue;
                    };
                    let current = if name == cfg.current_context { "*" } else { "" };
                    let app_id = ctx
                        .volcengine
                        .as_ref()
                        .map(|v| v.app_id.as_str())
                        .filter(|s| !s.is_empty())
                        .unwrap_or("-");
                    let format = if ctx.audio_format.is_empty() {
                        "mp3"
                    } else {
                        ctx.audio_format.as_str()
                    };
                    println!("{:<8} {:<20} {:<20} {:<10}", current, name, app_id, format);
                }

                Ok(())
            }

            ConfigSubcommand::View => {
                let cfg = get_config(cli)?;

                println!("Config file: {}", cfg.path().display());
                println!("Current context: {}", cfg.current_context);
                println!("Contexts: {}", cfg.contexts.len());

                for name in cfg.list_contexts() {
                    let Some(ctx) = cfg.get_context(name) else {
                        continue;
                    };
                    println!("\n  {}:", name);
                    if let Some(v) = &ctx.volcengine {
                        if !v.app_id.is_empty() {
                            println!("    App ID: {}", v.app_id);
                        }
                        if !v.access_key.is_empty() {
                            println!("    Access Key: {}", mask_api_key(&v.access_key));
                        }
                        if !v.resource_id.is_empty() {
                            println!("    Resource ID: {}", v.resource_id);
                        }
                    }
                    if !ctx.endpoint.is_empty() {
                        println!("    Endpoint: {}", ctx.endpoint);
                    }
                    let mut roles: Vec<_> = ctx.speakers.iter().collect();
                    roles.sort();
                    for (role, voice) in roles {
                        println!("    Voice ({}): {}", role, voice);
                    }
                    if !ctx.audio_format.is_empty() {
                        println!("    Format: {}", ctx.audio_format);
                    }
                    if ctx.use_head_music || ctx.use_tail_music {
                        println!(
                            "    Music: head={} tail={}",
                            ctx.use_head_music, ctx.use_tail_music
                        );
                    }
                    if ctx.max_attempts > 0 {
                        println!("    Max Attempts: {}", ctx.max_attempts);
                    }
                    if ctx.timeout > 0 {
                        println!("    Timeout: {}s", ctx.timeout);
                    }
                    if !ctx.output_dir.is_empty() {
                        println!("    Output Dir: {}", ctx.output_dir);
                    }
                }

                Ok(())
            }
        }
    }
}
