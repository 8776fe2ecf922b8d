//! CLI commands module.

mod config;
mod convert;
mod daily;
mod synthesize;
mod util;

pub use config::ConfigCommand;
pub use convert::ConvertCommand;
pub use daily::DailyCommand;
pub use synthesize::SynthesizeCommand;

pub(crate) use util::*;
