pub mod cli;
pub mod commands;
pub mod dates;
pub mod directory;
pub mod error;
pub mod export;
pub mod fetch;
pub mod prompt;
pub mod retry;
pub mod selection;
pub mod settings;
pub mod slack;
pub mod slack_render;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use cli::{Cli, Commands, ExportArgs};
pub use commands::{run_export, run_init_config, run_list};
pub use error::{AppError, Result};

/// Called with `(current, total, label)` as a long operation progresses.
pub type ProgressCallback<'a> = Option<&'a dyn Fn(usize, usize, &str)>;

/// Reads the Slack token from `SLACK_TOKEN`. The value is never logged.
pub fn load_token() -> Result<String> {
    std::env::var("SLACK_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or(AppError::MissingToken)
}
