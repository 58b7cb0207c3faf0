use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::selection::Selection;
use crate::settings::SETTINGS_FILE;

#[derive(Parser)]
#[command(name = "slack-export")]
#[command(about = "Export Slack conversations to plain text files")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file path
    #[arg(long, global = true, default_value = SETTINGS_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export conversations in a date range
    Export(ExportArgs),

    /// Print the numbered list of conversations
    List,

    /// Write a settings file with the default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("selection").args(["channels", "all", "all_channels", "all_dms"])))]
pub struct ExportArgs {
    /// Conversation indexes, names or IDs (comma-separated)
    #[arg(long)]
    pub channels: Option<String>,

    /// Export every channel and direct message
    #[arg(long)]
    pub all: bool,

    /// Export every public and private channel
    #[arg(long)]
    pub all_channels: bool,

    /// Export every direct message
    #[arg(long)]
    pub all_dms: bool,

    /// Start date (YYYY-MM-DD), defaults to 2000-01-01
    #[arg(short, long)]
    pub start: Option<String>,

    /// End date (YYYY-MM-DD, inclusive), defaults to tomorrow
    #[arg(short, long)]
    pub end: Option<String>,

    /// Seconds to wait between thread reply pages
    #[arg(long)]
    pub thread_sleep: Option<f64>,

    /// Also write the raw text with IDs left in place
    #[arg(long)]
    pub save_unresolved: bool,

    /// Directory the output folders are created in
    #[arg(short, long)]
    pub output_root: Option<PathBuf>,
}

impl ExportArgs {
    /// The selection given on the command line, if any.
    pub fn selection(&self) -> Option<Selection> {
        if self.all {
            Some(Selection::All)
        } else if self.all_channels {
            Some(Selection::Channels)
        } else if self.all_dms {
            Some(Selection::DirectMessages)
        } else {
            self.channels.clone().map(Selection::Tokens)
        }
    }
}
