use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::info;

use crate::cli::ExportArgs;
use crate::dates::{DateRange, default_end_date, default_start_date, parse_date};
use crate::directory::Directory;
use crate::error::{AppError, Result};
use crate::export::{ExportReport, Exporter, OutputDirs};
use crate::fetch::{ConversationFetcher, Pacing};
use crate::load_token;
use crate::prompt::{Prompt, write_conversation_list};
use crate::retry::{Retrier, Sleeper, ThreadSleeper};
use crate::selection::list_conversations;
use crate::settings::Settings;
use crate::slack::{SlackApi, SlackWebClient};

fn connect(settings: &Settings) -> Result<SlackWebClient> {
    let token = load_token()?;
    SlackWebClient::new(token, &settings.slack)
}

pub fn run_export(config: &Path, args: &ExportArgs) -> Result<()> {
    let settings = Settings::load_from(config)?;
    let client = connect(&settings)?;

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut prompt = Prompt::new(stdin.lock(), io::stdout());

    let report = export_conversations(&client, &ThreadSleeper, &settings, args, &mut prompt, interactive)?;

    for (label, err) in report.failures() {
        eprintln!("Failed to export {}: {}", label, err);
    }
    let total = report.conversations.len();
    let failed = total - report.exported();
    if failed > 0 {
        return Err(AppError::ExportIncomplete { failed, total });
    }
    Ok(())
}

/// Runs one export against `api`. Questions not answered by `args` are put
/// through `prompt`; dates are only asked for when `ask_dates` is set.
pub fn export_conversations<R: BufRead, W: Write>(
    api: &dyn SlackApi,
    sleeper: &dyn Sleeper,
    settings: &Settings,
    args: &ExportArgs,
    prompt: &mut Prompt<R, W>,
    ask_dates: bool,
) -> Result<ExportReport> {
    let retrier = Retrier::new(settings.retry.policy(), sleeper);

    println!("Loading users and user groups...");
    let directory = Directory::load(api, &retrier);
    println!(
        "Loaded {} users and {} user groups.",
        directory.user_count(),
        directory.group_count()
    );

    let conversations = list_conversations(api, &retrier, &directory)?;
    let targets = match args.selection() {
        Some(selection) => selection.apply(&conversations),
        None => prompt.choose_conversations(&conversations)?,
    };
    if targets.is_empty() {
        return Err(AppError::EmptySelection);
    }

    let start = resolve_date(args.start.as_deref(), "Start", default_start_date(), prompt, ask_dates)?;
    let end = resolve_date(args.end.as_deref(), "End", default_end_date(), prompt, ask_dates)?;
    let range = DateRange::from_dates(start, end, settings.export.timezone)?;

    let root = args
        .output_root
        .as_deref()
        .unwrap_or(&settings.export.output_root);
    let dirs = OutputDirs::timestamped(root, Local::now(), args.save_unresolved);
    dirs.create()?;

    let pacing = Pacing {
        history_page_delay: Duration::from_millis(settings.export.history_page_delay_ms),
        thread_page_delay: match args.thread_sleep {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|e| AppError::InvalidConfig(format!("--thread-sleep {secs}: {e}")))?,
            None => Duration::from_millis(settings.export.thread_page_delay_ms),
        },
    };

    info!(
        conversations = targets.len(),
        %start,
        %end,
        output = %dirs.resolved.display(),
        "starting export"
    );
    println!(
        "Exporting {} conversations from {} to {}...",
        targets.len(),
        start,
        end
    );

    let fetcher = ConversationFetcher::new(api, &retrier, pacing);
    let exporter = Exporter::new(&fetcher, &directory, settings.export.timezone);
    let report = exporter.export(
        &targets,
        &range,
        &dirs,
        Some(&|current, total, label| {
            println!("  [{}/{}] {}", current, total, label);
        }),
    );

    println!(
        "Export completed! {} of {} conversations exported to {}",
        report.exported(),
        report.conversations.len(),
        dirs.resolved.display()
    );
    if let Some(unresolved) = &dirs.unresolved {
        println!("Raw unresolved files saved to {}", unresolved.display());
    }
    Ok(report)
}

fn resolve_date<R: BufRead, W: Write>(
    given: Option<&str>,
    label: &str,
    default: NaiveDate,
    prompt: &mut Prompt<R, W>,
    ask: bool,
) -> Result<NaiveDate> {
    match given {
        Some(s) => parse_date(s),
        None if ask => prompt.ask_date(label, default),
        None => Ok(default),
    }
}

pub fn run_list(config: &Path) -> Result<()> {
    let settings = Settings::load_from(config)?;
    let client = connect(&settings)?;
    let retrier = Retrier::new(settings.retry.policy(), &ThreadSleeper);

    let directory = Directory::load(&client, &retrier);
    let conversations = list_conversations(&client, &retrier, &directory)?;
    write_conversation_list(&mut io::stdout().lock(), &conversations)?;
    Ok(())
}

pub fn run_init_config(config: &Path, force: bool) -> Result<()> {
    if config.exists() && !force {
        return Err(AppError::InvalidConfig(format!(
            "{} already exists, pass --force to overwrite it",
            config.display()
        )));
    }
    Settings::default().save_to(config)?;
    println!("Wrote default settings to {}", config.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use super::*;
    use crate::testing::{
        FakeSlack, RecordingSleeper, api_message, channel, direct_message, user,
    };

    fn settings(root: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.export.output_root = root.to_path_buf();
        settings.export.timezone = crate::dates::DisplayZone::Utc;
        settings
    }

    fn fake() -> FakeSlack {
        FakeSlack::default()
            .with_user_pages(vec![vec![user("U1", "Ada Lovelace")]])
            .with_conversations(vec![channel("C1", "general"), direct_message("D1", "U1")])
            .with_history_pages(
                "C1",
                vec![vec![api_message("1736942400.000000", Some("U1"), "hello <@U1>")]],
            )
            .with_history_pages(
                "D1",
                vec![vec![api_message("1736942460.000000", Some("U1"), "psst")]],
            )
    }

    fn only_output_dir(root: &Path) -> std::path::PathBuf {
        let mut dirs: Vec<_> = fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| !path.to_string_lossy().ends_with("-unresolved"))
            .collect();
        assert_eq!(dirs.len(), 1);
        dirs.remove(0)
    }

    #[test]
    fn test_export_all_with_explicit_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ExportArgs {
            all: true,
            start: Some("2025-01-01".to_string()),
            end: Some("2025-01-31".to_string()),
            save_unresolved: true,
            ..ExportArgs::default()
        };
        let mut output = Vec::new();
        let mut prompt = Prompt::new(Cursor::new(""), &mut output);
        let sleeper = RecordingSleeper::default();

        let report =
            export_conversations(&fake(), &sleeper, &settings(tmp.path()), &args, &mut prompt, true)
                .unwrap();

        assert!(report.is_success());
        assert_eq!(report.exported(), 2);
        let dir = only_output_dir(tmp.path());
        assert_eq!(
            fs::read_to_string(dir.join("general.txt")).unwrap(),
            "[2025-01-15 12:00:00] <Ada Lovelace> hello @Ada Lovelace\n\n"
        );
        assert!(dir.join("dm-Ada_Lovelace.txt").exists());
        let raw_dir = format!("{}-unresolved", dir.display());
        assert_eq!(
            fs::read_to_string(Path::new(&raw_dir).join("general.txt")).unwrap(),
            "[2025-01-15 12:00:00] <Ada Lovelace> hello <@U1>\n\n"
        );
        assert!(output.is_empty());
    }

    #[test]
    fn test_interactive_selection_and_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ExportArgs::default();
        let mut output = Vec::new();
        let mut prompt = Prompt::new(Cursor::new("dm with ada lovelace\n2025-01-01\n2025-01-31\n"), &mut output);
        let sleeper = RecordingSleeper::default();

        let report =
            export_conversations(&fake(), &sleeper, &settings(tmp.path()), &args, &mut prompt, true)
                .unwrap();

        assert_eq!(report.exported(), 1);
        assert_eq!(report.conversations[0].label, "DM with Ada Lovelace");
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("  0: general"));
        assert!(shown.contains("  1: DM with Ada Lovelace"));
        assert!(shown.contains("End date?"));
    }

    #[test]
    fn test_dates_default_without_terminal() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ExportArgs {
            channels: Some("general".to_string()),
            ..ExportArgs::default()
        };
        let mut output = Vec::new();
        let mut prompt = Prompt::new(Cursor::new(""), &mut output);
        let sleeper = RecordingSleeper::default();

        let report =
            export_conversations(&fake(), &sleeper, &settings(tmp.path()), &args, &mut prompt, false)
                .unwrap();

        assert_eq!(report.exported(), 1);
        assert!(output.is_empty());
    }

    #[test]
    fn test_unmatched_selection_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ExportArgs {
            channels: Some("nope".to_string()),
            ..ExportArgs::default()
        };
        let mut output = Vec::new();
        let mut prompt = Prompt::new(Cursor::new(""), &mut output);
        let sleeper = RecordingSleeper::default();

        let err =
            export_conversations(&fake(), &sleeper, &settings(tmp.path()), &args, &mut prompt, false)
                .unwrap_err();

        assert!(matches!(err, AppError::EmptySelection));
        assert!(fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_reversed_dates_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ExportArgs {
            all: true,
            start: Some("2025-02-01".to_string()),
            end: Some("2025-01-01".to_string()),
            ..ExportArgs::default()
        };
        let mut output = Vec::new();
        let mut prompt = Prompt::new(Cursor::new(""), &mut output);
        let sleeper = RecordingSleeper::default();

        let err =
            export_conversations(&fake(), &sleeper, &settings(tmp.path()), &args, &mut prompt, false)
                .unwrap_err();

        assert!(matches!(err, AppError::InvalidDateRange { .. }));
    }

    #[test]
    fn test_negative_thread_sleep_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let args = ExportArgs {
            all: true,
            thread_sleep: Some(-1.0),
            ..ExportArgs::default()
        };
        let mut output = Vec::new();
        let mut prompt = Prompt::new(Cursor::new(""), &mut output);
        let sleeper = RecordingSleeper::default();

        let err =
            export_conversations(&fake(), &sleeper, &settings(tmp.path()), &args, &mut prompt, false)
                .unwrap_err();

        assert!(matches!(err, AppError::InvalidConfig(_)));
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.toml");

        run_init_config(&path, false).unwrap();
        assert!(matches!(
            run_init_config(&path, false).unwrap_err(),
            AppError::InvalidConfig(_)
        ));
        run_init_config(&path, true).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.slack.history_page_limit, 200);
    }
}
