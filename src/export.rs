use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::ProgressCallback;
use crate::dates::{DateRange, DisplayZone};
use crate::directory::Directory;
use crate::error::{AppError, Result};
use crate::fetch::ConversationFetcher;
use crate::selection::ConversationTarget;
use crate::slack_render::{RenderMode, render_text};
use crate::thread::{Author, Depth, MergedLine, merge};

const FILE_EXTENSION: &str = "txt";
const REPLY_PREFIX: &str = "    ↳ ";
const UNKNOWN_AUTHOR: &str = "unknown";

/// Keeps letters and digits from any script, `-`, `_` and `.`; anything else
/// becomes `_`.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Where one export run writes its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub resolved: PathBuf,
    /// Sibling directory for raw text, when requested.
    pub unresolved: Option<PathBuf>,
}

impl OutputDirs {
    /// `<root>/output-YYYY-MM-DD-HH-MM`, plus `...-unresolved` when asked for.
    pub fn timestamped(root: &Path, now: DateTime<Local>, save_unresolved: bool) -> Self {
        let name = format!("output-{}", now.format("%Y-%m-%d-%H-%M"));
        let resolved = root.join(&name);
        let unresolved = save_unresolved.then(|| root.join(format!("{name}-unresolved")));
        Self {
            resolved,
            unresolved,
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in std::iter::once(&self.resolved).chain(self.unresolved.as_ref()) {
            fs::create_dir_all(dir).map_err(|e| AppError::WriteFile {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Hands out file names for one export run. The first conversation to claim
/// a stem keeps it; later ones whose stem matches ignoring case get their
/// conversation ID appended, then a counter if that is taken too. Names
/// handed out are unique ignoring case.
#[derive(Debug, Default)]
pub struct FileNamer {
    taken: HashSet<String>,
}

impl FileNamer {
    pub fn file_name(&mut self, target: &ConversationTarget) -> String {
        let base = &target.file_stem;
        let with_id = format!("{base}-{}", safe_name(&target.id.0));
        let mut stem = base.clone();
        let mut attempt = 0u32;
        while !self.taken.insert(stem.to_lowercase()) {
            attempt += 1;
            stem = match attempt {
                1 => with_id.clone(),
                n => format!("{with_id}-{n}"),
            };
        }
        format!("{stem}.{FILE_EXTENSION}")
    }
}

fn author_name<'a>(author: &'a Author, directory: &'a Directory) -> Cow<'a, str> {
    match author {
        Author::User(id) => directory.user_name(id),
        Author::Bot(name) => Cow::Borrowed(name.as_str()),
        Author::Unknown => Cow::Borrowed(UNKNOWN_AUTHOR),
    }
}

/// Renders merged lines as
/// `[YYYY-MM-DD HH:MM:SS] <Author> text`, replies indented with `↳`, each
/// message followed by a blank line. Author names are resolved in both modes.
pub fn render_document(
    lines: &[MergedLine],
    directory: &Directory,
    mode: RenderMode,
    zone: DisplayZone,
) -> String {
    let mut out = String::new();
    for line in lines {
        let message = line.message;
        if line.depth == Depth::Reply {
            out.push_str(REPLY_PREFIX);
        }
        out.push_str(&format!(
            "[{}] <{}> {}\n\n",
            zone.format(message.posted_at),
            author_name(&message.author, directory),
            render_text(&message.text, mode, directory)
        ));
    }
    out
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

#[derive(Debug)]
pub enum Outcome {
    Exported { path: PathBuf, messages: usize },
    Failed(AppError),
}

#[derive(Debug)]
pub struct ConversationReport {
    pub label: String,
    pub outcome: Outcome,
}

/// Per-conversation results of an export run, in export order.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub conversations: Vec<ConversationReport>,
}

impl ExportReport {
    pub fn exported(&self) -> usize {
        self.conversations
            .iter()
            .filter(|c| matches!(c.outcome, Outcome::Exported { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &AppError)> {
        self.conversations.iter().filter_map(|c| match &c.outcome {
            Outcome::Failed(err) => Some((c.label.as_str(), err)),
            Outcome::Exported { .. } => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct Exporter<'a> {
    fetcher: &'a ConversationFetcher<'a>,
    directory: &'a Directory,
    zone: DisplayZone,
}

impl<'a> Exporter<'a> {
    pub fn new(
        fetcher: &'a ConversationFetcher<'a>,
        directory: &'a Directory,
        zone: DisplayZone,
    ) -> Self {
        Self {
            fetcher,
            directory,
            zone,
        }
    }

    /// Exports each target in order. A failed conversation is recorded in the
    /// report and the run moves on to the next one.
    pub fn export(
        &self,
        targets: &[ConversationTarget],
        range: &DateRange,
        dirs: &OutputDirs,
        progress: ProgressCallback,
    ) -> ExportReport {
        let mut namer = FileNamer::default();
        let mut report = ExportReport::default();

        for (index, target) in targets.iter().enumerate() {
            if let Some(cb) = progress {
                cb(index + 1, targets.len(), &target.label);
            }
            let file_name = namer.file_name(target);

            let outcome = match self.export_one(target, range, dirs, &file_name) {
                Ok((path, messages)) => {
                    info!(conversation = %target.label, messages, path = %path.display(), "exported");
                    Outcome::Exported { path, messages }
                }
                Err(err) => {
                    warn!(conversation = %target.label, "export failed: {}", err);
                    Outcome::Failed(err)
                }
            };
            report.conversations.push(ConversationReport {
                label: target.label.clone(),
                outcome,
            });
        }
        report
    }

    fn export_one(
        &self,
        target: &ConversationTarget,
        range: &DateRange,
        dirs: &OutputDirs,
        file_name: &str,
    ) -> Result<(PathBuf, usize)> {
        let threads = self.fetcher.fetch(&target.id, range)?;
        let lines = merge(&threads);

        let path = dirs.resolved.join(file_name);
        let resolved = render_document(&lines, self.directory, RenderMode::Resolved, self.zone);
        write_file(&path, &resolved)?;

        if let Some(unresolved_dir) = &dirs.unresolved {
            let raw = render_document(&lines, self.directory, RenderMode::Raw, self.zone);
            write_file(&unresolved_dir.join(file_name), &raw)?;
        }
        Ok((path, lines.len()))
    }
}
