use std::io::{BufRead, Write};

use chrono::NaiveDate;

use crate::dates::parse_date;
use crate::error::Result;
use crate::selection::{ConversationTarget, resolve_tokens};

/// Writes the numbered conversation list used for interactive selection.
pub fn write_conversation_list<W: Write>(out: &mut W, targets: &[ConversationTarget]) -> Result<()> {
    for (index, target) in targets.iter().enumerate() {
        writeln!(out, "{index:3}: {}", target.label)?;
    }
    Ok(())
}

/// Line-oriented questions on a terminal.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Asks `question` and returns the trimmed answer, or an empty string at
    /// end of input.
    pub fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question}")?;
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    /// Lists `targets` and reads a comma-separated selection. An empty answer
    /// selects everything.
    pub fn choose_conversations(
        &mut self,
        targets: &[ConversationTarget],
    ) -> Result<Vec<ConversationTarget>> {
        writeln!(self.output, "Available conversations:")?;
        write_conversation_list(&mut self.output, targets)?;

        let answer = self.ask("Enter conversation indexes or names (comma-separated) [Enter = all]: ")?;
        if answer.is_empty() {
            return Ok(targets.to_vec());
        }
        Ok(resolve_tokens(targets, &answer))
    }

    pub fn ask_date(&mut self, label: &str, default: NaiveDate) -> Result<NaiveDate> {
        let answer = self.ask(&format!("{label} date? [default: {default}]: "))?;
        if answer.is_empty() {
            Ok(default)
        } else {
            parse_date(&answer)
        }
    }
}
