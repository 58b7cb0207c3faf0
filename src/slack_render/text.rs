use crate::directory::Directory;

use super::references::{ReferenceForm, substitute_references};

/// Whether identifiers in message text are replaced with display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Resolved,
    Raw,
}

/// Renders message text. Never fails: identifiers missing from the directory
/// keep their raw ID inside the usual decoration.
pub fn render_text(text: &str, mode: RenderMode, directory: &Directory) -> String {
    match mode {
        RenderMode::Raw => text.to_string(),
        RenderMode::Resolved => substitute_references(text, |form, reference| {
            let name = directory.resolve(reference);
            match form {
                ReferenceForm::Mention | ReferenceForm::Subteam => format!("@{name}"),
                ReferenceForm::Bare => format!("<{name}>"),
            }
        })
        .into_owned(),
    }
}
