//! Rendering of Slack message markup into plain text.
//!
//! Slack encodes mentions as `<@U123>` and group mentions as
//! `<!subteam^S123>`; `references` recognizes those tokens and `text` turns
//! them into display names.

pub mod references;
pub mod text;

pub use references::{Reference, ReferenceForm, substitute_references};
pub use text::{RenderMode, render_text};
