use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use slack_morphism::prelude::*;

/// An identifier embedded in Slack message markup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    User(SlackUserId),
    UserGroup(SlackUserGroupId),
}

/// The lexical form a reference was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceForm {
    /// `<!subteam^S123>`
    Subteam,
    /// `<@U123>`
    Mention,
    /// `<U123>`, seen in older exports and logs
    Bare,
}

struct ReferenceRule {
    form: ReferenceForm,
    group: &'static str,
    pattern: &'static str,
}

/// Ordered by precedence: at any position the first matching rule wins.
const RULES: [ReferenceRule; 3] = [
    ReferenceRule {
        form: ReferenceForm::Subteam,
        group: "subteam",
        pattern: r"<!subteam\^(?P<subteam>[A-Z0-9]+)>",
    },
    ReferenceRule {
        form: ReferenceForm::Mention,
        group: "mention",
        pattern: r"<@(?P<mention>[UW][A-Z0-9]+)>",
    },
    ReferenceRule {
        form: ReferenceForm::Bare,
        group: "bare",
        pattern: r"<(?P<bare>U[A-Z0-9]+)>",
    },
];

// Leftmost-first alternation keeps the rule order as the tie breaker.
#[allow(clippy::expect_used)] // built from the constant RULES table
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = RULES
        .iter()
        .map(|rule| format!("(?:{})", rule.pattern))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).expect("reference patterns are valid")
});

fn classify(caps: &Captures) -> Option<(ReferenceForm, Reference)> {
    RULES.iter().find_map(|rule| {
        let id = caps.name(rule.group)?.as_str().to_string();
        let reference = match rule.form {
            ReferenceForm::Subteam => Reference::UserGroup(SlackUserGroupId(id)),
            ReferenceForm::Mention | ReferenceForm::Bare => Reference::User(SlackUserId(id)),
        };
        Some((rule.form, reference))
    })
}

/// Rewrites every recognized reference in `text` in a single left-to-right
/// pass. Anything that does not match a rule is copied through untouched.
pub fn substitute_references<F>(text: &str, mut replace: F) -> Cow<'_, str>
where
    F: FnMut(ReferenceForm, &Reference) -> String,
{
    REFERENCE_PATTERN.replace_all(text, |caps: &Captures| match classify(caps) {
        Some((form, reference)) => replace(form, &reference),
        None => caps.get(0).map_or_else(String::new, |m| m.as_str().to_string()),
    })
}
