use std::collections::HashSet;
use std::time::Duration;

use slack_morphism::prelude::SlackChannelId;
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::error::Result;
use crate::export::safe_name;
use crate::fetch::collect_pages;
use crate::retry::Retrier;
use crate::slack::{ListedConversation, SlackApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Channel,
    /// Multi-party DMs behave like channels for selection and naming.
    GroupMessage,
    DirectMessage,
}

/// A conversation the user can pick for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTarget {
    pub id: SlackChannelId,
    pub kind: ConversationKind,
    pub label: String,
    pub file_stem: String,
}

impl ConversationTarget {
    pub fn from_api(conversation: &ListedConversation, directory: &Directory) -> Self {
        let id = conversation.info.id.clone();
        if conversation.is_im() {
            let peer = match &conversation.user {
                Some(user) => directory.user_name(user).into_owned(),
                None => id.0.clone(),
            };
            return Self {
                kind: ConversationKind::DirectMessage,
                label: format!("DM with {peer}"),
                file_stem: format!("dm-{}", safe_name(&peer)),
                id,
            };
        }

        let kind = if conversation.is_mpim() {
            ConversationKind::GroupMessage
        } else {
            ConversationKind::Channel
        };
        let (label, file_stem) = match conversation.info.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => (name.to_string(), safe_name(name)),
            None => (format!("channel_{}", id.0), safe_name(&id.0)),
        };
        Self {
            id,
            kind,
            label,
            file_stem,
        }
    }

    pub fn is_direct_message(&self) -> bool {
        self.kind == ConversationKind::DirectMessage
    }
}

/// Lists every conversation visible to the token, in the order Slack returns
/// them. That order is what list indexes refer to.
pub fn list_conversations(
    api: &dyn SlackApi,
    retrier: &Retrier,
    directory: &Directory,
) -> Result<Vec<ConversationTarget>> {
    let conversations = collect_pages(retrier, "conversations.list", Duration::ZERO, |cursor| {
        api.list_conversations(cursor)
    })?;
    Ok(conversations
        .iter()
        .map(|conversation| ConversationTarget::from_api(conversation, directory))
        .collect())
}

/// How the conversations to export are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Channels,
    DirectMessages,
    /// Comma-separated list indexes, labels or conversation IDs.
    Tokens(String),
}

impl Selection {
    pub fn apply(&self, targets: &[ConversationTarget]) -> Vec<ConversationTarget> {
        match self {
            Selection::All => targets.to_vec(),
            Selection::Channels => targets
                .iter()
                .filter(|t| !t.is_direct_message())
                .cloned()
                .collect(),
            Selection::DirectMessages => targets
                .iter()
                .filter(|t| t.is_direct_message())
                .cloned()
                .collect(),
            Selection::Tokens(tokens) => resolve_tokens(targets, tokens),
        }
    }
}

/// Matches each token against the list index, the label (case-insensitive),
/// then the conversation ID. Unmatched tokens are reported and skipped; a
/// conversation named twice is exported once.
pub fn resolve_tokens(targets: &[ConversationTarget], tokens: &str) -> Vec<ConversationTarget> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for token in tokens.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let Some(target) = find_target(targets, token) else {
            warn!("conversation not found: {}", token);
            continue;
        };
        if seen.insert(target.id.clone()) {
            selected.push(target.clone());
        } else {
            debug!(token, "conversation already selected");
        }
    }
    selected
}

fn find_target<'a>(targets: &'a [ConversationTarget], token: &str) -> Option<&'a ConversationTarget> {
    if let Ok(index) = token.parse::<usize>()
        && let Some(target) = targets.get(index)
    {
        return Some(target);
    }
    let lowered = token.to_lowercase();
    targets
        .iter()
        .find(|t| t.label.to_lowercase() == lowered)
        .or_else(|| targets.iter().find(|t| t.id.0 == token))
}
