use slack_morphism::prelude::{SlackHistoryMessage, SlackTs, SlackUserId};

use crate::dates::Timestamp;

/// Who posted a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    User(SlackUserId),
    /// Integrations and bots that post with a username instead of a user ID.
    Bot(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub ts: SlackTs,
    pub posted_at: Timestamp,
    pub author: Author,
    pub text: String,
    pub thread_ts: Option<SlackTs>,
    pub reply_count: u32,
}

impl Message {
    /// Converts a wire message, returning `None` when its timestamp cannot be
    /// parsed.
    pub fn from_api(message: SlackHistoryMessage) -> Option<Self> {
        let posted_at = Timestamp::from_slack_ts(&message.origin.ts)?;
        let author = match (message.sender.user, message.sender.username) {
            (Some(user), _) => Author::User(user),
            (None, Some(name)) if !name.is_empty() => Author::Bot(name),
            _ => Author::Unknown,
        };
        Some(Self {
            ts: message.origin.ts,
            posted_at,
            author,
            text: message.content.text.unwrap_or_default(),
            thread_ts: message.origin.thread_ts,
            reply_count: message
                .parent
                .reply_count
                .map_or(0, |count| u32::try_from(count).unwrap_or(u32::MAX)),
        })
    }

    /// A thread parent carries its own timestamp as `thread_ts`. A reply count
    /// of zero means every reply was deleted.
    pub fn is_thread_root(&self) -> bool {
        self.thread_ts.as_ref() == Some(&self.ts) && self.reply_count > 0
    }
}

/// A top-level message and the replies posted under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub root: Message,
    pub replies: Vec<Message>,
}

impl Thread {
    pub fn new(root: Message) -> Self {
        Self {
            root,
            replies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Root,
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedLine<'a> {
    pub depth: Depth,
    pub message: &'a Message,
}

/// Flattens threads into display order: roots oldest first, each followed by
/// its replies oldest first. Sorting is stable, so messages sharing a
/// timestamp keep the order they were fetched in.
pub fn merge(threads: &[Thread]) -> Vec<MergedLine<'_>> {
    let mut roots: Vec<&Thread> = threads.iter().collect();
    roots.sort_by_key(|thread| thread.root.posted_at);

    let mut lines = Vec::with_capacity(threads.iter().map(|t| 1 + t.replies.len()).sum());
    for thread in roots {
        lines.push(MergedLine {
            depth: Depth::Root,
            message: &thread.root,
        });

        let mut replies: Vec<&Message> = thread.replies.iter().collect();
        replies.sort_by_key(|reply| reply.posted_at);
        lines.extend(replies.into_iter().map(|message| MergedLine {
            depth: Depth::Reply,
            message,
        }));
    }
    lines
}
