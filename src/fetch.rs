use std::time::Duration;

use slack_morphism::prelude::{
    SlackChannelId, SlackCursorId, SlackHistoryMessage, SlackMessageEventType, SlackTs,
};
use tracing::{debug, info, warn};

use crate::dates::DateRange;
use crate::error::{AppError, Result};
use crate::retry::Retrier;
use crate::slack::{Page, SlackApi};
use crate::thread::{Message, Thread};

/// Delays between consecutive page requests, to stay under Slack's tier limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pacing {
    pub history_page_delay: Duration,
    pub thread_page_delay: Duration,
}

/// Collects every page of a cursor-paginated listing.
///
/// Each page request runs under the retrier. The walk only stops when Slack
/// returns no cursor; a page that claims `has_more` without a cursor is an
/// error rather than a silently truncated result.
pub fn collect_pages<T, F>(
    retrier: &Retrier,
    operation: &str,
    delay: Duration,
    mut fetch: F,
) -> Result<Vec<T>>
where
    F: FnMut(Option<&SlackCursorId>) -> Result<Page<T>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<SlackCursorId> = None;
    let mut pages = 0usize;

    loop {
        let page = retrier.run(operation, || fetch(cursor.as_ref()))?;
        pages += 1;
        items.extend(page.items);

        match (page.next_cursor, page.has_more) {
            (Some(next), _) => {
                cursor = Some(next);
                retrier.pause(delay);
            }
            (None, true) => {
                return Err(AppError::TruncatedPagination {
                    operation: operation.to_string(),
                });
            }
            (None, false) => break,
        }
    }

    debug!(operation, pages, items = items.len(), "pagination complete");
    Ok(items)
}

pub struct ConversationFetcher<'a> {
    api: &'a dyn SlackApi,
    retrier: &'a Retrier<'a>,
    pacing: Pacing,
}

impl<'a> ConversationFetcher<'a> {
    pub fn new(api: &'a dyn SlackApi, retrier: &'a Retrier<'a>, pacing: Pacing) -> Self {
        Self {
            api,
            retrier,
            pacing,
        }
    }

    /// Fetches the top-level messages of `channel` inside `range` and the
    /// replies of every thread they start.
    pub fn fetch(&self, channel: &SlackChannelId, range: &DateRange) -> Result<Vec<Thread>> {
        let roots = self.fetch_history(channel, range)?;
        let thread_total = roots.iter().filter(|m| m.is_thread_root()).count();
        info!(
            channel = %channel.0,
            messages = roots.len(),
            threads = thread_total,
            "fetched history"
        );

        let mut threads = Vec::with_capacity(roots.len());
        let mut thread_index = 0usize;
        for root in roots {
            let mut thread = Thread::new(root);
            if thread.root.is_thread_root() {
                thread_index += 1;
                debug!(
                    "fetching replies for thread {}/{} ({})",
                    thread_index, thread_total, thread.root.ts.0
                );
                thread.replies = self.fetch_replies(channel, &thread.root.ts)?;
            }
            threads.push(thread);
        }
        Ok(threads)
    }

    fn fetch_history(&self, channel: &SlackChannelId, range: &DateRange) -> Result<Vec<Message>> {
        let raw = collect_pages(
            self.retrier,
            "conversations.history",
            self.pacing.history_page_delay,
            |cursor| self.api.conversation_history(channel, range, cursor),
        )?;

        Ok(raw
            .into_iter()
            .filter(|m| keeps_subtype(m.subtype.as_ref()))
            .filter_map(convert)
            .filter(|m| range.contains(m.posted_at))
            .collect())
    }

    fn fetch_replies(&self, channel: &SlackChannelId, root_ts: &SlackTs) -> Result<Vec<Message>> {
        let raw = collect_pages(
            self.retrier,
            "conversations.replies",
            self.pacing.thread_page_delay,
            |cursor| self.api.conversation_replies(channel, root_ts, cursor),
        )?;

        // Slack repeats the parent at the top of every replies page.
        Ok(raw
            .into_iter()
            .filter(|m| &m.origin.ts != root_ts)
            .filter_map(convert)
            .collect())
    }
}

/// Top-level history keeps plain messages and replies also sent to the
/// channel. Joins, topic changes and bot notices are dropped.
fn keeps_subtype(subtype: Option<&SlackMessageEventType>) -> bool {
    matches!(subtype, None | Some(SlackMessageEventType::ThreadBroadcast))
}

fn convert(message: SlackHistoryMessage) -> Option<Message> {
    let ts = message.origin.ts.0.clone();
    let converted = Message::from_api(message);
    if converted.is_none() {
        warn!(ts = %ts, "skipping message with unparseable timestamp");
    }
    converted
}
