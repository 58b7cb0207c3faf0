//! In-memory Slack API and helpers shared by unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use slack_morphism::prelude::*;

use crate::dates::DateRange;
use crate::error::{AppError, Result};
use crate::retry::Sleeper;
use crate::slack::{ListedConversation, Page, SlackApi};
use crate::thread::Message;

/// Records requested sleeps instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pub slept: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// Failures scripted for one paginated stream: a channel's history or one
/// thread's replies.
#[derive(Debug, Default)]
struct Script {
    truncated: bool,
    rate_limits: HashMap<usize, Option<u64>>,
    network_failures: u32,
    requests: Vec<usize>,
}

impl Script {
    /// Records a request for page `index` and returns the scripted failure,
    /// if any. A scripted rate limit fires once.
    fn request(&mut self, index: usize) -> Result<()> {
        self.requests.push(index);
        if self.network_failures > 0 {
            self.network_failures -= 1;
            return Err(AppError::Network("connection reset by peer".to_string()));
        }
        if let Some(retry_after_secs) = self.rate_limits.remove(&index) {
            return Err(AppError::SlackRateLimit { retry_after_secs });
        }
        Ok(())
    }
}

type ThreadKey = (String, String);

/// Scripted Slack workspace. Pages are addressed by cursors of the form
/// `page-N`; every method call is counted by its Web API name.
#[derive(Debug, Default)]
pub struct FakeSlack {
    user_pages: Vec<Vec<SlackUser>>,
    groups: Vec<SlackUserGroup>,
    group_error: Option<String>,
    conversation_pages: Vec<Vec<ListedConversation>>,
    history: HashMap<String, Vec<Vec<SlackHistoryMessage>>>,
    replies: HashMap<ThreadKey, Vec<Vec<SlackHistoryMessage>>>,
    history_errors: HashMap<String, String>,
    history_scripts: RefCell<HashMap<String, Script>>,
    reply_scripts: RefCell<HashMap<ThreadKey, Script>>,
    calls: RefCell<HashMap<String, usize>>,
}

fn thread_key(channel: &str, thread_ts: &str) -> ThreadKey {
    (channel.to_string(), thread_ts.to_string())
}

impl FakeSlack {
    pub fn with_user_pages(mut self, pages: Vec<Vec<SlackUser>>) -> Self {
        self.user_pages = pages;
        self
    }

    pub fn with_groups(mut self, groups: Vec<SlackUserGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_group_error(mut self, code: &str) -> Self {
        self.group_error = Some(code.to_string());
        self
    }

    pub fn with_conversations(mut self, conversations: Vec<ListedConversation>) -> Self {
        self.conversation_pages = vec![conversations];
        self
    }

    pub fn with_conversation_pages(mut self, pages: Vec<Vec<ListedConversation>>) -> Self {
        self.conversation_pages = pages;
        self
    }

    pub fn with_history_pages(mut self, channel: &str, pages: Vec<Vec<SlackHistoryMessage>>) -> Self {
        self.history.insert(channel.to_string(), pages);
        self
    }

    pub fn with_reply_pages(
        mut self,
        channel: &str,
        thread_ts: &str,
        pages: Vec<Vec<SlackHistoryMessage>>,
    ) -> Self {
        self.replies.insert(thread_key(channel, thread_ts), pages);
        self
    }

    /// Every history request for `channel` fails with the given Slack error code.
    pub fn with_history_error(mut self, channel: &str, code: &str) -> Self {
        self.history_errors
            .insert(channel.to_string(), code.to_string());
        self
    }

    fn history_script(&mut self, channel: &str) -> &mut Script {
        self.history_scripts
            .get_mut()
            .entry(channel.to_string())
            .or_default()
    }

    fn reply_script(&mut self, channel: &str, thread_ts: &str) -> &mut Script {
        self.reply_scripts
            .get_mut()
            .entry(thread_key(channel, thread_ts))
            .or_default()
    }

    /// The last history page claims `has_more` without handing out a cursor.
    pub fn with_truncated_history(mut self, channel: &str) -> Self {
        self.history_script(channel).truncated = true;
        self
    }

    /// The first request for history page `page` (0-based) is rate limited.
    pub fn with_rate_limit_on_history_page(
        mut self,
        channel: &str,
        page: usize,
        retry_after_secs: Option<u64>,
    ) -> Self {
        self.history_script(channel)
            .rate_limits
            .insert(page, retry_after_secs);
        self
    }

    /// The next `count` history requests for `channel` fail with a network error.
    pub fn with_network_failures_on_history(mut self, channel: &str, count: u32) -> Self {
        self.history_script(channel).network_failures = count;
        self
    }

    /// The last replies page of the thread claims `has_more` without a cursor.
    pub fn with_truncated_replies(mut self, channel: &str, thread_ts: &str) -> Self {
        self.reply_script(channel, thread_ts).truncated = true;
        self
    }

    /// The first request for replies page `page` (0-based) of the thread is
    /// rate limited.
    pub fn with_rate_limit_on_reply_page(
        mut self,
        channel: &str,
        thread_ts: &str,
        page: usize,
        retry_after_secs: Option<u64>,
    ) -> Self {
        self.reply_script(channel, thread_ts)
            .rate_limits
            .insert(page, retry_after_secs);
        self
    }

    /// The next `count` replies requests for the thread fail with a network error.
    pub fn with_network_failures_on_replies(
        mut self,
        channel: &str,
        thread_ts: &str,
        count: u32,
    ) -> Self {
        self.reply_script(channel, thread_ts).network_failures = count;
        self
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.borrow().get(method).copied().unwrap_or(0)
    }

    /// Page indexes requested from `conversations.history`, in request order.
    pub fn history_page_requests(&self, channel: &str) -> Vec<usize> {
        self.history_scripts
            .borrow()
            .get(channel)
            .map(|script| script.requests.clone())
            .unwrap_or_default()
    }

    /// Page indexes requested from `conversations.replies` for one thread.
    pub fn reply_page_requests(&self, channel: &str, thread_ts: &str) -> Vec<usize> {
        self.reply_scripts
            .borrow()
            .get(&thread_key(channel, thread_ts))
            .map(|script| script.requests.clone())
            .unwrap_or_default()
    }

    fn record(&self, method: &str) {
        *self.calls.borrow_mut().entry(method.to_string()).or_insert(0) += 1;
    }
}

fn page_index(cursor: Option<&SlackCursorId>) -> usize {
    cursor
        .and_then(|c| c.0.strip_prefix("page-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn page_of<T: Clone>(pages: &[Vec<T>], index: usize, truncated: bool) -> Page<T> {
    let items = pages.get(index).cloned().unwrap_or_default();
    let next_cursor =
        (index + 1 < pages.len()).then(|| SlackCursorId(format!("page-{}", index + 1)));
    let has_more = next_cursor.is_some() || truncated;
    Page {
        items,
        next_cursor,
        has_more,
    }
}

impl SlackApi for FakeSlack {
    fn list_users(&self, cursor: Option<&SlackCursorId>) -> Result<Page<SlackUser>> {
        self.record("users.list");
        Ok(page_of(&self.user_pages, page_index(cursor), false))
    }

    fn list_user_groups(&self) -> Result<Vec<SlackUserGroup>> {
        self.record("usergroups.list");
        match &self.group_error {
            Some(code) => Err(AppError::from_slack_error(code)),
            None => Ok(self.groups.clone()),
        }
    }

    fn list_conversations(&self, cursor: Option<&SlackCursorId>) -> Result<Page<ListedConversation>> {
        self.record("conversations.list");
        Ok(page_of(&self.conversation_pages, page_index(cursor), false))
    }

    fn conversation_history(
        &self,
        channel: &SlackChannelId,
        _range: &DateRange,
        cursor: Option<&SlackCursorId>,
    ) -> Result<Page<SlackHistoryMessage>> {
        self.record("conversations.history");
        let index = page_index(cursor);
        let mut scripts = self.history_scripts.borrow_mut();
        let script = scripts.entry(channel.0.clone()).or_default();
        script.request(index)?;

        if let Some(code) = self.history_errors.get(&channel.0) {
            return Err(AppError::from_slack_error(code));
        }
        let pages = self
            .history
            .get(&channel.0)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let truncated = script.truncated && index + 1 >= pages.len();
        Ok(page_of(pages, index, truncated))
    }

    fn conversation_replies(
        &self,
        channel: &SlackChannelId,
        thread_ts: &SlackTs,
        cursor: Option<&SlackCursorId>,
    ) -> Result<Page<SlackHistoryMessage>> {
        self.record("conversations.replies");
        let index = page_index(cursor);
        let key = thread_key(&channel.0, &thread_ts.0);
        let mut scripts = self.reply_scripts.borrow_mut();
        let script = scripts.entry(key.clone()).or_default();
        script.request(index)?;

        let pages = self.replies.get(&key).map(Vec::as_slice).unwrap_or_default();
        let truncated = script.truncated && index + 1 >= pages.len();
        Ok(page_of(pages, index, truncated))
    }
}

pub fn user_id(id: &str) -> SlackUserId {
    SlackUserId(id.to_string())
}

#[allow(clippy::unwrap_used)]
pub fn user(id: &str, real_name: &str) -> SlackUser {
    serde_json::from_value(json!({"id": id, "real_name": real_name})).unwrap()
}

#[allow(clippy::unwrap_used)]
pub fn group(id: &str, name: &str) -> SlackUserGroup {
    serde_json::from_value(json!({
        "id": id,
        "team_id": "T1",
        "name": name,
        "handle": "",
        "is_external": false,
        "date_create": 1700000000,
        "created_by": "U0",
        "prefs": {"channels": [], "groups": []},
        "user_count": 0
    }))
    .unwrap()
}

#[allow(clippy::unwrap_used)]
pub fn channel(id: &str, name: &str) -> ListedConversation {
    serde_json::from_value(json!({
        "id": id,
        "created": 1700000000,
        "name": name,
        "is_channel": true
    }))
    .unwrap()
}

#[allow(clippy::unwrap_used)]
pub fn direct_message(id: &str, with_user: &str) -> ListedConversation {
    serde_json::from_value(json!({
        "id": id,
        "created": 1700000000,
        "is_im": true,
        "user": with_user
    }))
    .unwrap()
}

pub fn api_message(ts: &str, user: Option<&str>, text: &str) -> SlackHistoryMessage {
    SlackHistoryMessage::new(
        SlackMessageOrigin::new(SlackTs(ts.to_string())),
        SlackMessageContent::new().with_text(text.to_string()),
        SlackMessageSender::new().opt_user(user.map(user_id)),
        SlackParentMessageParams::new(),
    )
}

pub fn thread_root(ts: &str, user: &str, text: &str, reply_count: usize) -> SlackHistoryMessage {
    let mut message = api_message(ts, Some(user), text);
    message.origin.thread_ts = Some(SlackTs(ts.to_string()));
    message.parent.reply_count = Some(reply_count);
    message
}

#[allow(clippy::unwrap_used)]
pub fn message(ts: &str, user: &str, text: &str) -> Message {
    Message::from_api(api_message(ts, Some(user), text)).unwrap()
}
