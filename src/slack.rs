use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::*;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::dates::DateRange;
use crate::error::{AppError, Result};
use crate::settings::SlackSettings;

/// Conversation kinds requested from `conversations.list`.
pub const CONVERSATION_TYPES: [SlackConversationType; 4] = [
    SlackConversationType::Public,
    SlackConversationType::Private,
    SlackConversationType::Im,
    SlackConversationType::Mpim,
];

const CONVERSATIONS_PAGE_LIMIT: u16 = 200;
const USERS_PAGE_LIMIT: u16 = 200;

/// A `conversations.list` entry. Slack sends the other participant of a
/// direct message as `user`, which `SlackChannelInfo` does not carry.
#[derive(Debug, Clone, Deserialize)]
pub struct ListedConversation {
    #[serde(flatten)]
    pub info: SlackChannelInfo,
    #[serde(default)]
    pub user: Option<SlackUserId>,
}

impl ListedConversation {
    pub fn is_im(&self) -> bool {
        self.info.flags.is_im.unwrap_or(false)
    }

    pub fn is_mpim(&self) -> bool {
        self.info.flags.is_mpim.unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct ConversationsListing {
    channels: Vec<ListedConversation>,
    #[serde(default)]
    response_metadata: Option<SlackResponseMetadata>,
}

/// Real name first, then profile names, then the handle, then the ID.
pub fn user_display_name(user: &SlackUser) -> String {
    let profile = user.profile.as_ref();
    [
        user.real_name.as_deref(),
        profile.and_then(|p| p.real_name.as_deref()),
        profile.and_then(|p| p.display_name.as_deref()),
        user.name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|name| !name.trim().is_empty())
    .unwrap_or(user.id.0.as_str())
    .to_string()
}

pub fn group_display_name(group: &SlackUserGroup) -> String {
    [group.name.as_str(), group.handle.as_str()]
        .into_iter()
        .find(|name| !name.trim().is_empty())
        .unwrap_or(group.id.0.as_str())
        .to_string()
}

/// One page of a cursor-paginated Slack listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<SlackCursorId>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Slack marks the last page with an empty `next_cursor`.
    fn from_response(items: Vec<T>, metadata: Option<SlackResponseMetadata>, has_more: bool) -> Self {
        let next_cursor = metadata
            .and_then(|meta| meta.next_cursor)
            .filter(|cursor| !cursor.0.is_empty());
        Self {
            items,
            next_cursor,
            has_more,
        }
    }
}

/// The read operations the exporter needs from Slack.
pub trait SlackApi {
    fn list_users(&self, cursor: Option<&SlackCursorId>) -> Result<Page<SlackUser>>;

    fn list_user_groups(&self) -> Result<Vec<SlackUserGroup>>;

    fn list_conversations(&self, cursor: Option<&SlackCursorId>) -> Result<Page<ListedConversation>>;

    fn conversation_history(
        &self,
        channel: &SlackChannelId,
        range: &DateRange,
        cursor: Option<&SlackCursorId>,
    ) -> Result<Page<SlackHistoryMessage>>;

    fn conversation_replies(
        &self,
        channel: &SlackChannelId,
        thread_ts: &SlackTs,
        cursor: Option<&SlackCursorId>,
    ) -> Result<Page<SlackHistoryMessage>>;
}

/// Slack Web API client. Each call runs to completion on a private tokio
/// runtime, so callers stay synchronous.
pub struct SlackWebClient {
    runtime: Runtime,
    client: SlackClient<SlackClientHyperHttpsConnector>,
    token: SlackApiToken,
    api_url: String,
    timeout: Duration,
    history_page_limit: u16,
    replies_page_limit: u16,
}

impl fmt::Debug for SlackWebClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackWebClient")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl SlackWebClient {
    pub fn new(token: String, settings: &SlackSettings) -> Result<Self> {
        // ring comes in through slack-morphism and aws-lc through our rustls
        // pin, so rustls cannot pick a provider on its own. An Err here only
        // means one is already installed.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let api_url = settings.api_base_url.trim_end_matches('/').to_string();
        let connector = SlackClientHyperConnector::new()
            .map_err(|e| AppError::Network(format!("TLS setup failed: {e}")))?
            .with_slack_api_url(&api_url);

        Ok(Self {
            runtime: Runtime::new()?,
            client: SlackClient::new(connector),
            token: SlackApiToken::new(SlackApiTokenValue(token)),
            api_url,
            timeout: Duration::from_secs(settings.request_timeout_secs),
            history_page_limit: settings.history_page_limit,
            replies_page_limit: settings.replies_page_limit,
        })
    }

    fn block_on<T>(
        &self,
        method: &str,
        call: impl Future<Output = std::result::Result<T, SlackClientError>>,
    ) -> Result<T> {
        debug!(method, "calling Slack API");
        let timeout = self.timeout;
        match self
            .runtime
            .block_on(async move { tokio::time::timeout(timeout, call).await })
        {
            Ok(response) => response.map_err(AppError::from),
            Err(_) => Err(AppError::Network(format!(
                "{method}: no response after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

impl SlackApi for SlackWebClient {
    fn list_users(&self, cursor: Option<&SlackCursorId>) -> Result<Page<SlackUser>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiUsersListRequest::new()
            .with_limit(USERS_PAGE_LIMIT)
            .opt_cursor(cursor.cloned());

        let response = self.block_on("users.list", session.users_list(&request))?;
        Ok(Page::from_response(response.members, response.response_metadata, false))
    }

    fn list_user_groups(&self) -> Result<Vec<SlackUserGroup>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiUserGroupsListRequest::new();

        let response = self.block_on("usergroups.list", session.usergroups_list(&request))?;
        Ok(response.usergroups)
    }

    fn list_conversations(&self, cursor: Option<&SlackCursorId>) -> Result<Page<ListedConversation>> {
        let session = self.client.open_session(&self.token);
        let types = CONVERSATION_TYPES
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let limit = CONVERSATIONS_PAGE_LIMIT.to_string();
        let params = vec![
            ("cursor", cursor.map(|c| c.0.as_str())),
            ("limit", Some(limit.as_str())),
            ("exclude_archived", Some("false")),
            ("types", Some(types.as_str())),
        ];

        let listing: ConversationsListing = self.block_on(
            "conversations.list",
            session
                .http_session_api
                .http_get("conversations.list", &params, None),
        )?;
        Ok(Page::from_response(listing.channels, listing.response_metadata, false))
    }

    fn conversation_history(
        &self,
        channel: &SlackChannelId,
        range: &DateRange,
        cursor: Option<&SlackCursorId>,
    ) -> Result<Page<SlackHistoryMessage>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiConversationsHistoryRequest::new()
            .with_channel(channel.clone())
            .with_oldest(SlackTs(range.oldest().to_api_string()))
            .with_latest(SlackTs(range.latest().to_api_string()))
            .with_inclusive(true)
            .with_limit(self.history_page_limit)
            .opt_cursor(cursor.cloned());

        let response = self.block_on("conversations.history", session.conversations_history(&request))?;
        Ok(Page::from_response(
            response.messages,
            response.response_metadata,
            response.has_more.unwrap_or(false),
        ))
    }

    fn conversation_replies(
        &self,
        channel: &SlackChannelId,
        thread_ts: &SlackTs,
        cursor: Option<&SlackCursorId>,
    ) -> Result<Page<SlackHistoryMessage>> {
        let session = self.client.open_session(&self.token);
        let request = SlackApiConversationsRepliesRequest::new(channel.clone(), thread_ts.clone())
            .with_limit(self.replies_page_limit)
            .opt_cursor(cursor.cloned());

        let response = self.block_on("conversations.replies", session.conversations_replies(&request))?;
        Ok(Page::from_response(
            response.messages,
            response.response_metadata,
            response.has_more.unwrap_or(false),
        ))
    }
}
