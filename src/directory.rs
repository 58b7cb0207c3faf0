use std::borrow::Cow;
use std::collections::HashMap;

use slack_morphism::prelude::{SlackCursorId, SlackUserGroupId, SlackUserId};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::retry::Retrier;
use crate::slack::{SlackApi, group_display_name, user_display_name};
use crate::slack_render::Reference;

/// Display names for users and user groups, built once per export run.
///
/// Lookups never fail: an identifier missing from the directory (deleted
/// account, external user, unreadable groups) resolves to its raw ID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directory {
    users: HashMap<SlackUserId, String>,
    groups: HashMap<SlackUserGroupId, String>,
}

impl Directory {
    pub fn new(
        users: HashMap<SlackUserId, String>,
        groups: HashMap<SlackUserGroupId, String>,
    ) -> Self {
        Self { users, groups }
    }

    /// Fetches every user and every user group from Slack.
    ///
    /// A listing that fails permanently leaves that half of the directory
    /// partial; the export still runs and unknown IDs render raw.
    pub fn load(api: &dyn SlackApi, retrier: &Retrier) -> Self {
        let users = match fetch_users(api, retrier) {
            Ok(users) => users,
            Err(FetchFailure { partial, error }) => {
                warn!(
                    "users.list failed after {} users, names may be missing: {}",
                    partial.len(),
                    error
                );
                partial
            }
        };

        let groups = match retrier.run("usergroups.list", || api.list_user_groups()) {
            Ok(groups) => groups
                .into_iter()
                .map(|group| {
                    let name = group_display_name(&group);
                    (group.id, name)
                })
                .collect(),
            Err(error) => {
                warn!("usergroups.list failed, group mentions will stay raw: {}", error);
                HashMap::new()
            }
        };

        info!(users = users.len(), groups = groups.len(), "directory loaded");
        Self { users, groups }
    }

    pub fn resolve(&self, reference: &Reference) -> Cow<'_, str> {
        match reference {
            Reference::User(id) => self.user_name(id),
            Reference::UserGroup(id) => self.group_name(id),
        }
    }

    pub fn user_name(&self, id: &SlackUserId) -> Cow<'_, str> {
        match self.users.get(id) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(id.0.clone()),
        }
    }

    pub fn group_name(&self, id: &SlackUserGroupId) -> Cow<'_, str> {
        match self.groups.get(id) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(id.0.clone()),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

struct FetchFailure {
    partial: HashMap<SlackUserId, String>,
    error: AppError,
}

fn fetch_users(
    api: &dyn SlackApi,
    retrier: &Retrier,
) -> std::result::Result<HashMap<SlackUserId, String>, FetchFailure> {
    let mut users = HashMap::new();
    let mut cursor: Option<SlackCursorId> = None;

    loop {
        let page: Result<_> = retrier.run("users.list", || api.list_users(cursor.as_ref()));
        let page = match page {
            Ok(page) => page,
            Err(error) => {
                return Err(FetchFailure {
                    partial: users,
                    error,
                });
            }
        };

        for user in page.items {
            let name = user_display_name(&user);
            users.insert(user.id, name);
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(users)
}
