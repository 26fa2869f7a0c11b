use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backoff::with_backoff;
use crate::error::{Error, Result};

/// An inline button attached to a message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageButton {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CreateGroupResponse {
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct InviteLinkResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    delivered: bool,
}

#[derive(Debug, Deserialize)]
struct KnownResponse {
    known: bool,
}

/// Client for the chat platform gateway.
///
/// Group creation is rate-limited upstream, which is why the reconciler
/// prefers repurposing pre-provisioned rooms over calling [`create_group`]
/// during a live round.
///
/// [`create_group`]: ChatClient::create_group
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    bot_key: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, bot_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            bot_key: bot_key.into(),
        }
    }

    /// Create a group chat and return the platform's ID for it.
    pub async fn create_group(&self, name: &str, description: &str) -> Result<String> {
        let response: CreateGroupResponse = self
            .post(
                "groups",
                json!({ "name": name, "description": description }),
            )
            .await?;
        Ok(response.chat_id)
    }

    /// Rename an existing group. Callers treat failure as cosmetic.
    pub async fn rename_group(&self, chat_id: &str, name: &str, description: &str) -> Result<()> {
        self.post::<serde_json::Value>(
            &format!("groups/{chat_id}/rename"),
            json!({ "name": name, "description": description }),
        )
        .await?;
        Ok(())
    }

    /// Grant or revoke elevated (admin) rights in a group.
    pub async fn set_member_role(&self, chat_id: &str, member: &str, elevated: bool) -> Result<()> {
        self.post::<serde_json::Value>(
            &format!("groups/{chat_id}/roles"),
            json!({ "member": member, "elevated": elevated }),
        )
        .await?;
        Ok(())
    }

    /// Add the given chat handles to a group. Handles already present are
    /// ignored by the platform, so this is safe to repeat.
    pub async fn add_members(&self, chat_id: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.post::<serde_json::Value>(
            &format!("groups/{chat_id}/members"),
            json!({ "members": members }),
        )
        .await?;
        Ok(())
    }

    /// A shareable invite link for the group.
    pub async fn invite_link(&self, chat_id: &str) -> Result<String> {
        let response: InviteLinkResponse = self
            .post(&format!("groups/{chat_id}/invite"), json!({}))
            .await?;
        Ok(response.url)
    }

    /// Deliver a message to a chat (group or direct). Returns whether the
    /// platform accepted it for delivery.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        buttons: &[MessageButton],
    ) -> Result<bool> {
        let response: SendMessageResponse = self
            .post(
                "messages",
                json!({ "chat_id": chat_id, "text": text, "buttons": buttons }),
            )
            .await?;
        Ok(response.delivered)
    }

    /// Whether the platform lets the bot address this identity. Platforms
    /// only allow messaging users who have contacted the bot first.
    pub async fn is_known(&self, identity: &str) -> Result<bool> {
        let response: KnownResponse = self
            .post(&format!("users/{identity}/known"), json!({}))
            .await?;
        Ok(response.known)
    }

    async fn post<T>(&self, path: &str, body: serde_json::Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/bot/{}/{}", self.base_url, self.bot_key, path);
        with_backoff(path, || {
            let request = self.http.post(&url).json(&body);
            async move {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<T>()
                    .await
            }
        })
        .await
        .map_err(Error::Chat)
    }
}
