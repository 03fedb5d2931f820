//! The typed REST surface.
//!
//! One [`Http`] instance owns the shared connection pool and the
//! rate-limit governor; every endpoint wrapper below goes through both.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use cord_proto::{
    BotGatewayInfo, Channel, ChannelId, ChannelType, GatewayInfo, Guild, GuildChannel, GuildId,
    Member, Message, MessageId, Role, RoleId, UserId,
};

use crate::error::{RestError, RestResult};
use crate::governor::{RateLimiter, RetryConfig};
use crate::request::Request;
use crate::routes::Route;

/// Bulk delete refuses messages older than this many days.
pub const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bot token, without the `Bot ` prefix.
    pub token: String,
    /// API origin plus `/api`, overridable for tests.
    pub base_url: String,
    /// REST API version in the URL path.
    pub version: u8,
    /// Per-attempt deadline.
    pub request_timeout: Duration,
    /// Governor retry policy.
    pub retry: RetryConfig,
}

impl HttpConfig {
    /// Configuration with platform defaults for the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: "https://discord.com/api".to_string(),
            version: 10,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Override the API base URL (scheme, host, and `/api`).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the REST API version.
    #[must_use]
    pub const fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Override the per-attempt deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the governor retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// The shared HTTPS client behind the rate-limit governor.
#[derive(Debug)]
pub struct Http {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    config: HttpConfig,
    authorization: String,
    user_agent: String,
}

impl Http {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying TLS/connection pool cannot be
    /// initialized.
    pub fn new(config: HttpConfig) -> RestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RestError::Transport(e.to_string()))?;

        let authorization = format!("Bot {}", config.token);
        let user_agent = format!(
            "DiscordBot (https://github.com/cord-rs/cord, {})",
            env!("CARGO_PKG_VERSION")
        );
        let limiter = Arc::new(RateLimiter::new(config.retry.clone()));

        Ok(Self {
            client,
            limiter,
            config,
            authorization,
            user_agent,
        })
    }

    /// The rate-limit governor, for janitor wiring and introspection.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn url(&self, request: &Request) -> String {
        let mut url = format!(
            "{}/v{}{}",
            self.config.base_url,
            self.config.version,
            request.route.path()
        );
        if !request.query.is_empty() {
            let query: Vec<String> = request
                .query
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    async fn attempt(&self, url: &str, request: &Request) -> RestResult<reqwest::Response> {
        let mut builder = self
            .client
            .request(request.route.method(), url)
            .header(AUTHORIZATION, &self.authorization)
            .header(USER_AGENT, &self.user_agent);

        if let Some(reason) = &request.audit_log_reason {
            builder = builder.header("X-Audit-Log-Reason", reason);
        }

        if let Some(attachment) = &request.attachment {
            // Multipart forms are rebuilt per attempt; the buffered bytes
            // make retries byte-identical.
            let mut form = Form::new();
            if let Some(body) = &request.body {
                form = form.text(
                    "payload_json",
                    String::from_utf8_lossy(body).into_owned(),
                );
            }
            form = form.part(
                "file",
                Part::bytes(attachment.bytes.clone()).file_name(attachment.filename.clone()),
            );
            builder = builder.multipart(form);
        } else if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        builder
            .send()
            .await
            .map_err(|e| RestError::from_reqwest(&e))
    }

    /// Submit a request through the governor and surface non-success
    /// statuses as errors.
    ///
    /// # Errors
    ///
    /// Returns the §7 error taxonomy: transport, timeout, HTTP status,
    /// or rate-limit exhaustion.
    pub async fn fire(&self, request: Request) -> RestResult<reqwest::Response> {
        let url = self.url(&request);
        let bucket = request.route.bucket();
        let method = request.route.method();
        trace!(%url, bucket, "submitting request");

        let response = self
            .limiter
            .submit(&bucket, &method, || self.attempt(&url, &request))
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RestError::HttpStatus {
                code: status.as_u16(),
                body,
            })
        }
    }

    async fn fire_json<T: DeserializeOwned>(&self, request: Request) -> RestResult<T> {
        let response = self.fire(request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| RestError::Transport(e.to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn fire_empty(&self, request: Request) -> RestResult<()> {
        self.fire(request).await.map(|_| ())
    }

    // ---- gateway ----

    /// `GET /gateway`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_gateway(&self) -> RestResult<GatewayInfo> {
        self.fire_json(Request::new(Route::GetGateway)).await
    }

    /// `GET /gateway/bot`: the gateway URL plus the recommended shard
    /// count for this bot.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_gateway_bot(&self) -> RestResult<BotGatewayInfo> {
        self.fire_json(Request::new(Route::GetGatewayBot)).await
    }

    // ---- messages ----

    /// Send a message, optionally with a file attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_message(
        &self,
        channel_id: ChannelId,
        params: &CreateMessage,
        attachment: Option<(String, Vec<u8>)>,
    ) -> RestResult<Message> {
        let mut request = Request::new(Route::CreateMessage(channel_id)).json(params)?;
        if let Some((filename, bytes)) = attachment {
            request = request.attach(filename, bytes);
        }
        self.fire_json(request).await
    }

    /// Edit a message's content.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        params: &EditMessage,
    ) -> RestResult<Message> {
        self.fire_json(Request::new(Route::EditMessage(channel_id, message_id)).json(params)?)
            .await
    }

    /// Delete a single message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> RestResult<()> {
        self.fire_empty(Request::new(Route::DeleteMessage(channel_id, message_id)))
            .await
    }

    /// Delete between 2 and 100 messages in one call.
    ///
    /// The batch is validated before any network I/O: every id must be
    /// younger than [`BULK_DELETE_MAX_AGE_DAYS`].
    ///
    /// # Errors
    ///
    /// Returns `MessageTooOld` or `InvalidInput` without touching the
    /// network when validation fails, otherwise any request error.
    pub async fn bulk_delete_messages(
        &self,
        channel_id: ChannelId,
        message_ids: &[MessageId],
    ) -> RestResult<()> {
        validate_bulk_delete(message_ids)?;
        let body = serde_json::json!({ "messages": message_ids });
        self.fire_empty(Request::new(Route::BulkDeleteMessages(channel_id)).json(&body)?)
            .await
    }

    /// Fetch recent messages in a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_messages(
        &self,
        channel_id: ChannelId,
        limit: u8,
    ) -> RestResult<Vec<Message>> {
        self.fire_json(
            Request::new(Route::GetMessages(channel_id)).query("limit", limit.to_string()),
        )
        .await
    }

    /// Show the typing indicator in a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn trigger_typing(&self, channel_id: ChannelId) -> RestResult<()> {
        self.fire_empty(Request::new(Route::TriggerTyping(channel_id)))
            .await
    }

    // ---- channels ----

    /// Fetch a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_channel(&self, channel_id: ChannelId) -> RestResult<Channel> {
        self.fire_json(Request::new(Route::GetChannel(channel_id)))
            .await
    }

    /// Edit a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn edit_channel(
        &self,
        channel_id: ChannelId,
        params: &EditChannel,
        reason: Option<&str>,
    ) -> RestResult<Channel> {
        let mut request = Request::new(Route::EditChannel(channel_id)).json(params)?;
        if let Some(reason) = reason {
            request = request.reason(reason);
        }
        self.fire_json(request).await
    }

    /// Delete a channel, or close a DM.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_channel(&self, channel_id: ChannelId) -> RestResult<Channel> {
        self.fire_json(Request::new(Route::DeleteChannel(channel_id)))
            .await
    }

    /// Create a channel in a guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_guild_channel(
        &self,
        guild_id: GuildId,
        params: &CreateChannel,
    ) -> RestResult<GuildChannel> {
        self.fire_json(Request::new(Route::CreateGuildChannel(guild_id)).json(params)?)
            .await
    }

    /// Open (or reuse) a DM channel with a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_dm(&self, recipient_id: UserId) -> RestResult<Channel> {
        let body = serde_json::json!({ "recipient_id": recipient_id });
        self.fire_json(Request::new(Route::CreateDm).json(&body)?)
            .await
    }

    /// Create an invite to a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_invite(
        &self,
        channel_id: ChannelId,
        params: &CreateInvite,
    ) -> RestResult<serde_json::Value> {
        self.fire_json(Request::new(Route::CreateInvite(channel_id)).json(params)?)
            .await
    }

    // ---- guilds ----

    /// Fetch a guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_guild(&self, guild_id: GuildId) -> RestResult<Guild> {
        self.fire_json(Request::new(Route::GetGuild(guild_id))).await
    }

    /// List a guild's members.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_guild_members(
        &self,
        guild_id: GuildId,
        limit: u16,
    ) -> RestResult<Vec<Member>> {
        self.fire_json(
            Request::new(Route::GetGuildMembers(guild_id)).query("limit", limit.to_string()),
        )
        .await
    }

    /// Remove a member from a guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn kick_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: Option<&str>,
    ) -> RestResult<()> {
        let mut request = Request::new(Route::KickMember(guild_id, user_id));
        if let Some(reason) = reason {
            request = request.reason(reason);
        }
        self.fire_empty(request).await
    }

    /// Ban a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn ban_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        params: &BanMember,
        reason: Option<&str>,
    ) -> RestResult<()> {
        let mut request = Request::new(Route::BanMember(guild_id, user_id)).json(params)?;
        if let Some(reason) = reason {
            request = request.reason(reason);
        }
        self.fire_empty(request).await
    }

    /// Grant a role to a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> RestResult<()> {
        self.fire_empty(Request::new(Route::AddMemberRole(guild_id, user_id, role_id)))
            .await
    }

    /// Revoke a role from a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn remove_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> RestResult<()> {
        self.fire_empty(Request::new(Route::RemoveMemberRole(
            guild_id, user_id, role_id,
        )))
        .await
    }

    /// Create a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_role(&self, guild_id: GuildId, params: &EditRole) -> RestResult<Role> {
        self.fire_json(Request::new(Route::CreateRole(guild_id)).json(params)?)
            .await
    }

    /// Edit a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn edit_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        params: &EditRole,
    ) -> RestResult<Role> {
        self.fire_json(Request::new(Route::EditRole(guild_id, role_id)).json(params)?)
            .await
    }

    /// Delete a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_role(&self, guild_id: GuildId, role_id: RoleId) -> RestResult<()> {
        self.fire_empty(Request::new(Route::DeleteRole(guild_id, role_id)))
            .await
    }

    /// Leave a guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn leave_guild(&self, guild_id: GuildId) -> RestResult<()> {
        self.fire_empty(Request::new(Route::LeaveGuild(guild_id)))
            .await
    }
}

/// Validate a bulk-delete batch without touching the network.
///
/// # Errors
///
/// Returns `InvalidInput` for batches outside 2..=100 ids and
/// `MessageTooOld` for any id older than [`BULK_DELETE_MAX_AGE_DAYS`].
pub fn validate_bulk_delete(message_ids: &[MessageId]) -> RestResult<()> {
    if message_ids.len() < 2 || message_ids.len() > 100 {
        return Err(RestError::InvalidInput(format!(
            "bulk delete takes 2..=100 messages, got {}",
            message_ids.len()
        )));
    }

    let now = Utc::now();
    let cutoff = now - TimeDelta::days(BULK_DELETE_MAX_AGE_DAYS);
    for id in message_ids {
        let created = id.created_at();
        if created < cutoff {
            return Err(RestError::MessageTooOld {
                id: *id,
                age_days: (now - created).num_days(),
            });
        }
    }
    Ok(())
}

/// Body of `POST /channels/{id}/messages`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CreateMessage {
    /// Message text.
    pub content: String,
    /// Read the message aloud.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub tts: bool,
}

/// Body of `PATCH /channels/{id}/messages/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct EditMessage {
    /// New message text.
    pub content: String,
}

/// Body of `PATCH /channels/{id}`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct EditChannel {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// New sort position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// Body of `POST /guilds/{id}/channels`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateChannel {
    /// Channel name.
    pub name: String,
    /// Channel kind.
    #[serde(rename = "type")]
    pub kind: ChannelType,
    /// Channel topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Body of role create/edit.
#[derive(Debug, Clone, Serialize, Default)]
pub struct EditRole {
    /// Role name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Packed RGB color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    /// Permission bitmask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u64>,
    /// Display separately in the member list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hoist: Option<bool>,
    /// Mentionable by everyone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentionable: Option<bool>,
}

/// Body of `POST /channels/{id}/invites`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CreateInvite {
    /// Seconds until expiry; 0 never expires.
    pub max_age: u32,
    /// Maximum uses; 0 is unlimited.
    pub max_uses: u32,
    /// Grant temporary membership.
    pub temporary: bool,
    /// Always mint a new invite.
    pub unique: bool,
}

/// Body of `PUT /guilds/{id}/bans/{id}`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BanMember {
    /// Also delete this many days of messages (0..=7).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_message_days: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cord_proto::id::EPOCH_MS;

    fn id_from_ms_ago(ms_ago: u64) -> MessageId {
        let now_ms = Utc::now().timestamp_millis() as u64;
        MessageId::new((now_ms - EPOCH_MS - ms_ago) << 22)
    }

    #[test]
    fn test_bulk_delete_accepts_recent_messages() {
        let ids = vec![id_from_ms_ago(1_000), id_from_ms_ago(60_000)];
        assert!(validate_bulk_delete(&ids).is_ok());
    }

    #[test]
    fn test_bulk_delete_rejects_old_message() {
        let twenty_days_ms = 20 * 24 * 60 * 60 * 1000;
        let ids = vec![id_from_ms_ago(1_000), id_from_ms_ago(twenty_days_ms)];

        match validate_bulk_delete(&ids) {
            Err(RestError::MessageTooOld { age_days, .. }) => {
                assert_eq!(age_days, 20);
            }
            other => panic!("expected MessageTooOld, got {other:?}"),
        }
    }

    #[test]
    fn test_bulk_delete_rejects_bad_batch_sizes() {
        assert!(matches!(
            validate_bulk_delete(&[id_from_ms_ago(0)]),
            Err(RestError::InvalidInput(_))
        ));

        let too_many: Vec<MessageId> = (0..101).map(|_| id_from_ms_ago(0)).collect();
        assert!(matches!(
            validate_bulk_delete(&too_many),
            Err(RestError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bulk_delete_boundary_just_under_14_days() {
        let almost_14_days_ms = (14 * 24 * 60 * 60 - 60) * 1000;
        let ids = vec![id_from_ms_ago(0), id_from_ms_ago(almost_14_days_ms)];
        assert!(validate_bulk_delete(&ids).is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = HttpConfig::new("tok");
        assert_eq!(config.version, 10);
        assert_eq!(config.base_url, "https://discord.com/api");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_legacy_version() {
        let config = HttpConfig::new("tok").with_version(6);
        assert_eq!(config.version, 6);
    }

    #[test]
    fn test_url_building() {
        let http = Http::new(
            HttpConfig::new("tok").with_base_url("http://127.0.0.1:9/api"),
        )
        .unwrap();
        let request =
            Request::new(Route::GetChannel(ChannelId::new(5))).query("limit", "3".to_string());
        assert_eq!(http.url(&request), "http://127.0.0.1:9/api/v10/channels/5?limit=3");
    }
}
