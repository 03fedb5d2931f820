//! The client facade.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use cord_cache::{Cache, CachedGuild, EventDispatcher};
use cord_gateway::{GatewayError, ShardEvent, ShardManager, ShardState};
use cord_proto::{
    Activity, Channel, ChannelId, CurrentUser, Event, EventKind, Guild, GuildId, Message,
    MessageId, OnlineStatus, RoleId, StatusUpdate, UserId, VoiceServerInfo,
};
use cord_rest::{
    governor::JANITOR_INTERVAL, CreateChannel, CreateMessage, EditChannel, EditMessage, EditRole,
    Http, HttpConfig, RateLimiter,
};

use crate::config::Config;
use crate::error::ClientError;

/// The running subsystems, created by [`Client::start`].
struct Runtime {
    cache: Arc<Cache>,
    manager: Arc<ShardManager>,
    pump: tokio::task::JoinHandle<()>,
}

/// A bot client: sharded gateway, governed REST, cache, and listeners.
pub struct Client {
    config: Config,
    http: Arc<Http>,
    dispatcher: Arc<EventDispatcher>,
    runtime: Runtime,
    voice_updates: Mutex<Option<mpsc::UnboundedReceiver<VoiceServerInfo>>>,
    shard_errors: Mutex<Option<mpsc::UnboundedReceiver<(u64, GatewayError)>>>,
}

impl Client {
    /// Start a bot: fetch the gateway endpoint, resolve the shard count,
    /// spawn the fleet, and run the dispatch pump.
    ///
    /// # Errors
    ///
    /// Returns an error if the REST client cannot be built or the
    /// `/gateway/bot` call fails.
    pub async fn start(config: Config) -> Result<Self, ClientError> {
        let mut http_config = HttpConfig::new(config.token.clone())
            .with_retry(config.rest_retry.clone())
            .with_version(config.gateway_version.as_u8());
        if let Some(base_url) = &config.rest_base_url {
            http_config = http_config.with_base_url(base_url.clone());
        }
        let http = Arc::new(Http::new(http_config)?);
        RateLimiter::spawn_janitor(http.limiter(), JANITOR_INTERVAL);

        let info = http.get_gateway_bot().await?;
        let shard_count = config.shards.resolve(info.shards);
        let gateway_url = config.gateway_url.clone().unwrap_or(info.url);
        info!(shard_count, %gateway_url, "starting gateway fleet");

        let cache = Arc::new(Cache::new(shard_count));
        let dispatcher = Arc::new(EventDispatcher::new());

        let (manager, events_rx) =
            ShardManager::new(config.gateway_config(), gateway_url, shard_count);
        manager.spawn_all();
        let manager = Arc::new(manager);

        let (voice_tx, voice_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(dispatch_pump(
            events_rx,
            Arc::clone(&cache),
            Arc::clone(&dispatcher),
            voice_tx,
            error_tx,
        ));

        Ok(Self {
            config,
            http,
            dispatcher,
            runtime: Runtime {
                cache,
                manager,
                pump,
            },
            voice_updates: Mutex::new(Some(voice_rx)),
            shard_errors: Mutex::new(Some(error_rx)),
        })
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The cache handle; safe to hand to listeners.
    #[must_use]
    pub fn cache(&self) -> Arc<Cache> {
        Arc::clone(&self.runtime.cache)
    }

    /// The REST handle; safe to hand to workers.
    #[must_use]
    pub fn http(&self) -> Arc<Http> {
        Arc::clone(&self.http)
    }

    // ---- listeners ----

    /// Register a listener for one event kind.
    ///
    /// Listeners run synchronously on the dispatch task, in registration
    /// order, after the cache mutation for the event has been applied.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.on(kind, listener);
    }

    /// Register a listener for every event.
    pub fn on_any<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.on_any(listener);
    }

    /// Take the stream of `VOICE_SERVER_UPDATE` payloads, for the voice
    /// subsystem. Yields `None` on the second call.
    #[must_use]
    pub fn voice_server_updates(&self) -> Option<mpsc::UnboundedReceiver<VoiceServerInfo>> {
        self.voice_updates.lock().ok()?.take()
    }

    /// Take the stream of fatal shard errors. Yields `None` on the
    /// second call.
    #[must_use]
    pub fn shard_errors(&self) -> Option<mpsc::UnboundedReceiver<(u64, GatewayError)>> {
        self.shard_errors.lock().ok()?.take()
    }

    // ---- cache getters ----

    /// The bot's own user.
    ///
    /// # Errors
    ///
    /// Returns `CacheMiss` before the first `READY`.
    pub fn current_user(&self) -> Result<CurrentUser, ClientError> {
        self.runtime
            .cache
            .current_user()
            .ok_or_else(|| ClientError::CacheMiss("current user".into()))
    }

    /// A guild from the cache.
    ///
    /// # Errors
    ///
    /// Returns `CacheMiss` when the guild is not cached.
    pub fn guild(&self, guild_id: GuildId) -> Result<CachedGuild, ClientError> {
        self.runtime
            .cache
            .guild(guild_id)
            .ok_or_else(|| ClientError::CacheMiss(format!("guild {guild_id}")))
    }

    /// A guild, from the cache or by fetching it.
    ///
    /// # Errors
    ///
    /// Returns an error if the guild is uncached and the fetch fails.
    pub async fn fetch_guild(&self, guild_id: GuildId) -> Result<Guild, ClientError> {
        Ok(self.http.get_guild(guild_id).await?)
    }

    // ---- messages ----

    /// Send a plain text message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn say(
        &self,
        channel_id: ChannelId,
        content: impl Into<String>,
    ) -> Result<Message, ClientError> {
        let params = CreateMessage {
            content: content.into(),
            tts: false,
        };
        Ok(self.http.create_message(channel_id, &params, None).await?)
    }

    /// Send a message with full parameters and an optional file.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send_message(
        &self,
        channel_id: ChannelId,
        params: &CreateMessage,
        attachment: Option<(String, Vec<u8>)>,
    ) -> Result<Message, ClientError> {
        Ok(self
            .http
            .create_message(channel_id, params, attachment)
            .await?)
    }

    /// Edit a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: impl Into<String>,
    ) -> Result<Message, ClientError> {
        let params = EditMessage {
            content: content.into(),
        };
        Ok(self
            .http
            .edit_message(channel_id, message_id, &params)
            .await?)
    }

    /// Delete one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), ClientError> {
        Ok(self.http.delete_message(channel_id, message_id).await?)
    }

    /// Delete a batch of messages.
    ///
    /// A single id deletes directly; larger batches use bulk delete,
    /// which validates every id's age before any network I/O.
    ///
    /// # Errors
    ///
    /// Returns `MessageTooOld` without touching the network when the
    /// batch contains a message older than 14 days.
    pub async fn delete_messages(
        &self,
        channel_id: ChannelId,
        message_ids: &[MessageId],
    ) -> Result<(), ClientError> {
        match message_ids {
            [] => Ok(()),
            [only] => Ok(self.http.delete_message(channel_id, *only).await?),
            many => Ok(self.http.bulk_delete_messages(channel_id, many).await?),
        }
    }

    /// Show the typing indicator.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn trigger_typing(&self, channel_id: ChannelId) -> Result<(), ClientError> {
        Ok(self.http.trigger_typing(channel_id).await?)
    }

    // ---- channels ----

    /// Create a guild channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_channel(
        &self,
        guild_id: GuildId,
        params: &CreateChannel,
    ) -> Result<cord_proto::GuildChannel, ClientError> {
        Ok(self.http.create_guild_channel(guild_id, params).await?)
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
    ) -> Result<Channel, ClientError> {
        Ok(self.http.edit_channel(channel_id, params, reason).await?)
    }

    /// Delete a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_channel(&self, channel_id: ChannelId) -> Result<Channel, ClientError> {
        Ok(self.http.delete_channel(channel_id).await?)
    }

    /// Open a DM with a user, reusing the cached channel when one is
    /// already open.
    ///
    /// # Errors
    ///
    /// Returns an error if no DM is cached and the request fails.
    pub async fn create_dm(&self, user_id: UserId) -> Result<ChannelId, ClientError> {
        if let Some(dm) = self.runtime.cache.dm_channel_for(user_id) {
            return Ok(dm.id);
        }
        let channel = self.http.create_dm(user_id).await?;
        Ok(channel.id)
    }

    // ---- roles and members ----

    /// Create a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_role(
        &self,
        guild_id: GuildId,
        params: &EditRole,
    ) -> Result<cord_proto::Role, ClientError> {
        Ok(self.http.create_role(guild_id, params).await?)
    }

    /// Delete a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_role(&self, guild_id: GuildId, role_id: RoleId) -> Result<(), ClientError> {
        Ok(self.http.delete_role(guild_id, role_id).await?)
    }

    /// Grant a member a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), ClientError> {
        Ok(self.http.add_member_role(guild_id, user_id, role_id).await?)
    }

    /// Kick a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn kick_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: Option<&str>,
    ) -> Result<(), ClientError> {
        Ok(self.http.kick_member(guild_id, user_id, reason).await?)
    }

    // ---- gateway-routed operations ----

    /// Update the bot's presence on every shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub async fn set_presence(
        &self,
        status: OnlineStatus,
        activity: Option<Activity>,
    ) -> Result<(), ClientError> {
        let update = StatusUpdate {
            since: None,
            game: activity,
            status,
            afk: false,
        };
        Ok(self.runtime.manager.update_presence(&update).await?)
    }

    /// Join (or move within) a voice channel, over the guild's owning
    /// shard. The resulting `VOICE_SERVER_UPDATE` arrives on
    /// [`Client::voice_server_updates`].
    ///
    /// # Errors
    ///
    /// Returns an error if the owning shard is not running.
    pub async fn join_voice_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), ClientError> {
        Ok(self
            .runtime
            .manager
            .voice_state_update(guild_id, Some(channel_id), false, false)
            .await?)
    }

    /// Leave voice in a guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the owning shard is not running.
    pub async fn leave_voice_channel(&self, guild_id: GuildId) -> Result<(), ClientError> {
        Ok(self
            .runtime
            .manager
            .voice_state_update(guild_id, None, false, false)
            .await?)
    }

    /// Request member chunks for a guild over its owning shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the owning shard is not running.
    pub async fn request_guild_members(&self, guild_id: GuildId) -> Result<(), ClientError> {
        Ok(self
            .runtime
            .manager
            .request_guild_members(guild_id, "", 0)
            .await?)
    }

    // ---- shard control ----

    /// The shard that owns a guild.
    #[must_use]
    pub fn shard_for(&self, guild_id: GuildId) -> u64 {
        self.runtime.manager.shard_for(guild_id)
    }

    /// Current state of a shard slot.
    #[must_use]
    pub fn shard_state(&self, shard_id: u64) -> Option<ShardState> {
        self.runtime.manager.shard_state(shard_id)
    }

    /// Kill a shard. Its guilds stay cached but are marked unavailable
    /// until a replacement reports them.
    pub async fn kill_shard(&self, shard_id: u64) {
        self.runtime.manager.kill(shard_id).await;
        self.runtime.cache.mark_shard_unavailable(shard_id);
    }

    /// Spawn a fresh shard into a slot.
    pub fn spawn_shard(&self, shard_id: u64) {
        self.runtime.manager.spawn(shard_id);
    }

    /// Gracefully close every shard and stop the dispatch pump.
    pub async fn shutdown(&self) {
        info!("shutting down client");
        self.runtime.manager.shutdown().await;
        self.runtime.pump.abort();
    }
}

/// The dispatch pump: shard events in, cache mutation, listener fan-out.
async fn dispatch_pump(
    mut events: mpsc::Receiver<ShardEvent>,
    cache: Arc<Cache>,
    dispatcher: Arc<EventDispatcher>,
    voice_tx: mpsc::UnboundedSender<VoiceServerInfo>,
    error_tx: mpsc::UnboundedSender<(u64, GatewayError)>,
) {
    while let Some(shard_event) = events.recv().await {
        match shard_event {
            ShardEvent::Dispatch { event, .. } => {
                // Cache first: listeners observe post-mutation state.
                cache.update(&event);
                if let Event::VoiceServerUpdate(info) = &event {
                    let _ = voice_tx.send(info.clone());
                }
                dispatcher.dispatch(&event);
            }
            ShardEvent::Ready { shard_id, ready } => {
                debug!(shard = shard_id, session = %ready.session_id, "shard session up");
            }
            ShardEvent::Resumed { shard_id } => {
                debug!(shard = shard_id, "shard session resumed");
            }
            ShardEvent::Disconnected {
                shard_id,
                code,
                reconnecting,
            } => {
                if reconnecting {
                    debug!(shard = shard_id, ?code, "shard reconnecting");
                } else {
                    warn!(shard = shard_id, ?code, "shard stopped");
                    cache.mark_shard_unavailable(shard_id);
                }
            }
            ShardEvent::Fatal { shard_id, error } => {
                error!(shard = shard_id, %error, "shard failed fatally");
                cache.mark_shard_unavailable(shard_id);
                let _ = error_tx.send((shard_id, error));
            }
        }
    }
}
