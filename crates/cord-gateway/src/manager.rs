//! The shard fleet: spawn, route, kill, respawn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until};
use tracing::{debug, info, warn};

use cord_proto::{
    ChannelId, GatewayPayload, GuildId, RequestGuildMembers, StatusUpdate, VoiceStateUpdate,
};

use crate::error::GatewayError;
use crate::events::ShardEvent;
use crate::shard::{GatewayConfig, Shard, ShardCommand};
use crate::state::{AtomicShardState, ShardState};

/// Serializes `IDENTIFY`s across the fleet.
///
/// The server rejects identifies closer together than five seconds; every
/// shard acquires this gate before sending one, and holds it for the
/// configured spacing.
#[derive(Debug)]
pub struct IdentifyGate {
    last: tokio::sync::Mutex<Option<Instant>>,
    spacing: Duration,
}

impl IdentifyGate {
    /// Create a gate with the given spacing.
    #[must_use]
    pub fn new(spacing: Duration) -> Self {
        Self {
            last: tokio::sync::Mutex::new(None),
            spacing,
        }
    }

    /// Wait for this shard's identify slot.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let next_slot = previous + self.spacing;
            if next_slot > Instant::now() {
                sleep_until(next_slot.into()).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// A running shard's control surface.
#[derive(Debug)]
pub struct ShardRunner {
    /// Shard id.
    pub id: u64,
    commands: mpsc::Sender<ShardCommand>,
    state: Arc<AtomicShardState>,
    task: tokio::task::JoinHandle<()>,
}

impl ShardRunner {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ShardState {
        self.state.load()
    }
}

/// Spawns, routes to, and reaps the shard fleet.
pub struct ShardManager {
    config: GatewayConfig,
    gateway_url: String,
    shard_count: u64,
    gate: Arc<IdentifyGate>,
    runners: Mutex<HashMap<u64, ShardRunner>>,
    events_tx: mpsc::Sender<ShardEvent>,
}

impl ShardManager {
    /// Create a manager for `shard_count` shards against `gateway_url`.
    ///
    /// Returns the manager and the fan-in event stream its shards feed.
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        gateway_url: impl Into<String>,
        shard_count: u64,
    ) -> (Self, mpsc::Receiver<ShardEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let gate = Arc::new(IdentifyGate::new(config.identify_spacing));
        let manager = Self {
            config,
            gateway_url: gateway_url.into(),
            shard_count,
            gate,
            runners: Mutex::new(HashMap::new()),
            events_tx,
        };
        (manager, events_rx)
    }

    /// Number of shards in the fleet.
    #[must_use]
    pub const fn shard_count(&self) -> u64 {
        self.shard_count
    }

    /// The shard that owns a guild.
    #[must_use]
    pub const fn shard_for(&self, guild_id: GuildId) -> u64 {
        guild_id.shard_for(self.shard_count)
    }

    /// Spawn every shard. Sockets open in parallel; identifies serialize
    /// through the shared gate.
    pub fn spawn_all(&self) {
        for id in 0..self.shard_count {
            self.spawn(id);
        }
    }

    /// Spawn (or respawn) the shard in slot `id`.
    pub fn spawn(&self, id: u64) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let state = Arc::new(AtomicShardState::new(ShardState::Disconnected));

        let shard = Shard::new(
            id,
            self.shard_count,
            self.config.clone(),
            self.gateway_url.clone(),
            Arc::clone(&state),
            Arc::clone(&self.gate),
            self.events_tx.clone(),
            commands_rx,
        );

        debug!(shard = id, "spawning shard");
        let task = tokio::spawn(shard.run());

        let runner = ShardRunner {
            id,
            commands: commands_tx,
            state,
            task,
        };
        if let Some(previous) = self.runners.lock().insert(id, runner) {
            previous.task.abort();
        }
    }

    /// Current state of a shard slot.
    #[must_use]
    pub fn shard_state(&self, id: u64) -> Option<ShardState> {
        self.runners.lock().get(&id).map(ShardRunner::state)
    }

    /// Send a raw command frame over a specific shard's socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard slot is empty or its task is gone.
    pub async fn send_to_shard(
        &self,
        id: u64,
        frame: GatewayPayload,
    ) -> Result<(), GatewayError> {
        let commands = {
            let runners = self.runners.lock();
            let runner = runners.get(&id).ok_or_else(|| {
                GatewayError::Protocol(format!("no shard in slot {id}"))
            })?;
            runner.commands.clone()
        };
        commands
            .send(ShardCommand::Send(frame))
            .await
            .map_err(|_| GatewayError::Transport(format!("shard {id} is not running")))
    }

    /// Join, move, or leave a voice channel, over the owning shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built or the shard is
    /// gone.
    pub async fn voice_state_update(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<(), GatewayError> {
        let frame = GatewayPayload::voice_state_update(&VoiceStateUpdate {
            guild_id,
            channel_id,
            self_mute,
            self_deaf,
        })?;
        self.send_to_shard(self.shard_for(guild_id), frame).await
    }

    /// Request member chunks for a guild, over the owning shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built or the shard is
    /// gone.
    pub async fn request_guild_members(
        &self,
        guild_id: GuildId,
        query: impl Into<String>,
        limit: u64,
    ) -> Result<(), GatewayError> {
        let frame = GatewayPayload::request_guild_members(&RequestGuildMembers {
            guild_id,
            query: query.into(),
            limit,
        })?;
        self.send_to_shard(self.shard_for(guild_id), frame).await
    }

    /// Update the bot's presence on every shard.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built; shards that are
    /// mid-reconnect are skipped.
    pub async fn update_presence(&self, status: &StatusUpdate) -> Result<(), GatewayError> {
        let frame = GatewayPayload::status_update(status)?;
        let ids: Vec<u64> = self.runners.lock().keys().copied().collect();
        for id in ids {
            if let Err(err) = self.send_to_shard(id, frame.clone()).await {
                warn!(shard = id, %err, "presence update skipped");
            }
        }
        Ok(())
    }

    /// Gracefully close one shard (code 1000) and leave its slot empty.
    ///
    /// Guilds owned by the killed shard stay cached but unavailable
    /// until a replacement shard reports them in its `READY`.
    pub async fn kill(&self, id: u64) {
        let runner = self.runners.lock().remove(&id);
        match runner {
            Some(runner) => {
                info!(shard = id, "killing shard");
                if runner.commands.send(ShardCommand::Disconnect).await.is_err() {
                    runner.task.abort();
                }
                // Give the close frame a moment, then make sure the task
                // is gone.
                sleep(Duration::from_millis(50)).await;
                runner.task.abort();
            }
            None => debug!(shard = id, "kill on empty slot"),
        }
    }

    /// Gracefully close every shard.
    pub async fn shutdown(&self) {
        let ids: Vec<u64> = self.runners.lock().keys().copied().collect();
        for id in ids {
            self.kill(id).await;
        }
    }
}
