//! The in-memory entity cache.
//!
//! One writer (the dispatch pump) mutates the cache under a write lock;
//! listeners and the facade read clones out. Every mutation is applied
//! atomically, so a reader never sees a half-applied event.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, warn};

use cord_proto::{
    Channel, ChannelId, ChannelType, CurrentUser, Event, Group, Guild, GuildChannel, GuildId,
    Member, Presence, PrivateChannel, Role, RoleId, User, UserId,
};

/// Which table owns a channel id.
///
/// Invariant: any channel id known to the cache is owned by exactly one
/// of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOwner {
    /// A guild's channel table.
    Guild(GuildId),
    /// The DM table.
    Dm,
    /// The group-DM table.
    Group,
}

/// A guild with its relations, as the cache holds it.
#[derive(Debug, Clone)]
pub struct CachedGuild {
    /// Guild id.
    pub id: GuildId,
    /// Guild name.
    pub name: String,
    /// Owning user.
    pub owner_id: Option<UserId>,
    /// Channels by id.
    pub channels: HashMap<ChannelId, GuildChannel>,
    /// Members by user id.
    pub members: HashMap<UserId, Member>,
    /// Roles by id.
    pub roles: HashMap<RoleId, Role>,
    /// Presences by user id.
    pub presences: HashMap<UserId, Presence>,
    /// Total member count as reported by the server.
    pub member_count: Option<u64>,
    /// More members than the large threshold.
    pub large: bool,
    /// Marked unavailable by an outage or a killed shard.
    pub unavailable: bool,
    /// The shard that owns this guild.
    pub shard_id: u64,
}

impl CachedGuild {
    fn from_payload(guild: &Guild, shard_count: u64) -> Self {
        let channels = guild
            .channels
            .iter()
            .map(|channel| (channel.id, channel.clone()))
            .collect();
        let members = guild
            .members
            .iter()
            .map(|member| (member.user.id, member.clone()))
            .collect();
        let roles = guild.roles.iter().map(|role| (role.id, role.clone())).collect();
        let presences = guild
            .presences
            .iter()
            .map(|presence| (presence.user.id, presence.clone()))
            .collect();

        Self {
            id: guild.id,
            name: guild.name.clone(),
            owner_id: guild.owner_id,
            channels,
            members,
            roles,
            presences,
            member_count: guild.member_count,
            large: guild.large,
            unavailable: false,
            shard_id: guild.id.shard_for(shard_count),
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    current_user: Option<CurrentUser>,
    guilds: HashMap<GuildId, CachedGuild>,
    unavailable_guilds: HashSet<GuildId>,
    private_channels: HashMap<ChannelId, PrivateChannel>,
    dm_by_recipient: HashMap<UserId, ChannelId>,
    groups: HashMap<ChannelId, Group>,
    users: HashMap<UserId, User>,
}

/// The in-memory cache of everything the gateway has told us.
#[derive(Debug)]
pub struct Cache {
    inner: RwLock<CacheInner>,
    shard_count: u64,
}

impl Cache {
    /// Create an empty cache for a fleet of `shard_count` shards.
    #[must_use]
    pub fn new(shard_count: u64) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            shard_count,
        }
    }

    /// Apply the mutation an event implies. Applying the same event
    /// twice leaves the cache as if it were applied once.
    pub fn update(&self, event: &Event) {
        let mut inner = self.inner.write();
        match event {
            Event::Ready(ready) => {
                inner.current_user = Some(ready.user.clone());
                for guild in &ready.guilds {
                    inner.unavailable_guilds.insert(guild.id);
                    if let Some(cached) = inner.guilds.get_mut(&guild.id) {
                        cached.unavailable = true;
                    }
                }
            }
            Event::GuildCreate(guild) => {
                inner.unavailable_guilds.remove(&guild.id);
                for member in &guild.members {
                    inner.users.insert(member.user.id, member.user.clone());
                }
                let cached = CachedGuild::from_payload(guild, self.shard_count);
                inner.guilds.insert(guild.id, cached);
            }
            Event::GuildUpdate(update) => {
                if let Some(cached) = inner.guilds.get_mut(&update.id) {
                    if let Some(name) = &update.name {
                        cached.name = name.clone();
                    }
                    if let Some(owner_id) = update.owner_id {
                        cached.owner_id = Some(owner_id);
                    }
                } else {
                    debug!(guild = %update.id, "GUILD_UPDATE for unknown guild");
                }
            }
            Event::GuildDelete(deleted) => {
                if deleted.unavailable {
                    // Outage: demote, keep the id.
                    inner.guilds.remove(&deleted.id);
                    inner.unavailable_guilds.insert(deleted.id);
                } else {
                    // Removed from the guild: forget it entirely.
                    inner.guilds.remove(&deleted.id);
                    inner.unavailable_guilds.remove(&deleted.id);
                }
            }
            Event::ChannelCreate(channel) | Event::ChannelUpdate(channel) => {
                Self::upsert_channel(&mut inner, channel);
            }
            Event::ChannelDelete(channel) => {
                Self::remove_channel(&mut inner, channel);
            }
            Event::GuildMemberAdd(add) => {
                inner.users.insert(add.member.user.id, add.member.user.clone());
                if let Some(guild) = inner.guilds.get_mut(&add.guild_id) {
                    let newly_added = guild
                        .members
                        .insert(add.member.user.id, add.member.clone())
                        .is_none();
                    if newly_added {
                        if let Some(count) = guild.member_count.as_mut() {
                            *count += 1;
                        }
                    }
                }
            }
            Event::GuildMemberUpdate(update) => {
                if let Some(guild) = inner.guilds.get_mut(&update.guild_id) {
                    if let Some(member) = guild.members.get_mut(&update.user.id) {
                        member.user = update.user.clone();
                        member.roles = update.roles.clone();
                        member.nick = update.nick.clone();
                    }
                }
            }
            Event::GuildMemberRemove(remove) => {
                if let Some(guild) = inner.guilds.get_mut(&remove.guild_id) {
                    let removed = guild.members.remove(&remove.user.id).is_some();
                    if removed {
                        if let Some(count) = guild.member_count.as_mut() {
                            *count = count.saturating_sub(1);
                        }
                    }
                }
            }
            Event::GuildRoleCreate(create) | Event::GuildRoleUpdate(create) => {
                if let Some(guild) = inner.guilds.get_mut(&create.guild_id) {
                    guild.roles.insert(create.role.id, create.role.clone());
                }
            }
            Event::GuildRoleDelete(delete) => {
                if let Some(guild) = inner.guilds.get_mut(&delete.guild_id) {
                    guild.roles.remove(&delete.role_id);
                    for member in guild.members.values_mut() {
                        member.roles.retain(|role| *role != delete.role_id);
                    }
                }
            }
            Event::MessageCreate(message) => {
                // Messages are not retained, but their authors are useful
                // for lookup.
                if let Some(author) = &message.author {
                    inner.users.insert(author.id, author.clone());
                }
            }
            Event::PresenceUpdate(presence) => {
                if let Some(guild_id) = presence.guild_id {
                    if let Some(guild) = inner.guilds.get_mut(&guild_id) {
                        guild.presences.insert(presence.user.id, presence.clone());
                    }
                }
            }
            // Forwarded or emit-only events mutate nothing.
            Event::Resumed
            | Event::MessageUpdate(_)
            | Event::MessageDelete(_)
            | Event::TypingStart(_)
            | Event::VoiceStateUpdate(_)
            | Event::VoiceServerUpdate(_)
            | Event::Unknown { .. } => {}
        }
    }

    fn upsert_channel(inner: &mut CacheInner, channel: &Channel) {
        match channel.kind {
            kind if kind.is_guild() => {
                let Some(guild_id) = channel.guild_id else {
                    warn!(channel = %channel.id, "guild channel without guild_id");
                    return;
                };
                if let Some(guild) = inner.guilds.get_mut(&guild_id) {
                    guild
                        .channels
                        .insert(channel.id, GuildChannel::from(channel.clone()));
                }
            }
            ChannelType::Private => {
                let Some(recipient) = channel.recipient().cloned() else {
                    warn!(channel = %channel.id, "DM channel without recipient");
                    return;
                };
                // One DM per recipient: a re-opened DM replaces the old
                // channel entry.
                if let Some(previous) = inner.dm_by_recipient.insert(recipient.id, channel.id) {
                    if previous != channel.id {
                        inner.private_channels.remove(&previous);
                    }
                }
                inner.users.insert(recipient.id, recipient.clone());
                inner.private_channels.insert(
                    channel.id,
                    PrivateChannel {
                        id: channel.id,
                        recipient,
                    },
                );
            }
            ChannelType::Group => {
                inner.groups.insert(
                    channel.id,
                    Group {
                        id: channel.id,
                        name: channel.name.clone(),
                        owner_id: channel.owner_id,
                        recipients: channel.recipients.clone(),
                    },
                );
            }
            ChannelType::Unknown(kind) => {
                debug!(channel = %channel.id, kind, "ignoring channel of unknown type");
            }
            _ => {}
        }
    }

    fn remove_channel(inner: &mut CacheInner, channel: &Channel) {
        match channel.kind {
            kind if kind.is_guild() => {
                if let Some(guild_id) = channel.guild_id {
                    if let Some(guild) = inner.guilds.get_mut(&guild_id) {
                        guild.channels.remove(&channel.id);
                    }
                }
            }
            ChannelType::Private => {
                if let Some(removed) = inner.private_channels.remove(&channel.id) {
                    inner.dm_by_recipient.remove(&removed.recipient.id);
                }
            }
            ChannelType::Group => {
                inner.groups.remove(&channel.id);
            }
            _ => {}
        }
    }

    /// Mark every guild owned by a shard unavailable, keeping its data.
    ///
    /// Used when a shard is killed; the replacement shard's `READY` and
    /// `GUILD_CREATE`s bring them back.
    pub fn mark_shard_unavailable(&self, shard_id: u64) {
        let mut inner = self.inner.write();
        for guild in inner.guilds.values_mut() {
            if guild.shard_id == shard_id {
                guild.unavailable = true;
            }
        }
    }

    // ---- readers ----

    /// The bot's own user, once `READY` has been seen.
    #[must_use]
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.inner.read().current_user.clone()
    }

    /// A guild by id.
    #[must_use]
    pub fn guild(&self, guild_id: GuildId) -> Option<CachedGuild> {
        self.inner.read().guilds.get(&guild_id).cloned()
    }

    /// Number of fully-cached guilds.
    #[must_use]
    pub fn guild_count(&self) -> usize {
        self.inner.read().guilds.len()
    }

    /// Ids of guilds known only as unavailable.
    #[must_use]
    pub fn unavailable_guild_ids(&self) -> Vec<GuildId> {
        self.inner.read().unavailable_guilds.iter().copied().collect()
    }

    /// Whether a guild is currently unavailable.
    #[must_use]
    pub fn is_guild_unavailable(&self, guild_id: GuildId) -> bool {
        let inner = self.inner.read();
        inner.unavailable_guilds.contains(&guild_id)
            || inner.guilds.get(&guild_id).is_some_and(|g| g.unavailable)
    }

    /// A DM channel by id.
    #[must_use]
    pub fn private_channel(&self, channel_id: ChannelId) -> Option<PrivateChannel> {
        self.inner.read().private_channels.get(&channel_id).cloned()
    }

    /// The DM channel for a recipient, if one is open.
    #[must_use]
    pub fn dm_channel_for(&self, user_id: UserId) -> Option<PrivateChannel> {
        let inner = self.inner.read();
        let channel_id = inner.dm_by_recipient.get(&user_id)?;
        inner.private_channels.get(channel_id).cloned()
    }

    /// A group DM by id.
    #[must_use]
    pub fn group(&self, channel_id: ChannelId) -> Option<Group> {
        self.inner.read().groups.get(&channel_id).cloned()
    }

    /// A cached user by id.
    #[must_use]
    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.inner.read().users.get(&user_id).cloned()
    }

    /// Which table owns a channel id, if any.
    #[must_use]
    pub fn channel_owner(&self, channel_id: ChannelId) -> Option<ChannelOwner> {
        let inner = self.inner.read();
        if inner.private_channels.contains_key(&channel_id) {
            return Some(ChannelOwner::Dm);
        }
        if inner.groups.contains_key(&channel_id) {
            return Some(ChannelOwner::Group);
        }
        inner
            .guilds
            .values()
            .find(|guild| guild.channels.contains_key(&channel_id))
            .map(|guild| ChannelOwner::Guild(guild.id))
    }

    /// A guild channel by id, searching every guild.
    #[must_use]
    pub fn guild_channel(&self, channel_id: ChannelId) -> Option<GuildChannel> {
        let inner = self.inner.read();
        inner
            .guilds
            .values()
            .find_map(|guild| guild.channels.get(&channel_id).cloned())
    }

    /// A member of a guild.
    #[must_use]
    pub fn member(&self, guild_id: GuildId, user_id: UserId) -> Option<Member> {
        self.inner
            .read()
            .guilds
            .get(&guild_id)
            .and_then(|guild| guild.members.get(&user_id).cloned())
    }
}
