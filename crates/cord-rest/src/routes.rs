//! REST routes and their rate-limit bucket keys.

use cord_proto::{ChannelId, GuildId, MessageId, RoleId, UserId};
use reqwest::Method;

/// A REST endpoint with its major parameters.
///
/// The bucket key substitutes major parameters (channel, guild, webhook
/// ids) literally and masks minor ids, so e.g. deleting two messages in
/// the same channel shares one bucket while two channels do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// `GET /gateway`.
    GetGateway,
    /// `GET /gateway/bot`.
    GetGatewayBot,
    /// `GET /channels/{channel_id}`.
    GetChannel(ChannelId),
    /// `PATCH /channels/{channel_id}`.
    EditChannel(ChannelId),
    /// `DELETE /channels/{channel_id}`.
    DeleteChannel(ChannelId),
    /// `GET /channels/{channel_id}/messages`.
    GetMessages(ChannelId),
    /// `POST /channels/{channel_id}/messages`.
    CreateMessage(ChannelId),
    /// `PATCH /channels/{channel_id}/messages/{message_id}`.
    EditMessage(ChannelId, MessageId),
    /// `DELETE /channels/{channel_id}/messages/{message_id}`.
    DeleteMessage(ChannelId, MessageId),
    /// `POST /channels/{channel_id}/messages/bulk-delete`.
    BulkDeleteMessages(ChannelId),
    /// `POST /channels/{channel_id}/typing`.
    TriggerTyping(ChannelId),
    /// `POST /channels/{channel_id}/invites`.
    CreateInvite(ChannelId),
    /// `GET /guilds/{guild_id}`.
    GetGuild(GuildId),
    /// `PATCH /guilds/{guild_id}`.
    EditGuild(GuildId),
    /// `GET /guilds/{guild_id}/channels`.
    GetGuildChannels(GuildId),
    /// `POST /guilds/{guild_id}/channels`.
    CreateGuildChannel(GuildId),
    /// `GET /guilds/{guild_id}/members`.
    GetGuildMembers(GuildId),
    /// `GET /guilds/{guild_id}/members/{user_id}`.
    GetMember(GuildId, UserId),
    /// `DELETE /guilds/{guild_id}/members/{user_id}`.
    KickMember(GuildId, UserId),
    /// `PUT /guilds/{guild_id}/bans/{user_id}`.
    BanMember(GuildId, UserId),
    /// `PUT /guilds/{guild_id}/members/{user_id}/roles/{role_id}`.
    AddMemberRole(GuildId, UserId, RoleId),
    /// `DELETE /guilds/{guild_id}/members/{user_id}/roles/{role_id}`.
    RemoveMemberRole(GuildId, UserId, RoleId),
    /// `POST /guilds/{guild_id}/roles`.
    CreateRole(GuildId),
    /// `PATCH /guilds/{guild_id}/roles/{role_id}`.
    EditRole(GuildId, RoleId),
    /// `DELETE /guilds/{guild_id}/roles/{role_id}`.
    DeleteRole(GuildId, RoleId),
    /// `POST /users/@me/channels`.
    CreateDm,
    /// `DELETE /users/@me/guilds/{guild_id}`.
    LeaveGuild(GuildId),
}

impl Route {
    /// HTTP method for this route.
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::GetGateway
            | Self::GetGatewayBot
            | Self::GetChannel(_)
            | Self::GetMessages(_)
            | Self::GetGuild(_)
            | Self::GetGuildChannels(_)
            | Self::GetGuildMembers(_)
            | Self::GetMember(..) => Method::GET,

            Self::CreateMessage(_)
            | Self::BulkDeleteMessages(_)
            | Self::TriggerTyping(_)
            | Self::CreateInvite(_)
            | Self::CreateGuildChannel(_)
            | Self::CreateRole(_)
            | Self::CreateDm => Method::POST,

            Self::EditChannel(_)
            | Self::EditMessage(..)
            | Self::EditGuild(_)
            | Self::EditRole(..) => Method::PATCH,

            Self::BanMember(..) | Self::AddMemberRole(..) => Method::PUT,

            Self::DeleteChannel(_)
            | Self::DeleteMessage(..)
            | Self::KickMember(..)
            | Self::RemoveMemberRole(..)
            | Self::DeleteRole(..)
            | Self::LeaveGuild(_) => Method::DELETE,
        }
    }

    /// URL path for this route, relative to the versioned API base.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::GetGateway => "/gateway".to_string(),
            Self::GetGatewayBot => "/gateway/bot".to_string(),
            Self::GetChannel(channel) | Self::EditChannel(channel) | Self::DeleteChannel(channel) => {
                format!("/channels/{channel}")
            }
            Self::GetMessages(channel) | Self::CreateMessage(channel) => {
                format!("/channels/{channel}/messages")
            }
            Self::EditMessage(channel, message) | Self::DeleteMessage(channel, message) => {
                format!("/channels/{channel}/messages/{message}")
            }
            Self::BulkDeleteMessages(channel) => {
                format!("/channels/{channel}/messages/bulk-delete")
            }
            Self::TriggerTyping(channel) => format!("/channels/{channel}/typing"),
            Self::CreateInvite(channel) => format!("/channels/{channel}/invites"),
            Self::GetGuild(guild) | Self::EditGuild(guild) => format!("/guilds/{guild}"),
            Self::GetGuildChannels(guild) | Self::CreateGuildChannel(guild) => {
                format!("/guilds/{guild}/channels")
            }
            Self::GetGuildMembers(guild) => format!("/guilds/{guild}/members"),
            Self::GetMember(guild, user) | Self::KickMember(guild, user) => {
                format!("/guilds/{guild}/members/{user}")
            }
            Self::BanMember(guild, user) => format!("/guilds/{guild}/bans/{user}"),
            Self::AddMemberRole(guild, user, role) | Self::RemoveMemberRole(guild, user, role) => {
                format!("/guilds/{guild}/members/{user}/roles/{role}")
            }
            Self::CreateRole(guild) => format!("/guilds/{guild}/roles"),
            Self::EditRole(guild, role) | Self::DeleteRole(guild, role) => {
                format!("/guilds/{guild}/roles/{role}")
            }
            Self::CreateDm => "/users/@me/channels".to_string(),
            Self::LeaveGuild(guild) => format!("/users/@me/guilds/{guild}"),
        }
    }

    /// Rate-limit bucket key: method plus route with minor ids masked.
    #[must_use]
    pub fn bucket(&self) -> String {
        let masked = match self {
            Self::EditMessage(channel, _) | Self::DeleteMessage(channel, _) => {
                format!("/channels/{channel}/messages/{{message_id}}")
            }
            Self::GetMember(guild, _) | Self::KickMember(guild, _) => {
                format!("/guilds/{guild}/members/{{user_id}}")
            }
            Self::BanMember(guild, _) => format!("/guilds/{guild}/bans/{{user_id}}"),
            Self::AddMemberRole(guild, ..) | Self::RemoveMemberRole(guild, ..) => {
                format!("/guilds/{guild}/members/{{user_id}}/roles/{{role_id}}")
            }
            Self::EditRole(guild, _) | Self::DeleteRole(guild, _) => {
                format!("/guilds/{guild}/roles/{{role_id}}")
            }
            Self::LeaveGuild(_) => "/users/@me/guilds/{guild_id}".to_string(),
            other => other.path(),
        };
        format!("{} {masked}", self.method())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_ids_are_masked() {
        let a = Route::DeleteMessage(ChannelId::new(1), MessageId::new(100));
        let b = Route::DeleteMessage(ChannelId::new(1), MessageId::new(200));
        assert_eq!(a.bucket(), b.bucket());
    }

    #[test]
    fn test_major_ids_are_literal() {
        let a = Route::CreateMessage(ChannelId::new(1));
        let b = Route::CreateMessage(ChannelId::new(2));
        assert_ne!(a.bucket(), b.bucket());
        assert!(a.bucket().contains("/channels/1/messages"));
    }

    #[test]
    fn test_method_distinguishes_buckets() {
        let get = Route::GetChannel(ChannelId::new(1));
        let patch = Route::EditChannel(ChannelId::new(1));
        assert_eq!(get.path(), patch.path());
        assert_ne!(get.bucket(), patch.bucket());
    }

    #[test]
    fn test_paths() {
        assert_eq!(Route::GetGatewayBot.path(), "/gateway/bot");
        assert_eq!(
            Route::EditMessage(ChannelId::new(3), MessageId::new(4)).path(),
            "/channels/3/messages/4"
        );
        assert_eq!(
            Route::AddMemberRole(GuildId::new(1), UserId::new(2), RoleId::new(3)).path(),
            "/guilds/1/members/2/roles/3"
        );
        assert_eq!(Route::CreateDm.path(), "/users/@me/channels");
    }

    #[test]
    fn test_methods() {
        assert_eq!(Route::GetGateway.method(), Method::GET);
        assert_eq!(
            Route::BulkDeleteMessages(ChannelId::new(1)).method(),
            Method::POST
        );
        assert_eq!(
            Route::BanMember(GuildId::new(1), UserId::new(2)).method(),
            Method::PUT
        );
        assert_eq!(Route::LeaveGuild(GuildId::new(1)).method(), Method::DELETE);
    }
}
