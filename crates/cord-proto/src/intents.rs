//! The event-category bitmask sent with `IDENTIFY`.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitmask telling the server which event categories the bot wants.
///
/// Gateway v10 requires an intents value on `IDENTIFY`; the legacy v6 mode
/// sends it as well, which the older gateway ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Intents(u64);

impl Intents {
    /// No events.
    pub const EMPTY: Self = Self(0);
    /// Guild create/update/delete, role and channel events.
    pub const GUILDS: Self = Self(1 << 0);
    /// Member add/update/remove. Privileged.
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    /// Ban add/remove.
    pub const GUILD_BANS: Self = Self(1 << 2);
    /// Emoji updates.
    pub const GUILD_EMOJIS: Self = Self(1 << 3);
    /// Integration updates.
    pub const GUILD_INTEGRATIONS: Self = Self(1 << 4);
    /// Webhook updates.
    pub const GUILD_WEBHOOKS: Self = Self(1 << 5);
    /// Invite create/delete.
    pub const GUILD_INVITES: Self = Self(1 << 6);
    /// Voice state updates.
    pub const GUILD_VOICE_STATES: Self = Self(1 << 7);
    /// Presence updates. Privileged.
    pub const GUILD_PRESENCES: Self = Self(1 << 8);
    /// Messages in guild channels.
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    /// Reactions in guild channels.
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    /// Typing starts in guild channels.
    pub const GUILD_MESSAGE_TYPING: Self = Self(1 << 11);
    /// Messages in DMs.
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    /// Reactions in DMs.
    pub const DIRECT_MESSAGE_REACTIONS: Self = Self(1 << 13);
    /// Typing starts in DMs.
    pub const DIRECT_MESSAGE_TYPING: Self = Self(1 << 14);
    /// Message content fields. Privileged.
    pub const MESSAGE_CONTENT: Self = Self(1 << 15);

    /// Wrap a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Every intent, privileged included.
    #[must_use]
    pub const fn all() -> Self {
        Self((1 << 16) - 1)
    }

    /// Every intent that does not require privileged enrollment.
    #[must_use]
    pub const fn non_privileged() -> Self {
        Self(
            Self::all().0
                & !Self::GUILD_MEMBERS.0
                & !Self::GUILD_PRESENCES.0
                & !Self::MESSAGE_CONTENT.0,
        )
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Intents {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intents_combine() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
        assert!(intents.contains(Intents::GUILDS));
        assert!(intents.contains(Intents::GUILD_MESSAGES));
        assert!(!intents.contains(Intents::GUILD_MEMBERS));
    }

    #[test]
    fn test_non_privileged_excludes_privileged() {
        let intents = Intents::non_privileged();
        assert!(!intents.contains(Intents::GUILD_MEMBERS));
        assert!(!intents.contains(Intents::GUILD_PRESENCES));
        assert!(!intents.contains(Intents::MESSAGE_CONTENT));
        assert!(intents.contains(Intents::GUILDS));
        assert!(intents.contains(Intents::DIRECT_MESSAGES));
    }

    #[test]
    fn test_intents_serde_as_integer() {
        let intents = Intents::GUILDS | Intents::GUILD_VOICE_STATES;
        let json = serde_json::to_string(&intents).unwrap();
        assert_eq!(json, "129");

        let back: Intents = serde_json::from_str(&json).unwrap();
        assert_eq!(back, intents);
    }
}
