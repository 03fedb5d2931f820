//! Snowflake identifiers.
//!
//! Every entity on the platform is identified by a 64-bit snowflake whose
//! top 42 bits are a millisecond timestamp. The wire format carries
//! snowflakes as decimal strings; deserialization accepts both the string
//! and integer forms and serialization always emits strings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtoError;

/// Milliseconds between the Unix epoch and the platform epoch.
pub const EPOCH_MS: u64 = 1_420_070_400_000;

/// A 64-bit snowflake identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Milliseconds since the platform epoch encoded in this id.
    #[must_use]
    pub const fn timestamp_ms(self) -> u64 {
        self.0 >> 22
    }

    /// Wall-clock creation time encoded in this id.
    #[must_use]
    pub fn created_at(self) -> DateTime<Utc> {
        let ms = EPOCH_MS + self.timestamp_ms();
        DateTime::from_timestamp_millis(ms as i64).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// The shard that owns an entity with this id, for a fleet of
    /// `shard_count` shards.
    ///
    /// Returns 0 when `shard_count` is 0 so a misconfigured caller routes
    /// everything to the first shard instead of panicking.
    #[must_use]
    pub const fn shard_for(self, shard_count: u64) -> u64 {
        if shard_count == 0 {
            return 0;
        }
        (self.0 >> 22) % shard_count
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl FromStr for Snowflake {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ProtoError::InvalidId(s.to_string()))
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct SnowflakeVisitor;

impl Visitor<'_> for SnowflakeVisitor {
    type Value = Snowflake;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a snowflake as a string or integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Snowflake(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(Snowflake)
            .map_err(|_| E::custom("negative snowflake"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<u64>()
            .map(Snowflake)
            .map_err(|_| E::custom(format!("invalid snowflake string: {v}")))
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

macro_rules! id_type {
    ($(#[$doc:meta] $name:ident),+ $(,)?) => {
        $(
            #[$doc]
            #[derive(
                Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
                Serialize, Deserialize,
            )]
            #[serde(transparent)]
            pub struct $name(pub Snowflake);

            impl $name {
                /// Wrap a raw id.
                #[must_use]
                pub const fn new(id: u64) -> Self {
                    Self(Snowflake::new(id))
                }

                /// Get the raw id.
                #[must_use]
                pub const fn get(self) -> u64 {
                    self.0.get()
                }

                /// Wall-clock creation time encoded in this id.
                #[must_use]
                pub fn created_at(self) -> DateTime<Utc> {
                    self.0.created_at()
                }
            }

            impl From<u64> for $name {
                fn from(id: u64) -> Self {
                    Self(Snowflake::from(id))
                }
            }

            impl From<$name> for Snowflake {
                fn from(id: $name) -> Self {
                    id.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }
        )+
    };
}

id_type! {
    /// Unique identifier for a guild.
    GuildId,
    /// Unique identifier for a channel of any kind.
    ChannelId,
    /// Unique identifier for a user.
    UserId,
    /// Unique identifier for a role.
    RoleId,
    /// Unique identifier for a message.
    MessageId,
    /// Unique identifier for an application.
    ApplicationId,
    /// Unique identifier for a webhook.
    WebhookId,
}

impl GuildId {
    /// The shard that owns this guild for a fleet of `shard_count` shards.
    #[must_use]
    pub const fn shard_for(self, shard_count: u64) -> u64 {
        self.0.shard_for(shard_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_snowflake_timestamp_extraction() {
        // 2**22 = one millisecond past the epoch
        let id = Snowflake::new(1 << 22);
        assert_eq!(id.timestamp_ms(), 1);

        let epoch_id = Snowflake::new(0);
        assert_eq!(epoch_id.created_at().timestamp_millis() as u64, EPOCH_MS);
    }

    #[test]
    fn test_snowflake_string_roundtrip() {
        let id: Snowflake = "123456789012582400".parse().unwrap();
        assert_eq!(id.get(), 123_456_789_012_582_400);
        assert_eq!(id.to_string(), "123456789012582400");
    }

    #[test]
    fn test_snowflake_rejects_garbage() {
        assert!("not-a-number".parse::<Snowflake>().is_err());
        assert!("-5".parse::<Snowflake>().is_err());
    }

    #[test]
    fn test_serde_accepts_string_and_integer() {
        let from_str: Snowflake = serde_json::from_str("\"42\"").unwrap();
        let from_int: Snowflake = serde_json::from_str("42").unwrap();
        assert_eq!(from_str, from_int);

        // Always serializes as a string
        assert_eq!(serde_json::to_string(&from_str).unwrap(), "\"42\"");
    }

    #[test]
    fn test_guild_routing_example() {
        // (123456789012582400 >> 22) % 4 == 0
        let guild = GuildId::new(123_456_789_012_582_400);
        assert_eq!(guild.shard_for(4), (123_456_789_012_582_400u64 >> 22) % 4);
    }

    #[test]
    fn test_shard_for_zero_count() {
        assert_eq!(GuildId::new(77).shard_for(0), 0);
    }

    proptest! {
        #[test]
        fn shard_for_in_range(id in any::<u64>(), count in 1u64..4096) {
            let shard = Snowflake::new(id).shard_for(count);
            prop_assert!(shard < count);
        }

        #[test]
        fn shard_for_stable(id in any::<u64>(), count in 1u64..4096) {
            let a = Snowflake::new(id).shard_for(count);
            let b = Snowflake::new(id).shard_for(count);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn equal_timestamp_class_routes_identically(
            ts in 0u64..(1 << 41),
            low_a in 0u64..(1 << 22),
            low_b in 0u64..(1 << 22),
            count in 1u64..256,
        ) {
            // Two ids sharing the timestamp bits land on the same shard
            // regardless of their low 22 bits.
            let a = Snowflake::new((ts << 22) | low_a);
            let b = Snowflake::new((ts << 22) | low_b);
            prop_assert_eq!(a.shard_for(count), b.shard_for(count));
        }

        #[test]
        fn snowflake_json_roundtrip(id in any::<u64>()) {
            let sf = Snowflake::new(id);
            let json = serde_json::to_string(&sf).unwrap();
            let back: Snowflake = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(sf, back);
        }
    }
}
