//! Channel names.
//!
//! Every channel is addressed by a dotted name parameterized by an entity id.
//! On the wire a name carries a visibility prefix (`private-` or `presence-`);
//! both kinds require per-subscriber authorization. The prefix is stripped
//! before the name is matched against the known patterns.
//!
//! | pattern                         | variant                      |
//! |---------------------------------|------------------------------|
//! | `user.{id}`                     | [`Channel::User`]            |
//! | `App.Models.User.{id}`          | [`Channel::FrameworkUser`]   |
//! | `ai.user.{id}`                  | [`Channel::AiUser`]          |
//! | `ai.notifications.user.{id}`    | [`Channel::AiNotifications`] |
//! | `ai.chat.{conversationId}`      | [`Channel::AiChat`]          |
//! | `ai.fraud.seller.{id}`          | [`Channel::FraudSeller`]     |
//! | `ai.fraud.admin`                | [`Channel::FraudAdmin`]      |
//! | `ai.sentiment.seller.{id}`      | [`Channel::SentimentSeller`] |
//! | `ai.abtest.admin`               | [`Channel::AbTestAdmin`]     |

use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const PRIVATE_PREFIX: &str = "private-";
const PRESENCE_PREFIX: &str = "presence-";

/// A parsed channel name, without its visibility prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// `user.{id}`
    User(u64),
    /// `App.Models.User.{id}`, the framework's default per-user channel.
    FrameworkUser(u64),
    /// `ai.user.{id}`
    AiUser(u64),
    /// `ai.notifications.user.{id}`
    AiNotifications(u64),
    /// `ai.chat.{conversationId}`
    AiChat(CompactString),
    /// `ai.fraud.seller.{id}`
    FraudSeller(u64),
    /// `ai.fraud.admin`
    FraudAdmin,
    /// `ai.sentiment.seller.{id}`
    SentimentSeller(u64),
    /// `ai.abtest.admin`
    AbTestAdmin,
}

/// Errors produced while parsing a channel name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelParseError {
    #[error("channel name `{0}` does not match any known pattern")]
    UnknownPattern(String),
    #[error("channel name `{0}` has an invalid id segment")]
    InvalidId(String),
    #[error("channel name `{0}` has no private- or presence- prefix")]
    MissingVisibility(String),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::User(id) => write!(f, "user.{id}"),
            Channel::FrameworkUser(id) => write!(f, "App.Models.User.{id}"),
            Channel::AiUser(id) => write!(f, "ai.user.{id}"),
            Channel::AiNotifications(id) => write!(f, "ai.notifications.user.{id}"),
            Channel::AiChat(conversation) => write!(f, "ai.chat.{conversation}"),
            Channel::FraudSeller(id) => write!(f, "ai.fraud.seller.{id}"),
            Channel::FraudAdmin => f.write_str("ai.fraud.admin"),
            Channel::SentimentSeller(id) => write!(f, "ai.sentiment.seller.{id}"),
            Channel::AbTestAdmin => f.write_str("ai.abtest.admin"),
        }
    }
}

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "ai.fraud.admin" => return Ok(Channel::FraudAdmin),
            "ai.abtest.admin" => return Ok(Channel::AbTestAdmin),
            _ => {}
        }

        let numeric: [(&str, fn(u64) -> Channel); 6] = [
            ("ai.notifications.user.", Channel::AiNotifications),
            ("ai.user.", Channel::AiUser),
            ("ai.fraud.seller.", Channel::FraudSeller),
            ("ai.sentiment.seller.", Channel::SentimentSeller),
            ("App.Models.User.", Channel::FrameworkUser),
            ("user.", Channel::User),
        ];
        for (prefix, build) in numeric {
            if let Some(rest) = name.strip_prefix(prefix) {
                return parse_id(name, rest).map(build);
            }
        }

        if let Some(conversation) = name.strip_prefix("ai.chat.") {
            if conversation.is_empty() || conversation.contains('.') {
                return Err(ChannelParseError::InvalidId(name.to_owned()));
            }
            return Ok(Channel::AiChat(CompactString::from(conversation)));
        }

        Err(ChannelParseError::UnknownPattern(name.to_owned()))
    }
}

/// Parse a canonical decimal id: digits only, no sign, no leading zeros.
fn parse_id(name: &str, segment: &str) -> Result<u64, ChannelParseError> {
    let canonical = !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'));
    if !canonical {
        return Err(ChannelParseError::InvalidId(name.to_owned()));
    }
    segment
        .parse()
        .map_err(|_| ChannelParseError::InvalidId(name.to_owned()))
}

/// Channel visibility carried by the wire prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Visibility {
    /// `private-` channels: authorization only.
    Private,
    /// `presence-` channels: authorization plus member data.
    Presence,
}

impl Visibility {
    pub fn prefix(self) -> &'static str {
        match self {
            Visibility::Private => PRIVATE_PREFIX,
            Visibility::Presence => PRESENCE_PREFIX,
        }
    }
}

/// A full wire channel name: visibility prefix plus [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName {
    pub visibility: Visibility,
    pub channel: Channel,
}

impl ChannelName {
    pub fn private(channel: Channel) -> Self {
        Self {
            visibility: Visibility::Private,
            channel,
        }
    }

    pub fn presence(channel: Channel) -> Self {
        Self {
            visibility: Visibility::Presence,
            channel,
        }
    }

    pub fn is_presence(&self) -> bool {
        self.visibility == Visibility::Presence
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.visibility.prefix(), self.channel)
    }
}

impl FromStr for ChannelName {
    type Err = ChannelParseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let (visibility, rest) = if let Some(rest) = name.strip_prefix(PRIVATE_PREFIX) {
            (Visibility::Private, rest)
        } else if let Some(rest) = name.strip_prefix(PRESENCE_PREFIX) {
            (Visibility::Presence, rest)
        } else {
            return Err(ChannelParseError::MissingVisibility(name.to_owned()));
        };
        Ok(Self {
            visibility,
            channel: rest.parse()?,
        })
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for ChannelName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
