//! Actual-state domain block records as Mastodon stores and serves them.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// `private_comment` value marking a block as managed by this tool.
pub const WELL_KNOWN_PRIVATE_COMMENT: &str = "RapidBlock";

/// Backend-assigned identity. Mastodon serves ids as JSON strings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl<'de> Visitor<'de> for IdVisitor {
            type Value = BlockId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an unsigned integer or a string holding one")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<BlockId, E> {
                Ok(BlockId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<BlockId, E> {
                u64::try_from(v)
                    .map(BlockId)
                    .map_err(|_| E::custom(format!("negative id {}", v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<BlockId, E> {
                v.trim()
                    .parse::<u64>()
                    .map(BlockId)
                    .map_err(|e| E::custom(format!("failed to parse {:?} as id: {}", v, e)))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// Moderation level. The integer values are the ones Mastodon keeps in its database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Severity {
    #[default]
    Silence = 0,
    Suspend = 1,
    NoOp = 2,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Silence, Severity::Suspend, Severity::NoOp];

    pub fn name(self) -> &'static str {
        match self {
            Severity::Silence => "silence",
            Severity::Suspend => "suspend",
            Severity::NoOp => "noop",
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Severity::ALL
            .into_iter()
            .find(|sev| sev.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown severity {:?}", s))
    }
}

impl TryFrom<i32> for Severity {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_i32() == value)
            .ok_or_else(|| format!("severity {} out of range", value))
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// One row of `domain_blocks`, or one element of the admin API listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBlock {
    pub id: BlockId,
    pub domain: String,
    #[serde(default)]
    pub private_comment: Option<String>,
    #[serde(default)]
    pub public_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    /// The admin API does not serve this field; it stays at the epoch for REST records.
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    pub severity: Severity,
    #[serde(default)]
    pub reject_media: bool,
    #[serde(default)]
    pub reject_reports: bool,
    #[serde(default)]
    pub obfuscate: bool,
}

impl DomainBlock {
    /// True when the block carries this tool's ownership marker.
    pub fn is_managed(&self) -> bool {
        self.private_comment.as_deref() == Some(WELL_KNOWN_PRIVATE_COMMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_admin_api_record() {
        let raw = r#"{
            "id": "42",
            "domain": "bad.example",
            "created_at": "2023-03-04T05:06:07.123Z",
            "severity": "suspend",
            "reject_media": false,
            "reject_reports": false,
            "private_comment": "RapidBlock",
            "public_comment": null,
            "obfuscate": false
        }"#;
        let block: DomainBlock = serde_json::from_str(raw).unwrap();
        assert_eq!(block.id, BlockId(42));
        assert_eq!(block.severity, Severity::Suspend);
        assert!(block.is_managed());
        assert_eq!(block.public_comment, None);
        assert_eq!(block.updated_at, DateTime::<Utc>::default());
    }

    #[test]
    fn id_accepts_numbers_and_serializes_as_string() {
        let id: BlockId = serde_json::from_str("7").unwrap();
        assert_eq!(id, BlockId(7));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"7\"");
        assert!(serde_json::from_str::<BlockId>("\"x7\"").is_err());
    }

    #[test]
    fn severity_names_and_numbers() {
        assert_eq!("SUSPEND".parse::<Severity>().unwrap(), Severity::Suspend);
        assert_eq!(Severity::try_from(2).unwrap(), Severity::NoOp);
        assert!(Severity::try_from(3).is_err());
        assert_eq!(Severity::NoOp.to_string(), "noop");
    }
}
