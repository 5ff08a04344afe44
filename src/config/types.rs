//! Raw config types matching the servers file (JSON or YAML).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Which backend, and which generation of it, a server is reached through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    #[default]
    NoOp,
    Mastodon3xSql,
    Mastodon4xSql,
    Mastodon4xRest,
}

struct ModeData {
    mode: Mode,
    name: &'static str,
    aliases: &'static [&'static str],
}

const MODE_DATA: &[ModeData] = &[
    ModeData { mode: Mode::NoOp, name: "noop", aliases: &[""] },
    ModeData { mode: Mode::Mastodon3xSql, name: "mastodon-3.x-sql", aliases: &["mastodon-3.x"] },
    ModeData { mode: Mode::Mastodon4xSql, name: "mastodon-4.x-sql", aliases: &[] },
    ModeData { mode: Mode::Mastodon4xRest, name: "mastodon-4.x-rest", aliases: &["mastodon-4.x"] },
];

impl Mode {
    pub fn name(self) -> &'static str {
        MODE_DATA
            .iter()
            .find(|d| d.mode == self)
            .map(|d| d.name)
            .unwrap_or("noop")
    }

    pub fn is_sql(self) -> bool {
        matches!(self, Mode::Mastodon3xSql | Mode::Mastodon4xSql)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MODE_DATA
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(s) || d.aliases.iter().any(|a| a.eq_ignore_ascii_case(s)))
            .map(|d| d.mode)
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub mode: Mode,
    /// PostgreSQL connection string for SQL modes, instance base URL for REST.
    #[serde(default)]
    pub uri: String,
    #[serde(default, rename = "clientToken")]
    pub client_token: Option<String>,
}

/// All servers one run applies the blocklist to, in order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApplyConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_and_aliases() {
        assert_eq!("mastodon-4.x".parse::<Mode>().unwrap(), Mode::Mastodon4xRest);
        assert_eq!("Mastodon-3.X".parse::<Mode>().unwrap(), Mode::Mastodon3xSql);
        assert_eq!("".parse::<Mode>().unwrap(), Mode::NoOp);
        assert_eq!(Mode::Mastodon4xSql.to_string(), "mastodon-4.x-sql");
        assert!(matches!("pleroma".parse::<Mode>(), Err(ConfigError::UnknownMode(_))));
    }

    #[test]
    fn server_from_yaml() {
        let raw = "servers:\n  - name: social\n    mode: mastodon-4.x-rest\n    uri: https://social.example\n    clientToken: abc\n";
        let config: ApplyConfig = serde_yaml::from_str(raw).unwrap();
        let server = &config.servers[0];
        assert_eq!(server.mode, Mode::Mastodon4xRest);
        assert_eq!(server.client_token.as_deref(), Some("abc"));
    }
}
