//! The desired-state blocklist document, as published by the feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SPEC_V1: &str = "https://rapidblock.org/spec/v1/";

/// A verified blocklist document. Signature and checksum checks happen before this is built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockFile {
    #[serde(rename = "@spec")]
    pub spec: String,
    #[serde(rename = "publishedAt")]
    pub published_at: DateTime<Utc>,
    /// Keyed by domain; sorted so that runs mutate in a stable order.
    #[serde(default)]
    pub blocks: BTreeMap<String, Block>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub is_blocked: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub date_requested: DateTime<Utc>,
    pub date_decided: DateTime<Utc>,
}

impl BlockFile {
    pub fn new(published_at: DateTime<Utc>) -> Self {
        BlockFile {
            spec: SPEC_V1.to_string(),
            published_at,
            blocks: BTreeMap::new(),
        }
    }
}
