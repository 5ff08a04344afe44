//! `admin_action_logs` rows recorded alongside every `domain_blocks` mutation.

use chrono::{DateTime, FixedOffset, Utc};

use crate::domain_block::DomainBlock;
use crate::yaml::{self, Node, NodeRef};

/// Account id Mastodon uses for actions taken by the server itself.
pub const SERVER_ACCOUNT_ID: i64 = -99;
pub const TARGET_TYPE_DOMAIN_BLOCK: &str = "DomainBlock";

const TIME_WITH_ZONE_TAG: &str = "!ruby/object:ActiveSupport::TimeWithZone";
const TIME_ZONE_TAG: &str = "!ruby/object:ActiveSupport::TimeZone";
const ZONE_NAME: &str = "Etc/UTC";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Destroy,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Destroy => "destroy",
        }
    }
}

/// Column layout of `admin_action_logs`, which changed between Mastodon generations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditLayout {
    /// 3.x: the change is a YAML dump in `recorded_changes`.
    Legacy,
    /// 4.x: `human_identifier`, `route_param` and `permalink` instead.
    Current,
}

pub(crate) const INSERT_LEGACY: &str = r#"
INSERT INTO public.admin_action_logs
    (created_at, updated_at, account_id, action, target_type, target_id, recorded_changes)
VALUES
    ($1, $2, $3, $4, $5, $6, $7)
"#;

pub(crate) const INSERT_CURRENT: &str = r#"
INSERT INTO public.admin_action_logs
    (created_at, updated_at, account_id, action, target_type, target_id, human_identifier, route_param, permalink)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

/// Ruby's `Time#inspect`-style rendering: nanoseconds, then `Z` or `±HH:MM`.
pub fn ruby_time(t: DateTime<FixedOffset>) -> String {
    let zone = if t.offset().local_minus_utc() == 0 {
        "Z".to_string()
    } else {
        t.format("%:z").to_string()
    };
    format!("{} {}", t.format("%Y-%m-%d %H:%M:%S%.9f"), zone)
}

/// `ActiveSupport::TimeWithZone` as Psych dumps it. `utc` and `time` must be the same node.
fn time_with_zone(t: DateTime<Utc>, zone: &NodeRef) -> NodeRef {
    let instant = Node::time(ruby_time(t.into()));
    Node::tagged_map(
        TIME_WITH_ZONE_TAG,
        vec![
            ("utc", instant.clone()),
            ("zone", zone.clone()),
            ("time", instant),
        ],
    )
}

/// YAML for the legacy `recorded_changes` column.
pub fn recorded_changes(block: &DomainBlock) -> String {
    let zone = Node::tagged_map(TIME_ZONE_TAG, vec![("name", Node::str(ZONE_NAME))]);
    let root = Node::map(vec![
        ("id", Node::int(block.id.0)),
        ("domain", Node::str(block.domain.as_str())),
        ("created_at", time_with_zone(block.created_at, &zone)),
        ("updated_at", time_with_zone(block.updated_at, &zone)),
        ("severity", Node::str(block.severity.name())),
        ("reject_media", Node::bool(block.reject_media)),
        ("reject_reports", Node::bool(block.reject_reports)),
        ("private_comment", Node::opt_str(block.private_comment.as_deref())),
        ("public_comment", Node::opt_str(block.public_comment.as_deref())),
        ("obfuscate", Node::bool(block.obfuscate)),
    ]);
    yaml::to_document(&root)
}
