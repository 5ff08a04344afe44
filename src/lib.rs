//! Blocklist sync: reconcile a Mastodon instance's domain blocks with a shared blocklist document.

pub mod apply;
pub mod blockfile;
pub mod config;
pub mod domain_block;
pub mod error;
pub mod rest;
pub mod sql;
pub mod stats;
pub mod yaml;

pub use apply::{apply, apply_at, apply_server, Applier};
pub use blockfile::{Block, BlockFile};
pub use config::{load_block_file, load_config, ApplyConfig, Mode, ServerConfig};
pub use domain_block::{BlockId, DomainBlock, Severity, WELL_KNOWN_PRIVATE_COMMENT};
pub use error::{ApplyError, ConfigError, ErrorKind};
pub use rest::RestApplier;
pub use sql::{apply_sql, AuditLayout, SqlApplier};
pub use stats::Stats;
