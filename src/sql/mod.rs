//! PostgreSQL backend: one transaction per run, audited writes.

mod applier;
pub mod audit;

pub use applier::SqlApplier;
pub use audit::{AuditAction, AuditLayout};

use sqlx::{Connection, PgConnection};

use crate::apply::apply;
use crate::blockfile::BlockFile;
use crate::config::{Mode, ServerConfig};
use crate::error::ApplyError;
use crate::stats::Stats;

/// Which `admin_action_logs` layout a SQL mode writes.
pub fn audit_layout(mode: Mode) -> AuditLayout {
    match mode {
        Mode::Mastodon3xSql => AuditLayout::Legacy,
        _ => AuditLayout::Current,
    }
}

/// Connect to `server.uri` and apply `file` in a single transaction.
pub async fn apply_sql(server: &ServerConfig, file: &BlockFile) -> Result<Stats, ApplyError> {
    let mut conn = PgConnection::connect(&server.uri).await?;
    let result = apply_in_transaction(&mut conn, audit_layout(server.mode), file).await;
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close PostgreSQL connection");
    }
    result
}

/// Begin, reconcile, and commit once. Any error rolls the whole run back.
pub async fn apply_in_transaction(
    conn: &mut PgConnection,
    layout: AuditLayout,
    file: &BlockFile,
) -> Result<Stats, ApplyError> {
    let mut tx = conn.begin().await?;
    let result = {
        let mut applier = SqlApplier::new(&mut tx, layout);
        apply(&mut applier, file).await
    };
    match result {
        Ok(stats) => {
            tx.commit().await?;
            tracing::info!(
                inserted = stats.insert_count,
                updated = stats.update_count,
                deleted = stats.delete_count,
                "transaction committed"
            );
            Ok(stats)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_mastodon_generation() {
        assert_eq!(audit_layout(Mode::Mastodon3xSql), AuditLayout::Legacy);
        assert_eq!(audit_layout(Mode::Mastodon4xSql), AuditLayout::Current);
    }
}
