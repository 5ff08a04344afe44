//! `Applier` over Mastodon's PostgreSQL tables, inside a caller-owned transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use std::collections::HashMap;

use crate::apply::Applier;
use crate::domain_block::{BlockId, DomainBlock, Severity};
use crate::error::ApplyError;
use crate::sql::audit::{
    recorded_changes, AuditAction, AuditLayout, INSERT_CURRENT, INSERT_LEGACY, SERVER_ACCOUNT_ID,
    TARGET_TYPE_DOMAIN_BLOCK,
};

const SELECT_DOMAIN_BLOCKS: &str = r#"
SELECT
    id, domain, private_comment, public_comment, created_at, updated_at, severity, reject_media, reject_reports, obfuscate
FROM public.domain_blocks
"#;

const INSERT_DOMAIN_BLOCK: &str = r#"
INSERT INTO public.domain_blocks
    (domain, private_comment, public_comment, created_at, updated_at, severity, reject_media, reject_reports, obfuscate)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9)
RETURNING id
"#;

const UPDATE_DOMAIN_BLOCK: &str = r#"
UPDATE public.domain_blocks
SET
    private_comment = $2,
    public_comment = $3,
    updated_at = $4,
    severity = $5,
    reject_media = $6,
    reject_reports = $7,
    obfuscate = $8
WHERE
    id = $1
"#;

const DELETE_DOMAIN_BLOCK: &str = "DELETE FROM public.domain_blocks WHERE id = $1";

/// Runs every call on one connection, normally the inside of a transaction.
///
/// The caller owns the transaction: nothing here commits, so a run either lands whole or
/// not at all. Each `domain_blocks` write is followed by its `admin_action_logs` row.
pub struct SqlApplier<'c> {
    conn: &'c mut PgConnection,
    layout: AuditLayout,
}

impl<'c> SqlApplier<'c> {
    pub fn new(conn: &'c mut PgConnection, layout: AuditLayout) -> Self {
        Self { conn, layout }
    }

    async fn record(&mut self, action: AuditAction, block: &DomainBlock) -> Result<(), ApplyError> {
        let target_id = db_id(block.id)?;
        let created_at = block.created_at.naive_utc();
        let updated_at = block.updated_at.naive_utc();
        let result = match self.layout {
            AuditLayout::Legacy => {
                tracing::debug!(sql = %INSERT_LEGACY, action = action.as_str(), "query (tx)");
                sqlx::query(INSERT_LEGACY)
                    .bind(created_at)
                    .bind(updated_at)
                    .bind(SERVER_ACCOUNT_ID)
                    .bind(action.as_str())
                    .bind(TARGET_TYPE_DOMAIN_BLOCK)
                    .bind(target_id)
                    .bind(recorded_changes(block))
                    .execute(&mut *self.conn)
                    .await
            }
            AuditLayout::Current => {
                tracing::debug!(sql = %INSERT_CURRENT, action = action.as_str(), "query (tx)");
                sqlx::query(INSERT_CURRENT)
                    .bind(created_at)
                    .bind(updated_at)
                    .bind(SERVER_ACCOUNT_ID)
                    .bind(action.as_str())
                    .bind(TARGET_TYPE_DOMAIN_BLOCK)
                    .bind(target_id)
                    .bind(block.domain.as_str())
                    .bind("")
                    .bind("")
                    .execute(&mut *self.conn)
                    .await
            }
        };
        result.map_err(|e| ApplyError::Sql {
            statement: "insert admin_action_logs",
            source: e,
        })?;
        Ok(())
    }
}

fn db_id(id: BlockId) -> Result<i64, ApplyError> {
    i64::try_from(id.0).map_err(|_| ApplyError::InvalidRow(format!("id {} does not fit a bigint", id)))
}

/// `domain_blocks` timestamps are `timestamp without time zone` holding UTC; accept `timestamptz` too.
fn timestamp(row: &PgRow, name: &str) -> Result<DateTime<Utc>, ApplyError> {
    if let Ok(t) = row.try_get::<NaiveDateTime, _>(name) {
        return Ok(t.and_utc());
    }
    row.try_get::<DateTime<Utc>, _>(name).map_err(|e| ApplyError::Sql {
        statement: "select domain_blocks",
        source: e,
    })
}

fn row_to_block(row: &PgRow) -> Result<DomainBlock, ApplyError> {
    let get_err = |e| ApplyError::Sql {
        statement: "select domain_blocks",
        source: e,
    };
    let id: i64 = row.try_get("id").map_err(get_err)?;
    let severity: i32 = row.try_get("severity").map_err(get_err)?;
    Ok(DomainBlock {
        id: BlockId(u64::try_from(id).map_err(|_| ApplyError::InvalidRow(format!("negative id {}", id)))?),
        domain: row.try_get("domain").map_err(get_err)?,
        private_comment: row.try_get("private_comment").map_err(get_err)?,
        public_comment: row.try_get("public_comment").map_err(get_err)?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        severity: Severity::try_from(severity).map_err(ApplyError::InvalidRow)?,
        reject_media: row.try_get("reject_media").map_err(get_err)?,
        reject_reports: row.try_get("reject_reports").map_err(get_err)?,
        obfuscate: row.try_get("obfuscate").map_err(get_err)?,
    })
}

#[async_trait]
impl<'c> Applier for SqlApplier<'c> {
    async fn query(&mut self, out: &mut HashMap<String, DomainBlock>) -> Result<(), ApplyError> {
        tracing::debug!(sql = %SELECT_DOMAIN_BLOCKS, "query (tx)");
        let rows = sqlx::query(SELECT_DOMAIN_BLOCKS)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| ApplyError::Sql {
                statement: "select domain_blocks",
                source: e,
            })?;
        for row in &rows {
            let block = row_to_block(row)?;
            out.insert(block.domain.clone(), block);
        }
        Ok(())
    }

    async fn insert(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
        tracing::debug!(sql = %INSERT_DOMAIN_BLOCK, domain = %block.domain, "query (tx)");
        let id: i64 = sqlx::query_scalar(INSERT_DOMAIN_BLOCK)
            .bind(block.domain.as_str())
            .bind(block.private_comment.as_deref())
            .bind(block.public_comment.as_deref())
            .bind(block.created_at.naive_utc())
            .bind(block.updated_at.naive_utc())
            .bind(block.severity.as_i32())
            .bind(block.reject_media)
            .bind(block.reject_reports)
            .bind(block.obfuscate)
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|e| ApplyError::Sql {
                statement: "insert domain_blocks",
                source: e,
            })?;

        let mut inserted = block.clone();
        inserted.id = BlockId(u64::try_from(id).map_err(|_| ApplyError::InvalidRow(format!("negative id {}", id)))?);
        self.record(AuditAction::Create, &inserted).await
    }

    async fn update(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
        tracing::debug!(sql = %UPDATE_DOMAIN_BLOCK, id = %block.id, "query (tx)");
        sqlx::query(UPDATE_DOMAIN_BLOCK)
            .bind(db_id(block.id)?)
            .bind(block.private_comment.as_deref())
            .bind(block.public_comment.as_deref())
            .bind(block.updated_at.naive_utc())
            .bind(block.severity.as_i32())
            .bind(block.reject_media)
            .bind(block.reject_reports)
            .bind(block.obfuscate)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| ApplyError::Sql {
                statement: "update domain_blocks",
                source: e,
            })?;
        self.record(AuditAction::Update, block).await
    }

    async fn delete(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
        tracing::debug!(sql = %DELETE_DOMAIN_BLOCK, id = %block.id, "query (tx)");
        sqlx::query(DELETE_DOMAIN_BLOCK)
            .bind(db_id(block.id)?)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| ApplyError::Sql {
                statement: "delete domain_blocks",
                source: e,
            })?;
        self.record(AuditAction::Destroy, block).await
    }
}
