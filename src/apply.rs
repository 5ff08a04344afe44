//! Reconciliation: diff the blocklist document against a backend and issue the minimal mutations.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use tracing::Instrument;

use crate::blockfile::BlockFile;
use crate::config::{validate_server, Mode, ServerConfig};
use crate::domain_block::{DomainBlock, Severity, WELL_KNOWN_PRIVATE_COMMENT};
use crate::error::{ApplyError, Operation};
use crate::rest::RestApplier;
use crate::sql::apply_sql;
use crate::stats::Stats;

/// Storage backend capability. Implementations decide their own transactionality.
#[async_trait]
pub trait Applier: Send {
    /// Fill `out` with every existing block keyed by domain, as one consistent snapshot.
    async fn query(&mut self, out: &mut HashMap<String, DomainBlock>) -> Result<(), ApplyError>;
    /// Create a block and record an audit entry. The backend assigns the id.
    async fn insert(&mut self, block: &DomainBlock) -> Result<(), ApplyError>;
    /// Modify the block with `block.id` and record an audit entry.
    async fn update(&mut self, block: &DomainBlock) -> Result<(), ApplyError>;
    /// Remove the block with `block.id` and record an audit entry.
    async fn delete(&mut self, block: &DomainBlock) -> Result<(), ApplyError>;
}

/// Reconcile `file` against `applier` using the current time.
pub async fn apply<A>(applier: &mut A, file: &BlockFile) -> Result<Stats, ApplyError>
where
    A: Applier + ?Sized,
{
    apply_at(applier, file, Utc::now()).await
}

/// Reconcile `file` against `applier`, stamping mutations with `now`.
///
/// Blocks whose `private_comment` is not the well-known marker belong to an admin and are
/// never touched. On error the run stops; mutations already issued are not undone here.
pub async fn apply_at<A>(
    applier: &mut A,
    file: &BlockFile,
    now: DateTime<Utc>,
) -> Result<Stats, ApplyError>
where
    A: Applier + ?Sized,
{
    // postgres timestamps carry microseconds
    let now = now.trunc_subsecs(6);

    let mut existing_blocks = HashMap::with_capacity(1024);
    applier
        .query(&mut existing_blocks)
        .await
        .map_err(|e| ApplyError::Query { source: Box::new(e) })?;
    tracing::debug!(existing = existing_blocks.len(), desired = file.blocks.len(), "snapshot loaded");

    let mut stats = Stats::default();
    for (domain, block) in &file.blocks {
        let mut goal = DomainBlock {
            domain: domain.clone(),
            private_comment: Some(WELL_KNOWN_PRIVATE_COMMENT.to_string()),
            created_at: now,
            updated_at: now,
            severity: Severity::NoOp,
            ..DomainBlock::default()
        };
        if block.is_blocked {
            goal.public_comment = Some(block.reason.clone());
            goal.severity = Severity::Suspend;
        }

        let existing = existing_blocks.get(domain);
        if let Some(existing) = existing {
            goal.id = existing.id;
            goal.created_at = existing.created_at;
            goal.updated_at = existing.updated_at;
            if *existing == goal {
                continue;
            }
            if existing.private_comment != goal.private_comment {
                tracing::debug!(domain = %domain, "skipping block managed by an admin");
                continue;
            }
        }

        goal.updated_at = now;

        let op = match (block.is_blocked, existing.is_some()) {
            (true, true) => Operation::Update,
            (true, false) => Operation::Insert,
            (false, true) => Operation::Delete,
            (false, false) => continue,
        };
        let result = match op {
            Operation::Insert => applier.insert(&goal).await,
            Operation::Update => applier.update(&goal).await,
            Operation::Delete => applier.delete(&goal).await,
        };
        result.map_err(|e| ApplyError::Operation {
            op,
            domain: domain.clone(),
            source: Box::new(e),
        })?;
        match op {
            Operation::Insert => stats.insert_count += 1,
            Operation::Update => stats.update_count += 1,
            Operation::Delete => stats.delete_count += 1,
        }
        tracing::info!(domain = %domain, op = ?op, "domain block applied");
    }
    Ok(stats)
}

/// Apply `file` to one configured server, building the backend its mode calls for.
///
/// The server is validated first, so a config that never went through `load_config`
/// fails with `ApplyError::Config` before anything is contacted.
///
/// SQL modes commit everything or nothing. The REST mode has no transaction: if it fails
/// partway, the mutations made before the failure stay applied.
pub async fn apply_server(server: &ServerConfig, file: &BlockFile) -> Result<Stats, ApplyError> {
    let span = tracing::info_span!("server", name = %server.name, mode = %server.mode);
    dispatch(server, file).instrument(span).await
}

async fn dispatch(server: &ServerConfig, file: &BlockFile) -> Result<Stats, ApplyError> {
    validate_server(server)?;
    match server.mode {
        Mode::NoOp => Ok(Stats::default()),
        m if m.is_sql() => apply_sql(server, file).await,
        _ => {
            let token = server.client_token.as_deref().unwrap_or_default();
            let mut applier = RestApplier::new(&server.uri, token)?;
            apply(&mut applier, file).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockfile::Block;
    use crate::domain_block::BlockId;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Insert(DomainBlock),
        Update(DomainBlock),
        Delete(DomainBlock),
    }

    /// In-memory backend that records every mutation and applies it to its own table.
    #[derive(Default)]
    struct RecordingApplier {
        table: HashMap<String, DomainBlock>,
        calls: Vec<Call>,
        next_id: u64,
        fail_on: Option<String>,
    }

    impl RecordingApplier {
        fn with(blocks: impl IntoIterator<Item = DomainBlock>) -> Self {
            let mut applier = RecordingApplier {
                next_id: 100,
                ..Default::default()
            };
            for b in blocks {
                applier.table.insert(b.domain.clone(), b);
            }
            applier
        }

        fn check(&self, block: &DomainBlock) -> Result<(), ApplyError> {
            if self.fail_on.as_deref() == Some(block.domain.as_str()) {
                return Err(ApplyError::InvalidRow("boom".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Applier for RecordingApplier {
        async fn query(&mut self, out: &mut HashMap<String, DomainBlock>) -> Result<(), ApplyError> {
            out.extend(self.table.clone());
            Ok(())
        }

        async fn insert(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
            self.check(block)?;
            self.calls.push(Call::Insert(block.clone()));
            let mut stored = block.clone();
            stored.id = BlockId(self.next_id);
            self.next_id += 1;
            self.table.insert(stored.domain.clone(), stored);
            Ok(())
        }

        async fn update(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
            self.check(block)?;
            self.calls.push(Call::Update(block.clone()));
            self.table.insert(block.domain.clone(), block.clone());
            Ok(())
        }

        async fn delete(&mut self, block: &DomainBlock) -> Result<(), ApplyError> {
            self.check(block)?;
            self.calls.push(Call::Delete(block.clone()));
            self.table.remove(&block.domain);
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    fn earlier() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    fn file(entries: &[(&str, bool, &str)]) -> BlockFile {
        let mut file = BlockFile::new(earlier());
        for (domain, is_blocked, reason) in entries {
            file.blocks.insert(
                domain.to_string(),
                Block {
                    is_blocked: *is_blocked,
                    reason: reason.to_string(),
                    date_requested: earlier(),
                    date_decided: earlier(),
                    ..Block::default()
                },
            );
        }
        file
    }

    fn managed(id: u64, domain: &str, reason: Option<&str>, severity: Severity) -> DomainBlock {
        DomainBlock {
            id: BlockId(id),
            domain: domain.to_string(),
            private_comment: Some(WELL_KNOWN_PRIVATE_COMMENT.to_string()),
            public_comment: reason.map(String::from),
            created_at: earlier(),
            updated_at: earlier(),
            severity,
            ..DomainBlock::default()
        }
    }

    #[tokio::test]
    async fn inserts_new_block() {
        let mut applier = RecordingApplier::with([]);
        let stats = apply_at(&mut applier, &file(&[("bad.example", true, "spam")]), now())
            .await
            .unwrap();

        assert_eq!(stats, Stats { insert_count: 1, update_count: 0, delete_count: 0 });
        assert_eq!(applier.calls.len(), 1);
        let Call::Insert(block) = &applier.calls[0] else {
            panic!("expected insert, got {:?}", applier.calls[0]);
        };
        assert_eq!(block.domain, "bad.example");
        assert_eq!(block.severity, Severity::Suspend);
        assert_eq!(block.public_comment.as_deref(), Some("spam"));
        assert_eq!(block.private_comment.as_deref(), Some(WELL_KNOWN_PRIVATE_COMMENT));
        assert_eq!(block.created_at, now());
        assert_eq!(block.updated_at, now());
        assert!(!block.reject_media && !block.reject_reports && !block.obfuscate);
    }

    #[tokio::test]
    async fn converged_block_is_left_alone() {
        let mut applier =
            RecordingApplier::with([managed(1, "bad.example", Some("spam"), Severity::Suspend)]);
        let stats = apply_at(&mut applier, &file(&[("bad.example", true, "spam")]), now())
            .await
            .unwrap();
        assert!(stats.is_empty());
        assert!(applier.calls.is_empty());
    }

    #[tokio::test]
    async fn changed_reason_updates_in_place() {
        let mut applier =
            RecordingApplier::with([managed(7, "bad.example", Some("old"), Severity::Suspend)]);
        let stats = apply_at(&mut applier, &file(&[("bad.example", true, "new")]), now())
            .await
            .unwrap();

        assert_eq!(stats.update_count, 1);
        let Call::Update(block) = &applier.calls[0] else {
            panic!("expected update, got {:?}", applier.calls[0]);
        };
        assert_eq!(block.id, BlockId(7));
        assert_eq!(block.created_at, earlier());
        assert_eq!(block.updated_at, now());
        assert_eq!(block.public_comment.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn unblocked_domain_is_deleted() {
        let mut applier =
            RecordingApplier::with([managed(3, "ok.example", Some("spam"), Severity::Suspend)]);
        let stats = apply_at(&mut applier, &file(&[("ok.example", false, "")]), now())
            .await
            .unwrap();

        assert_eq!(stats, Stats { insert_count: 0, update_count: 0, delete_count: 1 });
        let Call::Delete(block) = &applier.calls[0] else {
            panic!("expected delete, got {:?}", applier.calls[0]);
        };
        assert_eq!(block.id, BlockId(3));
        assert!(applier.table.is_empty());
    }

    #[tokio::test]
    async fn unblocked_and_absent_does_nothing() {
        let mut applier = RecordingApplier::with([]);
        let stats = apply_at(&mut applier, &file(&[("ok.example", false, "")]), now())
            .await
            .unwrap();
        assert!(stats.is_empty());
        assert!(applier.calls.is_empty());
    }

    #[tokio::test]
    async fn admin_blocks_are_never_touched() {
        let mut by_admin = managed(1, "a.example", Some("local"), Severity::Silence);
        by_admin.private_comment = Some("handled by mod team".into());
        let mut no_comment = managed(2, "b.example", None, Severity::Suspend);
        no_comment.private_comment = None;
        let mut applier = RecordingApplier::with([by_admin, no_comment]);

        let doc = file(&[("a.example", true, "spam"), ("b.example", false, "")]);
        let stats = apply_at(&mut applier, &doc, now()).await.unwrap();

        assert!(stats.is_empty());
        assert!(applier.calls.is_empty());
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let mut applier = RecordingApplier::with([
            managed(1, "stale.example", Some("old"), Severity::Suspend),
            managed(2, "gone.example", Some("spam"), Severity::Suspend),
        ]);
        let doc = file(&[
            ("new.example", true, "spam"),
            ("stale.example", true, "fresh"),
            ("gone.example", false, ""),
            ("never.example", false, ""),
        ]);

        let first = apply_at(&mut applier, &doc, now()).await.unwrap();
        assert_eq!(first, Stats { insert_count: 1, update_count: 1, delete_count: 1 });
        assert_eq!(applier.calls.len(), 3);

        applier.calls.clear();
        let second = apply_at(&mut applier, &doc, now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(second.is_empty());
        assert!(applier.calls.is_empty());
    }

    #[tokio::test]
    async fn failure_aborts_and_names_the_domain() {
        let mut applier = RecordingApplier::with([]);
        applier.fail_on = Some("b.example".into());
        let doc = file(&[("a.example", true, "x"), ("b.example", true, "y"), ("c.example", true, "z")]);

        let err = apply_at(&mut applier, &doc, now()).await.unwrap_err();
        match &err {
            ApplyError::Operation { op, domain, .. } => {
                assert_eq!(*op, Operation::Insert);
                assert_eq!(domain, "b.example");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().contains("\"b.example\""));
        // a.example went through before the failure and is not rolled back.
        assert_eq!(applier.calls.len(), 1);
        assert!(applier.table.contains_key("a.example"));
        assert!(!applier.table.contains_key("c.example"));
    }

    #[tokio::test]
    async fn now_is_truncated_to_microseconds() {
        let precise = now() + chrono::Duration::nanoseconds(123_456_789);
        let mut applier = RecordingApplier::with([]);
        apply_at(&mut applier, &file(&[("bad.example", true, "spam")]), precise)
            .await
            .unwrap();
        let Call::Insert(block) = &applier.calls[0] else {
            panic!("expected insert");
        };
        assert_eq!(block.created_at.timestamp_subsec_nanos(), 123_456_000);
    }
}
