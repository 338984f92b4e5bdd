//! Single-writer DuckDB store for compiled sections.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use duckdb::{Connection, ToSql, params};
use tracing::{debug, info, warn};
use urnas_core::SectionId;

use crate::StoreError;
use crate::queries::{self, RoundCount, StoreSummary};
use crate::rows::{IssueRow, OfficeTotalRow, SectionRecord, VoteRow};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sections (
    id                VARCHAR PRIMARY KEY,
    round             INTEGER NOT NULL,
    state             VARCHAR NOT NULL,
    region            VARCHAR NOT NULL,
    municipality      VARCHAR NOT NULL,
    zone              VARCHAR NOT NULL,
    section           VARCHAR NOT NULL,
    generation        VARCHAR,
    phase             VARCHAR,
    equipment_model   VARCHAR,
    session_type      VARCHAR,
    software_version  VARCHAR,
    timezone_offset   INTEGER,
    emitted_at        VARCHAR,
    eligible_voters   INTEGER,
    turnout           INTEGER,
    released_by_code  INTEGER,
    biometric_matches INTEGER,
    biometric_pct     DOUBLE,
    abstention_pct    DOUBLE,
    open_time         VARCHAR,
    close_time        VARCHAR,
    duration_minutes  BIGINT,
    reboots           INTEGER,
    log_errors        INTEGER,
    operator_alerts   INTEGER,
    logged_votes      INTEGER,
    substitutions     INTEGER,
    is_reserve        BOOLEAN,
    has_issues        BOOLEAN,
    n_issues          INTEGER
);
CREATE TABLE IF NOT EXISTS issues (
    section_id  VARCHAR NOT NULL,
    seq         INTEGER NOT NULL,
    code        VARCHAR NOT NULL,
    severity    VARCHAR NOT NULL,
    description VARCHAR,
    legal_basis VARCHAR,
    details     VARCHAR
);
CREATE TABLE IF NOT EXISTS votes (
    section_id  VARCHAR NOT NULL,
    election_id INTEGER,
    office      VARCHAR,
    office_code INTEGER,
    vote_kind   VARCHAR,
    candidate   INTEGER,
    party       INTEGER,
    quantity    INTEGER
);
CREATE TABLE IF NOT EXISTS office_totals (
    section_id   VARCHAR NOT NULL,
    election_id  INTEGER,
    office       VARCHAR,
    office_code  INTEGER,
    turnout      INTEGER,
    nominal      BIGINT,
    blank        BIGINT,
    null_votes   BIGINT,
    party_list   BIGINT,
    no_candidate BIGINT,
    total        BIGINT
);
";

const DETAIL_TABLES: [&str; 3] = ["issues", "votes", "office_totals"];

/// Whether an upsert created a section or replaced an earlier compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// The writer's handle on the primary database file.
///
/// Exactly one of these exists per primary file; readers go through
/// [`SnapshotReader`](crate::SnapshotReader) on a published snapshot
/// instead. Each section is written in its own transaction, section row
/// first, then issues, votes and per-office totals.
pub struct SnapshotStore {
    conn: Connection,
    path: PathBuf,
}

impl SnapshotStore {
    /// Open or create the primary file and its tables.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        info!(path = %path.display(), sections = store.section_count()?, "store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every section id already compiled.
    pub fn existing_ids(&self) -> Result<HashSet<SectionId>, StoreError> {
        let batches = self.query("SELECT id FROM sections", &[])?;
        let ids = queries::string_column(&batches, 0)?
            .into_iter()
            .map(SectionId::from_stored)
            .collect();
        Ok(ids)
    }

    /// Insert or replace one section with all of its detail rows.
    ///
    /// Detail rows of an earlier compile are deleted first, so compiling
    /// the same section twice leaves exactly one copy of everything.
    pub fn upsert_section(&mut self, record: &SectionRecord) -> Result<UpsertOutcome, StoreError> {
        let id = record.id();
        let tx = self.conn.transaction()?;

        let present: i64 = tx.query_row(
            "SELECT count(*)::BIGINT FROM sections WHERE id = ?",
            [id],
            |row| row.get(0),
        )?;
        let outcome = if present > 0 {
            for table in DETAIL_TABLES {
                tx.execute(&format!("DELETE FROM {table} WHERE section_id = ?"), [id])?;
            }
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        };

        let s = &record.section;
        tx.execute(
            "INSERT OR REPLACE INTO sections VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                s.id,
                i32::from(s.round),
                s.state,
                s.region,
                s.municipality,
                s.zone,
                s.section,
                s.generation,
                s.phase,
                s.equipment_model,
                s.session_type,
                s.software_version,
                s.timezone_offset,
                s.emitted_at,
                i64::from(s.eligible_voters),
                i64::from(s.turnout),
                i64::from(s.released_by_code),
                i64::from(s.biometric_matches),
                s.biometric_pct,
                s.abstention_pct,
                s.open_time,
                s.close_time,
                s.duration_minutes,
                i64::from(s.reboots),
                i64::from(s.log_errors),
                i64::from(s.operator_alerts),
                i64::from(s.logged_votes),
                i64::from(s.substitutions),
                s.is_reserve,
                s.has_issues,
                i64::from(s.n_issues),
            ],
        )?;
        insert_issues(&tx, &record.issues)?;
        insert_votes(&tx, &record.votes)?;
        insert_totals(&tx, &record.totals)?;
        tx.commit()?;

        debug!(
            id,
            votes = record.votes.len(),
            issues = record.issues.len(),
            ?outcome,
            "section written"
        );
        Ok(outcome)
    }

    /// Append vote rows outside a section upsert.
    pub fn insert_vote_rows(&mut self, rows: &[VoteRow]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        insert_votes(&tx, rows)?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every compiled row, for a full rebuild.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "DELETE FROM issues; DELETE FROM votes; DELETE FROM office_totals; DELETE FROM sections;",
        )?;
        warn!(path = %self.path.display(), "store cleared");
        Ok(())
    }

    /// Flush the write-ahead log into the primary file.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("CHECKPOINT")?;
        Ok(())
    }

    /// Publish a self-contained copy of the primary file at `dest`.
    ///
    /// The copy goes to a sibling temporary file first and is renamed into
    /// place, so a reader opening `dest` sees either the previous snapshot
    /// or this one, never a partial file.
    pub fn snapshot(&self, dest: &Path) -> Result<(), StoreError> {
        self.checkpoint()?;
        let tmp = with_suffix(dest, ".tmp");
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io(parent))?;
        }
        std::fs::copy(&self.path, &tmp).map_err(io(&tmp))?;
        if let Err(e) = std::fs::rename(&tmp, dest) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io(dest)(e));
        }
        let wal = with_suffix(dest, ".wal");
        if wal.exists() {
            std::fs::remove_file(&wal).map_err(io(&wal))?;
        }
        debug!(dest = %dest.display(), "snapshot published");
        Ok(())
    }

    // ── Counts ──

    pub fn section_count(&self) -> Result<usize, StoreError> {
        queries::count_rows(&self.conn, "sections", None)
    }

    /// Sections matching a SQL predicate (the text after `WHERE`).
    pub fn count_where(&self, predicate: &str) -> Result<usize, StoreError> {
        queries::count_rows(&self.conn, "sections", Some(predicate))
    }

    pub fn summary(&self) -> Result<StoreSummary, StoreError> {
        queries::summary(&self.conn)
    }

    pub fn round_counts(&self) -> Result<Vec<RoundCount>, StoreError> {
        queries::round_counts(&self.conn)
    }

    // ── Escape hatch ──

    /// Execute parameterised SQL and return Arrow RecordBatches.
    pub fn query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<RecordBatch>, StoreError> {
        queries::query(&self.conn, sql, params)
    }
}

fn insert_issues(conn: &Connection, rows: &[IssueRow]) -> Result<(), StoreError> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare("INSERT INTO issues VALUES (?, ?, ?, ?, ?, ?, ?)")?;
    for r in rows {
        stmt.execute(params![
            r.section_id,
            i64::from(r.seq),
            r.code,
            r.severity,
            r.description,
            r.legal_basis,
            r.details,
        ])?;
    }
    Ok(())
}

fn insert_votes(conn: &Connection, rows: &[VoteRow]) -> Result<(), StoreError> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare("INSERT INTO votes VALUES (?, ?, ?, ?, ?, ?, ?, ?)")?;
    for r in rows {
        stmt.execute(params![
            r.section_id,
            i64::from(r.election_id),
            r.office,
            i64::from(r.office_code),
            r.vote_kind,
            r.candidate.map(i64::from),
            r.party.map(i64::from),
            i64::from(r.quantity),
        ])?;
    }
    Ok(())
}

fn insert_totals(conn: &Connection, rows: &[OfficeTotalRow]) -> Result<(), StoreError> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut stmt =
        conn.prepare("INSERT INTO office_totals VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")?;
    for r in rows {
        stmt.execute(params![
            r.section_id,
            i64::from(r.election_id),
            r.office,
            i64::from(r.office_code),
            i64::from(r.turnout),
            big(r.nominal),
            big(r.blank),
            big(r.null_votes),
            big(r.party_list),
            big(r.no_candidate),
            big(r.total),
        ])?;
    }
    Ok(())
}

fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn big(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
