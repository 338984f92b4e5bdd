//! Read-side SQL shared by the writer and the snapshot reader.

use arrow::array::{Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use duckdb::{Connection, ToSql};
use serde::Serialize;

use crate::StoreError;

/// Headline numbers over every compiled section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub sections: u64,
    pub issues: u64,
    pub sections_ok: u64,
    pub sections_with_issues: u64,
    pub eligible_voters: u64,
    pub turnout: u64,
    pub reboots: u64,
    pub states: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundCount {
    pub round: u8,
    pub sections: u64,
}

pub(crate) fn query(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<RecordBatch>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let batches: Vec<RecordBatch> = stmt.query_arrow(params)?.collect();
    Ok(batches)
}

pub(crate) fn count_rows(
    conn: &Connection,
    table: &str,
    predicate: Option<&str>,
) -> Result<usize, StoreError> {
    let sql = match predicate {
        Some(p) => format!("SELECT count(*)::BIGINT FROM {table} WHERE {p}"),
        None => format!("SELECT count(*)::BIGINT FROM {table}"),
    };
    let batches = query(conn, &sql, &[])?;
    Ok(scalar_i64(&batches)? as usize)
}

pub(crate) fn summary(conn: &Connection) -> Result<StoreSummary, StoreError> {
    let batches = query(
        conn,
        "SELECT
            (SELECT count(*) FROM sections)::BIGINT,
            (SELECT count(*) FROM issues)::BIGINT,
            (SELECT count(*) FROM sections WHERE NOT coalesce(has_issues, false))::BIGINT,
            (SELECT count(*) FROM sections WHERE coalesce(has_issues, false))::BIGINT,
            (SELECT coalesce(sum(eligible_voters), 0) FROM sections)::BIGINT,
            (SELECT coalesce(sum(turnout), 0) FROM sections)::BIGINT,
            (SELECT coalesce(sum(reboots), 0) FROM sections)::BIGINT,
            (SELECT count(DISTINCT state) FROM sections)::BIGINT",
        &[],
    )?;
    let batch = batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .ok_or(StoreError::NoResults)?;
    let col = |i: usize| -> Result<u64, StoreError> {
        let array = int64(batch, i)?;
        Ok(u64::try_from(array.value(0)).unwrap_or(0))
    };
    Ok(StoreSummary {
        sections: col(0)?,
        issues: col(1)?,
        sections_ok: col(2)?,
        sections_with_issues: col(3)?,
        eligible_voters: col(4)?,
        turnout: col(5)?,
        reboots: col(6)?,
        states: col(7)?,
    })
}

pub(crate) fn round_counts(conn: &Connection) -> Result<Vec<RoundCount>, StoreError> {
    let batches = query(
        conn,
        "SELECT round::BIGINT, count(*)::BIGINT FROM sections GROUP BY round ORDER BY round",
        &[],
    )?;
    let mut out = Vec::new();
    for batch in &batches {
        let rounds = int64(batch, 0)?;
        let counts = int64(batch, 1)?;
        for i in 0..batch.num_rows() {
            out.push(RoundCount {
                round: u8::try_from(rounds.value(i)).unwrap_or(0),
                sections: u64::try_from(counts.value(i)).unwrap_or(0),
            });
        }
    }
    Ok(out)
}

/// First column of the first row, as BIGINT.
pub(crate) fn scalar_i64(batches: &[RecordBatch]) -> Result<i64, StoreError> {
    let batch = batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .ok_or(StoreError::NoResults)?;
    Ok(int64(batch, 0)?.value(0))
}

/// Non-null values of a VARCHAR column across all batches.
pub(crate) fn string_column(batches: &[RecordBatch], col: usize) -> Result<Vec<String>, StoreError> {
    let mut out = Vec::new();
    for batch in batches {
        let array = batch
            .column(col)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| StoreError::ColumnType(format!("column {col} is not VARCHAR")))?;
        out.extend(array.iter().flatten().map(str::to_string));
    }
    Ok(out)
}

fn int64(batch: &RecordBatch, col: usize) -> Result<&Int64Array, StoreError> {
    batch
        .column(col)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| StoreError::ColumnType(format!("column {col} is not BIGINT")))
}
