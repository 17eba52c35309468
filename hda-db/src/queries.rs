//! Time series storage and retrieval against the SQL schema.
//!
//! All instants crossing this module are UTC, formatted as
//! `YYYY-MM-DD HH:MM:SS` text. A NULL `value` column is a missing sample.
//! Non-versioned rows carry the sentinel version date; retrievals without
//! an explicit version date collapse versions per sample time, taking the
//! maximum or minimum version date as requested.

use chrono::NaiveDateTime;
use hda_core::backend::{TsPoint, TsReadRequest, TsWriteRequest};
use hda_core::config::non_versioned_date;
use hda_core::identifier::TsIdentifier;
use hda_core::{DataAccessError, Result, StoreRule};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn fmt_dt(t: &NaiveDateTime) -> String {
    t.format(DT_FMT).to_string()
}

pub(crate) fn parse_dt(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FMT)
        .map_err(|_| DataAccessError::MalformedResponse(format!("bad timestamp \"{s}\"")))
}

/// The version-date column value marking non-versioned rows.
pub(crate) fn version_text(version_date_utc: Option<NaiveDateTime>) -> String {
    fmt_dt(&version_date_utc.unwrap_or_else(non_versioned_date))
}

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> DataAccessError + '_ {
    move |e| DataAccessError::backend(context.to_string(), e)
}

/// Earliest and latest sample times for a series, or `None` when it has no
/// rows.
pub fn time_series_extents(
    conn: &Connection,
    ts_id: &str,
    office: Option<&str>,
) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
    let row: (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT MIN(date_time), MAX(date_time)
             FROM ts_value
             WHERE ts_id = ?1 AND office = ?2",
            params![ts_id, office.unwrap_or("")],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(db_err("reading time series extents"))?;
    match row {
        (Some(first), Some(last)) => Ok(Some((parse_dt(&first)?, parse_dt(&last)?))),
        _ => Ok(None),
    }
}

/// The version-date predicate shared by windowed and adjacent retrieval.
/// `pin_param` is the placeholder bound when a version date is pinned;
/// otherwise versions collapse per sample time via the correlated subquery.
fn version_filter(req: &TsReadRequest, pin_param: &str) -> String {
    match req.version_date_utc {
        Some(_) => format!("version_date = {pin_param}"),
        None => format!(
            "version_date = (SELECT {}(version_date) FROM ts_value w
                             WHERE w.ts_id = v.ts_id AND w.office = v.office
                               AND w.date_time = v.date_time)",
            if req.max_version { "MAX" } else { "MIN" }
        ),
    }
}

/// Retrieve samples for a resolved read request.
pub fn retrieve_time_series(conn: &Connection, req: &TsReadRequest) -> Result<Vec<TsPoint>> {
    let start_op = if req.start_inclusive { ">=" } else { ">" };
    let end_op = if req.end_inclusive { "<=" } else { "<" };
    let version_filter = version_filter(req, "?5");
    let version_param = version_text(req.version_date_utc);
    let office = req.office.as_deref().unwrap_or("");
    let start = fmt_dt(&req.start_utc);
    let end = fmt_dt(&req.end_utc);

    let sql = format!(
        "SELECT date_time, value, quality FROM ts_value v
         WHERE ts_id = ?1 AND office = ?2
           AND date_time {start_op} ?3 AND date_time {end_op} ?4
           AND {version_filter}
         ORDER BY date_time"
    );
    let mut stmt = conn.prepare(&sql).map_err(db_err("preparing retrieval"))?;
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<f64>>(1)?,
            row.get::<_, i32>(2)?,
        ))
    };
    let rows = if req.version_date_utc.is_some() {
        stmt.query_map(params![req.ts_id, office, start, end, version_param], map_row)
            .and_then(|r| r.collect::<std::result::Result<Vec<_>, _>>())
    } else {
        stmt.query_map(params![req.ts_id, office, start, end], map_row)
            .and_then(|r| r.collect::<std::result::Result<Vec<_>, _>>())
    }
    .map_err(db_err("retrieving time series"))?;

    let mut points = Vec::with_capacity(rows.len());
    for (time, value, quality) in rows {
        points.push(TsPoint {
            time_utc: parse_dt(&time)?,
            value,
            quality,
        });
    }

    if req.retrieve_previous {
        if let Some(p) = adjacent_point(conn, req, &start, true)? {
            points.insert(0, p);
        }
    }
    if req.retrieve_next {
        if let Some(p) = adjacent_point(conn, req, &end, false)? {
            points.push(p);
        }
    }
    if req.trim_missing {
        while points.first().map(|p| p.value.is_none()).unwrap_or(false) {
            points.remove(0);
        }
        while points.last().map(|p| p.value.is_none()).unwrap_or(false) {
            points.pop();
        }
    }
    debug!("retrieved {} rows for {}", points.len(), req.ts_id);
    Ok(points)
}

/// The sample immediately before (`before = true`) or after the boundary,
/// within the same version selection as the windowed rows.
fn adjacent_point(
    conn: &Connection,
    req: &TsReadRequest,
    boundary: &str,
    before: bool,
) -> Result<Option<TsPoint>> {
    let (op, order) = if before { ("<", "DESC") } else { (">", "ASC") };
    let version_filter = version_filter(req, "?4");
    let sql = format!(
        "SELECT date_time, value, quality FROM ts_value v
         WHERE ts_id = ?1 AND office = ?2 AND date_time {op} ?3
           AND {version_filter}
         ORDER BY date_time {order} LIMIT 1"
    );
    let office = req.office.as_deref().unwrap_or("");
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<f64>>(1)?,
            row.get::<_, i32>(2)?,
        ))
    };
    let row = if req.version_date_utc.is_some() {
        conn.query_row(
            &sql,
            params![req.ts_id, office, boundary, version_text(req.version_date_utc)],
            map_row,
        )
    } else {
        conn.query_row(&sql, params![req.ts_id, office, boundary], map_row)
    }
    .optional()
    .map_err(db_err("retrieving adjacent sample"))?;
    match row {
        Some((time, value, quality)) => Ok(Some(TsPoint {
            time_utc: parse_dt(&time)?,
            value,
            quality,
        })),
        None => Ok(None),
    }
}

/// Store samples under the request's store rule, inside one transaction.
pub fn store_time_series(conn: &Connection, req: &TsWriteRequest) -> Result<()> {
    let office = req.office.as_deref().unwrap_or("");
    let version = version_text(req.version_date_utc);
    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("starting store transaction"))?;

    let interval = TsIdentifier::parse(&req.ts_id)
        .map(|id| id.interval_minutes())
        .unwrap_or(0);
    tx.execute(
        "INSERT OR IGNORE INTO ts_spec (ts_id, office, interval_minutes) VALUES (?1, ?2, ?3)",
        params![req.ts_id, office, interval],
    )
    .map_err(db_err("recording time series spec"))?;

    if req.store_rule == StoreRule::DeleteInsert {
        if let (Some(first), Some(last)) = (req.points.first(), req.points.last()) {
            tx.execute(
                "DELETE FROM ts_value
                 WHERE ts_id = ?1 AND office = ?2 AND version_date = ?3
                   AND date_time >= ?4 AND date_time <= ?5
                   AND (protected = 0 OR ?6)",
                params![
                    req.ts_id,
                    office,
                    version,
                    fmt_dt(&first.time_utc),
                    fmt_dt(&last.time_utc),
                    req.override_protection
                ],
            )
            .map_err(db_err("clearing stored range"))?;
        }
    }

    let mut written = 0usize;
    let mut skipped = 0usize;
    for point in &req.points {
        if req.store_rule == StoreRule::ReplaceWithNonMissing && point.value.is_none() {
            skipped += 1;
            continue;
        }
        let time = fmt_dt(&point.time_utc);
        let existing: Option<(Option<f64>, bool)> = tx
            .query_row(
                "SELECT value, protected FROM ts_value
                 WHERE ts_id = ?1 AND office = ?2 AND date_time = ?3 AND version_date = ?4",
                params![req.ts_id, office, time, version],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err("checking existing sample"))?;

        let action = match (&existing, req.store_rule) {
            (None, _) => Action::Insert,
            (Some(_), StoreRule::DoNotReplace) => Action::Skip,
            (Some((_, true)), _) if !req.override_protection => Action::Skip,
            (Some((value, _)), StoreRule::ReplaceMissingValuesOnly) if value.is_some() => {
                Action::Skip
            }
            (Some(_), _) => Action::Update,
        };
        match action {
            Action::Skip => skipped += 1,
            Action::Insert => {
                tx.execute(
                    "INSERT INTO ts_value (ts_id, office, date_time, version_date, value, quality)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![req.ts_id, office, time, version, point.value, point.quality],
                )
                .map_err(db_err("inserting sample"))?;
                written += 1;
            }
            Action::Update => {
                tx.execute(
                    "UPDATE ts_value SET value = ?5, quality = ?6
                     WHERE ts_id = ?1 AND office = ?2 AND date_time = ?3 AND version_date = ?4",
                    params![req.ts_id, office, time, version, point.value, point.quality],
                )
                .map_err(db_err("updating sample"))?;
                written += 1;
            }
        }
    }
    tx.commit().map_err(db_err("committing store"))?;
    debug!(
        "stored {written} rows to {} ({} rule, {skipped} skipped)",
        req.ts_id, req.store_rule
    );
    Ok(())
}

enum Action {
    Insert,
    Update,
    Skip,
}

/// Delete a series and all of its samples.
pub fn delete_time_series(conn: &Connection, ts_id: &str, office: Option<&str>) -> Result<()> {
    let office = office.unwrap_or("");
    let removed = conn
        .execute(
            "DELETE FROM ts_value WHERE ts_id = ?1 AND office = ?2",
            params![ts_id, office],
        )
        .map_err(db_err("deleting samples"))?;
    conn.execute(
        "DELETE FROM ts_spec WHERE ts_id = ?1 AND office = ?2",
        params![ts_id, office],
    )
    .map_err(db_err("deleting time series spec"))?;
    debug!("deleted {removed} rows of {ts_id}");
    Ok(())
}
