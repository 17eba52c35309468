//! Identifier catalog and vertical datum queries.

use hda_core::record::{DatumOffset, VerticalDatumInfo};
use hda_core::{DataAccessError, Result};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> DataAccessError + '_ {
    move |e| DataAccessError::backend(context.to_string(), e)
}

/// Translate a glob pattern (`*`, `?`) into a SQL LIKE pattern with `\` as
/// the escape character.
pub fn glob_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => like.push('%'),
            '?' => like.push('_'),
            '%' | '_' | '\\' => {
                like.push('\\');
                like.push(c);
            }
            c => like.push(c),
        }
    }
    like
}

/// Time series and rating identifiers matching a glob pattern, sorted.
pub fn catalog(conn: &Connection, pattern: &str, office: Option<&str>) -> Result<Vec<String>> {
    let like = glob_to_like(pattern);
    let office = office.unwrap_or("");
    let mut stmt = conn
        .prepare(
            "SELECT ts_id AS id FROM ts_spec
             WHERE ts_id LIKE ?1 ESCAPE '\\' AND (?2 = '' OR office = ?2)
             UNION
             SELECT rating_id AS id FROM rating_spec
             WHERE rating_id LIKE ?1 ESCAPE '\\' AND (?2 = '' OR office = ?2)
             ORDER BY id",
        )
        .map_err(db_err("preparing catalog query"))?;
    let ids = stmt
        .query_map(params![like, office], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(db_err("reading catalog"))?;
    debug!("catalog \"{pattern}\" matched {} identifiers", ids.len());
    Ok(ids)
}

/// Native datum and recorded offsets for a location, or `None` when the
/// location carries no datum row.
pub fn vertical_datum_info(
    conn: &Connection,
    location: &str,
    unit: &str,
    office: Option<&str>,
) -> Result<Option<VerticalDatumInfo>> {
    let office = office.unwrap_or("");
    let native: Option<String> = conn
        .query_row(
            "SELECT native_datum FROM vertical_datum
             WHERE location = ?1 AND (?2 = '' OR office = ?2)",
            params![location, office],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err("reading vertical datum"))?;
    let Some(native_datum) = native else {
        return Ok(None);
    };
    let mut stmt = conn
        .prepare(
            "SELECT from_datum, to_datum, value, estimate FROM vertical_datum_offset
             WHERE location = ?1 AND (?2 = '' OR office = ?2) AND unit = ?3",
        )
        .map_err(db_err("preparing datum offsets"))?;
    let rows = stmt
        .query_map(params![location, office, unit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(db_err("reading datum offsets"))?;
    // Only offsets anchored at the native datum are directly usable.
    let offsets = rows
        .into_iter()
        .filter(|(from, _, _, _)| from.eq_ignore_ascii_case(&native_datum))
        .map(|(_, to_datum, value, estimate)| DatumOffset {
            to_datum,
            value,
            estimate,
        })
        .collect();
    Ok(Some(VerticalDatumInfo {
        location: location.to_string(),
        native_datum,
        unit: unit.to_string(),
        offsets,
    }))
}

pub fn store_vertical_datum_offset(
    conn: &Connection,
    location: &str,
    from_datum: &str,
    to_datum: &str,
    value: f64,
    unit: &str,
    office: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO vertical_datum_offset
         (location, office, from_datum, to_datum, unit, value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![location, office.unwrap_or(""), from_datum, to_datum, unit, value],
    )
    .map_err(db_err("storing datum offset"))?;
    Ok(())
}

pub fn vertical_datum_offset(
    conn: &Connection,
    location: &str,
    from_datum: &str,
    to_datum: &str,
    unit: &str,
    office: Option<&str>,
) -> Result<Option<f64>> {
    conn.query_row(
        "SELECT value FROM vertical_datum_offset
         WHERE location = ?1 AND (?2 = '' OR office = ?2)
           AND from_datum = ?3 AND to_datum = ?4 AND unit = ?5",
        params![location, office.unwrap_or(""), from_datum, to_datum, unit],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err("reading datum offset"))
}
