//! Rating set storage and retrieval.
//!
//! A rating set is a spec row plus one `rating_curve` row per effective
//! date; curve points are serialized as JSON in the `points` column.

use hda_core::backend::RatingReadRequest;
use hda_core::identifier::RatingIdentifier;
use hda_core::record::{RatingCurve, RatingPoint, RatingSetRecord};
use hda_core::{DataAccessError, Result};
use log::debug;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::queries::{fmt_dt, parse_dt};

#[derive(Serialize, Deserialize)]
struct StoredPoint {
    ind: f64,
    dep: f64,
}

fn db_err(context: &str) -> impl FnOnce(rusqlite::Error) -> DataAccessError + '_ {
    move |e| DataAccessError::backend(context.to_string(), e)
}

pub fn rating_exists(conn: &Connection, rating_id: &str, office: Option<&str>) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM rating_spec WHERE rating_id = ?1 AND office = ?2",
            params![rating_id, office.unwrap_or("")],
            |row| row.get(0),
        )
        .map_err(db_err("checking rating existence"))?;
    Ok(count > 0)
}

/// Curves for a rating, optionally limited to an effective-date range,
/// ordered by effective date.
pub fn retrieve_rating(conn: &Connection, req: &RatingReadRequest) -> Result<Vec<RatingCurve>> {
    let mut sql = String::from(
        "SELECT effective_date, points FROM rating_curve
         WHERE rating_id = ?1 AND office = ?2",
    );
    if req.start_utc.is_some() {
        sql.push_str(" AND effective_date >= ?3");
    }
    if req.end_utc.is_some() {
        sql.push_str(if req.start_utc.is_some() {
            " AND effective_date <= ?4"
        } else {
            " AND effective_date <= ?3"
        });
    }
    sql.push_str(" ORDER BY effective_date");

    let office = req.office.as_deref().unwrap_or("");
    let mut stmt = conn.prepare(&sql).map_err(db_err("preparing rating retrieval"))?;
    let map_row = |row: &rusqlite::Row<'_>| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    };
    let rows = match (req.start_utc, req.end_utc) {
        (Some(s), Some(e)) => stmt.query_map(
            params![req.rating_id, office, fmt_dt(&s), fmt_dt(&e)],
            map_row,
        ),
        (Some(s), None) => stmt.query_map(params![req.rating_id, office, fmt_dt(&s)], map_row),
        (None, Some(e)) => stmt.query_map(params![req.rating_id, office, fmt_dt(&e)], map_row),
        (None, None) => stmt.query_map(params![req.rating_id, office], map_row),
    }
    .and_then(|r| r.collect::<std::result::Result<Vec<_>, _>>())
    .map_err(db_err("retrieving rating curves"))?;

    let mut curves = Vec::with_capacity(rows.len());
    for (effective, points_json) in rows {
        let points: Vec<StoredPoint> = serde_json::from_str(&points_json).map_err(|e| {
            DataAccessError::MalformedResponse(format!(
                "bad curve points for {}: {e}",
                req.rating_id
            ))
        })?;
        curves.push(RatingCurve {
            effective_date: parse_dt(&effective)?,
            points: points
                .into_iter()
                .map(|p| RatingPoint { ind: p.ind, dep: p.dep })
                .collect(),
        });
    }
    debug!("retrieved {} curves for {}", curves.len(), req.rating_id);
    Ok(curves)
}

/// Store a rating set inside one transaction. Curves replace any existing
/// curve with the same effective date.
pub fn store_rating(
    conn: &Connection,
    record: &RatingSetRecord,
    office: Option<&str>,
) -> Result<()> {
    let rid = RatingIdentifier::parse(&record.rating_id)?;
    let office = office.or(record.office.as_deref()).unwrap_or("");
    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("starting rating store"))?;
    tx.execute(
        "INSERT OR IGNORE INTO rating_spec (rating_id, office, template_id) VALUES (?1, ?2, ?3)",
        params![record.rating_id, office, rid.template_id()],
    )
    .map_err(db_err("recording rating spec"))?;
    for curve in &record.curves {
        let points: Vec<StoredPoint> = curve
            .points
            .iter()
            .map(|p| StoredPoint { ind: p.ind, dep: p.dep })
            .collect();
        let json = serde_json::to_string(&points).map_err(|e| {
            DataAccessError::invalid(format!("unserializable curve points: {e}"))
        })?;
        tx.execute(
            "INSERT OR REPLACE INTO rating_curve (rating_id, office, effective_date, points)
             VALUES (?1, ?2, ?3, ?4)",
            params![record.rating_id, office, fmt_dt(&curve.effective_date), json],
        )
        .map_err(db_err("storing rating curve"))?;
    }
    tx.commit().map_err(db_err("committing rating store"))?;
    debug!("stored {} curves for {}", record.curves.len(), record.rating_id);
    Ok(())
}

pub fn delete_rating(conn: &Connection, rating_id: &str, office: Option<&str>) -> Result<()> {
    let office = office.unwrap_or("");
    conn.execute(
        "DELETE FROM rating_curve WHERE rating_id = ?1 AND office = ?2",
        params![rating_id, office],
    )
    .map_err(db_err("deleting rating curves"))?;
    conn.execute(
        "DELETE FROM rating_spec WHERE rating_id = ?1 AND office = ?2",
        params![rating_id, office],
    )
    .map_err(db_err("deleting rating spec"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_schema;
    use chrono::{NaiveDate, NaiveDateTime};

    const RATING_ID: &str = "FTPK.Stage;Flow.USGS-EXSA.PRODUCTION";

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema()).unwrap();
        conn
    }

    fn dt(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_record() -> RatingSetRecord {
        RatingSetRecord {
            office: None,
            rating_id: RATING_ID.to_string(),
            curves: vec![
                RatingCurve {
                    effective_date: dt(1),
                    points: vec![
                        RatingPoint { ind: 1.0, dep: 10.0 },
                        RatingPoint { ind: 2.0, dep: 40.0 },
                    ],
                },
                RatingCurve {
                    effective_date: dt(15),
                    points: vec![RatingPoint { ind: 1.0, dep: 12.0 }],
                },
            ],
        }
    }

    fn read_req(
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> RatingReadRequest {
        RatingReadRequest {
            rating_id: RATING_ID.to_string(),
            office: None,
            start_utc: start,
            end_utc: end,
        }
    }

    #[test]
    fn store_and_retrieve_round_trips() {
        let conn = conn();
        assert!(!rating_exists(&conn, RATING_ID, None).unwrap());
        store_rating(&conn, &sample_record(), None).unwrap();
        assert!(rating_exists(&conn, RATING_ID, None).unwrap());
        let curves = retrieve_rating(&conn, &read_req(None, None)).unwrap();
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].points[1].dep, 40.0);
    }

    #[test]
    fn effective_date_window_limits_curves() {
        let conn = conn();
        store_rating(&conn, &sample_record(), None).unwrap();
        let curves = retrieve_rating(&conn, &read_req(Some(dt(10)), None)).unwrap();
        assert_eq!(curves.len(), 1);
        assert_eq!(curves[0].effective_date, dt(15));
        let curves = retrieve_rating(&conn, &read_req(None, Some(dt(10)))).unwrap();
        assert_eq!(curves.len(), 1);
        assert_eq!(curves[0].effective_date, dt(1));
        let curves = retrieve_rating(&conn, &read_req(Some(dt(2)), Some(dt(10)))).unwrap();
        assert!(curves.is_empty());
    }

    #[test]
    fn delete_removes_spec_and_curves() {
        let conn = conn();
        store_rating(&conn, &sample_record(), None).unwrap();
        delete_rating(&conn, RATING_ID, None).unwrap();
        assert!(!rating_exists(&conn, RATING_ID, None).unwrap());
        assert!(retrieve_rating(&conn, &read_req(None, None)).unwrap().is_empty());
    }

    #[test]
    fn restoring_a_curve_replaces_the_same_effective_date() {
        let conn = conn();
        store_rating(&conn, &sample_record(), None).unwrap();
        let mut updated = sample_record();
        updated.curves[0].points[0].dep = 11.0;
        store_rating(&conn, &updated, None).unwrap();
        let curves = retrieve_rating(&conn, &read_req(None, None)).unwrap();
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].points[0].dep, 11.0);
    }
}
