//! End-to-end coverage of a session driving the database backend.

use chrono::{NaiveDate, NaiveDateTime};
use hda_core::record::{RatingCurve, RatingPoint, UNDEFINED_DOUBLE};
use hda_core::{
    CallArg, DataAccessError, DataAccessSession, PutPayload, RatingSetRecord, TimeSeriesRecord,
};
use hda_db::{ConnectOptions, DbBackend};

const TS_ID: &str = "FTPK.Flow.Inst.1Hour.0.Raw";
const RATING_ID: &str = "FTPK.Stage;Flow.USGS-EXSA.PRODUCTION";

fn dt(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 6, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn session() -> DataAccessSession {
    let backend = DbBackend::open_in_memory(Some("SWT")).unwrap();
    DataAccessSession::open(Box::new(backend))
}

fn flow_record(times: Vec<NaiveDateTime>, values: Vec<f64>) -> TimeSeriesRecord {
    let qualities = vec![0; times.len()];
    TimeSeriesRecord {
        id: TS_ID.to_string(),
        office: None,
        interval_minutes: 60,
        unit: "cfs".to_string(),
        time_zone: "UTC".to_string(),
        times,
        values,
        qualities,
        vertical_datum: None,
    }
}

#[test]
fn store_then_get_round_trips_through_the_session() {
    let s = session();
    let record = flow_record(vec![dt(1, 0), dt(1, 1), dt(1, 2)], vec![10.0, 11.0, 12.0]);
    s.put(record.into(), &[]).unwrap();

    s.set_time_window(&["01Jun2021", "02Jun2021"]).unwrap();
    let obj = s.get(TS_ID, &[]).unwrap();
    let ts = obj.as_time_series().unwrap();
    assert_eq!(ts.len(), 3);
    assert_eq!(ts.values, vec![10.0, 11.0, 12.0]);
    assert_eq!(ts.unit, "cfs", "unit resolved from the English display units");
    assert_eq!(ts.time_zone, "UTC");
}

#[test]
fn session_time_zone_shifts_both_window_and_samples() {
    let s = session();
    // Stored in UTC; the session reads in PST (UTC-8).
    let record = flow_record(vec![dt(1, 12)], vec![5.0]);
    s.put(record.into(), &[]).unwrap();

    s.set_time_zone("PST").unwrap();
    s.set_time_window(&["01Jun2021", "01Jun2021"]).unwrap();
    let obj = s.get(TS_ID, &[]).unwrap();
    let ts = obj.as_time_series().unwrap();
    assert_eq!(ts.time_zone, "Etc/GMT+8");
    assert_eq!(ts.times[0], dt(1, 4), "12:00 UTC is 04:00 in PST");
}

#[test]
fn whole_extent_flag_retrieves_everything() {
    let s = session();
    let record = flow_record(vec![dt(1, 0), dt(5, 0), dt(9, 0)], vec![1.0, 2.0, 3.0]);
    s.put(record.into(), &[]).unwrap();
    let obj = s.get(TS_ID, &[CallArg::Flag(true)]).unwrap();
    assert_eq!(obj.as_time_series().unwrap().len(), 3);

    let (first, last) = s.time_series_extents(TS_ID).unwrap();
    assert_eq!(first, dt(1, 0));
    assert_eq!(last, dt(9, 0));
}

#[test]
fn call_level_window_texts_shadow_the_session_window() {
    let s = session();
    let record = flow_record(vec![dt(1, 0), dt(5, 0), dt(9, 0)], vec![1.0, 2.0, 3.0]);
    s.put(record.into(), &[]).unwrap();
    s.set_time_window(&["01Jun2021", "10Jun2021"]).unwrap();
    let obj = s
        .get(TS_ID, &["04Jun2021".into(), "06Jun2021".into()])
        .unwrap();
    let ts = obj.as_time_series().unwrap();
    assert_eq!(ts.len(), 1);
    assert_eq!(ts.values[0], 2.0);
}

#[test]
fn missing_values_come_back_as_the_sentinel() {
    let s = session();
    let record = flow_record(
        vec![dt(1, 0), dt(1, 1), dt(1, 2)],
        vec![1.0, UNDEFINED_DOUBLE, 3.0],
    );
    s.put(record.into(), &[]).unwrap();
    s.set_time_window(&["01Jun2021", "02Jun2021"]).unwrap();
    let obj = s.get(TS_ID, &[]).unwrap();
    let ts = obj.as_time_series().unwrap();
    assert_eq!(ts.len(), 3);
    assert!(hda_core::record::is_missing(ts.values[1]));
}

#[test]
fn versioned_stores_resolve_by_max_or_min_version() {
    let s = session();
    s.set_version_date(Some("10Jun2021 0000")).unwrap();
    s.put(flow_record(vec![dt(1, 0)], vec![1.0]).into(), &[]).unwrap();
    s.set_version_date(Some("20Jun2021 0000")).unwrap();
    s.put(flow_record(vec![dt(1, 0)], vec![2.0]).into(), &[]).unwrap();

    s.set_version_date(None).unwrap();
    s.set_time_window(&["01Jun2021", "02Jun2021"]).unwrap();
    let obj = s.get(TS_ID, &[]).unwrap();
    assert_eq!(obj.as_time_series().unwrap().values[0], 2.0);

    s.set_max_version(false).unwrap();
    let obj = s.get(TS_ID, &[]).unwrap();
    assert_eq!(obj.as_time_series().unwrap().values[0], 1.0);
}

#[test]
fn delete_removes_both_kinds_and_aborts_on_bad_identifiers() {
    let s = session();
    s.put(flow_record(vec![dt(1, 0)], vec![1.0]).into(), &[]).unwrap();
    let rating = RatingSetRecord {
        office: None,
        rating_id: RATING_ID.to_string(),
        curves: vec![],
    };
    s.put(rating.into(), &[]).unwrap();

    let err = s.delete(&[TS_ID, "not-an-identifier"]).unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidArgument(_)));
    assert_eq!(s.cataloged_pathnames(&[]).unwrap().len(), 2, "nothing deleted");

    s.delete(&[TS_ID, RATING_ID]).unwrap();
    assert!(s.cataloged_pathnames(&[]).unwrap().is_empty());
}

#[test]
fn rating_store_conflicts_unless_told_otherwise() {
    let s = session();
    let rating = RatingSetRecord {
        office: None,
        rating_id: RATING_ID.to_string(),
        curves: vec![RatingCurve {
            effective_date: dt(1, 0),
            points: vec![RatingPoint { ind: 1.0, dep: 100.0 }],
        }],
    };
    s.put(PutPayload::Rating(rating.clone()), &[]).unwrap();
    let err = s.put(PutPayload::Rating(rating.clone()), &[]).unwrap_err();
    assert!(matches!(err, DataAccessError::ConflictExists(_)));
    s.put(PutPayload::Rating(rating), &[CallArg::Flag(false)]).unwrap();

    let record = s.get_rating(RATING_ID).unwrap();
    assert_eq!(record.curves.len(), 1);
    assert_eq!(record.curves[0].points[0].dep, 100.0);
}

#[test]
fn catalog_patterns_match_stored_identifiers() {
    let s = session();
    s.put(flow_record(vec![dt(1, 0)], vec![1.0]).into(), &[]).unwrap();
    let mut other = flow_record(vec![dt(1, 0)], vec![1.0]);
    other.id = "GAPT.Flow.Inst.1Hour.0.Raw".to_string();
    s.put(other.into(), &[]).unwrap();

    assert_eq!(s.cataloged_pathnames(&[]).unwrap().len(), 2);
    let ftpk = s.cataloged_pathnames(&["FTPK.*".into()]).unwrap();
    assert_eq!(ftpk, vec![TS_ID.to_string()]);
}

#[test]
fn national_database_connections_deny_unknown_writers() {
    let backend = DbBackend::connect(ConnectOptions {
        url: Some("jdoe/secret@140.194.20.214:1521/CWMSP2".to_string()),
        ..Default::default()
    })
    .unwrap();
    let s = DataAccessSession::open(Box::new(backend));
    let err = s.put(flow_record(vec![dt(1, 0)], vec![1.0]).into(), &[]).unwrap_err();
    assert!(matches!(err, DataAccessError::PermissionDenied(_)));
    let err = s.delete(&[TS_ID]).unwrap_err();
    assert!(matches!(err, DataAccessError::PermissionDenied(_)));
}

#[test]
fn vertical_datum_offsets_round_trip_through_the_session() {
    let s = session();
    s.store_vertical_datum_offset("FTPK", "NGVD29", "NAVD88", 1.3, "ft")
        .unwrap();
    assert_eq!(
        s.vertical_datum_offset("FTPK", "NGVD29", "NAVD88", "ft").unwrap(),
        Some(1.3)
    );
    assert_eq!(
        s.vertical_datum_offset("FTPK", "NGVD29", "MSL", "ft").unwrap(),
        None
    );
}

#[test]
fn elevation_retrieval_without_a_datum_row_carries_no_metadata() {
    let s = session();
    let mut record = flow_record(vec![dt(1, 0)], vec![100.0]);
    record.id = "FTPK.Elev.Inst.1Hour.0.Raw".to_string();
    record.unit = "ft".to_string();
    s.put(record.into(), &[]).unwrap();
    s.set_time_window(&["01Jun2021", "02Jun2021"]).unwrap();
    let obj = s.get("FTPK.Elev.Inst.1Hour.0.Raw", &[]).unwrap();
    assert!(obj.as_time_series().unwrap().vertical_datum.is_none());
}
