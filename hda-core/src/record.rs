//! In-memory data objects exchanged through the façade.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::RatingLoadMethod;
use crate::error::{DataAccessError, Result};
use crate::window::TimeWindow;

/// Sentinel marking a missing value inside a retrieved series.
pub const UNDEFINED_DOUBLE: f64 = -3.402_823_466_385_288_6e38;

/// Whether a stored value is the missing-value sentinel.
pub fn is_missing(value: f64) -> bool {
    value < UNDEFINED_DOUBLE / 2.0
}

/// One vertical datum offset, from the native datum to `to_datum`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatumOffset {
    pub to_datum: String,
    pub value: f64,
    pub estimate: bool,
}

/// Vertical datum metadata attached to elevation retrievals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalDatumInfo {
    pub location: String,
    pub native_datum: String,
    pub unit: String,
    pub offsets: Vec<DatumOffset>,
}

impl VerticalDatumInfo {
    /// The offset from the native datum to `datum`, if one is recorded.
    pub fn offset_to(&self, datum: &str) -> Option<f64> {
        self.offsets
            .iter()
            .find(|o| o.to_datum.eq_ignore_ascii_case(datum))
            .map(|o| o.value)
    }
}

/// A retrieved or to-be-stored regular/irregular time series.
///
/// Times are zone-naive, expressed in `time_zone`; `values` uses
/// [`UNDEFINED_DOUBLE`] for missing rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub id: String,
    pub office: Option<String>,
    pub interval_minutes: i32,
    pub unit: String,
    pub time_zone: String,
    pub times: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
    pub qualities: Vec<i32>,
    pub vertical_datum: Option<VerticalDatumInfo>,
}

impl TimeSeriesRecord {
    /// Parallel-vector length check. Every operation that consumes a record
    /// validates before touching the backend.
    pub fn validate(&self) -> Result<()> {
        if self.times.len() != self.values.len() || self.times.len() != self.qualities.len() {
            return Err(DataAccessError::invalid(format!(
                "time series {} has mismatched lengths: {} times, {} values, {} qualities",
                self.id,
                self.times.len(),
                self.values.len(),
                self.qualities.len()
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// First and last sample times, when the record has any.
    pub fn extent(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((*self.times.first()?, *self.times.last()?))
    }
}

/// One independent/dependent point of a rating curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingPoint {
    pub ind: f64,
    pub dep: f64,
}

/// One dated curve of a rating set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingCurve {
    pub effective_date: NaiveDateTime,
    pub points: Vec<RatingPoint>,
}

/// A fully materialized rating set, as stored or retrieved eagerly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSetRecord {
    pub office: Option<String>,
    pub rating_id: String,
    pub curves: Vec<RatingCurve>,
}

/// A rating handle whose curve data may or may not be resident, depending
/// on the load method it was retrieved under.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingObject {
    pub office: Option<String>,
    pub rating_id: String,
    pub method: RatingLoadMethod,
    pub window: Option<TimeWindow>,
    /// `Some` once curve data is resident; always `Some` for `Eager`.
    pub curves: Option<Vec<RatingCurve>>,
}

impl RatingObject {
    /// Whether curve data is resident in memory.
    pub fn is_loaded(&self) -> bool {
        self.curves.is_some()
    }

    /// Consume the handle into a concrete record. Fails for handles whose
    /// curve data was never loaded.
    pub fn into_record(self) -> Result<RatingSetRecord> {
        match self.curves {
            Some(curves) => Ok(RatingSetRecord {
                office: self.office,
                rating_id: self.rating_id,
                curves,
            }),
            None => Err(DataAccessError::invalid(format!(
                "rating {} has no curve data loaded",
                self.rating_id
            ))),
        }
    }
}

/// What a polymorphic retrieval produced, decided by identifier structure.
#[derive(Debug, Clone, PartialEq)]
pub enum DataObject {
    TimeSeries(TimeSeriesRecord),
    Rating(RatingObject),
}

impl DataObject {
    pub fn as_time_series(&self) -> Option<&TimeSeriesRecord> {
        match self {
            DataObject::TimeSeries(ts) => Some(ts),
            DataObject::Rating(_) => None,
        }
    }

    pub fn as_rating(&self) -> Option<&RatingObject> {
        match self {
            DataObject::Rating(r) => Some(r),
            DataObject::TimeSeries(_) => None,
        }
    }
}

/// Split a `unit|v=datum` unit spec (`"ft|v=NAVD88"`, `"u=ft|v=NGVD29"`)
/// into the unit and the optional requested vertical datum.
pub fn parse_unit_spec(spec: &str) -> (String, Option<String>) {
    let mut unit = String::new();
    let mut datum = None;
    for part in spec.split('|') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("v=").or_else(|| part.strip_prefix("V=")) {
            datum = Some(v.to_string());
        } else if let Some(u) = part.strip_prefix("u=").or_else(|| part.strip_prefix("U=")) {
            unit = u.to_string();
        } else if !part.is_empty() {
            unit = part.to_string();
        }
    }
    (unit, datum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn missing_sentinel_is_detected() {
        assert!(is_missing(UNDEFINED_DOUBLE));
        assert!(!is_missing(0.0));
        assert!(!is_missing(-1.0e30));
    }

    #[test]
    fn mismatched_vectors_fail_validation() {
        let rec = TimeSeriesRecord {
            id: "A.B.C.D.E.F".to_string(),
            office: None,
            interval_minutes: 60,
            unit: "cfs".to_string(),
            time_zone: "UTC".to_string(),
            times: vec![dt(1, 0), dt(1, 1)],
            values: vec![1.0],
            qualities: vec![0, 0],
            vertical_datum: None,
        };
        assert!(rec.validate().is_err());
    }

    #[test]
    fn extent_spans_first_and_last_sample() {
        let rec = TimeSeriesRecord {
            id: "A.B.C.D.E.F".to_string(),
            office: None,
            interval_minutes: 60,
            unit: "cfs".to_string(),
            time_zone: "UTC".to_string(),
            times: vec![dt(1, 0), dt(1, 1), dt(1, 2)],
            values: vec![1.0, 2.0, 3.0],
            qualities: vec![0, 0, 0],
            vertical_datum: None,
        };
        rec.validate().unwrap();
        assert_eq!(rec.extent(), Some((dt(1, 0), dt(1, 2))));
    }

    #[test]
    fn unloaded_rating_cannot_become_a_record() {
        let r = RatingObject {
            office: None,
            rating_id: "L.Stage;Flow.T.S".to_string(),
            method: RatingLoadMethod::Reference,
            window: None,
            curves: None,
        };
        assert!(!r.is_loaded());
        assert!(r.into_record().is_err());
    }

    #[test]
    fn unit_specs_split_unit_and_datum() {
        assert_eq!(parse_unit_spec("ft"), ("ft".to_string(), None));
        assert_eq!(
            parse_unit_spec("ft|v=NAVD88"),
            ("ft".to_string(), Some("NAVD88".to_string()))
        );
        assert_eq!(
            parse_unit_spec("u=m|V=NGVD29"),
            ("m".to_string(), Some("NGVD29".to_string()))
        );
    }

    #[test]
    fn datum_offsets_look_up_case_insensitively() {
        let info = VerticalDatumInfo {
            location: "FTPK".to_string(),
            native_datum: "NGVD29".to_string(),
            unit: "ft".to_string(),
            offsets: vec![DatumOffset {
                to_datum: "NAVD88".to_string(),
                value: 1.2,
                estimate: false,
            }],
        };
        assert_eq!(info.offset_to("navd88"), Some(1.2));
        assert_eq!(info.offset_to("MSL"), None);
    }
}
