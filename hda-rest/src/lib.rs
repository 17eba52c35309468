//! Remote data-service backend.
//!
//! Implements [`hda_core::Backend`] over the HTTP data service's JSON API,
//! so a session is driven identically whether it sits on a direct database
//! connection or on the service. Requests are blocking; an optional bearer
//! token authenticates write access.
//!
//! Unlike the database backend, write permission is asked of the service on
//! every check rather than memoized: the token can expire or be revoked
//! mid-session.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use hda_core::backend::{
    Backend, ConnectionMethod, RatingReadRequest, TsPoint, TsReadRequest, TsWriteRequest, UnitMap,
};
use hda_core::record::{DatumOffset, RatingCurve, RatingPoint, RatingSetRecord, VerticalDatumInfo};
use hda_core::{DataAccessError, Result};
use log::{debug, warn};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde_json::{json, Value};

const QUERY_TIME_FMT: &str = "%Y-%m-%dT%H:%M:%SZ";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn fmt_query_time(t: &NaiveDateTime) -> String {
    t.format(QUERY_TIME_FMT).to_string()
}

pub fn parse_service_time(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, QUERY_TIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| DataAccessError::MalformedResponse(format!("bad service timestamp \"{s}\"")))
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Decode the service's sample triplets `[[time, value|null, quality], ..]`.
pub fn parse_points(body: &Value) -> Result<Vec<TsPoint>> {
    let rows = body
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            DataAccessError::MalformedResponse("response has no values array".to_string())
        })?;
    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let triplet = row.as_array().filter(|r| r.len() == 3).ok_or_else(|| {
            DataAccessError::MalformedResponse(format!("bad sample row: {row}"))
        })?;
        let time = triplet[0].as_str().ok_or_else(|| {
            DataAccessError::MalformedResponse(format!("bad sample time: {}", triplet[0]))
        })?;
        points.push(TsPoint {
            time_utc: parse_service_time(time)?,
            value: triplet[1].as_f64(),
            quality: triplet[2].as_i64().unwrap_or(0) as i32,
        });
    }
    Ok(points)
}

/// Decode the service's rating curves `[{effective-date, points: [[ind, dep], ..]}, ..]`.
pub fn parse_curves(body: &Value) -> Result<Vec<RatingCurve>> {
    let rows = body
        .get("curves")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            DataAccessError::MalformedResponse("response has no curves array".to_string())
        })?;
    let mut curves = Vec::with_capacity(rows.len());
    for row in rows {
        let effective = row
            .get("effective-date")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DataAccessError::MalformedResponse(format!("curve has no effective date: {row}"))
            })?;
        let points = row
            .get("points")
            .and_then(Value::as_array)
            .map(|pts| {
                pts.iter()
                    .filter_map(|p| {
                        let pair = p.as_array()?;
                        Some(RatingPoint {
                            ind: pair.first()?.as_f64()?,
                            dep: pair.get(1)?.as_f64()?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        curves.push(RatingCurve {
            effective_date: parse_service_time(effective)?,
            points,
        });
    }
    Ok(curves)
}

/// A [`Backend`] over the remote data service.
pub struct RestBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
    office: Option<String>,
}

impl RestBackend {
    pub fn new(base_url: &str, office: Option<&str>, token: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| DataAccessError::backend("building HTTP client", e))?;
        Ok(RestBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
            office: office.map(str::to_string),
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = join_url(&self.base_url, path);
        debug!("GET {url}");
        let response = self
            .authed(self.client.get(&url).query(query))
            .send()
            .map_err(|e| DataAccessError::BackendUnavailable(format!("{url}: {e}")))?;
        Self::decode(path, response)
    }

    fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> Result<Value> {
        let url = join_url(&self.base_url, path);
        debug!("{method} {url}");
        let response = self
            .authed(self.client.request(method, &url).json(&body))
            .send()
            .map_err(|e| DataAccessError::BackendUnavailable(format!("{url}: {e}")))?;
        Self::decode(path, response)
    }

    fn decode(path: &str, response: reqwest::blocking::Response) -> Result<Value> {
        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => {
                return Err(DataAccessError::NotFound(path.to_string()));
            }
            StatusCode::CONFLICT => {
                return Err(DataAccessError::ConflictExists(path.to_string()));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(DataAccessError::PermissionDenied(path.to_string()));
            }
            s if !s.is_success() => {
                return Err(DataAccessError::BackendUnavailable(format!(
                    "{path} returned {s}"
                )));
            }
            _ => {}
        }
        if response.content_length() == Some(0) {
            return Ok(Value::Null);
        }
        response
            .json()
            .map_err(|e| DataAccessError::MalformedResponse(format!("{path}: {e}")))
    }

    fn office_param(&self, office: Option<&str>) -> String {
        office
            .map(str::to_string)
            .or_else(|| self.office.clone())
            .unwrap_or_default()
    }

    /// Query parameters for a windowed retrieval. Adjacent-sample and
    /// version flags ride along so the service answers with the same rows a
    /// direct database connection would.
    fn read_query(&self, req: &TsReadRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("name", req.ts_id.clone()),
            ("office", self.office_param(req.office.as_deref())),
            ("unit", req.unit.clone()),
            ("begin", fmt_query_time(&req.start_utc)),
            ("end", fmt_query_time(&req.end_utc)),
            ("timezone", req.time_zone.clone()),
        ];
        match req.version_date_utc {
            Some(vd) => query.push(("version-date", fmt_query_time(&vd))),
            None => query.push(("max-version", req.max_version.to_string())),
        }
        if req.retrieve_previous {
            query.push(("retrieve-previous", "true".to_string()));
        }
        if req.retrieve_next {
            query.push(("retrieve-next", "true".to_string()));
        }
        query
    }
}

impl Backend for RestBackend {
    fn description(&self) -> String {
        self.base_url.clone()
    }

    fn connection_method(&self) -> ConnectionMethod {
        ConnectionMethod::RemoteService
    }

    fn default_office(&self) -> Option<String> {
        self.office.clone()
    }

    fn can_write(&self) -> Result<bool> {
        if self.token.is_none() {
            return Ok(false);
        }
        match self.get_json("auth/can-write", &[]) {
            Ok(body) => Ok(body.get("can-write").and_then(Value::as_bool).unwrap_or(false)),
            Err(DataAccessError::PermissionDenied(_)) => Ok(false),
            Err(e) => {
                warn!("write permission check failed, treating as read-only: {e}");
                Ok(false)
            }
        }
    }

    fn parameter_units(&self, office: Option<&str>) -> Result<UnitMap> {
        let body = self.get_json("units", &[("office", self.office_param(office))])?;
        let systems = body.as_object().ok_or_else(|| {
            DataAccessError::MalformedResponse("unit table is not an object".to_string())
        })?;
        let mut map = UnitMap::new();
        for (system, params) in systems {
            let mut inner = HashMap::new();
            if let Some(obj) = params.as_object() {
                for (parameter, unit) in obj {
                    if let Some(unit) = unit.as_str() {
                        inner.insert(parameter.clone(), unit.to_string());
                    }
                }
            }
            map.insert(system.to_ascii_uppercase(), inner);
        }
        Ok(map)
    }

    fn time_series_extents(
        &self,
        ts_id: &str,
        office: Option<&str>,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        let body = self.get_json(
            "timeseries/extents",
            &[
                ("name", ts_id.to_string()),
                ("office", self.office_param(office)),
            ],
        )?;
        let first = body.get("earliest-time").and_then(Value::as_str);
        let last = body.get("latest-time").and_then(Value::as_str);
        match (first, last) {
            (Some(first), Some(last)) => Ok(Some((
                parse_service_time(first)?,
                parse_service_time(last)?,
            ))),
            _ => Ok(None),
        }
    }

    fn retrieve_time_series(&self, req: &TsReadRequest) -> Result<Vec<TsPoint>> {
        let query = self.read_query(req);
        let body = self.get_json("timeseries", &query)?;
        let mut points = parse_points(&body)?;
        // The service window is always closed; open bounds and trimming are
        // applied here.
        if !req.start_inclusive {
            points.retain(|p| p.time_utc != req.start_utc);
        }
        if !req.end_inclusive {
            points.retain(|p| p.time_utc != req.end_utc);
        }
        if req.trim_missing {
            while points.first().map(|p| p.value.is_none()).unwrap_or(false) {
                points.remove(0);
            }
            while points.last().map(|p| p.value.is_none()).unwrap_or(false) {
                points.pop();
            }
        }
        debug!("service returned {} samples for {}", points.len(), req.ts_id);
        Ok(points)
    }

    fn store_time_series(&self, req: &TsWriteRequest) -> Result<()> {
        let values: Vec<Value> = req
            .points
            .iter()
            .map(|p| json!([fmt_query_time(&p.time_utc), p.value, p.quality]))
            .collect();
        let body = json!({
            "name": req.ts_id,
            "office": self.office_param(req.office.as_deref()),
            "unit": req.unit,
            "store-rule": req.store_rule.as_str(),
            "override-protection": req.override_protection,
            "version-date": req.version_date_utc.map(|vd| fmt_query_time(&vd)),
            "values": values,
        });
        self.send_json(reqwest::Method::POST, "timeseries", body)?;
        Ok(())
    }

    fn delete_time_series(&self, ts_id: &str, office: Option<&str>) -> Result<()> {
        let body = json!({
            "name": ts_id,
            "office": self.office_param(office),
        });
        self.send_json(reqwest::Method::DELETE, "timeseries", body)?;
        Ok(())
    }

    fn rating_exists(&self, rating_id: &str, office: Option<&str>) -> Result<bool> {
        match self.get_json(
            "ratings/spec",
            &[
                ("name", rating_id.to_string()),
                ("office", self.office_param(office)),
            ],
        ) {
            Ok(_) => Ok(true),
            Err(DataAccessError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn retrieve_rating(&self, req: &RatingReadRequest) -> Result<Vec<RatingCurve>> {
        let mut query = vec![
            ("name", req.rating_id.clone()),
            ("office", self.office_param(req.office.as_deref())),
        ];
        if let Some(start) = req.start_utc {
            query.push(("begin", fmt_query_time(&start)));
        }
        if let Some(end) = req.end_utc {
            query.push(("end", fmt_query_time(&end)));
        }
        let body = self.get_json("ratings", &query)?;
        parse_curves(&body)
    }

    fn store_rating(&self, record: &RatingSetRecord, fail_if_exists: bool) -> Result<()> {
        let curves: Vec<Value> = record
            .curves
            .iter()
            .map(|c| {
                json!({
                    "effective-date": fmt_query_time(&c.effective_date),
                    "points": c.points.iter().map(|p| json!([p.ind, p.dep])).collect::<Vec<_>>(),
                })
            })
            .collect();
        let body = json!({
            "name": record.rating_id,
            "office": self.office_param(record.office.as_deref()),
            "fail-if-exists": fail_if_exists,
            "curves": curves,
        });
        self.send_json(reqwest::Method::POST, "ratings", body)?;
        Ok(())
    }

    fn delete_rating(&self, rating_id: &str, office: Option<&str>) -> Result<()> {
        let body = json!({
            "name": rating_id,
            "office": self.office_param(office),
        });
        self.send_json(reqwest::Method::DELETE, "ratings", body)?;
        Ok(())
    }

    fn catalog(&self, pattern: &str, office: Option<&str>) -> Result<Vec<String>> {
        let body = self.get_json(
            "catalog",
            &[
                ("like", pattern.to_string()),
                ("office", self.office_param(office)),
            ],
        )?;
        body.get("entries")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or_else(|| {
                DataAccessError::MalformedResponse("catalog has no entries array".to_string())
            })
    }

    fn vertical_datum_info(
        &self,
        location: &str,
        unit: &str,
        office: Option<&str>,
    ) -> Result<Option<VerticalDatumInfo>> {
        let body = match self.get_json(
            "locations/vertical-datum",
            &[
                ("name", location.to_string()),
                ("unit", unit.to_string()),
                ("office", self.office_param(office)),
            ],
        ) {
            Ok(body) => body,
            Err(DataAccessError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let native_datum = match body.get("native-datum").and_then(Value::as_str) {
            Some(datum) => datum.to_string(),
            None => return Ok(None),
        };
        let offsets = body
            .get("offsets")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        Some(DatumOffset {
                            to_datum: row.get("to-datum")?.as_str()?.to_string(),
                            value: row.get("value")?.as_f64()?,
                            estimate: row.get("estimate").and_then(Value::as_bool).unwrap_or(false),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(VerticalDatumInfo {
            location: location.to_string(),
            native_datum,
            unit: unit.to_string(),
            offsets,
        }))
    }

    fn store_vertical_datum_offset(
        &self,
        location: &str,
        from_datum: &str,
        to_datum: &str,
        value: f64,
        unit: &str,
        office: Option<&str>,
    ) -> Result<()> {
        let body = json!({
            "name": location,
            "office": self.office_param(office),
            "from-datum": from_datum,
            "to-datum": to_datum,
            "unit": unit,
            "value": value,
        });
        self.send_json(reqwest::Method::POST, "locations/vertical-datum", body)?;
        Ok(())
    }

    fn vertical_datum_offset(
        &self,
        location: &str,
        from_datum: &str,
        to_datum: &str,
        unit: &str,
        office: Option<&str>,
    ) -> Result<Option<f64>> {
        let body = match self.get_json(
            "locations/vertical-datum/offset",
            &[
                ("name", location.to_string()),
                ("from-datum", from_datum.to_string()),
                ("to-datum", to_datum.to_string()),
                ("unit", unit.to_string()),
                ("office", self.office_param(office)),
            ],
        ) {
            Ok(body) => body,
            Err(DataAccessError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(body.get("value").and_then(Value::as_f64))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn url_joining_handles_slash_variants() {
        assert_eq!(join_url("http://h/api", "timeseries"), "http://h/api/timeseries");
        assert_eq!(join_url("http://h/api/", "timeseries"), "http://h/api/timeseries");
        assert_eq!(join_url("http://h/api/", "/timeseries"), "http://h/api/timeseries");
    }

    #[test]
    fn service_times_parse_both_spellings() {
        let expected = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(parse_service_time("2021-06-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_service_time("2021-06-01 12:30:00").unwrap(), expected);
        assert!(parse_service_time("June 1st").is_err());
        assert_eq!(fmt_query_time(&expected), "2021-06-01T12:30:00Z");
    }

    #[test]
    fn sample_triplets_decode_with_null_values() {
        let body = json!({
            "values": [
                ["2021-06-01T00:00:00Z", 10.5, 0],
                ["2021-06-01T01:00:00Z", null, 5],
            ]
        });
        let points = parse_points(&body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, Some(10.5));
        assert_eq!(points[1].value, None);
        assert_eq!(points[1].quality, 5);
    }

    #[test]
    fn malformed_sample_payloads_are_rejected() {
        assert!(parse_points(&json!({})).is_err());
        assert!(parse_points(&json!({"values": [["only-time"]]})).is_err());
        assert!(parse_points(&json!({"values": [[42, 1.0, 0]]})).is_err());
    }

    #[test]
    fn rating_curves_decode() {
        let body = json!({
            "curves": [{
                "effective-date": "2020-01-01T00:00:00Z",
                "points": [[1.0, 10.0], [2.0, 40.0]],
            }]
        });
        let curves = parse_curves(&body).unwrap();
        assert_eq!(curves.len(), 1);
        assert_eq!(curves[0].points[1].dep, 40.0);
        assert!(parse_curves(&json!({"curves": [{}]})).is_err());
    }

    #[test]
    fn read_queries_carry_every_retrieval_flag() {
        let backend = RestBackend::new("http://h/api", Some("NWO"), None).unwrap();
        let t = |h| {
            NaiveDate::from_ymd_opt(2021, 6, 1)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
        };
        let mut req = TsReadRequest {
            ts_id: "FTPK.Flow.Inst.1Hour.0.Raw".to_string(),
            office: None,
            unit: "cfs".to_string(),
            time_zone: "UTC".to_string(),
            start_utc: t(3),
            end_utc: t(9),
            start_inclusive: true,
            end_inclusive: true,
            retrieve_previous: true,
            retrieve_next: true,
            trim_missing: true,
            version_date_utc: None,
            max_version: false,
        };
        let query = backend.read_query(&req);
        assert!(query.contains(&("retrieve-previous", "true".to_string())));
        assert!(query.contains(&("retrieve-next", "true".to_string())));
        assert!(query.contains(&("max-version", "false".to_string())));
        assert!(query.contains(&("office", "NWO".to_string())));

        req.version_date_utc = Some(t(0));
        req.retrieve_previous = false;
        req.retrieve_next = false;
        let query = backend.read_query(&req);
        assert!(query.contains(&("version-date", "2021-06-01T00:00:00Z".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "max-version"));
        assert!(!query.iter().any(|(k, _)| *k == "retrieve-previous"));
    }

    #[test]
    fn backend_without_a_token_is_read_only() {
        let backend = RestBackend::new("http://localhost:9/api", None, None).unwrap();
        assert!(!backend.can_write().unwrap());
        assert_eq!(backend.connection_method(), ConnectionMethod::RemoteService);
        assert_eq!(backend.description(), "http://localhost:9/api");
    }
}
