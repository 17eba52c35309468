//! The session façade: identifier-driven, polymorphic data access.
//!
//! A [`DataAccessSession`] owns one backend connection plus the mutable
//! session defaults. All state lives behind a single coarse mutex, so a
//! session can be shared across threads but executes one operation at a
//! time. After [`DataAccessSession::close`], every operation fails with
//! `SessionClosed`.

use std::sync::Mutex;

use chrono::NaiveDateTime;
use log::{debug, warn};

use crate::backend::{
    Backend, ConnectionMethod, RatingReadRequest, TsPoint, TsReadRequest, TsWriteRequest, UnitMap,
};
use crate::config::{
    normalize_time_zone, RatingLoadMethod, SessionConfig, StoreRule, UnitSystem,
};
use crate::error::{DataAccessError, Result};
use crate::identifier::{classify, IdKind, RatingIdentifier, TsIdentifier};
use crate::record::{
    is_missing, DataObject, RatingObject, RatingSetRecord, TimeSeriesRecord, UNDEFINED_DOUBLE,
};
use crate::window::{self, TimeWindow};

/// One positional argument of a polymorphic `get`/`put`/`catalog` call.
///
/// The legacy call surface distinguishes arguments only by position and
/// runtime type; this enum is its typed equivalent.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Text(String),
    Flag(bool),
}

impl From<&str> for CallArg {
    fn from(s: &str) -> Self {
        CallArg::Text(s.to_string())
    }
}

impl From<String> for CallArg {
    fn from(s: String) -> Self {
        CallArg::Text(s)
    }
}

impl From<bool> for CallArg {
    fn from(b: bool) -> Self {
        CallArg::Flag(b)
    }
}

/// What a polymorphic store call was handed.
#[derive(Debug, Clone, PartialEq)]
pub enum PutPayload {
    TimeSeries(TimeSeriesRecord),
    Rating(RatingSetRecord),
}

impl From<TimeSeriesRecord> for PutPayload {
    fn from(r: TimeSeriesRecord) -> Self {
        PutPayload::TimeSeries(r)
    }
}

impl From<RatingSetRecord> for PutPayload {
    fn from(r: RatingSetRecord) -> Self {
        PutPayload::Rating(r)
    }
}

/// Call-level overrides for a time series store. `None` defers to the
/// record, then to the session defaults.
#[derive(Debug, Clone, Default)]
pub struct StoreOverrides {
    pub unit: Option<String>,
    pub time_zone: Option<String>,
    pub store_rule: Option<StoreRule>,
    pub override_protection: Option<bool>,
    /// `Some(None)` forces non-versioned; `None` defers to the session.
    pub version_date: Option<Option<NaiveDateTime>>,
    pub office: Option<String>,
}

struct SessionInner {
    open: bool,
    backend: Box<dyn Backend>,
    config: SessionConfig,
    unit_cache: Option<UnitMap>,
    description: String,
}

/// A single-connection data-access session. See the crate docs for the
/// identifier grammar and default table.
pub struct DataAccessSession {
    inner: Mutex<SessionInner>,
}

impl DataAccessSession {
    /// Open a session over an already-connected backend.
    pub fn open(backend: Box<dyn Backend>) -> Self {
        let description = backend.description();
        let mut config = SessionConfig::default();
        config.office = backend.default_office();
        debug!("opened data access session: {description}");
        DataAccessSession {
            inner: Mutex::new(SessionInner {
                open: true,
                backend,
                config,
                unit_cache: None,
                description,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        // A poisoned lock means a panic mid-operation; the session state is
        // still structurally sound, so keep serving (and let callers see
        // whatever half-written config the panicking call left).
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn locked_open(&self) -> Result<std::sync::MutexGuard<'_, SessionInner>> {
        let guard = self.lock();
        if !guard.open {
            return Err(DataAccessError::SessionClosed);
        }
        Ok(guard)
    }

    // ───────────────────── session lifecycle ─────────────────────

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Description of the live connection.
    pub fn connection_info(&self) -> Result<String> {
        Ok(self.locked_open()?.description.clone())
    }

    pub fn connection_method(&self) -> Result<ConnectionMethod> {
        Ok(self.locked_open()?.backend.connection_method())
    }

    /// Close the session and release the backend. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.open {
            guard.open = false;
            guard.backend.close()?;
            debug!("closed data access session: {}", guard.description);
        }
        Ok(())
    }

    // ───────────────────── session defaults ─────────────────────

    pub fn config(&self) -> Result<SessionConfig> {
        Ok(self.locked_open()?.config.clone())
    }

    pub fn set_office(&self, office: Option<&str>) -> Result<()> {
        self.locked_open()?.config.office = office.map(str::to_string);
        Ok(())
    }

    pub fn set_unit_system(&self, name: &str) -> Result<()> {
        let parsed: UnitSystem = name.parse()?;
        self.locked_open()?.config.unit_system = parsed;
        Ok(())
    }

    pub fn set_store_rule(&self, name: &str) -> Result<()> {
        let parsed: StoreRule = name.parse()?;
        self.locked_open()?.config.store_rule = parsed;
        Ok(())
    }

    pub fn set_time_zone(&self, name: &str) -> Result<()> {
        let tz = normalize_time_zone(name)?;
        self.locked_open()?.config.time_zone = tz;
        Ok(())
    }

    pub fn set_trim_missing(&self, trim: bool) -> Result<()> {
        self.locked_open()?.config.trim_missing = trim;
        Ok(())
    }

    pub fn set_inclusive(&self, start: bool, end: bool) -> Result<()> {
        let mut guard = self.locked_open()?;
        guard.config.start_inclusive = start;
        guard.config.end_inclusive = end;
        Ok(())
    }

    pub fn set_retrieve_adjacent(&self, previous: bool, next: bool) -> Result<()> {
        let mut guard = self.locked_open()?;
        guard.config.retrieve_previous = previous;
        guard.config.retrieve_next = next;
        Ok(())
    }

    pub fn set_override_protection(&self, value: bool) -> Result<()> {
        self.locked_open()?.config.override_protection = value;
        Ok(())
    }

    pub fn set_max_version(&self, value: bool) -> Result<()> {
        self.locked_open()?.config.max_version = value;
        Ok(())
    }

    pub fn set_rating_load_method(&self, name: &str) -> Result<()> {
        let parsed: RatingLoadMethod = name.parse()?;
        self.locked_open()?.config.rating_load_method = parsed;
        Ok(())
    }

    /// Set the default version date. The non-versioned sentinel spellings
    /// select non-versioned data, as does `None`.
    pub fn set_version_date(&self, text: Option<&str>) -> Result<()> {
        let parsed = match text {
            None => None,
            Some(t) if crate::config::is_non_versioned(t) => None,
            Some(t) => Some(window::parse_date_time(t)?),
        };
        self.locked_open()?.config.version_date = parsed;
        Ok(())
    }

    /// Reset the default version date to non-versioned.
    pub fn reset_version_date(&self) -> Result<()> {
        self.set_version_date(None)
    }

    /// Set the default time window from free-form tokens.
    pub fn set_time_window<S: AsRef<str>>(&self, tokens: &[S]) -> Result<()> {
        let tw = window::resolve(tokens)?;
        self.locked_open()?.config.window = Some(tw);
        Ok(())
    }

    pub fn clear_time_window(&self) -> Result<()> {
        self.locked_open()?.config.window = None;
        Ok(())
    }

    // ───────────────────── polymorphic reads ─────────────────────

    /// Retrieve the object named by `id`, dispatching on identifier shape.
    ///
    /// Extra arguments, in the legacy positional style:
    /// - none: session defaults throughout
    /// - one flag: retrieve the series' entire extent
    /// - one text: unit spec (`"cfs"`, `"ft|v=NAVD88"`)
    /// - two texts: window start, window end
    /// - three texts: window start, window end, unit spec
    ///
    /// Rating identifiers accept the window forms but no unit spec.
    pub fn get(&self, id: &str, args: &[CallArg]) -> Result<DataObject> {
        let mut guard = self.locked_open()?;
        match classify(id) {
            IdKind::TimeSeries => {
                let tsid = TsIdentifier::parse(id)?;
                let (win, unit_spec, whole_extent) = Self::read_args(args)?;
                let win = match (win, whole_extent) {
                    (Some(w), _) => Some(w),
                    (None, true) => Some(guard.extent_window(id)?),
                    (None, false) => guard.config.window,
                };
                let win = win.ok_or(DataAccessError::NoTimeWindow)?;
                let rec = guard.fetch_time_series(&tsid, win, unit_spec.as_deref())?;
                Ok(DataObject::TimeSeries(rec))
            }
            IdKind::Rating => {
                let (win, unit_spec, whole_extent) = Self::read_args(args)?;
                if unit_spec.is_some() || whole_extent {
                    return Err(DataAccessError::invalid(format!(
                        "unsupported arguments for rating retrieval of \"{id}\""
                    )));
                }
                let rid = RatingIdentifier::parse(id)?;
                let method = guard.config.rating_load_method;
                let win = win.or(guard.config.window);
                let obj = guard.fetch_rating(&rid, method, win)?;
                Ok(DataObject::Rating(obj))
            }
            IdKind::Unknown => Err(DataAccessError::invalid(format!(
                "\"{id}\" is not a time series or rating identifier"
            ))),
        }
    }

    /// Alias for [`get`](Self::get).
    pub fn read(&self, id: &str, args: &[CallArg]) -> Result<DataObject> {
        self.get(id, args)
    }

    /// Classify the `get` argument list into (window, unit spec, whole-extent).
    fn read_args(args: &[CallArg]) -> Result<(Option<TimeWindow>, Option<String>, bool)> {
        let bad = || DataAccessError::invalid("unsupported retrieval argument combination");
        match args {
            [] => Ok((None, None, false)),
            [CallArg::Flag(whole)] => Ok((None, None, *whole)),
            [CallArg::Text(unit)] => Ok((None, Some(unit.clone()), false)),
            [CallArg::Text(start), CallArg::Text(end)] => {
                let tw = window::resolve(&[start.as_str(), end.as_str()])?;
                Ok((Some(tw), None, false))
            }
            [CallArg::Text(start), CallArg::Text(end), CallArg::Text(unit)] => {
                let tw = window::resolve(&[start.as_str(), end.as_str()])?;
                Ok((Some(tw), Some(unit.clone()), false))
            }
            _ => Err(bad()),
        }
    }

    /// Earliest and latest sample times for a series, in the session zone.
    pub fn time_series_extents(&self, ts_id: &str) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let guard = self.locked_open()?;
        let office = guard.config.office.clone();
        let (first, last) = guard
            .backend
            .time_series_extents(ts_id, office.as_deref())?
            .ok_or_else(|| DataAccessError::NotFound(ts_id.to_string()))?;
        let tz = guard.config.time_zone;
        Ok((window::from_utc(tz, first), window::from_utc(tz, last)))
    }

    /// Retrieve a rating set with an explicit load method, overriding the
    /// session default.
    pub fn read_rating<S: AsRef<str>>(
        &self,
        method: RatingLoadMethod,
        rating_id: &str,
        window_tokens: Option<&[S]>,
    ) -> Result<RatingObject> {
        let mut guard = self.locked_open()?;
        let rid = RatingIdentifier::parse(rating_id)?;
        let win = match window_tokens {
            Some(tokens) => Some(window::resolve(tokens)?),
            None => guard.config.window,
        };
        guard.fetch_rating(&rid, method, win)
    }

    /// Retrieve a fully materialized rating set. Always eager, regardless
    /// of the session's load method.
    pub fn get_rating(&self, rating_id: &str) -> Result<RatingSetRecord> {
        self.read_rating::<&str>(RatingLoadMethod::Eager, rating_id, None)?
            .into_record()
    }

    /// Load curve data into a lazily retrieved rating handle.
    pub fn load_rating_curves(&self, rating: &mut RatingObject) -> Result<()> {
        if rating.curves.is_some() {
            return Ok(());
        }
        if rating.method == RatingLoadMethod::Reference {
            return Err(DataAccessError::invalid(format!(
                "rating {} was retrieved by reference and cannot load curves",
                rating.rating_id
            )));
        }
        let guard = self.locked_open()?;
        let (start_utc, end_utc) = match rating.window {
            Some(w) => {
                let tz = guard.config.time_zone;
                (Some(window::to_utc(tz, w.start)?), Some(window::to_utc(tz, w.end)?))
            }
            None => (None, None),
        };
        let curves = guard.backend.retrieve_rating(&RatingReadRequest {
            rating_id: rating.rating_id.clone(),
            office: rating.office.clone(),
            start_utc,
            end_utc,
        })?;
        rating.curves = Some(curves);
        Ok(())
    }

    /// Identifiers matching a glob-style pattern. Arguments: none (match
    /// everything), a pattern, a refresh flag, or both.
    pub fn cataloged_pathnames(&self, args: &[CallArg]) -> Result<Vec<String>> {
        let pattern = match args {
            [] | [CallArg::Flag(_)] => "*".to_string(),
            [CallArg::Text(p)] | [CallArg::Text(p), CallArg::Flag(_)] => p.clone(),
            _ => {
                return Err(DataAccessError::invalid(
                    "unsupported catalog argument combination",
                ))
            }
        };
        let guard = self.locked_open()?;
        let office = guard.config.office.clone();
        guard.backend.catalog(&pattern, office.as_deref())
    }

    // ───────────────────── polymorphic writes ─────────────────────

    /// Store the payload, dispatching on its type.
    ///
    /// For a time series, extra text arguments map positionally to unit,
    /// time zone, store rule, version date, and office; a flag argument is
    /// protection override. For a rating, a single flag is fail-if-exists.
    pub fn put(&self, payload: PutPayload, args: &[CallArg]) -> Result<()> {
        match payload {
            PutPayload::TimeSeries(record) => {
                let overrides = Self::write_args(args)?;
                self.store_time_series(&record, &overrides)
            }
            PutPayload::Rating(record) => {
                let fail_if_exists = match args {
                    [] => true,
                    [CallArg::Flag(f)] => *f,
                    _ => {
                        return Err(DataAccessError::invalid(
                            "unsupported arguments for rating store",
                        ))
                    }
                };
                self.store_rating(&record, fail_if_exists)
            }
        }
    }

    /// Alias for [`put`](Self::put).
    pub fn write(&self, payload: PutPayload, args: &[CallArg]) -> Result<()> {
        self.put(payload, args)
    }

    fn write_args(args: &[CallArg]) -> Result<StoreOverrides> {
        let mut overrides = StoreOverrides::default();
        let mut texts = 0;
        for arg in args {
            match arg {
                CallArg::Flag(f) => {
                    if overrides.override_protection.is_some() {
                        return Err(DataAccessError::invalid(
                            "unsupported arguments for time series store",
                        ));
                    }
                    overrides.override_protection = Some(*f);
                }
                CallArg::Text(t) => {
                    match texts {
                        0 => overrides.unit = Some(t.clone()),
                        1 => overrides.time_zone = Some(t.clone()),
                        2 => overrides.store_rule = Some(t.parse()?),
                        3 => {
                            overrides.version_date = Some(if crate::config::is_non_versioned(t) {
                                None
                            } else {
                                Some(window::parse_date_time(t)?)
                            })
                        }
                        4 => overrides.office = Some(t.clone()),
                        _ => {
                            return Err(DataAccessError::invalid(
                                "unsupported arguments for time series store",
                            ))
                        }
                    }
                    texts += 1;
                }
            }
        }
        Ok(overrides)
    }

    /// Store a time series with explicit, named overrides.
    pub fn store_time_series(
        &self,
        record: &TimeSeriesRecord,
        overrides: &StoreOverrides,
    ) -> Result<()> {
        record.validate()?;
        let mut guard = self.locked_open()?;
        guard.require_write()?;

        let unit = match (&overrides.unit, record.unit.as_str()) {
            (Some(u), "") => u.clone(),
            (Some(u), ru) => {
                if !u.eq_ignore_ascii_case(ru) {
                    warn!(
                        "storing {} as {u} but the record carries {ru}",
                        record.id
                    );
                }
                u.clone()
            }
            (None, "") => {
                return Err(DataAccessError::invalid(format!(
                    "no unit for storing {}",
                    record.id
                )))
            }
            (None, ru) => ru.to_string(),
        };

        let tz = match &overrides.time_zone {
            Some(name) => {
                let tz = normalize_time_zone(name)?;
                if !record.time_zone.is_empty()
                    && normalize_time_zone(&record.time_zone).map(|r| r != tz).unwrap_or(true)
                {
                    warn!(
                        "storing {} in zone {name} but the record carries {}",
                        record.id, record.time_zone
                    );
                }
                tz
            }
            None if !record.time_zone.is_empty() => normalize_time_zone(&record.time_zone)?,
            None => guard.config.time_zone,
        };

        let store_rule = overrides.store_rule.unwrap_or(guard.config.store_rule);
        let override_protection = overrides
            .override_protection
            .unwrap_or(guard.config.override_protection);
        let version_date = overrides.version_date.unwrap_or(guard.config.version_date);
        let version_date_utc = match version_date {
            Some(vd) => Some(window::to_utc(tz, vd)?),
            None => None,
        };
        let office = overrides
            .office
            .clone()
            .or_else(|| record.office.clone())
            .or_else(|| guard.config.office.clone());

        let mut points = Vec::with_capacity(record.len());
        for ((t, v), q) in record
            .times
            .iter()
            .zip(record.values.iter())
            .zip(record.qualities.iter())
        {
            points.push(TsPoint {
                time_utc: window::to_utc(tz, *t)?,
                value: if is_missing(*v) { None } else { Some(*v) },
                quality: *q,
            });
        }
        debug!(
            "storing {} samples to {} ({unit}, {store_rule})",
            points.len(),
            record.id
        );
        guard.backend.store_time_series(&TsWriteRequest {
            ts_id: record.id.clone(),
            office,
            unit,
            store_rule,
            override_protection,
            version_date_utc,
            points,
        })
    }

    /// Store a rating set. With `fail_if_exists`, an already-present rating
    /// aborts with `ConflictExists` before anything is written.
    pub fn store_rating(&self, record: &RatingSetRecord, fail_if_exists: bool) -> Result<()> {
        let mut guard = self.locked_open()?;
        guard.require_write()?;
        let office = record.office.clone().or_else(|| guard.config.office.clone());
        if fail_if_exists
            && guard
                .backend
                .rating_exists(&record.rating_id, office.as_deref())?
        {
            return Err(DataAccessError::ConflictExists(record.rating_id.clone()));
        }
        guard.backend.store_rating(record, fail_if_exists)
    }

    /// Delete every named object. All identifiers are classified first; a
    /// single unrecognized identifier aborts the whole batch before any
    /// backend call.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        let mut kinds = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.as_ref();
            match classify(id) {
                IdKind::Unknown => {
                    return Err(DataAccessError::invalid(format!(
                        "\"{id}\" is not a time series or rating identifier"
                    )))
                }
                kind => kinds.push((id, kind)),
            }
        }
        let mut guard = self.locked_open()?;
        guard.require_write()?;
        let office = guard.config.office.clone();
        for (id, kind) in kinds {
            match kind {
                IdKind::TimeSeries => guard.backend.delete_time_series(id, office.as_deref())?,
                IdKind::Rating => guard.backend.delete_rating(id, office.as_deref())?,
                IdKind::Unknown => unreachable!(),
            }
        }
        Ok(())
    }

    // ───────────────────── vertical datums ─────────────────────

    pub fn vertical_datum_offset(
        &self,
        location: &str,
        from_datum: &str,
        to_datum: &str,
        unit: &str,
    ) -> Result<Option<f64>> {
        let guard = self.locked_open()?;
        let office = guard.config.office.clone();
        guard
            .backend
            .vertical_datum_offset(location, from_datum, to_datum, unit, office.as_deref())
    }

    pub fn store_vertical_datum_offset(
        &self,
        location: &str,
        from_datum: &str,
        to_datum: &str,
        value: f64,
        unit: &str,
    ) -> Result<()> {
        let mut guard = self.locked_open()?;
        guard.require_write()?;
        let office = guard.config.office.clone();
        guard.backend.store_vertical_datum_offset(
            location,
            from_datum,
            to_datum,
            value,
            unit,
            office.as_deref(),
        )
    }
}

impl Drop for DataAccessSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error closing session on drop: {e}");
        }
    }
}

impl SessionInner {
    fn require_write(&mut self) -> Result<()> {
        if self.backend.can_write()? {
            Ok(())
        } else {
            Err(DataAccessError::PermissionDenied(self.description.clone()))
        }
    }

    /// The series' full extent as a session-zone window.
    fn extent_window(&mut self, ts_id: &str) -> Result<TimeWindow> {
        let (first, last) = self
            .backend
            .time_series_extents(ts_id, self.config.office.as_deref())?
            .ok_or_else(|| DataAccessError::NotFound(ts_id.to_string()))?;
        let tz = self.config.time_zone;
        TimeWindow::new(window::from_utc(tz, first), window::from_utc(tz, last))
    }

    fn unit_map(&mut self) -> Result<&UnitMap> {
        if self.unit_cache.is_none() {
            let map = self
                .backend
                .parameter_units(self.config.office.as_deref())?;
            self.unit_cache = Some(map);
        }
        Ok(self.unit_cache.get_or_insert_with(UnitMap::new))
    }

    /// Display unit for a parameter in the active unit system, falling back
    /// from the full parameter (`Flow-In`) to its base (`Flow`).
    fn resolve_unit(&mut self, id: &TsIdentifier) -> Result<String> {
        let system = self.config.unit_system.abbrev();
        let full = id.full_parameter();
        let map = self.unit_map()?;
        let by_system = map.get(system);
        if let Some(unit) = by_system.and_then(|m| m.get(&full)) {
            return Ok(unit.clone());
        }
        if let Some(unit) = by_system.and_then(|m| m.get(&id.parameter)) {
            return Ok(unit.clone());
        }
        Err(DataAccessError::UnknownUnit(full))
    }

    fn fetch_time_series(
        &mut self,
        id: &TsIdentifier,
        win: TimeWindow,
        unit_spec: Option<&str>,
    ) -> Result<TimeSeriesRecord> {
        let (unit, requested_datum) = match unit_spec {
            Some(spec) => {
                let (u, d) = crate::record::parse_unit_spec(spec);
                let u = if u.is_empty() { self.resolve_unit(id)? } else { u };
                (u, d)
            }
            None => (self.resolve_unit(id)?, None),
        };
        let tz = self.config.time_zone;
        let version_date_utc = match self.config.version_date {
            Some(vd) => Some(window::to_utc(tz, vd)?),
            None => None,
        };
        let req = TsReadRequest {
            ts_id: id.full.clone(),
            office: self.config.office.clone(),
            unit: unit.clone(),
            time_zone: tz.name().to_string(),
            start_utc: window::to_utc(tz, win.start)?,
            end_utc: window::to_utc(tz, win.end)?,
            start_inclusive: self.config.start_inclusive,
            end_inclusive: self.config.end_inclusive,
            retrieve_previous: self.config.retrieve_previous,
            retrieve_next: self.config.retrieve_next,
            trim_missing: self.config.trim_missing,
            version_date_utc,
            max_version: self.config.max_version,
        };
        let points = self.backend.retrieve_time_series(&req)?;
        debug!("retrieved {} samples from {}", points.len(), id.full);

        let mut times = Vec::with_capacity(points.len());
        let mut values = Vec::with_capacity(points.len());
        let mut qualities = Vec::with_capacity(points.len());
        for p in points {
            times.push(window::from_utc(tz, p.time_utc));
            values.push(p.value.unwrap_or(UNDEFINED_DOUBLE));
            qualities.push(p.quality);
        }

        let mut record = TimeSeriesRecord {
            id: id.full.clone(),
            office: self.config.office.clone(),
            interval_minutes: id.interval_minutes(),
            unit,
            time_zone: tz.name().to_string(),
            times,
            values,
            qualities,
            vertical_datum: None,
        };

        if id.is_elevation() {
            record.vertical_datum = self.backend.vertical_datum_info(
                &id.full_location(),
                &record.unit,
                self.config.office.as_deref(),
            )?;
            if let Some(datum) = requested_datum {
                self.shift_to_datum(&mut record, &datum)?;
            }
        } else if requested_datum.is_some() {
            return Err(DataAccessError::invalid(format!(
                "vertical datum requested for non-elevation series {}",
                id.full
            )));
        }
        Ok(record)
    }

    /// Shift elevation values from the native datum to `datum` in place.
    fn shift_to_datum(&mut self, record: &mut TimeSeriesRecord, datum: &str) -> Result<()> {
        let info = record.vertical_datum.as_ref().ok_or_else(|| {
            DataAccessError::invalid(format!(
                "no vertical datum information for {}",
                record.id
            ))
        })?;
        if info.native_datum.eq_ignore_ascii_case(datum) {
            return Ok(());
        }
        let offset = info.offset_to(datum).ok_or_else(|| {
            DataAccessError::invalid(format!(
                "no offset from {} to {datum} at {}",
                info.native_datum, info.location
            ))
        })?;
        for v in &mut record.values {
            if !is_missing(*v) {
                *v += offset;
            }
        }
        Ok(())
    }

    fn fetch_rating(
        &mut self,
        rid: &RatingIdentifier,
        method: RatingLoadMethod,
        win: Option<TimeWindow>,
    ) -> Result<RatingObject> {
        let office = self.config.office.clone();
        if !self.backend.rating_exists(&rid.full, office.as_deref())? {
            return Err(DataAccessError::NotFound(rid.full.clone()));
        }
        let curves = if method == RatingLoadMethod::Eager {
            let (start_utc, end_utc) = match win {
                Some(w) => {
                    let tz = self.config.time_zone;
                    (Some(window::to_utc(tz, w.start)?), Some(window::to_utc(tz, w.end)?))
                }
                None => (None, None),
            };
            Some(self.backend.retrieve_rating(&RatingReadRequest {
                rating_id: rid.full.clone(),
                office: office.clone(),
                start_utc,
                end_utc,
            })?)
        } else {
            None
        };
        Ok(RatingObject {
            office,
            rating_id: rid.full.clone(),
            method,
            window: win,
            curves,
        })
    }
}
