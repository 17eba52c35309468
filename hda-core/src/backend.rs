//! The storage backend seam.
//!
//! A [`Backend`] is the storage-specific half of the façade: the session
//! resolves identifiers, units, zones, and windows, then hands the backend a
//! fully resolved request with all instants in UTC. Implementations exist for
//! a direct database connection and for a remote HTTP data service; both are
//! driven through this one trait.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::config::StoreRule;
use crate::error::Result;
use crate::record::{RatingCurve, RatingSetRecord, VerticalDatumInfo};

/// How the backend connection was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMethod {
    /// URL, user, and password all supplied by the caller.
    CredentialsSpecified,
    /// Production account credentials resolved from the installation
    /// properties file.
    ProductionAccount,
    /// Per-user service account credentials file.
    ServiceAccount,
    /// Interactive login callback.
    LoginDialog,
    /// Remote HTTP service, token or anonymous.
    RemoteService,
}

impl ConnectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMethod::CredentialsSpecified => "credentials specified",
            ConnectionMethod::ProductionAccount => "production account",
            ConnectionMethod::ServiceAccount => "service account",
            ConnectionMethod::LoginDialog => "login dialog",
            ConnectionMethod::RemoteService => "remote service",
        }
    }
}

/// One sample handed across the backend seam. `None` is a missing row;
/// times are UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsPoint {
    pub time_utc: NaiveDateTime,
    pub value: Option<f64>,
    pub quality: i32,
}

/// A fully resolved time series retrieval.
#[derive(Debug, Clone)]
pub struct TsReadRequest {
    pub ts_id: String,
    pub office: Option<String>,
    pub unit: String,
    /// Zone id for calendar-aware interval math on the backend side; the
    /// window bounds themselves are already UTC.
    pub time_zone: String,
    pub start_utc: NaiveDateTime,
    pub end_utc: NaiveDateTime,
    pub start_inclusive: bool,
    pub end_inclusive: bool,
    pub retrieve_previous: bool,
    pub retrieve_next: bool,
    pub trim_missing: bool,
    /// `None` selects non-versioned data.
    pub version_date_utc: Option<NaiveDateTime>,
    /// When no version date is given and versioned data exists, pick the
    /// maximum (true) or minimum (false) version date.
    pub max_version: bool,
}

/// A fully resolved time series store.
#[derive(Debug, Clone)]
pub struct TsWriteRequest {
    pub ts_id: String,
    pub office: Option<String>,
    pub unit: String,
    pub store_rule: StoreRule,
    pub override_protection: bool,
    pub version_date_utc: Option<NaiveDateTime>,
    pub points: Vec<TsPoint>,
}

/// A fully resolved rating retrieval. A `None` window means all effective
/// dates.
#[derive(Debug, Clone)]
pub struct RatingReadRequest {
    pub rating_id: String,
    pub office: Option<String>,
    pub start_utc: Option<NaiveDateTime>,
    pub end_utc: Option<NaiveDateTime>,
}

/// Unit lookup table: unit-system abbreviation (`EN`/`SI`) to parameter to
/// display unit.
pub type UnitMap = HashMap<String, HashMap<String, String>>;

/// Storage operations the session drives. All instants crossing this seam
/// are UTC; zone handling is entirely the session's concern.
pub trait Backend: Send {
    /// Human-readable description of what this backend is connected to.
    fn description(&self) -> String;

    fn connection_method(&self) -> ConnectionMethod;

    /// The office the connection naturally belongs to, if it has one.
    fn default_office(&self) -> Option<String>;

    /// Whether the connected identity may mutate this backend. Called
    /// before every write; implementations are free to memoize.
    fn can_write(&self) -> Result<bool>;

    /// The display-unit table used to resolve a parameter's unit in the
    /// active unit system.
    fn parameter_units(&self, office: Option<&str>) -> Result<UnitMap>;

    /// Earliest and latest sample times for a series, UTC. `None` when the
    /// series has no data.
    fn time_series_extents(
        &self,
        ts_id: &str,
        office: Option<&str>,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>>;

    fn retrieve_time_series(&self, req: &TsReadRequest) -> Result<Vec<TsPoint>>;

    fn store_time_series(&self, req: &TsWriteRequest) -> Result<()>;

    fn delete_time_series(&self, ts_id: &str, office: Option<&str>) -> Result<()>;

    fn rating_exists(&self, rating_id: &str, office: Option<&str>) -> Result<bool>;

    fn retrieve_rating(&self, req: &RatingReadRequest) -> Result<Vec<RatingCurve>>;

    fn store_rating(&self, record: &RatingSetRecord, fail_if_exists: bool) -> Result<()>;

    fn delete_rating(&self, rating_id: &str, office: Option<&str>) -> Result<()>;

    /// Identifiers matching a glob-style pattern (`*` and `?`).
    fn catalog(&self, pattern: &str, office: Option<&str>) -> Result<Vec<String>>;

    fn vertical_datum_info(
        &self,
        location: &str,
        unit: &str,
        office: Option<&str>,
    ) -> Result<Option<VerticalDatumInfo>>;

    fn store_vertical_datum_offset(
        &self,
        location: &str,
        from_datum: &str,
        to_datum: &str,
        value: f64,
        unit: &str,
        office: Option<&str>,
    ) -> Result<()>;

    fn vertical_datum_offset(
        &self,
        location: &str,
        from_datum: &str,
        to_datum: &str,
        unit: &str,
        office: Option<&str>,
    ) -> Result<Option<f64>>;

    /// Release any held resources. Called once from session close; must be
    /// safe to call more than once.
    fn close(&mut self) -> Result<()>;
}
