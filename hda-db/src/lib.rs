//! Direct-database backend for the data access session.
//!
//! This crate implements [`hda_core::Backend`] over an embedded SQLite
//! store. A backend is opened either from a plain path (or `:memory:`), or
//! from a network-style URL `user/pass@host:port/sid`; with a network URL
//! the store is connection-local but the host and account still drive the
//! write-permission policy for the national database list.
//!
//! Credentials resolve through a fixed chain (see [`DbBackend::connect`]):
//! explicit caller credentials, the installation properties file named by
//! `$HDA_HOME`, the per-user service account file, then an interactive
//! login callback. The first source that yields credentials wins.

pub mod schema;

mod catalog;
mod permissions;
mod queries;
mod ratings;
mod units;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use hda_core::backend::{
    Backend, ConnectionMethod, RatingReadRequest, TsPoint, TsReadRequest, TsWriteRequest, UnitMap,
};
use hda_core::record::{RatingCurve, RatingSetRecord, VerticalDatumInfo};
use hda_core::{DataAccessError, Result};
use log::{debug, info};
use rusqlite::Connection;

/// A resolved set of database credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub user: String,
    pub password: String,
}

/// Interactive credential callback, tried last in the connect chain.
pub type LoginFn = Box<dyn Fn() -> Option<Credentials> + Send>;

/// Inputs to [`DbBackend::connect`]. Everything is optional; missing pieces
/// fall through the credential chain.
#[derive(Default)]
pub struct ConnectOptions {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub office: Option<String>,
    pub login: Option<LoginFn>,
}

/// The parsed pieces of a `user/pass@host:port/sid` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbUrl {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub sid: String,
}

/// Parse a network-style database URL.
pub fn parse_db_url(url: &str) -> Result<DbUrl> {
    let bad = || DataAccessError::invalid(format!("invalid database URL: \"{url}\""));
    let (creds, rest) = url.split_once('@').ok_or_else(bad)?;
    let (user, password) = creds.split_once('/').ok_or_else(bad)?;
    let (addr, sid) = rest.split_once('/').ok_or_else(bad)?;
    let (host, port) = addr.split_once(':').ok_or_else(bad)?;
    if user.is_empty() || host.is_empty() || sid.is_empty() {
        return Err(bad());
    }
    Ok(DbUrl {
        user: user.to_string(),
        password: password.to_string(),
        host: host.to_string(),
        port: port.parse().map_err(|_| bad())?,
        sid: sid.to_string(),
    })
}

struct DbState {
    conn: Connection,
    can_write: HashMap<String, bool>,
    permission_lookups: u32,
}

/// A [`Backend`] over an embedded SQL store.
pub struct DbBackend {
    state: Mutex<DbState>,
    description: String,
    /// Host of a network-style URL; `None` for file and in-memory stores.
    host: Option<String>,
    user: String,
    office: Option<String>,
    method: ConnectionMethod,
}

impl DbBackend {
    /// Open an in-memory store.
    pub fn open_in_memory(office: Option<&str>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DataAccessError::backend("opening in-memory database", e))?;
        Self::from_connection(
            conn,
            ":memory:".to_string(),
            None,
            whoami(),
            office,
            ConnectionMethod::CredentialsSpecified,
        )
    }

    /// Open a store at a filesystem path, creating it if absent.
    pub fn open_path(path: impl AsRef<Path>, office: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| DataAccessError::backend(format!("opening {}", path.display()), e))?;
        Self::from_connection(
            conn,
            path.display().to_string(),
            None,
            whoami(),
            office,
            ConnectionMethod::CredentialsSpecified,
        )
    }

    /// Connect through the credential chain.
    ///
    /// Order: explicit credentials in `options`, then the installation
    /// properties file `$HDA_HOME/database.properties`, then the per-user
    /// service account file `$HOME/.hda/credentials.properties`, then the
    /// login callback. No source yielding credentials is
    /// `BackendUnavailable`.
    pub fn connect(options: ConnectOptions) -> Result<Self> {
        let office = options.office.as_deref();
        if let Some(url) = &options.url {
            if !url.contains('@') {
                // A plain path needs no credentials.
                return Self::open_path_or_memory(url, office);
            }
            let parsed = parse_db_url(url)?;
            let creds = Credentials {
                url: url.clone(),
                user: options.user.clone().unwrap_or(parsed.user),
                password: options.password.clone().unwrap_or(parsed.password),
            };
            return Self::from_credentials(creds, office, ConnectionMethod::CredentialsSpecified);
        }
        if let Some(creds) = read_properties(installation_properties()) {
            info!("connecting with production account credentials");
            return Self::from_credentials(creds, office, ConnectionMethod::ProductionAccount);
        }
        if let Some(creds) = read_properties(service_account_properties()) {
            info!("connecting with service account credentials");
            return Self::from_credentials(creds, office, ConnectionMethod::ServiceAccount);
        }
        if let Some(login) = &options.login {
            if let Some(creds) = login() {
                return Self::from_credentials(creds, office, ConnectionMethod::LoginDialog);
            }
        }
        Err(DataAccessError::BackendUnavailable(
            "no database credentials available".to_string(),
        ))
    }

    fn open_path_or_memory(url: &str, office: Option<&str>) -> Result<Self> {
        if url == ":memory:" {
            Self::open_in_memory(office)
        } else {
            Self::open_path(url, office)
        }
    }

    fn from_credentials(
        creds: Credentials,
        office: Option<&str>,
        method: ConnectionMethod,
    ) -> Result<Self> {
        if !creds.url.contains('@') {
            return Self::open_path_or_memory(&creds.url, office);
        }
        let parsed = parse_db_url(&creds.url)?;
        let user = if creds.user.is_empty() {
            parsed.user
        } else {
            creds.user
        };
        let conn = Connection::open_in_memory()
            .map_err(|e| DataAccessError::backend("opening database connection", e))?;
        let description = format!("{user}@{}:{}/{}", parsed.host, parsed.port, parsed.sid);
        Self::from_connection(conn, description, Some(parsed.host), user, office, method)
    }

    fn from_connection(
        conn: Connection,
        description: String,
        host: Option<String>,
        user: String,
        office: Option<&str>,
        method: ConnectionMethod,
    ) -> Result<Self> {
        conn.execute_batch(schema::create_schema())
            .map_err(|e| DataAccessError::backend("applying schema", e))?;
        debug!("opened database backend: {description}");
        Ok(DbBackend {
            state: Mutex::new(DbState {
                conn,
                can_write: HashMap::new(),
                permission_lookups: 0,
            }),
            description,
            host,
            user,
            office: office.map(str::to_string),
            method,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DbState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn installation_properties() -> Option<PathBuf> {
    std::env::var_os("HDA_HOME").map(|home| PathBuf::from(home).join("database.properties"))
}

fn service_account_properties() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".hda/credentials.properties"))
}

/// Read a `key=value` properties file into credentials. Returns `None` when
/// the file is absent or lacks a URL.
fn read_properties(path: Option<PathBuf>) -> Option<Credentials> {
    let text = std::fs::read_to_string(path?).ok()?;
    let mut url = None;
    let mut user = None;
    let mut password = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=')?;
        match key.trim() {
            "url" => url = Some(value.trim().to_string()),
            "user" => user = Some(value.trim().to_string()),
            "password" => password = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Some(Credentials {
        url: url?,
        user: user.unwrap_or_default(),
        password: password.unwrap_or_default(),
    })
}

impl Backend for DbBackend {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn connection_method(&self) -> ConnectionMethod {
        self.method
    }

    fn default_office(&self) -> Option<String> {
        self.office.clone()
    }

    fn can_write(&self) -> Result<bool> {
        let mut state = self.lock();
        if let Some(&cached) = state.can_write.get(&self.description) {
            return Ok(cached);
        }
        state.permission_lookups += 1;
        let writable = match &self.host {
            Some(host) => permissions::user_can_write(host, &self.user)?,
            None => true,
        };
        debug!(
            "write permission for {} resolved to {writable}",
            self.description
        );
        state.can_write.insert(self.description.clone(), writable);
        Ok(writable)
    }

    fn parameter_units(&self, office: Option<&str>) -> Result<UnitMap> {
        units::parameter_units(&self.lock().conn, office)
    }

    fn time_series_extents(
        &self,
        ts_id: &str,
        office: Option<&str>,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        queries::time_series_extents(&self.lock().conn, ts_id, office)
    }

    fn retrieve_time_series(&self, req: &TsReadRequest) -> Result<Vec<TsPoint>> {
        queries::retrieve_time_series(&self.lock().conn, req)
    }

    fn store_time_series(&self, req: &TsWriteRequest) -> Result<()> {
        queries::store_time_series(&self.lock().conn, req)
    }

    fn delete_time_series(&self, ts_id: &str, office: Option<&str>) -> Result<()> {
        queries::delete_time_series(&self.lock().conn, ts_id, office)
    }

    fn rating_exists(&self, rating_id: &str, office: Option<&str>) -> Result<bool> {
        ratings::rating_exists(&self.lock().conn, rating_id, office)
    }

    fn retrieve_rating(&self, req: &RatingReadRequest) -> Result<Vec<RatingCurve>> {
        ratings::retrieve_rating(&self.lock().conn, req)
    }

    fn store_rating(&self, record: &RatingSetRecord, fail_if_exists: bool) -> Result<()> {
        let state = self.lock();
        let office = self.office.as_deref().or(record.office.as_deref());
        if fail_if_exists && ratings::rating_exists(&state.conn, &record.rating_id, office)? {
            return Err(DataAccessError::ConflictExists(record.rating_id.clone()));
        }
        ratings::store_rating(&state.conn, record, self.office.as_deref())
    }

    fn delete_rating(&self, rating_id: &str, office: Option<&str>) -> Result<()> {
        ratings::delete_rating(&self.lock().conn, rating_id, office)
    }

    fn catalog(&self, pattern: &str, office: Option<&str>) -> Result<Vec<String>> {
        catalog::catalog(&self.lock().conn, pattern, office)
    }

    fn vertical_datum_info(
        &self,
        location: &str,
        unit: &str,
        office: Option<&str>,
    ) -> Result<Option<VerticalDatumInfo>> {
        catalog::vertical_datum_info(&self.lock().conn, location, unit, office)
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
        catalog::store_vertical_datum_offset(
            &self.lock().conn,
            location,
            from_datum,
            to_datum,
            value,
            unit,
            office,
        )
    }

    fn vertical_datum_offset(
        &self,
        location: &str,
        from_datum: &str,
        to_datum: &str,
        unit: &str,
        office: Option<&str>,
    ) -> Result<Option<f64>> {
        catalog::vertical_datum_offset(
            &self.lock().conn,
            location,
            from_datum,
            to_datum,
            unit,
            office,
        )
    }

    fn close(&mut self) -> Result<()> {
        // The connection is released when the backend drops; nothing is
        // held open beyond it.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parsing_accepts_the_network_form() {
        let url = parse_db_url("s0cwmsp2/secret@140.194.20.214:1521/CWMSP2").unwrap();
        assert_eq!(url.user, "s0cwmsp2");
        assert_eq!(url.password, "secret");
        assert_eq!(url.host, "140.194.20.214");
        assert_eq!(url.port, 1521);
        assert_eq!(url.sid, "CWMSP2");
    }

    #[test]
    fn url_parsing_rejects_malformed_input() {
        for bad in [
            "nohost",
            "user/pass@host/sid",
            "user/pass@host:notaport/sid",
            "/pass@host:1521/sid",
            "user/pass@:1521/sid",
        ] {
            assert!(parse_db_url(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn in_memory_backend_is_writable() {
        let backend = DbBackend::open_in_memory(Some("SWT")).unwrap();
        assert!(backend.can_write().unwrap());
        assert_eq!(backend.default_office().as_deref(), Some("SWT"));
        assert_eq!(
            backend.connection_method(),
            ConnectionMethod::CredentialsSpecified
        );
    }

    #[test]
    fn write_permission_is_memoized_per_connection() {
        let backend = DbBackend::open_in_memory(None).unwrap();
        for _ in 0..5 {
            assert!(backend.can_write().unwrap());
        }
        assert_eq!(backend.state.lock().unwrap().permission_lookups, 1);
    }

    #[test]
    fn national_host_denies_non_service_accounts() {
        let creds = Credentials {
            url: "jdoe/secret@140.194.20.214:1521/CWMSP2".to_string(),
            user: "jdoe".to_string(),
            password: "secret".to_string(),
        };
        let backend =
            DbBackend::from_credentials(creds, None, ConnectionMethod::CredentialsSpecified)
                .unwrap();
        assert!(!backend.can_write().unwrap());

        let creds = Credentials {
            url: "S0CWMSP2/secret@140.194.20.214:1521/CWMSP2".to_string(),
            user: "S0CWMSP2".to_string(),
            password: "secret".to_string(),
        };
        let backend =
            DbBackend::from_credentials(creds, None, ConnectionMethod::CredentialsSpecified)
                .unwrap();
        assert!(backend.can_write().unwrap());
    }

    #[test]
    fn storing_an_existing_rating_conflicts_at_the_backend() {
        let backend = DbBackend::open_in_memory(None).unwrap();
        let record = RatingSetRecord {
            office: None,
            rating_id: "FTPK.Stage;Flow.USGS.PROD".to_string(),
            curves: vec![],
        };
        backend.store_rating(&record, true).unwrap();
        assert!(matches!(
            backend.store_rating(&record, true),
            Err(DataAccessError::ConflictExists(_))
        ));
        backend.store_rating(&record, false).unwrap();
    }

    #[test]
    fn connect_with_a_plain_path_needs_no_credentials() {
        let backend = DbBackend::connect(ConnectOptions {
            url: Some(":memory:".to_string()),
            office: Some("NWO".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.default_office().as_deref(), Some("NWO"));
    }

    #[test]
    fn properties_parsing_skips_comments_and_blank_lines() {
        let dir = std::env::temp_dir().join("hda-db-props-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("database.properties");
        std::fs::write(
            &path,
            "# production account\n\nurl=u/p@h:1521/SID\nuser = u\npassword = p\n",
        )
        .unwrap();
        let creds = read_properties(Some(path)).unwrap();
        assert_eq!(creds.url, "u/p@h:1521/SID");
        assert_eq!(creds.user, "u");
        assert_eq!(creds.password, "p");
        assert!(read_properties(Some(dir.join("missing.properties"))).is_none());
    }
}
