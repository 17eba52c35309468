//! SQL schema for the direct-database backend.
//!
//! The schema is applied as a single batch when a connection is opened.
//! Offices are stored as `''` rather than NULL so they can participate in
//! primary keys.

/// Returns the full SQL schema as a single batch string.
///
/// Tables:
/// - `ts_spec` - Time series metadata (identifier, office, interval)
/// - `ts_value` - Samples, keyed by identifier, office, sample time, and
///   version date. Non-versioned rows carry the sentinel version date.
/// - `display_units` - Per-unit-system display unit for each parameter
/// - `rating_spec` / `rating_curve` - Rating identifiers and their dated
///   curves (points stored as JSON)
/// - `vertical_datum` / `vertical_datum_offset` - Native datum per location
///   and offsets to other datums
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS ts_spec (
        ts_id TEXT NOT NULL,
        office TEXT NOT NULL DEFAULT '',
        interval_minutes INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (ts_id, office)
    );

    CREATE TABLE IF NOT EXISTS ts_value (
        ts_id TEXT NOT NULL,
        office TEXT NOT NULL DEFAULT '',
        date_time TEXT NOT NULL,
        version_date TEXT NOT NULL DEFAULT '1111-11-11 00:00:00',
        value REAL,
        quality INTEGER NOT NULL DEFAULT 0,
        protected INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (ts_id, office, date_time, version_date)
    );
    CREATE INDEX IF NOT EXISTS idx_ts_value_time ON ts_value(ts_id, date_time);

    CREATE TABLE IF NOT EXISTS display_units (
        unit_system TEXT NOT NULL,
        parameter TEXT NOT NULL,
        unit TEXT NOT NULL,
        office TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (unit_system, parameter, office)
    );

    CREATE TABLE IF NOT EXISTS rating_spec (
        rating_id TEXT NOT NULL,
        office TEXT NOT NULL DEFAULT '',
        template_id TEXT NOT NULL,
        PRIMARY KEY (rating_id, office)
    );

    CREATE TABLE IF NOT EXISTS rating_curve (
        rating_id TEXT NOT NULL,
        office TEXT NOT NULL DEFAULT '',
        effective_date TEXT NOT NULL,
        points TEXT NOT NULL,
        PRIMARY KEY (rating_id, office, effective_date)
    );

    CREATE TABLE IF NOT EXISTS vertical_datum (
        location TEXT NOT NULL,
        office TEXT NOT NULL DEFAULT '',
        native_datum TEXT NOT NULL,
        unit TEXT NOT NULL,
        PRIMARY KEY (location, office)
    );

    CREATE TABLE IF NOT EXISTS vertical_datum_offset (
        location TEXT NOT NULL,
        office TEXT NOT NULL DEFAULT '',
        from_datum TEXT NOT NULL,
        to_datum TEXT NOT NULL,
        unit TEXT NOT NULL,
        value REAL NOT NULL,
        estimate INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (location, office, from_datum, to_datum, unit)
    );

    "#
}
