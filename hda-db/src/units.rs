//! Display-unit resolution.
//!
//! The unit table a session consults is the built-in defaults overlaid with
//! whatever the `display_units` table holds for the connected office.

use hda_core::backend::UnitMap;
use hda_core::{DataAccessError, Result};
use rusqlite::{params, Connection};

/// Built-in display units per base parameter: (parameter, English, SI).
/// Database rows override these.
const DEFAULT_UNITS: &[(&str, &str, &str)] = &[
    ("Flow", "cfs", "cms"),
    ("Stage", "ft", "m"),
    ("Elev", "ft", "m"),
    ("Depth", "ft", "m"),
    ("Opening", "ft", "m"),
    ("Stor", "ac-ft", "1000 m3"),
    ("Precip", "in", "mm"),
    ("Temp", "F", "C"),
    ("Speed", "mph", "kph"),
    ("Energy", "MWh", "MWh"),
    ("Count", "unit", "unit"),
    ("Code", "n/a", "n/a"),
];

/// Build the unit lookup table for an office. Office-specific rows override
/// office-wide (`''`) rows, which override the built-ins.
pub fn parameter_units(conn: &Connection, office: Option<&str>) -> Result<UnitMap> {
    let mut map = UnitMap::new();
    for (parameter, en, si) in DEFAULT_UNITS {
        map.entry("EN".to_string())
            .or_default()
            .insert(parameter.to_string(), en.to_string());
        map.entry("SI".to_string())
            .or_default()
            .insert(parameter.to_string(), si.to_string());
    }

    let mut stmt = conn
        .prepare(
            "SELECT unit_system, parameter, unit
             FROM display_units
             WHERE office = '' OR office = ?1
             ORDER BY office",
        )
        .map_err(|e| DataAccessError::backend("preparing unit lookup", e))?;
    let rows = stmt
        .query_map(params![office.unwrap_or("")], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| DataAccessError::backend("reading display units", e))?;
    for (system, parameter, unit) in rows {
        map.entry(system.to_ascii_uppercase())
            .or_default()
            .insert(parameter, unit);
    }
    log::debug!(
        "unit table holds {} English entries",
        map.get("EN").map(|m| m.len()).unwrap_or(0)
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema()).unwrap();
        conn
    }

    #[test]
    fn built_in_defaults_are_present() {
        let map = parameter_units(&conn(), None).unwrap();
        assert_eq!(map["EN"]["Flow"], "cfs");
        assert_eq!(map["SI"]["Flow"], "cms");
        assert_eq!(map["EN"]["Elev"], "ft");
    }

    #[test]
    fn database_rows_override_the_defaults() {
        let conn = conn();
        conn.execute(
            "INSERT INTO display_units (unit_system, parameter, unit) VALUES ('EN', 'Flow', 'kcfs')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO display_units (unit_system, parameter, unit, office)
             VALUES ('EN', 'Flow', 'gpm', 'SWT')",
            [],
        )
        .unwrap();
        let map = parameter_units(&conn, None).unwrap();
        assert_eq!(map["EN"]["Flow"], "kcfs");
        let map = parameter_units(&conn, Some("SWT")).unwrap();
        assert_eq!(map["EN"]["Flow"], "gpm", "office rows win over office-wide rows");
    }
}
