//! Session-level defaults and the enumerations that govern them.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{DataAccessError, Result};
use crate::window::TimeWindow;

/// Unit system for retrievals: English (`EN`) or SI (`SI`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSystem {
    English,
    Si,
}

impl UnitSystem {
    /// The two-letter key used by unit lookup tables.
    pub fn abbrev(&self) -> &'static str {
        match self {
            UnitSystem::English => "EN",
            UnitSystem::Si => "SI",
        }
    }
}

impl FromStr for UnitSystem {
    type Err = DataAccessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EN" | "ENGLISH" => Ok(UnitSystem::English),
            "SI" | "METRIC" => Ok(UnitSystem::Si),
            other => Err(DataAccessError::invalid(format!(
                "invalid unit system: \"{other}\" (expected English or SI)"
            ))),
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnitSystem::English => "English",
            UnitSystem::Si => "SI",
        })
    }
}

/// How a time series store treats rows already present in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRule {
    DeleteInsert,
    ReplaceAll,
    DoNotReplace,
    ReplaceMissingValuesOnly,
    ReplaceWithNonMissing,
}

impl StoreRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreRule::DeleteInsert => "Delete Insert",
            StoreRule::ReplaceAll => "Replace All",
            StoreRule::DoNotReplace => "Do Not Replace",
            StoreRule::ReplaceMissingValuesOnly => "Replace Missing Values Only",
            StoreRule::ReplaceWithNonMissing => "Replace With Non Missing",
        }
    }
}

impl FromStr for StoreRule {
    type Err = DataAccessError;

    fn from_str(s: &str) -> Result<Self> {
        // Accept spaced or underscored spellings, any case.
        let key: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "DELETEINSERT" => Ok(StoreRule::DeleteInsert),
            "REPLACEALL" => Ok(StoreRule::ReplaceAll),
            "DONOTREPLACE" => Ok(StoreRule::DoNotReplace),
            "REPLACEMISSINGVALUESONLY" => Ok(StoreRule::ReplaceMissingValuesOnly),
            "REPLACEWITHNONMISSING" => Ok(StoreRule::ReplaceWithNonMissing),
            _ => Err(DataAccessError::invalid(format!(
                "invalid store rule: \"{s}\""
            ))),
        }
    }
}

impl fmt::Display for StoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a rating set a retrieval materializes.
///
/// `Eager` loads curve data up front, `Lazy` defers it until first use, and
/// `Reference` never loads curve data at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingLoadMethod {
    Eager,
    Lazy,
    Reference,
}

impl FromStr for RatingLoadMethod {
    type Err = DataAccessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EAGER" => Ok(RatingLoadMethod::Eager),
            "LAZY" => Ok(RatingLoadMethod::Lazy),
            "REFERENCE" => Ok(RatingLoadMethod::Reference),
            other => Err(DataAccessError::invalid(format!(
                "invalid rating load method: \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for RatingLoadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RatingLoadMethod::Eager => "Eager",
            RatingLoadMethod::Lazy => "Lazy",
            RatingLoadMethod::Reference => "Reference",
        })
    }
}

/// Legacy zone abbreviations mapped onto fixed-offset zones. The Etc/GMT
/// sign convention is inverted, so `Etc/GMT+6` is UTC-6.
const TZ_ALIASES: &[(&str, &str)] = &[
    ("EST", "Etc/GMT+5"),
    ("CDT", "Etc/GMT+5"),
    ("CST", "Etc/GMT+6"),
    ("MDT", "Etc/GMT+6"),
    ("MST", "Etc/GMT+7"),
    ("PDT", "Etc/GMT+7"),
    ("PST", "Etc/GMT+8"),
];

/// Resolve a time zone name, honoring the legacy fixed-offset aliases, into
/// a [`Tz`].
pub fn normalize_time_zone(name: &str) -> Result<Tz> {
    let trimmed = name.trim();
    let resolved = TZ_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
        .map(|(_, canonical)| *canonical)
        .unwrap_or(trimmed);
    resolved
        .parse()
        .map_err(|_| DataAccessError::invalid(format!("invalid time zone: \"{name}\"")))
}

/// The sentinel version date that marks a time series as non-versioned.
pub fn non_versioned_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1111, 11, 11)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Whether a version-date string is one of the accepted non-versioned
/// sentinel spellings: a date of `11Nov1111`, `1111-11-11`, or
/// `1111/11/11`, optionally followed by a midnight time.
pub fn is_non_versioned(text: &str) -> bool {
    let cleaned = text.replace(',', " ");
    let mut fields = cleaned.split_whitespace();
    let date_ok = matches!(
        fields.next().map(str::to_ascii_uppercase).as_deref(),
        Some("11NOV1111" | "1111-11-11" | "1111/11/11")
    );
    let time_ok = matches!(
        fields.next(),
        None | Some("0000" | "00:00" | "000000" | "00:00:00")
    );
    date_ok && time_ok && fields.next().is_none()
}

/// Per-session defaults consulted by every operation that is not given an
/// explicit value at the call site.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub office: Option<String>,
    pub unit_system: UnitSystem,
    pub store_rule: StoreRule,
    pub time_zone: Tz,
    pub trim_missing: bool,
    pub start_inclusive: bool,
    pub end_inclusive: bool,
    pub retrieve_previous: bool,
    pub retrieve_next: bool,
    pub override_protection: bool,
    pub max_version: bool,
    pub rating_load_method: RatingLoadMethod,
    /// `None` means non-versioned data.
    pub version_date: Option<NaiveDateTime>,
    pub window: Option<TimeWindow>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            office: None,
            unit_system: UnitSystem::English,
            store_rule: StoreRule::ReplaceAll,
            time_zone: chrono_tz::UTC,
            trim_missing: true,
            start_inclusive: true,
            end_inclusive: true,
            retrieve_previous: false,
            retrieve_next: false,
            override_protection: false,
            max_version: true,
            rating_load_method: RatingLoadMethod::Lazy,
            version_date: None,
            window: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.unit_system, UnitSystem::English);
        assert_eq!(cfg.store_rule, StoreRule::ReplaceAll);
        assert_eq!(cfg.time_zone, chrono_tz::UTC);
        assert!(cfg.trim_missing);
        assert!(cfg.start_inclusive && cfg.end_inclusive);
        assert!(!cfg.retrieve_previous && !cfg.retrieve_next);
        assert!(!cfg.override_protection);
        assert!(cfg.max_version);
        assert_eq!(cfg.rating_load_method, RatingLoadMethod::Lazy);
        assert!(cfg.version_date.is_none());
        assert!(cfg.window.is_none());
    }

    #[test]
    fn store_rules_parse_from_spaced_and_underscored_names() {
        assert_eq!("Replace All".parse::<StoreRule>().unwrap(), StoreRule::ReplaceAll);
        assert_eq!("REPLACE_ALL".parse::<StoreRule>().unwrap(), StoreRule::ReplaceAll);
        assert_eq!("Delete Insert".parse::<StoreRule>().unwrap(), StoreRule::DeleteInsert);
        assert_eq!("Do Not Replace".parse::<StoreRule>().unwrap(), StoreRule::DoNotReplace);
        assert_eq!(
            "Replace Missing Values Only".parse::<StoreRule>().unwrap(),
            StoreRule::ReplaceMissingValuesOnly
        );
        assert_eq!(
            "replace with non missing".parse::<StoreRule>().unwrap(),
            StoreRule::ReplaceWithNonMissing
        );
        assert!("Replace Some".parse::<StoreRule>().is_err());
    }

    #[test]
    fn unit_systems_parse_by_name_or_abbreviation() {
        assert_eq!("English".parse::<UnitSystem>().unwrap(), UnitSystem::English);
        assert_eq!("EN".parse::<UnitSystem>().unwrap(), UnitSystem::English);
        assert_eq!("SI".parse::<UnitSystem>().unwrap(), UnitSystem::Si);
        assert_eq!("metric".parse::<UnitSystem>().unwrap(), UnitSystem::Si);
        assert!("imperial".parse::<UnitSystem>().is_err());
        assert_eq!(UnitSystem::English.abbrev(), "EN");
    }

    #[test]
    fn legacy_zone_aliases_map_to_fixed_offsets() {
        assert_eq!(normalize_time_zone("EST").unwrap().name(), "Etc/GMT+5");
        assert_eq!(normalize_time_zone("CDT").unwrap().name(), "Etc/GMT+5");
        assert_eq!(normalize_time_zone("CST").unwrap().name(), "Etc/GMT+6");
        assert_eq!(normalize_time_zone("MDT").unwrap().name(), "Etc/GMT+6");
        assert_eq!(normalize_time_zone("MST").unwrap().name(), "Etc/GMT+7");
        assert_eq!(normalize_time_zone("PDT").unwrap().name(), "Etc/GMT+7");
        assert_eq!(normalize_time_zone("PST").unwrap().name(), "Etc/GMT+8");
        assert_eq!(normalize_time_zone("UTC").unwrap(), chrono_tz::UTC);
        assert_eq!(
            normalize_time_zone("America/Los_Angeles").unwrap().name(),
            "America/Los_Angeles"
        );
        assert!(normalize_time_zone("Mars/Olympus").is_err());
    }

    #[test]
    fn non_versioned_sentinel_spellings() {
        assert!(is_non_versioned("1111-11-11 00:00"));
        assert!(is_non_versioned("1111-11-11"));
        assert!(is_non_versioned("1111/11/11 00:00:00"));
        assert!(is_non_versioned("11Nov1111 0000"));
        assert!(is_non_versioned("11NOV1111"));
        assert!(is_non_versioned(" 11Nov1111, 0000 "));
        assert!(!is_non_versioned("2020-01-01 00:00"));
        assert!(!is_non_versioned("1111-11-11 06:00"));
        let s = non_versioned_date();
        assert_eq!(s.format("%Y-%m-%d %H:%M").to_string(), "1111-11-11 00:00");
    }

    #[test]
    fn rating_load_methods_parse_case_insensitively() {
        assert_eq!("eager".parse::<RatingLoadMethod>().unwrap(), RatingLoadMethod::Eager);
        assert_eq!("LAZY".parse::<RatingLoadMethod>().unwrap(), RatingLoadMethod::Lazy);
        assert_eq!("Reference".parse::<RatingLoadMethod>().unwrap(), RatingLoadMethod::Reference);
        assert!("Greedy".parse::<RatingLoadMethod>().is_err());
    }
}
