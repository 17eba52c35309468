//! Structural classification and parsing of object identifiers.
//!
//! Classification is purely structural: a 6-segment dotted string is a time
//! series identifier, a 4-segment dotted string whose second segment contains
//! exactly one semicolon is a rating identifier, and everything else is
//! `Unknown`. No backend lookup is involved.

use crate::error::{DataAccessError, Result};

/// What kind of object an identifier names.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum IdKind {
    TimeSeries,
    Rating,
    Unknown,
}

/// Classify an opaque identifier string.
///
/// Total and infallible; an unparseable identifier returns [`IdKind::Unknown`].
/// Callers must treat `Unknown` as an invalid-argument condition before
/// invoking any identifier-typed operation.
pub fn classify(id: &str) -> IdKind {
    let parts: Vec<&str> = id.split('.').collect();
    match parts.len() {
        6 => IdKind::TimeSeries,
        4 if parts[1].matches(';').count() == 1 => IdKind::Rating,
        _ => IdKind::Unknown,
    }
}

/// Split `name` on the first hyphen into (base, sub) parts.
fn split_sub(name: &str) -> (String, String) {
    match name.split_once('-') {
        Some((base, sub)) => (base.to_string(), sub.to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// The parsed components of a time series identifier:
/// `location-subLoc.param-subParam.paramType.interval.duration.version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsIdentifier {
    pub full: String,
    pub location: String,
    pub sub_location: String,
    pub parameter: String,
    pub sub_parameter: String,
    pub param_type: String,
    pub interval: String,
    pub duration: String,
    pub version: String,
    pub sub_version: String,
}

impl TsIdentifier {
    pub fn parse(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.split('.').collect();
        if parts.len() != 6 {
            return Err(DataAccessError::invalid(format!(
                "\"{id}\" is not a time series identifier"
            )));
        }
        let (location, sub_location) = split_sub(parts[0]);
        let (parameter, sub_parameter) = split_sub(parts[1]);
        let (version, sub_version) = split_sub(parts[5]);
        Ok(TsIdentifier {
            full: id.to_string(),
            location,
            sub_location,
            parameter,
            sub_parameter,
            param_type: parts[2].to_string(),
            interval: parts[3].to_string(),
            duration: parts[4].to_string(),
            version,
            sub_version,
        })
    }

    /// The full parameter segment (`base-sub`, or just the base).
    pub fn full_parameter(&self) -> String {
        if self.sub_parameter.is_empty() {
            self.parameter.clone()
        } else {
            format!("{}-{}", self.parameter, self.sub_parameter)
        }
    }

    /// The full location segment.
    pub fn full_location(&self) -> String {
        if self.sub_location.is_empty() {
            self.location.clone()
        } else {
            format!("{}-{}", self.location, self.sub_location)
        }
    }

    /// Whether the parameter denotes an elevation (and so carries vertical
    /// datum metadata when fetched).
    pub fn is_elevation(&self) -> bool {
        self.parameter.to_ascii_uppercase().starts_with("ELEV")
    }

    /// The interval segment resolved to minutes. Irregular intervals
    /// (`0`, `Irr`, `~...`) resolve to 0.
    pub fn interval_minutes(&self) -> i32 {
        interval_minutes(&self.interval)
    }
}

/// Resolve a named interval to minutes. Unrecognized intervals are treated
/// as irregular (0 minutes).
pub fn interval_minutes(interval: &str) -> i32 {
    let s = interval.trim();
    if s.is_empty() || s == "0" || s.starts_with('~') || s.eq_ignore_ascii_case("Irr") {
        return 0;
    }
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    let count: i32 = match digits.parse() {
        Ok(n) => n,
        Err(_) => return 0,
    };
    let unit = s[digits.len()..].trim_end_matches('s');
    let per = match unit.to_ascii_lowercase().as_str() {
        "minute" => 1,
        "hour" => 60,
        "day" => 1440,
        "week" => 10_080,
        "month" => 43_200,
        "year" => 525_600,
        "decade" => 5_256_000,
        _ => return 0,
    };
    count.checked_mul(per).unwrap_or(0)
}

/// The parsed components of a rating identifier:
/// `location.indParams;depParam.templateVersion.specVersion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingIdentifier {
    pub full: String,
    pub location: String,
    pub ind_parameters: Vec<String>,
    pub dep_parameter: String,
    pub template_version: String,
    pub spec_version: String,
}

impl RatingIdentifier {
    pub fn parse(id: &str) -> Result<Self> {
        let bad = || DataAccessError::invalid(format!("\"{id}\" is not a rating identifier"));
        let parts: Vec<&str> = id.split('.').collect();
        if parts.len() != 4 {
            return Err(bad());
        }
        let (ind, dep) = parts[1].split_once(';').ok_or_else(bad)?;
        if dep.contains(';') {
            return Err(bad());
        }
        Ok(RatingIdentifier {
            full: id.to_string(),
            location: parts[0].to_string(),
            ind_parameters: ind.split(',').map(str::to_string).collect(),
            dep_parameter: dep.to_string(),
            template_version: parts[2].to_string(),
            spec_version: parts[3].to_string(),
        })
    }

    /// The rating template identifier (`indParams;depParam.templateVersion`).
    pub fn template_id(&self) -> String {
        format!(
            "{};{}.{}",
            self.ind_parameters.join(","),
            self.dep_parameter,
            self.template_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_segment_ids_are_time_series() {
        assert_eq!(classify("A.B.C.D.E.F"), IdKind::TimeSeries);
        assert_eq!(
            classify("FTPK-Lower.Elev-Tailwater.Inst.1Hour.0.Raw"),
            IdKind::TimeSeries
        );
    }

    #[test]
    fn four_segment_ids_with_one_semicolon_are_ratings() {
        assert_eq!(classify("loc.ip1,ip2;dp.tv.sv"), IdKind::Rating);
        assert_eq!(classify("FTPK.Stage;Flow.USGS-EXSA.PRODUCTION"), IdKind::Rating);
    }

    #[test]
    fn everything_else_is_unknown() {
        assert_eq!(classify(""), IdKind::Unknown);
        assert_eq!(classify("not-an-id"), IdKind::Unknown);
        assert_eq!(classify("a.b.c.d"), IdKind::Unknown);
        assert_eq!(classify("a.b;c;d.e.f"), IdKind::Unknown);
        assert_eq!(classify("a.b.c.d.e.f.g"), IdKind::Unknown);
    }

    #[test]
    fn ts_identifier_parses_sub_parts() {
        let id = TsIdentifier::parse("FTPK-Lower.Elev-Tailwater.Inst.1Hour.0.Raw-Test").unwrap();
        assert_eq!(id.location, "FTPK");
        assert_eq!(id.sub_location, "Lower");
        assert_eq!(id.parameter, "Elev");
        assert_eq!(id.sub_parameter, "Tailwater");
        assert_eq!(id.param_type, "Inst");
        assert_eq!(id.interval, "1Hour");
        assert_eq!(id.duration, "0");
        assert_eq!(id.version, "Raw");
        assert_eq!(id.sub_version, "Test");
        assert!(id.is_elevation());
        assert_eq!(id.full_parameter(), "Elev-Tailwater");
    }

    #[test]
    fn interval_minutes_resolves_common_intervals() {
        assert_eq!(interval_minutes("1Minute"), 1);
        assert_eq!(interval_minutes("15Minutes"), 15);
        assert_eq!(interval_minutes("1Hour"), 60);
        assert_eq!(interval_minutes("6Hours"), 360);
        assert_eq!(interval_minutes("1Day"), 1440);
        assert_eq!(interval_minutes("1Week"), 10_080);
        assert_eq!(interval_minutes("1Month"), 43_200);
        assert_eq!(interval_minutes("1Year"), 525_600);
        assert_eq!(interval_minutes("0"), 0);
        assert_eq!(interval_minutes("Irr"), 0);
        assert_eq!(interval_minutes("~1Day"), 0);
    }

    #[test]
    fn oversized_interval_counts_resolve_to_irregular() {
        assert_eq!(interval_minutes("9999999Decades"), 0);
        assert_eq!(interval_minutes("99999999999999999999Minutes"), 0);
    }

    #[test]
    fn rating_identifier_parses_parameters() {
        let id = RatingIdentifier::parse("FTPK.Stage,Opening;Flow.USGS-EXSA.PRODUCTION").unwrap();
        assert_eq!(id.location, "FTPK");
        assert_eq!(id.ind_parameters, vec!["Stage", "Opening"]);
        assert_eq!(id.dep_parameter, "Flow");
        assert_eq!(id.template_id(), "Stage,Opening;Flow.USGS-EXSA");
        assert_eq!(id.spec_version, "PRODUCTION");
    }

    #[test]
    fn malformed_identifiers_fail_parse() {
        assert!(TsIdentifier::parse("a.b.c").is_err());
        assert!(RatingIdentifier::parse("a.b.c.d").is_err());
    }
}
