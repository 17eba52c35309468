//! Time series storage from CSV.

use anyhow::Context;
use hda_core::record::{TimeSeriesRecord, UNDEFINED_DOUBLE};
use hda_core::window::parse_date_time;
use hda_core::{CallArg, DataAccessSession};
use log::info;

/// Read `date_time,value,quality` rows and store them under `id`. An empty
/// value field is a missing sample; a missing quality column means 0.
pub fn run_store(
    session: &DataAccessSession,
    id: &str,
    input: &str,
    unit: &str,
    timezone: Option<&str>,
    store_rule: Option<&str>,
) -> anyhow::Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(input)
        .with_context(|| format!("opening {input}"))?;

    let mut times = Vec::new();
    let mut values = Vec::new();
    let mut qualities = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("{input}:{}", line + 2))?;
        let time_field = row
            .get(0)
            .with_context(|| format!("{input}:{} has no date_time", line + 2))?;
        times.push(parse_date_time(time_field)?);
        let value_field = row.get(1).unwrap_or("").trim();
        values.push(if value_field.is_empty() {
            UNDEFINED_DOUBLE
        } else {
            value_field
                .parse()
                .with_context(|| format!("{input}:{}: bad value \"{value_field}\"", line + 2))?
        });
        qualities.push(match row.get(2).map(str::trim) {
            Some(q) if !q.is_empty() => q
                .parse()
                .with_context(|| format!("{input}:{}: bad quality \"{q}\"", line + 2))?,
            _ => 0,
        });
    }

    let count = times.len();
    let record = TimeSeriesRecord {
        id: id.to_string(),
        office: None,
        interval_minutes: 0,
        unit: unit.to_string(),
        time_zone: timezone.unwrap_or("UTC").to_string(),
        times,
        values,
        qualities,
        vertical_datum: None,
    };

    let mut args: Vec<CallArg> = vec![unit.into()];
    if let Some(tz) = timezone {
        args.push(tz.into());
    }
    if let Some(rule) = store_rule {
        if timezone.is_none() {
            args.push("UTC".into());
        }
        args.push(rule.into());
    }
    session.put(record.into(), &args)?;
    info!("stored {count} samples to {id}");
    Ok(())
}
