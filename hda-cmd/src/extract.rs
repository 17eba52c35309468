//! Time series extraction to CSV.

use anyhow::Context;
use hda_core::record::is_missing;
use hda_core::{CallArg, DataAccessSession};
use log::info;

/// Retrieve `id` over the given window and write `date_time,value,quality`
/// rows. Missing samples get an empty value field.
pub fn run_extract(
    session: &DataAccessSession,
    id: &str,
    begin: &str,
    end: &str,
    unit: Option<&str>,
    timezone: Option<&str>,
    output: &str,
) -> anyhow::Result<()> {
    if let Some(tz) = timezone {
        session.set_time_zone(tz)?;
    }
    let mut args: Vec<CallArg> = vec![begin.into(), end.into()];
    if let Some(unit) = unit {
        args.push(unit.into());
    }
    let obj = session.get(id, &args)?;
    let ts = obj
        .as_time_series()
        .with_context(|| format!("{id} is not a time series"))?;

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("creating {output}"))?;
    writer.write_record(["date_time", "value", "quality"])?;
    for ((time, value), quality) in ts
        .times
        .iter()
        .zip(ts.values.iter())
        .zip(ts.qualities.iter())
    {
        let value_field = if is_missing(*value) {
            String::new()
        } else {
            value.to_string()
        };
        writer.write_record([
            time.format("%Y-%m-%d %H:%M").to_string(),
            value_field,
            quality.to_string(),
        ])?;
    }
    writer.flush()?;
    info!(
        "wrote {} samples of {id} ({}) to {output}",
        ts.len(),
        ts.unit
    );
    Ok(())
}
