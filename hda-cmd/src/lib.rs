//! Command implementations for the data access CLI.
//!
//! Each subcommand opens a session over the selected backend (a database
//! path or a remote service URL), runs one operation, and closes.

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use hda_core::DataAccessSession;
use hda_db::{ConnectOptions, DbBackend};
use hda_rest::RestBackend;

pub mod extract;
pub mod store;

#[derive(Args)]
pub struct ConnectArgs {
    /// Database path (or a user/pass@host:port/sid URL)
    #[arg(long, conflicts_with = "url")]
    pub db: Option<String>,

    /// Remote data service base URL
    #[arg(long)]
    pub url: Option<String>,

    /// Bearer token for remote service writes
    #[arg(long, requires = "url")]
    pub token: Option<String>,

    /// Office to scope operations to
    #[arg(short, long)]
    pub office: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List identifiers matching a glob pattern
    Catalog {
        /// Pattern with * and ? wildcards (default: everything)
        pattern: Option<String>,
    },

    /// Retrieve a time series and write it to CSV
    Extract {
        /// Time series identifier
        id: String,

        /// Window start (e.g. 01Jan2020 or 2020-01-01 0600)
        #[arg(short, long)]
        begin: String,

        /// Window end
        #[arg(short, long)]
        end: String,

        /// Unit to retrieve in (default: the office display unit)
        #[arg(short, long)]
        unit: Option<String>,

        /// Time zone for the window and output times (default: UTC)
        #[arg(short, long)]
        timezone: Option<String>,

        /// Output CSV path
        #[arg(short = 'f', long)]
        output: String,
    },

    /// Store time series samples from a CSV file
    Store {
        /// Time series identifier
        id: String,

        /// Input CSV path (date_time,value,quality)
        #[arg(short = 'f', long)]
        input: String,

        /// Unit the values are in
        #[arg(short, long)]
        unit: String,

        /// Time zone of the input times (default: UTC)
        #[arg(short, long)]
        timezone: Option<String>,

        /// Store rule (default: Replace All)
        #[arg(short, long)]
        store_rule: Option<String>,
    },

    /// Show the earliest and latest sample times of a series
    Extents {
        /// Time series identifier
        id: String,
    },

    /// Delete time series or ratings
    Delete {
        /// Identifiers to delete
        ids: Vec<String>,
    },

    /// Show what the session is connected to
    Info,
}

fn open_session(connect: &ConnectArgs) -> anyhow::Result<DataAccessSession> {
    if let Some(url) = &connect.url {
        let backend = RestBackend::new(url, connect.office.as_deref(), connect.token.as_deref())
            .with_context(|| format!("connecting to {url}"))?;
        return Ok(DataAccessSession::open(Box::new(backend)));
    }
    let Some(db) = &connect.db else {
        bail!("either --db or --url is required");
    };
    let backend = DbBackend::connect(ConnectOptions {
        url: Some(db.clone()),
        office: connect.office.clone(),
        ..Default::default()
    })
    .with_context(|| format!("opening {db}"))?;
    Ok(DataAccessSession::open(Box::new(backend)))
}

pub fn run(connect: ConnectArgs, command: Command) -> anyhow::Result<()> {
    let session = open_session(&connect)?;
    match command {
        Command::Catalog { pattern } => {
            let args = match pattern {
                Some(p) => vec![p.into()],
                None => vec![],
            };
            let ids = session.cataloged_pathnames(&args)?;
            for id in &ids {
                println!("{id}");
            }
            log::info!("{} identifiers matched", ids.len());
            Ok(())
        }
        Command::Extract {
            id,
            begin,
            end,
            unit,
            timezone,
            output,
        } => extract::run_extract(&session, &id, &begin, &end, unit.as_deref(), timezone.as_deref(), &output),
        Command::Store {
            id,
            input,
            unit,
            timezone,
            store_rule,
        } => store::run_store(
            &session,
            &id,
            &input,
            &unit,
            timezone.as_deref(),
            store_rule.as_deref(),
        ),
        Command::Extents { id } => {
            let (first, last) = session.time_series_extents(&id)?;
            println!("{first}\t{last}");
            Ok(())
        }
        Command::Delete { ids } => {
            if ids.is_empty() {
                bail!("nothing to delete");
            }
            session.delete(&ids)?;
            log::info!("deleted {} identifiers", ids.len());
            Ok(())
        }
        Command::Info => {
            println!(
                "{} ({})",
                session.connection_info()?,
                session.connection_method()?.as_str()
            );
            Ok(())
        }
    }
}
