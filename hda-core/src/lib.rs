//! Unified access to hydrologic time-series and rating-curve data.
//!
//! This crate is the backend-independent half of the data-access façade:
//! a caller opens a [`session::DataAccessSession`] over some storage backend
//! (direct database or remote HTTP service, supplied as a [`backend::Backend`]
//! implementation) and then reads and writes data purely by identifier.
//! The same `get`/`put` surface serves both time series and ratings; the
//! identifier's structure decides which kind of object is involved.
//!
//! # Identifiers
//!
//! Two identifier shapes are recognized (see [`identifier::classify`]):
//!
//! - Time series: `location-subLoc.param-subParam.paramType.interval.duration.version`
//!   (exactly 6 dot-separated segments)
//! - Rating: `location.indParams;depParam.templateVersion.specVersion`
//!   (exactly 4 dot-separated segments, one semicolon in the second)
//!
//! # Session defaults
//!
//! Every operation consults the session's [`config::SessionConfig`] for any
//! parameter not supplied at the call site: time zone, unit system, time
//! window, store rule, inclusivity flags, version date, and rating load
//! method. Call-level values always shadow session defaults.

pub mod backend;
pub mod config;
pub mod error;
pub mod identifier;
pub mod record;
pub mod session;
pub mod window;

pub use backend::{Backend, ConnectionMethod};
pub use config::{RatingLoadMethod, SessionConfig, StoreRule, UnitSystem};
pub use error::{DataAccessError, Result};
pub use identifier::IdKind;
pub use record::{DataObject, RatingObject, RatingSetRecord, TimeSeriesRecord};
pub use session::{CallArg, DataAccessSession, PutPayload, StoreOverrides};
pub use window::TimeWindow;
