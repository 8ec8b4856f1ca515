#![allow(unused_imports)]

pub use anyhow::{Context, Error, bail};
pub use tracing::{debug, error, info, instrument, trace, warn};

pub type Result<T = (), E = Error> = anyhow::Result<T, E>;
