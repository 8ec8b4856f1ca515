#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod battery;
mod cars;
mod cli;
mod iboost;
mod kernel;
mod outcome;
mod params;
mod plan;
mod prelude;
mod protocol;
mod rounding;
mod session;
mod windows;

use std::io;

use clap::{Parser, crate_version};
use tracing_subscriber::EnvFilter;

use crate::{cli::Args, prelude::*, session::Session};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .with_writer(io::stderr)
        .without_time()
        .compact()
        .init();
    info!(version = crate_version!(), "starting…");

    // Stdout carries the wire protocol, so it is locked for the whole session.
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    Session::new(stdin, stdout).serve()?;

    info!("done!");
    Ok(())
}

/// Configure tracing for unit tests.
#[cfg(test)]
#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("trace"))
        .with_writer(io::stderr)
        .without_time()
        .compact()
        .try_init();
}
