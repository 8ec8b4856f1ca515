use clap::Parser;

#[must_use]
#[derive(Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Log filter directives, for example `info` or `flowcast=debug`.
    #[clap(long = "log", env = "FLOWCAST_LOG", default_value = "info")]
    pub log: String,
}
