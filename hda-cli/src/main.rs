//! hda - command line access to hydrologic time series and rating data.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "hda",
    version,
    about = "Hydrologic time series and rating data access"
)]
struct Cli {
    #[command(flatten)]
    connect: hda_cmd::ConnectArgs,

    #[command(subcommand)]
    command: hda_cmd::Command,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    hda_cmd::run(cli.connect, cli.command)
}
