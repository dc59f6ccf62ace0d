// `application`: boot sequence and the parked daemon.
// `cli`: command line surface.
// `components`: factories for the services and metrics plumbing.
mod application;
mod cli;
mod components;


use std::io;

use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    // Fatal boot errors go to stderr and turn into a non-zero exit code.
    let result = match cli.command {
        Commands::Start(args) => application::run(args).await,
    };

    if let Err(err) = result {
        eprintln!("[node] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}
