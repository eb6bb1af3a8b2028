//! dotsafe command-line entry point.

use anyhow::Result;
use clap::Parser;

use dotsafe::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    let name = args.command.name();
    logging::init_subscriber(args.verbose, name);
    let log = logging::Logger::new(name);

    match &args.command {
        cli::Command::Apply => commands::apply::run(&args.global, &log),
        cli::Command::Backup(opts) => commands::backup::run(&args.global, opts, &log),
        cli::Command::List(opts) => commands::list::run(&args.global, opts, &log),
        cli::Command::Prune(opts) => commands::prune::run(&args.global, opts, &log),
        cli::Command::Restore(opts) => commands::restore::run(&args.global, opts, &log),
        cli::Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
