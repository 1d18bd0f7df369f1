mod app;

use clap::Parser;
use dotweave::Weaver;

use crate::app::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // dotweave info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("dotweave", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let Some(path) = cli.target() else {
        return Ok(());
    };

    // Failures are reported, never turned into an exit code
    match Weaver::new(cli.config()).weave_file(&path) {
        Ok(report) => {
            for failure in &report.failures {
                println!("{}: {}", failure.property, failure.error);
            }
            log::debug!(
                "{} woven, {} skipped",
                report.woven.len(),
                report.failures.len()
            );
        }
        Err(error) => {
            println!("{error}");
            println!("{error:?}");
        }
    }

    Ok(())
}
