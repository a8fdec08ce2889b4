mod app;
mod container;
mod inputs;
mod output;
mod run;

use clap::Parser;

use crate::app::Cli;

fn main() -> std::process::ExitCode {
    if let Err(error) = ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    }) {
        eprintln!("warning: failed to set Ctrl+C handler: {error}");
    }

    let cli = Cli::parse();

    // Show cilmerge info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.json {
        let level = if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("cilmerge", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match run::run(&cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            let code = error
                .downcast_ref::<cilmerge::Error>()
                .map_or(cilmerge::ExitCode::Internal, cilmerge::Error::exit_code);
            std::process::ExitCode::from(u8::try_from(code.code()).unwrap_or(u8::MAX))
        }
    }
}
