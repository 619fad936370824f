use chrono::NaiveDate;
use clap::{Arg, Command};
use common::logging::init_logging;
use lakehouse::{ExitCode, build_driver, run_pipeline};
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("lakehouse-cli")
        .version("1.0")
        .about("Runs the brewery medallion pipeline (fetch, bronze, silver, gold)")
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Run all stages for one date")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .default_value("config/pipeline.toml")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("date")
                        .long("date")
                        .value_name("YYYY-MM-DD")
                        .help("Overrides the run date"),
                ),
        )
        .get_matches();

    let Some(("run", run_matches)) = matches.subcommand() else {
        eprintln!("No subcommand specified. Use --help for usage information.");
        process::exit(ExitCode::ConfigError.as_i32());
    };

    let config_path = run_matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/pipeline.toml");

    let date_override = match run_matches.get_one::<String>("date") {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(e) => {
                eprintln!("Invalid --date {}: {}", raw, e);
                process::exit(ExitCode::ConfigError.as_i32());
            }
        },
        None => None,
    };

    let (settings, mut driver) = match build_driver(config_path, date_override) {
        Ok(built) => built,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            process::exit(ExitCode::ConfigError.as_i32());
        }
    };

    if let Err(e) = init_logging(&settings.logging) {
        eprintln!("Cannot initialise logging: {}", e);
        process::exit(ExitCode::ConfigError.as_i32());
    }

    let code = run_pipeline(&mut driver).await;
    process::exit(code.as_i32());
}
