//! Config validation CLI tool
//!
//! Validates a musterd configuration file and reports any errors.

use muster_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a musterd configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match muster_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", muster_config::CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", settings.daemon.socket_path.display());
            println!("  Data dir: {}", settings.daemon.data_dir.display());
            println!("  Log dir: {}", settings.daemon.log_dir.display());

            match &settings.attendance {
                Some(schedule) => {
                    println!();
                    println!("Attendance schedule:");
                    println!(
                        "  Day: {}",
                        DAY_NAMES
                            .get(schedule.day_of_week as usize)
                            .copied()
                            .unwrap_or("?")
                    );
                    println!("  Week 1 starts: {}", schedule.week_start_date);
                    println!(
                        "  Session 1: {} for {} min",
                        schedule.session1.start, schedule.session1.duration_minutes
                    );
                    println!(
                        "  Session 2: {} for {} min",
                        schedule.session2.start, schedule.session2.duration_minutes
                    );
                    if schedule.debug_mode {
                        println!("  Debug mode: ON (check-in always open)");
                    }
                }
                None => println!("  Attendance schedule: not set (keeps stored schedule)"),
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                muster_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                muster_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                muster_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                muster_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        muster_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
