//! # Stopfeed CLI
//!
//! Operator utilities for checking a bridge deployment's configuration.

use anyhow::{Context, Result};
use std::env;
use stopfeed_agent::config::{parse_iso8601_duration, BridgeConfig};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "topics" => {
            if args.len() < 3 {
                eprintln!("Usage: stopfeed topics <stop_id>");
                std::process::exit(1);
            }
            let config = BridgeConfig::from_env()?;
            let scheme = config.mqtt.topic_scheme();
            let stop_id = &args[2];
            println!("{}", scheme.prediction(stop_id));
            println!("{}", scheme.event(stop_id));
        }
        "interval" => {
            if args.len() < 3 {
                eprintln!("Usage: stopfeed interval <iso8601-duration>");
                std::process::exit(1);
            }
            let duration = parse_iso8601_duration(&args[2])
                .context("Failed to parse the poll interval")?;
            println!("{}s", duration.as_secs_f64());
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"Stopfeed CLI

USAGE:
    stopfeed <COMMAND> [OPTIONS]

COMMANDS:
    topics <stop_id>       Print the prediction and event topics a stop
                           publishes to, using STOPFEED_* topic settings
    interval <duration>    Validate an ISO-8601 poll interval and print it
                           in seconds
    help                   Show this help message

EXAMPLES:
    stopfeed topics 1020453
    STOPFEED_TOPIC_PREFIX=hsl/ stopfeed topics 1020453
    stopfeed interval PT1M30S
"#
    );
}
