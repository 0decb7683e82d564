//! CLI entry point for eventloom
//!
//! Runs or checks a project file headlessly.

use eventloom::cli::run::{RunOptions, check_project, print_summary, run_project};
use std::path::PathBuf;
use std::process;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "run" => {
            let Some(path) = args.get(2) else {
                eprintln!("Error: Missing project file path");
                eprintln!();
                print_usage();
                process::exit(1);
            };
            let options = match RunOptions::parse(path, &args[3..]) {
                Ok(options) => options,
                Err(err) => {
                    eprintln!("Error: {}", err);
                    eprintln!();
                    print_usage();
                    process::exit(1);
                }
            };
            match run_project(&options).await {
                Ok(summary) => print_summary(&summary),
                Err(err) => {
                    eprintln!("Error: Run failed");
                    eprintln!("Reason: {:#}", err);
                    process::exit(1);
                }
            }
        }
        "check" => {
            let Some(path) = args.get(2).map(PathBuf::from) else {
                eprintln!("Error: Missing project file path");
                process::exit(1);
            };
            match check_project(&path).await {
                Ok(true) => println!("OK"),
                Ok(false) => process::exit(2),
                Err(err) => {
                    eprintln!("Error: Check failed");
                    eprintln!("Reason: {:#}", err);
                    process::exit(1);
                }
            }
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Error: Unknown command '{}'", command);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("eventloom - Event sequence engine");
    println!();
    println!("USAGE:");
    println!("    eventloom run <project.json> [OPTIONS]");
    println!("    eventloom check <project.json>");
    println!();
    println!("COMMANDS:");
    println!("    run <file>      Load the project and step frames headlessly");
    println!("    check <file>    Compile and resolve the project, report problems");
    println!("    --help, -h      Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --frames <n>    Frames to run (default 600)");
    println!("    --delta <ms>    Real milliseconds per frame (default 16.67)");
    println!("    --start <type>  Event type dispatched first (default startup)");
    println!("    --debug         Enable debug logging to stderr");
}
