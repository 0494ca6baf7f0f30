//! Replay a recorded schedule against a built-in program.

use std::path::PathBuf;

use tangle_engine::{Config, EngineError, ScheduleTrace};
use tangle_tester::programs;
use tangle_tester::IterationDriver;

fn main() {
    let mut args = std::env::args().skip(1);
    let mut program_name: Option<String> = None;
    let mut schedule_path: Option<PathBuf> = None;
    let mut trace_out: Option<PathBuf> = None;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--program" => program_name = args.next(),
            "--schedule" => schedule_path = args.next().map(PathBuf::from),
            "--trace-out" => trace_out = args.next().map(PathBuf::from),
            "--verbose" => verbose = true,
            other => usage(&format!("unknown argument '{other}'")),
        }
    }

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }

    let program_name = program_name.unwrap_or_else(|| usage("missing --program <name>"));
    let schedule_path = schedule_path.unwrap_or_else(|| usage("missing --schedule <file>"));

    let program = programs::by_name(&program_name)
        .unwrap_or_else(|| usage(&format!("unknown program '{program_name}'")));
    let input = std::fs::read_to_string(&schedule_path)
        .unwrap_or_else(|err| fatal(&format!("read {}: {err}", schedule_path.display())));
    let schedule = ScheduleTrace::from_json(&input)
        .unwrap_or_else(|err| fatal(&format!("parse schedule: {err}")));

    let mut driver = IterationDriver::for_replay(Config::default(), schedule);
    match driver.run(&program) {
        Ok(report) => {
            println!("{}", report.summary());
            if let (Some(path), Some(trace)) = (trace_out, &report.bug_trace) {
                let json = serde_json::to_string_pretty(trace)
                    .unwrap_or_else(|err| fatal(&format!("serialize trace: {err}")));
                std::fs::write(&path, json)
                    .unwrap_or_else(|err| fatal(&format!("write trace: {err}")));
                println!("bug trace written to {}", path.display());
            }
            if report.result.is_bug() {
                std::process::exit(2);
            }
        }
        Err(EngineError::ReplayDivergence { step, reason }) => {
            // Not a found bug: the program's behavior is no longer
            // reproducible against this recording.
            eprintln!("replay diverged at decision {step}: {reason}");
            std::process::exit(3);
        }
        Err(err) => fatal(&format!("engine error: {err}")),
    }
}

fn usage(msg: &str) -> ! {
    eprintln!("{msg}");
    eprintln!(
        "usage: tangle-replay --program <{}> --schedule <file> [--trace-out <file>] [--verbose]",
        programs::names().join("|")
    );
    std::process::exit(1);
}

fn fatal(msg: &str) -> ! {
    eprintln!("{msg}");
    std::process::exit(1);
}
