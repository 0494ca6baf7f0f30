//! Explore a built-in program under a chosen strategy.

use std::path::PathBuf;

use tangle_engine::{Config, StrategyKind};
use tangle_tester::programs;
use tangle_tester::{IterationDriver, PortfolioCoordinator, TestReport};

fn main() {
    let mut args = std::env::args().skip(1);
    let mut program_name: Option<String> = None;
    let mut strategy = "random".to_string();
    let mut iterations: Option<usize> = None;
    let mut max_steps: Option<usize> = None;
    let mut seed: Option<u64> = None;
    let mut portfolio: Option<usize> = None;
    let mut state_cache = false;
    let mut full_exploration = false;
    let mut verbose = false;
    let mut schedule_out: Option<PathBuf> = None;
    let mut trace_out: Option<PathBuf> = None;
    let mut viz_out: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--program" => program_name = args.next(),
            "--strategy" => {
                if let Some(value) = args.next() {
                    strategy = value;
                }
            }
            "--iterations" => iterations = args.next().and_then(|s| s.parse().ok()),
            "--max-steps" => max_steps = args.next().and_then(|s| s.parse().ok()),
            "--seed" => seed = args.next().and_then(|s| s.parse().ok()),
            "--portfolio" => portfolio = args.next().and_then(|s| s.parse().ok()),
            "--state-cache" => state_cache = true,
            "--full-exploration" => full_exploration = true,
            "--verbose" => verbose = true,
            "--schedule-out" => schedule_out = args.next().map(PathBuf::from),
            "--trace-out" => trace_out = args.next().map(PathBuf::from),
            "--viz-out" => viz_out = args.next().map(PathBuf::from),
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
    let program = programs::by_name(&program_name)
        .unwrap_or_else(|| usage(&format!("unknown program '{program_name}'")));

    let kind = match strategy.as_str() {
        "random" => StrategyKind::Random,
        "dfs" => StrategyKind::Dfs,
        "iddfs" => StrategyKind::IterativeDeepeningDfs { initial_bound: 100 },
        "pct" => StrategyKind::Pct {
            priority_switches: 3,
        },
        "delay-bounding" => StrategyKind::DelayBounding { delay_bound: 2 },
        other => usage(&format!("unknown strategy '{other}'")),
    };

    let mut config = Config::with_strategy(kind);
    if let Some(value) = iterations {
        config.iterations = value;
    }
    if let Some(value) = max_steps {
        config.max_steps = value;
    }
    if let Some(value) = seed {
        config.seed = value;
    }
    if let Some(value) = portfolio {
        config.portfolio_size = value;
    }
    config.cache_program_state = state_cache;
    config.stop_on_first_bug = !full_exploration;

    let report = if config.portfolio_size > 0 {
        PortfolioCoordinator::new(config).run(&program)
    } else {
        IterationDriver::new(config).run(&program)
    };

    let report = report.unwrap_or_else(|err| fatal(&format!("engine error: {err}")));
    println!("{}", report.summary());

    write_artifacts(&report, schedule_out, trace_out, viz_out);

    if report.result.is_bug() {
        std::process::exit(2);
    }
}

fn write_artifacts(
    report: &TestReport,
    schedule_out: Option<PathBuf>,
    trace_out: Option<PathBuf>,
    viz_out: Option<PathBuf>,
) {
    if let (Some(path), Some(schedule)) = (schedule_out, &report.bug_schedule) {
        let json = schedule
            .to_json()
            .unwrap_or_else(|err| fatal(&format!("serialize schedule: {err}")));
        std::fs::write(&path, json).unwrap_or_else(|err| fatal(&format!("write schedule: {err}")));
        println!("replay schedule written to {}", path.display());
    }
    if let (Some(path), Some(trace)) = (trace_out, &report.bug_trace) {
        let json = serde_json::to_string_pretty(trace)
            .unwrap_or_else(|err| fatal(&format!("serialize trace: {err}")));
        std::fs::write(&path, json).unwrap_or_else(|err| fatal(&format!("write trace: {err}")));
        println!("bug trace written to {}", path.display());
    }
    if let (Some(path), Some(trace)) = (viz_out, &report.bug_trace) {
        let json = serde_json::to_string_pretty(&trace.export_sends())
            .unwrap_or_else(|err| fatal(&format!("serialize visualization: {err}")));
        std::fs::write(&path, json)
            .unwrap_or_else(|err| fatal(&format!("write visualization: {err}")));
        println!("send visualization written to {}", path.display());
    }
}

fn usage(msg: &str) -> ! {
    eprintln!("{msg}");
    eprintln!(
        "usage: tangle-explore --program <{}> [--strategy random|dfs|iddfs|pct|delay-bounding] \
         [--iterations N] [--max-steps N] [--seed N] [--portfolio N] [--state-cache] \
         [--full-exploration] [--verbose] [--schedule-out <file>] [--trace-out <file>] \
         [--viz-out <file>]",
        tangle_tester::programs::names().join("|")
    );
    std::process::exit(1);
}

fn fatal(msg: &str) -> ! {
    eprintln!("{msg}");
    std::process::exit(1);
}
