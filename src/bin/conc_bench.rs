//! conc-bench — drive one concurrent container configuration over an input
//! file and report whether the aggregate invariants held.
//!
//! ```bash
//! conc-bench -i values.txt -t 8 --data_structure msqueue
//! conc-bench -i values.txt -t 8 --data_structure TS --optimization Elimination
//! conc-bench -i values.txt -t 8 --data_structure SGLQueue --optimization Flat-combining
//! ```

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};

use conc_containers::{
    drive_queue, drive_stack, ElimStack, FcQueue, FcStack, MsQueue, Outcome, SglQueue, SglStack,
    TreiberStack,
};

const AUTHOR: &str = "the conc-containers contributors";

#[derive(Parser, Debug)]
#[command(name = "conc-bench")]
#[command(about = "Exercise concurrent stacks and queues over a list of integers")]
struct Cli {
    /// Print author identity and exit.
    #[arg(short = 'n', long)]
    name: bool,

    /// Path to a whitespace-separated list of integers.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Worker thread count, split into producer and consumer halves.
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Container under test.
    #[arg(long = "data_structure", value_enum)]
    data_structure: Option<DataStructure>,

    /// Contention optimization layered on the container.
    #[arg(long, value_enum, default_value_t = Optimization::None)]
    optimization: Optimization,

    /// Elimination array size (with --optimization Elimination).
    #[arg(long = "elimination_size", default_value_t = 5)]
    elimination_size: usize,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq, Debug)]
enum DataStructure {
    #[value(name = "SGLQueue")]
    SglQueue,
    #[value(name = "SGLStack")]
    SglStack,
    /// Treiber stack.
    #[value(name = "TS")]
    Treiber,
    #[value(name = "msqueue")]
    MsQueue,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq, Debug)]
enum Optimization {
    #[value(name = "none")]
    None,
    #[value(name = "Elimination")]
    Elimination,
    #[value(name = "Flat-combining")]
    FlatCombining,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return;
        }
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    if cli.name {
        println!("{AUTHOR}");
        return;
    }

    if cli.threads == 0 {
        eprintln!("conc-bench: thread count must be positive");
        process::exit(1);
    }

    let Some(data_structure) = cli.data_structure else {
        eprintln!("conc-bench: --data_structure is required");
        process::exit(1);
    };
    let Some(input) = cli.input.as_deref() else {
        eprintln!("conc-bench: --input is required");
        process::exit(1);
    };

    let values = match read_values(input) {
        Ok(values) => values,
        Err(message) => {
            eprintln!("conc-bench: {message}");
            process::exit(1);
        }
    };

    // Flat combining sizes its record array for every thread that may
    // publish; the driver runs two halves even when asked for one thread.
    let fc_capacity = cli.threads.max(2);
    let elim_size = cli.elimination_size;

    let start = Instant::now();
    let outcome = match (data_structure, cli.optimization) {
        (DataStructure::SglQueue, Optimization::None) => {
            drive_queue(&SglQueue::new(), &values, cli.threads)
        }
        (DataStructure::SglQueue, Optimization::FlatCombining) => {
            drive_queue(&FcQueue::new(fc_capacity), &values, cli.threads)
        }
        (DataStructure::MsQueue, Optimization::None) => {
            drive_queue(&MsQueue::new(), &values, cli.threads)
        }
        (DataStructure::SglStack, Optimization::None) => {
            drive_stack(&SglStack::new(), &values, cli.threads)
        }
        (DataStructure::SglStack, Optimization::Elimination) => {
            drive_stack(&ElimStack::<SglStack>::new(elim_size), &values, cli.threads)
        }
        (DataStructure::SglStack, Optimization::FlatCombining) => {
            drive_stack(&FcStack::new(fc_capacity), &values, cli.threads)
        }
        (DataStructure::Treiber, Optimization::None) => {
            drive_stack(&TreiberStack::new(), &values, cli.threads)
        }
        (DataStructure::Treiber, Optimization::Elimination) => {
            drive_stack(
                &ElimStack::<TreiberStack>::new(elim_size),
                &values,
                cli.threads,
            )
        }
        (ds, opt) => {
            eprintln!(
                "conc-bench: {:?} does not support the {:?} optimization",
                ds, opt
            );
            process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    report(&outcome, elapsed.as_secs_f64());
}

fn read_values(path: &std::path::Path) -> Result<Vec<i64>, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let mut values = Vec::new();
    for token in text.split_whitespace() {
        let value: i64 = token
            .parse()
            .map_err(|_| format!("invalid integer {token:?} in {}", path.display()))?;
        values.push(value);
    }
    if values.is_empty() {
        return Err(format!("{} holds no integers", path.display()));
    }
    Ok(values)
}

fn report(outcome: &Outcome, seconds: f64) {
    println!(
        "produced {} values (sum {}), consumed {} values (sum {})",
        outcome.produced, outcome.produced_sum, outcome.consumed, outcome.consumed_sum
    );
    println!("elapsed: {seconds:.6} s");

    if outcome.balanced() {
        println!("verification passed");
    } else {
        eprintln!("verification FAILED: producer and consumer tallies disagree");
        process::exit(1);
    }
}
