// Oryx CLI - Command Line Interface
// Usage: oryx [--config FILE] <sort|config> [OPTIONS]

use clap::{Parser, Subcommand};
use log::debug;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use oryx_core::vm::SortOptions;
use oryx_core::{init_logging, OryxError, OryxResult, RuntimeConfig, Value, VM};

/// Oryx - object model tools
#[derive(Parser)]
#[command(name = "oryx")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Oryx object-model tools", long_about = None)]
struct Cli {
    /// Runtime configuration file (JSON)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sort lines through a stem (lines are stem.1 .. stem.N, stem.0 the count)
    Sort {
        /// Input file; standard input when omitted
        file: Option<PathBuf>,

        /// Sort in descending order
        #[arg(short = 'd', long = "descending")]
        descending: bool,

        /// Compare without regard to case
        #[arg(short = 'i', long = "ignore-case")]
        ignore_case: bool,

        /// First line of the sorted range (1-based)
        #[arg(long = "first")]
        first: Option<usize>,

        /// Last line of the sorted range
        #[arg(long = "last")]
        last: Option<usize>,

        /// First column compared (1-based)
        #[arg(long = "column", default_value_t = 1)]
        column: usize,

        /// Number of columns compared
        #[arg(long = "length")]
        length: Option<usize>,
    },
    /// Print the effective runtime configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{}", e.format());
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> OryxResult<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::load(path),
        None => {
            let mut config = RuntimeConfig::default();
            config.apply_env();
            Ok(config)
        }
    }
}

fn run(cli: Cli) -> OryxResult<()> {
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
        Commands::Sort {
            file,
            descending,
            ignore_case,
            first,
            last,
            column,
            length,
        } => {
            let options = SortOptions::parse(
                Some(if descending { "D" } else { "A" }),
                Some(if ignore_case { "I" } else { "C" }),
            )?
            .with_columns(column, length)?;
            let input = read_input(file.as_deref())?;
            sort_lines(config, &input, first.unwrap_or(1), last, options)
        }
    }
}

fn read_input(file: Option<&Path>) -> OryxResult<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| OryxError::runtime_error(format!("Error reading file '{}': {}", path.display(), e))),
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| OryxError::runtime_error(format!("Error reading standard input: {}", e)))?;
            Ok(input)
        }
    }
}

fn sort_lines(config: RuntimeConfig, input: &str, first: usize, last: Option<usize>, options: SortOptions) -> OryxResult<()> {
    let vm = VM::with_config(config);
    let activation = vm.root_activation();
    let stem = vm.new_stem("LINES.");

    let lines: Vec<&str> = input.lines().collect();
    vm.send_message(&activation, &stem, "[]=", &[Value::from(lines.len()), Value::from("0")])?;
    for (i, line) in lines.iter().enumerate() {
        vm.send_message(&activation, &stem, "[]=", &[Value::from(*line), Value::from(i + 1)])?;
    }
    vm.sort_stem(&activation, &stem, "", first, last, options)?;
    debug!("sorted {} lines", lines.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for i in 1..=lines.len() {
        let value = vm.send_message(&activation, &stem, "[]", &[Value::from(i)])?;
        writeln!(out, "{}", vm.string_value(&activation, &value)?)
            .map_err(|e| OryxError::runtime_error(format!("Error writing output: {}", e)))?;
    }
    Ok(())
}
