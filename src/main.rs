//! dwiprep CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Process every volume in a directory
//! dwiprep --dirname /data/scans --output /data/out
//!
//! # Process a single subject
//! dwiprep --filename /data/scans/003-dwi.nii.gz
//!
//! # Preview the commands without running anything
//! dwiprep --dirname /data/scans --check
//!
//! # Kill any step running longer than two hours
//! dwiprep --dirname /data/scans --timeout 7200
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use log::{error, info};

use dwiprep::batch::{BatchConfig, BatchDriver, InputSource};
use dwiprep::pipeline::template::pipeline;
use dwiprep::{APP_NAME, VERSION};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "dwiprep", version, about = "DWI preprocessing batch driver")]
struct Args {
    /// Directory of input volumes (<digits>...nii.gz)
    #[arg(short = 'd', long = "dirname", value_name = "PATH")]
    dirname: Option<PathBuf>,

    /// Single input volume
    #[arg(short = 'f', long = "filename", value_name = "PATH")]
    filename: Option<PathBuf>,

    /// Root directory for per-subject workspaces [default: <input>/../out]
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the commands without running them
    #[arg(short = 'c', long = "check")]
    check: bool,

    /// Kill and fail any step running longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Write a JSON report of the batch to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Print the pipeline step table and exit
    #[arg(long)]
    list_steps: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Diffusion MRI preprocessing batch driver");
    println!();
}

/// Prints the step table with `{prefix}` placeholders.
fn print_steps() {
    for step in pipeline() {
        println!("{:>2}. {}", step.order, step.purpose);
        println!("    {}", step.render_template());
    }
}

impl Args {
    fn into_config(self) -> Result<BatchConfig, Box<dyn std::error::Error>> {
        let source = InputSource::from_options(self.dirname, self.filename)?;

        let mut config = BatchConfig::new(source);
        config.output_root = self.output;
        config.dry_run = self.check;
        config.step_timeout = self.timeout.map(Duration::from_secs);
        Ok(config)
    }
}

/// Main application entry point.
fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    setup_logging(args.verbose);
    print_banner();

    if args.list_steps {
        print_steps();
        return Ok(true);
    }

    let report_path = args.report.clone();
    let config = args.into_config()?;

    if config.dry_run {
        info!("Mode: CHECK (commands will not execute)");
    }

    let report = BatchDriver::new(config).run()?;

    println!();
    println!("{}", report.summary());

    if let Some(path) = report_path {
        if let Err(e) = report.write_json(&path) {
            error!("{}", e);
            return Ok(false);
        }
    }

    Ok(!report.has_failures())
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
