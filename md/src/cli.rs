//! Command-line arguments and log output for the `mdmc` binary

use clap::Parser;
use std::fmt;
use std::fs::File;
use std::time::SystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// Lennard-Jones molecular dynamics and Monte Carlo driven by a YAML run file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override log file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override the random seed of the run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the output directory
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Parse and validate the configuration, then exit
    #[arg(long)]
    pub check: bool,
}

/// Wall clock time with seconds precision
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let total_seconds = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Send log output to `output_path`, or to stdout when absent
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                Registry::default().with(file_layer).init();
                info!("Log written to: {}", path);
            }
            Err(e) => eprintln!("Could not create log file {}: {}", path, e),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults_and_overrides() {
        let args = Args::parse_from(["mdmc"]);
        assert_eq!(args.config_file, "config.yaml");
        assert!(args.seed.is_none());
        assert!(!args.check);

        let args = Args::parse_from(["mdmc", "-c", "run.yaml", "--seed", "11", "--check"]);
        assert_eq!(args.config_file, "run.yaml");
        assert_eq!(args.seed, Some(11));
        assert!(args.check);
    }
}
