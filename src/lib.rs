pub mod analytics;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod fallacies;
pub mod llm;
pub mod personas;
pub mod scoring;
pub mod service;
pub mod tracing_init;

pub use analyzer::{analyze, ScoreSet};
pub use error::{AppError, Result};
pub use fallacies::{FallacyClassifier, FallacyFinding, FallacyKind, Severity};
pub use service::DebateService;

use clap::Parser;
use std::process::ExitCode;

pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();
    tracing_init::init_tracing(tracing_init::level_for_verbosity(cli.verbose));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
