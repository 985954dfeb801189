//! verify-repro - compile a reproduction in a throwaway sandbox.
//!
//! Prints a single JSON verdict on stdout:
//! `{"success": bool, "diagnostics": string, "exitCode": int, "emitterOutput": object|null}`

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use triage_sandbox::{verify, SandboxConfig, VerificationVerdict};

/// Compile a reproduction snippet in an isolated, disposable project.
#[derive(Parser, Debug)]
#[command(name = "verify-repro", about = "Verify a reproduction in an ephemeral sandbox")]
struct Args {
    /// Path to a source file, or the source text itself
    source: String,

    /// Emitter package to run after compiling (e.g. @typespec/openapi3)
    #[arg(long)]
    emitter: Option<String>,

    /// Dependency install timeout in seconds
    #[arg(long, default_value = "120")]
    install_timeout_secs: u64,

    /// Compile timeout in seconds
    #[arg(long, default_value = "60")]
    compile_timeout_secs: u64,

    /// Package manager executable
    #[arg(long, default_value = "npm")]
    install_program: String,

    /// Compiler launcher executable
    #[arg(long, default_value = "npx")]
    compiler_program: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // stdout carries the verdict, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("triage_sandbox=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = SandboxConfig {
        install_program: args.install_program,
        compiler_program: args.compiler_program,
        install_timeout: Duration::from_secs(args.install_timeout_secs),
        compile_timeout: Duration::from_secs(args.compile_timeout_secs),
        ..SandboxConfig::default()
    };

    let verdict = match verify(&config, &args.source, args.emitter.as_deref()).await {
        Ok(verdict) => verdict,
        Err(e) => VerificationVerdict::failure(-1, e.to_string()),
    };

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
