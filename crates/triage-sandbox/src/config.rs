//! Sandbox configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How the sandbox installs dependencies and invokes the compiler.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Package manager executable.
    pub install_program: String,

    /// Arguments for the install step.
    pub install_args: Vec<String>,

    /// Compiler launcher executable.
    pub compiler_program: String,

    /// Arguments placed before the compile target.
    pub compiler_args: Vec<String>,

    /// Arguments that print the compiler version.
    pub version_args: Vec<String>,

    /// Dependency every sandbox installs.
    pub baseline_dependency: String,

    /// Version requirement written for every dependency.
    pub dependency_version: String,

    /// Name of the file the snippet is written to.
    pub source_file: String,

    /// Emitter output subdirectory, relative to the sandbox root.
    pub output_dir: String,

    /// Files at or above this many characters are left out of emitter output.
    pub max_output_chars: usize,

    /// Limit for the install step.
    pub install_timeout: Duration,

    /// Limit for the compile step.
    pub compile_timeout: Duration,

    /// Where sandboxes are created. System temp dir when `None`.
    pub parent_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            install_program: "npm".to_string(),
            install_args: vec![
                "install".to_string(),
                "--no-audit".to_string(),
                "--no-fund".to_string(),
                "--loglevel=error".to_string(),
            ],
            compiler_program: "npx".to_string(),
            compiler_args: vec!["tsp".to_string(), "compile".to_string()],
            version_args: vec!["tsp".to_string(), "--version".to_string()],
            baseline_dependency: "@typespec/compiler".to_string(),
            dependency_version: "latest".to_string(),
            source_file: "main.tsp".to_string(),
            output_dir: "tsp-output".to_string(),
            max_output_chars: 50_000,
            install_timeout: Duration::from_secs(120),
            compile_timeout: Duration::from_secs(60),
            parent_dir: None,
        }
    }
}
