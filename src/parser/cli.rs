//! CLI-based parsing oracle using an external parser binary

use super::traits::{ParseOptions, ParseReport, ParsingOracle};
use crate::error::ParseError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const MISSING_IMPORT_PREFIX: &str = "missing-import:";
const STDERR_TAIL_LINES: usize = 20;

/// Runs `<binary> <extra_args> --input <file> --output <dir> [--disable-reasoner]`
///
/// Exit status 0 accepts the file. Any other status rejects it with the tail
/// of stderr as the cause. Stdout lines of the form `missing-import: <iri>`
/// are collected into the [`ParseReport`].
pub struct CliParsingOracle {
    binary_path: PathBuf,
    extra_args: Vec<String>,
}

impl CliParsingOracle {
    /// Create an oracle with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before `--input`
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Attempt to find `ontology-parser` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ontology-parser").ok().map(Self::new)
    }

    /// Build from config: explicit path first, then PATH lookup
    pub fn from_config(config: &crate::config::ParserConfig) -> Option<Self> {
        let oracle = match &config.binary_path {
            Some(path) => Self::new(path.clone()),
            None => Self::from_path()?,
        };
        Some(oracle.with_extra_args(config.extra_args.clone()))
    }
}

#[async_trait]
impl ParsingOracle for CliParsingOracle {
    async fn parse(
        &self,
        input: &Path,
        output_dir: &Path,
        options: ParseOptions,
    ) -> crate::Result<ParseReport> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut command = Command::new(&self.binary_path);
        command
            .args(&self.extra_args)
            .arg("--input")
            .arg(input)
            .arg("--output")
            .arg(output_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !options.reasoner {
            command.arg("--disable-reasoner");
        }

        let output = command.output().await.map_err(|e| {
            crate::Error::ExternalTool(format!("Failed to execute parser: {}", e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            let cause = if tail.trim().is_empty() {
                format!("parser exited with {}", output.status)
            } else {
                tail
            };
            return Err(ParseError::Rejected {
                file: input.display().to_string(),
                cause,
            }
            .into());
        }

        Ok(ParseReport {
            missing_imports: parse_missing_imports(&stdout),
        })
    }

    fn name(&self) -> &'static str {
        "cli-parser"
    }
}

fn parse_missing_imports(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(MISSING_IMPORT_PREFIX))
        .map(|iri| iri.trim().to_string())
        .filter(|iri| !iri.is_empty())
        .collect()
}
