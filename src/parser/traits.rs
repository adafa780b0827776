//! Trait definitions for the parsing oracle

use async_trait::async_trait;
use std::path::Path;

/// Knobs for a single parse
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// Run the heavyweight inference step
    pub reasoner: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { reasoner: true }
    }
}

/// What an accepted parse reported
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Imports that could not be resolved
    pub missing_imports: Vec<String>,
}

/// Structural acceptance check for ontology files
#[async_trait]
pub trait ParsingOracle: Send + Sync {
    /// Parse `input`, writing any output into `output_dir`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`](crate::Error::Parse) when the file is rejected,
    /// or [`Error::ExternalTool`](crate::Error::ExternalTool) when the oracle
    /// could not be run at all.
    async fn parse(
        &self,
        input: &Path,
        output_dir: &Path,
        options: ParseOptions,
    ) -> crate::Result<ParseReport>;

    /// Name of this implementation, for logging
    fn name(&self) -> &'static str;
}
