//! Parsing oracle
//!
//! The oracle decides whether a fetched file is structurally parsable. It is
//! an external tool; this module only defines the seam and a CLI-backed
//! implementation.
//!
//! - [`ParsingOracle`]: the trait the factory and processor call
//! - [`CliParsingOracle`]: runs an external parser binary

mod cli;
mod traits;

pub use cli::CliParsingOracle;
pub use traits::{ParseOptions, ParseReport, ParsingOracle};
