use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use ekyc_types::DocumentType;
use ekyc_types::settings::{DEFAULT_MIN_CONFIDENCE, DEFAULT_STAGING_PREFIX};

#[derive(Debug, Default)]
pub struct CliSources {
    pub min_confidence_from_cli: bool,
    pub use_field_coordinates_from_cli: bool,
    pub staging_prefix_from_cli: bool,
}

impl CliSources {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            min_confidence_from_cli: value_from_cli(matches, "min_confidence"),
            use_field_coordinates_from_cli: value_from_cli(matches, "use_field_coordinates"),
            staging_prefix_from_cli: value_from_cli(matches, "staging_prefix"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "ekyc",
    about = "Read identity documents and verify liveness sessions",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Minimum detector confidence (0-100) for lines, faces and labels
    #[arg(
        long = "min-confidence",
        id = "min_confidence",
        default_value_t = DEFAULT_MIN_CONFIDENCE
    )]
    pub min_confidence: f32,

    /// Prefer configured field coordinates over the generic identity analyzer
    #[arg(long = "use-field-coordinates", id = "use_field_coordinates")]
    pub use_field_coordinates: bool,

    /// Object-storage prefix for intermediate images
    #[arg(
        long = "staging-prefix",
        id = "staging_prefix",
        default_value = DEFAULT_STAGING_PREFIX
    )]
    pub staging_prefix: String,

    /// Document definitions file replacing the built-in set
    #[arg(long = "definitions", value_name = "FILE")]
    pub definitions: Option<PathBuf>,

    /// Trained classifier project used to infer document types
    #[arg(long = "classifier-project")]
    pub classifier_project: Option<String>,

    /// Pin a classifier model version instead of the running one
    #[arg(long = "classifier-version", requires = "classifier_project")]
    pub classifier_version: Option<String>,

    /// POST liveness failures to this URL
    #[arg(long = "webhook-url", value_name = "URL")]
    pub webhook_url: Option<String>,

    /// Append one JSON line per verification run to this file
    #[arg(long = "history", value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Log filter, e.g. `info` or `ekyc_documents=debug`
    #[arg(long = "log", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the supported document types
    Doctypes,
    /// Infer the document type of an image
    Classify {
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Read the fields of a document image
    Extract {
        #[command(flatten)]
        image: ImageArgs,
        /// Skip classification and treat the image as this type
        #[arg(long = "document-type", short = 't')]
        document_type: Option<DocumentType>,
    },
    /// Crop the holder's face out of a document image
    Face {
        #[command(flatten)]
        image: ImageArgs,
        #[arg(long = "document-type", short = 't')]
        document_type: Option<DocumentType>,
        /// Where to write the JPEG crop
        #[arg(long = "output", short = 'o', value_name = "FILE")]
        output: PathBuf,
    },
    /// Run the liveness checks for a verification session
    Verify {
        /// Capability replay fixture (JSON)
        #[arg(long = "fixture", value_name = "FILE")]
        fixture: PathBuf,
        /// Session to verify
        #[arg(long = "session")]
        session: String,
    },
}

#[derive(Debug, clap::Args)]
pub struct ImageArgs {
    /// Capability replay fixture (JSON)
    #[arg(long = "fixture", value_name = "FILE")]
    pub fixture: PathBuf,
    /// Storage key of the image inside the fixture
    #[arg(long = "image")]
    pub image: String,
}
