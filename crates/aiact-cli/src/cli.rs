// Command-line surface of the `aiact` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "aiact")]
#[command(about = "EU AI Act inventory, risk classification and compliance documents")]
#[command(version)]
#[command(
    after_help = "Environment:\n  DEEPSEEK_API_KEY, GEMINI_API_KEY, GOOGLE_API_KEY, GOOGLE_SEARCH_ENGINE_ID\n  \
                  used when config/credentials.toml leaves a key unset\n  RUST_LOG  log filter for logs/aiact.log"
)]
pub struct Cli {
    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Directory holding config/, defaults/ and logs/ (defaults to the current directory)
    #[arg(long, global = true, env = "AIACT_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Add an AI system to the inventory from a TOML or JSON file
    Register {
        #[arg(long)]
        file: PathBuf,
    },
    /// List registered systems with their latest risk tier
    List,
    /// Show a system and its latest assessment
    Show { id: String },
    /// Classify a registered system through the provider chain
    Analyze { id: String },
    /// Classify a system file with the keyword rules only, without saving
    Classify {
        #[arg(long)]
        file: PathBuf,
    },
    /// Generate the documents the latest assessment requires
    Docs {
        id: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Export the inventory as CSV (stdout when --out is omitted)
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Remove a system together with its assessments and documents
    Delete { id: String },
}
