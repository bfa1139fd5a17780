use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_MAX_PAGES: u32 = 1000;
const LEDGER_DIR: &str = ".pdftoc";
const LEDGER_FILE: &str = "ledger.sqlite";

#[derive(Parser, Debug)]
#[command(
    name = "pdftoc",
    version,
    about = "Extract tables of contents from PDFs and write them back as bookmarks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract a TOC for one PDF and write it as the bookmark outline.
    Index(IndexArgs),
    /// Index every PDF in a folder.
    Batch(BatchArgs),
    /// Re-run the normalizer over saved oracle candidates.
    Merge(MergeArgs),
    /// Print the bookmark outline already stored in a PDF.
    Outline(OutlineArgs),
    /// Summarize the batch ledger.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OracleArgs {
    #[arg(long, env = "GOOGLE_AI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, default_value = "gemini-2.5-flash")]
    pub model: String,

    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Largest page range sent to the oracle in one request.
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    pub input: PathBuf,

    /// Write the bookmarked PDF here instead of replacing the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub oracle: OracleArgs,

    #[arg(long, default_value_t = false)]
    pub no_backup: bool,

    /// Write the TOC record JSON to this path.
    #[arg(long)]
    pub save_json: Option<PathBuf>,

    /// Write the raw per-chunk oracle candidates to this path.
    #[arg(long)]
    pub save_candidates: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub preview_only: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    pub input: PathBuf,

    /// Write bookmarked PDFs into this folder instead of replacing inputs.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    #[command(flatten)]
    pub oracle: OracleArgs,

    #[arg(long, default_value_t = false)]
    pub no_backup: bool,

    /// Write a TOC record JSON next to each output PDF.
    #[arg(long, default_value_t = false)]
    pub save_json: bool,

    /// Process files even when a previous run already handled them.
    #[arg(long, default_value_t = false)]
    pub no_skip: bool,

    /// Seconds to wait between files.
    #[arg(long, default_value_t = 1.0)]
    pub delay: f64,

    /// Write the batch report JSON to this path.
    #[arg(long)]
    pub log: Option<PathBuf>,

    #[arg(long)]
    pub ledger_path: Option<PathBuf>,
}

impl BatchArgs {
    pub fn resolved_ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| default_ledger_path(&self.input))
    }
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Candidate capture written by `index --save-candidates`.
    pub capture: PathBuf,

    #[arg(long)]
    pub save_json: Option<PathBuf>,

    /// Print entries as JSON instead of the preview tree.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Attach the merged outline to this PDF.
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    #[arg(short, long, requires = "pdf")]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_backup: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OutlineArgs {
    pub input: PathBuf,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(default_value = ".")]
    pub folder: PathBuf,

    #[arg(long)]
    pub ledger_path: Option<PathBuf>,
}

impl StatusArgs {
    pub fn resolved_ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| default_ledger_path(&self.folder))
    }
}

pub fn default_ledger_path(folder: &Path) -> PathBuf {
    folder.join(LEDGER_DIR).join(LEDGER_FILE)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn index_defaults() {
        let cli = Cli::try_parse_from(["pdftoc", "index", "paper.pdf", "--api-key", "k"])
            .expect("index args should parse");
        let Commands::Index(args) = cli.command else {
            panic!("expected index command");
        };
        assert_eq!(args.input, PathBuf::from("paper.pdf"));
        assert_eq!(args.oracle.model, "gemini-2.5-flash");
        assert_eq!(args.oracle.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(args.oracle.timeout_secs, 120);
        assert!(!args.no_backup);
        assert!(!args.preview_only);
    }

    #[test]
    fn batch_ledger_defaults_into_input_folder() {
        let cli = Cli::try_parse_from(["pdftoc", "batch", "papers", "-r", "--delay", "0"])
            .expect("batch args should parse");
        let Commands::Batch(args) = cli.command else {
            panic!("expected batch command");
        };
        assert!(args.recursive);
        assert_eq!(args.delay, 0.0);
        assert_eq!(
            args.resolved_ledger_path(),
            PathBuf::from("papers/.pdftoc/ledger.sqlite")
        );
    }

    #[test]
    fn merge_output_requires_pdf() {
        assert!(Cli::try_parse_from(["pdftoc", "merge", "c.json", "-o", "out.pdf"]).is_err());
        assert!(
            Cli::try_parse_from(["pdftoc", "merge", "c.json", "--pdf", "a.pdf", "-o", "out.pdf"])
                .is_ok()
        );
    }
}
