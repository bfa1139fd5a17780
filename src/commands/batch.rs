use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};

use super::index::{IndexJob, index_document};
use super::pipeline::build_oracle;
use crate::cli::BatchArgs;
use crate::ledger::{Ledger, LedgerRecord, LedgerStatus};
use crate::model::{BatchReport, BatchSettings, BatchStats};
use crate::oracle::TitleOracle;
use crate::toc::TocNormalizer;
use crate::util::{ensure_directory, is_pdf_path, now_utc_string, sha256_file, write_json_pretty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutputExists,
    BackupExists,
    LedgerCompleted,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutputExists => "output exists",
            Self::BackupExists => "backup exists",
            Self::LedgerCompleted => "already completed with identical content",
        }
    }
}

pub struct BatchPlan<'a> {
    pub root: &'a Path,
    pub output: Option<&'a Path>,
    pub backup: bool,
    pub save_json: bool,
    pub skip_existing: bool,
    pub delay: Duration,
    pub max_pages: u32,
}

pub fn run(args: BatchArgs) -> Result<()> {
    if !args.input.is_dir() {
        bail!("{} is not a directory", args.input.display());
    }

    let files = find_pdf_files(&args.input, args.recursive)?;
    if files.is_empty() {
        warn!(input = %args.input.display(), "no PDF files found");
        return Ok(());
    }

    let ledger_path = args.resolved_ledger_path();
    let ledger = Ledger::open(&ledger_path)?;
    let normalizer = TocNormalizer::new()?;
    let oracle = build_oracle(&args.oracle)?;

    if let Some(output) = &args.output {
        ensure_directory(output)?;
    }

    info!(
        input = %args.input.display(),
        files = files.len(),
        recursive = args.recursive,
        output = %args.output.as_deref().map(|path| path.display().to_string()).unwrap_or_else(|| "in place".to_string()),
        ledger = %ledger_path.display(),
        "starting batch"
    );

    let plan = BatchPlan {
        root: &args.input,
        output: args.output.as_deref(),
        backup: !args.no_backup,
        save_json: args.save_json,
        skip_existing: !args.no_skip,
        delay: Duration::from_secs_f64(args.delay.max(0.0)),
        max_pages: args.oracle.max_pages,
    };
    let (stats, failed_files) = process_files(&files, &plan, &oracle, &normalizer, &ledger);

    info!(
        total = stats.total_files,
        processed = stats.processed_files,
        skipped = stats.skipped_files,
        failed = stats.failed_files,
        toc_entries = stats.total_toc_entries,
        seconds = stats.processing_seconds,
        "batch completed"
    );
    for file in &failed_files {
        warn!(file = %file, "failed file");
    }

    if let Some(log_path) = &args.log {
        let report = BatchReport {
            generated_at: now_utc_string(),
            stats,
            failed_files,
            settings: BatchSettings {
                max_pages: args.oracle.max_pages,
                recursive: args.recursive,
                skip_existing: !args.no_skip,
            },
        };
        write_json_pretty(log_path, &report)?;
        info!(path = %log_path.display(), "saved batch report");
    }

    Ok(())
}

/// Runs every file through the index pipeline; one file's failure never stops the batch.
pub fn process_files(
    files: &[PathBuf],
    plan: &BatchPlan<'_>,
    oracle: &dyn TitleOracle,
    normalizer: &TocNormalizer,
    ledger: &Ledger,
) -> (BatchStats, Vec<String>) {
    let started = Instant::now();
    let mut stats = BatchStats {
        total_files: files.len(),
        ..BatchStats::default()
    };
    let mut failed_files = Vec::new();

    for (index, file) in files.iter().enumerate() {
        let key = file.display().to_string();
        let target = output_path_for(file, plan.root, plan.output);

        let sha256 = match sha256_file(file) {
            Ok(sha256) => sha256,
            Err(err) => {
                error!(file = %key, error = %err, "failed to hash file");
                stats.failed_files += 1;
                failed_files.push(key);
                continue;
            }
        };

        if plan.skip_existing {
            match skip_reason(file, &target, plan.output.is_some(), &sha256, ledger) {
                Ok(Some(reason)) => {
                    info!(file = %key, reason = reason.as_str(), "skipping file");
                    stats.skipped_files += 1;
                    continue;
                }
                Ok(None) => {}
                Err(err) => warn!(file = %key, error = %err, "skip check failed; processing anyway"),
            }
        }

        info!(file = %key, position = index + 1, total = files.len(), "processing file");

        let json_path = plan.save_json.then(|| target.with_extension("json"));
        let job = IndexJob {
            input: file,
            output: plan.output.map(|_| target.as_path()),
            backup: plan.backup,
            save_json: json_path.as_deref(),
            save_candidates: None,
            preview_only: false,
            max_pages: plan.max_pages,
        };

        let record_result = match index_document(&job, oracle, normalizer) {
            Ok(outcome) if outcome.entries.is_empty() => {
                stats.failed_files += 1;
                failed_files.push(key.clone());
                ledger.record(&LedgerRecord {
                    path: &key,
                    sha256: &sha256,
                    status: LedgerStatus::Empty,
                    entry_count: 0,
                    output_path: None,
                    error: Some("no usable structure found"),
                })
            }
            Ok(outcome) => {
                stats.processed_files += 1;
                stats.total_toc_entries += outcome.entries.len();
                let output_path = outcome
                    .written
                    .as_ref()
                    .map(|written| written.output.display().to_string());
                // In-place runs rewrite the file, so the ledger keeps the hash of the result.
                let recorded_sha256 = if plan.output.is_none() {
                    sha256_file(file).unwrap_or_else(|_| sha256.clone())
                } else {
                    sha256.clone()
                };
                info!(file = %key, entries = outcome.entries.len(), "file completed");
                ledger.record(&LedgerRecord {
                    path: &key,
                    sha256: &recorded_sha256,
                    status: LedgerStatus::Completed,
                    entry_count: outcome.entries.len(),
                    output_path: output_path.as_deref(),
                    error: None,
                })
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(file = %key, error = %message, "file failed");
                stats.failed_files += 1;
                failed_files.push(key.clone());
                ledger.record(&LedgerRecord {
                    path: &key,
                    sha256: &sha256,
                    status: LedgerStatus::Failed,
                    entry_count: 0,
                    output_path: None,
                    error: Some(&message),
                })
            }
        };
        if let Err(err) = record_result {
            warn!(file = %key, error = %err, "failed to update ledger");
        }

        if index + 1 < files.len() && !plan.delay.is_zero() {
            thread::sleep(plan.delay);
        }
    }

    stats.processing_seconds = started.elapsed().as_secs_f64();
    (stats, failed_files)
}

/// PDFs under `root`, sorted by lowercase file name.
pub fn find_pdf_files(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to read entry in {}", dir.display()))?
                .path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if is_pdf_path(&path) && !is_backup_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort_by_cached_key(|path| {
        (
            path.file_name()
                .map(|name| name.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            path.clone(),
        )
    });
    Ok(files)
}

/// Mirrors `file`'s position under `root` into `output`, or returns `file` for in-place runs.
pub fn output_path_for(file: &Path, root: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(output) => {
            let relative = file
                .strip_prefix(root)
                .ok()
                .map(Path::to_path_buf)
                .or_else(|| file.file_name().map(PathBuf::from))
                .unwrap_or_else(|| file.to_path_buf());
            output.join(relative)
        }
        None => file.to_path_buf(),
    }
}

pub fn skip_reason(
    file: &Path,
    target: &Path,
    has_output_folder: bool,
    sha256: &str,
    ledger: &Ledger,
) -> Result<Option<SkipReason>> {
    if has_output_folder {
        if target.exists() {
            return Ok(Some(SkipReason::OutputExists));
        }
    } else if file.with_file_name(backup_file_name(file)).exists() {
        return Ok(Some(SkipReason::BackupExists));
    }

    if ledger.has_success(&file.display().to_string(), sha256)? {
        return Ok(Some(SkipReason::LedgerCompleted));
    }

    Ok(None)
}

fn backup_file_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    format!("{stem}_backup.pdf")
}

fn is_backup_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| {
            stem.ends_with("_backup")
                || stem
                    .rsplit_once("_backup_")
                    .is_some_and(|(_, suffix)| {
                        !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
                    })
        })
}
