//! Batch mode: summarize every document in a directory or zip archive.
//!
//! Documents are processed one after another. A document that cannot be
//! extracted or summarized is recorded and skipped; once `max_errors`
//! documents have failed the remaining ones are not attempted.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::{BatchError, ConfigError, ExtractionError};
use crate::extract::{SourceDocument, extract_bytes, extract_path};
use crate::invoker::CompletionInvoker;
use crate::pipeline::{Summarizer, SummaryOutcome};
use crate::prompt::Limit;
use crate::usage::TokenUsage;

/// Default number of failed documents after which a batch stops.
pub const DEFAULT_MAX_ERRORS: usize = 3;

/// One input file and the result of extracting its text.
#[derive(Debug)]
pub struct BatchInput {
    pub name: String,
    pub document: Result<SourceDocument, ExtractionError>,
}

/// Per-document result of a batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentResult {
    Summarized {
        name: String,
        outcome: SummaryOutcome,
    },
    Failed {
        name: String,
        error: String,
    },
    /// Not attempted because the error limit was reached.
    Skipped {
        name: String,
    },
}

impl DocumentResult {
    pub fn name(&self) -> &str {
        match self {
            DocumentResult::Summarized { name, .. }
            | DocumentResult::Failed { name, .. }
            | DocumentResult::Skipped { name } => name,
        }
    }

    /// Failed extraction or a summary that did not finish.
    pub fn is_error(&self) -> bool {
        match self {
            DocumentResult::Summarized { outcome, .. } => !outcome.is_success(),
            DocumentResult::Failed { .. } => true,
            DocumentResult::Skipped { .. } => false,
        }
    }

    fn error_message(&self) -> Option<String> {
        match self {
            DocumentResult::Failed { error, .. } => Some(error.clone()),
            DocumentResult::Summarized { outcome, .. } if !outcome.is_success() => {
                let detail = outcome
                    .failures
                    .last()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "no summary produced".to_string());
                Some(format!("summary {}: {}", outcome.state, detail))
            }
            _ => None,
        }
    }
}

/// Progress notifications from [`run_batch`].
#[derive(Debug, Clone, Copy)]
pub enum BatchProgress<'a> {
    /// About to attempt document `index` of `total`.
    Started {
        index: usize,
        total: usize,
        name: &'a str,
    },
    Finished(&'a DocumentResult),
}

/// Results of a whole batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentResult>,
    pub usage: TokenUsage,
    /// The error limit was reached before every document was attempted.
    pub stopped_early: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    /// Wall-clock time of the run, once it has finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }

    pub fn error_count(&self) -> usize {
        self.documents.iter().filter(|d| d.is_error()).count()
    }

    /// `(name, summary)` for every finished document.
    pub fn summaries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.documents.iter().filter_map(|d| match d {
            DocumentResult::Summarized { name, outcome } if outcome.is_success() => {
                Some((name.as_str(), outcome.text.as_str()))
            }
            _ => None,
        })
    }

    /// One `name: message` line per failed document.
    pub fn error_report(&self) -> String {
        self.documents
            .iter()
            .filter_map(|d| d.error_message().map(|msg| format!("{}: {}\n", d.name(), msg)))
            .collect()
    }
}

/// Load every document under `path`: a directory (recursively), a `.zip`
/// archive, or a single file.
pub fn load_inputs(path: &Path) -> Result<Vec<BatchInput>, ExtractionError> {
    if path.is_dir() {
        return Ok(load_directory(path));
    }
    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if is_zip {
        return load_zip(path);
    }

    let document = extract_path(path);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(vec![BatchInput { name, document }])
}

fn is_hidden(name: &str) -> bool {
    name.split('/').any(|part| part.starts_with('.') || part == "__MACOSX")
}

fn load_directory(dir: &Path) -> Vec<BatchInput> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let name = rel.to_string_lossy().replace('\\', "/");
            if is_hidden(&name) {
                return None;
            }
            Some(BatchInput {
                document: extract_path(entry.path()).map(|doc| SourceDocument {
                    name: name.clone(),
                    ..doc
                }),
                name,
            })
        })
        .collect()
}

fn load_zip(path: &Path) -> Result<Vec<BatchInput>, ExtractionError> {
    let file = File::open(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file)?;

    let mut inputs = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if is_hidden(&name) {
            continue;
        }

        let mut bytes = Vec::new();
        let document = match entry.read_to_end(&mut bytes) {
            Ok(_) => extract_bytes(&name, &bytes),
            Err(source) => Err(ExtractionError::Io {
                path: PathBuf::from(&name),
                source,
            }),
        };
        inputs.push(BatchInput { name, document });
    }
    Ok(inputs)
}

/// Summarize `inputs` in order.
///
/// `on_progress` hears about every document before it is attempted and once
/// it has a result, skipped documents included. Configuration errors abort
/// the batch; everything else is recorded per document.
pub async fn run_batch<I: CompletionInvoker>(
    summarizer: &Summarizer<I>,
    inputs: Vec<BatchInput>,
    limit: &Limit,
    max_errors: usize,
    mut on_progress: impl FnMut(BatchProgress<'_>),
) -> Result<BatchReport, ConfigError> {
    let total = inputs.len();
    let mut report = BatchReport {
        started_at: Some(Utc::now()),
        ..Default::default()
    };
    let mut errors = 0usize;

    for (index, input) in inputs.into_iter().enumerate() {
        if report.stopped_early {
            let result = DocumentResult::Skipped { name: input.name };
            on_progress(BatchProgress::Finished(&result));
            report.documents.push(result);
            continue;
        }

        on_progress(BatchProgress::Started {
            index,
            total,
            name: &input.name,
        });
        let result = match input.document {
            Ok(doc) => {
                info!(document = %doc.name, index, total, "summarizing document");
                let outcome = summarizer.summarize(&doc.text, limit).await?;
                report.usage += outcome.usage;
                DocumentResult::Summarized {
                    name: input.name,
                    outcome,
                }
            }
            Err(err) => {
                warn!(document = %input.name, error = %err, "skipping document");
                DocumentResult::Failed {
                    name: input.name,
                    error: err.to_string(),
                }
            }
        };

        if result.is_error() {
            errors += 1;
            if max_errors > 0 && errors >= max_errors {
                warn!(errors, max_errors, "error limit reached, stopping batch");
                report.stopped_early = true;
            }
        }
        on_progress(BatchProgress::Finished(&result));
        report.documents.push(result);
    }

    report.finished_at = Some(Utc::now());
    Ok(report)
}

/// Output name for the summary of `name`: `dir/report.pdf` → `dir/report_summary.txt`.
pub fn summary_file_name(name: &str) -> String {
    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, name),
    };
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    match dir {
        Some(dir) => format!("{}/{}_summary.txt", dir, stem),
        None => format!("{}_summary.txt", stem),
    }
}

/// Write every summary, plus `errors.txt` when documents failed, to a zip archive.
pub fn write_summaries_zip(report: &BatchReport, path: &Path) -> Result<(), BatchError> {
    let io_err = |source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut zip = ZipWriter::new(file);
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, summary) in report.summaries() {
        zip.start_file(summary_file_name(name), options)?;
        zip.write_all(summary.as_bytes()).map_err(io_err)?;
    }

    let errors = report.error_report();
    if !errors.is_empty() {
        zip.start_file("errors.txt", options)?;
        zip.write_all(errors.as_bytes()).map_err(io_err)?;
    }

    zip.finish()?;
    Ok(())
}
