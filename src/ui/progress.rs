use crate::batch::DocumentResult;
use crate::pipeline::{DocumentState, PipelineEvent};
use crate::ui::icons::{CHECK, CROSS, DOCUMENT, SKIPPED, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal progress for summarization runs, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Document bar, tracking how many documents of a batch are done
/// - Chunk bar, tracking completed chunks in the current pass
///
/// Single-document runs use only the chunk bar.
pub struct SummaryUI {
    multi: MultiProgress,
    document_bar: Option<ProgressBar>,
    chunk_bar: ProgressBar,
    verbose: bool,
}

impl SummaryUI {
    /// Create the UI. `total_documents` of `None` hides the document bar.
    pub fn new(total_documents: Option<u64>, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let document_bar = total_documents.map(|total| {
            let style = ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("progress bar template is a valid static string")
                .progress_chars("█▓▒░");
            let bar = multi.add(ProgressBar::new(total));
            bar.set_style(style);
            bar.set_prefix("Documents");
            bar
        });

        let chunk_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {spinner} [{bar:30.green/white}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("=> ");
        let chunk_bar = multi.add(ProgressBar::new(0));
        chunk_bar.set_style(chunk_style);
        chunk_bar.set_prefix("   Chunks");

        Self {
            multi,
            document_bar,
            chunk_bar,
            verbose,
        }
    }

    /// A UI that draws nothing, for `--quiet` and non-terminal output.
    pub fn hidden() -> Self {
        let ui = Self::new(None, false);
        ui.multi
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());
        ui
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Announce the next document of a batch.
    pub fn start_document(&self, index: usize, total: usize, name: &str) {
        if let Some(bar) = &self.document_bar {
            bar.set_message(format!("{}", style(name).yellow()));
        }
        if self.verbose {
            self.print_line(format!(
                "{}{} ({}/{})",
                DOCUMENT,
                style(name).bold(),
                index + 1,
                total
            ));
        }
    }

    /// Advance the document bar and print the document's result.
    pub fn finish_document(&self, result: &DocumentResult) {
        if let Some(bar) = &self.document_bar {
            bar.inc(1);
        }
        let line = match result {
            DocumentResult::Summarized { name, outcome } if outcome.is_success() => {
                format!("{}{}", CHECK, name)
            }
            DocumentResult::Summarized { name, outcome } => format!(
                "{}{} {}",
                CROSS,
                name,
                style(format!("({})", outcome.state)).red()
            ),
            DocumentResult::Failed { name, error } => {
                format!("{}{} {}", CROSS, name, style(error).red())
            }
            DocumentResult::Skipped { name } => {
                format!("{}{} {}", SKIPPED, name, style("(skipped)").dim())
            }
        };
        self.print_line(line);
    }

    /// Update the bars from a pipeline event.
    pub fn handle_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StateChanged { state } => {
                self.chunk_bar
                    .set_message(format!("{}", style(state).dim()));
                match state {
                    DocumentState::Partitioning => self
                        .chunk_bar
                        .enable_steady_tick(Duration::from_millis(100)),
                    s if s.is_terminal() => self.chunk_bar.disable_steady_tick(),
                    _ => {}
                }
            }
            PipelineEvent::PassStarted { pass, chunks } => {
                self.chunk_bar.set_length(*chunks as u64);
                self.chunk_bar.set_position(0);
                self.chunk_bar.set_message(format!("pass {}", pass));
            }
            PipelineEvent::ChunkCompleted { usage, .. } => {
                self.chunk_bar.inc(1);
                if self.verbose {
                    self.chunk_bar.set_message(format!(
                        "{} tokens",
                        style(usage.total()).cyan()
                    ));
                }
            }
            PipelineEvent::ChunkFailed {
                pass,
                index,
                total,
                message,
            } => {
                self.chunk_bar.inc(1);
                self.print_line(format!(
                    "{}pass {} chunk {}/{} failed: {}",
                    CROSS,
                    pass,
                    index + 1,
                    total,
                    style(message).red()
                ));
            }
            PipelineEvent::Truncated { warning } => {
                self.print_line(format!("{}{}", WARN, style(warning).yellow()));
            }
        }
    }

    /// Clear the bars once a run is over.
    pub fn finish(&self) {
        self.chunk_bar.finish_and_clear();
        if let Some(bar) = &self.document_bar {
            bar.finish_with_message("done");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::TokenUsage;

    #[test]
    fn test_events_drive_chunk_bar() {
        let ui = SummaryUI::hidden();
        ui.handle_event(&PipelineEvent::PassStarted { pass: 1, chunks: 3 });
        assert_eq!(ui.chunk_bar.length(), Some(3));

        ui.handle_event(&PipelineEvent::ChunkCompleted {
            pass: 1,
            index: 0,
            total: 3,
            usage: TokenUsage::new(10, 2),
        });
        ui.handle_event(&PipelineEvent::ChunkFailed {
            pass: 1,
            index: 1,
            total: 3,
            message: "boom".to_string(),
        });
        assert_eq!(ui.chunk_bar.position(), 2);

        ui.handle_event(&PipelineEvent::PassStarted { pass: 2, chunks: 1 });
        assert_eq!(ui.chunk_bar.position(), 0);
        assert_eq!(ui.chunk_bar.length(), Some(1));
    }

    #[test]
    fn test_document_bar_counts_results() {
        let ui = SummaryUI::new(Some(2), false);
        ui.multi
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());

        ui.start_document(0, 2, "a.txt");
        ui.finish_document(&DocumentResult::Skipped {
            name: "a.txt".to_string(),
        });
        let bar = ui.document_bar.as_ref().unwrap();
        assert_eq!(bar.position(), 1);
        ui.finish();
        assert!(bar.is_finished());
    }
}
