use crate::pipeline::{PipelineError, RunReport};
use hma_core::AnalysisError;
use hma_storage::{HistoryStore, StorageError};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;

/// Stdout for a completed run: where the record went, then the narrative,
/// or the raw payload when the response carried none.
pub fn success_output(report: &RunReport) -> String {
    let mut output = format!("Analysis saved to {}\n", report.record_path.display());
    match report.record.response.content() {
        Some(content) => output.push_str(&format!("\nAI Analysis:\n{content}\n")),
        None => output.push_str(&format!("\nAI Analysis: {}\n", report.record.response.raw())),
    }
    output
}

pub fn exit_code(err: &PipelineError) -> u8 {
    match err {
        PipelineError::Config(_) => EXIT_CONFIG,
        PipelineError::Analysis(_) | PipelineError::Storage(_) => EXIT_FAILURE,
    }
}

/// Stderr for a failed run. HTTP failures carry the raw response body.
pub fn failure_output(err: &PipelineError) -> String {
    match err {
        PipelineError::Analysis(AnalysisError::Http { status, body }) => {
            format!("Error: API request failed with status code {status}\n{body}\n")
        }
        other => format!("Error: {other}\n"),
    }
}

/// One line per stored record, newest first.
pub fn history_listing(store: &HistoryStore, limit: usize) -> Result<String, StorageError> {
    if store.is_empty() {
        return Ok(format!("No analyses found in {}\n", store.dir().display()));
    }

    let mut listing = String::new();
    for entry in store.recent(limit) {
        let record = store.read(&entry.path)?;
        listing.push_str(&format!(
            "{}  {}  {} ({})  previous: {}\n",
            entry.key.file_name(),
            record.timestamp.to_rfc3339(),
            record.est_time,
            record.est_timezone,
            record.previous_analysis_available
        ));
    }
    Ok(listing)
}
