use crate::config::{ConfigError, Settings};
use hma_core::{build_prompt, AnalysisError, AnalysisRecord, RunClock, VisionAnalyzer};
use hma_notify::{MailRelay, Notifier, NotifyError, NotifyOutcome};
use hma_storage::{HistoryStore, StorageError};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug)]
pub struct RunReport {
    pub record_path: PathBuf,
    pub record: AnalysisRecord,
    /// `None` when the response carried no narrative to send.
    pub notification: Option<Result<NotifyOutcome, NotifyError>>,
}

/// One end-to-end run. Nothing is written unless the API call succeeds, and
/// a notification failure never undoes the stored record.
pub fn run_analysis<A, R>(
    settings: &Settings,
    clock: &RunClock,
    store: &mut HistoryStore,
    analyzer: &A,
    notifier: &Notifier<R>,
) -> Result<RunReport, PipelineError>
where
    A: VisionAnalyzer,
    R: MailRelay,
{
    let image = fs::read(&settings.image_path).map_err(|source| ConfigError::ImageUnreadable {
        path: settings.image_path.clone(),
        source,
    })?;

    let previous = store.latest(settings.max_previous)?;
    let prompt = build_prompt(previous.as_ref(), clock);
    info!(
        event = "analysis_start",
        image = %settings.image_path.display(),
        image_bytes = image.len(),
        previous = previous.is_some()
    );

    let response = analyzer.analyze(&image, &prompt)?;

    let record = AnalysisRecord::compose(
        clock,
        &settings.image_path,
        prompt,
        response,
        previous.is_some(),
    );
    let record_path = store.append(&record)?;
    info!(event = "analysis_saved", path = %record_path.display());

    let notification = record.response.content().map(|narrative| {
        let outcome = notifier.notify(narrative, clock, &settings.image_path);
        match &outcome {
            Ok(NotifyOutcome::Sent { recipients }) => {
                info!(event = "notification_sent", recipients = *recipients)
            }
            Ok(skipped) => info!(event = "notification_skipped", reason = ?skipped),
            Err(err) => error!(event = "notification_failed", error = %err),
        }
        outcome
    });

    Ok(RunReport {
        record_path,
        record,
        notification,
    })
}
