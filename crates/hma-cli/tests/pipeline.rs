use chrono::{TimeZone, Utc};
use hma_cli::{run_analysis, PipelineError, Settings};
use hma_core::{AnalysisError, ApiResponse, LocalZone, RunClock, VisionAnalyzer};
use hma_notify::{
    EmailSettings, MailRelay, Message, Notifier, NotifyError, NotifyOutcome, SmtpSettings,
};
use hma_storage::HistoryStore;
use hma_vision::VisionClientConfig;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct ScriptedAnalyzer {
    reply: Result<Value, (u16, String)>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedAnalyzer {
    fn replying(payload: Value) -> Self {
        Self {
            reply: Ok(payload),
            prompts: RefCell::new(Vec::new()),
        }
    }

    fn failing(status: u16, body: &str) -> Self {
        Self {
            reply: Err((status, body.to_string())),
            prompts: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl VisionAnalyzer for ScriptedAnalyzer {
    fn analyze(&self, image: &[u8], prompt: &str) -> Result<ApiResponse, AnalysisError> {
        assert!(!image.is_empty());
        self.prompts.borrow_mut().push(prompt.to_string());
        match &self.reply {
            Ok(payload) => Ok(ApiResponse::from_value(payload.clone())),
            Err((status, body)) => Err(AnalysisError::Http {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

#[derive(Default)]
struct CountingRelay {
    deliveries: RefCell<usize>,
    fail: bool,
}

impl MailRelay for CountingRelay {
    fn deliver(&self, _message: &Message) -> Result<(), NotifyError> {
        *self.deliveries.borrow_mut() += 1;
        if self.fail {
            return Err(NotifyError::Delivery("connection refused".to_string()));
        }
        Ok(())
    }
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }
        ]
    })
}

fn clock(minute: u32) -> RunClock {
    RunClock::at(
        Utc.with_ymd_and_hms(2026, 10, 16, 14, minute, 0)
            .single()
            .expect("valid timestamp"),
        LocalZone::Named(chrono_tz::America::Chicago),
        chrono_tz::US::Eastern,
    )
}

fn settings(dir: &TempDir, email_enabled: bool) -> Settings {
    let image_path = dir.path().join("sp500_heatmap.png");
    fs::write(&image_path, [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]).expect("write image");
    Settings {
        vision: VisionClientConfig::new("http://127.0.0.1:9/v1/chat/completions", "test-key"),
        image_path,
        storage_dir: dir.path().join("data"),
        max_previous: 4,
        local_zone: LocalZone::Named(chrono_tz::America::Chicago),
        market_zone: chrono_tz::US::Eastern,
        email: EmailSettings {
            enabled: email_enabled,
            sender: "analyzer@example.com".to_string(),
            recipients: vec!["desk@example.com".to_string()],
            smtp: SmtpSettings {
                server: "smtp.example.com".to_string(),
                ..SmtpSettings::default()
            },
        },
        templates_dir: PathBuf::from("./templates"),
    }
}

fn record_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("analysis_"))
                .count()
        })
        .unwrap_or(0)
}

#[test]
fn first_run_persists_the_raw_response() {
    let dir = TempDir::new().expect("temp dir");
    let settings = settings(&dir, false);
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let payload = completion("Market is bullish today.");
    let analyzer = ScriptedAnalyzer::replying(payload.clone());
    let notifier = Notifier::new(settings.email.clone(), CountingRelay::default());

    let report = run_analysis(&settings, &clock(30), &mut store, &analyzer, &notifier)
        .expect("run succeeds");

    assert_eq!(analyzer.calls(), 1);
    assert!(!report.record.previous_analysis_available);
    assert_eq!(report.record.response.raw(), &payload);
    assert_eq!(
        report.record_path.file_name().and_then(|name| name.to_str()),
        Some("analysis_20261016_093000.json")
    );

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(&report.record_path).expect("read record"))
            .expect("record is json");
    assert_eq!(stored["response"], payload);
    assert_eq!(stored["previous_analysis_available"], json!(false));
    assert_eq!(stored["est_timezone"], json!("US/Eastern"));
    assert_eq!(stored["local_timezone"], json!("America/Chicago"));
    assert!(!analyzer.prompts.borrow()[0].contains("Previous analysis from"));
}

#[test]
fn api_failure_writes_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let settings = settings(&dir, true);
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let analyzer = ScriptedAnalyzer::failing(500, "upstream exploded");
    let notifier = Notifier::new(settings.email.clone(), CountingRelay::default());

    let err = run_analysis(&settings, &clock(30), &mut store, &analyzer, &notifier)
        .expect_err("api failure");

    match err {
        PipelineError::Analysis(AnalysisError::Http { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(record_files(&settings.storage_dir), 0);
    assert!(store.is_empty());
    assert_eq!(*notifier.relay().deliveries.borrow(), 0);
}

#[test]
fn second_run_feeds_the_previous_narrative_into_the_prompt() {
    let dir = TempDir::new().expect("temp dir");
    let settings = settings(&dir, false);
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let notifier = Notifier::new(settings.email.clone(), CountingRelay::default());

    let first = ScriptedAnalyzer::replying(completion("Tech leads, energy lags."));
    run_analysis(&settings, &clock(30), &mut store, &first, &notifier).expect("first run");

    let second = ScriptedAnalyzer::replying(completion("Energy catching up."));
    let report =
        run_analysis(&settings, &clock(45), &mut store, &second, &notifier).expect("second run");

    assert!(report.record.previous_analysis_available);
    let prompts = second.prompts.borrow();
    let prompt = &prompts[0];
    assert!(prompt.contains("Previous analysis from 2026-10-16T09:30:00-05:00:"));
    assert!(prompt.contains("Tech leads, energy lags."));
    assert_eq!(report.record.prompt, *prompt);
    assert_eq!(record_files(&settings.storage_dir), 2);
}

#[test]
fn enabled_email_is_sent_once_per_narrative() {
    let dir = TempDir::new().expect("temp dir");
    let settings = settings(&dir, true);
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let analyzer = ScriptedAnalyzer::replying(completion("## Summary\n\n**Broad rally.**"));
    let notifier = Notifier::new(settings.email.clone(), CountingRelay::default());

    let report = run_analysis(&settings, &clock(30), &mut store, &analyzer, &notifier)
        .expect("run succeeds");

    assert!(matches!(
        report.notification,
        Some(Ok(NotifyOutcome::Sent { recipients: 1 }))
    ));
    assert_eq!(*notifier.relay().deliveries.borrow(), 1);
}

#[test]
fn disabled_email_skips_the_relay() {
    let dir = TempDir::new().expect("temp dir");
    let settings = settings(&dir, false);
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let analyzer = ScriptedAnalyzer::replying(completion("Flat session."));
    let notifier = Notifier::new(settings.email.clone(), CountingRelay::default());

    let report = run_analysis(&settings, &clock(30), &mut store, &analyzer, &notifier)
        .expect("run succeeds");

    assert!(matches!(
        report.notification,
        Some(Ok(NotifyOutcome::Disabled))
    ));
    assert_eq!(*notifier.relay().deliveries.borrow(), 0);
}

#[test]
fn response_without_narrative_is_stored_but_not_mailed() {
    let dir = TempDir::new().expect("temp dir");
    let settings = settings(&dir, true);
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let payload = json!({"result": "no choices here"});
    let analyzer = ScriptedAnalyzer::replying(payload.clone());
    let notifier = Notifier::new(settings.email.clone(), CountingRelay::default());

    let report = run_analysis(&settings, &clock(30), &mut store, &analyzer, &notifier)
        .expect("run succeeds");

    assert!(report.notification.is_none());
    assert_eq!(report.record.response.raw(), &payload);
    assert_eq!(*notifier.relay().deliveries.borrow(), 0);
    assert_eq!(record_files(&settings.storage_dir), 1);
}

#[test]
fn delivery_failure_keeps_the_record() {
    let dir = TempDir::new().expect("temp dir");
    let settings = settings(&dir, true);
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let analyzer = ScriptedAnalyzer::replying(completion("Market is bullish today."));
    let relay = CountingRelay {
        fail: true,
        ..CountingRelay::default()
    };
    let notifier = Notifier::new(settings.email.clone(), relay);

    let report = run_analysis(&settings, &clock(30), &mut store, &analyzer, &notifier)
        .expect("delivery failure is not fatal");

    assert!(matches!(
        report.notification,
        Some(Err(NotifyError::Delivery(_)))
    ));
    assert!(report.record_path.exists());
    assert_eq!(*notifier.relay().deliveries.borrow(), 1);
}

#[test]
fn unreadable_image_stops_before_the_api_call() {
    let dir = TempDir::new().expect("temp dir");
    let mut settings = settings(&dir, false);
    settings.image_path = dir.path().join("missing.png");
    let mut store = HistoryStore::open(&settings.storage_dir).expect("open store");
    let analyzer = ScriptedAnalyzer::replying(completion("unused"));
    let notifier = Notifier::new(settings.email.clone(), CountingRelay::default());

    let err = run_analysis(&settings, &clock(30), &mut store, &analyzer, &notifier)
        .expect_err("missing image");

    assert!(matches!(err, PipelineError::Config(_)));
    assert_eq!(analyzer.calls(), 0);
    assert_eq!(record_files(&settings.storage_dir), 0);
}
