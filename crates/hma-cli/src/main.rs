use anyhow::{Context, Result};
use clap::Parser;
use hma_cli::config::{AnalyzeArgs, CropArgs, HistoryArgs};
use hma_cli::crop::{crop_screenshot, CropBox};
use hma_cli::logging::init_logging;
use hma_cli::report::{exit_code, failure_output, history_listing, success_output, EXIT_SUCCESS};
use hma_cli::{run_analysis, Cli, Commands, PipelineError, RunReport, Settings};
use hma_core::RunClock;
use hma_notify::{Notifier, SmtpRelay};
use hma_storage::HistoryStore;
use hma_vision::ChatCompletionsClient;
use std::process::ExitCode;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Commands::Analyze(args) => analyze(args),
        Commands::Crop(args) => exit_with(crop(args)),
        Commands::History(args) => exit_with(history(args)),
    }
}

fn analyze(args: AnalyzeArgs) -> ExitCode {
    let settings = match Settings::from_args(args) {
        Ok(settings) => settings,
        Err(err) => return fail(&PipelineError::from(err)),
    };

    match run(&settings) {
        Ok(report) => {
            print!("{}", success_output(&report));
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(err) => fail(&err),
    }
}

fn fail(err: &PipelineError) -> ExitCode {
    eprint!("{}", failure_output(err));
    ExitCode::from(exit_code(err))
}

fn run(settings: &Settings) -> Result<RunReport, PipelineError> {
    let clock = RunClock::now(settings.local_zone, settings.market_zone);
    let mut store = HistoryStore::open(&settings.storage_dir)?;
    let analyzer = ChatCompletionsClient::new(settings.vision.clone())?;
    let notifier = Notifier::new(
        settings.email.clone(),
        SmtpRelay::new(settings.email.smtp.clone()),
    );
    run_analysis(settings, &clock, &mut store, &analyzer, &notifier)
}

fn crop(args: CropArgs) -> Result<()> {
    let crop = CropBox {
        x: args.x,
        y: args.y,
        width: args.width,
        height: args.height,
    };
    let region = crop_screenshot(&args.input, crop, &args.output)
        .with_context(|| format!("Failed to crop {}", args.input.display()))?;
    println!(
        "Heat map saved to {} ({}x{})",
        args.output.display(),
        region.width,
        region.height
    );
    Ok(())
}

fn history(args: HistoryArgs) -> Result<()> {
    let store = HistoryStore::open(&args.storage_dir).context("Failed to open history")?;
    let listing = history_listing(&store, args.limit).context("Failed to read history")?;
    print!("{listing}");
    Ok(())
}

fn exit_with(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
