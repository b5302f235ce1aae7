use crate::clock::RunClock;
use crate::record::AnalysisRecord;
use crate::response::ApiResponse;
use tracing::warn;

const TASK_LINE: &str = "Analyze this S&P 500 Heat Map image.";

const BASE_INSTRUCTIONS: [&str; 3] = [
    "Identify the overall market trend (bullish/bearish)",
    "Note which sectors are performing the best and worst",
    "Identify any notable outlier stocks (significant gains or losses)",
];

const COMPARISON_INSTRUCTION: &str =
    "Compare with the previous analysis and highlight key changes:";

const COMPARISON_POINTS: [&str; 3] = [
    "Change in overall market sentiment",
    "Sectors that have improved or deteriorated",
    "New outlier stocks that have emerged",
];

pub fn date_block(clock: &RunClock) -> String {
    format!(
        "Current date: {} ({})\nLocal time: {}\nMarket time ({}): {}",
        clock.date(),
        clock.day_of_week(),
        clock.local_time_labeled(),
        clock.market_zone_name,
        clock.market_time_labeled(),
    )
}

/// Narrative of a previous record as it is fed back into the next prompt.
pub fn previous_narrative(record: &AnalysisRecord) -> String {
    if let ApiResponse::Opaque(_) = record.response {
        warn!(
            event = "previous_narrative_fallback",
            timestamp = %record.timestamp,
            "previous response has no chat-completion text, using raw payload"
        );
    }
    record.narrative().into_owned()
}

pub fn build_prompt(previous: Option<&AnalysisRecord>, clock: &RunClock) -> String {
    let mut prompt = date_block(clock);
    prompt.push_str("\n\n");
    prompt.push_str(TASK_LINE);
    prompt.push_str("\n\n");

    for (index, instruction) in BASE_INSTRUCTIONS.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", index + 1, instruction));
    }

    let Some(previous) = previous else {
        return prompt;
    };

    prompt.push_str(&format!(
        "{}. {}\n",
        BASE_INSTRUCTIONS.len() + 1,
        COMPARISON_INSTRUCTION
    ));
    for point in COMPARISON_POINTS {
        prompt.push_str(&format!("   - {point}\n"));
    }

    prompt.push_str(&format!(
        "\nPrevious analysis from {}:\n\n{}\n",
        previous.timestamp.to_rfc3339(),
        previous_narrative(previous)
    ));
    prompt
}
