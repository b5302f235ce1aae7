use crate::clock::RunClock;
use crate::response::ApiResponse;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// One persisted analysis run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub date: String,
    pub day_of_week: String,
    pub local_time: String,
    pub local_timezone: String,
    pub est_time: String,
    pub est_timezone: String,
    pub image_path: String,
    pub prompt: String,
    pub response: ApiResponse,
    pub previous_analysis_available: bool,
}

impl AnalysisRecord {
    pub fn compose(
        clock: &RunClock,
        image_path: &Path,
        prompt: impl Into<String>,
        response: ApiResponse,
        had_previous: bool,
    ) -> Self {
        Self {
            timestamp: clock.local,
            date: clock.date(),
            day_of_week: clock.day_of_week(),
            local_time: clock.local_time(),
            local_timezone: clock.local_zone_name.clone(),
            est_time: clock.market_time(),
            est_timezone: clock.market_zone_name.clone(),
            image_path: image_path.display().to_string(),
            prompt: prompt.into(),
            response,
            previous_analysis_available: had_previous,
        }
    }

    pub fn narrative(&self) -> Cow<'_, str> {
        self.response.narrative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LocalZone;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn compose_copies_clock_fields() {
        let clock = RunClock::at(
            Utc.with_ymd_and_hms(2026, 10, 16, 14, 30, 0)
                .single()
                .expect("valid timestamp"),
            LocalZone::Named(chrono_tz::America::Chicago),
            chrono_tz::US::Eastern,
        );
        let response = ApiResponse::from_value(json!({
            "choices": [{"message": {"content": "Market is bullish today."}}]
        }));

        let record = AnalysisRecord::compose(
            &clock,
            Path::new("sp500_heatmap.png"),
            "prompt text",
            response,
            false,
        );

        assert_eq!(record.timestamp, clock.local);
        assert_eq!(record.date, "2026-10-16");
        assert_eq!(record.day_of_week, "Friday");
        assert_eq!(record.local_time, "09:30:00");
        assert_eq!(record.local_timezone, "America/Chicago");
        assert_eq!(record.est_time, "10:30:00");
        assert_eq!(record.est_timezone, "US/Eastern");
        assert_eq!(record.image_path, "sp500_heatmap.png");
        assert!(!record.previous_analysis_available);
        assert_eq!(record.narrative(), "Market is bullish today.");
    }

    #[test]
    fn record_json_uses_flat_field_names() {
        let clock = RunClock::at(
            Utc.with_ymd_and_hms(2026, 1, 5, 15, 0, 0)
                .single()
                .expect("valid timestamp"),
            LocalZone::Named(chrono_tz::UTC),
            chrono_tz::US::Eastern,
        );
        let record = AnalysisRecord::compose(
            &clock,
            Path::new("map.png"),
            "p",
            ApiResponse::from_value(json!({"result": 1})),
            true,
        );

        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["response"], json!({"result": 1}));
        assert_eq!(value["previous_analysis_available"], json!(true));
        assert_eq!(value["est_time"], json!("10:00:00"));
        assert_eq!(value["timestamp"], json!("2026-01-05T15:00:00Z"));
    }
}
