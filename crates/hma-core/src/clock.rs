use chrono::{DateTime, FixedOffset, Local, Utc};
use chrono_tz::Tz;
use thiserror::Error;

pub const DEFAULT_MARKET_TIMEZONE: &str = "US/Eastern";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("unknown timezone {name}: {reason}")]
    UnknownTimezone { name: String, reason: String },
}

pub fn parse_timezone(name: &str) -> Result<Tz, ClockError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|err| ClockError::UnknownTimezone {
            name: name.to_string(),
            reason: err.to_string(),
        })
}

/// Zone used for the operator-facing "local" fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocalZone {
    #[default]
    System,
    Named(Tz),
}

impl LocalZone {
    pub fn from_name(name: Option<&str>) -> Result<Self, ClockError> {
        match name.map(str::trim).filter(|value| !value.is_empty()) {
            Some(name) => parse_timezone(name).map(LocalZone::Named),
            None => Ok(LocalZone::System),
        }
    }
}

/// One instant rendered in both the local zone and the market zone.
///
/// Captured once per run so the prompt, the persisted record and the email
/// all agree on the same moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunClock {
    pub local: DateTime<FixedOffset>,
    pub local_zone_name: String,
    pub local_zone_label: String,
    pub market: DateTime<FixedOffset>,
    pub market_zone_name: String,
    pub market_zone_label: String,
}

impl RunClock {
    pub fn now(local_zone: LocalZone, market_zone: Tz) -> Self {
        Self::at(Utc::now(), local_zone, market_zone)
    }

    pub fn at(instant: DateTime<Utc>, local_zone: LocalZone, market_zone: Tz) -> Self {
        let (local, local_zone_name, local_zone_label) = match local_zone {
            LocalZone::System => {
                let local = instant.with_timezone(&Local).fixed_offset();
                // The system zone carries no abbreviation, only an offset.
                let offset = local.format("%:z").to_string();
                (local, offset.clone(), offset)
            }
            LocalZone::Named(tz) => {
                let zoned = instant.with_timezone(&tz);
                (
                    zoned.fixed_offset(),
                    tz.name().to_string(),
                    zoned.format("%Z").to_string(),
                )
            }
        };

        let market_zoned = instant.with_timezone(&market_zone);
        Self {
            local,
            local_zone_name,
            local_zone_label,
            market: market_zoned.fixed_offset(),
            market_zone_name: market_zone.name().to_string(),
            market_zone_label: market_zoned.format("%Z").to_string(),
        }
    }

    pub fn date(&self) -> String {
        self.local.format("%Y-%m-%d").to_string()
    }

    pub fn day_of_week(&self) -> String {
        self.local.format("%A").to_string()
    }

    pub fn local_time(&self) -> String {
        self.local.format("%H:%M:%S").to_string()
    }

    pub fn market_time(&self) -> String {
        self.market.format("%H:%M:%S").to_string()
    }

    pub fn local_time_labeled(&self) -> String {
        format!("{} {}", self.local_time(), self.local_zone_label)
    }

    pub fn market_time_labeled(&self) -> String {
        format!("{} {}", self.market_time(), self.market_zone_label)
    }

    /// Compact stamp used for unique identifiers such as mail content ids.
    pub fn compact_stamp(&self) -> String {
        self.local.format("%Y%m%d%H%M%S").to_string()
    }
}
