//! Human readable expiry offsets such as `1w` or `3m`

use std::str::FromStr;

use chrono::{DateTime, Days, Months, Utc};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TimedError {
    #[error("empty time offset")]
    Empty,
    #[error("time offset must look like <number><d|w|m|y>")]
    Format,
    #[error("invalid time unit: {0}")]
    InvalidUnit(String),
    #[error("date out of range")]
    OutOfRange,
    #[error("unknown expiry preset: {0}")]
    UnknownPreset(String),
    #[error("wrong expiry preset '{label}': {source}")]
    WrongPreset {
        label: String,
        #[source]
        source: Box<TimedError>,
    },
}

/// A calendar offset of whole years, months and days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimedOffset {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl FromStr for TimedOffset {
    type Err = TimedError;

    /// Accepts `<n>d`, `<n>w` (seven days), `<n>m` and `<n>y`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimedError::Empty);
        }

        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or(TimedError::Format)?;
        if split == 0 {
            return Err(TimedError::Format);
        }

        let (number, unit) = s.split_at(split);
        let n: u32 = number.parse().map_err(|_| TimedError::Format)?;

        match unit.to_lowercase().as_str() {
            "d" => Ok(Self {
                days: n,
                ..Self::default()
            }),
            "w" => Ok(Self {
                days: n.checked_mul(7).ok_or(TimedError::OutOfRange)?,
                ..Self::default()
            }),
            "m" => Ok(Self {
                months: n,
                ..Self::default()
            }),
            "y" => Ok(Self {
                years: n,
                ..Self::default()
            }),
            other => Err(TimedError::InvalidUnit(other.to_string())),
        }
    }
}

impl TimedOffset {
    /// Add the offset to `date`
    ///
    /// Month arithmetic clamps to the last day of a shorter month.
    pub fn apply(&self, date: DateTime<Utc>) -> Result<DateTime<Utc>, TimedError> {
        let months = self
            .years
            .checked_mul(12)
            .and_then(|m| m.checked_add(self.months))
            .ok_or(TimedError::OutOfRange)?;

        date.checked_add_months(Months::new(months))
            .and_then(|d| d.checked_add_days(Days::new(u64::from(self.days))))
            .ok_or(TimedError::OutOfRange)
    }
}

/// Named expiry offsets offered when granting a dated claim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryPresets {
    presets: Vec<(String, TimedOffset)>,
}

impl ExpiryPresets {
    /// Parse `[label, offset]` pairs, failing on the first malformed offset
    pub fn parse<'a, I>(pairs: I) -> Result<Self, TimedError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut presets = Vec::new();
        for (label, offset) in pairs {
            let parsed = offset.parse().map_err(|e| TimedError::WrongPreset {
                label: label.to_string(),
                source: Box::new(e),
            })?;
            presets.push((label.to_string(), parsed));
        }
        Ok(Self { presets })
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|(label, _)| label.as_str())
    }

    pub fn get(&self, label: &str) -> Option<TimedOffset> {
        self.presets
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, offset)| *offset)
    }

    /// Resolve a preset label, or failing that a literal offset, from `date`
    pub fn expiry_from(
        &self,
        date: DateTime<Utc>,
        label: &str,
    ) -> Result<DateTime<Utc>, TimedError> {
        let offset = match self.get(label) {
            Some(offset) => offset,
            None => label
                .parse()
                .map_err(|_| TimedError::UnknownPreset(label.to_string()))?,
        };
        offset.apply(date)
    }
}
