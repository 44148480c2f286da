//! Schedule evaluation.
//!
//! A job fires either once at an absolute instant or on a cron recurrence.
//! Evaluation is a pure function of `(schedule, after)` so the state machine
//! never depends on the cron backend directly.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::CadenceError;

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Single absolute timestamp (one-time job).
    Once { at: DateTime<Utc> },

    /// Cron recurrence. Standard 5-field expressions are accepted with crontab
    /// weekday numbering and get a `0` seconds field prepended; 6/7-field
    /// expressions pass through in the cron crate's own dialect.
    Cron { expr: String },
}

impl Schedule {
    pub fn once(at: DateTime<Utc>) -> Self {
        Self::Once { at }
    }

    pub fn cron(expr: impl Into<String>) -> Self {
        Self::Cron { expr: expr.into() }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Cron { .. })
    }

    /// Reject expressions the cron backend cannot parse.
    pub fn validate(&self) -> Result<(), CadenceError> {
        match self {
            Self::Once { .. } => Ok(()),
            Self::Cron { expr } => parse_cron(expr).map(|_| ()),
        }
    }

    /// First eligible run for a freshly created (or rescheduled) job.
    ///
    /// A one-time job whose instant already passed is due immediately.
    pub fn first_run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CadenceError> {
        match self {
            Self::Once { at } => Ok(Some(*at)),
            Self::Cron { expr } => Ok(parse_cron(expr)?.after(&now).next()),
        }
    }

    /// Next firing strictly after `after`. `None` when the schedule is exhausted
    /// (always the case for a one-time job).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Once { .. } => None,
            Self::Cron { expr } => parse_cron(expr).ok()?.after(&after).next(),
        }
    }
}

fn parse_cron(expr: &str) -> Result<cron::Schedule, CadenceError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, day, month, weekday] => {
            let weekday = crontab_weekdays(weekday)
                .ok_or_else(|| CadenceError::InvalidSchedule(format!("{expr}: bad weekday")))?;
            format!("0 {minute} {hour} {day} {month} {weekday}")
        }
        _ => fields.join(" "),
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| CadenceError::InvalidSchedule(format!("{expr}: {e}")))
}

/// Crontab weekdays (0-7, 0 and 7 = Sunday) to the cron crate's 1-7 with
/// 1 = Sunday. Names and `*` pass through.
fn crontab_weekdays(field: &str) -> Option<String> {
    fn day(n: u8) -> u8 {
        n % 7 + 1
    }
    fn number(s: &str) -> Option<Option<u8>> {
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Some(None);
        }
        match s.parse::<u8>() {
            Ok(n) if n <= 7 => Some(Some(n)),
            _ => None,
        }
    }

    let mut items = Vec::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };
        let converted = match base.split_once('-') {
            Some((from, to)) => match (number(from)?, number(to)?) {
                (Some(0), Some(7)) => "1-7".to_string(),
                // 7 ends the week, so the range wraps onto Sunday
                (Some(from), Some(7)) if step.is_none() => format!("{}-7,1", day(from)),
                (Some(_), Some(7)) => return None,
                (Some(from), Some(to)) => format!("{}-{}", day(from), day(to)),
                (None, None) => base.to_string(),
                _ => return None,
            },
            None => match number(base)? {
                Some(n) => day(n).to_string(),
                None => base.to_string(),
            },
        };
        items.push(match step {
            Some(step) => format!("{converted}/{step}"),
            None => converted,
        });
    }
    Some(items.join(","))
}
