//! Time periods gating service checks.
//!
//! A period is a set of weekday time ranges minus the periods it excludes.
//! `24X7` is built in. Unknown periods count as active so that a typo in the
//! configuration never hides a service.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::{OffsetDateTime, Weekday};
use tracing::warn;

use crate::errors::EngineError;
use crate::models::TimeperiodName;

pub const ALWAYS_ACTIVE: &str = "24X7";

/// Answers "is this time period active right now?"
pub trait TimeperiodOracle {
    fn is_active(&self, timeperiod: &TimeperiodName) -> bool;
}

impl<F> TimeperiodOracle for F
where
    F: Fn(&str) -> bool,
{
    fn is_active(&self, timeperiod: &TimeperiodName) -> bool {
        self(timeperiod.as_str())
    }
}

/// Range "HH:MM-HH:MM" in minutes since midnight, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::Config(format!("invalid time range '{text}'"));
        let (start, end) = text.split_once('-').ok_or_else(invalid)?;
        let start = parse_clock(start.trim()).ok_or_else(invalid)?;
        let end = parse_clock(end.trim()).ok_or_else(invalid)?;
        if start > end {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, minute_of_day: u16) -> bool {
        self.start <= minute_of_day && minute_of_day < self.end
    }
}

fn parse_clock(text: &str) -> Option<u16> {
    let (hours, minutes) = text.split_once(':')?;
    let hours: u16 = hours.parse().ok()?;
    let minutes: u16 = minutes.parse().ok()?;
    if minutes >= 60 || hours > 24 || (hours == 24 && minutes != 0) {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Configuration of one period, as written in YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeperiodSpec {
    #[serde(default)]
    pub alias: Option<String>,
    /// weekday ("monday".."sunday") -> ranges
    #[serde(default)]
    pub days: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub exclude: Vec<TimeperiodName>,
}

#[derive(Debug, Clone, Default)]
struct Timeperiod {
    days: BTreeMap<u8, Vec<TimeRange>>,
    exclude: Vec<TimeperiodName>,
}

fn weekday_index(name: &str) -> Option<u8> {
    let day = match name.to_ascii_lowercase().as_str() {
        "monday" => Weekday::Monday,
        "tuesday" => Weekday::Tuesday,
        "wednesday" => Weekday::Wednesday,
        "thursday" => Weekday::Thursday,
        "friday" => Weekday::Friday,
        "saturday" => Weekday::Saturday,
        "sunday" => Weekday::Sunday,
        _ => return None,
    };
    Some(day.number_days_from_monday())
}

/// Named periods evaluated against a fixed reference time
#[derive(Debug, Clone)]
pub struct TimeperiodRegistry {
    periods: BTreeMap<TimeperiodName, Timeperiod>,
    now: OffsetDateTime,
}

impl Default for TimeperiodRegistry {
    fn default() -> Self {
        Self {
            periods: BTreeMap::new(),
            now: now_local(),
        }
    }
}

fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

impl TimeperiodRegistry {
    pub fn from_specs(specs: &BTreeMap<TimeperiodName, TimeperiodSpec>) -> Result<Self, EngineError> {
        let mut periods = BTreeMap::new();
        for (name, spec) in specs {
            let mut days: BTreeMap<u8, Vec<TimeRange>> = BTreeMap::new();
            for (day, ranges) in &spec.days {
                let index = weekday_index(day)
                    .ok_or_else(|| EngineError::Config(format!("time period {name}: unknown weekday '{day}'")))?;
                let parsed = ranges
                    .iter()
                    .map(|r| TimeRange::parse(r))
                    .collect::<Result<Vec<_>, _>>()?;
                days.entry(index).or_default().extend(parsed);
            }
            periods.insert(
                name.clone(),
                Timeperiod {
                    days,
                    exclude: spec.exclude.clone(),
                },
            );
        }
        Ok(Self {
            periods,
            now: now_local(),
        })
    }

    /// Fixe l'instant de référence (tests, replays)
    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn is_active_at(&self, name: &TimeperiodName, at: OffsetDateTime) -> bool {
        self.active_inner(name, at, &mut BTreeSet::new())
    }

    /// `path` ne contient que la chaîne d'exclusions en cours : une période
    /// atteinte par deux branches sœurs est évaluée deux fois, seul un cycle
    /// est coupé
    fn active_inner(&self, name: &TimeperiodName, at: OffsetDateTime, path: &mut BTreeSet<TimeperiodName>) -> bool {
        if name.as_str() == ALWAYS_ACTIVE {
            return true;
        }
        let Some(period) = self.periods.get(name) else {
            warn!("[timeperiod] unknown time period {}, treating it as active", name);
            return true;
        };
        if !path.insert(name.clone()) {
            return false;
        }

        let weekday = at.weekday().number_days_from_monday();
        let minute_of_day = u16::from(at.hour()) * 60 + u16::from(at.minute());
        let in_range = period
            .days
            .get(&weekday)
            .is_some_and(|ranges| ranges.iter().any(|r| r.contains(minute_of_day)));

        let active = in_range
            && !period
                .exclude
                .iter()
                .any(|excluded| self.periods.contains_key(excluded) && self.active_inner(excluded, at, path));
        path.remove(name);
        active
    }
}

impl TimeperiodOracle for TimeperiodRegistry {
    fn is_active(&self, timeperiod: &TimeperiodName) -> bool {
        self.is_active_at(timeperiod, self.now)
    }
}
