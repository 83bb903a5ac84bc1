//! Sampling frequencies and calendar arithmetic
//!
//! Anchored frequencies (month, quarter and year ends or starts) snap every
//! timestamp to its period anchor, so `2001-01-30` and `2001-01-31` land in
//! the same month-end slot.

use crate::error::{ForecastError, Result};
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    BusinessDaily,
    Weekly,
    MonthEnd,
    MonthStart,
    QuarterEnd,
    QuarterStart,
    YearEnd,
    YearStart,
}

impl Frequency {
    pub const ALL: [Frequency; 9] = [
        Frequency::Daily,
        Frequency::BusinessDaily,
        Frequency::Weekly,
        Frequency::MonthEnd,
        Frequency::MonthStart,
        Frequency::QuarterEnd,
        Frequency::QuarterStart,
        Frequency::YearEnd,
        Frequency::YearStart,
    ];

    /// Canonical code
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Daily => "D",
            Frequency::BusinessDaily => "B",
            Frequency::Weekly => "W",
            Frequency::MonthEnd => "ME",
            Frequency::MonthStart => "MS",
            Frequency::QuarterEnd => "QE",
            Frequency::QuarterStart => "QS",
            Frequency::YearEnd => "YE",
            Frequency::YearStart => "YS",
        }
    }

    /// Number of test slots per series
    pub fn horizon(&self) -> usize {
        match self {
            Frequency::MonthEnd | Frequency::MonthStart => 36,
            Frequency::Daily | Frequency::BusinessDaily => 90,
            Frequency::QuarterEnd | Frequency::QuarterStart => 12,
            _ => 36,
        }
    }

    /// Grid step as a duration label
    pub fn step_label(&self) -> &'static str {
        match self {
            Frequency::Daily | Frequency::BusinessDaily => "1d",
            Frequency::Weekly => "1w",
            Frequency::MonthEnd | Frequency::MonthStart => "1mo",
            Frequency::QuarterEnd | Frequency::QuarterStart => "3mo",
            Frequency::YearEnd | Frequency::YearStart => "1y",
        }
    }

    pub fn is_anchored(&self) -> bool {
        !matches!(
            self,
            Frequency::Daily | Frequency::BusinessDaily | Frequency::Weekly
        )
    }

    /// Period anchor of `date`; unanchored frequencies return it unchanged
    pub fn anchor(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::MonthEnd => month_end(date),
            Frequency::MonthStart => month_start(date),
            Frequency::QuarterEnd => month_end(quarter_start(date) + Months::new(2)),
            Frequency::QuarterStart => quarter_start(date),
            Frequency::YearEnd => NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date),
            Frequency::YearStart => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
            _ => date,
        }
    }

    /// Next grid slot after an on-grid `date`
    pub fn next(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Daily => date + Days::new(1),
            Frequency::BusinessDaily => next_business_day(date),
            Frequency::Weekly => date + Days::new(7),
            Frequency::MonthEnd => month_end(month_start(date) + Months::new(1)),
            Frequency::MonthStart => month_start(date) + Months::new(1),
            Frequency::QuarterEnd => month_end(month_start(date) + Months::new(3)),
            Frequency::QuarterStart => month_start(date) + Months::new(3),
            Frequency::YearEnd => month_end(month_start(date) + Months::new(12)),
            Frequency::YearStart => month_start(date) + Months::new(12),
        }
    }

    /// Whether `date` is a slot of this frequency's grid
    pub fn is_on_grid(&self, date: NaiveDate) -> bool {
        match self {
            Frequency::BusinessDaily => !is_weekend(date),
            Frequency::Daily | Frequency::Weekly => true,
            _ => self.anchor(date) == date,
        }
    }

    /// Inclusive grid from `start` to `end`
    pub fn grid(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut current = self.anchor(start);
        if *self == Frequency::BusinessDaily && is_weekend(current) {
            current = next_business_day(current);
        }
        let end = self.anchor(end);
        let mut slots = Vec::new();
        while current <= end {
            slots.push(current);
            current = self.next(current);
        }
        slots
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let freq = match s.trim() {
            "D" => Frequency::Daily,
            "B" => Frequency::BusinessDaily,
            "W" => Frequency::Weekly,
            "ME" | "M" | "BM" | "BME" | "SM" => Frequency::MonthEnd,
            "MS" => Frequency::MonthStart,
            "QE" | "Q" | "QE-DEC" | "BQ" => Frequency::QuarterEnd,
            "QS" => Frequency::QuarterStart,
            "YE" | "A" | "Y" | "A-DEC" | "YE-DEC" => Frequency::YearEnd,
            "YS" | "AS" => Frequency::YearStart,
            other => return Err(ForecastError::InvalidFrequency(other.to_string())),
        };
        Ok(freq)
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last calendar day of the month of `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    (month_start(date) + Months::new(1))
        .pred_opt()
        .unwrap_or(date)
}

fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Days::new(1);
    while is_weekend(next) {
        next = next + Days::new(1);
    }
    next
}
