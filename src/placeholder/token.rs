//! Symbolic date tokens
//!
//! A token is the text between `{{` and `}}` in an oracle-generated query:
//! either one of a fixed set of names relative to the current instant, or
//! a calendar date with a `_start` / `_end` suffix.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use pest::Parser;
use pest_derive::Parser;

use crate::core::errors::PlaceholderError;

#[derive(Parser)]
#[grammar = "placeholder/token.pest"]
struct TokenParser;

/// Named tokens, each a pure function of the current instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedToken {
    YesterdayStart,
    TodayStart,
    Now,
    LastMonthStart,
    LastMonthEnd,
    Last7DaysStart,
}

impl NamedToken {
    pub const ALL: [NamedToken; 6] = [
        NamedToken::YesterdayStart,
        NamedToken::TodayStart,
        NamedToken::Now,
        NamedToken::LastMonthStart,
        NamedToken::LastMonthEnd,
        NamedToken::Last7DaysStart,
    ];

    /// Spelling inside the delimiters
    pub fn name(&self) -> &'static str {
        match self {
            NamedToken::YesterdayStart => "yesterday_start",
            NamedToken::TodayStart => "today_start",
            NamedToken::Now => "now",
            NamedToken::LastMonthStart => "last_month_start",
            NamedToken::LastMonthEnd => "last_month_end",
            NamedToken::Last7DaysStart => "last_7_days_start",
        }
    }

    /// Exact, case-sensitive lookup
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|token| token.name() == name)
    }

    /// The instant this token denotes, relative to `now`
    pub fn instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            NamedToken::Now => now,
            NamedToken::TodayStart => start_of_day(now.date_naive()),
            NamedToken::YesterdayStart => start_of_day((now - Duration::days(1)).date_naive()),
            NamedToken::Last7DaysStart => start_of_day((now - Duration::days(7)).date_naive()),
            NamedToken::LastMonthStart => start_of_day(first_of_previous_month(now.date_naive())),
            NamedToken::LastMonthEnd => {
                start_of_day(first_of_month(now.date_naive())) - Duration::microseconds(1)
            }
        }
    }
}

/// Which end of a calendar day a literal-date token denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBound {
    Start,
    End,
}

/// A recognised token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateToken {
    Named(NamedToken),
    Day { date: NaiveDate, bound: DayBound },
}

impl DateToken {
    /// Parse a complete `{{...}}` string.
    ///
    /// Returns `Ok(None)` for anything that is not a known name or a
    /// `YYYY-MM-DD_start` / `_end` shape. A token with the literal-date shape
    /// naming a day that does not exist is recognised but fails.
    pub fn parse(text: &str) -> Result<Option<Self>, PlaceholderError> {
        let Some(token) = TokenParser::parse(Rule::token, text).ok().and_then(|mut pairs| pairs.next()) else {
            return Ok(None);
        };
        let Some(body) = token.into_inner().next() else {
            return Ok(None);
        };

        match body.as_rule() {
            Rule::named => Ok(NamedToken::from_name(body.as_str()).map(DateToken::Named)),
            Rule::literal_date => {
                let mut parts = body.into_inner();
                let (Some(date), Some(bound)) = (parts.next(), parts.next()) else {
                    return Ok(None);
                };

                let date = NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d")
                    .map_err(|e| PlaceholderError::InvalidDate(text.to_string(), e.to_string()))?;
                let bound = match bound.as_str() {
                    "start" => DayBound::Start,
                    _ => DayBound::End,
                };
                Ok(Some(DateToken::Day { date, bound }))
            }
            _ => Ok(None),
        }
    }

    /// The instant this token denotes, relative to `now`
    pub fn instant(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateToken::Named(named) => named.instant(now),
            DateToken::Day { date, bound: DayBound::Start } => start_of_day(*date),
            DateToken::Day { date, bound: DayBound::End } => {
                start_of_day(*date) + Duration::days(1) - Duration::milliseconds(1)
            }
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

fn first_of_previous_month(date: NaiveDate) -> NaiveDate {
    first_of_month(first_of_month(date) - Duration::days(1))
}

/// Serialize an instant as `YYYY-MM-DDTHH:MM:SS.mmmZ`, truncating below milliseconds
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
