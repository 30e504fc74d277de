//! Date-range clamping for insight queries.
//!
//! The API rejects ranges reaching more than 37 months back or into the
//! future. [`clamp_date_range`] pulls a requested range inside those limits
//! and reports every adjustment it made.

use chrono::{Months, NaiveDate};

/// Furthest the API looks back, in months from today.
pub const MAX_LOOKBACK_MONTHS: u32 = 37;

/// Which end of the range was adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    From,
    To,
}

impl std::fmt::Display for RangeBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RangeBound::From => "from",
            RangeBound::To => "to",
        })
    }
}

/// One adjustment made while clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateAdjustment {
    pub bound: RangeBound,
    pub original: NaiveDate,
    pub adjusted: NaiveDate,
    pub reason: &'static str,
}

/// A range guaranteed to satisfy `from <= to <= today`.
///
/// `from` is also at or after the lookback limit, except when the requested
/// end already lies before it: the range then collapses to `from == to`.
/// The API answers such a range with no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClampedRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub adjustments: Vec<DateAdjustment>,
}

impl ClampedRange {
    pub fn was_adjusted(&self) -> bool {
        !self.adjustments.is_empty()
    }
}

/// Earliest date the API accepts relative to `today`.
pub fn earliest_allowed(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_months(Months::new(MAX_LOOKBACK_MONTHS))
        .unwrap_or(NaiveDate::MIN)
}

/// Clamp `[from, to]` into the range the API accepts.
///
/// `from` is raised to the lookback limit and lowered to `today`; `to` is
/// lowered to `today`; if `from` still lies after `to`, it becomes `to`.
pub fn clamp_date_range(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> ClampedRange {
    let earliest = earliest_allowed(today);
    let mut adjustments = Vec::new();
    let mut adjust = |bound: RangeBound,
                      original: NaiveDate,
                      adjusted: NaiveDate,
                      reason: &'static str| {
        tracing::info!(
            bound = %bound,
            original = %original,
            adjusted = %adjusted,
            reason,
            "Adjusted insights date range"
        );
        adjustments.push(DateAdjustment {
            bound,
            original,
            adjusted,
            reason,
        });
        adjusted
    };

    let mut from_clamped = from;
    if from_clamped < earliest {
        from_clamped = adjust(
            RangeBound::From,
            from_clamped,
            earliest,
            "start is more than 37 months in the past",
        );
    }
    if from_clamped > today {
        from_clamped = adjust(RangeBound::From, from_clamped, today, "start is in the future");
    }

    let mut to_clamped = to;
    if to_clamped > today {
        to_clamped = adjust(RangeBound::To, to_clamped, today, "end is in the future");
    }

    if from_clamped > to_clamped {
        from_clamped = adjust(
            RangeBound::From,
            from_clamped,
            to_clamped,
            "start is after end",
        );
    }

    ClampedRange {
        from: from_clamped,
        to: to_clamped,
        adjustments,
    }
}
