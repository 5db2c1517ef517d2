//! Reading analytics engine.
//!
//! Pure functions over the book list. Every metric is built on the same
//! notion of coverage: a Completed book covers the calendar days from its
//! start date to its completion date, a Reading book covers start date
//! through today, and every other status contributes nothing. Books with
//! missing or unparsable dates, or with an inverted range, are skipped.
//!
//! Each public metric has an `_on` variant taking an explicit `today`;
//! the plain variants use the local wall-clock date.

use crate::model::{Book, ReadingStatus};
use crate::validate::rules::parse_date;
use chrono::{Datelike as _, Days, Local, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

/// Safety brake against wild date ranges (say, 1970 through 2050): no
/// single book expands to more than this many covered days.
const MAX_COVERED_DAYS_PER_BOOK: usize = 5000;

#[non_exhaustive]
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StreakMetrics {
    pub longest_streak: u32,
    pub current_streak: u32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLabel {
    #[serde(rename = "Highly Consistent")]
    HighlyConsistent,
    #[serde(rename = "Building Momentum")]
    BuildingMomentum,
    #[serde(rename = "Needs Discipline")]
    NeedsDiscipline,
}

#[non_exhaustive]
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyMetric {
    pub score: u32,
    pub label: ConsistencyLabel,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[non_exhaustive]
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MomentumMetric {
    pub current_month_count: usize,
    pub previous_month_count: usize,
    /// Month-over-month percent difference. Capped at +100 when the
    /// previous month had no activity at all: a "new activity" signal,
    /// not literal infinity.
    pub diff: i32,
    pub trend: Trend,
}

fn coverage_interval(book: &Book, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = parse_date(book.start_date.as_deref()?)?;
    let end = match book.status {
        ReadingStatus::Completed => parse_date(book.completion_date.as_deref()?)?,
        ReadingStatus::Reading => today,
        _ => return None,
    };

    (start <= end).then_some((start, end))
}

/// The union of every book's coverage interval as a set of calendar days.
/// `clamp_start` trims each interval before expansion, so that the per-book
/// day cap cannot eat days a caller actually cares about.
fn covered_days(
    books: &[Book],
    today: NaiveDate,
    clamp_start: Option<NaiveDate>,
) -> BTreeSet<NaiveDate> {
    let mut days = BTreeSet::new();
    for book in books {
        if let Some((start, end)) = coverage_interval(book, today) {
            let start = clamp_start.map_or(start, |clamp| start.max(clamp));
            for day in start.iter_days().take(MAX_COVERED_DAYS_PER_BOOK) {
                if day > end {
                    break;
                }
                days.insert(day);
            }
        }
    }

    days
}

/// Longest and current runs of consecutive covered days.
///
/// The current streak counts backward from today and is zero whenever
/// today itself is not covered. A book in Reading status covers today by
/// construction, so a zero current streak means nothing is actively being
/// read and no Completed book finished today.
#[must_use]
#[inline]
pub fn reading_streak(books: &[Book]) -> StreakMetrics {
    reading_streak_on(books, Local::now().date_naive())
}

#[must_use]
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Large function, called rarely"
)]
pub fn reading_streak_on(books: &[Book], today: NaiveDate) -> StreakMetrics {
    let days = covered_days(books, today, None);
    if days.is_empty() {
        return StreakMetrics::default();
    }

    let mut longest: u32 = 0;
    let mut run: u32 = 0;
    let mut previous: Option<NaiveDate> = None;
    for &day in &days {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(day) => run.saturating_add(1),
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    let mut current: u32 = 0;
    if days.contains(&today) {
        current = 1;
        let mut cursor = today;
        while let Some(day_before) = cursor.pred_opt() {
            if !days.contains(&day_before) {
                break;
            }
            current = current.saturating_add(1);
            cursor = day_before;
        }
    }

    StreakMetrics {
        longest_streak: longest,
        current_streak: current,
    }
}

/// Share of the trailing 90 days (ending today, inclusive) with reading
/// activity, as a 0..=100 score with a coarse label.
#[must_use]
#[inline]
pub fn reading_consistency(books: &[Book]) -> ConsistencyMetric {
    reading_consistency_on(books, Local::now().date_naive())
}

#[must_use]
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Large function, called rarely"
)]
pub fn reading_consistency_on(books: &[Book], today: NaiveDate) -> ConsistencyMetric {
    let fallback = ConsistencyMetric {
        score: 0,
        label: ConsistencyLabel::NeedsDiscipline,
    };

    let Some(window_start) = today.checked_sub_days(Days::new(89)) else {
        return fallback;
    };

    let days = covered_days(books, today, Some(window_start));
    let covered_in_window = days.range(window_start..=today).count();

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "Window is at most 90 days"
    )]
    let score = ((covered_in_window as f64 / 90.0) * 100.0).round().min(100.0) as u32;

    let label = if score >= 80 {
        ConsistencyLabel::HighlyConsistent
    } else if score >= 50 {
        ConsistencyLabel::BuildingMomentum
    } else {
        ConsistencyLabel::NeedsDiscipline
    };

    ConsistencyMetric { score, label }
}

/// Distinct covered days in the current calendar month against the
/// previous one, with the percent difference and a trend tag.
#[must_use]
#[inline]
pub fn monthly_momentum(books: &[Book]) -> MomentumMetric {
    monthly_momentum_on(books, Local::now().date_naive())
}

#[must_use]
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Large function, called rarely"
)]
pub fn monthly_momentum_on(books: &[Book], today: NaiveDate) -> MomentumMetric {
    let flat = MomentumMetric {
        current_month_count: 0,
        previous_month_count: 0,
        diff: 0,
        trend: Trend::Flat,
    };

    // Last day of the previous month; handles the January rollover.
    let Some(end_of_previous) = today.with_day(1).and_then(|first| first.pred_opt()) else {
        return flat;
    };
    let Some(start_of_previous) = end_of_previous.with_day(1) else {
        return flat;
    };

    // Only the two months in play matter, so clamping here also keeps the
    // per-book day cap away from a years-old start date.
    let days = covered_days(books, today, Some(start_of_previous));
    let in_month = |day: &NaiveDate, reference: NaiveDate| {
        day.month() == reference.month() && day.year() == reference.year()
    };
    let current_month_count = days.iter().filter(|day| in_month(day, today)).count();
    let previous_month_count = days
        .iter()
        .filter(|day| in_month(day, end_of_previous))
        .count();

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        reason = "Day counts are tiny"
    )]
    let diff = if previous_month_count > 0 {
        let change = current_month_count as f64 - previous_month_count as f64;
        (change / previous_month_count as f64 * 100.0).round() as i32
    } else if current_month_count > 0 {
        100
    } else {
        0
    };

    let trend = if diff > 0 {
        Trend::Up
    } else if diff < 0 {
        Trend::Down
    } else {
        Trend::Flat
    };

    MomentumMetric {
        current_month_count,
        previous_month_count,
        diff,
        trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn completed(start: &str, end: &str) -> Book {
        Book {
            id: String::from("b"),
            status: ReadingStatus::Completed,
            start_date: Some(String::from(start)),
            completion_date: Some(String::from(end)),
            ..Book::default()
        }
    }

    fn reading(start: &str) -> Book {
        Book {
            id: String::from("b"),
            status: ReadingStatus::Reading,
            start_date: Some(String::from(start)),
            ..Book::default()
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn streaks_over_two_separate_runs() {
        let books = vec![
            completed("2026-01-01", "2026-01-03"),
            completed("2026-01-05", "2026-01-06"),
        ];

        let metrics = reading_streak_on(&books, day(2026, 1, 6));
        assert_eq!(metrics.longest_streak, 3);
        assert_eq!(metrics.current_streak, 2);
    }

    #[test]
    fn current_streak_is_zero_when_today_is_uncovered() {
        let books = vec![completed("2026-01-01", "2026-01-05")];

        let metrics = reading_streak_on(&books, day(2026, 1, 6));
        assert_eq!(metrics.longest_streak, 5);
        assert_eq!(metrics.current_streak, 0);
    }

    #[test]
    fn reading_book_always_covers_today() {
        let books = vec![reading("2026-01-04")];

        let metrics = reading_streak_on(&books, day(2026, 1, 6));
        assert_eq!(metrics.current_streak, 3);
    }

    #[test]
    fn inverted_and_unparsable_ranges_are_skipped() {
        let books = vec![
            completed("2026-01-10", "2026-01-02"),
            completed("nonsense", "2026-01-02"),
            Book {
                status: ReadingStatus::ToRead,
                start_date: Some(String::from("2026-01-01")),
                ..Book::default()
            },
        ];

        let metrics = reading_streak_on(&books, day(2026, 1, 6));
        assert_eq!(metrics, StreakMetrics::default());
    }

    #[test]
    fn consistency_hits_the_label_thresholds() {
        let today = day(2026, 3, 31);

        // Exactly 45 covered days inside the 90-day window.
        let books = vec![completed("2026-02-15", "2026-03-31")];
        let metric = reading_consistency_on(&books, today);
        assert_eq!(metric.score, 50);
        assert_eq!(metric.label, ConsistencyLabel::BuildingMomentum);

        let everything = vec![completed("2025-12-01", "2026-03-31")];
        let metric = reading_consistency_on(&everything, today);
        assert_eq!(metric.score, 100);
        assert_eq!(metric.label, ConsistencyLabel::HighlyConsistent);

        let sparse = vec![completed("2026-03-30", "2026-03-31")];
        let metric = reading_consistency_on(&sparse, today);
        assert_eq!(metric.score, 2);
        assert_eq!(metric.label, ConsistencyLabel::NeedsDiscipline);
    }

    #[test]
    fn consistency_ignores_days_outside_the_window() {
        let today = day(2026, 3, 31);
        // All coverage predates the window start (2026-01-01).
        let books = vec![completed("2025-11-01", "2025-12-15")];

        let metric = reading_consistency_on(&books, today);
        assert_eq!(metric.score, 0);
    }

    #[test]
    fn momentum_reports_new_activity_as_plus_hundred() {
        let today = day(2026, 3, 20);
        let books = vec![completed("2026-03-01", "2026-03-10")];

        let metric = monthly_momentum_on(&books, today);
        assert_eq!(metric.current_month_count, 10);
        assert_eq!(metric.previous_month_count, 0);
        assert_eq!(metric.diff, 100);
        assert_eq!(metric.trend, Trend::Up);
    }

    #[test]
    fn momentum_reports_slowdowns_as_negative() {
        let today = day(2026, 3, 20);
        let books = vec![
            completed("2026-02-01", "2026-02-10"),
            completed("2026-03-01", "2026-03-05"),
        ];

        let metric = monthly_momentum_on(&books, today);
        assert_eq!(metric.current_month_count, 5);
        assert_eq!(metric.previous_month_count, 10);
        assert_eq!(metric.diff, -50);
        assert_eq!(metric.trend, Trend::Down);
    }

    #[test]
    fn momentum_counts_a_book_in_progress_for_years() {
        let today = day(2026, 3, 20);
        // Started far enough back that expanding from the start date would
        // overrun the per-book day cap before reaching this year.
        let books = vec![reading("2010-01-01")];

        let metric = monthly_momentum_on(&books, today);
        assert_eq!(metric.current_month_count, 20);
        assert_eq!(metric.previous_month_count, 28);
    }

    #[test]
    fn momentum_handles_the_january_rollover() {
        let today = day(2026, 1, 15);
        let books = vec![completed("2025-12-28", "2026-01-03")];

        let metric = monthly_momentum_on(&books, today);
        assert_eq!(metric.current_month_count, 3);
        assert_eq!(metric.previous_month_count, 4);
    }

    #[test]
    fn empty_input_yields_zeroed_metrics() {
        let today = day(2026, 1, 6);

        assert_eq!(reading_streak_on(&[], today), StreakMetrics::default());
        assert_eq!(reading_consistency_on(&[], today).score, 0);
        let momentum = monthly_momentum_on(&[], today);
        assert_eq!(momentum.diff, 0);
        assert_eq!(momentum.trend, Trend::Flat);
    }
}
