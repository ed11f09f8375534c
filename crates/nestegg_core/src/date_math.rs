//! Calendar-month arithmetic for the monthly simulation loop.
//!
//! The engine steps one calendar month at a time, so every date it handles is
//! a [`YearMonth`]. Month offsets are computed on a flat month index
//! (`year * 12 + month - 1`) which keeps comparisons and differences O(1)
//! without going through `jiff::Span` normalisation.

use std::fmt;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};

/// A calendar month (`2025-01`). Ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i16,
    /// 1-based month (1 = January)
    pub month: i8,
}

impl YearMonth {
    /// Build a month, clamping `month` into `1..=12`.
    #[must_use]
    pub fn new(year: i16, month: i8) -> Self {
        Self {
            year,
            month: month.clamp(1, 12),
        }
    }

    /// The month containing `date`.
    #[must_use]
    pub fn from_date(date: Date) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// First day of this month.
    #[must_use]
    pub fn first_day(self) -> Date {
        jiff::civil::date(self.year, self.month, 1)
    }

    #[inline]
    fn index(self) -> i32 {
        i32::from(self.year) * 12 + i32::from(self.month) - 1
    }

    #[inline]
    fn from_index(index: i32) -> Self {
        Self {
            year: index.div_euclid(12) as i16,
            month: (index.rem_euclid(12) + 1) as i8,
        }
    }

    /// Add (or subtract, if negative) a number of months.
    #[must_use]
    pub fn add_months(self, months: i32) -> Self {
        Self::from_index(self.index() + months)
    }

    /// The following month.
    #[must_use]
    pub fn next(self) -> Self {
        self.add_months(1)
    }

    /// Signed number of months from `self` to `other` (`other - self`).
    #[must_use]
    pub fn months_until(self, other: YearMonth) -> i32 {
        other.index() - self.index()
    }

    /// True for January, where yearly counters roll over.
    #[must_use]
    pub fn is_year_start(self) -> bool {
        self.month == 1
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl From<Date> for YearMonth {
    fn from(date: Date) -> Self {
        Self::from_date(date)
    }
}

/// Whole years of age at the start of `month` for someone born on `birth_date`.
///
/// A birthday falling inside `month` counts as reached, which matches how
/// age-triggered rules (catch-up contributions, RMDs) are applied per month.
#[must_use]
pub fn age_in_month(birth_date: Date, month: YearMonth) -> u8 {
    let mut age = i32::from(month.year) - i32::from(birth_date.year());
    if month.month < birth_date.month() {
        age -= 1;
    }
    age.clamp(0, i32::from(u8::MAX)) as u8
}

/// Fractional age in years, used by probability models.
#[must_use]
pub fn fractional_age(birth_date: Date, month: YearMonth) -> f64 {
    let born = YearMonth::from_date(birth_date);
    f64::from(born.months_until(month).max(0)) / 12.0
}

/// The month in which someone born on `birth_date` reaches `age`.
#[must_use]
pub fn month_reaching_age(birth_date: Date, age: u8) -> YearMonth {
    YearMonth::from_date(birth_date).add_months(i32::from(age) * 12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::date;

    #[test]
    fn test_add_months_across_year() {
        let m = YearMonth::new(2025, 11);
        assert_eq!(m.add_months(2), YearMonth::new(2026, 1));
        assert_eq!(m.add_months(-11), YearMonth::new(2024, 12));
        assert_eq!(YearMonth::new(2025, 12).next(), YearMonth::new(2026, 1));
    }

    #[test]
    fn test_months_until() {
        let a = YearMonth::new(2025, 1);
        let b = YearMonth::new(2027, 3);
        assert_eq!(a.months_until(b), 26);
        assert_eq!(b.months_until(a), -26);
        assert_eq!(a.months_until(a), 0);
    }

    #[test]
    fn test_ordering_is_chronological() {
        assert!(YearMonth::new(2024, 12) < YearMonth::new(2025, 1));
        assert!(YearMonth::new(2025, 2) > YearMonth::new(2025, 1));
    }

    #[test]
    fn test_age_in_month() {
        let birth = date(1960, 6, 15);
        assert_eq!(age_in_month(birth, YearMonth::new(2025, 5)), 64);
        assert_eq!(age_in_month(birth, YearMonth::new(2025, 6)), 65);
        assert_eq!(age_in_month(birth, YearMonth::new(2025, 12)), 65);
    }

    #[test]
    fn test_month_reaching_age() {
        let birth = date(1952, 3, 10);
        assert_eq!(month_reaching_age(birth, 73), YearMonth::new(2025, 3));
        assert_eq!(age_in_month(birth, month_reaching_age(birth, 73)), 73);
    }

    #[test]
    fn test_display() {
        assert_eq!(YearMonth::new(2025, 3).to_string(), "2025-03");
    }
}
