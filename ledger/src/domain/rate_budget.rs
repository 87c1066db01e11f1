//! Two-window call quota tracked from live server feedback.
//!
//! The API enforces a short (15 minute) and a long (daily) window. Each
//! response reports the limit and usage for both; the budget keeps the most
//! recent report and answers whether one more call would eat into the
//! configured safety cushion of either window.

use std::fmt;

/// A value per rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowPair {
    /// Short (15 minute) window value.
    pub short: u32,
    /// Long (daily) window value.
    pub long: u32,
}

impl WindowPair {
    /// Build a pair from short and long window values.
    pub const fn new(short: u32, long: u32) -> Self {
        Self { short, long }
    }

    const fn is_zero(self) -> bool {
        self.short == 0 && self.long == 0
    }
}

/// Limit and usage as reported on one response. Zeroes mean "not reported".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateReport {
    /// Window limits.
    pub limit: WindowPair,
    /// Calls already used in each window.
    pub usage: WindowPair,
}

/// Identifies one of the two quota windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    /// The 15 minute window.
    Short,
    /// The daily window.
    Long,
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => f.write_str("15-minute"),
            Self::Long => f.write_str("daily"),
        }
    }
}

/// Why the next call is not considered safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhaustion {
    /// Window that would be pushed into its cushion.
    pub window: RateWindow,
    /// Calls used so far in the window.
    pub used: u32,
    /// Window limit.
    pub limit: u32,
    /// Calls held back from the limit.
    pub cushion: u32,
}

impl fmt::Display for BudgetExhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} window near limit ({}/{}, cushion {})",
            self.window, self.used, self.limit, self.cushion
        )
    }
}

/// Point-in-time copy of the budget for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BudgetSnapshot {
    /// Current limits.
    pub limit: WindowPair,
    /// Current usage.
    pub used: WindowPair,
}

impl fmt::Display for BudgetSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "15m {}/{}, day {}/{}",
            self.used.short, self.limit.short, self.used.long, self.limit.long
        )
    }
}

/// Default limits assumed until the server reports its own.
pub const DEFAULT_LIMITS: WindowPair = WindowPair::new(100, 1_000);
/// Default calls held back from each window.
pub const DEFAULT_CUSHIONS: WindowPair = WindowPair::new(10, 10);

/// Process-local quota state owned by one fetch loop.
///
/// # Examples
///
/// ```
/// use ledger::domain::rate_budget::{RateBudget, RateReport, WindowPair};
///
/// let mut budget = RateBudget::new(WindowPair::new(10, 10));
/// assert!(budget.would_exceed_next().is_none());
///
/// budget.update(RateReport {
///     limit: WindowPair::new(100, 1_000),
///     usage: WindowPair::new(90, 120),
/// });
/// assert!(budget.would_exceed_next().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateBudget {
    limit: WindowPair,
    used: WindowPair,
    cushion: WindowPair,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::new(DEFAULT_CUSHIONS)
    }
}

impl RateBudget {
    /// Start from the default limits with no recorded usage.
    pub const fn new(cushion: WindowPair) -> Self {
        Self {
            limit: DEFAULT_LIMITS,
            used: WindowPair::new(0, 0),
            cushion,
        }
    }

    /// Ingest the latest server-reported limits and usage.
    ///
    /// Limits are replaced only when both windows are reported; usage is
    /// replaced when either window is reported.
    pub fn update(&mut self, report: RateReport) {
        if report.limit.short != 0 && report.limit.long != 0 {
            self.limit = report.limit;
        }
        if !report.usage.is_zero() {
            self.used = report.usage;
        }
    }

    /// Return the exhausted window if one more call would breach a cushion.
    ///
    /// The short window is checked first.
    pub fn would_exceed_next(&self) -> Option<BudgetExhaustion> {
        [
            (RateWindow::Short, self.used.short, self.limit.short, self.cushion.short),
            (RateWindow::Long, self.used.long, self.limit.long, self.cushion.long),
        ]
        .into_iter()
        .find(|&(_, used, limit, cushion)| {
            i64::from(used) + 1 > i64::from(limit) - i64::from(cushion)
        })
        .map(|(window, used, limit, cushion)| BudgetExhaustion {
            window,
            used,
            limit,
            cushion,
        })
    }

    /// Copy the current limits and usage.
    pub const fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            limit: self.limit,
            used: self.used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn report(limit: (u32, u32), usage: (u32, u32)) -> RateReport {
        RateReport {
            limit: WindowPair::new(limit.0, limit.1),
            usage: WindowPair::new(usage.0, usage.1),
        }
    }

    #[test]
    fn fresh_budget_allows_calls() {
        assert_eq!(RateBudget::default().would_exceed_next(), None);
    }

    #[rstest]
    #[case::short_at_edge((89, 0), None)]
    #[case::short_breach((90, 0), Some(RateWindow::Short))]
    #[case::long_breach((0, 990), Some(RateWindow::Long))]
    #[case::both_breach_short_first((95, 995), Some(RateWindow::Short))]
    fn compares_each_window_against_cushion(
        #[case] usage: (u32, u32),
        #[case] expected: Option<RateWindow>,
    ) {
        let mut budget = RateBudget::default();
        budget.update(report((100, 1_000), usage));

        let verdict = budget.would_exceed_next().map(|exhaustion| exhaustion.window);
        assert_eq!(verdict, expected);
    }

    #[test]
    fn partial_limit_reports_keep_previous_limits() {
        let mut budget = RateBudget::default();
        budget.update(report((200, 0), (0, 0)));
        assert_eq!(budget.snapshot().limit, DEFAULT_LIMITS);

        budget.update(report((200, 2_000), (0, 0)));
        assert_eq!(budget.snapshot().limit, WindowPair::new(200, 2_000));
    }

    #[test]
    fn usage_updates_when_either_window_reports() {
        let mut budget = RateBudget::default();
        budget.update(report((0, 0), (0, 7)));
        assert_eq!(budget.snapshot().used, WindowPair::new(0, 7));

        budget.update(report((0, 0), (0, 0)));
        assert_eq!(budget.snapshot().used, WindowPair::new(0, 7));
    }

    #[test]
    fn cushion_larger_than_limit_blocks_every_call() {
        let mut budget = RateBudget::new(WindowPair::new(50, 0));
        budget.update(report((20, 1_000), (0, 0)));
        let exhaustion = budget.would_exceed_next().expect("cushion exceeds limit");
        assert_eq!(exhaustion.window, RateWindow::Short);
        assert_eq!(exhaustion.to_string(), "15-minute window near limit (0/20, cushion 50)");
    }

    #[test]
    fn never_reports_safe_when_a_window_would_breach() {
        let cushions = [0_u32, 1, 10, 99];
        for cushion in cushions {
            for used_short in (0..=120).step_by(7) {
                for used_long in (0..=1_100).step_by(53) {
                    let mut budget = RateBudget::new(WindowPair::new(cushion, cushion));
                    budget.update(report((100, 1_000), (used_short, used_long)));
                    let snapshot = budget.snapshot();
                    let breach = |used: u32, limit: u32| {
                        i64::from(used) + 1 > i64::from(limit) - i64::from(cushion)
                    };
                    let should_block = breach(snapshot.used.short, snapshot.limit.short)
                        || breach(snapshot.used.long, snapshot.limit.long);
                    assert_eq!(budget.would_exceed_next().is_some(), should_block);
                }
            }
        }
    }
}
