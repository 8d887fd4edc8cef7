//! Simulation clock.
//!
//! Produces a lazy, restartable sequence of timestamps between two dates at
//! the configured granularity. The clock advances through every generated
//! tick; the consuming loop decides which ticks do real work by checking
//! `is_trading_session`. Daily granularity yields one tick per weekday -
//! there is no holiday calendar, so exchange holidays that fall on weekdays
//! are still generated (see DESIGN.md).

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::backtest::Granularity;
use crate::domain::session;

/// Minutes from the morning open to the afternoon close (09:30-15:00),
/// lunch break included.
const SPAN_MINUTES: i64 = 330;

#[derive(Debug, Clone)]
pub struct SimulationClock {
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
    current_day: NaiveDate,
    /// Minute offset from 09:30 within the current day (intraday only).
    minute_offset: i64,
}

impl SimulationClock {
    pub fn new(start: NaiveDate, end: NaiveDate, granularity: Granularity) -> Self {
        Self {
            start,
            end,
            granularity,
            current_day: start,
            minute_offset: 0,
        }
    }

    /// Rewind to the first tick; the sequence can be replayed.
    pub fn reset(&mut self) {
        self.current_day = self.start;
        self.minute_offset = 0;
    }

    /// Estimated total tick count, for progress reporting only. Weekends
    /// are estimated at 5/7 of calendar days, so the figure is not exact.
    pub fn estimated_steps(&self) -> u64 {
        let days = (self.end - self.start).num_days().max(0) + 1;
        let weekdays = (days * 5 / 7).max(1) as u64;
        match self.granularity.step_minutes() {
            None => weekdays,
            Some(step) => weekdays * (SPAN_MINUTES / step).max(1) as u64,
        }
    }

    /// Whether a tick falls inside a trading session window.
    pub fn is_trading_session(&self, t: DateTime<Utc>) -> bool {
        session::is_trading_time(t)
    }

    /// Next timestamp in the sequence, or `None` when the range is
    /// exhausted.
    pub fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        loop {
            if self.current_day > self.end {
                return None;
            }
            if self.current_day.weekday().num_days_from_monday() >= 5 {
                self.current_day += Duration::days(1);
                self.minute_offset = 0;
                continue;
            }

            match self.granularity.step_minutes() {
                None => {
                    let tick = at_offset(self.current_day, 0);
                    self.current_day += Duration::days(1);
                    return tick;
                }
                Some(step) => {
                    if self.minute_offset >= SPAN_MINUTES {
                        self.current_day += Duration::days(1);
                        self.minute_offset = 0;
                        continue;
                    }
                    let tick = at_offset(self.current_day, self.minute_offset);
                    self.minute_offset += step;
                    return tick;
                }
            }
        }
    }
}

/// Build the tick at 09:30 plus `minutes` on `day`, in exchange-local time.
fn at_offset(day: NaiveDate, minutes: i64) -> Option<DateTime<Utc>> {
    let open = NaiveTime::from_hms_opt(9, 30, 0).expect("static time is valid");
    let naive = day.and_time(open) + Duration::minutes(minutes);
    match session::exchange_offset().from_local_datetime(&naive) {
        chrono::LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn collect_all(clock: &mut SimulationClock) -> Vec<DateTime<Utc>> {
        let mut out = Vec::new();
        while let Some(t) = clock.next_tick() {
            out.push(t);
        }
        out
    }

    #[test]
    fn test_daily_skips_weekends() {
        // 2024-03-01 is a Friday; the range covers one weekend.
        let mut clock = SimulationClock::new(date(2024, 3, 1), date(2024, 3, 5), Granularity::Daily);
        let ticks = collect_all(&mut clock);
        let days: Vec<NaiveDate> = ticks
            .iter()
            .map(|t| session::exchange_local(*t).date_naive())
            .collect();
        assert_eq!(
            days,
            vec![date(2024, 3, 1), date(2024, 3, 4), date(2024, 3, 5)]
        );
    }

    #[test]
    fn test_reset_replays_the_sequence() {
        let mut clock = SimulationClock::new(date(2024, 3, 4), date(2024, 3, 5), Granularity::Daily);
        let first = collect_all(&mut clock);
        assert!(clock.next_tick().is_none());

        clock.reset();
        let second = collect_all(&mut clock);
        assert_eq!(first, second);
    }

    #[test]
    fn test_intraday_tick_count_per_day() {
        // One Monday, 30m steps: 09:30..15:00 => 11 ticks.
        let mut clock = SimulationClock::new(date(2024, 3, 4), date(2024, 3, 4), Granularity::M30);
        let ticks = collect_all(&mut clock);
        assert_eq!(ticks.len(), 11);

        // Lunch-break ticks exist but are not sessions.
        let sessions = ticks
            .iter()
            .filter(|t| session::is_trading_time(**t))
            .count();
        assert_eq!(sessions, 8);
    }

    #[test]
    fn test_estimated_steps_is_close_for_daily() {
        let clock = SimulationClock::new(date(2024, 3, 1), date(2024, 3, 31), Granularity::Daily);
        let estimate = clock.estimated_steps();
        let mut exact = clock.clone();
        let actual = collect_all(&mut exact).len() as u64;
        // The 5/7 heuristic lands within a couple of days of the truth.
        assert!(estimate.abs_diff(actual) <= 2, "estimate {estimate} vs actual {actual}");
    }
}
