//! Day/week/month totals over the session history plus the live session.
//!
//! Everything here is read-only: a [`Report`] borrows the history and the
//! running session and computes on demand, so it is safe to rebuild on every
//! tick. Sessions are attributed to the calendar day their start falls on,
//! in the offset of `now`. Minutes are the floor of the summed seconds.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::timer::{Category, RunningSession, TimeSession};

pub type CategoryMinutes = BTreeMap<Category, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayMinutes {
    pub date: NaiveDate,
    pub minutes: u64,
    pub by_category: CategoryMinutes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub period: Period,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub minutes: u64,
    pub by_category: CategoryMinutes,
    /// Empty for [`Period::Today`].
    pub days: Vec<DayMinutes>,
}

#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    history: &'a [TimeSession],
    running: Option<&'a RunningSession>,
    now: DateTime<FixedOffset>,
}

#[derive(Debug, Default, Clone)]
struct Tally {
    by_category: BTreeMap<Category, i64>,
}

impl Tally {
    fn add(&mut self, category: Category, seconds: i64) {
        *self.by_category.entry(category).or_default() += seconds.max(0);
    }

    fn minutes(&self) -> u64 {
        to_minutes(self.by_category.values().sum())
    }

    fn category_minutes(&self) -> CategoryMinutes {
        Category::ALL
            .iter()
            .map(|c| (*c, to_minutes(self.by_category.get(c).copied().unwrap_or(0))))
            .collect()
    }
}

fn to_minutes(seconds: i64) -> u64 {
    u64::try_from(seconds.max(0) / 60).unwrap_or(0)
}

impl<'a> Report<'a> {
    pub fn new(
        history: &'a [TimeSession],
        running: Option<&'a RunningSession>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            history,
            running,
            now,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Most recent Monday, today included.
    pub fn week_start(&self) -> NaiveDate {
        let today = self.today();
        today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
    }

    pub fn month_start(&self) -> NaiveDate {
        self.today().with_day(1).unwrap_or_else(|| self.today())
    }

    pub fn month_end(&self) -> NaiveDate {
        let start = self.month_start();
        let next = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        };
        next.and_then(|d| d.pred_opt()).unwrap_or(start)
    }

    /// `(local start day, seconds, category)` for every history entry and the live session.
    fn entries(&self) -> impl Iterator<Item = (NaiveDate, i64, Category)> + '_ {
        let offset = *self.now.offset();
        let completed = self.history.iter().map(move |s| {
            (
                s.start_time.with_timezone(&offset).date_naive(),
                s.duration,
                s.category,
            )
        });
        let live = self.running.map(|r| {
            (
                r.start_time.with_timezone(&offset).date_naive(),
                r.live_elapsed(self.now),
                r.category,
            )
        });
        completed.chain(live)
    }

    fn tally(&self, from: NaiveDate, to: NaiveDate) -> Tally {
        let mut tally = Tally::default();
        for (day, seconds, category) in self.entries() {
            if day >= from && day <= to {
                tally.add(category, seconds);
            }
        }
        tally
    }

    fn days(&self, from: NaiveDate, to: NaiveDate) -> Vec<DayMinutes> {
        let mut per_day: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
        for (day, seconds, category) in self.entries() {
            if day >= from && day <= to {
                per_day.entry(day).or_default().add(category, seconds);
            }
        }
        from.iter_days()
            .take_while(|d| *d <= to)
            .map(|date| {
                let tally = per_day.remove(&date).unwrap_or_default();
                DayMinutes {
                    date,
                    minutes: tally.minutes(),
                    by_category: tally.category_minutes(),
                }
            })
            .collect()
    }

    pub fn today_minutes(&self) -> u64 {
        self.tally(self.today(), self.today()).minutes()
    }

    pub fn week_minutes(&self) -> u64 {
        let from = self.week_start();
        self.tally(from, from + Duration::days(6)).minutes()
    }

    pub fn month_minutes(&self) -> u64 {
        self.tally(self.month_start(), self.month_end()).minutes()
    }

    pub fn today_by_category(&self) -> CategoryMinutes {
        self.tally(self.today(), self.today()).category_minutes()
    }

    pub fn week_by_category(&self) -> CategoryMinutes {
        let from = self.week_start();
        self.tally(from, from + Duration::days(6)).category_minutes()
    }

    pub fn month_by_category(&self) -> CategoryMinutes {
        self.tally(self.month_start(), self.month_end())
            .category_minutes()
    }

    /// Seven buckets, index = days since the most recent Monday.
    pub fn week_breakdown(&self) -> Vec<DayMinutes> {
        let from = self.week_start();
        self.days(from, from + Duration::days(6))
    }

    /// One bucket per day of the current month, index = day-of-month - 1.
    pub fn month_breakdown(&self) -> Vec<DayMinutes> {
        self.days(self.month_start(), self.month_end())
    }

    pub fn period(&self, period: Period) -> PeriodReport {
        let (from, to, days) = match period {
            Period::Today => (self.today(), self.today(), Vec::new()),
            Period::Week => {
                let from = self.week_start();
                (from, from + Duration::days(6), self.week_breakdown())
            }
            Period::Month => (self.month_start(), self.month_end(), self.month_breakdown()),
        };
        let tally = self.tally(from, to);
        PeriodReport {
            period,
            from,
            to,
            minutes: tally.minutes(),
            by_category: tally.category_minutes(),
            days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::SessionKind;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn at(d: u32, h: u32, m: u32) -> DateTime<FixedOffset> {
        // June 2025: the 2nd is a Monday.
        Utc.with_ymd_and_hms(2025, 6, d, h, m, 0).unwrap().fixed_offset()
    }

    fn done(start: DateTime<FixedOffset>, minutes: i64, category: Category) -> TimeSession {
        TimeSession {
            id: format!("s-{}", start.timestamp()),
            start_time: start.with_timezone(&Utc),
            end_time: (start + Duration::minutes(minutes)).with_timezone(&Utc),
            duration: minutes * 60,
            category,
        }
    }

    fn history() -> Vec<TimeSession> {
        vec![
            done(at(1, 10, 0), 30, Category::Focus),    // Sunday, previous week
            done(at(2, 9, 0), 25, Category::Focus),     // Monday
            done(at(2, 9, 30), 5, Category::Breaks),    // Monday
            done(at(4, 14, 0), 60, Category::Meetings), // Wednesday
            done(at(5, 8, 0), 50, Category::Focus),     // Thursday (today)
        ]
    }

    #[test]
    fn today_includes_live_session() {
        let history = history();
        let running = RunningSession::begin(SessionKind::Focus, at(5, 11, 0));
        let report = Report::new(&history, Some(&running), at(5, 11, 10));
        assert_eq!(report.today_minutes(), 60);
        assert_eq!(report.today_by_category()[&Category::Focus], 60);
        assert_eq!(report.today_by_category()[&Category::Meetings], 0);
    }

    #[test]
    fn week_buckets_start_on_monday() {
        let history = history();
        let report = Report::new(&history, None, at(5, 12, 0));
        assert_eq!(report.week_start(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());

        let week = report.week_breakdown();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].minutes, 30);
        assert_eq!(week[1].minutes, 0);
        assert_eq!(week[2].minutes, 60);
        assert_eq!(week[3].minutes, 50);
        assert_eq!(report.week_minutes(), 140);
        assert_eq!(report.week_by_category()[&Category::Breaks], 5);
    }

    #[test]
    fn month_buckets_by_day_of_month() {
        let history = history();
        let report = Report::new(&history, None, at(5, 12, 0));
        let month = report.month_breakdown();
        assert_eq!(month.len(), 30);
        assert_eq!(month[0].minutes, 30);
        assert_eq!(month[1].minutes, 30);
        assert_eq!(month[29].date, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert_eq!(report.month_minutes(), 170);
        assert_eq!(report.month_by_category()[&Category::Focus], 105);
    }

    #[test]
    fn sunday_belongs_to_week_started_previous_monday() {
        let history = history();
        let report = Report::new(&history, None, at(8, 12, 0));
        assert_eq!(report.week_start(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        assert_eq!(report.week_minutes(), 140);
    }

    #[test]
    fn december_month_end() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap().fixed_offset();
        let report = Report::new(&[], None, now);
        assert_eq!(report.month_end(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(report.month_breakdown().len(), 31);
    }

    #[test]
    fn minutes_floor_summed_seconds() {
        let mut a = done(at(5, 9, 0), 0, Category::Focus);
        a.duration = 90;
        let mut b = done(at(5, 10, 0), 0, Category::Focus);
        b.duration = 30;
        let history = vec![a, b];
        let report = Report::new(&history, None, at(5, 12, 0));
        assert_eq!(report.today_minutes(), 2);
    }

    #[test]
    fn period_report_today_has_no_days() {
        let history = history();
        let report = Report::new(&history, None, at(5, 12, 0));
        let today = report.period(Period::Today);
        assert_eq!(today.minutes, 50);
        assert!(today.days.is_empty());
        let week = report.period(Period::Week);
        assert_eq!(week.days.len(), 7);
        assert_eq!(week.minutes, report.week_minutes());
    }

    proptest! {
        #[test]
        fn reporting_is_idempotent(durations in proptest::collection::vec(1i64..7200, 0..20), live in 0i64..7200) {
            let history: Vec<TimeSession> = durations
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let mut s = done(at(3, 1, 0) + Duration::minutes(i as i64 * 121), 0, Category::Focus);
                    s.duration = *d;
                    s
                })
                .collect();
            let running = RunningSession::begin(SessionKind::ShortBreak, at(5, 6, 0));
            let now = at(5, 6, 0) + Duration::seconds(live);
            let report = Report::new(&history, Some(&running), now);
            prop_assert_eq!(report.period(Period::Month), report.period(Period::Month));
            prop_assert_eq!(report.week_breakdown(), report.week_breakdown());
            prop_assert_eq!(report.today_minutes(), report.today_minutes());
        }
    }
}
