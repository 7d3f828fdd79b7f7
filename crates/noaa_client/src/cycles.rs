//! Model-cycle candidate search.
//!
//! Both functions are pure: given "now" and the time a forecast slice should
//! be valid for, list the (cycle, forecast hour) pairs to try, best first.

use chrono::{DateTime, Duration, DurationRound, NaiveTime, TimeZone, Utc};

/// One model run and the forecast-hour offset into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub cycle_time: DateTime<Utc>,
    pub forecast_hour: u32,
}

impl Candidate {
    pub fn valid_time(&self) -> DateTime<Utc> {
        self.cycle_time + Duration::hours(self.forecast_hour as i64)
    }
}

fn hours_between(target: DateTime<Utc>, cycle: DateTime<Utc>) -> f64 {
    (target - cycle).num_seconds() as f64 / 3600.0
}

fn in_horizon(fh: f64, max_fh: i64) -> Option<u32> {
    if fh < 0.0 || fh > max_fh as f64 {
        None
    } else {
        Some(fh as u32)
    }
}

/// Hourly-cycle source (HRRR): newest cycle at or before `now`, stepping
/// back one hour at a time, `max_back` cycles in total. The forecast hour is
/// the whole number of hours from the cycle to `target`, rounded down.
pub fn wind_candidates(
    now: DateTime<Utc>,
    target: DateTime<Utc>,
    max_back: u32,
    max_fh: i64,
) -> Vec<Candidate> {
    let latest = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
    (0..max_back as i64)
        .filter_map(|back| {
            let cycle_time = latest - Duration::hours(back);
            let fh = hours_between(target, cycle_time).floor();
            in_horizon(fh, max_fh).map(|forecast_hour| Candidate {
                cycle_time,
                forecast_hour,
            })
        })
        .collect()
}

/// Fixed-cycle source (SFBOFS): for the target's day and `days_back - 1`
/// days before it, each cycle hour newest first. Cycles after `now` are
/// skipped; the forecast hour is rounded to the nearest hour.
pub fn current_candidates(
    now: DateTime<Utc>,
    target: DateTime<Utc>,
    days_back: u32,
    cycles: &[u32],
    max_fh: i64,
) -> Vec<Candidate> {
    let mut hours: Vec<u32> = cycles.iter().copied().filter(|h| *h < 24).collect();
    hours.sort_unstable_by(|a, b| b.cmp(a));
    hours.dedup();

    let mut out = Vec::new();
    for day in 0..days_back as i64 {
        let date = (target - Duration::days(day)).date_naive();
        for &hour in &hours {
            let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) else {
                continue;
            };
            let cycle_time = Utc.from_utc_datetime(&date.and_time(time));
            if cycle_time > now {
                continue;
            }
            let fh = hours_between(target, cycle_time).round();
            if let Some(forecast_hour) = in_horizon(fh, max_fh) {
                out.push(Candidate {
                    cycle_time,
                    forecast_hour,
                });
            }
        }
    }
    out
}
