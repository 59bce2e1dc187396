//! Granularity parsing and inference.

use crate::error::{PadError, Result};
use crate::sequence::{month_index, MonthDay};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Atomic calendar unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeUnit {
    /// Units with a fixed duration, coarsest first.
    const FIXED: [TimeUnit; 5] = [
        TimeUnit::Week,
        TimeUnit::Day,
        TimeUnit::Hour,
        TimeUnit::Minute,
        TimeUnit::Second,
    ];

    const ALL: [TimeUnit; 8] = [
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
        TimeUnit::Week,
        TimeUnit::Month,
        TimeUnit::Quarter,
        TimeUnit::Year,
    ];

    pub fn is_sub_day(self) -> bool {
        matches!(self, TimeUnit::Second | TimeUnit::Minute | TimeUnit::Hour)
    }

    /// Month multiple for calendar units (month, quarter, year).
    pub fn months(self) -> Option<u32> {
        match self {
            TimeUnit::Month => Some(1),
            TimeUnit::Quarter => Some(3),
            TimeUnit::Year => Some(12),
            _ => None,
        }
    }

    /// Exact length in microseconds for fixed-duration units.
    pub fn fixed_micros(self) -> Option<i64> {
        match self {
            TimeUnit::Second => Some(MICROS_PER_SECOND),
            TimeUnit::Minute => Some(60 * MICROS_PER_SECOND),
            TimeUnit::Hour => Some(3_600 * MICROS_PER_SECOND),
            TimeUnit::Day => Some(MICROS_PER_DAY),
            TimeUnit::Week => Some(7 * MICROS_PER_DAY),
            _ => None,
        }
    }

    /// Average length in microseconds, used only to rank units.
    fn nominal_micros(self) -> f64 {
        match self.fixed_micros() {
            Some(micros) => micros as f64,
            None => {
                let months = self.months().unwrap_or(1) as f64;
                months * 30.436_875 * MICROS_PER_DAY as f64
            }
        }
    }

    fn name(self) -> &'static str {
        match self {
            TimeUnit::Second => "sec",
            TimeUnit::Minute => "min",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Quarter => "quarter",
            TimeUnit::Year => "year",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        let word = if word.len() > 1 {
            word.strip_suffix('s').unwrap_or(word)
        } else {
            word
        };
        Some(match word {
            "sec" | "second" => TimeUnit::Second,
            "min" | "minute" => TimeUnit::Minute,
            "hour" => TimeUnit::Hour,
            "day" => TimeUnit::Day,
            "week" => TimeUnit::Week,
            "month" => TimeUnit::Month,
            "quarter" => TimeUnit::Quarter,
            "year" => TimeUnit::Year,
            _ => return None,
        })
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Concrete step size: `count` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Granularity {
    pub unit: TimeUnit,
    pub count: u32,
}

impl Granularity {
    pub fn new(unit: TimeUnit, count: u32) -> Self {
        Self { unit, count }
    }

    pub fn is_calendar(&self) -> bool {
        self.unit.months().is_some()
    }

    /// Step length in microseconds, `None` for calendar units or a step
    /// that does not fit in `i64`.
    pub fn fixed_step_micros(&self) -> Option<i64> {
        self.unit.fixed_micros()?.checked_mul(i64::from(self.count))
    }

    /// Step length in months, `None` for fixed-duration units or a step
    /// that does not fit in `u32`.
    pub fn step_months(&self) -> Option<u32> {
        self.unit.months()?.checked_mul(self.count)
    }

    /// Error for a step too large to lay out a grid with.
    pub(crate) fn too_large(&self) -> PadError {
        PadError::InvalidOption {
            option: "granularity".to_string(),
            value: self.to_string(),
            reason: "step is too large".to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, self.unit)
    }
}

impl FromStr for Granularity {
    type Err = PadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse_error = || PadError::Parse(format!("unrecognized granularity '{}'", s));

        let token = s.trim().to_lowercase();
        let digits_end = token
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(token.len());
        let (digits, word) = token.split_at(digits_end);
        let word = word.trim_start();

        let count = if digits.is_empty() {
            1
        } else {
            digits.parse::<u32>().map_err(|_| parse_error())?
        };
        if count == 0 {
            return Err(parse_error());
        }

        let unit = TimeUnit::from_word(word).ok_or_else(parse_error)?;
        let granularity = Granularity { unit, count };
        if granularity.fixed_step_micros().is_none() && granularity.step_months().is_none() {
            return Err(PadError::Parse(format!("granularity '{}' is too large", s.trim())));
        }
        Ok(granularity)
    }
}

/// User-requested granularity: infer it, or use a fixed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GranularitySpec {
    #[default]
    Auto,
    Fixed(Granularity),
}

impl FromStr for GranularitySpec {
    type Err = PadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(GranularitySpec::Auto)
        } else {
            s.parse().map(GranularitySpec::Fixed)
        }
    }
}

/// Resolve a requested granularity against a group's timestamps.
///
/// `timestamps` is consulted only for [`GranularitySpec::Auto`].
pub fn resolve(requested: GranularitySpec, timestamps: &[NaiveDateTime]) -> Result<Granularity> {
    match requested {
        GranularitySpec::Fixed(granularity) => Ok(granularity),
        GranularitySpec::Auto => {
            let granularity = infer_granularity(timestamps)?;
            tracing::info!(granularity = %granularity, "inferred granularity '{}'", granularity);
            Ok(granularity)
        }
    }
}

/// Infer the dominant spacing of a set of timestamps.
///
/// Takes the mode of the consecutive differences between distinct sorted
/// timestamps (ties resolve to the smaller spacing) and maps it to a unit.
/// Timestamps that share a day of the month (or all fall on month ends) and
/// a time of day are spaced in whole months and map to month, quarter or
/// year. Anything else maps to a fixed unit.
pub fn infer_granularity(timestamps: &[NaiveDateTime]) -> Result<Granularity> {
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    sorted.dedup();

    if sorted.len() < 2 {
        return Err(PadError::Inference {
            distinct: sorted.len(),
        });
    }

    // Series on one day of the month are spaced in whole months
    if MonthDay::of_series(&sorted).is_some() {
        let months = mode(sorted.windows(2).map(|w| month_index(w[1]) - month_index(w[0])));
        return Ok(granularity_from_months(months));
    }

    let micros = mode(sorted.windows(2).map(|w| {
        w[1].signed_duration_since(w[0])
            .num_microseconds()
            .unwrap_or(i64::MAX)
    }));
    Ok(granularity_from_spacing(micros))
}

/// Most common value; the smallest wins ties.
fn mode(diffs: impl Iterator<Item = i64>) -> i64 {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for diff in diffs {
        *counts.entry(diff).or_insert(0) += 1;
    }

    // BTreeMap iterates ascending, so the first maximum wins ties
    let mut mode = 0;
    let mut best = 0;
    for (&diff, &count) in &counts {
        if count > best {
            best = count;
            mode = diff;
        }
    }
    mode
}

/// Coarsest calendar unit that divides a spacing in months.
fn granularity_from_months(months: i64) -> Granularity {
    let months = u32::try_from(months.max(1)).unwrap_or(u32::MAX);
    if months % 12 == 0 {
        Granularity::new(TimeUnit::Year, months / 12)
    } else if months % 3 == 0 {
        Granularity::new(TimeUnit::Quarter, months / 3)
    } else {
        Granularity::new(TimeUnit::Month, months)
    }
}

/// Map a spacing in microseconds to the closest fixed granularity.
fn granularity_from_spacing(micros: i64) -> Granularity {
    if micros > 0 {
        for unit in TimeUnit::FIXED {
            if let Some(len) = unit.fixed_micros() {
                if micros % len == 0 {
                    if let Ok(count) = u32::try_from(micros / len) {
                        return Granularity::new(unit, count);
                    }
                }
            }
        }
    }

    // Below a microsecond the spacing rounds to 0
    let spacing = micros.max(1) as f64;
    let unit = TimeUnit::ALL
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = (spacing / a.nominal_micros()).ln().abs();
            let db = (spacing / b.nominal_micros()).ln().abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(TimeUnit::Second);
    Granularity::new(unit, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(
            "day".parse::<Granularity>().unwrap(),
            Granularity::new(TimeUnit::Day, 1)
        );
        assert_eq!(
            "7 days".parse::<Granularity>().unwrap(),
            Granularity::new(TimeUnit::Day, 7)
        );
        assert_eq!(
            "5 min".parse::<Granularity>().unwrap(),
            Granularity::new(TimeUnit::Minute, 5)
        );
        assert_eq!(
            "15mins".parse::<Granularity>().unwrap(),
            Granularity::new(TimeUnit::Minute, 15)
        );
        assert_eq!(
            " Quarter ".parse::<Granularity>().unwrap(),
            Granularity::new(TimeUnit::Quarter, 1)
        );
        assert_eq!(
            "2 years".parse::<Granularity>().unwrap(),
            Granularity::new(TimeUnit::Year, 2)
        );
        assert_eq!(
            "30 seconds".parse::<Granularity>().unwrap(),
            Granularity::new(TimeUnit::Second, 30)
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        for bad in ["fortnight", "0 days", "", "days 7", "-1 day", "7", "1.5 hours"] {
            let result = bad.parse::<Granularity>();
            assert!(
                matches!(result, Err(PadError::Parse(_))),
                "expected parse error for '{}'",
                bad
            );
        }
    }

    #[test]
    fn test_parse_auto() {
        assert_eq!(
            "auto".parse::<GranularitySpec>().unwrap(),
            GranularitySpec::Auto
        );
        assert_eq!(
            "month".parse::<GranularitySpec>().unwrap(),
            GranularitySpec::Fixed(Granularity::new(TimeUnit::Month, 1))
        );
    }

    #[test]
    fn test_display_roundtrip() {
        let g = Granularity::new(TimeUnit::Hour, 6);
        assert_eq!(g.to_string(), "6 hour");
        assert_eq!(g.to_string().parse::<Granularity>().unwrap(), g);
    }

    #[test]
    fn test_infer_daily() {
        let ts = vec![ymd(2020, 1, 1), ymd(2020, 1, 2), ymd(2020, 1, 5)];
        assert_eq!(
            infer_granularity(&ts).unwrap(),
            Granularity::new(TimeUnit::Day, 1)
        );
    }

    #[test]
    fn test_infer_calendar_units() {
        let months = vec![ymd(2020, 1, 31), ymd(2020, 2, 29), ymd(2020, 3, 31)];
        assert_eq!(
            infer_granularity(&months).unwrap(),
            Granularity::new(TimeUnit::Month, 1)
        );

        let quarters = vec![ymd(2014, 3, 31), ymd(2014, 6, 30), ymd(2014, 12, 31)];
        assert_eq!(
            infer_granularity(&quarters).unwrap(),
            Granularity::new(TimeUnit::Quarter, 1)
        );

        let years = vec![ymd(2019, 1, 1), ymd(2020, 1, 1), ymd(2021, 1, 1)];
        assert_eq!(
            infer_granularity(&years).unwrap(),
            Granularity::new(TimeUnit::Year, 1)
        );
    }

    #[test]
    fn test_infer_weekly_and_multi_unit() {
        let weeks = vec![ymd(2020, 1, 6), ymd(2020, 1, 13), ymd(2020, 1, 20)];
        assert_eq!(
            infer_granularity(&weeks).unwrap(),
            Granularity::new(TimeUnit::Week, 1)
        );

        let base = ymd(2020, 1, 1);
        let five_min: Vec<NaiveDateTime> = (0..4)
            .map(|i| base + chrono::Duration::minutes(5 * i))
            .collect();
        assert_eq!(
            infer_granularity(&five_min).unwrap(),
            Granularity::new(TimeUnit::Minute, 5)
        );
    }

    #[test]
    fn test_infer_ignores_order_and_duplicates() {
        let ts = vec![ymd(2020, 1, 3), ymd(2020, 1, 1), ymd(2020, 1, 2), ymd(2020, 1, 2)];
        assert_eq!(
            infer_granularity(&ts).unwrap(),
            Granularity::new(TimeUnit::Day, 1)
        );
    }

    #[test]
    fn test_infer_needs_two_distinct() {
        assert_eq!(
            infer_granularity(&[ymd(2020, 1, 1), ymd(2020, 1, 1)]),
            Err(PadError::Inference { distinct: 1 })
        );
        assert_eq!(
            infer_granularity(&[]),
            Err(PadError::Inference { distinct: 0 })
        );
    }

    #[test]
    fn test_infer_sub_second_falls_back_to_nearest() {
        let base = ymd(2020, 1, 1);
        let ts: Vec<NaiveDateTime> = (0..3)
            .map(|i| base + chrono::Duration::milliseconds(900 * i))
            .collect();
        assert_eq!(
            infer_granularity(&ts).unwrap(),
            Granularity::new(TimeUnit::Second, 1)
        );
    }

    #[test]
    fn test_infer_sub_microsecond_spacing() {
        let base = ymd(2020, 1, 1);
        let ts: Vec<NaiveDateTime> = [0, 100, 200, 300, 50_000_000]
            .iter()
            .map(|&ns| base + chrono::Duration::nanoseconds(ns))
            .collect();
        let g = infer_granularity(&ts).unwrap();
        assert_eq!(g, Granularity::new(TimeUnit::Second, 1));
        assert!(g.count >= 1);
    }

    #[test]
    fn test_infer_four_weekly_is_not_monthly() {
        let ts = vec![ymd(2020, 1, 6), ymd(2020, 2, 3), ymd(2020, 3, 2), ymd(2020, 3, 30)];
        assert_eq!(
            infer_granularity(&ts).unwrap(),
            Granularity::new(TimeUnit::Week, 4)
        );

        let thirteen_weeks = vec![ymd(2020, 1, 6), ymd(2020, 4, 6), ymd(2020, 7, 6), ymd(2020, 10, 5)];
        assert_eq!(
            infer_granularity(&thirteen_weeks).unwrap(),
            Granularity::new(TimeUnit::Week, 13)
        );
    }

    #[test]
    fn test_infer_monthly_on_clamped_day() {
        // The 30th, clamped to Feb 29
        let ts = vec![ymd(2020, 1, 30), ymd(2020, 2, 29), ymd(2020, 3, 30)];
        assert_eq!(
            infer_granularity(&ts).unwrap(),
            Granularity::new(TimeUnit::Month, 1)
        );
    }

    #[test]
    fn test_infer_gapped_months_by_month_count() {
        // Two 61-day gaps outnumber any single month length in days
        let ts = vec![
            ymd(2019, 3, 31),
            ymd(2019, 5, 31),
            ymd(2019, 7, 31),
            ymd(2019, 8, 31),
            ymd(2019, 9, 30),
        ];
        assert_eq!(
            infer_granularity(&ts).unwrap(),
            Granularity::new(TimeUnit::Month, 1)
        );

        let half_years = vec![ymd(2019, 1, 15), ymd(2019, 7, 15), ymd(2020, 1, 15)];
        assert_eq!(
            infer_granularity(&half_years).unwrap(),
            Granularity::new(TimeUnit::Quarter, 2)
        );
    }

    #[test]
    fn test_parse_rejects_oversized_steps() {
        for bad in ["400000000 years", "4000000000 weeks"] {
            assert!(
                matches!(bad.parse::<Granularity>(), Err(PadError::Parse(_))),
                "expected parse error for '{}'",
                bad
            );
        }
        assert_eq!(Granularity::new(TimeUnit::Year, 400_000_000).step_months(), None);
        assert_eq!(
            "300000000 years".parse::<Granularity>().unwrap().step_months(),
            Some(3_600_000_000)
        );
    }

    #[test]
    fn test_resolve_fixed_ignores_data() {
        let g = Granularity::new(TimeUnit::Hour, 1);
        assert_eq!(resolve(GranularitySpec::Fixed(g), &[]).unwrap(), g);
    }
}
