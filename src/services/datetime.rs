//! Natural-language date/time extraction.
//!
//! The extractor turns free text such as `"amanhã às 9h"` or
//! `"next month day 24 at 14:00"` into an absolute instant in the operational
//! timezone. Date cues are ranked (absolute date, relative day, weekday,
//! relative offset); the highest-ranked cue present decides the calendar day.
//! A clock time is mandatory.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use regex::{Captures, Regex};

/// What a weekday name resolves to when it names the reference day itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WeekdayRollover {
    /// "monday" said on a Monday means the following Monday.
    #[default]
    NextWeek,
    /// "monday" said on a Monday means today.
    SameDay,
}

/// How hour values above 23 ("25h") are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HourOverflow {
    #[default]
    Wrap,
    Reject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub instant: DateTime<FixedOffset>,
    /// Byte ranges of every date and time cue that was recognized.
    pub spans: Vec<Range<usize>>,
}

pub trait DateTimeExtractor: Send + Sync {
    fn extract(&self, text: &str, reference: DateTime<Utc>, tz: Tz) -> Option<Extraction>;

    /// Byte ranges of the date cues alone, found whether or not the text
    /// also names a time.
    fn date_spans(&self, text: &str) -> Vec<Range<usize>>;
}

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());
static BR_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}))?\b").unwrap());
static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(day after tomorrow|depois de amanh[ãa]|today|tomorrow|hoje|amanh[ãa])\b")
        .unwrap()
});
static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:next|this|on|pr[óo]xim[ao]|nest[ae]|na|no)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday|segunda|ter[çc]a|quarta|quinta|sexta|s[áa]bado|domingo)(?:-feira)?\b",
    )
    .unwrap()
});
static IN_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|em|daqui\s+a)\s+(\d{1,3})\s+(?:days?|dias?)\b").unwrap()
});
static NEXT_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:next\s+month|pr[óo]ximo\s+m[êe]s|m[êe]s\s+que\s+vem)\b").unwrap()
});
static NEXT_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:next\s+year|pr[óo]ximo\s+ano|ano\s+que\s+vem)\b").unwrap()
});
static DAY_OF_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:on\s+)?(?:the\s+)?(?:day|dia)\s+(\d{1,2})\b").unwrap()
});

// Time forms, tried in order against the text with date cues masked out.
static TIME_AMPM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:at|[àa]s)\s+)?\b(\d{1,2})(?::(\d{2}))?\s?([ap])\.?m\b\.?").unwrap()
});
static TIME_COLON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:at|[àa]s)\s+)?\b(\d{1,2}):(\d{2})\b").unwrap()
});
static TIME_H_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:at|[àa]s)\s+)?\b(\d{1,2})\s?h\s?(\d{2})\b").unwrap()
});
static TIME_H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:at|[àa]s)\s+)?\b(\d{1,2})\s?(?:h|hs|hrs?|horas?|hours?|o'?clock)\b")
        .unwrap()
});
static TIME_AT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:at|[àa]s)\s+(\d{1,2})\b").unwrap());
static TIME_BARE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,2})\b").unwrap());

#[derive(Debug, Clone, Copy)]
enum DateCue {
    Absolute(Option<NaiveDate>),
    /// `DD/MM` without a year.
    DayMonth(u32, u32),
    RelativeDay(u64),
    Weekday(Weekday),
    InDays(u64),
    NextMonth,
    NextYear,
    DayOfMonth(u32),
}

/// Regex-driven extractor for Portuguese and English phrasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexExtractor {
    pub weekday_rollover: WeekdayRollover,
    pub hour_overflow: HourOverflow,
}

impl RegexExtractor {
    pub fn new(weekday_rollover: WeekdayRollover, hour_overflow: HourOverflow) -> Self {
        Self {
            weekday_rollover,
            hour_overflow,
        }
    }

    fn resolve_date(&self, cues: &[(DateCue, Range<usize>)], today: NaiveDate) -> Option<NaiveDate> {
        let mut absolute = None;
        let mut relative_day = None;
        let mut weekday = None;
        let mut in_days = None;
        let mut day_of_month = None;
        let mut next_month = false;
        let mut next_year = false;

        // Cues are in text order; the first cue of each kind counts.
        for (cue, _) in cues {
            match *cue {
                DateCue::Absolute(date) => {
                    absolute.get_or_insert(date);
                }
                DateCue::DayMonth(day, month) => {
                    absolute.get_or_insert_with(|| upcoming_day_month(today, day, month));
                }
                DateCue::RelativeDay(n) => {
                    relative_day.get_or_insert(n);
                }
                DateCue::Weekday(day) => {
                    weekday.get_or_insert(day);
                }
                DateCue::InDays(n) => {
                    in_days.get_or_insert(n);
                }
                DateCue::DayOfMonth(d) => {
                    day_of_month.get_or_insert(d);
                }
                DateCue::NextMonth => next_month = true,
                DateCue::NextYear => next_year = true,
            }
        }

        if let Some(date) = absolute {
            return date;
        }
        if let Some(n) = relative_day {
            return today.checked_add_days(Days::new(n));
        }
        if let Some(day) = weekday {
            return Some(self.next_weekday(today, day));
        }
        if let Some(n) = in_days {
            return today.checked_add_days(Days::new(n));
        }

        let months_ahead = if next_month {
            1
        } else if next_year {
            12
        } else {
            0
        };
        if months_ahead > 0 {
            let base = today.checked_add_months(Months::new(months_ahead))?;
            return match day_of_month {
                Some(d) => base.with_day(d),
                None => Some(base),
            };
        }

        match day_of_month {
            Some(d) if d >= today.day() => today.with_day(d),
            Some(d) => today
                .with_day(1)?
                .checked_add_months(Months::new(1))?
                .with_day(d),
            None => Some(today),
        }
    }

    fn next_weekday(&self, today: NaiveDate, target: Weekday) -> NaiveDate {
        let mut ahead = (target.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
        if ahead == 0 && self.weekday_rollover == WeekdayRollover::NextWeek {
            ahead = 7;
        }
        today + Days::new(ahead as u64)
    }

    fn find_time(&self, masked: &str) -> Option<(NaiveTime, Range<usize>)> {
        if let Some(caps) = TIME_AMPM.captures(masked) {
            let (hour, minute) = hour_minute(&caps)?;
            let pm = caps[3].eq_ignore_ascii_case("p");
            let hour = match (hour, pm) {
                (12, false) => 0,
                (h, true) if h < 12 => h + 12,
                (h, _) => h,
            };
            return self.clock(hour, minute, whole(&caps));
        }

        for re in [&*TIME_COLON, &*TIME_H_MINUTES, &*TIME_H, &*TIME_AT] {
            if let Some(caps) = re.captures(masked) {
                let (hour, minute) = hour_minute(&caps)?;
                return self.clock(hour, minute, whole(&caps));
            }
        }

        // A bare number glued to a date separator is part of a date, never an hour.
        let caps = TIME_BARE
            .captures_iter(masked)
            .find(|caps| !touches_date_separator(masked, &whole(caps)))?;
        let (hour, minute) = hour_minute(&caps)?;
        self.clock(hour, minute, whole(&caps))
    }

    fn clock(&self, hour: u32, minute: u32, span: Range<usize>) -> Option<(NaiveTime, Range<usize>)> {
        if minute > 59 {
            return None;
        }
        let hour = match self.hour_overflow {
            HourOverflow::Wrap => hour % 24,
            HourOverflow::Reject if hour > 23 => return None,
            HourOverflow::Reject => hour,
        };
        NaiveTime::from_hms_opt(hour, minute, 0).map(|t| (t, span))
    }
}

impl DateTimeExtractor for RegexExtractor {
    fn extract(&self, text: &str, reference: DateTime<Utc>, tz: Tz) -> Option<Extraction> {
        let today = reference.with_timezone(&tz).date_naive();
        let cues = find_date_cues(text);
        let date = self.resolve_date(&cues, today)?;

        let mut spans: Vec<Range<usize>> = cues.into_iter().map(|(_, span)| span).collect();
        let (time, time_span) = self.find_time(&mask(text, &spans))?;
        spans.push(time_span);
        spans.sort_by_key(|s| s.start);

        let instant = resolve_local(date, time, tz)?;
        Some(Extraction { instant, spans })
    }

    fn date_spans(&self, text: &str) -> Vec<Range<usize>> {
        find_date_cues(text).into_iter().map(|(_, span)| span).collect()
    }
}

/// Attaches the offset `tz` has at that local date/time. Ambiguous times take
/// the earliest instant; times inside a DST gap do not exist.
pub fn resolve_local(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<FixedOffset>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.fixed_offset())
}

/// Renders an instant as `DD/MM/YYYY HH:MM` in the operational timezone.
pub fn format_local(instant: &DateTime<FixedOffset>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%d/%m/%Y %H:%M").to_string()
}

/// Replaces the given byte ranges with spaces, keeping every other offset
/// stable.
pub(crate) fn mask(text: &str, spans: &[Range<usize>]) -> String {
    let mut bytes = text.as_bytes().to_vec();
    for span in spans {
        let end = span.end.min(bytes.len());
        let start = span.start.min(end);
        bytes[start..end].fill(b' ');
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn find_date_cues(text: &str) -> Vec<(DateCue, Range<usize>)> {
    let mut cues = Vec::new();

    for caps in ISO_DATE.captures_iter(text) {
        let date = parse_ymd(&caps[1], &caps[2], &caps[3]);
        cues.push((DateCue::Absolute(date), whole(&caps)));
    }
    for caps in BR_DATE.captures_iter(text) {
        let cue = match caps.get(3) {
            Some(year) => DateCue::Absolute(parse_ymd(year.as_str(), &caps[2], &caps[1])),
            None => match (caps[1].parse(), caps[2].parse()) {
                (Ok(day), Ok(month)) => DateCue::DayMonth(day, month),
                _ => DateCue::Absolute(None),
            },
        };
        cues.push((cue, whole(&caps)));
    }
    for caps in RELATIVE_DAY.captures_iter(text) {
        let offset = match caps[1].to_lowercase().as_str() {
            "today" | "hoje" => 0,
            "tomorrow" | "amanhã" | "amanha" => 1,
            _ => 2,
        };
        cues.push((DateCue::RelativeDay(offset), whole(&caps)));
    }
    for caps in WEEKDAY.captures_iter(text) {
        if let Some(day) = weekday_from_name(&caps[1].to_lowercase()) {
            cues.push((DateCue::Weekday(day), whole(&caps)));
        }
    }
    for caps in IN_DAYS.captures_iter(text) {
        if let Ok(n) = caps[1].parse() {
            cues.push((DateCue::InDays(n), whole(&caps)));
        }
    }
    for m in NEXT_MONTH.find_iter(text) {
        cues.push((DateCue::NextMonth, m.range()));
    }
    for m in NEXT_YEAR.find_iter(text) {
        cues.push((DateCue::NextYear, m.range()));
    }
    for caps in DAY_OF_MONTH.captures_iter(text) {
        if let Ok(d) = caps[1].parse() {
            cues.push((DateCue::DayOfMonth(d), whole(&caps)));
        }
    }

    cues.sort_by_key(|(_, span)| span.start);
    cues
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let day = match name {
        "monday" | "segunda" => Weekday::Mon,
        "tuesday" | "terça" | "terca" => Weekday::Tue,
        "wednesday" | "quarta" => Weekday::Wed,
        "thursday" | "quinta" => Weekday::Thu,
        "friday" | "sexta" => Weekday::Fri,
        "saturday" | "sábado" | "sabado" => Weekday::Sat,
        "sunday" | "domingo" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// This year's occurrence of `day/month`, or next year's once it has passed.
fn upcoming_day_month(today: NaiveDate, day: u32, month: u32) -> Option<NaiveDate> {
    match NaiveDate::from_ymd_opt(today.year(), month, day) {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

fn touches_date_separator(text: &str, span: &Range<usize>) -> bool {
    let before = text[..span.start].chars().next_back();
    let after = text[span.end..].chars().next();
    [before, after]
        .into_iter()
        .flatten()
        .any(|c| matches!(c, '/' | '-' | '.'))
}

fn parse_ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn hour_minute(caps: &Captures) -> Option<(u32, u32)> {
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some((hour, minute))
}

fn whole(caps: &Captures) -> Range<usize> {
    caps.get(0).map(|m| m.range()).unwrap_or(0..0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sao_paulo() -> Tz {
        chrono_tz::America::Sao_Paulo
    }

    // 2025-05-05 is a Monday.
    fn extract(text: &str) -> Option<DateTime<FixedOffset>> {
        RegexExtractor::default()
            .extract(text, reference("2025-05-05T00:00:00-03:00"), sao_paulo())
            .map(|e| e.instant)
    }

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_tomorrow_at_9h() {
        let instant = extract("tomorrow at 9h").unwrap();
        assert_eq!(instant, at("2025-05-06T09:00:00-03:00"));
        assert_eq!(instant.offset().local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn test_portuguese_relative_day() {
        assert_eq!(
            extract("Marque reunião amanhã às 9h com a Tati"),
            Some(at("2025-05-06T09:00:00-03:00"))
        );
        assert_eq!(
            extract("depois de amanhã às 15h30"),
            Some(at("2025-05-07T15:30:00-03:00"))
        );
        assert_eq!(extract("hoje 18:45"), Some(at("2025-05-05T18:45:00-03:00")));
    }

    #[test]
    fn test_day_after_tomorrow_is_not_tomorrow() {
        assert_eq!(
            extract("day after tomorrow at 10:30"),
            Some(at("2025-05-07T10:30:00-03:00"))
        );
    }

    #[test]
    fn test_absolute_formats_agree() {
        let iso = extract("meeting on 2025-05-20 at 14:00").unwrap();
        let br = extract("meeting on 20/05/2025 at 14:00").unwrap();
        assert_eq!(iso, br);
        assert_eq!(iso, at("2025-05-20T14:00:00-03:00"));
    }

    #[test]
    fn test_absolute_date_beats_relative_day() {
        assert_eq!(
            extract("tomorrow, no wait, 2025-06-01 at 8h"),
            Some(at("2025-06-01T08:00:00-03:00"))
        );
    }

    #[test]
    fn test_day_month_without_year() {
        assert_eq!(
            extract("Marque reunião 20/05 às 10h com Ana"),
            Some(at("2025-05-20T10:00:00-03:00"))
        );
        // Already past this year: next year.
        assert_eq!(extract("01/03 às 9h"), Some(at("2026-03-01T09:00:00-03:00")));
        assert_eq!(extract("31/04 às 9h"), None);
    }

    #[test]
    fn test_date_numbers_are_never_hours() {
        assert_eq!(extract("Marque reunião com Ana 20/05"), None);
        assert_eq!(extract("Marque reunião com Ana 20/05/2025"), None);
        assert_eq!(extract("meeting on 2025-05-20"), None);
        assert_eq!(extract("meeting 20.05 please"), None);
    }

    #[test]
    fn test_impossible_date_fails() {
        assert_eq!(extract("31/02/2025 at 10h"), None);
    }

    #[test]
    fn test_missing_time_fails() {
        assert_eq!(extract("schedule a meeting tomorrow"), None);
        assert_eq!(extract("marque reunião com a Tati"), None);
    }

    #[test]
    fn test_weekday_resolves_forward() {
        assert_eq!(extract("friday at 10"), Some(at("2025-05-09T10:00:00-03:00")));
        assert_eq!(extract("na sexta-feira às 10h"), Some(at("2025-05-09T10:00:00-03:00")));
        assert_eq!(extract("sunday 9am"), Some(at("2025-05-11T09:00:00-03:00")));
    }

    #[test]
    fn test_same_weekday_rollover_policy() {
        assert_eq!(extract("monday at 10"), Some(at("2025-05-12T10:00:00-03:00")));

        let same_day = RegexExtractor::new(WeekdayRollover::SameDay, HourOverflow::Wrap);
        let instant = same_day
            .extract("monday at 10", reference("2025-05-05T00:00:00-03:00"), sao_paulo())
            .unwrap()
            .instant;
        assert_eq!(instant, at("2025-05-05T10:00:00-03:00"));
    }

    #[test]
    fn test_same_day_cue_wins_over_weekday() {
        assert_eq!(extract("today, monday, at 10"), Some(at("2025-05-05T10:00:00-03:00")));
    }

    #[test]
    fn test_relative_offsets() {
        assert_eq!(extract("in 3 days at 8h"), Some(at("2025-05-08T08:00:00-03:00")));
        assert_eq!(extract("daqui a 10 dias às 9h"), Some(at("2025-05-15T09:00:00-03:00")));
        assert_eq!(
            extract("next month day 24 at 14h"),
            Some(at("2025-06-24T14:00:00-03:00"))
        );
        assert_eq!(
            extract("próximo mês dia 24 às 14h"),
            Some(at("2025-06-24T14:00:00-03:00"))
        );
        assert_eq!(extract("next month at 9:00"), Some(at("2025-06-05T09:00:00-03:00")));
        assert_eq!(extract("next year at 9:00"), Some(at("2026-05-05T09:00:00-03:00")));
    }

    #[test]
    fn test_day_of_month_alone() {
        assert_eq!(extract("dia 20 às 10h"), Some(at("2025-05-20T10:00:00-03:00")));
        // Already past this month: next month.
        assert_eq!(extract("dia 3 às 10h"), Some(at("2025-06-03T10:00:00-03:00")));
        assert_eq!(extract("next month day 31 at 10h"), None);
    }

    #[test]
    fn test_clock_forms() {
        assert_eq!(extract("amanhã 9h30"), Some(at("2025-05-06T09:30:00-03:00")));
        assert_eq!(extract("amanhã 9 horas"), Some(at("2025-05-06T09:00:00-03:00")));
        assert_eq!(extract("tomorrow at 3pm"), Some(at("2025-05-06T15:00:00-03:00")));
        assert_eq!(extract("tomorrow at 12am"), Some(at("2025-05-06T00:00:00-03:00")));
        assert_eq!(extract("tomorrow 7"), Some(at("2025-05-06T07:00:00-03:00")));
    }

    #[test]
    fn test_invalid_minutes_fail() {
        assert_eq!(extract("tomorrow at 9:75"), None);
    }

    #[test]
    fn test_hour_overflow_policy() {
        assert_eq!(extract("tomorrow at 25h"), Some(at("2025-05-06T01:00:00-03:00")));

        let strict = RegexExtractor::new(WeekdayRollover::NextWeek, HourOverflow::Reject);
        assert!(strict
            .extract("tomorrow at 25h", reference("2025-05-05T00:00:00-03:00"), sao_paulo())
            .is_none());
    }

    #[test]
    fn test_reference_day_uses_operational_timezone() {
        // 01:00 UTC on the 6th is still the 5th in São Paulo.
        let instant = RegexExtractor::default()
            .extract("today at 23h", reference("2025-05-06T01:00:00Z"), sao_paulo())
            .unwrap()
            .instant;
        assert_eq!(instant, at("2025-05-05T23:00:00-03:00"));
    }

    #[test]
    fn test_date_spans_without_time() {
        let text = "Desmarque a reunião com a Tati amanhã";
        let spans = RegexExtractor::default().date_spans(text);
        assert_eq!(
            mask(text, &spans).split_whitespace().collect::<Vec<_>>(),
            vec!["Desmarque", "a", "reunião", "com", "a", "Tati"]
        );
        assert!(RegexExtractor::default().date_spans("cancel dentist").is_empty());
    }

    #[test]
    fn test_spans_cover_date_and_time() {
        let text = "Marque reunião amanhã às 9h com a Tati";
        let extraction = RegexExtractor::default()
            .extract(text, reference("2025-05-05T00:00:00-03:00"), sao_paulo())
            .unwrap();
        let masked = mask(text, &extraction.spans);
        assert_eq!(
            masked.split_whitespace().collect::<Vec<_>>(),
            vec!["Marque", "reunião", "com", "a", "Tati"]
        );
    }

    #[test]
    fn test_format_local() {
        let instant = at("2025-05-06T12:00:00Z");
        assert_eq!(format_local(&instant, sao_paulo()), "06/05/2025 09:00");
    }
}
