//! Instrument date strings to the `YYYY-MM-DD HH:MM:SS` form stored under
//! [`keys::DATE_TIME`](crate::tags::keys::DATE_TIME).

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Month number (1-12) from an English name or its three-letter prefix.
pub fn month_from_name(name: &str) -> Option<u32> {
    let name = name.trim_matches(|c: char| !c.is_ascii_alphabetic());
    let prefix = name.get(..3)?;
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(prefix))
        .map(|i| i as u32 + 1)
}

/// Wall-clock time parsed from `HH:MM[:SS]` plus an optional AM/PM marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockTime {
    /// Hour, 0-23.
    pub hour: u32,
    /// Minute.
    pub minute: u32,
    /// Second.
    pub second: u32,
}

impl ClockTime {
    /// Parses `"10:58:49"` with an optional `"AM"`/`"PM"` marker.
    ///
    /// `12 AM` is midnight and `12 PM` noon.
    pub fn parse(hms: &str, meridiem: Option<&str>) -> Option<Self> {
        let mut parts = hms.trim().split(':');
        let mut hour: u32 = parts.next()?.trim().parse().ok()?;
        let minute: u32 = parts.next()?.trim().parse().ok()?;
        let second: u32 = match parts.next() {
            Some(s) => s.trim().parse().ok()?,
            None => 0,
        };
        match meridiem.map(|m| m.trim().to_ascii_uppercase()) {
            Some(m) if m == "PM" && hour < 12 => hour += 12,
            Some(m) if m == "AM" && hour == 12 => hour = 0,
            _ => {}
        }
        (hour < 24 && minute < 60 && second < 61).then_some(Self {
            hour,
            minute,
            second,
        })
    }
}

/// Formats a calendar date and time as `YYYY-MM-DD HH:MM:SS`.
pub fn format_date_time(year: i32, month: u32, day: u32, time: ClockTime) -> String {
    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
        time.hour, time.minute, time.second
    )
}
