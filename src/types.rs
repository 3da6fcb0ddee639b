use chrono::{DateTime, FixedOffset, Local, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Directory layout under the download directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FolderLayout {
    /// `{base}/{filename}`
    Flat,
    /// `{base}/{year}/{month}/{filename}`
    #[value(name = "year-month")]
    YearMonth,
}

/// Which remote date is treated as the item's declared timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DateSource {
    /// When the photo or video was taken.
    Created,
    /// When the item was added to the library.
    Added,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FileMatchPolicy {
    /// Use the display filename; only colliding items get an id suffix.
    #[value(name = "name")]
    Name,
    /// Always append the first 7 characters of the base64 item id.
    #[value(name = "name-id7")]
    NameId7,
}

/// Timezone used to interpret declared timestamps: year/month partitioning
/// and the creation-time string on platforms that need one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
    Local,
    Named(chrono_tz::Tz),
}

impl Timezone {
    pub fn convert(&self, ts: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Timezone::Local => ts.with_timezone(&Local).fixed_offset(),
            Timezone::Named(tz) => ts.with_timezone(tz).fixed_offset(),
        }
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Timezone::Named(chrono_tz::UTC)
    }
}

impl std::str::FromStr for Timezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(Timezone::Local);
        }
        s.parse::<chrono_tz::Tz>()
            .map(Timezone::Named)
            .map_err(|_| format!("unknown timezone '{s}' (expected an IANA name such as Europe/Berlin, or 'local')"))
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timezone::Local => f.write_str("local"),
            Timezone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_parse_timezone() {
        assert_eq!("local".parse::<Timezone>().unwrap(), Timezone::Local);
        assert_eq!("UTC".parse::<Timezone>().unwrap(), Timezone::default());
        assert!("Mars/Olympus".parse::<Timezone>().is_err());
    }

    #[test]
    fn test_convert_crosses_month_boundary() {
        // 2024-01-31T23:30Z is already February 1st in Tokyo.
        let ts = Utc.with_ymd_and_hms(2024, 1, 31, 23, 30, 0).unwrap();
        let tokyo: Timezone = "Asia/Tokyo".parse().unwrap();
        let local = tokyo.convert(ts);
        assert_eq!((local.year(), local.month(), local.day()), (2024, 2, 1));
        // Same instant regardless of zone.
        assert_eq!(local.timestamp(), ts.timestamp());
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }
}
