//! Platform-specific file timestamp setting behind a small capability trait,
//! so the engine never needs `#[cfg]` conditionals.

use std::fs::FileTimes;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset};

pub trait TimestampSetter: Send + Sync {
    /// Set the file's times to `when`. Implementations set what the platform
    /// allows and report the first hard failure.
    fn set_times(&self, path: &Path, when: DateTime<FixedOffset>) -> std::io::Result<()>;

    fn name(&self) -> &'static str;
}

/// Sets access and modification time everywhere, plus creation (birth) time
/// on macOS and Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTimesSetter;

impl TimestampSetter for FileTimesSetter {
    fn set_times(&self, path: &Path, when: DateTime<FixedOffset>) -> std::io::Result<()> {
        let time = to_system_time(when.timestamp(), when.timestamp_subsec_nanos());
        #[allow(unused_mut)]
        let mut times = FileTimes::new().set_modified(time).set_accessed(time);

        #[cfg(target_os = "macos")]
        {
            use std::os::macos::fs::FileTimesExt;
            times = times.set_created(time);
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileTimesExt;
            times = times.set_created(time);
        }

        let file = std::fs::File::options().write(true).open(path)?;
        file.set_times(times)
    }

    fn name(&self) -> &'static str {
        "file-times"
    }
}

/// Leaves timestamps alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTimestampSetter;

impl TimestampSetter for NoopTimestampSetter {
    fn set_times(&self, _path: &Path, _when: DateTime<FixedOffset>) -> std::io::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Pick the setter for the running platform.
pub fn default_timestamp_setter() -> Arc<dyn TimestampSetter> {
    if cfg!(any(unix, windows)) {
        Arc::new(FileTimesSetter)
    } else {
        tracing::debug!("No timestamp support on this platform, timestamps left unchanged");
        Arc::new(NoopTimestampSetter)
    }
}

/// Convert a Unix timestamp to `SystemTime`, handling dates before 1970.
fn to_system_time(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH
            .checked_sub(Duration::from_secs(secs.unsigned_abs()))
            .map(|t| t + Duration::from_nanos(nanos as u64))
            .unwrap_or(UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sets_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.jpg");
        std::fs::write(&path, b"x").unwrap();

        let when = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2020, 5, 17, 10, 0, 0)
            .unwrap();
        FileTimesSetter.set_times(&path, when).unwrap();

        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        let secs = mtime.duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        assert_eq!(secs, when.timestamp());
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let when = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .unwrap();
        assert!(FileTimesSetter
            .set_times(&dir.path().join("missing"), when)
            .is_err());
    }

    #[test]
    fn test_noop_never_fails() {
        let when = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .unwrap();
        assert!(NoopTimestampSetter
            .set_times(Path::new("/definitely/missing"), when)
            .is_ok());
    }

    #[test]
    fn test_pre_epoch_time() {
        let t = to_system_time(-10, 0);
        assert_eq!(UNIX_EPOCH.duration_since(t).unwrap().as_secs(), 10);
    }
}
