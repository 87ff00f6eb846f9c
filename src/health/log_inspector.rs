use crate::config::HealthConfig;
use chrono::{Local, NaiveDateTime, TimeDelta};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogInspectionError {
    #[error("reading log file `{0}`: `{1}`")]
    IOError(PathBuf, io::Error),
}

/// Infers worker health from the log file it keeps appending to.
#[derive(Debug, Clone)]
pub struct LogHealthInspector {
    path: PathBuf,
    max_age: Duration,
    tail_bytes: u64,
    error_patterns: Vec<String>,
    recency_window: Duration,
    timestamp_format: String,
}

impl LogHealthInspector {
    pub fn new(path: &Path, health: &HealthConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            max_age: health.log_max_age,
            tail_bytes: health.tail_bytes,
            error_patterns: health.error_patterns.clone(),
            recency_window: health.error_recency,
            timestamp_format: health.timestamp_format.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the log was written within the max age.
    ///
    /// A missing file says nothing about the worker and is reported as fresh.
    pub fn is_log_fresh(&self) -> Result<bool, LogInspectionError> {
        self.is_log_fresh_at(SystemTime::now())
    }

    pub fn is_log_fresh_at(&self, now: SystemTime) -> Result<bool, LogInspectionError> {
        let modified = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(err) => return Err(self.io_error(err)),
        };

        // A modification time ahead of `now` is as fresh as it gets.
        Ok(now
            .duration_since(modified)
            .map_or(true, |age| age <= self.max_age))
    }

    /// Whether the tail of the log holds an error line stamped within the recency window.
    pub fn has_recent_error(&self) -> Result<bool, LogInspectionError> {
        self.has_recent_error_at(Local::now().naive_local())
    }

    pub fn has_recent_error_at(&self, now: NaiveDateTime) -> Result<bool, LogInspectionError> {
        let Some(tail) = self.read_tail()? else {
            return Ok(false);
        };
        let window = TimeDelta::from_std(self.recency_window).unwrap_or(TimeDelta::MAX);

        Ok(tail
            .lines()
            .filter(|line| self.error_patterns.iter().any(|p| line.contains(p.as_str())))
            .filter_map(|line| self.line_timestamp(line))
            .any(|timestamp| now.signed_duration_since(timestamp) < window))
    }

    // Unparsable timestamps never count as evidence.
    fn line_timestamp(&self, line: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_and_remainder(line.trim_start(), &self.timestamp_format)
            .ok()
            .map(|(timestamp, _)| timestamp)
    }

    /// Last `tail_bytes` of the log, starting at a line boundary. `None` if there is no log.
    fn read_tail(&self) -> Result<Option<String>, LogInspectionError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };

        let len = file.metadata().map_err(|e| self.io_error(e))?.len();
        let start = len.saturating_sub(self.tail_bytes);
        file.seek(SeekFrom::Start(start))
            .map_err(|e| self.io_error(e))?;

        let mut buf = Vec::with_capacity((len - start) as usize);
        file.read_to_end(&mut buf).map_err(|e| self.io_error(e))?;
        let tail = String::from_utf8_lossy(&buf);

        // The first line is cut unless the tail starts at the beginning of the file.
        let tail = match (start, tail.find('\n')) {
            (0, _) => tail.as_ref(),
            (_, Some(newline)) => &tail[newline + 1..],
            (_, None) => "",
        };
        Ok(Some(tail.to_string()))
    }

    fn io_error(&self, err: io::Error) -> LogInspectionError {
        LogInspectionError::IOError(self.path.clone(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn stamp(seconds_ago: i64) -> String {
        (now() - TimeDelta::seconds(seconds_ago))
            .format("%Y-%m-%d %H:%M:%S,123")
            .to_string()
    }

    fn inspector_for(dir: &TempDir, content: &str) -> LogHealthInspector {
        let path = dir.path().join("worker.log");
        std::fs::write(&path, content).unwrap();
        LogHealthInspector::new(&path, &HealthConfig::default())
    }

    #[rstest]
    #[case::recent_error(30, "Connection refused", true)]
    #[case::old_error(600, "Connection refused", false)]
    #[case::just_inside_window(119, "dispatch_failed", true)]
    #[case::window_edge_is_not_recent(120, "dispatch_failed", false)]
    #[case::recent_but_not_an_error(10, "Bot is running", false)]
    #[case::certificate_error(5, "SSL: CERTIFICATE_VERIFY_FAILED", true)]
    #[case::future_timestamp(-30, "Network is unreachable", true)]
    fn recent_error_detection(
        #[case] seconds_ago: i64,
        #[case] message: &str,
        #[case] expected: bool,
    ) {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{} - bot - INFO - started\n{} - bot - ERROR - {message}\n",
            stamp(3600),
            stamp(seconds_ago)
        );
        let inspector = inspector_for(&dir, &content);

        assert_eq!(inspector.has_recent_error_at(now()).unwrap(), expected);
    }

    #[rstest]
    #[case::no_timestamp("ERROR - Connection refused")]
    #[case::garbage_timestamp("2024-99-99 99:99:99 ERROR Connection refused")]
    #[case::other_format("10/05/2024 11:59:50 Connection refused")]
    fn unparsable_timestamps_do_not_count(#[case] line: &str) {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_for(&dir, &format!("{line}\n"));

        assert!(!inspector.has_recent_error_at(now()).unwrap());
    }

    #[test]
    fn only_the_tail_is_scanned() {
        let dir = TempDir::new().unwrap();
        let mut content = format!("{} - ERROR - Connection refused\n", stamp(10));
        let filler = format!("{} - INFO - heartbeat\n", stamp(5));
        while content.len() < 3 * HealthConfig::default().tail_bytes as usize {
            content.push_str(&filler);
        }
        let inspector = inspector_for(&dir, &content);

        assert!(!inspector.has_recent_error_at(now()).unwrap());
    }

    #[test]
    fn cut_first_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker.log");
        let health = HealthConfig {
            tail_bytes: 20,
            ..Default::default()
        };
        // The tail starts inside the error line, right before its message.
        let line = format!("{} - ERROR - dispatch_failed\n", stamp(10));
        std::fs::write(&path, &line).unwrap();
        let inspector = LogHealthInspector::new(&path, &health);

        assert!(!inspector.has_recent_error_at(now()).unwrap());
    }

    #[test]
    fn custom_patterns_and_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker.log");
        let health = HealthConfig {
            error_patterns: vec!["session expired".to_string()],
            timestamp_format: "[%d/%m/%Y %H:%M:%S]".to_string(),
            ..Default::default()
        };
        std::fs::write(&path, "[10/05/2024 11:59:30] session expired\n").unwrap();
        let inspector = LogHealthInspector::new(&path, &health);

        assert!(inspector.has_recent_error_at(now()).unwrap());
    }

    #[test]
    fn invalid_utf8_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker.log");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();
        writeln!(file, "{} - ERROR - ClientConnectorError", stamp(1)).unwrap();
        let inspector = LogHealthInspector::new(&path, &HealthConfig::default());

        assert!(inspector.has_recent_error_at(now()).unwrap());
    }

    #[test]
    fn missing_log_is_neither_stale_nor_failing() {
        let dir = TempDir::new().unwrap();
        let inspector =
            LogHealthInspector::new(&dir.path().join("absent.log"), &HealthConfig::default());

        assert!(inspector.is_log_fresh().unwrap());
        assert!(!inspector.has_recent_error().unwrap());
    }

    #[rstest]
    #[case::just_written(Duration::ZERO, true)]
    #[case::four_minutes(Duration::from_secs(4 * 60), true)]
    #[case::six_minutes(Duration::from_secs(6 * 60), false)]
    fn log_freshness(#[case] since_write: Duration, #[case] expected: bool) {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_for(&dir, "hello\n");
        let modified = std::fs::metadata(inspector.path())
            .unwrap()
            .modified()
            .unwrap();

        assert_eq!(
            inspector.is_log_fresh_at(modified + since_write).unwrap(),
            expected
        );
    }

    #[test]
    fn modification_in_the_future_is_fresh() {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_for(&dir, "hello\n");

        let past = SystemTime::now() - Duration::from_secs(3600);
        assert!(inspector.is_log_fresh_at(past).unwrap());
    }
}
