use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::filter::EnvFilter;

/// Where the installed subscriber writes.
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

const LOG_FILE: &str = "effects.log";
const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "mudfx - temporal effect engine";

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Sends `tracing` output to `<root>/log/effects.log`. `RUST_LOG` wins over
/// `level`. Later calls return the path chosen by the first one.
pub fn init(root: &Path, level: &str) -> Result<PathBuf, String> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }
    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir)
        .map_err(|err| format!("log directory create failed: {}", err))?;

    let path = log_dir.join(LOG_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("open log {} failed: {}", LOG_FILE, err))?;
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        write_header(&mut file, LOG_FILE)?;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if !install_subscriber(filter, file) {
        eprintln!(
            "mudfx: a tracing subscriber is already installed; {} gets the header only",
            path.display()
        );
    }

    Ok(LOG_PATH.get_or_init(|| path).clone())
}

/// False when another subscriber already owns the process (tests, embedding hosts).
fn install_subscriber(filter: EnvFilter, file: File) -> bool {
    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
    {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "global subscriber already set");
            false
        }
    }
}

fn write_header(file: &mut File, name: &str) -> Result<(), String> {
    let timestamp = format_header_timestamp(unix_timestamp());
    writeln!(file, "{HEADER_LINE}").map_err(|err| format!("header write failed: {}", err))?;
    writeln!(file, "{HEADER_TITLE}").map_err(|err| format!("header write failed: {}", err))?;
    writeln!(file, "{name} - started {timestamp}")
        .map_err(|err| format!("header write failed: {}", err))?;
    Ok(())
}

fn format_header_timestamp(ts: i64) -> String {
    let datetime = breakdown_timestamp(ts);
    let weekday = WEEKDAYS[(datetime.weekday as usize).min(6)];
    let month = MONTHS[(datetime.month as usize).saturating_sub(1).min(11)];
    format!(
        "{weekday} {month} {:>2} {:02}:{:02}:{:02} {}",
        datetime.day, datetime.hour, datetime.minute, datetime.second, datetime.year
    )
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

struct DateTimeParts {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    weekday: u32,
}

fn breakdown_timestamp(ts: i64) -> DateTimeParts {
    let secs = ts.max(0);
    let days = secs / 86_400;
    let seconds_of_day = (secs % 86_400) as u32;
    let (year, month, day) = civil_from_days(days);
    DateTimeParts {
        year,
        month,
        day,
        hour: seconds_of_day / 3_600,
        minute: (seconds_of_day % 3_600) / 60,
        second: seconds_of_day % 60,
        weekday: ((days + 4).rem_euclid(7)) as u32,
    }
}

// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = (yoe + era * 400 + i64::from(month <= 2)) as i32;
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_timestamp_is_human_readable() {
        // 2024-02-29 13:05:09 UTC, a Thursday
        assert_eq!(format_header_timestamp(1_709_211_909), "Thu Feb 29 13:05:09 2024");
        assert_eq!(format_header_timestamp(0), "Thu Jan  1 00:00:00 1970");
    }

    #[test]
    fn init_creates_log_with_header_once() {
        let root = std::env::temp_dir().join(format!("mudfx-log-{}", std::process::id()));
        let path = init(&root, "debug").expect("init");
        let again = init(&root, "warn").expect("init again");
        assert_eq!(path, again);

        let text = std::fs::read_to_string(&path).expect("read log");
        assert!(text.starts_with(HEADER_LINE));
        assert_eq!(text.matches(HEADER_TITLE).count(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn second_subscriber_is_refused() {
        let root = std::env::temp_dir().join(format!("mudfx-sub-{}", std::process::id()));
        std::fs::create_dir_all(&root).expect("dir");
        let open = |name: &str| File::create(root.join(name)).expect("file");
        install_subscriber(EnvFilter::new("info"), open("a.log"));
        assert!(!install_subscriber(EnvFilter::new("info"), open("b.log")));
        let _ = std::fs::remove_dir_all(&root);
    }
}
