//! Byte-count formatting for log output.

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Format a (possibly negative) byte count using binary prefixes.
pub fn format_bytes(bytes: i64) -> String {
    let sign = if bytes < 0 { "-" } else { "" };
    let mut value = bytes.unsigned_abs() as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{sign}{} {}", bytes.unsigned_abs(), UNITS[0])
    } else {
        format!("{sign}{value:.1} {}", UNITS[unit])
    }
}

/// Format a bytes-per-second rate; non-positive rates read as unlimited.
pub fn format_rate(bytes_per_sec: i64) -> String {
    if bytes_per_sec <= 0 {
        "unlimited".to_string()
    } else {
        format!("{}/s", format_bytes(bytes_per_sec))
    }
}
