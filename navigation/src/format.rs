//! Human-readable durations and distances for log lines and CLI output.

/// `"45 s"`, `"12 min"`, `"1 h 5 min"`, `"2 h"`. Partial minutes below one
/// hour round up; NaN formats as an empty string.
pub fn format_duration(seconds: f64) -> String {
    if seconds.is_nan() {
        return String::new();
    }
    let s = seconds.max(0.0).round() as u64;

    if s >= 3600 {
        let mut hours = s / 3600;
        let mut mins = ((s % 3600) as f64 / 60.0).round() as u64;
        if mins == 60 {
            hours += 1;
            mins = 0;
        }
        return if mins > 0 {
            format!("{hours} h {mins} min")
        } else {
            format!("{hours} h")
        };
    }
    if s >= 60 {
        return format!("{} min", s.div_ceil(60));
    }
    format!("{s} s")
}

/// `"850 m"` below one kilometer, `"12.3 km"` above.
pub fn format_distance(meters: f64) -> String {
    if meters.is_nan() {
        return String::new();
    }
    let meters = meters.max(0.0);
    let rounded = meters.round();
    if rounded < 1000.0 {
        format!("{rounded} m")
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}
