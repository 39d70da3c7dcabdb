use std::any::Any;

/// Format a duration in seconds the way the `uptime` command reports it.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    format!(
        "up {} days, {} hours, {} minutes, {} seconds",
        days, hours, minutes, seconds
    )
}

/// Help-listing form of a doc summary: first character lowercased, trailing
/// dots removed.
pub fn listing_summary(summary: &str) -> String {
    let summary = summary.trim().trim_end_matches('.');
    let mut chars = summary.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Documentation with per-line indentation stripped.
pub fn dedent(doc: &str) -> String {
    doc.lines().map(str::trim).collect::<Vec<_>>().join("\n")
}

/// Text of a caught panic payload (`panic!` with a literal or a format).
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let literal = std::panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(&*literal), "plain");

        let formatted = std::panic::catch_unwind(|| panic!("index {}", 3)).unwrap_err();
        assert_eq!(panic_message(&*formatted), "index 3");

        let other = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[test]
    fn test_format_uptime_seconds() {
        assert_eq!(format_uptime(0), "up 0 days, 0 hours, 0 minutes, 0 seconds");
        assert_eq!(format_uptime(59), "up 0 days, 0 hours, 0 minutes, 59 seconds");
    }

    #[test]
    fn test_format_uptime_days() {
        assert_eq!(format_uptime(90061), "up 1 days, 1 hours, 1 minutes, 1 seconds");
        assert_eq!(format_uptime(86400 * 3 + 3599), "up 3 days, 0 hours, 59 minutes, 59 seconds");
    }

    #[test]
    fn test_listing_summary() {
        assert_eq!(listing_summary("Show this help."), "show this help");
        assert_eq!(listing_summary("  List of users..."), "list of users");
        assert_eq!(listing_summary(""), "");
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("Show help.\n\n    Usage: help"), "Show help.\n\nUsage: help");
    }
}
