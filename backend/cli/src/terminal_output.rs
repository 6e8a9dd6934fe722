//! Terminal output utilities: ANSI styling that respects `NO_COLOR`.

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";

/// Check if the terminal supports color output.
pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM")
                .map(|t| t != "dumb")
                .unwrap_or(false))
}

pub fn paint(style: &str, text: &str) -> String {
    if supports_color() {
        format!("{style}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Colour a breaker state or node status by severity.
pub fn status_badge(state: &str) -> String {
    let style = match state {
        "closed" | "up" => GREEN,
        "half-open" | "unknown" => YELLOW,
        _ => RED,
    };
    paint(style, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_keeps_text() {
        for state in ["closed", "open", "half-open", "up", "down"] {
            assert!(status_badge(state).contains(state));
        }
    }
}
