use chrono::NaiveDate;

/// Compact number label: 1.2K, 3.4M, 1B. One decimal, halves rounded away
/// from zero; a trailing ".0" is dropped.
pub fn format_compact(value: f64) -> String {
    let (scaled, suffix) = if value >= 1_000_000_000.0 {
        (value / 1_000_000_000.0, "B")
    } else if value >= 1_000_000.0 {
        (value / 1_000_000.0, "M")
    } else if value >= 1_000.0 {
        (value / 1_000.0, "K")
    } else {
        return format_plain(value);
    };
    let text = format!("{:.1}", (scaled * 10.0).round() / 10.0);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{}{}", text, suffix)
}

fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value)
}

/// Whole number with Indian digit grouping: 12,34,567.
pub fn format_number(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let sign = if rounded < 0 { "-" } else { "" };
    if digits.len() <= 3 {
        return format!("{}{}", sign, digits);
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();
    format!("{}{},{}", sign, groups.join(","), tail)
}

/// "15 Jan 2024".
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

/// Percent change from `previous` to `current`; 0 when there is no baseline.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}
