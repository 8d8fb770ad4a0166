use chrono::{DateTime, FixedOffset, Utc};

/// Placeholder for absent values in tables and detail views.
pub const EMPTY_VALUE: &str = "—";

const JAKARTA_OFFSET_SECS: i32 = 7 * 3600;

/// `16 Oct 2026, 14:05 WIB` style timestamp in Jakarta time.
pub fn format_date(value: Option<DateTime<Utc>>) -> String {
    let (Some(value), Some(jakarta)) = (value, FixedOffset::east_opt(JAKARTA_OFFSET_SECS)) else {
        return EMPTY_VALUE.to_string();
    };
    value
        .with_timezone(&jakarta)
        .format("%d %b %Y, %H:%M WIB")
        .to_string()
}

/// Whole Rupiah with `.` thousands separators, e.g. `Rp 1.234.567`.
pub fn format_currency(value: Option<i64>) -> String {
    let Some(value) = value else {
        return EMPTY_VALUE.to_string();
    };
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-Rp {}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

/// `shipping_delay` -> `Shipping Delay`.
pub fn format_label(value: &str) -> String {
    let words: Vec<String> = value
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        EMPTY_VALUE.to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dates_render_in_jakarta_time() {
        let utc = Utc.with_ymd_and_hms(2026, 3, 4, 20, 30, 0).single().expect("valid");
        assert_eq!(format_date(Some(utc)), "05 Mar 2026, 03:30 WIB");
        assert_eq!(format_date(None), "—");

        let october = Utc.with_ymd_and_hms(2026, 10, 16, 7, 5, 0).single().expect("valid");
        assert_eq!(format_date(Some(october)), "16 Oct 2026, 14:05 WIB");
    }

    #[test]
    fn currency_groups_thousands() {
        assert_eq!(format_currency(Some(1_234_567)), "Rp 1.234.567");
        assert_eq!(format_currency(Some(999)), "Rp 999");
        assert_eq!(format_currency(Some(0)), "Rp 0");
        assert_eq!(format_currency(Some(-15_000)), "-Rp 15.000");
        assert_eq!(format_currency(None), "—");
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(format_label("shipping_delay"), "Shipping Delay");
        assert_eq!(format_label("in_progress"), "In Progress");
        assert_eq!(format_label("WhatsApp"), "WhatsApp");
        assert_eq!(format_label(""), "—");
    }
}
