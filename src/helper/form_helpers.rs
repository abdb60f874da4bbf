use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parses a `datetime-local` input value ("2026-08-30T18:00"). Seconds are
/// accepted when present. Values are taken as UTC.
pub fn parse_datetime_local(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// HTML checkboxes submit "on" when ticked and nothing at all otherwise.
pub fn checkbox_checked(value: Option<&str>) -> bool {
    matches!(value, Some("on") | Some("true") | Some("1"))
}

/// Trims a field and maps the empty result to `None`.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn datetime_local_values_parse_as_utc() {
        let parsed = parse_datetime_local("2026-08-30T18:30").expect("valid");
        assert_eq!(parsed.hour(), 18);
        assert_eq!(parsed.minute(), 30);

        assert!(parse_datetime_local("2026-08-30T18:30:15").is_some());
        assert!(parse_datetime_local("next tuesday").is_none());
    }

    #[test]
    fn checkbox_and_blank_handling() {
        assert!(checkbox_checked(Some("on")));
        assert!(!checkbox_checked(None));
        assert!(!checkbox_checked(Some("off")));

        assert_eq!(non_blank(Some("  Berlin ")), Some("Berlin".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
