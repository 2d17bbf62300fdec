use chrono::{DateTime, SecondsFormat, Utc};

/// Текущее UTC-время.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// ISO-8601 with millisecond precision and `Z` suffix,
/// e.g. `2026-10-18T09:15:02.123Z`.
pub fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn millis_and_zulu_suffix() {
        let at = Utc.timestamp_millis_opt(1_760_778_902_123).unwrap();
        assert_eq!(iso_millis(at), "2025-10-18T09:15:02.123Z");
    }
}
