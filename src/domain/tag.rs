use chrono::NaiveDate;

const PREFIX: &str = "jellysweep-";
const DATE_FMT: &str = "%Y-%m-%d";

/// A parsed `jellysweep-*` tag label. This is the only durable state the
/// engine writes to the arr services; every lifecycle transition in
/// `crate::engine::tags` reads or writes one of these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    /// `jellysweep-delete-YYYY-MM-DD`
    Delete { date: NaiveDate },
    /// `jellysweep-delete-duN-YYYY-MM-DD`
    DiskUsageDelete { percent: u32, date: NaiveDate },
    /// `jellysweep-keep-request-YYYY-MM-DD-<requester>`
    KeepRequest { date: NaiveDate, requester: String },
    /// `jellysweep-must-keep-YYYY-MM-DD[-<requester>]`
    MustKeep {
        date: NaiveDate,
        requester: Option<String>,
    },
    /// `jellysweep-must-delete-for-sure`
    MustDeleteForSure,
    /// `jellysweep-ignore`
    Ignore,
}

impl TagKind {
    /// Scheduled (or nominal) date this tag encodes, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            TagKind::Delete { date }
            | TagKind::DiskUsageDelete { date, .. }
            | TagKind::KeepRequest { date, .. }
            | TagKind::MustKeep { date, .. } => Some(*date),
            TagKind::MustDeleteForSure | TagKind::Ignore => None,
        }
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.date().is_some_and(|d| d < today)
    }

    pub fn format(&self) -> String {
        match self {
            TagKind::Delete { date } => format!("{PREFIX}delete-{}", date.format(DATE_FMT)),
            TagKind::DiskUsageDelete { percent, date } => {
                format!("{PREFIX}delete-du{percent}-{}", date.format(DATE_FMT))
            }
            TagKind::KeepRequest { date, requester } => {
                format!("{PREFIX}keep-request-{}-{requester}", date.format(DATE_FMT))
            }
            TagKind::MustKeep { date, requester } => match requester {
                Some(r) => format!("{PREFIX}must-keep-{}-{r}", date.format(DATE_FMT)),
                None => format!("{PREFIX}must-keep-{}", date.format(DATE_FMT)),
            },
            TagKind::MustDeleteForSure => format!("{PREFIX}must-delete-for-sure"),
            TagKind::Ignore => format!("{PREFIX}ignore"),
        }
    }

    pub fn parse(label: &str) -> Option<TagKind> {
        let rest = label.strip_prefix(PREFIX)?;
        if rest == "ignore" {
            return Some(TagKind::Ignore);
        }
        if rest == "must-delete-for-sure" {
            return Some(TagKind::MustDeleteForSure);
        }
        if let Some(rest) = rest.strip_prefix("delete-du") {
            let (percent_str, rest) = rest.split_once('-')?;
            let percent: u32 = percent_str.parse().ok()?;
            let (date, suffix) = parse_date_and_suffix(rest)?;
            if suffix.is_some() {
                return None;
            }
            return Some(TagKind::DiskUsageDelete { percent, date });
        }
        if let Some(rest) = rest.strip_prefix("delete-") {
            let (date, suffix) = parse_date_and_suffix(rest)?;
            if suffix.is_some() {
                return None;
            }
            return Some(TagKind::Delete { date });
        }
        if let Some(rest) = rest.strip_prefix("keep-request-") {
            let (date, suffix) = parse_date_and_suffix(rest)?;
            let requester = suffix?;
            return Some(TagKind::KeepRequest { date, requester });
        }
        if let Some(rest) = rest.strip_prefix("must-keep-") {
            let (date, requester) = parse_date_and_suffix(rest)?;
            return Some(TagKind::MustKeep { date, requester });
        }
        None
    }
}

/// Parses a leading `YYYY-MM-DD` and returns it along with whatever trails
/// it. A bare trailing dash (a quirk of a legacy parser this format used to
/// share) is accepted and treated the same as no suffix at all; this parser
/// never emits it back out.
fn parse_date_and_suffix(s: &str) -> Option<(NaiveDate, Option<String>)> {
    if s.len() < 10 {
        return None;
    }
    let (date_str, rest) = s.split_at(10);
    let date = NaiveDate::parse_from_str(date_str, DATE_FMT).ok()?;
    let suffix = match rest {
        "" | "-" => None,
        _ => Some(rest.strip_prefix('-')?.to_string()),
    };
    Some((date, suffix))
}

/// Replaces characters that would otherwise break the tag grammar's
/// dash-delimited fields.
pub fn sanitize_requester(requester: &str) -> String {
    requester.replace(['-', ' '], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn round_trips_every_kind() {
        let kinds = vec![
            TagKind::Delete { date: d(2024, 6, 10) },
            TagKind::DiskUsageDelete {
                percent: 90,
                date: d(2025, 8, 23),
            },
            TagKind::KeepRequest {
                date: d(2024, 8, 30),
                requester: "alice".into(),
            },
            TagKind::MustKeep {
                date: d(2024, 8, 30),
                requester: Some("alice".into()),
            },
            TagKind::MustKeep {
                date: d(2024, 8, 30),
                requester: None,
            },
            TagKind::MustDeleteForSure,
            TagKind::Ignore,
        ];
        for kind in kinds {
            let label = kind.format();
            let parsed = TagKind::parse(&label).expect("parses its own output");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn disk_usage_tag_parses_percent_and_date() {
        let parsed = TagKind::parse("jellysweep-delete-du90-2025-08-23").unwrap();
        assert_eq!(
            parsed,
            TagKind::DiskUsageDelete {
                percent: 90,
                date: d(2025, 8, 23)
            }
        );
        assert_eq!(parsed.format(), "jellysweep-delete-du90-2025-08-23");
    }

    #[test]
    fn accepts_legacy_trailing_dash_but_never_emits_it() {
        let parsed = TagKind::parse("jellysweep-delete-2024-06-10-").unwrap();
        assert_eq!(parsed, TagKind::Delete { date: d(2024, 6, 10) });
        assert_eq!(parsed.format(), "jellysweep-delete-2024-06-10");
    }

    #[test]
    fn malformed_labels_fail_to_parse() {
        assert!(TagKind::parse("jellysweep-delete-2024-13-40").is_none());
        assert!(TagKind::parse("jellysweep-delete-").is_none());
        assert!(TagKind::parse("jellysweep-keep-request-2024-08-30").is_none());
        assert!(TagKind::parse("not-a-jellysweep-tag").is_none());
    }

    #[test]
    fn expiry_uses_date_only_variants() {
        let today = d(2024, 6, 15);
        assert!(TagKind::Delete { date: d(2024, 6, 1) }.is_expired(today));
        assert!(!TagKind::Delete { date: d(2024, 7, 1) }.is_expired(today));
        assert!(!TagKind::Ignore.is_expired(today));
    }
}
