use anyhow::Result;
use charityhub_db::models::DonorRow;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Render a report for stdout in the configured format.
pub fn render<R>(report: &R, format: ReportFormat) -> Result<String>
where
    R: Serialize + fmt::Display,
{
    match format {
        ReportFormat::Text => Ok(report.to_string()),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// "Name <email>" for a known donor, or the bare id when the user row is gone.
pub fn donor_label(donor: Option<&DonorRow>, fallback_id: i64) -> String {
    match donor {
        Some(d) => format!("{} <{}>", d.name, d.email),
        None => format!("user #{} (not found)", fallback_id),
    }
}

pub(crate) fn heading(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{}", title)?;
    writeln!(f, "{}", "-".repeat(title.len()))
}

pub(crate) fn yes_no(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        count: u32,
    }

    impl fmt::Display for Sample {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "count={}", self.count)
        }
    }

    #[test]
    fn parses_formats_case_insensitively() {
        assert_eq!("JSON".parse::<ReportFormat>(), Ok(ReportFormat::Json));
        assert_eq!(" text ".parse::<ReportFormat>(), Ok(ReportFormat::Text));
        assert!("yaml".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn renders_text_and_json() {
        let sample = Sample { count: 3 };
        assert_eq!(render(&sample, ReportFormat::Text).unwrap(), "count=3");

        let json: serde_json::Value =
            serde_json::from_str(&render(&sample, ReportFormat::Json).unwrap()).unwrap();
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn donor_label_falls_back_to_id() {
        let donor = DonorRow {
            id: 4,
            name: "Ada Okafor".into(),
            email: "ada@example.org".into(),
        };
        assert_eq!(donor_label(Some(&donor), 4), "Ada Okafor <ada@example.org>");
        assert_eq!(donor_label(None, 9), "user #9 (not found)");
    }
}
