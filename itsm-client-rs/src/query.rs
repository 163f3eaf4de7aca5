//! Encoded-query helpers and browse-link construction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Timestamp format accepted by the table API and by callers
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One `<param><op><val>` term of an encoded query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub param: String,
    pub op: String,
    pub val: String,
}

impl Condition {
    pub fn new(param: impl Into<String>, op: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            op: op.into(),
            val: val.into(),
        }
    }

    pub fn eq(param: impl Into<String>, val: impl Into<String>) -> Self {
        Self::new(param, "=", val)
    }

    fn encode(&self) -> String {
        format!(
            "{}{}{}",
            escape_query_value(&self.param),
            escape_query_value(&self.op),
            escape_query_value(&self.val)
        )
    }
}

/// Escape `^` as `^^` so caller text cannot open a new query term
pub fn escape_query_value(value: &str) -> String {
    value.replace('^', "^^")
}

/// Join terms with `^` (logical AND), skipping empty fragments
pub fn join_query<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .filter(|p| !p.as_ref().is_empty())
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("^")
}

pub fn encode_conditions(conditions: &[Condition]) -> String {
    join_query(conditions.iter().map(Condition::encode))
}

/// Inclusive creation-time window in `YYYY-MM-DD HH:MM:SS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// `None` when the window is inverted; malformed timestamps are errors
    pub fn encode(&self, field: &str) -> Result<Option<String>> {
        let start = parse_timestamp(&self.start)?;
        let end = parse_timestamp(&self.end)?;
        if end < start {
            return Ok(None);
        }

        Ok(Some(format!(
            "{}BETWEENjavascript:gs.dateGenerate('{}','{}')@javascript:gs.dateGenerate('{}','{}')",
            field,
            start.format("%Y-%m-%d"),
            start.format("%H:%M:%S"),
            end.format("%Y-%m-%d"),
            end.format("%H:%M:%S"),
        )))
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| ServiceError::validation(format!("Invalid timestamp '{}': {}", raw, e)))
}

/// Classic-UI link to a record
pub fn browse_link(base_url: &str, table: &str, sys_id: &str) -> String {
    format!(
        "{}/now/nav/ui/classic/params/target/{}.do%3Fsys_id%3D{}",
        base_url, table, sys_id
    )
}

/// Reader link to a knowledge article
pub fn kb_view_link(base_url: &str, sys_id: &str) -> String {
    format!(
        "{}/now/nav/ui/classic/params/target/kb_view.do%3Fsys_kb_id%3D{}",
        base_url, sys_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_conditions() {
        let query = encode_conditions(&[
            Condition::eq("number", "CHG0030001"),
            Condition::new("state", "!=", "-5"),
        ]);
        assert_eq!(query, "number=CHG0030001^state!=-5");

        let query = encode_conditions(&[Condition::eq("short_description", "a^ORnumberISNOTEMPTY")]);
        assert_eq!(query, "short_description=a^^ORnumberISNOTEMPTY");
        assert_eq!(join_query(["a=1", "", "b=2"]), "a=1^b=2");
    }

    #[test]
    fn test_window_encoding() {
        let window = TimeWindow::new("2024-01-01 00:00:00", "2024-01-31 23:59:59");
        assert_eq!(
            window.encode("sys_created_on").unwrap().unwrap(),
            "sys_created_onBETWEENjavascript:gs.dateGenerate('2024-01-01','00:00:00')@javascript:gs.dateGenerate('2024-01-31','23:59:59')"
        );
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let window = TimeWindow::new("2024-02-01 00:00:00", "2024-01-01 00:00:00");
        assert!(window.encode("sys_created_on").unwrap().is_none());
    }

    #[test]
    fn test_malformed_window() {
        let window = TimeWindow::new("yesterday", "2024-01-01 00:00:00");
        assert!(matches!(window.encode("x"), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_links() {
        assert_eq!(
            browse_link("https://acme.service-now.com", "change_request", "abc123"),
            "https://acme.service-now.com/now/nav/ui/classic/params/target/change_request.do%3Fsys_id%3Dabc123"
        );
        assert!(kb_view_link("https://x", "k1").ends_with("kb_view.do%3Fsys_kb_id%3Dk1"));
    }
}
