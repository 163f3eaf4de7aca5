//! Record types exchanged with the table API.
//!
//! Reads tolerate both plain-string and `{value, link}` / `{display_value,
//! link}` encodings of reference fields, since the shape depends on the
//! `sysparm_display_value` and `sysparm_exclude_reference_link` flags.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::query::TIMESTAMP_FORMAT;

/// Envelope of every table API response
#[derive(Debug, Deserialize)]
pub(crate) struct TableResponse<T> {
    pub result: T,
}

/// Deserialize a field that may be a string, a number, null or a reference object
pub(crate) fn flexible_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Object(map)) => map
            .get("value")
            .or_else(|| map.get("display_value"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(other) => other.to_string(),
    })
}

fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = flexible_string(deserializer)?;
    Ok(Some(raw).filter(|s| !s.trim().is_empty()))
}

/// CMDB configuration item snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationItem {
    #[serde(default, deserialize_with = "flexible_string")]
    pub sys_id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub name: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub sys_class_name: String,
    #[serde(default, deserialize_with = "optional_string")]
    pub ip_address: Option<String>,
}

/// One end of a relationship edge, as denormalized on the edge row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint<'a> {
    pub sys_id: &'a str,
    pub name: &'a str,
    pub class: &'a str,
    pub ip_address: Option<&'a str>,
}

impl Endpoint<'_> {
    /// A node with neither name nor class cannot be described
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() && self.class.trim().is_empty()
    }
}

/// A `cmdb_rel_ci` row with dot-walked display fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    #[serde(default, deserialize_with = "flexible_string")]
    pub parent: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub child: String,
    #[serde(rename = "parent.name", default, deserialize_with = "flexible_string")]
    pub parent_name: String,
    #[serde(rename = "parent.sys_class_name", default, deserialize_with = "flexible_string")]
    pub parent_class: String,
    #[serde(rename = "parent.ip_address", default, deserialize_with = "optional_string")]
    pub parent_ip: Option<String>,
    #[serde(rename = "child.name", default, deserialize_with = "flexible_string")]
    pub child_name: String,
    #[serde(rename = "child.sys_class_name", default, deserialize_with = "flexible_string")]
    pub child_class: String,
    #[serde(rename = "child.ip_address", default, deserialize_with = "optional_string")]
    pub child_ip: Option<String>,
    #[serde(rename = "type.name", default, deserialize_with = "flexible_string")]
    pub type_name: String,
}

impl RelationshipEdge {
    pub fn parent_end(&self) -> Endpoint<'_> {
        Endpoint {
            sys_id: &self.parent,
            name: &self.parent_name,
            class: &self.parent_class,
            ip_address: self.parent_ip.as_deref(),
        }
    }

    pub fn child_end(&self) -> Endpoint<'_> {
        Endpoint {
            sys_id: &self.child,
            name: &self.child_name,
            class: &self.child_class,
            ip_address: self.child_ip.as_deref(),
        }
    }

    /// Forward reading of the relation type: `"Depends on::Used by"` gives `"Depends on"`
    pub fn relation_label(&self) -> &str {
        self.type_name.split(':').next().unwrap_or_default().trim()
    }
}

/// Change request as read back with display values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    #[serde(default, deserialize_with = "flexible_string")]
    pub sys_id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub number: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub short_description: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub description: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub implementation_plan: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub backout_plan: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub test_plan: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub assignment_group: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub chg_model: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub cmdb_ci: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub state: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub start_date: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub end_date: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub approval: String,
    #[serde(default, skip_deserializing)]
    pub change_request_link: String,
}

/// Payload of a change-request creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewChangeRequest {
    pub short_description: String,
    pub description: String,
    pub cmdb_ci: String,
    pub chg_model: String,
    pub implementation_plan: String,
    pub backout_plan: String,
    pub test_plan: String,
    pub risk_impact_analysis: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

impl NewChangeRequest {
    /// Schedule a one-hour window starting thirty minutes after `now`
    pub fn scheduled_from(mut self, now: DateTime<Utc>) -> Self {
        let start = now + Duration::minutes(30);
        let end = start + Duration::hours(1);
        self.start_date = start.format(TIMESTAMP_FORMAT).to_string();
        self.end_date = end.format(TIMESTAMP_FORMAT).to_string();
        self
    }
}

/// Payload of a change-task creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewChangeTask {
    pub short_description: String,
    pub description: String,
    pub assignment_group: String,
    /// sys_id of the parent change request
    pub change_request: String,
    pub priority: String,
}

/// Historical change task as listed under a change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeTaskSummary {
    #[serde(default, deserialize_with = "flexible_string")]
    pub number: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub short_description: String,
    #[serde(rename = "assignment_group.name", default, deserialize_with = "flexible_string")]
    pub assignment_group: String,
}

/// Identifier and link of a record the client just wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    pub number: String,
    pub sys_id: String,
    pub target_link: String,
}

/// Attachment metadata returned after an upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    #[serde(default, deserialize_with = "flexible_string")]
    pub sys_id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub file_name: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub content_type: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub download_link: String,
}

/// Generic ticket row (incident, problem, ...) with display values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(default, deserialize_with = "flexible_string")]
    pub sys_id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub number: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default, skip_deserializing)]
    pub ticket_link: String,
}

/// Field updates applied to a ticket; blank fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub work_notes: String,
    #[serde(default)]
    pub assignment_group: String,
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default)]
    pub resolution_notes: String,
    #[serde(default)]
    pub resolve: bool,
}

impl TicketUpdate {
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        let mut put = |key: &str, value: &str| {
            if !value.trim().is_empty() {
                payload.insert(key.to_string(), Value::String(value.to_string()));
            }
        };

        put("comments", &self.comments);
        put("work_notes", &self.work_notes);
        put("assignment_group", &self.assignment_group);
        put("assigned_to", &self.assigned_to);

        if self.resolve {
            payload.insert("close_notes".into(), Value::String(self.resolution_notes.clone()));
            payload.insert("state".into(), Value::String("6".into()));
            payload.insert("close_code".into(), Value::String("Solved (Permanently)".into()));
        }
        payload
    }

    pub fn is_empty(&self) -> bool {
        self.to_payload().is_empty()
    }

    /// Comments and work notes append a journal entry on every write
    pub fn appends_journal(&self) -> bool {
        !self.comments.trim().is_empty() || !self.work_notes.trim().is_empty()
    }
}

/// Knowledge article row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeArticle {
    #[serde(default, deserialize_with = "flexible_string")]
    pub sys_id: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub number: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub short_description: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub text: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub kb_category: String,
    #[serde(default, deserialize_with = "flexible_string")]
    pub workflow_state: String,
    #[serde(default, skip_deserializing)]
    pub kb_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_edge_accepts_reference_objects_and_strings() {
        let edge: RelationshipEdge = serde_json::from_value(json!({
            "parent": {"link": "https://x/api/now/table/cmdb_ci/p1", "value": "p1"},
            "child": "c1",
            "parent.name": "bond_trade_ny",
            "parent.sys_class_name": "Application",
            "parent.ip_address": "",
            "child.name": "lnux100",
            "child.sys_class_name": "Linux Server",
            "child.ip_address": "10.0.0.5",
            "type.name": "Runs on::Runs"
        }))
        .unwrap();

        assert_eq!(edge.parent, "p1");
        assert_eq!(edge.child, "c1");
        assert_eq!(edge.parent_ip, None);
        assert_eq!(edge.child_end().ip_address, Some("10.0.0.5"));
        assert_eq!(edge.relation_label(), "Runs on");
        assert!(!edge.parent_end().is_blank());
    }

    #[test]
    fn test_blank_endpoint() {
        let edge: RelationshipEdge = serde_json::from_value(json!({
            "parent": "p1", "child": "",
            "parent.name": "a", "child.name": "", "child.sys_class_name": ""
        }))
        .unwrap();
        assert!(edge.child_end().is_blank());
    }

    #[test]
    fn test_schedule_window() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let change = NewChangeRequest::default().scheduled_from(now);
        assert_eq!(change.start_date, "2024-05-01 10:30:00");
        assert_eq!(change.end_date, "2024-05-01 11:30:00");
    }

    #[test]
    fn test_ticket_update_payload() {
        let update = TicketUpdate {
            comments: "looking".into(),
            work_notes: "  ".into(),
            resolve: true,
            resolution_notes: "rebooted".into(),
            ..TicketUpdate::default()
        };
        let payload = update.to_payload();

        assert_eq!(payload.get("comments"), Some(&json!("looking")));
        assert!(!payload.contains_key("work_notes"));
        assert_eq!(payload.get("state"), Some(&json!("6")));
        assert_eq!(payload.get("close_code"), Some(&json!("Solved (Permanently)")));
        assert!(TicketUpdate::default().is_empty());
    }

    #[test]
    fn test_change_request_display_values() {
        let change: ChangeRequest = serde_json::from_value(json!({
            "sys_id": "s1",
            "number": "CHG0030001",
            "assignment_group": {"display_value": "Network", "link": "https://x"},
            "chg_model": "Normal"
        }))
        .unwrap();
        assert_eq!(change.assignment_group, "Network");
        assert_eq!(change.implementation_plan, "");
    }
}
