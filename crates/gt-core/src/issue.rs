use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Issue types whose lifecycle is operational and must live in the
/// ephemeral schema.
pub const EPHEMERAL_TYPES: [&str; 5] = ["merge-request", "agent", "event", "gate", "slot"];

pub const OPERATIONAL_LABELS: [&str; 6] = [
    "gt:agent",
    "gt:patrol",
    "gt:mail",
    "gt:handoff",
    "gt:agent-state",
    "gt:wisp",
];

const OPERATIONAL_LABEL_PREFIXES: [&str; 2] = ["patrol:", "mail:"];

const PATROL_TITLE_PHRASES: [&str; 5] = [
    "patrol cycle",
    "patrol report",
    "witness patrol",
    "deacon patrol",
    "refinery patrol",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
    Hooked,
    Pinned,
    Tombstone,
}

impl Default for IssueStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Blocked => "blocked",
            IssueStatus::Deferred => "deferred",
            IssueStatus::Closed => "closed",
            IssueStatus::Hooked => "hooked",
            IssueStatus::Pinned => "pinned",
            IssueStatus::Tombstone => "tombstone",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, IssueStatus::Closed | IssueStatus::Tombstone)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "open" | "" => Ok(IssueStatus::Open),
            "in_progress" | "in-progress" | "inprogress" => Ok(IssueStatus::InProgress),
            "blocked" => Ok(IssueStatus::Blocked),
            "deferred" => Ok(IssueStatus::Deferred),
            "closed" | "done" => Ok(IssueStatus::Closed),
            "hooked" => Ok(IssueStatus::Hooked),
            "pinned" => Ok(IssueStatus::Pinned),
            "tombstone" => Ok(IssueStatus::Tombstone),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

/// One record as it appears in the git-tracked export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_status")]
    pub status: IssueStatus,
    #[serde(default)]
    pub issue_type: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub ephemeral: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralReason {
    Type,
    Label,
    Title,
    Identifier,
}

impl fmt::Display for EphemeralReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EphemeralReason::Type => "operational type",
            EphemeralReason::Label => "operational label",
            EphemeralReason::Title => "patrol title",
            EphemeralReason::Identifier => "patrol molecule id",
        })
    }
}

/// Decides whether a persisted record should have been ephemeral.
pub fn should_be_ephemeral(
    id: &str,
    issue_type: &str,
    title: &str,
    labels: &[String],
) -> Option<EphemeralReason> {
    let issue_type = issue_type.trim().to_lowercase();
    if EPHEMERAL_TYPES.contains(&issue_type.as_str()) {
        return Some(EphemeralReason::Type);
    }
    if labels.iter().any(|label| is_operational_label(label)) {
        return Some(EphemeralReason::Label);
    }
    let title = title.to_lowercase();
    if PATROL_TITLE_PHRASES
        .iter()
        .any(|phrase| title.contains(phrase))
    {
        return Some(EphemeralReason::Title);
    }
    if is_patrol_molecule_id(id) {
        return Some(EphemeralReason::Identifier);
    }
    None
}

pub fn is_operational_label(label: &str) -> bool {
    let label = label.trim();
    OPERATIONAL_LABELS.contains(&label)
        || OPERATIONAL_LABEL_PREFIXES
            .iter()
            .any(|prefix| label.starts_with(prefix))
}

/// `gt-mol-witness-patrol-x1y2`, `hq-wisp-abc` and friends.
pub fn is_patrol_molecule_id(id: &str) -> bool {
    let lowered = id.to_lowercase();
    let mut segments = lowered.split('-').skip(1);
    while let Some(segment) = segments.next() {
        if segment == "wisp" {
            return true;
        }
        if segment == "mol" {
            let role = segments.next();
            let kind = segments.next();
            if matches!(role, Some("deacon" | "witness" | "refinery")) && kind == Some("patrol") {
                return true;
            }
        }
    }
    false
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<IssueStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .and_then(|value| value.parse().ok())
        .unwrap_or_default())
}

/// The export has carried the flag as `true`, `1` and `"1"` over time.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
        _ => false,
    })
}
