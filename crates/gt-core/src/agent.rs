use std::fmt;
use std::str::FromStr;

/// Prefix used for town-level records (mayor, deacon).
pub const TOWN_PREFIX: &str = "hq";
pub const AGENT_LABEL: &str = "gt:agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentRole {
    Mayor,
    Deacon,
    Witness,
    Refinery,
    Librarian,
    Crew,
    Polecat,
}

impl AgentRole {
    pub const ALL: [AgentRole; 7] = [
        AgentRole::Mayor,
        AgentRole::Deacon,
        AgentRole::Witness,
        AgentRole::Refinery,
        AgentRole::Librarian,
        AgentRole::Crew,
        AgentRole::Polecat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Mayor => "mayor",
            AgentRole::Deacon => "deacon",
            AgentRole::Witness => "witness",
            AgentRole::Refinery => "refinery",
            AgentRole::Librarian => "librarian",
            AgentRole::Crew => "crew",
            AgentRole::Polecat => "polecat",
        }
    }

    /// Town roles have exactly one instance for the whole fleet.
    pub fn is_town_level(&self) -> bool {
        matches!(self, AgentRole::Mayor | AgentRole::Deacon)
    }

    /// Roles with one instance per worker rather than per rig.
    pub fn has_workers(&self) -> bool {
        matches!(self, AgentRole::Crew | AgentRole::Polecat)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "mayor" => Ok(AgentRole::Mayor),
            "deacon" => Ok(AgentRole::Deacon),
            "witness" => Ok(AgentRole::Witness),
            "refinery" => Ok(AgentRole::Refinery),
            "librarian" => Ok(AgentRole::Librarian),
            "crew" => Ok(AgentRole::Crew),
            "polecat" | "polecats" => Ok(AgentRole::Polecat),
            other => Err(format!("Unknown agent role: {other}")),
        }
    }
}

/// Deterministic bead id for one agent instance.
///
/// Rig-level ids are `prefix-rig-role[-worker]`; when the prefix equals the
/// rig name the rig segment is dropped (`prefix-role[-worker]`). Town roles
/// ignore `prefix`/`rig` and use the fleet-wide `hq-<role>`.
pub fn agent_bead_id(prefix: &str, rig: &str, role: AgentRole, worker: Option<&str>) -> String {
    if role.is_town_level() {
        return format!("{TOWN_PREFIX}-{role}");
    }
    let prefix = prefix.trim_end_matches('-');
    let mut id = if prefix == rig {
        format!("{prefix}-{role}")
    } else {
        format!("{prefix}-{rig}-{role}")
    };
    if let Some(worker) = worker.filter(|worker| !worker.is_empty()) {
        id.push('-');
        id.push_str(worker);
    }
    id
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAgentId {
    pub rig: Option<String>,
    pub role: AgentRole,
    pub worker: Option<String>,
}

/// Inverse of [`agent_bead_id`] for ids under a known prefix. Returns `None`
/// for ids that do not follow the agent naming scheme.
pub fn parse_agent_bead_id(id: &str, prefix: &str, rig: &str) -> Option<ParsedAgentId> {
    if let Some(role) = id.strip_prefix(&format!("{TOWN_PREFIX}-")) {
        let role = role.parse::<AgentRole>().ok()?;
        return role.is_town_level().then_some(ParsedAgentId {
            rig: None,
            role,
            worker: None,
        });
    }
    let prefix = prefix.trim_end_matches('-');
    let rest = id.strip_prefix(prefix)?.strip_prefix('-')?;
    let rest = if prefix == rig {
        rest
    } else {
        rest.strip_prefix(rig)?.strip_prefix('-')?
    };
    let (role_text, worker) = match rest.split_once('-') {
        Some((role, worker)) => (role, Some(worker.to_string())),
        None => (rest, None),
    };
    let role = role_text.parse::<AgentRole>().ok()?;
    if role.is_town_level() || role.has_workers() != worker.is_some() {
        return None;
    }
    Some(ParsedAgentId {
        rig: Some(rig.to_string()),
        role,
        worker,
    })
}
