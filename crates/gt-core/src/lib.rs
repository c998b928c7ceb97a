//! Shared model for the town doctor: version strings, the town/rig/worktree
//! layout, agent bead naming and issue classification.

pub mod agent;
pub mod fsutil;
pub mod issue;
pub mod town;
pub mod version;

pub use agent::{
    agent_bead_id, parse_agent_bead_id, AgentRole, ParsedAgentId, AGENT_LABEL, TOWN_PREFIX,
};
pub use fsutil::atomic_write;
pub use issue::{should_be_ephemeral, EphemeralReason, Issue, IssueStatus};
pub use town::{
    has_store_setup, ListingError, RegistryError, Rig, RigRegistry, Town, Worktree, WorktreeKind,
    WorktreeScan,
};
pub use version::{compare, compare_str, Version};
