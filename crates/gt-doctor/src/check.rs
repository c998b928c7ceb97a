use crate::context::CheckContext;
use crate::error::FixError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Warning => "warning",
            CheckStatus::Error => "error",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "✓",
            CheckStatus::Warning => "⚠",
            CheckStatus::Error => "✗",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Core,
    Routing,
    Storage,
    Agents,
    Patrol,
    Work,
    Tools,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Core,
        Category::Routing,
        Category::Storage,
        Category::Agents,
        Category::Patrol,
        Category::Work,
        Category::Tools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::Routing => "routing",
            Category::Storage => "storage",
            Category::Agents => "agents",
            Category::Patrol => "patrol",
            Category::Work => "work",
            Category::Tools => "tools",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::Core => "Core",
            Category::Routing => "Routing",
            Category::Storage => "Storage",
            Category::Agents => "Agents",
            Category::Patrol => "Patrol",
            Category::Work => "Work",
            Category::Tools => "Tools",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown category: {value}"))
    }
}

/// Outcome of one check execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    pub category: Category,
    /// Set by the doctor when a fix turned this result OK.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fixed: bool,
}

impl CheckResult {
    pub fn new<C: Check + ?Sized>(check: &C, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: check.name().to_string(),
            status,
            message: message.into(),
            details: Vec::new(),
            fix_hint: None,
            category: check.category(),
            fixed: false,
        }
    }

    pub fn ok<C: Check + ?Sized>(check: &C, message: impl Into<String>) -> Self {
        Self::new(check, CheckStatus::Ok, message)
    }

    pub fn warning<C: Check + ?Sized>(check: &C, message: impl Into<String>) -> Self {
        Self::new(check, CheckStatus::Warning, message)
    }

    pub fn error<C: Check + ?Sized>(check: &C, message: impl Into<String>) -> Self {
        Self::new(check, CheckStatus::Error, message)
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

/// A health check. `run` must be read-only: the doctor calls it again after
/// `fix` to verify the repair.
pub trait Check {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn category(&self) -> Category;

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult;

    fn can_fix(&self) -> bool {
        false
    }

    fn fix(&self, _ctx: &CheckContext<'_>) -> Result<(), FixError> {
        Err(FixError::CannotFix)
    }
}
