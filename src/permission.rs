use crate::catalog::schema::Column;
use serde::{Deserialize, Serialize};

/// Who may edit a table or a column.
///
/// Semantics are intentionally strict:
/// - `Flag(true)` allows everyone, `Flag(false)` allows no one.
/// - `Principals` allows only the listed identifiers, compared
///   case-insensitively; with no resolvable principal it allows no one.
/// - A column-level policy replaces the table-level policy outright. The two
///   are never merged.
/// - Content columns are never editable, whatever either policy says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditPolicy {
    Flag(bool),
    Principals(Vec<String>),
}

impl EditPolicy {
    pub fn everyone() -> Self {
        EditPolicy::Flag(true)
    }

    pub fn nobody() -> Self {
        EditPolicy::Flag(false)
    }

    pub fn principals(ids: &[&str]) -> Self {
        EditPolicy::Principals(ids.iter().map(|id| (*id).to_string()).collect())
    }

    pub fn allows(&self, principal: Option<&Principal>) -> bool {
        match self {
            EditPolicy::Flag(flag) => *flag,
            EditPolicy::Principals(ids) => match principal {
                Some(principal) => ids.iter().any(|id| principal.matches(id)),
                None => false,
            },
        }
    }
}

impl Default for EditPolicy {
    fn default() -> Self {
        EditPolicy::everyone()
    }
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.id.to_lowercase() == candidate.to_lowercase()
    }
}

pub trait PrincipalResolver: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;
}

/// Resolver that always answers with the same principal (or none).
#[derive(Debug, Clone, Default)]
pub struct StaticPrincipal(Option<Principal>);

impl StaticPrincipal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Some(Principal::new(id)))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl PrincipalResolver for StaticPrincipal {
    fn current_principal(&self) -> Option<Principal> {
        self.0.clone()
    }
}

pub fn table_editable(table_policy: &EditPolicy, principal: Option<&Principal>) -> bool {
    table_policy.allows(principal)
}

pub fn column_editable(
    column: &Column,
    table_policy: &EditPolicy,
    principal: Option<&Principal>,
) -> bool {
    if column.is_content() {
        return false;
    }
    match &column.editable {
        Some(policy) => policy.allows(principal),
        None => table_policy.allows(principal),
    }
}
