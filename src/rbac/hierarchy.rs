//! Role hierarchy with a precomputed transitive closure.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use super::{PermissionSet, Role};
use crate::{Error, Result};

/// Static mapping from a role to every role it subsumes, itself included.
///
/// Built from direct edges (`manager: [employee]`); the closure is computed
/// once and the structure is read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    closure: HashMap<Role, PermissionSet>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

impl RoleHierarchy {
    /// Build from direct subsumption edges.
    ///
    /// Roles that only appear on the right-hand side are known roles that
    /// subsume nothing but themselves.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the edges contain a cycle.
    pub fn from_edges(edges: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
        for (role, subsumed) in edges {
            graph
                .entry(role.as_str())
                .or_default()
                .extend(subsumed.iter().map(String::as_str));
            for s in subsumed {
                graph.entry(s.as_str()).or_default();
            }
        }

        let mut state: HashMap<&str, Visit> = HashMap::new();
        let mut expanded: HashMap<&str, HashSet<&str>> = HashMap::new();
        let mut roots: Vec<&str> = graph.keys().copied().collect();
        roots.sort_unstable();
        for role in roots {
            Self::expand(role, &graph, &mut state, &mut expanded)?;
        }

        let closure = expanded
            .into_iter()
            .map(|(role, set)| {
                let perms = set.into_iter().map(Role::new).collect();
                (Role::new(role), perms)
            })
            .collect::<HashMap<_, _>>();
        debug!(roles = closure.len(), "Role hierarchy computed");
        Ok(Self { closure })
    }

    /// Flat hierarchy: every role subsumes only itself.
    pub fn flat<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        let closure = roles
            .into_iter()
            .map(|r| {
                let role = r.into();
                let perms = std::iter::once(role.clone()).collect();
                (role, perms)
            })
            .collect();
        Self { closure }
    }

    fn expand<'a>(
        role: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        state: &mut HashMap<&'a str, Visit>,
        expanded: &mut HashMap<&'a str, HashSet<&'a str>>,
    ) -> Result<()> {
        match state.get(role) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                return Err(Error::Config(format!(
                    "Role hierarchy contains a cycle through '{role}'"
                )));
            }
            None => {}
        }
        state.insert(role, Visit::InProgress);

        let mut set = HashSet::from([role]);
        for &child in graph.get(role).map(Vec::as_slice).unwrap_or_default() {
            Self::expand(child, graph, state, expanded)?;
            if let Some(sub) = expanded.get(child) {
                set.extend(sub.iter().copied());
            }
        }

        state.insert(role, Visit::Done);
        expanded.insert(role, set);
        Ok(())
    }

    /// Expanded permissions of `role`; `None` for an unknown role.
    #[must_use]
    pub fn permissions(&self, role: &Role) -> Option<&PermissionSet> {
        self.closure.get(role)
    }

    /// Whether `role` is declared in the hierarchy
    #[must_use]
    pub fn contains(&self, role: &Role) -> bool {
        self.closure.contains_key(role)
    }

    /// Whether `role` subsumes `other` (reflexive)
    #[must_use]
    pub fn subsumes(&self, role: &Role, other: &Role) -> bool {
        self.closure.get(role).is_some_and(|p| p.contains(other))
    }

    /// All known roles, sorted
    #[must_use]
    pub fn roles(&self) -> Vec<&Role> {
        let mut roles: Vec<&Role> = self.closure.keys().collect();
        roles.sort();
        roles
    }
}
