use crate::domain::{DomainError, DomainResult, Role};
use std::collections::HashSet;

/// Deepest role chain the engine will follow
pub const MAX_ROLE_DEPTH: usize = 32;

/// One role of an ancestor chain, nearest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLink {
    pub id: String,
    pub name: String,
    pub parent_role_id: Option<String>,
    pub campus_id: Option<String>,
    pub is_super_role: bool,
    pub archived: bool,
}

impl From<&Role> for RoleLink {
    fn from(role: &Role) -> Self {
        RoleLink {
            id: role.id.clone(),
            name: role.name.clone(),
            parent_role_id: role.parent_role_id.clone(),
            campus_id: role.campus_id.clone(),
            is_super_role: role.is_super_role,
            archived: role.is_archived(),
        }
    }
}

/// Role about to be placed beneath a parent
#[derive(Debug, Clone, Copy)]
pub struct LinkCandidate<'a> {
    pub role_id: &'a str,
    pub name: &'a str,
    pub campus_id: Option<&'a str>,
    /// Levels the role brings along, itself included; 1 for a role without children
    pub subtree_depth: usize,
}

/// Follow parent links from `start_role_id`
///
/// Stops at a missing role, right after the first repeated id, or once the
/// chain holds `MAX_ROLE_DEPTH + 1` links.
pub fn collect_ancestor_chain<F>(start_role_id: &str, mut lookup: F) -> Vec<RoleLink>
where
    F: FnMut(&str) -> Option<RoleLink>,
{
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(start_role_id.to_string());

    while let Some(role_id) = next {
        if chain.len() > MAX_ROLE_DEPTH {
            break;
        }
        let Some(link) = lookup(&role_id) else {
            break;
        };
        next = link.parent_role_id.clone();
        let repeated = !seen.insert(link.id.clone());
        chain.push(link);
        if repeated {
            break;
        }
    }

    chain
}

/// Count the levels hanging from `role_id`, the role itself included
///
/// `children` lists the direct children of a role. Counting stops at
/// `MAX_ROLE_DEPTH + 1` levels and a repeated id ends its branch.
pub fn measure_subtree_depth<F>(role_id: &str, mut children: F) -> usize
where
    F: FnMut(&str) -> Vec<String>,
{
    let mut seen = HashSet::from([role_id.to_string()]);
    let mut level = vec![role_id.to_string()];
    let mut depth = 0;

    while !level.is_empty() && depth <= MAX_ROLE_DEPTH {
        depth += 1;
        let mut next = Vec::new();
        for id in &level {
            for child in children(id) {
                if seen.insert(child.clone()) {
                    next.push(child);
                }
            }
        }
        level = next;
    }

    depth
}

/// Check that `candidate` may be linked beneath `parent_role_id`
///
/// `chain` is the ancestor chain of the parent, starting with the parent
/// itself, as produced by [`collect_ancestor_chain`] or the equivalent query.
/// The parent's chain plus the candidate's own subtree must fit in
/// `MAX_ROLE_DEPTH` levels.
pub fn validate_parent_link(
    candidate: &LinkCandidate<'_>,
    parent_role_id: &str,
    chain: &[RoleLink],
) -> DomainResult<()> {
    let parent = match chain.first() {
        Some(link) if link.id == parent_role_id => link,
        _ => {
            return Err(DomainError::InvalidParent(format!(
                "parent role {} does not exist",
                parent_role_id
            )))
        }
    };

    if parent.archived {
        return Err(DomainError::InvalidParent(format!(
            "parent role {} is archived",
            parent.name
        )));
    }

    if parent.is_super_role {
        return Err(DomainError::InvalidParent(
            "the super-role cannot be a parent".to_string(),
        ));
    }

    if let Some(parent_campus) = parent.campus_id.as_deref() {
        if candidate.campus_id != Some(parent_campus) {
            return Err(DomainError::InvalidParent(format!(
                "parent role {} belongs to another campus",
                parent.name
            )));
        }
    }

    let mut seen = HashSet::new();
    for link in chain {
        let same_role = link.id == candidate.role_id
            || (link.name == candidate.name && link.campus_id.as_deref() == candidate.campus_id);
        if same_role {
            return Err(DomainError::InvalidParent(format!(
                "linking {} beneath {} would create a cycle",
                candidate.name, parent.name
            )));
        }
        if !seen.insert(link.id.as_str()) {
            return Err(DomainError::InvalidParent(format!(
                "ancestor chain of {} repeats role {}",
                parent.name, link.id
            )));
        }
    }

    if chain.len() + candidate.subtree_depth.max(1) > MAX_ROLE_DEPTH {
        return Err(DomainError::InvalidParent(format!(
            "role hierarchy would exceed {} levels",
            MAX_ROLE_DEPTH
        )));
    }

    Ok(())
}
