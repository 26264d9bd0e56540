use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::RwLock;

/// Why a group operation was refused. Reply wording is chosen per command by
/// the session handlers; this enum only names the condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupError {
    NotFound,
    AlreadyExists,
    AlreadyJoined,
    NotAMember,
    NotOwner,
    KickSelf,
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::NotFound => write!(f, "group does not exist"),
            GroupError::AlreadyExists => write!(f, "group already exists"),
            GroupError::AlreadyJoined => write!(f, "already a member"),
            GroupError::NotAMember => write!(f, "not a member"),
            GroupError::NotOwner => write!(f, "not the owner"),
            GroupError::KickSelf => write!(f, "cannot kick yourself"),
        }
    }
}

/// What happened when a member left, with the usernames still to be
/// notified. Owner departure disbands the whole group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left { remaining: Vec<String> },
    Disbanded { evicted: Vec<String> },
}

struct Group {
    owner: String,
    members: HashSet<String>,
}

impl Group {
    fn members_except(&self, username: &str) -> Vec<String> {
        self.members
            .iter()
            .filter(|member| member.as_str() != username)
            .cloned()
            .collect()
    }
}

/// Registry of live groups. Members are referenced by username; the reverse
/// "which groups has this session joined" association is answered from here
/// too, so membership has exactly one home and nothing dangles.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Group>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        GroupRegistry::default()
    }

    /// Creates a group with `owner` as its sole member. The existence check
    /// and the insert run under one write lock.
    pub async fn create(&self, name: &str, owner: &str) -> Result<(), GroupError> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(name) {
            return Err(GroupError::AlreadyExists);
        }
        let mut members = HashSet::new();
        members.insert(owner.to_string());
        groups.insert(
            name.to_string(),
            Group {
                owner: owner.to_string(),
                members,
            },
        );
        Ok(())
    }

    /// Sorted names of every live group.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Adds `username` to the group and returns the other members, so the
    /// caller can fan out a join notice.
    pub async fn join(&self, name: &str, username: &str) -> Result<Vec<String>, GroupError> {
        let mut groups = self.groups.write().await;
        let group = groups.get_mut(name).ok_or(GroupError::NotFound)?;
        if !group.members.insert(username.to_string()) {
            return Err(GroupError::AlreadyJoined);
        }
        Ok(group.members_except(username))
    }

    /// The other members of a group `username` belongs to, for group
    /// broadcast fan-out.
    pub async fn members_except(
        &self,
        name: &str,
        username: &str,
    ) -> Result<Vec<String>, GroupError> {
        let groups = self.groups.read().await;
        let group = groups.get(name).ok_or(GroupError::NotFound)?;
        if !group.members.contains(username) {
            return Err(GroupError::NotAMember);
        }
        Ok(group.members_except(username))
    }

    pub async fn leave(&self, name: &str, username: &str) -> Result<LeaveOutcome, GroupError> {
        let mut groups = self.groups.write().await;
        Self::leave_locked(&mut groups, name, username)
    }

    fn leave_locked(
        groups: &mut HashMap<String, Group>,
        name: &str,
        username: &str,
    ) -> Result<LeaveOutcome, GroupError> {
        let group = groups.get_mut(name).ok_or(GroupError::NotFound)?;
        if !group.members.contains(username) {
            return Err(GroupError::NotAMember);
        }
        if group.owner == username {
            let evicted = group.members_except(username);
            groups.remove(name);
            Ok(LeaveOutcome::Disbanded { evicted })
        } else {
            group.members.remove(username);
            Ok(LeaveOutcome::Left {
                remaining: group.members_except(username),
            })
        }
    }

    /// Removes `target` from the group on the owner's behalf.
    pub async fn kick(&self, name: &str, by: &str, target: &str) -> Result<(), GroupError> {
        let mut groups = self.groups.write().await;
        let group = groups.get_mut(name).ok_or(GroupError::NotFound)?;
        if group.owner != by {
            return Err(GroupError::NotOwner);
        }
        if !group.members.contains(target) {
            return Err(GroupError::NotAMember);
        }
        if target == by {
            return Err(GroupError::KickSelf);
        }
        group.members.remove(target);
        Ok(())
    }

    /// Terminate-time cascade: applies leave semantics to every group
    /// `username` belongs to, in name order, and returns the per-group
    /// outcomes so the caller can deliver the notifications.
    pub async fn purge(&self, username: &str) -> Vec<(String, LeaveOutcome)> {
        let mut groups = self.groups.write().await;
        let mut joined: Vec<String> = groups
            .iter()
            .filter(|(_, group)| group.members.contains(username))
            .map(|(name, _)| name.clone())
            .collect();
        joined.sort();

        let mut outcomes = Vec::new();
        for name in joined {
            if let Ok(outcome) = Self::leave_locked(&mut groups, &name, username) {
                outcomes.push((name, outcome));
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_names() {
        let registry = GroupRegistry::new();
        assert!(registry.create("team", "alice").await.is_ok());
        assert_eq!(
            registry.create("team", "bob").await,
            Err(GroupError::AlreadyExists)
        );
        assert_eq!(registry.list().await, vec!["team"]);
    }

    #[tokio::test]
    async fn test_owner_is_a_member_from_creation() {
        let registry = GroupRegistry::new();
        registry.create("team", "alice").await.unwrap();
        assert_eq!(
            registry.members_except("team", "alice").await,
            Ok(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_join_returns_the_other_members() {
        let registry = GroupRegistry::new();
        registry.create("team", "alice").await.unwrap();
        assert_eq!(
            registry.join("team", "bob").await,
            Ok(vec!["alice".to_string()])
        );
        assert_eq!(
            registry.join("team", "bob").await,
            Err(GroupError::AlreadyJoined)
        );
        assert_eq!(
            registry.join("ghosts", "bob").await,
            Err(GroupError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_member_leave_keeps_the_group() {
        let registry = GroupRegistry::new();
        registry.create("team", "alice").await.unwrap();
        registry.join("team", "bob").await.unwrap();
        assert_eq!(
            registry.leave("team", "bob").await,
            Ok(LeaveOutcome::Left {
                remaining: vec!["alice".to_string()]
            })
        );
        assert_eq!(registry.list().await, vec!["team"]);
        assert_eq!(
            registry.leave("team", "bob").await,
            Err(GroupError::NotAMember)
        );
    }

    #[tokio::test]
    async fn test_owner_leave_disbands() {
        let registry = GroupRegistry::new();
        registry.create("team", "alice").await.unwrap();
        registry.join("team", "bob").await.unwrap();
        registry.join("team", "carol").await.unwrap();
        match registry.leave("team", "alice").await.unwrap() {
            LeaveOutcome::Disbanded { evicted } => {
                assert_eq!(sorted(evicted), vec!["bob", "carol"]);
            }
            other => panic!("expected disband, got {:?}", other),
        }
        assert!(registry.list().await.is_empty());
        assert_eq!(
            registry.members_except("team", "bob").await,
            Err(GroupError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_kick_authorization() {
        let registry = GroupRegistry::new();
        registry.create("team", "alice").await.unwrap();
        registry.join("team", "bob").await.unwrap();

        assert_eq!(
            registry.kick("team", "bob", "alice").await,
            Err(GroupError::NotOwner)
        );
        assert_eq!(
            registry.kick("team", "alice", "alice").await,
            Err(GroupError::KickSelf)
        );
        assert_eq!(
            registry.kick("team", "alice", "ghost").await,
            Err(GroupError::NotAMember)
        );
        assert_eq!(
            registry.kick("ghosts", "alice", "bob").await,
            Err(GroupError::NotFound)
        );

        assert_eq!(registry.kick("team", "alice", "bob").await, Ok(()));
        assert_eq!(
            registry.members_except("team", "bob").await,
            Err(GroupError::NotAMember)
        );
    }

    #[tokio::test]
    async fn test_purge_applies_leave_semantics_per_group() {
        let registry = GroupRegistry::new();
        registry.create("owned", "alice").await.unwrap();
        registry.join("owned", "bob").await.unwrap();
        registry.create("joined", "bob").await.unwrap();
        registry.join("joined", "alice").await.unwrap();

        let outcomes = registry.purge("alice").await;
        assert_eq!(
            outcomes,
            vec![
                (
                    "joined".to_string(),
                    LeaveOutcome::Left {
                        remaining: vec!["bob".to_string()]
                    }
                ),
                (
                    "owned".to_string(),
                    LeaveOutcome::Disbanded {
                        evicted: vec!["bob".to_string()]
                    }
                ),
            ]
        );
        assert_eq!(registry.list().await, vec!["joined"]);
        // bob keeps his own group, alice is gone everywhere
        assert_eq!(
            registry.members_except("joined", "bob").await,
            Ok(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_purge_with_no_memberships_is_a_no_op() {
        let registry = GroupRegistry::new();
        registry.create("team", "alice").await.unwrap();
        assert!(registry.purge("ghost").await.is_empty());
        assert_eq!(registry.list().await, vec!["team"]);
    }
}
