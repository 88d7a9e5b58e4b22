//! Directed emergency-contact graph.
//!
//! Every registered user has an entry (possibly empty), so an id is a valid
//! endpoint exactly when it is a key here. Edges keep insertion order.

use std::collections::HashMap;

use safewatch_shared::UserId;

use crate::error::{HubError, Result};

#[derive(Debug, Default)]
pub struct ContactGraph {
    edges: HashMap<UserId, Vec<UserId>>,
}

impl ContactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty adjacency list for a newly registered user.
    pub fn insert_owner(&mut self, owner: UserId) {
        self.edges.entry(owner).or_default();
    }

    /// Add the edge `owner -> contact`.
    ///
    /// Self edges are accepted.
    pub fn add(&mut self, owner: &UserId, contact: &UserId) -> Result<()> {
        if !self.edges.contains_key(contact) {
            return Err(HubError::UnknownUser(contact.clone()));
        }
        let list = self
            .edges
            .get_mut(owner)
            .ok_or_else(|| HubError::UnknownUser(owner.clone()))?;

        if list.contains(contact) {
            return Err(HubError::AlreadyExists {
                owner: owner.clone(),
                contact: contact.clone(),
            });
        }
        list.push(contact.clone());
        Ok(())
    }

    /// Contacts of `owner` in the order they were added. Empty for unknown
    /// owners.
    pub fn list(&self, owner: &UserId) -> &[UserId] {
        self.edges.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(ids: &[&str]) -> ContactGraph {
        let mut graph = ContactGraph::new();
        for id in ids {
            graph.insert_owner(UserId::from(*id));
        }
        graph
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut graph = graph_with(&["a", "b", "c", "d"]);
        let a = UserId::from("a");
        for id in ["d", "b", "c"] {
            graph.add(&a, &UserId::from(id)).unwrap();
        }

        let listed: Vec<&str> = graph.list(&a).iter().map(UserId::as_str).collect();
        assert_eq!(listed, vec!["d", "b", "c"]);
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut graph = graph_with(&["a", "b"]);
        let (a, b) = (UserId::from("a"), UserId::from("b"));
        graph.add(&a, &b).unwrap();

        assert!(matches!(
            graph.add(&a, &b),
            Err(HubError::AlreadyExists { .. })
        ));
        assert_eq!(graph.list(&a), &[b]);
    }

    #[test]
    fn test_edges_are_directed() {
        let mut graph = graph_with(&["a", "b"]);
        let (a, b) = (UserId::from("a"), UserId::from("b"));
        graph.add(&a, &b).unwrap();
        assert!(graph.list(&b).is_empty());
        // the reverse edge is a separate pair
        graph.add(&b, &a).unwrap();
        assert_eq!(graph.list(&b), &[a]);
    }

    #[test]
    fn test_unknown_endpoints() {
        let mut graph = graph_with(&["a"]);
        let a = UserId::from("a");
        let ghost = UserId::from("ghost");

        assert_eq!(
            graph.add(&a, &ghost).unwrap_err(),
            HubError::UnknownUser(ghost.clone())
        );
        assert_eq!(
            graph.add(&ghost, &a).unwrap_err(),
            HubError::UnknownUser(ghost.clone())
        );
        assert!(graph.list(&ghost).is_empty());
        assert!(graph.list(&a).is_empty());
    }

    #[test]
    fn test_self_contact_allowed() {
        let mut graph = graph_with(&["a"]);
        let a = UserId::from("a");
        graph.add(&a, &a).unwrap();
        assert_eq!(graph.list(&a), &[a.clone()]);
    }
}
