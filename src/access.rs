//! Role resolution for shopping lists.
//!
//! Roles are never stored on the client side of a view. They are derived from
//! the current user's email, the list row and the list's shares every time
//! they are needed.

use serde::{Deserialize, Serialize};

use crate::models::{Role, Share, ShoppingList};

/// Resolves the role `email` holds on `list`.
///
/// Total over its inputs: a user with no relationship to the list resolves
/// to [`Role::Viewer`]. Use [`effective_role`] to tell "no access" apart.
pub fn resolve_role(email: &str, list: &ShoppingList, shares: &[Share]) -> Role {
    effective_role(email, list, shares).unwrap_or(Role::Viewer)
}

/// Resolves the role `email` holds on `list`, or `None` when the user is
/// neither the owner nor the acceptor of any share.
///
/// The list's `owner_email` is authoritative for ownership. A share labeled
/// `owner` grants no more than viewer.
pub fn effective_role(email: &str, list: &ShoppingList, shares: &[Share]) -> Option<Role> {
    if list.is_owned_by(email) {
        return Some(Role::Owner);
    }

    shares
        .iter()
        .filter(|s| s.list_id == list.id && s.accepted_by_email(email))
        .map(|s| match s.role {
            Role::Editor => Role::Editor,
            _ => Role::Viewer,
        })
        .max_by_key(|r| r.rank())
}

/// Controls a surface may expose for a given role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub add_item: bool,
    pub edit_item: bool,
    pub toggle_item: bool,
    pub delete_item: bool,
    pub edit_note: bool,
    pub share: bool,
    pub manage_shares: bool,
}

impl Capabilities {
    pub fn for_role(role: Role) -> Self {
        let edit = role.can_edit();
        let own = role.is_owner();
        Self {
            add_item: edit,
            edit_item: edit,
            toggle_item: edit,
            delete_item: edit,
            edit_note: edit,
            share: own,
            manage_shares: own,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Actor;
    use chrono::Utc;
    use uuid::Uuid;

    fn list_owned_by(email: &str) -> ShoppingList {
        ShoppingList::new("Groceries", &Actor::new(Uuid::new_v4(), email))
    }

    fn accepted(list: &ShoppingList, email: &str, role: Role) -> Share {
        let mut share = Share::link(list.id, Uuid::new_v4().to_string(), role);
        share.accepted_by = Some(Uuid::new_v4());
        share.accepted_email = Some(email.to_string());
        share.accepted_at = Some(Utc::now());
        share
    }

    #[test]
    fn test_owner_wins_regardless_of_shares() {
        let list = list_owned_by("a@x.com");
        let shares = vec![accepted(&list, "a@x.com", Role::Viewer)];

        assert_eq!(resolve_role("a@x.com", &list, &shares), Role::Owner);
        assert_eq!(resolve_role("A@X.com", &list, &[]), Role::Owner);
    }

    #[test]
    fn test_editor_share_resolves_editor_and_stranger_viewer() {
        let list = list_owned_by("a@x.com");
        let shares = vec![accepted(&list, "b@x.com", Role::Editor)];

        assert_eq!(resolve_role("b@x.com", &list, &shares), Role::Editor);
        assert_eq!(resolve_role("c@x.com", &list, &shares), Role::Viewer);
    }

    #[test]
    fn test_email_case_is_ignored() {
        let list = list_owned_by("Alice@X.com");
        let shares = vec![accepted(&list, "Bob@x.com", Role::Editor)];

        assert_eq!(effective_role("alice@x.com", &list, &shares), Some(Role::Owner));
        assert_eq!(effective_role("BOB@X.COM", &list, &shares), Some(Role::Editor));
        assert_eq!(effective_role("bob@x.co", &list, &shares), None);
    }

    #[test]
    fn test_owner_labeled_share_maps_to_viewer() {
        let list = list_owned_by("a@x.com");
        let shares = vec![accepted(&list, "b@x.com", Role::Owner)];

        assert_eq!(resolve_role("b@x.com", &list, &shares), Role::Viewer);
    }

    #[test]
    fn test_highest_matching_share_wins() {
        let list = list_owned_by("a@x.com");
        let shares = vec![
            accepted(&list, "b@x.com", Role::Viewer),
            accepted(&list, "b@x.com", Role::Editor),
        ];

        assert_eq!(resolve_role("b@x.com", &list, &shares), Role::Editor);
    }

    #[test]
    fn test_unaccepted_invite_grants_nothing() {
        let list = list_owned_by("a@x.com");
        let invite = Share::invitation(list.id, "tok", "b@x.com", Role::Editor);

        assert_eq!(effective_role("b@x.com", &list, &[invite.clone()]), None);
        assert_eq!(resolve_role("b@x.com", &list, &[invite]), Role::Viewer);
    }

    #[test]
    fn test_shares_of_other_lists_ignored() {
        let list = list_owned_by("a@x.com");
        let other = list_owned_by("z@x.com");
        let shares = vec![accepted(&other, "b@x.com", Role::Editor)];

        assert_eq!(effective_role("b@x.com", &list, &shares), None);
    }

    #[test]
    fn test_capabilities() {
        let viewer = Capabilities::for_role(Role::Viewer);
        assert!(!viewer.add_item);
        assert!(!viewer.toggle_item);
        assert!(!viewer.share);

        let editor = Capabilities::for_role(Role::Editor);
        assert!(editor.add_item && editor.delete_item && editor.edit_note);
        assert!(!editor.manage_shares);

        let owner = Capabilities::for_role(Role::Owner);
        assert!(owner.add_item && owner.share && owner.manage_shares);
    }
}
