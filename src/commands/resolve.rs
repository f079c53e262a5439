//! Turns what the user typed into ids: a UUID, a 1-based position as
//! printed by `lists`/`show`, or a name.

use uuid::Uuid;

use shoplist::client::ApiClient;
use shoplist::models::{Item, Share};
use shoplist::views::{ListSnapshot, OverviewEntry};

type Resolved<T> = Result<T, Box<dyn std::error::Error>>;

fn position(identifier: &str, len: usize) -> Option<usize> {
    identifier
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=len).contains(n))
        .map(|n| n - 1)
}

pub fn list_in(entries: &[OverviewEntry], identifier: &str) -> Resolved<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(identifier) {
        return Ok(uuid);
    }
    if let Some(n) = position(identifier, entries.len()) {
        return Ok(entries[n].list.id);
    }
    entries
        .iter()
        .find(|e| e.list.name.eq_ignore_ascii_case(identifier.trim()))
        .map(|e| e.list.id)
        .ok_or_else(|| format!("List not found: {}", identifier).into())
}

/// Resolves a list, fetching the overview only when `identifier` is not a UUID.
pub async fn list(api: &ApiClient, identifier: &str) -> Resolved<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(identifier) {
        return Ok(uuid);
    }
    list_in(&api.lists().await?, identifier)
}

pub fn item<'a>(snapshot: &'a ListSnapshot, identifier: &str) -> Resolved<&'a Item> {
    let items = &snapshot.items;
    let found = if let Ok(uuid) = Uuid::parse_str(identifier) {
        items.iter().find(|i| i.id == uuid)
    } else if let Some(n) = position(identifier, items.len()) {
        items.get(n)
    } else {
        items
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(identifier.trim()))
    };
    found.ok_or_else(|| format!("Item not found: {}", identifier).into())
}

pub fn share<'a>(snapshot: &'a ListSnapshot, identifier: &str) -> Resolved<&'a Share> {
    let shares = &snapshot.shares;
    let found = if let Ok(uuid) = Uuid::parse_str(identifier) {
        shares.iter().find(|s| s.id == uuid)
    } else if let Some(n) = position(identifier, shares.len()) {
        shares.get(n)
    } else {
        let email = identifier.trim();
        shares.iter().find(|s| {
            [&s.accepted_email, &s.invited_email]
                .into_iter()
                .flatten()
                .any(|e| e.eq_ignore_ascii_case(email))
        })
    };
    found.ok_or_else(|| format!("Share not found: {}", identifier).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplist::access::Capabilities;
    use shoplist::models::{Actor, Role, ShoppingList};

    fn snapshot() -> ListSnapshot {
        let owner = Actor::new(Uuid::new_v4(), "a@x.com");
        let list = ShoppingList::new("Groceries", &owner);
        let items = vec![
            Item::new(list.id, "Milk", &owner),
            Item::new(list.id, "Bread", &owner),
        ];
        let shares = vec![Share::invitation(list.id, "tok", "b@x.com", Role::Viewer)];
        ListSnapshot {
            list,
            items,
            role: Role::Owner,
            capabilities: Capabilities::for_role(Role::Owner),
            shares,
        }
    }

    #[test]
    fn test_item_by_position_name_and_id() {
        let snapshot = snapshot();
        let bread = snapshot.items[1].id;

        assert_eq!(item(&snapshot, "2").unwrap().id, bread);
        assert_eq!(item(&snapshot, "bread").unwrap().id, bread);
        assert_eq!(item(&snapshot, &bread.to_string()).unwrap().id, bread);
        assert!(item(&snapshot, "3").is_err());
        assert!(item(&snapshot, "Eggs").is_err());
    }

    #[test]
    fn test_share_by_email() {
        let snapshot = snapshot();
        let id = snapshot.shares[0].id;

        assert_eq!(share(&snapshot, "B@x.com").unwrap().id, id);
        assert_eq!(share(&snapshot, "1").unwrap().id, id);
        assert!(share(&snapshot, "c@x.com").is_err());
    }
}
