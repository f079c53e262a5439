//! Screens as element trees, printed through the translation overlay.
//!
//! Identifiers, emails and command lines sit in `translate="no"` spans so
//! only prose reaches the translator.

use shoplist::client::{ClientError, ClientState, ServerTranslator};
use shoplist::models::ShareState;
use shoplist::translate::{Element, Page, PageTranslator, DEFAULT_LANGUAGE};
use shoplist::views::{ListSnapshot, Notice, NoticeLevel, OverviewEntry, SharedListPreview};

fn raw(text: impl Into<String>) -> Element {
    Element::new("span").attr("translate", "no").text(text)
}

fn span(text: impl Into<String>) -> Element {
    Element::new("span").text(text)
}

fn line(parts: Vec<Element>) -> Element {
    parts
        .into_iter()
        .fold(Element::new("li"), |li, part| li.child(part))
}

/// A control line: translated label followed by the literal command.
fn control(label: &str, command: String) -> Element {
    line(vec![span(label), raw(command)])
}

pub fn overview_page(entries: &[OverviewEntry]) -> Page {
    let mut main = Element::new("main").child(Element::new("h1").text("Your lists"));

    if entries.is_empty() {
        main = main.child(Element::new("p").text("No lists yet"));
    }
    for (n, entry) in entries.iter().enumerate() {
        let mut parts = vec![raw(format!("{}.", n + 1)), span(entry.list.name.clone())];
        if !entry.owned {
            parts.push(span("shared by"));
            parts.push(raw(entry.list.owner_email.clone()));
        }
        parts.push(raw(format!("[{}]", entry.list.id)));
        main = main.child(line(parts));
    }

    let nav = Element::new("nav").child(control("New list:", "shoplist create <name>".into()));
    Page::new(Element::new("body").child(main).child(nav))
}

pub fn detail_page(snapshot: &ListSnapshot) -> Page {
    let list = &snapshot.list;
    let caps = snapshot.capabilities;
    let id = list.id;

    let mut main = Element::new("main")
        .child(Element::new("h1").text(list.name.clone()))
        .child(line(vec![span("Owner:"), raw(list.owner_email.clone())]))
        .child(line(vec![span("Your role:"), span(snapshot.role.as_str())]));

    if let Some(note) = &list.note {
        main = main.child(line(vec![span("Note:"), span(note.clone())]));
    }

    main = main.child(Element::new("h2").text("Items"));
    if snapshot.items.is_empty() {
        main = main.child(Element::new("p").text("No items yet"));
    }
    for (n, item) in snapshot.items.iter().enumerate() {
        let mark = if item.checked { "[x]" } else { "[ ]" };
        let mut parts = vec![raw(format!("{}. {}", n + 1, mark)), span(item.name.clone())];
        if let Some(note) = &item.note {
            parts.push(span(format!("({})", note)));
        }
        main = main.child(line(parts));
    }

    if caps.manage_shares {
        main = main.child(Element::new("h2").text("Shared with"));
        if snapshot.shares.is_empty() {
            main = main.child(Element::new("p").text("Nobody yet"));
        }
        for (n, share) in snapshot.shares.iter().enumerate() {
            let who = match (&share.accepted_email, &share.invited_email) {
                (Some(email), _) | (None, Some(email)) => raw(email.clone()),
                (None, None) => span("Anyone with the link"),
            };
            let status = match share.state() {
                ShareState::Accepted => "joined",
                ShareState::Invited => "invited",
                ShareState::Unclaimed => "not used yet",
            };
            main = main.child(line(vec![
                raw(format!("{}.", n + 1)),
                who,
                span(share.role.as_str()),
                span(status),
            ]));
        }
    }

    let mut nav = Element::new("nav");
    if caps.add_item {
        nav = nav.child(control("Add item:", format!("shoplist add {} <name>", id)));
    }
    if caps.toggle_item {
        nav = nav.child(control("Check off:", format!("shoplist check {} <item>", id)));
    }
    if caps.edit_item {
        nav = nav.child(control(
            "Edit item:",
            format!("shoplist edit {} <item> --name <name>", id),
        ));
    }
    if caps.delete_item {
        nav = nav.child(control("Remove item:", format!("shoplist remove {} <item>", id)));
    }
    if caps.edit_note {
        nav = nav.child(control("Edit note:", format!("shoplist note {} <text>", id)));
    }
    if caps.share {
        nav = nav
            .child(control("Share link:", format!("shoplist share {}", id)))
            .child(control(
                "Invite:",
                format!("shoplist invite {} <email> --role editor", id),
            ));
    }
    if caps.manage_shares {
        nav = nav
            .child(control(
                "Change role:",
                format!("shoplist role {} <share> <role>", id),
            ))
            .child(control("Remove access:", format!("shoplist unshare {} <share>", id)));
    }
    if !caps.add_item {
        nav = nav.child(Element::new("p").text("You can view this list but not change it"));
    }

    Page::new(
        Element::new("body")
            .child(main)
            .child(nav)
            .child(Element::new("footer").child(raw(format!("id: {}", id)))),
    )
}

pub fn preview_page(preview: &SharedListPreview, token: &str) -> Page {
    let mut main = Element::new("main")
        .child(Element::new("h1").text(preview.name.clone()))
        .child(line(vec![span("Access:"), span(preview.role.as_str())]));

    if let Some(note) = &preview.note {
        main = main.child(line(vec![span("Note:"), span(note.clone())]));
    }
    for item in &preview.items {
        let mark = if item.checked { "[x]" } else { "[ ]" };
        main = main.child(line(vec![raw(mark), span(item.name.clone())]));
    }

    let nav = if preview.already_member {
        Element::new("nav").child(Element::new("p").text("This list is already in your lists"))
    } else {
        Element::new("nav").child(control("Add to my lists:", format!("shoplist accept {}", token)))
    };
    Page::new(Element::new("body").child(main).child(nav))
}

pub fn notice_page(notice: &Notice) -> Page {
    let marker = match notice.level {
        NoticeLevel::Info => "*",
        NoticeLevel::Success => "+",
        NoticeLevel::Error => "!",
    };
    Page::new(
        Element::new("body").child(
            Element::new("main").child(line(vec![raw(marker), span(notice.message.clone())])),
        ),
    )
}

/// Prints pages, translated when the user picked another language.
pub struct Output {
    translator: Option<PageTranslator<ServerTranslator>>,
}

impl Output {
    pub fn new(state: &ClientState) -> Result<Self, ClientError> {
        let translator = if state.translates() && state.is_logged_in() {
            Some(PageTranslator::new(
                ServerTranslator::new(state.api()),
                state.translation_cache()?,
                DEFAULT_LANGUAGE,
                state.language.clone(),
            ))
        } else {
            None
        };
        Ok(Self { translator })
    }

    pub async fn page(&mut self, mut page: Page) -> Result<(), ClientError> {
        if let Some(translator) = &mut self.translator {
            translator.translate_page(&mut page).await;
            translator.cache().save()?;
        }
        println!("{}", page.render_text());
        Ok(())
    }

    pub async fn notice(&mut self, notice: &Notice) -> Result<(), ClientError> {
        self.page(notice_page(notice)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplist::access::Capabilities;
    use shoplist::models::{Actor, Item, Role, ShoppingList};
    use uuid::Uuid;

    fn snapshot(role: Role) -> ListSnapshot {
        let owner = Actor::new(Uuid::new_v4(), "a@x.com");
        let list = ShoppingList::new("Groceries", &owner);
        let item = Item::new(list.id, "Milk", &owner).with_note(Some("2 litres".into()));
        ListSnapshot {
            list,
            items: vec![item],
            role,
            capabilities: Capabilities::for_role(role),
            shares: Vec::new(),
        }
    }

    #[test]
    fn test_viewer_sees_no_edit_controls() {
        let text = detail_page(&snapshot(Role::Viewer)).render_text();

        assert!(text.contains("1. [ ] Milk (2 litres)"));
        assert!(!text.contains("shoplist add"));
        assert!(!text.contains("shoplist check"));
        assert!(text.contains("You can view this list but not change it"));
    }

    #[test]
    fn test_owner_sees_share_controls() {
        let text = detail_page(&snapshot(Role::Owner)).render_text();

        assert!(text.contains("shoplist add"));
        assert!(text.contains("shoplist invite"));
        assert!(text.contains("shoplist unshare"));
        assert!(text.contains("Shared with"));
    }

    #[test]
    fn test_only_prose_is_translatable() {
        let page = detail_page(&snapshot(Role::Editor));
        let texts = page.texts();

        assert!(texts.contains(&"Milk".to_string()));
        assert!(texts.contains(&"Add item:".to_string()));
        assert!(!texts.iter().any(|t| t.contains("a@x.com")));
        assert!(!texts.iter().any(|t| t.starts_with("shoplist")));
    }
}
