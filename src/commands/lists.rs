use super::render::{detail_page, overview_page, Output};
use super::{resolve, CommandResult};
use shoplist::client::ClientState;
use shoplist::server::api::Mutation;
use shoplist::views::Notice;

async fn show_mutation(state: &ClientState, mutation: Mutation) -> CommandResult {
    let mut out = Output::new(state)?;
    out.notice(&mutation.notice).await?;
    out.page(detail_page(&mutation.detail)).await?;
    Ok(())
}

pub async fn overview(state: &ClientState) -> CommandResult {
    let entries = state.api().lists().await?;
    Output::new(state)?.page(overview_page(&entries)).await?;
    Ok(())
}

pub async fn create(state: &ClientState, name: &str) -> CommandResult {
    if name.trim().is_empty() {
        return Err("List name cannot be empty".into());
    }

    let list = state.api().create_list(name.trim()).await?;
    let mut out = Output::new(state)?;
    out.notice(&Notice::success(format!("Created list {}", list.name)))
        .await?;
    println!("ID: {}", list.id);
    Ok(())
}

pub async fn show(state: &ClientState, list: &str) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let snapshot = api.list(id).await?;
    Output::new(state)?.page(detail_page(&snapshot)).await?;
    Ok(())
}

/// Sets the list note; an empty text clears it.
pub async fn note(state: &ClientState, list: &str, text: &str) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let note = Some(text.trim().to_string()).filter(|n| !n.is_empty());
    show_mutation(state, api.update_note(id, note).await?).await
}

pub async fn add(state: &ClientState, list: &str, name: &str, note: Option<String>) -> CommandResult {
    if name.trim().is_empty() {
        return Err("Item name cannot be empty".into());
    }

    let api = state.api();
    let id = resolve::list(&api, list).await?;
    show_mutation(state, api.add_item(id, name.trim(), note).await?).await
}

pub async fn check(state: &ClientState, list: &str, item: &str) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let snapshot = api.list(id).await?;
    let item = resolve::item(&snapshot, item)?.id;
    show_mutation(state, api.toggle_item(id, item).await?).await
}

pub async fn edit(
    state: &ClientState,
    list: &str,
    item: &str,
    name: Option<String>,
    note: Option<String>,
) -> CommandResult {
    if name.is_none() && note.is_none() {
        return Err("Nothing to change. Pass --name and/or --note".into());
    }

    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let snapshot = api.list(id).await?;
    let current = resolve::item(&snapshot, item)?;

    let name = name.unwrap_or_else(|| current.name.clone());
    let note = match note {
        Some(note) if note.trim().is_empty() => None,
        Some(note) => Some(note),
        None => current.note.clone(),
    };
    show_mutation(state, api.edit_item(id, current.id, &name, note).await?).await
}

pub async fn remove(state: &ClientState, list: &str, item: &str) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let snapshot = api.list(id).await?;
    let item = resolve::item(&snapshot, item)?.id;
    show_mutation(state, api.delete_item(id, item).await?).await
}
