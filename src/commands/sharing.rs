//! Share links, invitations and role changes.

use super::render::{detail_page, preview_page, Output};
use super::{resolve, CommandResult};
use shoplist::auth::token_from_link;
use shoplist::client::ClientState;
use shoplist::models::Role;
use shoplist::views::Notice;

pub async fn share(state: &ClientState, list: &str) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let share = api.share(id).await?;

    Output::new(state)?
        .notice(&Notice::info("Anyone with this link can join the list"))
        .await?;
    println!("{}", share.link);
    Ok(())
}

pub async fn invite(state: &ClientState, list: &str, email: &str, role: Role) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let share = api.invite(id, email, role).await?;

    Output::new(state)?
        .notice(&Notice::success(format!(
            "Invitation sent to {} as {}",
            email, role
        )))
        .await?;
    println!("{}", share.link);
    Ok(())
}

pub async fn change_role(state: &ClientState, list: &str, share: &str, role: Role) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let snapshot = api.list(id).await?;
    let share = resolve::share(&snapshot, share)?.id;

    let mutation = api.change_role(id, share, role).await?;
    let mut out = Output::new(state)?;
    out.notice(&mutation.notice).await?;
    out.page(detail_page(&mutation.detail)).await?;
    Ok(())
}

pub async fn unshare(state: &ClientState, list: &str, share: &str) -> CommandResult {
    let api = state.api();
    let id = resolve::list(&api, list).await?;
    let snapshot = api.list(id).await?;
    let share = resolve::share(&snapshot, share)?.id;

    let mutation = api.remove_share(id, share).await?;
    let mut out = Output::new(state)?;
    out.notice(&mutation.notice).await?;
    out.page(detail_page(&mutation.detail)).await?;
    Ok(())
}

/// Shows what a link grants, then joins the list unless `preview_only`.
pub async fn accept(state: &ClientState, link: &str, preview_only: bool) -> CommandResult {
    let token = token_from_link(link);
    let api = state.api();
    let preview = api.preview(&token).await?;

    let mut out = Output::new(state)?;
    if preview_only || preview.already_member {
        out.page(preview_page(&preview, &token)).await?;
        return Ok(());
    }

    let accepted = api.accept(&token).await?;
    out.notice(&accepted.notice).await?;
    out.page(detail_page(&api.list(accepted.list_id).await?))
        .await?;
    Ok(())
}
