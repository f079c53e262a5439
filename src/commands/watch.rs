//! Follows the overview or one list live until Ctrl-C or the server closes.

use super::render::{detail_page, overview_page, Output};
use super::{resolve, CommandResult};
use shoplist::client::{live_url, ClientError, ClientState, LiveStream};
use shoplist::server::api::LiveMessage;
use shoplist::views::Notice;

pub async fn watch(state: &ClientState, list: Option<&str>) -> CommandResult {
    let api = state.api();
    let token = api.token().ok_or(ClientError::NotLoggedIn)?.to_string();
    let list_id = match list {
        Some(list) => Some(resolve::list(&api, list).await?),
        None => None,
    };

    let mut stream = LiveStream::connect(&live_url(&state.server_url, list_id), &token).await?;
    let mut out = Output::new(state)?;
    tracing::debug!(list = ?list_id, "watching");

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = tokio::signal::ctrl_c() => {
                stream.close().await;
                return Ok(());
            }
        };

        match message {
            Some(Ok(LiveMessage::Lists { entries })) => {
                out.page(overview_page(&entries)).await?;
            }
            Some(Ok(LiveMessage::Detail { detail, notice })) => {
                if let Some(notice) = notice {
                    out.notice(&notice).await?;
                }
                out.page(detail_page(&detail)).await?;
            }
            Some(Ok(LiveMessage::Closed { reason })) => {
                out.notice(&Notice::info(format!("Stopped: {}", reason)))
                    .await?;
                return Ok(());
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}
