use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::ClientError;
use crate::auth::Session;
use crate::models::{Role, ShoppingList};
use crate::server::api::{
    CreateList, Credentials, InviteRequest, ItemInput, MagicLinkRequest, MeResponse, Mutation,
    NoteUpdate, ResetRequest, RoleUpdate, ShareLink, TranslateRequest, TranslateResponse,
};
use crate::server::ErrorBody;
use crate::views::{AcceptResult, ListSnapshot, Notice, OverviewEntry, SharedListPreview};

/// Typed access to the shoplist HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        if self.token.is_none() {
            return Err(ClientError::NotLoggedIn);
        }
        Ok(self.request(method, path))
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => Err(ClientError::Api {
                error: body.error,
                message: body.message,
            }),
            Err(_) => Err(ClientError::Api {
                error: status_code_name(status),
                message: format!("Server returned {}", status),
            }),
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        Self::send(self.authed(Method::POST, path)?.json(body)).await
    }

    // Auth

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<Session, ClientError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
            display_name,
        };
        Self::send(self.request(Method::POST, "/auth/signup").json(&body)).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
            display_name: None,
        };
        Self::send(self.request(Method::POST, "/auth/login").json(&body)).await
    }

    pub async fn request_magic_link(
        &self,
        email: &str,
        redirect: Option<String>,
    ) -> Result<Notice, ClientError> {
        let body = MagicLinkRequest {
            email: email.to_string(),
            redirect,
        };
        Self::send(self.request(Method::POST, "/auth/magic-link").json(&body)).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<Notice, ClientError> {
        let body = ResetRequest {
            email: email.to_string(),
        };
        Self::send(self.request(Method::POST, "/auth/reset").json(&body)).await
    }

    pub async fn me(&self) -> Result<MeResponse, ClientError> {
        Self::send(self.authed(Method::GET, "/me")?).await
    }

    pub async fn logout(&self) -> Result<Notice, ClientError> {
        Self::send(self.authed(Method::POST, "/auth/logout")?).await
    }

    pub async fn change_password(&self, new: &str, confirm: &str) -> Result<Notice, ClientError> {
        let body = serde_json::json!({ "new_password": new, "confirm": confirm });
        self.post("/auth/password", &body).await
    }

    // Lists

    pub async fn lists(&self) -> Result<Vec<OverviewEntry>, ClientError> {
        Self::send(self.authed(Method::GET, "/lists")?).await
    }

    pub async fn create_list(&self, name: &str) -> Result<ShoppingList, ClientError> {
        let body = CreateList {
            name: name.to_string(),
        };
        self.post("/lists", &body).await
    }

    pub async fn list(&self, id: Uuid) -> Result<ListSnapshot, ClientError> {
        Self::send(self.authed(Method::GET, &format!("/lists/{}", id))?).await
    }

    pub async fn update_note(&self, id: Uuid, note: Option<String>) -> Result<Mutation, ClientError> {
        let builder = self.authed(Method::PATCH, &format!("/lists/{}/note", id))?;
        Self::send(builder.json(&NoteUpdate { note })).await
    }

    pub async fn add_item(
        &self,
        id: Uuid,
        name: &str,
        note: Option<String>,
    ) -> Result<Mutation, ClientError> {
        let body = ItemInput {
            name: name.to_string(),
            note,
        };
        self.post(&format!("/lists/{}/items", id), &body).await
    }

    pub async fn edit_item(
        &self,
        id: Uuid,
        item: Uuid,
        name: &str,
        note: Option<String>,
    ) -> Result<Mutation, ClientError> {
        let body = ItemInput {
            name: name.to_string(),
            note,
        };
        let builder = self.authed(Method::PATCH, &format!("/lists/{}/items/{}", id, item))?;
        Self::send(builder.json(&body)).await
    }

    pub async fn toggle_item(&self, id: Uuid, item: Uuid) -> Result<Mutation, ClientError> {
        let path = format!("/lists/{}/items/{}/toggle", id, item);
        Self::send(self.authed(Method::POST, &path)?).await
    }

    pub async fn delete_item(&self, id: Uuid, item: Uuid) -> Result<Mutation, ClientError> {
        let path = format!("/lists/{}/items/{}", id, item);
        Self::send(self.authed(Method::DELETE, &path)?).await
    }

    // Sharing

    pub async fn share(&self, id: Uuid) -> Result<ShareLink, ClientError> {
        Self::send(self.authed(Method::POST, &format!("/lists/{}/share", id))?).await
    }

    pub async fn invite(&self, id: Uuid, email: &str, role: Role) -> Result<ShareLink, ClientError> {
        let body = InviteRequest {
            email: email.to_string(),
            role,
        };
        self.post(&format!("/lists/{}/invite", id), &body).await
    }

    pub async fn change_role(
        &self,
        id: Uuid,
        share: Uuid,
        role: Role,
    ) -> Result<Mutation, ClientError> {
        let builder = self.authed(Method::PATCH, &format!("/lists/{}/shares/{}", id, share))?;
        Self::send(builder.json(&RoleUpdate { role })).await
    }

    pub async fn remove_share(&self, id: Uuid, share: Uuid) -> Result<Mutation, ClientError> {
        let path = format!("/lists/{}/shares/{}", id, share);
        Self::send(self.authed(Method::DELETE, &path)?).await
    }

    pub async fn preview(&self, token: &str) -> Result<SharedListPreview, ClientError> {
        let path = format!("/share/{}", urlencoding::encode(token));
        Self::send(self.request(Method::GET, &path)).await
    }

    pub async fn accept(&self, token: &str) -> Result<AcceptResult, ClientError> {
        let path = format!("/share/{}/accept", urlencoding::encode(token));
        Self::send(self.authed(Method::POST, &path)?).await
    }

    pub async fn translate(
        &self,
        texts: &[String],
        target: &str,
    ) -> Result<TranslateResponse, ClientError> {
        let body = TranslateRequest {
            texts: texts.to_vec(),
            target: target.to_string(),
        };
        self.post("/translate", &body).await
    }
}

fn status_code_name(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("error")
        .to_lowercase()
        .replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new("http://localhost:8080/", None);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_authed_calls_need_a_token() {
        let client = ApiClient::new("http://127.0.0.1:9", None);
        assert!(matches!(client.lists().await, Err(ClientError::NotLoggedIn)));
    }

    #[test]
    fn test_status_code_name() {
        assert_eq!(status_code_name(StatusCode::NOT_FOUND), "not_found");
        assert_eq!(
            status_code_name(StatusCode::TOO_MANY_REQUESTS),
            "too_many_requests"
        );
    }
}
