//! Client for the node's REST control API.

use std::path::Path;

use log::debug;
use reqwest::{Method, RequestBuilder, Response, StatusCode, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::chat::GxsId;
use crate::error::{BotError, Result};
use crate::types::BotIdentity;

const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    name: String,
    gxs_id: GxsId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RsIdResponse {
    rs_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatRoom {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatRooms {
    #[serde(default)]
    pub subscribed: Vec<ChatRoom>,
    #[serde(default)]
    pub available: Vec<ChatRoom>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRoomsResponse {
    chat_rooms: ChatRooms,
}

pub struct ControlClient {
    client: reqwest::Client,
    base_url: String,
}

impl ControlClient {
    #[must_use]
    pub fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}{API_PREFIX}", api_url.trim_end_matches('/')),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
    }

    pub async fn has_profile(&self) -> Result<bool> {
        let response = self.request(Method::GET, "/profiles/1").send().await?;
        Ok(response.status() == StatusCode::OK)
    }

    pub async fn create_profile(&self, name: &str) -> Result<()> {
        self.create("/config/profile", name, "create profile").await
    }

    pub async fn create_location(&self, name: &str) -> Result<()> {
        self.create("/config/location", name, "create location").await
    }

    pub async fn create_identity(&self, name: &str) -> Result<()> {
        self.create("/config/identity", name, "create identity").await
    }

    async fn create(&self, path: &str, name: &str, operation: &'static str) -> Result<()> {
        let response = self
            .request(Method::POST, path)
            .json(&json!({ "name": name }))
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED, operation).await?;
        Ok(())
    }

    pub async fn upload_avatar(&self, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "avatar.png".to_string(), |name| name.to_string_lossy().into_owned());
        let part = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime::IMAGE_PNG.as_ref())?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .request(Method::POST, "/identities/1/image")
            .multipart(form)
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED, "upload avatar").await?;
        Ok(())
    }

    pub async fn add_friend(&self, rs_id: &str) -> Result<()> {
        let response = self
            .request(Method::POST, "/profiles?trust=FULL")
            .json(&json!({ "rsId": rs_id }))
            .send()
            .await?;
        expect_status(response, StatusCode::CREATED, "add friend").await?;
        Ok(())
    }

    pub async fn own_identity(&self) -> Result<BotIdentity> {
        let identity: IdentityResponse = self.get_json("/identities/1", "get own identity").await?;
        Ok(BotIdentity {
            name: identity.name,
            gxs_id: identity.gxs_id.bytes,
        })
    }

    pub async fn own_rs_id(&self) -> Result<String> {
        let response: RsIdResponse = self.get_json("/locations/1/rs-id", "get own RS id").await?;
        Ok(response.rs_id)
    }

    pub async fn chat_rooms(&self) -> Result<ChatRooms> {
        let response: ChatRoomsResponse = self.get_json("/chat/rooms", "get chat rooms").await?;
        Ok(response.chat_rooms)
    }

    pub async fn subscribe_room(&self, id: i64) -> Result<()> {
        let response = self
            .request(Method::PUT, &format!("/chat/rooms/{id}/subscription"))
            .send()
            .await?;
        expect_status(response, StatusCode::OK, "subscribe to chat room").await?;
        Ok(())
    }

    pub async fn leave_room(&self, id: i64) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/chat/rooms/{id}/subscription"))
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT, "leave chat room").await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &'static str,
    ) -> Result<T> {
        debug!("GET {path}");
        let response = self.request(Method::GET, path).send().await?;
        let response = expect_status(response, StatusCode::OK, operation).await?;
        Ok(response.json().await?)
    }
}

async fn expect_status(
    response: Response,
    expected: StatusCode,
    operation: &'static str,
) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
    Err(BotError::ControlApi {
        operation,
        status,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_includes_api_prefix() {
        assert_eq!(
            ControlClient::new("http://localhost:1066/").base_url,
            "http://localhost:1066/api/v1"
        );
    }

    #[test]
    fn parses_identity() {
        let identity: IdentityResponse =
            serde_json::from_str(r#"{"id":1,"name":"Bot","gxsId":{"bytes":"b0t"},"type":"OWN"}"#)
                .unwrap();
        assert_eq!(identity.name, "Bot");
        assert_eq!(identity.gxs_id.bytes, "b0t");
    }

    #[test]
    fn parses_chat_rooms() {
        let rooms: ChatRoomsResponse = serde_json::from_str(
            r#"{"chatRooms":{"subscribed":[{"id":1,"name":"Lobby","topic":"hi"}],"available":[{"id":2,"name":"Off-topic"}],"invited":[]}}"#,
        )
        .unwrap();
        assert_eq!(
            rooms.chat_rooms.subscribed,
            vec![ChatRoom {
                id: 1,
                name: "Lobby".to_string()
            }]
        );
        assert_eq!(rooms.chat_rooms.available[0].id, 2);
    }
}
