//! REST implementation of [`RoomApi`]

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use tracing::debug;
use url::Url;

use super::{RoomApi, RoomStatus, parse_history};
use crate::auth::BearerToken;
use crate::chat::ChatMessage;
use crate::config::ApiConfig;
use crate::error::{ApiError, PollError};

/// Room API over HTTP with the bearer credential on every request
#[derive(Clone)]
pub struct HttpRoomApi {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
}

impl HttpRoomApi {
    pub fn new(config: &ApiConfig, token: &BearerToken) -> Result<Self, ApiError> {
        let parsed = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            authorization: token.authorization(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl std::fmt::Debug for HttpRoomApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRoomApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoomApi for HttpRoomApi {
    async fn fetch_status(&self, room_code: &str) -> Result<RoomStatus, PollError> {
        let url = self.url(&format!("rooms/{room_code}"));
        debug!(%url, "Fetching room status");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|e| PollError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PollError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PollError::Request(e.to_string()))?;
        RoomStatus::from_response(&body)
    }

    async fn end_session(&self, room_code: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("rooms/end-test/{room_code}"));
        debug!(%url, "Ending test session");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http { status, body });
        }
        Ok(())
    }

    async fn chat_history(&self, room_code: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let url = self.url(&format!("chat/history/{room_code}"));
        debug!(%url, "Fetching chat history");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        parse_history(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_tokens::token_for;
    use crate::room::api::RoomStatusKind;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpRoomApi {
        let config = ApiConfig {
            base_url: format!("{}/", server.uri()),
            ..ApiConfig::default()
        };
        let token = BearerToken::parse(token_for("alice", 3600)).unwrap();
        HttpRoomApi::new(&config, &token).unwrap()
    }

    #[tokio::test]
    async fn fetch_status_reads_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/AB12"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "message": "ok",
                "data": { "status": "COMPLETED", "winner": "bob", "expiryDuration": 15 }
            })))
            .mount(&server)
            .await;

        let status = api(&server).fetch_status("AB12").await.unwrap();

        assert_eq!(status.status, RoomStatusKind::Completed);
        assert_eq!(status.winner.as_deref(), Some("bob"));
        assert_eq!(status.expiry_duration_seconds, Some(900));
    }

    #[tokio::test]
    async fn fetch_status_http_failure_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/AB12"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = api(&server).fetch_status("AB12").await.unwrap_err();
        assert_eq!(err, PollError::Status { status: 503 });
    }

    #[tokio::test]
    async fn end_session_posts_to_end_test() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rooms/end-test/AB12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true, "message": "ended", "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        api(&server).end_session("AB12").await.unwrap();
    }

    #[tokio::test]
    async fn end_session_error_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rooms/end-test/AB12"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already ended"))
            .mount(&server)
            .await;

        let err = api(&server).end_session("AB12").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Http {
                status: 409,
                body: "already ended".into()
            }
        );
    }

    #[tokio::test]
    async fn chat_history_reads_bare_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/history/AB12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "senderUsername": "bob", "content": "first" },
                { "senderUsername": "alice", "content": "second" }
            ])))
            .mount(&server)
            .await;

        let history = api(&server).chat_history("AB12").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = ApiConfig {
            base_url: "not a url".into(),
            ..ApiConfig::default()
        };
        let token = BearerToken::parse(token_for("alice", 3600)).unwrap();
        assert!(matches!(
            HttpRoomApi::new(&config, &token),
            Err(ApiError::InvalidUrl(_))
        ));
    }
}
