use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{ApiError, ConversationRecord, MessageApi, MessageRecord};
use crate::models::{Conversation, ConversationId, Message, SendMessageRequest, UserContext, UserId};

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    msg: String,
}

/// REST client for the messaging endpoints, authenticated with a bearer token.
pub struct HttpMessageApi {
    client: Client,
    base: Url,
    user_id: UserId,
    token: String,
}

impl HttpMessageApi {
    pub fn new(base_url: &str, user: &UserContext, timeout: Duration) -> Result<Self, ApiError> {
        // Url::join drops the last path segment unless it ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base = Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(HttpMessageApi {
            client,
            base,
            user_id: user.id.clone(),
            token: user.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", path, e)))
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = parsed
                .message
                .or_else(|| parsed.errors.into_iter().next().map(|detail| detail.msg))
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            warn!("API error {}: {}", status, message);
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MessageApi for HttpMessageApi {
    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let url = self.endpoint("messages/conversations")?;
        debug!("GET {}", url);
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let records: Vec<ConversationRecord> = Self::read(response).await?;
        Ok(records.into_iter().map(ConversationRecord::into_conversation).collect())
    }

    async fn get_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, ApiError> {
        let url = self.endpoint(&format!("messages/{}", conversation_id))?;
        debug!("GET {}", url);
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let records: Vec<MessageRecord> = Self::read(response).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| record.into_message(conversation_id, None))
            .collect())
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ApiError> {
        let url = self.endpoint("messages")?;
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let record: MessageRecord = Self::read(response).await?;
        record
            .into_message(&request.conversation_id, Some(&self.user_id))
            .ok_or_else(|| ApiError::Decode("message response without sender".to_string()))
    }
}
