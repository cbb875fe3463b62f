use std::time::Duration;

use reqwest::{Client, Method};
use tracing::error;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    ClientError, Comment, CommentKind, CommentPatch, ErrorResponse, NewComment, ReadStatus,
    ReadStatusBatch,
};

/// REST client for the collaboration backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Self::with_base_url(
            &config.api_base_url,
            config.auth_token.clone(),
            config.request_timeout(),
        )
    }

    /// Build a client against an explicit base URL.
    pub fn with_base_url(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: sanitize_base_url(base_url),
            auth_token,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);
        if let Some(token) = &self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    /// Turn a non-success response into an API error, using the backend's
    /// error body when it sends one.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        error!("API request failed with status {}: {}", status.as_u16(), message);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn list_comments(
        &self,
        kind: CommentKind,
        resource_id: &str,
        include_resolved: bool,
    ) -> Result<Vec<Comment>, ClientError> {
        let path = format!(
            "/{}/{}/comments?include_resolved={}",
            kind.path_segment(),
            resource_id,
            include_resolved
        );
        let response = self.request(Method::GET, &path).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn create_comment(&self, comment: &NewComment) -> Result<Comment, ClientError> {
        let response = self
            .request(Method::POST, "/comments")
            .json(comment)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn update_comment(
        &self,
        id: Uuid,
        patch: &CommentPatch,
    ) -> Result<Comment, ClientError> {
        let path = format!("/comments/{}", id);
        let response = self.request(Method::PATCH, &path).json(patch).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete_comment(&self, id: Uuid) -> Result<(), ClientError> {
        let path = format!("/comments/{}", id);
        let response = self.request(Method::DELETE, &path).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn resolve_comment(&self, id: Uuid) -> Result<Comment, ClientError> {
        let path = format!("/comments/{}/resolve", id);
        let response = self.request(Method::POST, &path).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn fetch_read_statuses(
        &self,
        kind: CommentKind,
        ids: &[Uuid],
    ) -> Result<Vec<ReadStatus>, ClientError> {
        let body = ReadStatusBatch {
            comment_type: kind,
            comment_ids: ids.to_vec(),
        };
        let response = self
            .request(Method::POST, "/comment-reads/status")
            .json(&body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn mark_comments_read(
        &self,
        kind: CommentKind,
        ids: &[Uuid],
    ) -> Result<(), ClientError> {
        let body = ReadStatusBatch {
            comment_type: kind,
            comment_ids: ids.to_vec(),
        };
        let response = self
            .request(Method::POST, "/comment-reads/mark-read")
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn mark_comment_unread(&self, kind: CommentKind, id: Uuid) -> Result<(), ClientError> {
        let path = format!("/comment-reads/mark-unread/{}/{}", kind.as_str(), id);
        let response = self.request(Method::POST, &path).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Normalize a configured base URL so path joins behave.
fn sanitize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_trims_trailing_slashes() {
        assert_eq!(
            sanitize_base_url("http://localhost:3000/api/"),
            "http://localhost:3000/api"
        );
        assert_eq!(
            sanitize_base_url("https://app.example.org/api"),
            "https://app.example.org/api"
        );
    }

    #[test]
    fn sanitize_defaults_to_http() {
        assert_eq!(sanitize_base_url("localhost:3000/api"), "http://localhost:3000/api");
        assert_eq!(sanitize_base_url("  localhost:3000 "), "http://localhost:3000");
    }
}
