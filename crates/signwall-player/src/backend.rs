//! Backend collaborator: pairing, assignment, schedule, media metadata,
//! blobs and heartbeat.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use signwall_shared::{Assignment, GroupId, Media, MediaId, ScheduleSlot, ScreenId, SyncMode, VersionToken};

use crate::error::BackendError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations the player consumes from the admin side.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Exchange a pairing code shown in the admin console for this
    /// device's screen id.
    async fn pair(&self, code: &str) -> Result<ScreenId, BackendError>;

    /// Current group assignment of `screen_id`. Fails with
    /// [`BackendError::NotAssigned`] when the screen has no group.
    async fn get_assignment(&self, screen_id: &ScreenId) -> Result<Assignment, BackendError>;

    /// Every slot of the group's schedule.
    async fn get_schedule(&self, group_id: &GroupId) -> Result<Vec<ScheduleSlot>, BackendError>;

    /// Metadata for `ids`. Unknown ids are simply absent from the result.
    async fn get_media_metadata(&self, ids: &[MediaId]) -> Result<Vec<Media>, BackendError>;

    async fn fetch_blob(&self, uri: &str) -> Result<Bytes, BackendError>;

    /// Liveness ping.
    async fn heartbeat(&self, screen_id: &ScreenId) -> Result<(), BackendError>;
}

/// Assignment as served by the API. A screen outside any group comes back
/// with a null group.
#[derive(Debug, Deserialize)]
struct AssignmentDto {
    group_id: Option<GroupId>,
    sync_mode: Option<SyncMode>,
    #[serde(alias = "last_updated")]
    version: Option<VersionToken>,
    #[serde(default, alias = "all_screen_ids")]
    member_screen_ids: Vec<ScreenId>,
}

impl AssignmentDto {
    fn into_assignment(self) -> Result<Assignment, BackendError> {
        let Some(group_id) = self.group_id else {
            return Err(BackendError::NotAssigned);
        };
        let version = self
            .version
            .ok_or_else(|| BackendError::Decode("assignment without version".into()))?;

        Ok(Assignment {
            group_id,
            sync_mode: self.sync_mode.unwrap_or(SyncMode::Extend),
            version,
            member_screen_ids: self.member_screen_ids,
        })
    }
}

#[derive(Debug, Serialize)]
struct PairRequest<'a> {
    code: &'a str,
}

/// Pairing answer. A rejected code comes back without a screen id and,
/// sometimes, a reason.
#[derive(Debug, Deserialize)]
struct PairingDto {
    screen_id: Option<ScreenId>,
    #[serde(default)]
    message: Option<String>,
}

impl PairingDto {
    fn into_screen_id(self) -> Result<ScreenId, BackendError> {
        match self.screen_id {
            Some(id) if !id.as_str().is_empty() => Ok(id),
            _ => Err(BackendError::PairingRejected(
                self.message.unwrap_or_else(|| REJECTED_CODE.to_string()),
            )),
        }
    }
}

const REJECTED_CODE: &str = "invalid or expired pairing code";

#[derive(Debug, Serialize)]
struct MediaLookup<'a> {
    ids: &'a [MediaId],
}

/// JSON-over-HTTP implementation of [`Backend`].
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Blob URIs may be absolute or relative to the API host.
    fn blob_url(&self, uri: &str) -> String {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            uri.to_string()
        } else {
            self.url(&format!("/{}", uri.trim_start_matches('/')))
        }
    }

    fn is_api_url(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// The token only goes to the API host. Blob URIs may point at any
    /// storage host.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) if self.is_api_url(url) => req.bearer_auth(token),
            _ => req,
        }
    }

    async fn send(&self, req: RequestBuilder, url: &str) -> Result<Response, BackendError> {
        let response = req.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(BackendError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn pair(&self, code: &str) -> Result<ScreenId, BackendError> {
        let url = self.url("/screens/pair");
        let response = self
            .request(Method::POST, &url)
            .json(&PairRequest { code })
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE | StatusCode::BAD_REQUEST => {
                return Err(BackendError::PairingRejected(REJECTED_CODE.to_string()));
            }
            status if !status.is_success() => {
                return Err(BackendError::Status {
                    status: status.as_u16(),
                    url,
                });
            }
            _ => {}
        }

        let dto: PairingDto = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        dto.into_screen_id()
    }

    async fn get_assignment(&self, screen_id: &ScreenId) -> Result<Assignment, BackendError> {
        let url = self.url(&format!("/screens/{screen_id}/assignment"));
        let response = self.request(Method::GET, &url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotAssigned);
        }
        if !response.status().is_success() {
            return Err(BackendError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let dto: AssignmentDto = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        dto.into_assignment()
    }

    async fn get_schedule(&self, group_id: &GroupId) -> Result<Vec<ScheduleSlot>, BackendError> {
        let url = self.url(&format!("/groups/{group_id}/schedule"));
        let response = self.send(self.request(Method::GET, &url), &url).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn get_media_metadata(&self, ids: &[MediaId]) -> Result<Vec<Media>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url("/media/lookup");
        let response = self
            .send(self.request(Method::POST, &url).json(&MediaLookup { ids }), &url)
            .await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn fetch_blob(&self, uri: &str) -> Result<Bytes, BackendError> {
        let url = self.blob_url(uri);
        debug!(url = %url, "Downloading media blob");
        let response = self.send(self.request(Method::GET, &url), &url).await?;
        Ok(response.bytes().await?)
    }

    async fn heartbeat(&self, screen_id: &ScreenId) -> Result<(), BackendError> {
        let url = self.url(&format!("/screens/{screen_id}/heartbeat"));
        self.send(self.request(Method::POST, &url), &url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_dto_accepts_legacy_field_names() {
        let dto: AssignmentDto = serde_json::from_str(
            r#"{
                "group_id": "lobby",
                "sync_mode": "sync",
                "last_updated": "2024-01-02T00:00:00Z",
                "all_screen_ids": ["a", "b"]
            }"#,
        )
        .unwrap();
        let assignment = dto.into_assignment().unwrap();
        assert_eq!(assignment.group_id, GroupId::from("lobby"));
        assert_eq!(assignment.sync_mode, SyncMode::Sync);
        assert_eq!(assignment.version, "2024-01-02T00:00:00Z".parse().unwrap());
        assert_eq!(assignment.member_screen_ids.len(), 2);
    }

    #[test]
    fn null_group_means_not_assigned() {
        let dto: AssignmentDto =
            serde_json::from_str(r#"{"group_id": null, "version": null}"#).unwrap();
        assert!(matches!(dto.into_assignment(), Err(BackendError::NotAssigned)));
    }

    #[test]
    fn missing_version_is_a_decode_error() {
        let dto: AssignmentDto = serde_json::from_str(r#"{"group_id": "lobby"}"#).unwrap();
        assert!(matches!(dto.into_assignment(), Err(BackendError::Decode(_))));
    }

    #[test]
    fn pairing_answer_carries_screen_id() {
        let dto: PairingDto =
            serde_json::from_str(r#"{"screen_id": "7b0e6c2a-lobby"}"#).unwrap();
        assert_eq!(dto.into_screen_id().unwrap(), ScreenId::from("7b0e6c2a-lobby"));

        let dto: PairingDto =
            serde_json::from_str(r#"{"screen_id": null, "message": "code expired"}"#).unwrap();
        assert!(matches!(
            dto.into_screen_id(),
            Err(BackendError::PairingRejected(reason)) if reason == "code expired"
        ));

        let dto: PairingDto = serde_json::from_str(r#"{"screen_id": ""}"#).unwrap();
        assert!(matches!(dto.into_screen_id(), Err(BackendError::PairingRejected(_))));
    }

    #[test]
    fn token_is_only_sent_to_the_api_host() {
        let backend =
            HttpBackend::new("https://signs.example/api", Some("SECRET".into())).unwrap();
        let auth = |url: &str| {
            backend
                .request(Method::GET, url)
                .build()
                .unwrap()
                .headers()
                .get(reqwest::header::AUTHORIZATION)
                .cloned()
        };

        assert_eq!(
            auth("https://signs.example/api/screens/s1/assignment").unwrap(),
            "Bearer SECRET"
        );
        assert!(auth(&backend.blob_url("/uploads/a.png")).is_some());
        assert!(auth(&backend.blob_url("https://cdn.example/a.png")).is_none());
        assert!(auth("https://signs.example/api.cdn.example/a.png").is_none());
        assert!(auth("http://127.0.0.1:9000/a.png").is_none());
    }

    #[test]
    fn blob_urls_resolve_against_api_host() {
        let backend = HttpBackend::new("https://signs.example/api/", None).unwrap();
        assert_eq!(
            backend.blob_url("https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
        assert_eq!(
            backend.blob_url("/uploads/a.png"),
            "https://signs.example/api/uploads/a.png"
        );
    }
}
