//! Audio publishing backends: Google Drive, or the local content directory.

use crate::config::DriveCredentials;
use anyhow::{Context, Result};
use async_trait::async_trait;
use obsede_core::storage::{AudioStore, Uploaded};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Where the Google endpoints live; overridable for tests.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub token_url: String,
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileLinks {
    web_content_link: Option<String>,
    web_view_link: Option<String>,
    /// Drive reports sizes as decimal strings.
    size: Option<String>,
}

fn audio_mime(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        _ => "audio/mpeg",
    }
}

/// Uploads episode audio to Google Drive and shares it with anyone holding the link.
pub struct DriveStorage {
    http: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
    folder_id: Option<String>,
    endpoints: DriveEndpoints,
}

impl DriveStorage {
    pub fn new(credentials: &DriveCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: credentials.client_id.clone(),
            client_secret: SecretString::from(credentials.client_secret.expose_secret()),
            refresh_token: SecretString::from(credentials.refresh_token.expose_secret()),
            folder_id: credentials.folder_id.clone(),
            endpoints: DriveEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: DriveEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Exchanges the refresh token for a short-lived access token.
    async fn access_token(&self) -> Result<String> {
        let token: TokenResponse = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("refresh_token", self.refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?
            .error_for_status()
            .context("OAuth token refresh was rejected")?
            .json()
            .await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl AudioStore for DriveStorage {
    async fn upload(&self, path: &Path, name: &str) -> Result<Uploaded> {
        let token = self.access_token().await?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let local_size = bytes.len() as u64;

        let created: CreatedFile = self
            .http
            .post(format!("{}/files", self.endpoints.upload_base))
            .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, audio_mime(name))
            .body(bytes)
            .send()
            .await?
            .error_for_status()
            .context("Drive media upload failed")?
            .json()
            .await?;
        info!(file_id = %created.id, "Uploaded audio to Drive");

        let file_url = format!("{}/files/{}", self.endpoints.api_base, created.id);
        let mut rename = self
            .http
            .patch(&file_url)
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(&token)
            .json(&json!({ "name": name }));
        if let Some(folder) = &self.folder_id {
            rename = rename.query(&[("addParents", folder.as_str())]);
        }
        rename
            .send()
            .await?
            .error_for_status()
            .context("Failed to name the Drive file")?;

        self.http
            .post(format!("{file_url}/permissions"))
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(&token)
            .json(&json!({ "type": "anyone", "role": "reader" }))
            .send()
            .await?
            .error_for_status()
            .context("Failed to share the Drive file")?;

        let links: FileLinks = self
            .http
            .get(&file_url)
            .query(&[("fields", "webContentLink,webViewLink,size"), ("supportsAllDrives", "true")])
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()
            .context("Failed to read the Drive file links")?
            .json()
            .await?;

        let url = links
            .web_content_link
            .or(links.web_view_link)
            .context("Drive returned no shareable link")?;
        let size = links
            .size
            .and_then(|s| s.parse().ok())
            .unwrap_or(local_size);
        Ok(Uploaded { url, size })
    }
}

/// Publishes audio from the static site's own content directory.
pub struct LocalStorage {
    content_dir: PathBuf,
    url_prefix: String,
}

impl LocalStorage {
    /// `content_dir` is served at the same relative path under `public_base_url`.
    pub fn new(content_dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        let content_dir = content_dir.into();
        let relative = content_dir
            .to_string_lossy()
            .replace('\\', "/")
            .trim_start_matches("./")
            .trim_matches('/')
            .to_string();
        Self {
            url_prefix: format!("{}/{relative}", public_base_url.trim_end_matches('/')),
            content_dir,
        }
    }
}

#[async_trait]
impl AudioStore for LocalStorage {
    async fn upload(&self, path: &Path, name: &str) -> Result<Uploaded> {
        let target = self.content_dir.join(name);
        if path != target {
            tokio::fs::create_dir_all(&self.content_dir).await?;
            tokio::fs::copy(path, &target)
                .await
                .with_context(|| format!("Failed to copy {} into {}", path.display(), self.content_dir.display()))?;
        }
        let size = tokio::fs::metadata(&target).await?.len();
        let url = format!("{}/{name}", self.url_prefix);
        info!(%url, size, "Audio published from the content directory");
        Ok(Uploaded { url, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(folder: Option<&str>) -> DriveCredentials {
        DriveCredentials {
            client_id: "client".to_string(),
            client_secret: SecretString::from("secret"),
            refresh_token: SecretString::from("refresh"),
            folder_id: folder.map(str::to_string),
        }
    }

    fn endpoints(server: &MockServer) -> DriveEndpoints {
        DriveEndpoints {
            token_url: format!("{}/token", server.uri()),
            api_base: format!("{}/drive/v3", server.uri()),
            upload_base: format!("{}/upload/drive/v3", server.uri()),
        }
    }

    #[test]
    fn test_audio_mime() {
        assert_eq!(audio_mime("daily_drill_2026-03-01.mp3"), "audio/mpeg");
        assert_eq!(audio_mime("daily_drill_2026-03-01.wav"), "audio/wav");
        assert_eq!(audio_mime("noext"), "audio/mpeg");
    }

    #[tokio::test]
    async fn test_local_storage_copies_and_builds_url() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tmp.mp3");
        std::fs::write(&source, [0u8; 12]).unwrap();
        let content_dir = dir.path().join("content/audio");
        let store = LocalStorage {
            content_dir: content_dir.clone(),
            url_prefix: "https://example.org/content/audio".to_string(),
        };

        let uploaded = store.upload(&source, "daily_drill_2026-03-01.mp3").await.unwrap();

        assert_eq!(uploaded.url, "https://example.org/content/audio/daily_drill_2026-03-01.mp3");
        assert_eq!(uploaded.size, 12);
        assert!(content_dir.join("daily_drill_2026-03-01.mp3").exists());
    }

    #[test]
    fn test_local_url_prefix() {
        let store = LocalStorage::new("./content/audio", "https://longieee.github.io/daily-french-learning/");
        assert_eq!(store.url_prefix, "https://longieee.github.io/daily-french-learning/content/audio");
    }

    #[tokio::test]
    async fn test_drive_upload_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "media"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "f1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/drive/v3/files/f1"))
            .and(query_param("addParents", "folder"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "f1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files/f1/permissions"))
            .and(body_string_contains("anyone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/f1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "webContentLink": "https://drive.google.com/uc?id=f1&export=download",
                "size": "2048"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("daily_drill_2026-03-01.mp3");
        std::fs::write(&file, [0u8; 16]).unwrap();

        let store = DriveStorage::new(&credentials(Some("folder"))).with_endpoints(endpoints(&server));
        let uploaded = store.upload(&file, "daily_drill_2026-03-01.mp3").await.unwrap();

        assert_eq!(uploaded.url, "https://drive.google.com/uc?id=f1&export=download");
        assert_eq!(uploaded.size, 2048);
    }

    #[tokio::test]
    async fn test_drive_rejected_token_fails_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, [0u8; 4]).unwrap();

        let store = DriveStorage::new(&credentials(None)).with_endpoints(endpoints(&server));
        let err = store.upload(&file, "a.mp3").await.unwrap_err();
        assert!(format!("{err:#}").contains("OAuth token refresh was rejected"));
    }
}
