//! GitHub contents API backend.
//!
//! Files are read with `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`
//! and written with `PUT` on the same URL. Content travels base64-encoded and
//! the blob `sha` is the revision marker.
//!
//! # Conflicts
//!
//! GitHub answers `409` when the supplied `sha` is stale and `422` with a
//! message mentioning `sha` when a create hits an existing file. Both map to
//! [`StoreError::Conflict`].

use super::{RemoteStore, Revision, StoredFile, validate_path};
use crate::error::StoreError;
use crate::utils::truncate_for_log;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// Where and as whom to commit.
#[derive(Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub api_base: String,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug)]
pub struct GitHubStore {
    client: Client,
    api_base: Url,
    owner: String,
    repo: String,
    branch: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutResponseContent,
}

#[derive(Debug, Deserialize)]
struct PutResponseContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

impl GitHubStore {
    pub fn new(config: &GitHubConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| StoreError::Decode("token is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        let api_base = Url::parse(&config.api_base)
            .map_err(|e| StoreError::Decode(format!("invalid API base `{}`: {e}", config.api_base)))?;

        Ok(Self {
            client,
            api_base,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            name: format!("github:{}/{}@{}", config.owner, config.repo, config.branch),
        })
    }

    /// `{api}/repos/{owner}/{repo}/contents/{path}` with each segment escaped.
    fn contents_url(&self, path: &str) -> Result<Url, StoreError> {
        let path = validate_path(path)?;
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidPath(path.to_string()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str(), "contents"])
            .extend(path.split('/'));
        Ok(url)
    }

    async fn read_raw(&self, url: Url) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get(url)
            .query(&[("ref", self.branch.as_str())])
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await?;
        let response = ensure_success(response, "raw read").await?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl RemoteStore for GitHubStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "info", skip(self), fields(store = %self.name))]
    async fn read(&self, path: &str) -> Result<Option<StoredFile>, StoreError> {
        let url = self.contents_url(path)?;
        let response = self
            .client
            .get(url.clone())
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Artifact not found; treating as absent");
            return Ok(None);
        }
        let response = ensure_success(response, path).await?;
        let body = response.bytes().await?;
        let file: ContentsFile = serde_json::from_slice(&body)
            .map_err(|e| StoreError::Decode(format!("`{path}` is not a file: {e}")))?;

        let content = match (file.encoding.as_deref(), file.content) {
            (Some("base64"), Some(encoded)) if !encoded.is_empty() => decode_base64(&encoded)?,
            _ => {
                // Files over 1 MB come back without inline content.
                debug!("No inline content; fetching raw media type");
                self.read_raw(url).await?
            }
        };

        debug!(bytes = content.len(), sha = %file.sha, "Read artifact");
        Ok(Some(StoredFile {
            content,
            revision: Revision(file.sha),
        }))
    }

    #[instrument(level = "info", skip(self, content), fields(store = %self.name, bytes = content.len()))]
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        revision: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, StoreError> {
        let t0 = Instant::now();
        let url = self.contents_url(path)?;
        let body = PutContents {
            message,
            content: BASE64.encode(content),
            branch: &self.branch,
            sha: revision.map(|r| r.0.as_str()),
        };

        let response = self.client.put(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(put_failure(status, path, message));
        }
        let body = response.bytes().await?;
        let put: PutResponse = serde_json::from_slice(&body)
            .map_err(|e| StoreError::Decode(format!("PUT `{path}` response: {e}")))?;

        info!(
            sha = %put.content.sha,
            created = revision.is_none(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Committed artifact"
        );
        Ok(Revision(put.content.sha))
    }
}

/// Map a rejected PUT onto a store error. A stale `sha` (409) and a create
/// over an existing file (422 naming `sha`) are both conflicts.
fn put_failure(status: StatusCode, path: &str, message: String) -> StoreError {
    let stale = status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && message.contains("sha"));
    if stale {
        StoreError::Conflict {
            path: path.to_string(),
        }
    } else {
        StoreError::Status {
            status: status.as_u16(),
            path: path.to_string(),
            message,
        }
    }
}

async fn ensure_success(response: Response, path: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = error_message(response).await;
    Err(StoreError::Status {
        status: status.as_u16(),
        path: path.to_string(),
        message,
    })
}

async fn error_message(response: Response) -> String {
    match response.bytes().await {
        Ok(body) => match serde_json::from_slice::<ApiMessage>(&body) {
            Ok(api) if !api.message.is_empty() => api.message,
            _ => truncate_for_log(&String::from_utf8_lossy(&body), 200),
        },
        Err(e) => e.to_string(),
    }
}

/// Decode the contents API's base64, which is wrapped at 60 columns.
fn decode_base64(encoded: &str) -> Result<Vec<u8>, StoreError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| StoreError::Decode(format!("invalid base64 content: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Answer one request per connection with the scripted `(status, body)`
    /// pairs, in order. Resolves to the raw requests received.
    async fn serve(replies: Vec<(u16, String)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                let reply = format!(
                    "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });
        (base, handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn store() -> GitHubStore {
        store_at(DEFAULT_API_BASE)
    }

    fn store_at(api_base: &str) -> GitHubStore {
        GitHubStore::new(&GitHubConfig {
            api_base: api_base.to_string(),
            token: "ghp_test".to_string(),
            owner: "octo".to_string(),
            repo: "digest".to_string(),
            branch: "main".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_contents_url() {
        let url = store().contents_url("data/2024-01-01.json").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/digest/contents/data/2024-01-01.json"
        );
    }

    #[test]
    fn test_contents_url_escapes_segments() {
        let url = store().contents_url("my images/2024-01-01.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/digest/contents/my%20images/2024-01-01.png"
        );
    }

    #[test]
    fn test_contents_url_rejects_traversal() {
        assert!(matches!(
            store().contents_url("../x"),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let encoded = "eyJkYXRlIjoi\nMjAyNC0wMS0w\nMSJ9\n";
        assert_eq!(decode_base64(encoded).unwrap(), br#"{"date":"2024-01-01"}"#);
        assert!(decode_base64("@@@").is_err());
    }

    #[test]
    fn test_put_body_omits_sha_on_create() {
        let body = PutContents {
            message: "m",
            content: BASE64.encode(b"hi"),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "aGk=");
        assert!(json.get("sha").is_none());
    }

    #[test]
    fn test_put_failure_mapping() {
        let path = "data/2024-01-01.json";
        assert!(put_failure(StatusCode::CONFLICT, path, "is at abc but expected def".into()).is_conflict());
        assert!(
            put_failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                path,
                "Invalid request. \"sha\" wasn't supplied.".into()
            )
            .is_conflict()
        );
        match put_failure(StatusCode::UNPROCESSABLE_ENTITY, path, "Invalid path".into()) {
            StoreError::Status { status, message, .. } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Invalid path");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            put_failure(StatusCode::FORBIDDEN, path, "Resource not accessible".into()),
            StoreError::Status { status: 403, .. }
        ));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_none() {
        let (base, server) = serve(vec![(404, r#"{"message":"Not Found"}"#.to_string())]).await;
        let found = store_at(&base).read("data/2024-01-01.json").await.unwrap();
        assert_eq!(found, None);

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /repos/octo/digest/contents/data/2024-01-01.json?ref=main "));
    }

    #[tokio::test]
    async fn test_read_inline_content() {
        let body = r#"{"sha":"abc123","encoding":"base64","content":"eyJkYXRlIjoi\nMjAyNC0wMS0w\nMSJ9\n"}"#;
        let (base, _server) = serve(vec![(200, body.to_string())]).await;
        let file = store_at(&base)
            .read("data/2024-01-01.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.revision, Revision("abc123".to_string()));
        assert_eq!(file.content, br#"{"date":"2024-01-01"}"#);
    }

    #[tokio::test]
    async fn test_read_large_file_falls_back_to_raw_media() {
        let (base, server) = serve(vec![
            (200, r#"{"sha":"big1","encoding":"none","content":""}"#.to_string()),
            (200, "PNGDATA".to_string()),
        ])
        .await;
        let file = store_at(&base)
            .read("images/2024-01-01.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.revision, Revision("big1".to_string()));
        assert_eq!(file.content, b"PNGDATA");

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].to_lowercase().contains("accept: application/vnd.github.raw+json"));
    }

    #[tokio::test]
    async fn test_write_sends_sha_and_returns_new_revision() {
        let (base, server) = serve(vec![(200, r#"{"content":{"sha":"new456"}}"#.to_string())]).await;
        let revision = store_at(&base)
            .write(
                "data/2024-01-01.json",
                b"hi",
                Some(&Revision("old123".to_string())),
                "Update digest for 2024-01-01",
            )
            .await
            .unwrap();
        assert_eq!(revision, Revision("new456".to_string()));

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("PUT /repos/octo/digest/contents/data/2024-01-01.json "));
        assert!(requests[0].contains(r#""sha":"old123""#));
        assert!(requests[0].contains(r#""content":"aGk=""#));
    }

    #[tokio::test]
    async fn test_write_stale_sha_is_conflict() {
        let (base, _server) = serve(vec![(409, r#"{"message":"is at abc but expected def"}"#.to_string())]).await;
        let err = store_at(&base)
            .write("data/2024-01-01.json", b"hi", Some(&Revision("def".to_string())), "m")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_write_create_over_existing_is_conflict() {
        let body = r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#;
        let (base, _server) = serve(vec![(422, body.to_string())]).await;
        let err = store_at(&base)
            .write("data/2024-01-01.json", b"hi", None, "m")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_write_other_unprocessable_is_status() {
        let (base, _server) = serve(vec![(422, r#"{"message":"Validation Failed"}"#.to_string())]).await;
        let err = store_at(&base)
            .write("data/2024-01-01.json", b"hi", None, "m")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 422, .. }));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = GitHubConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            token: "ghp_secret".to_string(),
            owner: "o".to_string(),
            repo: "r".to_string(),
            branch: "main".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(!format!("{config:?}").contains("ghp_secret"));
    }
}
