//! Hand a finished clip to an external document store.
//!
//! The recorder only supplies a record's path and name. The exchange with the
//! store is three calls:
//! 1. POST /api/upload/presign → presigned URL + document ID
//! 2. PUT the file bytes (streamed) to the presigned URL
//! 3. POST /api/documents → register the document under its title

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::UploadConfig;

const PROGRESS_STEP: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("server URL and token must be configured first")]
    NotConfigured,
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("unsupported audio format: .{0}")]
    UnsupportedFormat(String),
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("authentication failed, check the upload token")]
    Unauthorized,
    #[error("{step} failed (HTTP {status}): {body}")]
    Http {
        step: &'static str,
        status: u16,
        body: String,
    },
    #[error("{step} request failed: {source}")]
    Request {
        step: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignResponse {
    upload_url: String,
    storage_key: String,
    document_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDocumentRequest<'a> {
    id: &'a str,
    title: &'a str,
    file_name: &'a str,
    storage_key: &'a str,
    file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    format: &'a str,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub document_id: String,
    pub storage_key: String,
}

/// Upload the clip at `path` under `title`.
pub async fn upload_record(
    path: &Path,
    title: &str,
    duration: Option<Duration>,
    config: &UploadConfig,
) -> Result<UploadResult, UploadError> {
    if !config.is_configured() {
        return Err(UploadError::NotConfigured);
    }
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| UploadError::FileNotFound(path.display().to_string()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| UploadError::FileNotFound(path.display().to_string()))?;
    let (content_type, format) = detect_audio_format(path)?;
    let file_size = metadata.len();

    let base_url = normalize_url(&config.server_url);
    let client = build_client(&config.token)?;

    let presign = presign(&client, &base_url, &file_name, content_type).await?;
    debug!("presigned upload for {file_name}: {}", presign.document_id);

    put_file(path, &presign.upload_url, content_type, file_size).await?;

    let body = RegisterDocumentRequest {
        id: &presign.document_id,
        title,
        file_name: &file_name,
        storage_key: &presign.storage_key,
        file_size,
        duration: duration.map(|d| d.as_secs_f64()),
        format,
    };
    let response = client
        .post(format!("{base_url}/api/documents"))
        .json(&body)
        .send()
        .await
        .map_err(|source| UploadError::Request {
            step: "register",
            source,
        })?;
    check_status("register", response).await?;

    info!("uploaded {file_name} as document {}", presign.document_id);
    Ok(UploadResult {
        document_id: presign.document_id,
        storage_key: presign.storage_key,
    })
}

fn build_client(token: &str) -> Result<reqwest::Client, UploadError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        format!("Bearer {token}")
            .parse()
            .map_err(|e| UploadError::InvalidToken(format!("{e}")))?,
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|source| UploadError::Request {
            step: "client",
            source,
        })
}

async fn presign(
    client: &reqwest::Client,
    base_url: &str,
    file_name: &str,
    content_type: &str,
) -> Result<PresignResponse, UploadError> {
    let response = client
        .post(format!("{base_url}/api/upload/presign"))
        .json(&serde_json::json!({
            "fileName": file_name,
            "contentType": content_type,
        }))
        .send()
        .await
        .map_err(|source| UploadError::Request {
            step: "presign",
            source,
        })?;
    let response = check_status("presign", response).await?;
    response
        .json::<PresignResponse>()
        .await
        .map_err(|source| UploadError::Request {
            step: "presign",
            source,
        })
}

/// Stream the file to the presigned URL. The URL carries its own
/// credentials, so no Authorization header is sent.
async fn put_file(
    path: &Path,
    upload_url: &str,
    content_type: &str,
    file_size: u64,
) -> Result<(), UploadError> {
    let file = tokio::fs::File::open(path).await?;
    let mut sent = 0u64;
    let mut next_report = PROGRESS_STEP;
    let stream = ReaderStream::new(file).inspect_ok(move |chunk: &Bytes| {
        sent += chunk.len() as u64;
        if sent >= next_report {
            debug!("uploaded {sent}/{file_size} bytes");
            next_report += PROGRESS_STEP;
        }
    });

    let storage_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|source| UploadError::Request {
            step: "upload",
            source,
        })?;
    let response = storage_client
        .put(upload_url)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, file_size)
        .body(reqwest::Body::wrap_stream(stream))
        .send()
        .await
        .map_err(|source| UploadError::Request {
            step: "upload",
            source,
        })?;
    check_status("upload", response).await?;
    Ok(())
}

async fn check_status(
    step: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, UploadError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(UploadError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::Http {
            step,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Normalize a server URL: no trailing slash, https:// when no scheme given.
fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if !url.starts_with("http://") && !url.starts_with("https://") {
        format!("https://{url}")
    } else {
        url.to_string()
    }
}

/// Map a file extension to (content type, format).
fn detect_audio_format(path: &Path) -> Result<(&'static str, &'static str), UploadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => Ok(("audio/mpeg", "mp3")),
        "wav" => Ok(("audio/wav", "wav")),
        "m4a" => Ok(("audio/mp4", "m4a")),
        "ogg" | "oga" => Ok(("audio/ogg", "ogg")),
        "flac" => Ok(("audio/flac", "flac")),
        "3gp" => Ok(("audio/3gpp", "3gp")),
        _ => Err(UploadError::UnsupportedFormat(ext)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> UploadConfig {
        UploadConfig {
            server_url: "docs.example.com/".to_string(),
            token: "tok_abc".to_string(),
        }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("https://docs.example.com/"), "https://docs.example.com");
        assert_eq!(normalize_url("docs.example.com"), "https://docs.example.com");
        assert_eq!(normalize_url("http://localhost:7025"), "http://localhost:7025");
        assert_eq!(normalize_url("  https://docs.dev/  "), "https://docs.dev");
    }

    #[test]
    fn test_detect_audio_format() {
        assert_eq!(
            detect_audio_format(Path::new("a.MP3")).unwrap(),
            ("audio/mpeg", "mp3")
        );
        assert_eq!(
            detect_audio_format(Path::new("a.wav")).unwrap(),
            ("audio/wav", "wav")
        );
        assert_eq!(
            detect_audio_format(Path::new("a.3gp")).unwrap(),
            ("audio/3gpp", "3gp")
        );
        match detect_audio_format(Path::new("notes.txt")) {
            Err(UploadError::UnsupportedFormat(ext)) => assert_eq!(ext, "txt"),
            other => panic!("expected UnsupportedFormat, got: {other:?}"),
        }
    }

    #[test]
    fn test_register_request_serialization() {
        let req = RegisterDocumentRequest {
            id: "doc-1",
            title: "standup",
            file_name: "21_02_2026_14_30_52.mp3",
            storage_key: "uploads/doc-1.mp3",
            file_size: 1024,
            duration: Some(5.0),
            format: "mp3",
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"fileName\":\"21_02_2026_14_30_52.mp3\""));
        assert!(json.contains("\"storageKey\""));
        assert!(json.contains("\"fileSize\":1024"));
        assert!(json.contains("\"duration\":5.0"));

        let req = RegisterDocumentRequest { duration: None, ..req };
        assert!(!serde_json::to_string(&req).unwrap().contains("duration"));
    }

    #[test]
    fn test_presign_response_parsing() {
        let parsed: PresignResponse = serde_json::from_str(
            r#"{"uploadUrl":"https://store/x","storageKey":"k","documentId":"d"}"#,
        )
        .unwrap();
        assert_eq!(parsed.upload_url, "https://store/x");
        assert_eq!(parsed.storage_key, "k");
        assert_eq!(parsed.document_id, "d");
    }

    #[tokio::test]
    async fn test_upload_requires_config() {
        let result = upload_record(
            Path::new("/tmp/a.mp3"),
            "a",
            None,
            &UploadConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(UploadError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let result = upload_record(
            Path::new("/nonexistent/clip.mp3"),
            "clip",
            None,
            &configured(),
        )
        .await;
        assert!(matches!(result, Err(UploadError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_upload_unsupported_format() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        let result = upload_record(&path, "notes", None, &configured()).await;
        assert!(matches!(result, Err(UploadError::UnsupportedFormat(_))));
    }
}
