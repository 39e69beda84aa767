//! HTTP object-store transport.
//!
//! Talks to a minimal object API: `PUT /v1/objects/{key}` stores a blob,
//! `GET /v1/objects/{key}` fetches one, and `GET /v1/objects?prefix=`
//! lists keys as a JSON string array. Any gateway exposing these three
//! routes works as a shared store.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};

use daybook_core::errors::TransportError;
use daybook_core::sync::{BlobTransport, RemoteBlobName, SYNC_USER_ID};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpBlobStore {
    /// `base_url` is the API root, e.g. `https://store.example.com`.
    pub fn new(base_url: &str, token: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn headers(&self) -> std::result::Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| TransportError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/v1/objects/{}", self.base_url, key)
    }

    async fn check_status(
        key: &str,
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!("[Sync] Remote store error for {key} ({status}): {body}");
        match status {
            StatusCode::NOT_FOUND => Err(TransportError::not_found(key)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TransportError::auth(format!("{status}: {body}")))
            }
            _ => Err(TransportError::api(status.as_u16(), body)),
        }
    }
}

#[async_trait]
impl BlobTransport for HttpBlobStore {
    async fn upload(
        &self,
        name: &RemoteBlobName,
        bytes: Vec<u8>,
    ) -> std::result::Result<(), TransportError> {
        let key = name.object_key(SYNC_USER_ID);
        let response = self
            .client
            .put(self.object_url(&key))
            .headers(self.headers()?)
            .header(CONTENT_TYPE, "application/json")
            .body(bytes)
            .send()
            .await
            .map_err(|err| TransportError::network(err.to_string()))?;
        Self::check_status(&key, response).await?;
        Ok(())
    }

    async fn list(
        &self,
        after_timestamp: Option<i64>,
        exclude_device_id: Option<&str>,
    ) -> std::result::Result<Vec<RemoteBlobName>, TransportError> {
        let prefix = format!("sync/{SYNC_USER_ID}/");
        let mut request = self
            .client
            .get(format!("{}/v1/objects", self.base_url))
            .headers(self.headers()?)
            .query(&[("prefix", prefix.as_str())]);
        if let Some(after) = after_timestamp {
            request = request.query(&[("after", after.to_string())]);
        }
        let response = request
            .send()
            .await
            .map_err(|err| TransportError::network(err.to_string()))?;
        let response = Self::check_status(&prefix, response).await?;
        let status = response.status();
        let keys: Vec<String> = response
            .json()
            .await
            .map_err(|err| TransportError::api(status.as_u16(), format!("Invalid listing: {err}")))?;

        // The server-side filters are advisory; apply both again here.
        let blobs = keys
            .iter()
            .filter_map(|key| RemoteBlobName::parse(key))
            .filter(|blob| after_timestamp.map_or(true, |after| blob.timestamp > after))
            .filter(|blob| exclude_device_id.map_or(true, |own| blob.device_id != own))
            .collect();
        Ok(blobs)
    }

    async fn download(
        &self,
        name: &RemoteBlobName,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let key = name.object_key(SYNC_USER_ID);
        let response = self
            .client
            .get(self.object_url(&key))
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|err| TransportError::network(err.to_string()))?;
        let response = Self::check_status(&key, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransportError::network(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        authorization: Option<String>,
        body: Vec<u8>,
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            authorization: headers.get("authorization").cloned(),
            body,
        })
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let reason = match status {
            200 => "OK",
            401 => "Unauthorized",
            404 => "Not Found",
            _ => "Error",
        };
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reason,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        status: u16,
        body: String,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let captured_clone = Arc::clone(&captured);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let captured_inner = Arc::clone(&captured_clone);
                let body = body.clone();
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);
                    let _ = write_http_response(&mut stream, status, &body).await;
                });
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    #[tokio::test]
    async fn upload_puts_the_raw_body_under_the_object_key() {
        let (base_url, captured, server) = start_mock_server(200, "{}".to_string()).await;
        let store = HttpBlobStore::new(&base_url, "test-token");

        store
            .upload(
                &RemoteBlobName::new("dev-a", 123),
                b"[{\"id\":\"op-1\"}]".to_vec(),
            )
            .await
            .expect("upload");

        let requests = captured.lock().await.clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].request_line,
            "PUT /v1/objects/sync/default/dev-a_123.json HTTP/1.1"
        );
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer test-token"));
        assert_eq!(requests[0].body, b"[{\"id\":\"op-1\"}]".to_vec());

        server.abort();
    }

    #[tokio::test]
    async fn list_keeps_only_parseable_names_past_the_filters() {
        let listing = r#"[
            "sync/default/dev-b_200.json",
            "sync/default/dev-b_50.json",
            "sync/default/dev-a_300.json",
            "sync/default/readme.txt"
        ]"#;
        let (base_url, captured, server) = start_mock_server(200, listing.to_string()).await;
        let store = HttpBlobStore::new(&base_url, "test-token");

        let blobs = store
            .list(Some(100), Some("dev-a"))
            .await
            .expect("list");

        assert_eq!(blobs, vec![RemoteBlobName::new("dev-b", 200)]);
        let requests = captured.lock().await.clone();
        assert!(requests[0]
            .request_line
            .starts_with("GET /v1/objects?prefix=sync%2Fdefault%2F&after=100"));

        server.abort();
    }

    #[tokio::test]
    async fn a_missing_object_maps_to_not_found() {
        let (base_url, _captured, server) =
            start_mock_server(404, r#"{"message":"no such object"}"#.to_string()).await;
        let store = HttpBlobStore::new(&base_url, "test-token");

        let result = store.download(&RemoteBlobName::new("dev-b", 999)).await;

        match result {
            Err(TransportError::NotFound(key)) => {
                assert_eq!(key, "sync/default/dev-b_999.json");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        server.abort();
    }

    #[tokio::test]
    async fn a_rejected_token_maps_to_an_auth_error() {
        let (base_url, _captured, server) =
            start_mock_server(401, r#"{"message":"expired token"}"#.to_string()).await;
        let store = HttpBlobStore::new(&base_url, "stale-token");

        let result = store.list(None, None).await;

        assert!(matches!(result, Err(TransportError::Auth(_))));
        server.abort();
    }
}
