use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{InferenceBackend, ModelInfo};
use crate::attachment::Base64Blob;
use crate::error::{BackendError, DirectoryError};

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<&'a [Base64Blob]>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<ModelInfo>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const NOT_RUNNING_HINT: &str = "Make sure Ollama is running with: ollama serve";

fn endpoint(host: &str, path: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), path)
}

/// Ollama reports failures as `{"error": "..."}`. Fall back to the raw body, then
/// to a hint when the body is empty.
async fn error_detail(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<OllamaErrorResponse>(&body) {
        Ok(parsed) if !parsed.error.trim().is_empty() => parsed.error,
        _ if !body.trim().is_empty() && !body.trim_start().starts_with('{') => body.trim().to_string(),
        _ => NOT_RUNNING_HINT.to_string(),
    }
}

/// Ollama HTTP API client. The host is passed per call so the directory stays the
/// single owner of the current host.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
}

impl OllamaClient {
    /// Connecting is bounded; generation itself may legitimately take minutes.
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!("Client build error, using defaults: {}", e);
                Client::new()
            });
        Self { client }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn send_inference_request(
        &self,
        host: &str,
        model: &str,
        prompt: &str,
        images: &[Base64Blob],
    ) -> Result<String, BackendError> {
        let url = endpoint(host, "/api/generate");

        let request = OllamaRequest {
            model,
            prompt,
            stream: false,
            images: if images.is_empty() { None } else { Some(images) },
        };

        debug!(%url, model, images = images.len(), "sending generate request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Request error: {}", e);
                BackendError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = error_detail(response).await;
            error!(status, %detail, "generate request rejected");
            return Err(BackendError::Status { status, detail });
        }

        let body = response.text().await.map_err(|e| {
            error!("Response error: {}", e);
            BackendError::Transport(e.to_string())
        })?;

        let ollama_response: OllamaResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Parse error: {}", e);
            BackendError::Parse(e.to_string())
        })?;

        Ok(ollama_response.response)
    }

    async fn list_models(&self, host: &str) -> Result<Vec<ModelInfo>, DirectoryError> {
        let url = endpoint(host, "/api/tags");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_builder() {
                DirectoryError::InvalidHost(host.to_string())
            } else {
                DirectoryError::HostUnreachable {
                    host: host.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = error_detail(response).await;
            return Err(DirectoryError::Status { status, detail });
        }

        let models_response: OllamaModelsResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::UnexpectedResponse(e.to_string()))?;

        Ok(models_response.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request body.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + content_length || n == 0 {
                        socket.write_all(reply.as_bytes()).await.unwrap();
                        return text[split + 4..].to_string();
                    }
                }
                if n == 0 {
                    return String::new();
                }
            }
        });

        (host, handle)
    }

    #[test]
    fn test_request_omits_empty_images() {
        let request = OllamaRequest {
            model: "llava",
            prompt: "hi",
            stream: false,
            images: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"model": "llava", "prompt": "hi", "stream": false}));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(endpoint("http://localhost:11434/", "/api/tags"), "http://localhost:11434/api/tags");
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_and_single_image() {
        let (host, server) = serve_once("200 OK", r#"{"response":"Hi there","done":true}"#).await;
        let images = vec![Base64Blob::encode(b"img")];

        let text = OllamaClient::new()
            .send_inference_request(&host, "llava", "Hello", &images)
            .await
            .unwrap();
        assert_eq!(text, "Hi there");

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(body["model"], "llava");
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["images"], serde_json::json!(["aW1n"]));
    }

    #[tokio::test]
    async fn test_generate_error_status() {
        let (host, _server) = serve_once("500 Internal Server Error", "{}").await;
        let err = OllamaClient::new()
            .send_inference_request(&host, "llava", "Hello", &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::Status {
                status: 500,
                detail: NOT_RUNNING_HINT.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_generate_error_body_is_the_detail() {
        let (host, _server) = serve_once(
            "404 Not Found",
            r#"{"error":"model 'llava' not found, try pulling it first"}"#,
        )
        .await;
        let err = OllamaClient::new()
            .send_inference_request(&host, "llava", "Hello", &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BackendError::Status {
                status: 404,
                detail: "model 'llava' not found, try pulling it first".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Ollama request failed with status 404: model 'llava' not found, try pulling it first"
        );
    }

    #[tokio::test]
    async fn test_list_models_error_body_is_the_detail() {
        let (host, _server) = serve_once("500 Internal Server Error", r#"{"error":"disk full"}"#).await;
        let err = OllamaClient::new().list_models(&host).await.unwrap_err();
        match err {
            DirectoryError::Status { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "disk full");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_generate_unparseable_body() {
        let (host, _server) = serve_once("200 OK", r#"{"unexpected":1}"#).await;
        let err = OllamaClient::new()
            .send_inference_request(&host, "llava", "Hello", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Parse(_)));
    }

    #[tokio::test]
    async fn test_list_models() {
        let (host, _server) =
            serve_once("200 OK", r#"{"models":[{"name":"llava:7b","size":1},{"name":"gemma3:latest"}]}"#).await;
        let models = OllamaClient::new().list_models(&host).await.unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llava:7b", "gemma3:latest"]);
    }

    #[tokio::test]
    async fn test_list_models_unreachable_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = OllamaClient::new().list_models(&host).await.unwrap_err();
        assert!(matches!(err, DirectoryError::HostUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_list_models_malformed_host() {
        let err = OllamaClient::new().list_models("http://[::1").await.unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidHost(_)));
    }
}
