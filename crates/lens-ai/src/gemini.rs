use crate::backend::{AiError, ChatSession, DocumentState, GenerativeBackend, RemoteDocument};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a software designer and system architect. \
     Analyze the provided source code context and answer questions about it.";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub system_instruction: String,
}

impl GeminiConfig {
    /// Reads `GEMINI_API_KEY` (required) plus the optional `GEMINI_MODEL` and
    /// `GEMINI_BASE_URL` overrides.
    pub fn from_env() -> Result<Self, AiError> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| AiError::MissingApiKey)?;
        Ok(Self {
            api_key,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        })
    }
}

/// Google generative-language API client: raw file upload, file-state poll,
/// and history-carrying `generateContent` chat sessions.
pub struct GeminiBackend {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FilePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePayload {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentPayload>,
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    #[serde(default)]
    parts: Vec<PartPayload>,
}

#[derive(Debug, Deserialize)]
struct PartPayload {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn upload_document(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<RemoteDocument, AiError> {
        let bytes = tokio::fs::read(path).await.map_err(|err| AiError::UploadFailed {
            reason: format!("read {}: {err}", path.display()),
        })?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "uploading document");

        let url = format!(
            "{}/upload/v1beta/files?key={}",
            self.config.base_url, self.config.api_key
        );
        let response = self
            .client
            .post(url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(map_http_error)?;
        let upload: UploadResponse = read_json(response).await?;

        let mime = if upload.file.mime_type.is_empty() {
            mime_type.to_string()
        } else {
            upload.file.mime_type
        };
        Ok(RemoteDocument {
            name: upload.file.name,
            uri: upload.file.uri,
            mime_type: mime,
        })
    }

    async fn document_state(&self, name: &str) -> Result<DocumentState, AiError> {
        let url = format!(
            "{}/v1beta/{}?key={}",
            self.config.base_url, name, self.config.api_key
        );
        let response = self.client.get(url).send().await.map_err(map_http_error)?;
        let file: FilePayload = read_json(response).await?;
        tracing::debug!(name = %file.name, state = %file.state, "document state");
        Ok(document_state_from(&file.state))
    }

    async fn start_session(
        &self,
        document: &RemoteDocument,
    ) -> Result<Box<dyn ChatSession>, AiError> {
        let seed = json!({
            "role": "user",
            "parts": [{
                "fileData": {
                    "mimeType": document.mime_type,
                    "fileUri": document.uri,
                }
            }]
        });
        Ok(Box::new(GeminiSession {
            config: self.config.clone(),
            client: self.client.clone(),
            history: vec![seed],
        }))
    }
}

struct GeminiSession {
    config: GeminiConfig,
    client: reqwest::Client,
    history: Vec<Value>,
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send(&mut self, prompt: &str) -> Result<String, AiError> {
        self.history.push(json!({
            "role": "user",
            "parts": [{ "text": prompt }]
        }));

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );
        let body = json!({
            "systemInstruction": { "parts": [{ "text": self.config.system_instruction }] },
            "contents": self.history,
        });
        tracing::debug!(prompt_len = prompt.len(), turns = self.history.len(), "sending prompt");

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;
        let generated: GenerateResponse = read_json(response).await?;
        let reply = reply_text(&generated).ok_or(AiError::EmptyReply)?;

        self.history.push(json!({
            "role": "model",
            "parts": [{ "text": reply }]
        }));
        Ok(reply)
    }
}

fn document_state_from(state: &str) -> DocumentState {
    match state {
        "ACTIVE" => DocumentState::Active,
        "FAILED" => DocumentState::Failed,
        _ => DocumentState::Processing,
    }
}

fn reply_text(response: &GenerateResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .map(|part| part.text.as_str())
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

fn map_http_error(err: reqwest::Error) -> AiError {
    AiError::Http {
        reason: err.to_string(),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, AiError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(AiError::Api {
            status: status.as_u16(),
            message,
        });
    }
    response.json().await.map_err(map_http_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_state_mapping() {
        assert_eq!(document_state_from("ACTIVE"), DocumentState::Active);
        assert_eq!(document_state_from("FAILED"), DocumentState::Failed);
        assert_eq!(document_state_from("PROCESSING"), DocumentState::Processing);
        assert_eq!(document_state_from(""), DocumentState::Processing);
    }

    #[test]
    fn reply_text_joins_candidate_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "{\"ok\":" }, { "text": " true}" }]
                }
            }]
        }"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(reply_text(&response).unwrap(), "{\"ok\": true}");
    }

    #[test]
    fn reply_text_is_none_for_empty_candidates() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(reply_text(&response).is_none());
    }

    #[test]
    fn upload_response_parses_file_resource() {
        let raw = r#"{
            "file": {
                "name": "files/abc123",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                "mimeType": "text/plain",
                "state": "PROCESSING"
            }
        }"#;
        let upload: UploadResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(upload.file.name, "files/abc123");
        assert_eq!(upload.file.mime_type, "text/plain");
    }
}
