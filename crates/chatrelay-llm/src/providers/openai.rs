use async_trait::async_trait;
use chatrelay_core::PromptUnit;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::provider::{LLMChunk, LLMError, LLMProvider, LLMStream, Result};
use crate::sse::llm_stream_from_sse;

/// Streaming provider for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request_body(
        &self,
        units: &[PromptUnit],
        max_output_tokens: Option<u32>,
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = units
            .iter()
            .map(|unit| {
                serde_json::json!({
                    "role": unit.role().as_str(),
                    "content": unit.content(),
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(max_tokens) = max_output_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        log::debug!(
            "Request body: model={}, messages={}, summaries={}",
            self.model,
            units.len(),
            units.iter().filter(|u| u.is_summary()).count()
        );

        body
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat_stream(
        &self,
        units: &[PromptUnit],
        max_output_tokens: Option<u32>,
    ) -> Result<LLMStream> {
        let body = self.build_request_body(units, max_output_tokens);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let text = response.text().await.unwrap_or_default();
            log::warn!("Completion backend rate limited the request: {}", text);
            return Err(LLMError::RateLimited(text));
        }
        if !status.is_success() {
            let text = response.text().await?;
            return Err(LLMError::Api(format!("HTTP {}: {}", status, text)));
        }

        Ok(llm_stream_from_sse(response, |_event, data| {
            parse_sse_data(data)
        }))
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl StreamErrorBody {
    fn is_rate_limit(&self) -> bool {
        let code = self
            .code
            .as_ref()
            .map(|code| match code {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let error_type = self.error_type.as_deref().unwrap_or_default();

        code.contains("rate_limit") || code == "429" || error_type.contains("rate_limit")
    }
}

fn parse_sse_data(data: &str) -> Result<Option<LLMChunk>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;

    if let Some(error) = chunk.error {
        if error.is_rate_limit() {
            return Err(LLMError::RateLimited(error.message));
        }
        return Err(LLMError::Api(error.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(LLMChunk::Token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::ChatMessage;
    use futures::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn units() -> Vec<PromptUnit> {
        vec![
            PromptUnit::Verbatim(ChatMessage::system("persona")),
            PromptUnit::Verbatim(ChatMessage::user("Hello")),
        ]
    }

    #[test]
    fn request_body_maps_roles_and_summaries() {
        let provider = OpenAIProvider::new("sk").with_model("test-model");
        let units = vec![
            PromptUnit::Summary {
                content: "earlier".to_string(),
                covers: 0..3,
            },
            PromptUnit::Verbatim(ChatMessage::user("now")),
        ];

        let body = provider.build_request_body(&units, Some(256));

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "earlier");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn parse_sse_data_handles_done_content_and_errors() {
        assert_eq!(parse_sse_data("[DONE]").unwrap(), None);
        assert_eq!(
            parse_sse_data(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap(),
            Some(LLMChunk::Token("Hel".to_string()))
        );
        assert_eq!(
            parse_sse_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );

        let err = parse_sse_data(
            r#"{"error":{"message":"slow down","type":"requests","code":"rate_limit_exceeded"}}"#,
        )
        .unwrap_err();
        assert!(err.is_rate_limited());

        let err = parse_sse_data(r#"{"error":{"message":"bad model"}}"#).unwrap_err();
        assert!(matches!(err, LLMError::Api(message) if message == "bad model"));
    }

    #[tokio::test]
    async fn streams_fragments_in_order() {
        let mock_server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let provider = OpenAIProvider::new("sk-test").with_base_url(mock_server.uri());
        let stream = provider.chat_stream(&units(), None).await.unwrap();
        let chunks: Vec<LLMChunk> = stream.map(|chunk| chunk.unwrap()).collect().await;

        assert_eq!(
            chunks,
            vec![
                LLMChunk::Token("Hel".to_string()),
                LLMChunk::Token("lo".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn http_429_is_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
            .mount(&mock_server)
            .await;

        let provider = OpenAIProvider::new("sk-test").with_base_url(mock_server.uri());
        let error = match provider.chat_stream(&units(), None).await {
            Ok(_) => panic!("expected rate limit"),
            Err(error) => error,
        };

        assert!(error.is_rate_limited());
    }

    #[tokio::test]
    async fn other_http_failures_are_api_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let provider = OpenAIProvider::new("sk-test").with_base_url(mock_server.uri());
        let error = match provider.complete(&units(), None).await {
            Ok(_) => panic!("expected api error"),
            Err(error) => error,
        };

        assert!(matches!(error, LLMError::Api(message) if message.contains("500")));
    }
}
