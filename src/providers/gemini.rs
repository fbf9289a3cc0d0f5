use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    capabilities::result_schema,
    config::GeminiConfig,
    errors::{AgentError, Result},
    models::{GenerationRequest, RequestPart},
    providers::GenerationService,
};

const JSON_MIME_TYPE: &str = "application/json";

/// Gemini `generateContent` 接口的调用实现
///
/// 请求携带 `responseSchema`，但返回内容仍由调用方自行校验。
#[derive(Clone)]
pub struct GeminiService {
    http_client: HttpClient,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiService {
    pub fn from_config(config: &GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::MissingConfig("gemini.api_key"));
        }

        let http_client = HttpClient::builder()
            .user_agent("MusicPromptAPI/0.1")
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: format!("{}/models/{}:generateContent", config.api_base, config.model),
        })
    }
}

impl GenerationService for GeminiService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let payload = build_payload(request);

        info!(
            target: "gemini",
            model = %self.model,
            has_image = request.image.is_some(),
            "调用 Gemini 生成音乐描述"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::service(format!(
                "Gemini API 请求失败 ({status}): {body}"
            )));
        }

        let gemini_response: GeminiGenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::service(format!("解析 Gemini 响应失败: {e}")))?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                target: "gemini",
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                total_tokens = usage.total_token_count,
                "Gemini token 用量"
            );
        }

        gemini_response.extract_text()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn build_payload(request: &GenerationRequest) -> GeminiGenerateRequest<'_> {
    let parts = request
        .parts()
        .into_iter()
        .map(|part| match part {
            RequestPart::Text(text) => GeminiPart::Text { text },
            RequestPart::Image(image) => GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: &image.media_type,
                    data: &image.data,
                },
            },
        })
        .collect();

    GeminiGenerateRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts,
        }],
        generation_config: GeminiGenerationConfig {
            response_mime_type: JSON_MIME_TYPE,
            response_schema: result_schema(),
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig<'a>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig<'a> {
    response_mime_type: &'a str,
    response_schema: &'a Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

impl GeminiGenerateResponse {
    fn extract_text(&self) -> Result<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            return Err(AgentError::service(format!("Gemini 拒绝了该请求: {reason}")));
        }

        let candidate = self
            .candidates
            .first()
            .ok_or_else(|| AgentError::service("Gemini 返回结果为空"))?;

        let text = candidate
            .content
            .as_ref()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AgentError::service(format!(
                "Gemini 返回结果不含文本 (finish_reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GeminiUsage {
    prompt_token_count: u64,
    candidates_token_count: u64,
    total_token_count: u64,
}
