use std::{env, net::SocketAddr, time::Duration};

use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::models::DEFAULT_MAX_IMAGE_BYTES;

const DEFAULT_CONFIG_PATH: &str = "config/app_config.toml";
const ENV_PREFIX: &str = "MUSIC";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
/// 前端播放器使用的占位音轨，与生成结果无关
pub const DEFAULT_PREVIEW_URL: &str = "https://www.soundhelix.com/examples/mp3/SoundHelix-Song-1.mp3";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub max_image_bytes: usize,
    pub preview_url: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub server: ServerConfig,
    pub generation: GenerationConfig,
}

impl AppConfig {
    /// 依次读取配置文件 (可选) 与 `MUSIC__*` 环境变量
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            env::var("APP_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let file_config: FileConfig = ::config::Config::builder()
            .add_source(::config::File::with_name(&config_path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("读取配置文件 {config_path} 失败"))?
            .try_deserialize()
            .with_context(|| format!("解析配置文件 {config_path} 失败"))?;

        let fallback_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .ok();

        Self::from_file(file_config, fallback_key)
    }

    fn from_file(file: FileConfig, fallback_key: Option<String>) -> anyhow::Result<Self> {
        let gemini = file
            .gemini
            .unwrap_or_default()
            .into_domain(fallback_key)
            .ok_or_else(|| {
                anyhow!("请在配置文件 [gemini] 段或 GEMINI_API_KEY 环境变量中提供 api_key")
            })?;

        let server = file.server.unwrap_or_default().into_domain()?;
        let generation = file.generation.unwrap_or_default().into_domain();

        Ok(Self {
            gemini,
            server,
            generation,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    gemini: Option<FileGeminiConfig>,
    #[serde(default)]
    server: Option<FileServerConfig>,
    #[serde(default)]
    generation: Option<FileGenerationConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct FileGeminiConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_base: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl FileGeminiConfig {
    fn into_domain(self, fallback_key: Option<String>) -> Option<GeminiConfig> {
        let api_key = self
            .api_key
            .or(fallback_key)
            .filter(|key| !key.trim().is_empty())?;
        let timeout = self
            .timeout_seconds
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
            .max(5);

        Some(GeminiConfig {
            api_key,
            model: self
                .model
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            api_base: self
                .api_base
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            timeout: Duration::from_secs(timeout),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileServerConfig {
    #[serde(default)]
    bind_addr: Option<String>,
}

impl FileServerConfig {
    fn into_domain(self) -> anyhow::Result<ServerConfig> {
        let bind_addr_str = self
            .bind_addr
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .with_context(|| format!("解析 server.bind_addr 失败: {bind_addr_str}"))?;

        Ok(ServerConfig { bind_addr })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileGenerationConfig {
    #[serde(default)]
    max_image_bytes: Option<usize>,
    #[serde(default)]
    preview_url: Option<String>,
}

impl FileGenerationConfig {
    fn into_domain(self) -> GenerationConfig {
        GenerationConfig {
            max_image_bytes: self.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
            preview_url: self
                .preview_url
                .unwrap_or_else(|| DEFAULT_PREVIEW_URL.to_string()),
        }
    }
}
