mod api;
mod capabilities;
mod config;
mod errors;
mod models;
mod orchestrator;
mod providers;
mod util;

use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

use crate::{
    api::AppState,
    config::GenerationConfig,
    errors::{AgentError, Result},
    models::ImageFile,
    orchestrator::MusicStudio,
    providers::{GeminiService, GenerationService},
    util::{LOG_TIME_FORMAT, format_local, now_local},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = config::AppConfig::load()?;
    let service = GeminiService::from_config(&config.gemini)?;

    info!(
        target: "app",
        model = service.model_name(),
        max_image_bytes = config.generation.max_image_bytes,
        "音乐描述服务已准备就绪"
    );

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("generate") {
        let args: Vec<String> = args.collect();
        return generate_once(service, &config.generation, &args).await;
    }

    let state = AppState::new(MusicStudio::new(service), config.generation);
    api::run_server(config.server.bind_addr, state).await
}

/// `generate <prompt> [--image <path>]`：单次生成并把结果以 JSON 打印到标准输出
async fn generate_once(
    service: GeminiService,
    generation: &GenerationConfig,
    args: &[String],
) -> Result<()> {
    let mut prompt = Vec::new();
    let mut image_path = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--image" {
            image_path = Some(
                iter.next()
                    .ok_or_else(|| AgentError::validation("--image 需要指定图片路径"))?,
            );
        } else {
            prompt.push(arg.as_str());
        }
    }

    let image = match image_path {
        Some(path) => Some(ImageFile::from_path(path, generation.max_image_bytes).await?),
        None => None,
    };

    let mut studio = MusicStudio::new(service);
    match studio.generate(&prompt.join(" "), image.as_ref()).await {
        Ok(music) => {
            let output = json!({
                "music": music,
                "preview_url": generation.preview_url,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            if let Some(raw) = err.raw_response() {
                error!(target: "app", raw, "模型原始返回");
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_timer(LocalTimer)
        .init();

    info!("tracing initialized");
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = now_local();
        write!(w, "{}", format_local(&now, LOG_TIME_FORMAT))
    }
}
