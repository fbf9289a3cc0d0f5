use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::GenerationConfig,
    errors::{AgentError, ErrorKind, Result},
    models::ImageFile,
    orchestrator::MusicStudio,
    providers::GenerationService,
};

pub struct AppState<S> {
    studio: Arc<Mutex<MusicStudio<S>>>,
    generation: Arc<GenerationConfig>,
    model: Arc<str>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            studio: self.studio.clone(),
            generation: self.generation.clone(),
            model: self.model.clone(),
        }
    }
}

impl<S: GenerationService> AppState<S> {
    pub fn new(studio: MusicStudio<S>, generation: GenerationConfig) -> Self {
        let model = Arc::from(studio.service().model_name());
        Self {
            studio: Arc::new(Mutex::new(studio)),
            generation: Arc::new(generation),
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    image: Option<ImageBody>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageBody {
    Inline { data: String, media_type: String },
    DataUrl { data_url: String },
}

impl ImageBody {
    fn into_image(self, max_bytes: usize) -> Result<ImageFile> {
        match self {
            ImageBody::Inline { data, media_type } => {
                ImageFile::from_base64(&data, &media_type, max_bytes)
            }
            ImageBody::DataUrl { data_url } => ImageFile::from_data_url(&data_url, max_bytes),
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Service | ErrorKind::Decoding => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.kind(),
            "message": self.user_message(),
            "detail": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

fn busy_response() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": "busy",
            "message": "generation already in progress",
        })),
    )
        .into_response()
}

pub fn router<S: GenerationService + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/api/generate", post(generate_handler::<S>))
        .route(
            "/api/generation",
            get(state_handler::<S>).delete(reset_handler::<S>),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server<S: GenerationService + 'static>(
    addr: SocketAddr,
    state: AppState<S>,
) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "http", %addr, "HTTP 服务已启动");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(target: "http", "收到退出信号，准备关闭");
        })
        .await
        .map_err(|err| AgentError::other(format!("HTTP 服务错误: {err}")))?;

    Ok(())
}

async fn health_handler<S: GenerationService + 'static>(
    State(state): State<AppState<S>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "model": &*state.model,
    }))
}

async fn generate_handler<S: GenerationService + 'static>(
    State(state): State<AppState<S>>,
    body: std::result::Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return AgentError::validation(format!("请求体无效: {}", rejection.body_text()))
                .into_response();
        }
    };

    let image = match body
        .image
        .map(|image| image.into_image(state.generation.max_image_bytes))
        .transpose()
    {
        Ok(image) => image,
        Err(err) => return err.into_response(),
    };

    // 同一时间只允许一个生成请求
    let Ok(mut studio) = state.studio.try_lock() else {
        return busy_response();
    };

    match studio.generate(&body.prompt, image.as_ref()).await {
        Ok(music) => Json(json!({
            "request_id": studio.state().request_id(),
            "music": music,
            "preview_url": state.generation.preview_url,
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn state_handler<S: GenerationService + 'static>(
    State(state): State<AppState<S>>,
) -> Json<serde_json::Value> {
    match state.studio.try_lock() {
        Ok(studio) => Json(studio.state().as_payload()),
        // 锁被占用说明正在生成
        Err(_) => Json(json!({ "status": "pending" })),
    }
}

async fn reset_handler<S: GenerationService + 'static>(
    State(state): State<AppState<S>>,
) -> Response {
    let Ok(mut studio) = state.studio.try_lock() else {
        return busy_response();
    };
    studio.reset();
    Json(studio.state().as_payload()).into_response()
}
