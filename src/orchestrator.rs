use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    capabilities::{build_request, decode_music},
    errors::{AgentError, ErrorKind, Result},
    models::{GeneratedMusic, ImageFile},
    providers::GenerationService,
    util::local_rfc3339,
};

const EMPTY_PROMPT_MESSAGE: &str = "Please enter a prompt to generate music.";
const CANCELLED_MESSAGE: &str = "生成请求在完成前被取消";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AgentError> for GenerationFailure {
    fn from(value: &AgentError) -> Self {
        Self {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}

/// 当前生成槽位。新的请求开始时旧结果即被丢弃。
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationState {
    Idle,
    Pending {
        request_id: Uuid,
        started_at: DateTime<Utc>,
    },
    Settled {
        request_id: Uuid,
        finished_at: DateTime<Utc>,
        outcome: std::result::Result<GeneratedMusic, GenerationFailure>,
    },
}

impl GenerationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, GenerationState::Pending { .. })
    }

    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            GenerationState::Idle => None,
            GenerationState::Pending { request_id, .. }
            | GenerationState::Settled { request_id, .. } => Some(*request_id),
        }
    }

    pub fn music(&self) -> Option<&GeneratedMusic> {
        match self {
            GenerationState::Settled {
                outcome: Ok(music), ..
            } => Some(music),
            _ => None,
        }
    }

    pub fn as_payload(&self) -> Value {
        match self {
            GenerationState::Idle => json!({ "status": "idle" }),
            GenerationState::Pending {
                request_id,
                started_at,
            } => json!({
                "status": "pending",
                "request_id": request_id,
                "started_at": local_rfc3339(started_at),
            }),
            GenerationState::Settled {
                request_id,
                finished_at,
                outcome: Ok(music),
            } => json!({
                "status": "succeeded",
                "request_id": request_id,
                "finished_at": local_rfc3339(finished_at),
                "music": music,
            }),
            GenerationState::Settled {
                request_id,
                finished_at,
                outcome: Err(failure),
            } => json!({
                "status": "failed",
                "request_id": request_id,
                "finished_at": local_rfc3339(finished_at),
                "error": failure,
            }),
        }
    }
}

/// 对外的生成入口：校验 prompt，构造请求，调用服务并严格解析结果
pub struct MusicStudio<S> {
    service: S,
    state: GenerationState,
}

impl<S: GenerationService> MusicStudio<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            state: GenerationState::Idle,
        }
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn reset(&mut self) {
        self.state = GenerationState::Idle;
    }

    pub async fn generate(
        &mut self,
        prompt: &str,
        image: Option<&ImageFile>,
    ) -> Result<GeneratedMusic> {
        // 空 prompt 直接拒绝，上一次的结果保持不变
        if prompt.trim().is_empty() {
            return Err(AgentError::validation(EMPTY_PROMPT_MESSAGE));
        }

        let request_id = Uuid::new_v4();
        let request = build_request(prompt, image);

        info!(
            target: "music_studio",
            %request_id,
            model = self.service.model_name(),
            has_image = image.is_some(),
            "开始生成音乐描述"
        );
        debug!(target: "music_studio", %request_id, prompt, "用户 prompt");

        let Self { service, state } = self;
        let slot = PendingSlot::begin(state, request_id);

        let outcome = match service.generate(&request).await {
            Ok(raw) => decode_music(&raw),
            Err(err @ AgentError::Service(_)) => Err(err),
            Err(other) => Err(AgentError::service(other.to_string())),
        };

        match &outcome {
            Ok(music) => {
                info!(
                    target: "music_studio",
                    %request_id,
                    genre = %music.genre,
                    tempo = music.tempo,
                    "音乐描述生成完成"
                );
                slot.settle(Ok(music.clone()));
            }
            Err(err) => {
                warn!(
                    target: "music_studio",
                    %request_id,
                    kind = %err.kind(),
                    error = %err,
                    "音乐描述生成失败"
                );
                slot.settle(Err(GenerationFailure::from(err)));
            }
        }

        outcome
    }
}

/// 生成进行中的槽位。未正常结束就被丢弃时 (例如客户端断开导致 future 被取消)
/// 会把槽位记为失败，避免一直停留在 Pending。
struct PendingSlot<'a> {
    state: &'a mut GenerationState,
    request_id: Uuid,
    settled: bool,
}

impl<'a> PendingSlot<'a> {
    fn begin(state: &'a mut GenerationState, request_id: Uuid) -> Self {
        *state = GenerationState::Pending {
            request_id,
            started_at: Utc::now(),
        };
        Self {
            state,
            request_id,
            settled: false,
        }
    }

    fn settle(mut self, outcome: std::result::Result<GeneratedMusic, GenerationFailure>) {
        self.write(outcome);
    }

    fn write(&mut self, outcome: std::result::Result<GeneratedMusic, GenerationFailure>) {
        *self.state = GenerationState::Settled {
            request_id: self.request_id,
            finished_at: Utc::now(),
            outcome,
        };
        self.settled = true;
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.settled || !self.state.is_pending() {
            return;
        }
        warn!(
            target: "music_studio",
            request_id = %self.request_id,
            "生成请求在完成前被取消"
        );
        self.write(Err(GenerationFailure {
            kind: ErrorKind::Service,
            message: CANCELLED_MESSAGE.to_string(),
        }));
    }
}
