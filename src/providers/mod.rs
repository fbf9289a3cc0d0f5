pub mod gemini;

use std::future::Future;

use crate::{errors::Result, models::GenerationRequest};

pub use gemini::GeminiService;

/// 外部生成服务：接收多模态请求，返回模型的原始文本
pub trait GenerationService: Send + Sync {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<String>> + Send;

    /// 日志与健康检查里展示的模型名
    fn model_name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::GenerationService;
    use crate::{
        errors::{AgentError, Result},
        models::GenerationRequest,
    };

    #[derive(Clone)]
    pub enum StubReply {
        Text(String),
        Fail(String),
        Io,
        /// 永不返回
        Hang,
    }

    /// 记录调用次数与最后一次请求的假服务
    pub struct StubService {
        reply: Mutex<StubReply>,
        calls: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl StubService {
        pub fn replying(text: &str) -> Self {
            Self::new(StubReply::Text(text.to_string()))
        }

        pub fn failing(message: &str) -> Self {
            Self::new(StubReply::Fail(message.to_string()))
        }

        pub fn new(reply: StubReply) -> Self {
            Self {
                reply: Mutex::new(reply),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        pub fn set_reply(&self, reply: StubReply) {
            *self.reply.lock().expect("stub reply") = reply;
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<GenerationRequest> {
            self.last_request.lock().ok().and_then(|guard| guard.clone())
        }
    }

    impl GenerationService for StubService {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut guard) = self.last_request.lock() {
                *guard = Some(request.clone());
            }

            let reply = self.reply.lock().expect("stub reply").clone();
            match reply {
                StubReply::Text(text) => Ok(text),
                StubReply::Fail(message) => Err(AgentError::service(message)),
                StubReply::Io => Err(AgentError::Io(std::io::Error::other("connection reset"))),
                StubReply::Hang => std::future::pending().await,
            }
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }
}
