use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use ultrai_gateway::{ChatCompletion, ChatMessage, Gateway, GatewayError, GatewayResult};

/// Scripted replies are consumed per model in FIFO order; a model with no
/// remaining script answers with a canned draft.
#[derive(Debug, Clone)]
pub(crate) enum ScriptedReply {
    Ok { text: String, ms: u64, delay_ms: u64 },
    RateLimited,
    MidStream,
    Timeout,
    Transport,
}

impl ScriptedReply {
    pub fn ok_after(text: &str, delay_ms: u64) -> Self {
        ScriptedReply::Ok {
            text: text.to_string(),
            ms: delay_ms,
            delay_ms,
        }
    }
}

pub(crate) struct ScriptedGateway {
    ready: Vec<String>,
    reachable: bool,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(ready: &[&str]) -> Self {
        Self {
            ready: ready.iter().map(|s| s.to_string()).collect(),
            reachable: true,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            ready: Vec::new(),
            reachable: false,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, model: &str, reply: ScriptedReply) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls_for(&self, model: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|m| m.as_str() == model)
            .count()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn call(
        &self,
        model: &str,
        _messages: &[ChatMessage],
        timeout: Duration,
    ) -> GatewayResult<ChatCompletion> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(model.to_string());
        let reply = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(model)
            .and_then(|queue| queue.pop_front());
        match reply {
            None => Ok(ChatCompletion {
                text: format!("draft from {model}"),
                finish_reason: "stop".to_string(),
                ms: 7,
            }),
            Some(ScriptedReply::Ok { text, ms, delay_ms }) => {
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Ok(ChatCompletion {
                    text,
                    finish_reason: "stop".to_string(),
                    ms,
                })
            }
            Some(ScriptedReply::RateLimited) => {
                Err(GatewayError::RateLimited("scripted 429".to_string()))
            }
            Some(ScriptedReply::MidStream) => Err(GatewayError::MidStream(model.to_string())),
            Some(ScriptedReply::Timeout) => Err(GatewayError::Timeout(timeout)),
            Some(ScriptedReply::Transport) => {
                Err(GatewayError::Transport("scripted connect failure".to_string()))
            }
        }
    }

    async fn ready_models(&self) -> GatewayResult<Vec<String>> {
        if !self.reachable {
            return Err(GatewayError::Transport(
                "scripted gateway unreachable".to_string(),
            ));
        }
        Ok(self.ready.clone())
    }
}
