//! Model-backed resolver: answers questions with a locally loaded model,
//! grounded in the profile through the prompt.
//!
//! The inference context is owned here and moves through
//! `Uninitialized -> Loading -> Ready`, dropping to `Failed` when the runtime
//! errors mid-answer. Concurrent `initialize` calls share one in-flight load.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::capabilities::Capabilities;
use crate::intent::IntentResolver;
use crate::llm_client::{prompts, CompletionParams, InferenceContext, InferenceRuntime, LlmError};
use crate::model::ModelManager;
use crate::models::profile::Profile;

type PendingLoad = Shared<BoxFuture<'static, Option<Arc<dyn InferenceContext>>>>;

enum State {
    Uninitialized,
    Loading(PendingLoad),
    Ready(Arc<dyn InferenceContext>),
    Failed(String),
}

/// Externally visible assistant state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssistantStatus {
    Uninitialized,
    Loading,
    Ready,
    Failed { reason: String },
}

pub struct ModelAssistant {
    profile: Arc<Profile>,
    intents: Arc<IntentResolver>,
    models: Arc<ModelManager>,
    runtime: Arc<dyn InferenceRuntime>,
    capabilities: Arc<dyn Capabilities>,
    params: CompletionParams,
    state: Mutex<State>,
}

impl ModelAssistant {
    pub fn new(
        intents: Arc<IntentResolver>,
        models: Arc<ModelManager>,
        runtime: Arc<dyn InferenceRuntime>,
        capabilities: Arc<dyn Capabilities>,
    ) -> Self {
        let profile = intents.profile().clone();
        let params = CompletionParams {
            stop: prompts::stop_tokens(&profile),
            ..CompletionParams::default()
        };
        Self {
            profile,
            intents,
            models,
            runtime,
            capabilities,
            params,
            state: Mutex::new(State::Uninitialized),
        }
    }

    /// Whether this deployment can run the assistant at all.
    pub fn is_enabled(&self) -> bool {
        self.capabilities.has_inference_runtime() && self.capabilities.has_filesystem()
    }

    /// Loads the inference context if it is not loaded yet. Returns whether
    /// the assistant is ready afterwards.
    pub async fn initialize(&self) -> bool {
        let pending = {
            let mut state = self.state.lock().await;
            let in_flight = match &*state {
                State::Ready(_) => return true,
                State::Loading(pending) => Some(pending.clone()),
                State::Uninitialized | State::Failed(_) => None,
            };
            match in_flight {
                Some(pending) => pending,
                None => {
                    if !self.is_enabled() {
                        debug!("Assistant disabled: no inference runtime or filesystem");
                        return false;
                    }
                    let pending = load_context(self.models.clone(), self.runtime.clone())
                        .boxed()
                        .shared();
                    *state = State::Loading(pending.clone());
                    pending
                }
            }
        };

        let loaded = pending.clone().await;

        let mut state = self.state.lock().await;
        let is_current_load = matches!(&*state, State::Loading(current) if current.ptr_eq(&pending));
        if is_current_load {
            return match loaded {
                Some(context) => {
                    *state = State::Ready(context);
                    true
                }
                None => {
                    *state = State::Uninitialized;
                    false
                }
            };
        }

        // Another caller sharing this load already stored it.
        let stored = match (&*state, &loaded) {
            (State::Ready(current), Some(context)) => same_context(current, context),
            _ => false,
        };
        drop(state);
        if stored {
            return true;
        }

        // Released while loading.
        if let Some(context) = loaded {
            context.release().await;
        }
        false
    }

    /// Answers `question` with the model. `None` means the caller should use
    /// another backend: the model is unavailable, inference failed, or the
    /// output was empty after cleanup.
    pub async fn answer(&self, question: &str) -> Option<String> {
        if self.intents.is_greeting(question) {
            return Some(prompts::canned_greeting(&self.profile));
        }

        if !self.initialize().await {
            return None;
        }

        let context = match &*self.state.lock().await {
            State::Ready(context) => context.clone(),
            _ => return None,
        };

        let prompt = prompts::build_prompt(&self.profile, question);
        match context.complete(&prompt, &self.params).await {
            Ok(raw) => {
                let text = prompts::strip_role_labels(&raw, self.profile.first_name());
                if text.is_empty() {
                    debug!("Model answer was empty after removing role labels");
                    None
                } else {
                    Some(text)
                }
            }
            Err(LlmError::EmptyContent) => {
                debug!("Model returned empty content");
                None
            }
            Err(e) => {
                error!("Inference failed: {e}");
                self.mark_failed(&context, e.to_string()).await;
                None
            }
        }
    }

    /// Disposes of the inference context. Safe to call in any state.
    pub async fn release(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, State::Uninitialized)
        };
        if let State::Ready(context) = previous {
            context.release().await;
            info!("Inference context released");
        }
    }

    pub async fn status(&self) -> AssistantStatus {
        match &*self.state.lock().await {
            State::Uninitialized => AssistantStatus::Uninitialized,
            State::Loading(_) => AssistantStatus::Loading,
            State::Ready(_) => AssistantStatus::Ready,
            State::Failed(reason) => AssistantStatus::Failed {
                reason: reason.clone(),
            },
        }
    }

    async fn mark_failed(&self, context: &Arc<dyn InferenceContext>, reason: String) {
        {
            let mut state = self.state.lock().await;
            let is_current = matches!(&*state, State::Ready(current) if same_context(current, context));
            if is_current {
                *state = State::Failed(reason);
            }
        }
        context.release().await;
    }
}

fn same_context(a: &Arc<dyn InferenceContext>, b: &Arc<dyn InferenceContext>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Loads the first catalog artifact that passes validation. A truncated
/// file earlier in the catalog never shadows a valid one after it.
async fn load_context(
    models: Arc<ModelManager>,
    runtime: Arc<dyn InferenceRuntime>,
) -> Option<Arc<dyn InferenceContext>> {
    let Some(artifact) = models.resolve_artifact().await.cloned() else {
        warn!("No model artifact can be resolved");
        return None;
    };

    if !models.exists_and_valid(Some(&artifact)).await {
        info!(model_id = %artifact.id, "Model not downloaded yet");
        return None;
    }

    let path = models.model_path(&artifact);
    info!(model_id = %artifact.id, "Loading model from {}", path.display());
    match runtime.load(&path).await {
        Ok(context) => {
            info!(model_id = %artifact.id, "Model loaded");
            Some(context)
        }
        Err(e) => {
            error!(model_id = %artifact.id, "Failed to load model: {e}");
            None
        }
    }
}
