//! Chat orchestration engine.
//!
//! Drives one turn end-to-end for one platform: opens the provider stream,
//! forwards unified `ApiState` units to an optional broadcast channel,
//! detects completed tool calls, executes them through the `ToolManager`,
//! folds the results back into the transcript, and re-issues the request
//! until the model stops calling tools or the iteration cap is hit.
//!
//! Fan-out across platforms is the caller's job: one engine turn per
//! enabled platform, sharing nothing but the read-only history.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use braid_abstraction::{
    ApiState, ApiStateStream, ChatMessage, Platform, ProviderClient, ToolCall, TranscriptItem,
};

use crate::manager::ToolManager;

/// Why a turn stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model completed its response without requesting more tools.
    Stop,
    /// The tool-call loop hit `max_tool_iterations`; the response carries a
    /// truncation notice.
    IterationLimit,
    /// The caller cancelled the turn.
    Cancelled,
    /// The provider stream failed.
    Error,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stop => "stop",
            Self::IterationLimit => "iteration_limit",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// The folded result of one platform's turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Accumulated assistant text, including any partial text streamed
    /// before a failure or cancellation.
    pub content: String,
    /// Why the turn stopped.
    pub finish_reason: FinishReason,
    /// Every tool call executed during the turn, in execution order.
    pub executed_calls: Vec<ToolCall>,
    /// The terminal stream error, when `finish_reason` is `Error`.
    pub error: Option<String>,
    /// Provider requests issued.
    pub iterations: u32,
}

/// What one provider stream produced, after draining it to the end.
#[derive(Default)]
struct DrainedStream {
    text: String,
    calls: Option<Vec<ToolCall>>,
    error: Option<String>,
    cancelled: bool,
}

/// Orchestrates streaming chat turns against one provider client.
pub struct ChatEngine {
    client: Arc<dyn ProviderClient>,
    tools: ToolManager,
    event_tx: Option<broadcast::Sender<ApiState>>,
}

impl ChatEngine {
    #[must_use]
    pub fn new(client: Arc<dyn ProviderClient>, tools: ToolManager) -> Self {
        Self { client, tools, event_tx: None }
    }

    /// Streams every `ApiState` unit of subsequent turns to `event_tx`.
    #[must_use]
    pub fn with_event_channel(mut self, event_tx: broadcast::Sender<ApiState>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// The tool manager backing this engine's turns.
    #[must_use]
    pub fn tool_manager(&self) -> &ToolManager {
        &self.tools
    }

    fn emit(&self, state: ApiState) {
        if let Some(tx) = &self.event_tx {
            // A send error only means nobody is subscribed right now.
            let _ = tx.send(state);
        }
    }

    /// Runs one turn to completion.
    ///
    /// `history` is the platform-visible conversation ending with the user
    /// message being answered. The turn is infallible from the caller's
    /// view: failures surface as `FinishReason::Error` with partial text
    /// preserved, and the event channel always ends with `Done`.
    pub async fn run_turn(
        &self,
        platform: &Platform,
        history: &[ChatMessage],
        cancel: CancellationToken,
    ) -> TurnOutcome {
        self.emit(ApiState::Loading);

        let tools = self.tools.available_tools().await;
        let mut transcript: Vec<TranscriptItem> =
            history.iter().cloned().map(TranscriptItem::Message).collect();

        let mut content = String::new();
        let mut executed_calls: Vec<ToolCall> = Vec::new();
        let mut error = None;
        let mut iterations: u32 = 0;

        let finish_reason = loop {
            if iterations >= platform.max_tool_iterations {
                warn!(
                    platform = %platform.client_type,
                    limit = platform.max_tool_iterations,
                    "tool call iteration limit reached"
                );
                content.push_str(&truncation_notice(platform.max_tool_iterations));
                break FinishReason::IterationLimit;
            }
            iterations += 1;

            debug!(
                platform = %platform.client_type,
                model = %platform.model,
                iteration = iterations,
                "requesting completion"
            );
            let stream = self.client.stream_chat(platform, &transcript, &tools).await;
            let DrainedStream { text, calls, error: stream_error, cancelled } =
                self.drain(stream, &cancel).await;
            content.push_str(&text);

            if cancelled {
                break FinishReason::Cancelled;
            }
            if let Some(message) = stream_error {
                error = Some(message);
                break FinishReason::Error;
            }
            let Some(calls) = calls else {
                break FinishReason::Stop;
            };

            transcript.push(TranscriptItem::ToolCalls { assistant_text: text, calls: calls.clone() });
            for call in &calls {
                self.emit(ApiState::ToolExecuting {
                    name: call.name.clone(),
                    call_id: call.id.clone(),
                });
            }

            let results = tokio::select! {
                () = cancel.cancelled() => break FinishReason::Cancelled,
                results = self.tools.execute_all(&calls) => results,
            };
            self.emit(ApiState::ToolResultReceived { results: results.clone() });
            executed_calls.extend(calls);
            transcript.push(TranscriptItem::ToolResults(results));
        };

        self.emit(ApiState::Done);
        TurnOutcome { content, finish_reason, executed_calls, error, iterations }
    }

    /// Consumes one provider stream, forwarding every unit to the event
    /// channel while folding text, tool calls, and the terminal error.
    async fn drain(&self, mut stream: ApiStateStream, cancel: &CancellationToken) -> DrainedStream {
        let mut drained = DrainedStream::default();
        loop {
            let state = tokio::select! {
                () = cancel.cancelled() => {
                    // Dropping the stream tears the connection down.
                    drained.cancelled = true;
                    return drained;
                }
                state = stream.next() => state,
            };
            let Some(state) = state else { return drained };
            self.emit(state.clone());

            match state {
                ApiState::Success { text } => drained.text.push_str(&text),
                ApiState::ToolCallRequested { calls } => {
                    drained.calls.get_or_insert_with(Vec::new).extend(calls);
                }
                ApiState::Error { message } => {
                    drained.error = Some(message);
                    return drained;
                }
                _ => {}
            }
        }
    }
}

fn truncation_notice(limit: u32) -> String {
    format!("\n\n[Reached the tool call limit of {limit} iterations; stopping here.]")
}
