//! `AgentRunner` — the per-stage reasoning loop.
//!
//! Builds context, calls the LLM, parses tool calls, executes them, and
//! repeats until the stage produces a final answer or exhausts its call
//! budget. `ToolRegistry::invoke` already does approval-gate routing and
//! audit logging, so this loop stays a single straight-line call per turn.
//! Memory recall is injected only for [`StageRole::Analyst`].

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::ai::provider::CostSink;
use crate::ai::types::{CompletionRequest, Message, MessageRole};
use crate::ai::LLMProvider;
use crate::approval::ApprovalGate;
use crate::domain::incident::{Incident, StageError, StageName, StageOutput};
use crate::error::{Result, SentinelError};
use crate::memory::VectorMemory;
use crate::memory::embeddings::EmbeddingProvider;
use crate::tools::{ExecContext, ToolRegistry};

use super::tool_parser::parse_tool_calls;

/// Which pipeline stage this runner is executing, determining its system
/// prompt, memory access, and tool-call budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    Monitor,
    Analyst,
    Healer,
    Communicator,
}

impl StageRole {
    pub fn stage_name(self) -> StageName {
        match self {
            StageRole::Monitor => StageName::Monitor,
            StageRole::Analyst => StageName::Analyst,
            StageRole::Healer => StageName::Healer,
            StageRole::Communicator => StageName::Communicator,
        }
    }
}

pub struct AgentRunner {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    gate: Arc<ApprovalGate>,
    memory: Option<Arc<dyn VectorMemory>>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    cost_sink: Arc<dyn CostSink>,
    model: String,
    tool_call_budget: usize,
    tool_fan_out: usize,
}

impl AgentRunner {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        gate: Arc<ApprovalGate>,
        cost_sink: Arc<dyn CostSink>,
        model: impl Into<String>,
        tool_call_budget: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            gate,
            memory: None,
            embeddings: None,
            cost_sink,
            model: model.into(),
            tool_call_budget,
            tool_fan_out: 4,
        }
    }

    pub fn with_tool_fan_out(mut self, tool_fan_out: usize) -> Self {
        self.tool_fan_out = tool_fan_out.max(1);
        self
    }

    pub fn with_memory(
        mut self,
        memory: Arc<dyn VectorMemory>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.memory = Some(memory);
        self.embeddings = Some(embeddings);
        self
    }

    /// Run one stage to completion against `incident`, mutating it in place
    /// and appending a [`StageOutput`]. Bounded by `stage_deadline` and by
    /// `tool_call_budget` tool calls, whichever comes first.
    pub async fn run_stage(
        &self,
        role: StageRole,
        system_prompt: &str,
        incident: &mut Incident,
        ctx: &ExecContext,
        stage_deadline: Duration,
    ) -> Result<StageOutput> {
        let started_at = chrono::Utc::now();
        let deadline_fut = tokio::time::sleep(stage_deadline);
        tokio::pin!(deadline_fut);

        let mut history = vec![Message::system(system_prompt.to_string())];

        if role == StageRole::Analyst
            && let (Some(memory), Some(embeddings)) = (&self.memory, &self.embeddings)
        {
            let query = incident.alert.describe();
            if let Ok(embedding) = embeddings.embed(&query).await
                && let Ok(hits) = memory.similar(&embedding, 5, 0.55).await
                && !hits.is_empty()
            {
                let context = hits
                    .iter()
                    .map(|(rec, score)| {
                        format!(
                            "- ({:.2}) {} outcome={} duration={}s",
                            score, rec.payload.fingerprint, rec.payload.outcome, rec.payload.duration_seconds
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                history.push(Message::system(format!(
                    "Similar past incidents:\n{context}"
                )));
            }
        }

        history.push(Message::user(format!(
            "Incident {}\nAlert: {}\nStatus: {:?}",
            incident.id,
            incident.alert.describe(),
            incident.status
        )));

        let mut errors = Vec::new();
        let mut tool_call_count = 0u32;
        let mut verdict = String::new();

        loop {
            if ctx.is_cancelled() {
                errors.push(StageError {
                    kind: "cancelled".to_string(),
                    message: "context cancelled mid-stage".to_string(),
                });
                break;
            }
            if tool_call_count as usize >= self.tool_call_budget {
                errors.push(StageError {
                    kind: "budget_exceeded".to_string(),
                    message: format!("tool call budget {} exhausted", self.tool_call_budget),
                });
                break;
            }

            let request = CompletionRequest::new(self.model.clone(), history.clone())
                .with_temperature(0.2);

            let response = tokio::select! {
                biased;
                _ = &mut deadline_fut => {
                    errors.push(StageError { kind: "deadline".to_string(), message: "stage wall clock exceeded".to_string() });
                    break;
                }
                r = self.provider.complete(request) => r,
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    errors.push(StageError {
                        kind: "llm_error".to_string(),
                        message: e.to_string(),
                    });
                    return Err(SentinelError::LlmUnavailable(e.to_string()));
                }
            };

            if let Some(usage) = &response.usage {
                self.cost_sink.record(
                    usage.prompt_tokens as u64,
                    usage.completion_tokens as u64,
                    0.0,
                );
            }

            let calls = parse_tool_calls(&response.content);
            if calls.is_empty() {
                verdict = response.content.clone();
                history.push(Message::assistant(response.content));
                break;
            }

            history.push(Message::assistant(response.content));

            let remaining_budget = self.tool_call_budget.saturating_sub(tool_call_count as usize);
            let batch: Vec<_> = calls.into_iter().take(remaining_budget.max(1)).collect();
            tool_call_count += batch.len() as u32;

            let mut pending = stream::iter(batch.into_iter().map(|call| {
                let tools = &self.tools;
                let gate = &self.gate;
                async move {
                    let outcome = tools.invoke_parts(&call.name, call.arguments, ctx, gate).await;
                    (call.name, outcome)
                }
            }))
            .buffer_unordered(self.tool_fan_out);

            while let Some((name, outcome)) = pending.next().await {
                let text = match outcome {
                    Ok((result, invocation)) => {
                        incident.push_tool_invocation(invocation);
                        result.text
                    }
                    Err(e) => {
                        errors.push(StageError {
                            kind: "tool_error".to_string(),
                            message: e.to_string(),
                        });
                        e.to_string()
                    }
                };
                history.push(Message {
                    role: MessageRole::User,
                    content: format!("[tool:{name}] {text}"),
                });
            }
        }

        Ok(StageOutput {
            stage: role.stage_name(),
            started_at,
            ended_at: chrono::Utc::now(),
            verdict,
            tool_call_count,
            errors,
        })
    }
}
