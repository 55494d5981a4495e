use crate::models::{AgentKind, ChatMessage, RouteDecision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Routing,
    DispatchStructured,
    DispatchRetrieval,
    DispatchBoth,
    Synthesize,
    Done,
}

impl Stage {
    /// Transition out of `self` given what the current stage recorded.
    pub fn next(self, state: &OrchestrationState) -> Stage {
        match self {
            Stage::Routing => match state.route_decision.as_ref().map(|d| d.agent) {
                Some(AgentKind::Structured) => Stage::DispatchStructured,
                Some(AgentKind::Both) => Stage::DispatchBoth,
                Some(AgentKind::Retrieval) | None => Stage::DispatchRetrieval,
            },
            Stage::DispatchStructured | Stage::DispatchRetrieval | Stage::DispatchBoth => {
                Stage::Synthesize
            }
            Stage::Synthesize | Stage::Done => Stage::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Routing => "routing",
            Stage::DispatchStructured => "dispatch_structured",
            Stage::DispatchRetrieval => "dispatch_retrieval",
            Stage::DispatchBoth => "dispatch_both",
            Stage::Synthesize => "synthesize",
            Stage::Done => "done",
        }
    }
}

/// Per-query record handed from stage to stage. Owned by exactly one
/// pipeline run.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationState {
    pub query: String,
    pub conversation_history: Vec<ChatMessage>,
    pub route_decision: Option<RouteDecision>,
    pub structured_result: Option<String>,
    pub retrieval_result: Option<String>,
    pub final_response: Option<String>,
    pub error: Option<String>,
}

impl OrchestrationState {
    pub fn new(query: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        Self {
            query: query.into(),
            conversation_history: history,
            ..Default::default()
        }
    }

    pub fn agent(&self) -> AgentKind {
        self.route_decision
            .as_ref()
            .map(|d| d.agent)
            .unwrap_or(AgentKind::Retrieval)
    }
}
