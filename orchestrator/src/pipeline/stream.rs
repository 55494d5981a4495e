use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};

use super::{OrchestrationState, Orchestrator, Stage, NO_RESPONSE};
use crate::metrics;
use crate::models::ChatMessage;

impl Orchestrator {
    /// Same stages as [`Orchestrator::query`], yielding growing prefixes of
    /// the final answer. The retrieval path streams tokens as they arrive;
    /// the other paths yield their complete answer once. The last item always
    /// equals the final response.
    pub fn stream_query(
        self: Arc<Self>,
        query: String,
        history: Vec<ChatMessage>,
    ) -> BoxStream<'static, String> {
        let prefixes = async_stream::stream! {
            let _timer = metrics::QUERY_DURATION.start_timer();
            let mut state = OrchestrationState::new(query, history);
            let mut stage = Stage::Routing;
            let mut last: Option<String> = None;

            while stage != Stage::Done {
                if stage == Stage::DispatchRetrieval && state.error.is_none() {
                    let mut answer = self
                        .summarizer
                        .answer_stream(&state.query, &state.conversation_history)
                        .await;
                    while let Some(prefix) = answer.next().await {
                        last = Some(prefix.clone());
                        yield prefix;
                    }
                    state.retrieval_result = last.clone();
                } else {
                    self.run_stage(stage, &mut state).await;
                }
                stage = stage.next(&state);
            }

            let final_response = state
                .final_response
                .unwrap_or_else(|| NO_RESPONSE.to_string());
            if last.as_deref() != Some(final_response.as_str()) {
                yield final_response;
            }
        };

        prefixes.boxed()
    }
}
