pub mod retriever;
pub mod router;
pub mod structured;
pub mod summarizer;
pub mod synthesizer;

pub use retriever::RetrieverAgent;
pub use router::RouterAgent;
pub use structured::{HttpStructuredBackend, StructuredBackend};
pub use summarizer::{SummarizerAgent, NO_RELEVANT_INFORMATION};
pub use synthesizer::SynthesizerAgent;
