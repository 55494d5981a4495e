//! In-process fakes for the external capabilities.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agents::StructuredBackend;
use crate::error::ProviderError;
use crate::models::ChatMessage;
use crate::providers::{CompletionProvider, EmbeddingProvider, TokenStream};

/// Deterministic bag-of-words embedder: FNV-1a hashed tokens, L2-normalized.
pub struct HashEmbedder {
    dims: usize,
    model: String,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self::with_model(dims, "hash-embed")
    }

    pub fn with_model(dims: usize, model: &str) -> Self {
        Self { dims, model: model.to_string(), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % dims as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(hash_embed(text, self.dims))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

pub struct FailingEmbedder {
    dims: usize,
}

impl FailingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Network("embedding service unreachable".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hash-embed"
    }
}

/// Declares one width but embeds to another, like a provider pointed at the
/// wrong model.
pub struct MisreportingEmbedder {
    declared: usize,
    actual: usize,
}

impl MisreportingEmbedder {
    pub fn new(declared: usize, actual: usize) -> Self {
        Self { declared, actual }
    }
}

#[async_trait]
impl EmbeddingProvider for MisreportingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(hash_embed(text, self.actual))
    }

    fn dimensions(&self) -> usize {
        self.declared
    }

    fn model_name(&self) -> &str {
        "hash-embed"
    }
}

/// Replays canned completions in order and records every prompt it sees.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::from_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn from_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn system_prompt(&self, call: usize) -> String {
        self.prompts.lock()[call].0.clone()
    }

    pub fn messages(&self, call: usize) -> Vec<ChatMessage> {
        self.prompts.lock()[call].1.clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        self.prompts
            .lock()
            .push((system_prompt.to_string(), messages.to_vec()));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Api("no scripted reply left".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Streams a fixed reply word by word, optionally breaking after `fail_after`
/// words.
pub struct WordStreamCompletion {
    reply: String,
    fail_after: Option<usize>,
}

impl WordStreamCompletion {
    pub fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), fail_after: None }
    }

    pub fn failing_after(reply: &str, words: usize) -> Self {
        Self { reply: reply.to_string(), fail_after: Some(words) }
    }
}

#[async_trait]
impl CompletionProvider for WordStreamCompletion {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        Ok(self.reply.clone())
    }

    async fn complete_stream(
        &self,
        _system_prompt: &str,
        _messages: &[ChatMessage],
    ) -> Result<TokenStream, ProviderError> {
        let mut items: Vec<Result<String, ProviderError>> = self
            .reply
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(ProviderError::Network("connection reset".to_string())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn model_name(&self) -> &str {
        "word-stream"
    }
}

pub struct FakeStructured {
    answer: Result<String, String>,
    calls: AtomicUsize,
}

impl FakeStructured {
    pub fn answering(answer: &str) -> Self {
        Self { answer: Ok(answer.to_string()), calls: AtomicUsize::new(0) }
    }

    pub fn failing(reason: &str) -> Self {
        Self { answer: Err(reason.to_string()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredBackend for FakeStructured {
    async fn answer(
        &self,
        _question: &str,
        _history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(ProviderError::Api)
    }

    async fn stats(&self) -> Result<BTreeMap<String, i64>, ProviderError> {
        Ok(BTreeMap::from([
            ("customers".to_string(), 12),
            ("tickets".to_string(), 30),
        ]))
    }
}
