//! Customer-support question answering: intent routing, policy-document
//! retrieval, and a staged pipeline that fuses structured and document answers.

pub mod agents;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod providers;

#[cfg(test)]
pub(crate) mod test_support;
