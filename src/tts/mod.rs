//! Speech synthesis: model registry, selection, engines and the provider
//! that ties them together.

pub mod broker;
pub mod engine;
pub mod models;
pub mod provider;
pub mod selector;
