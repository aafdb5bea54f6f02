//! Outfitter - Hybrid Product-Discovery Retrieval Engine
//!
//! Turns a shopper's natural-language query, image-derived attributes, or an
//! anchor catalog item into a ranked, explained list of products. Candidates
//! come from independent lexical and dense retrieval passes, merged with
//! Reciprocal Rank Fusion, selectively refined by an external reranker, and
//! adjusted by deterministic business rules. External providers degrade
//! silently; ranking never fails because a model call did.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod intent;
pub mod provider;
pub mod query;
pub mod retrieval;

pub use error::{OutfitterError, Result};
