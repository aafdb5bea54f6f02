//! Hybrid retrieval and ranking pipeline
//!
//! Candidate generation (lexical + dense), Reciprocal Rank Fusion, adaptive
//! cross-encoder reranking, and deterministic business-rule adjustment. The
//! pipeline is a pure function of (request, catalog snapshot, caches); the
//! only stateful elements are the monotonically filling intent and embedding
//! caches.

mod dense;
mod engine;
mod fusion;
mod lexical;
mod reranker;
mod rules;

pub use dense::{DenseGenerator, EmbeddingCache};
pub use engine::{EngineProviders, EngineStats, RetrievalEngine};
pub use fusion::reciprocal_rank_fusion;
pub use lexical::LexicalGenerator;
pub use reranker::AdaptiveReranker;
pub use rules::{MatchAssessment, MatchVerdict, RuleContext, RuleEffect, RuleEngine, ScoringRule};

use crate::intent::{Intent, VisionSummary};
use serde::{Deserialize, Serialize};

/// Which generator produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSource {
    Lexical,
    Dense,
}

/// A scored candidate from one generator; exists only within one retrieval
/// call
#[derive(Debug, Clone)]
pub struct Candidate {
    pub product_id: u32,
    pub score: f32,
    pub source: CandidateSource,
}

/// A candidate after rank fusion, carrying the 1-indexed rank it held in
/// each contributing list
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub product_id: u32,
    pub fused_score: f32,
    pub lexical_rank: Option<usize>,
    pub dense_rank: Option<usize>,
}

/// Terminal pipeline output: a ranked product with explanation signals.
/// Handed to the caller's session store; the engine does not retain it.
#[derive(Debug, Clone, Serialize)]
pub struct RankedRecommendation {
    pub product_id: u32,
    /// 1-based final rank
    pub rank: usize,
    pub final_score: f32,
    pub confidence: f32,
    pub verdict: rules::MatchVerdict,
    /// Which rules and sources contributed, for the explain surface
    pub signals: Vec<String>,
}

/// One retrieval request; the engine's single entry point accepts any of the
/// three shapes
#[derive(Debug, Clone)]
pub enum RetrieveRequest {
    /// Free-text query, optionally seeded with vision attributes for
    /// image-driven searches
    Search {
        query: String,
        vision: Option<VisionSummary>,
        top_k: usize,
    },

    /// Complete-the-look around an anchor catalog item
    CompleteTheLook { anchor_id: u32, top_k: usize },

    /// Re-run retrieval with a caller-supplied intent (session refinement)
    Refine {
        query: String,
        intent: Intent,
        top_k: usize,
    },
}

impl RetrieveRequest {
    pub fn search(query: impl Into<String>, top_k: usize) -> Self {
        Self::Search {
            query: query.into(),
            vision: None,
            top_k,
        }
    }

    pub fn top_k(&self) -> usize {
        match self {
            Self::Search { top_k, .. }
            | Self::CompleteTheLook { top_k, .. }
            | Self::Refine { top_k, .. } => *top_k,
        }
    }
}
