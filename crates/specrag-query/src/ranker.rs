//! Hybrid keyword and vector ranking.

use std::sync::Arc;

use tracing::{debug, error, warn};

use specrag_core::{
    DocumentStore, FieldMapping, Fragment, RagError, Result, ScoredFragment, TermQuery,
    VectorSource,
};

use crate::fusion::hybrid_fusion;

/// Ranker configuration.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Index searched by keyword match.
    pub index: String,

    /// Keyword weight in `[0, 1]`.
    pub alpha: f32,

    /// Field names of stored fragments.
    pub fields: FieldMapping,
}

impl RankerConfig {
    /// Create a configuration, rejecting `alpha` outside `[0, 1]`.
    pub fn new(index: impl Into<String>, alpha: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(RagError::invalid_argument(format!(
                "alpha must be within [0, 1], got {}",
                alpha
            )));
        }
        Ok(Self {
            index: index.into(),
            alpha,
            fields: FieldMapping::default(),
        })
    }

    /// Override the stored field names.
    pub fn with_fields(mut self, fields: FieldMapping) -> Self {
        self.fields = fields;
        self
    }
}

/// Ranks fragments by fusing a keyword match with a similarity source.
pub struct HybridRanker<S, V> {
    store: Arc<S>,
    vectors: Arc<V>,
    config: RankerConfig,
}

impl<S: DocumentStore, V: VectorSource> HybridRanker<S, V> {
    /// Create a new ranker.
    pub fn new(store: Arc<S>, vectors: Arc<V>, config: RankerConfig) -> Self {
        Self {
            store,
            vectors,
            config,
        }
    }

    /// Get the ranker configuration.
    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Top `k` fragments for `query`.
    ///
    /// Never fails: any error from either source is logged and an empty
    /// list is returned.
    pub async fn rank(&self, query: &str, k: usize) -> Vec<Fragment> {
        match self.rank_scored(query, k).await {
            Ok(scored) => scored.into_iter().map(|s| s.fragment).collect(),
            Err(e) => {
                error!("Hybrid ranking failed for {:?}: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Top `k` fragments for `query` with their fused scores.
    pub async fn rank_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredFragment>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let keyword = self.keyword_hits(query, k).await?;
        let vector = self.vectors.similarity_search(query, k).await?;

        debug!(
            "Fusing {} keyword hits with {} vector hits (alpha={})",
            keyword.len(),
            vector.len(),
            self.config.alpha
        );

        Ok(hybrid_fusion(keyword, vector, self.config.alpha, k))
    }

    async fn keyword_hits(&self, query: &str, k: usize) -> Result<Vec<ScoredFragment>> {
        let match_query = TermQuery::matching(&self.config.fields.text_field, query);
        let hits = self.store.search(&self.config.index, &match_query, k).await?;

        let scored = hits
            .into_iter()
            .filter_map(|hit| match Fragment::from_source(&hit.source, &self.config.fields) {
                Ok(fragment) => Some(ScoredFragment {
                    id: hit.id,
                    score: hit.score,
                    fragment,
                }),
                Err(e) => {
                    warn!("Skipping keyword hit {}: {}", hit.id, e);
                    None
                }
            })
            .collect();

        Ok(scored)
    }
}
