//! Shared document cache
//!
//! `WsdlCache` is a cheap-to-clone handle. Parsed documents are cached by
//! location so include graphs load each file once; a document is registered
//! before its own includes are followed, which is what makes an include cycle
//! terminate. Resolved WSDLs are cached by location as well unless the caller
//! disables it.

use crate::wsdl::definitions::ParsedDefinitions;
use crate::wsdl::Wsdl;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Cache key: canonical location plus the options that change parsing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Canonical location
    pub location: String,
    /// Parsing-relevant options
    pub options: String,
}

impl CacheKey {
    /// Build a key
    pub fn new(location: impl Into<String>, options: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            options: options.into(),
        }
    }
}

/// Cache of parsed documents and resolved WSDLs
#[derive(Clone, Default)]
pub struct WsdlCache {
    documents: Arc<RwLock<HashMap<CacheKey, Arc<ParsedDefinitions>>>>,
    resolved: Arc<RwLock<HashMap<CacheKey, Arc<Wsdl>>>>,
}

impl WsdlCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed document by key
    pub async fn document(&self, key: &CacheKey) -> Option<Arc<ParsedDefinitions>> {
        let documents = self.documents.read().await;
        let hit = documents.get(key).cloned();
        if hit.is_some() {
            debug!("Document cache hit: {}", key.location);
        }
        hit
    }

    /// Store a parsed document; later stores replace earlier ones
    pub async fn store_document(&self, key: CacheKey, definitions: Arc<ParsedDefinitions>) {
        self.documents.write().await.insert(key, definitions);
    }

    /// Resolved WSDL by key
    pub async fn wsdl(&self, key: &CacheKey) -> Option<Arc<Wsdl>> {
        let resolved = self.resolved.read().await;
        let hit = resolved.get(key).cloned();
        if hit.is_some() {
            debug!("WSDL cache hit: {}", key.location);
        }
        hit
    }

    /// Store a resolved WSDL; the first stored value for a key wins
    pub async fn store_wsdl(&self, key: CacheKey, wsdl: Arc<Wsdl>) -> Arc<Wsdl> {
        let mut resolved = self.resolved.write().await;
        resolved.entry(key).or_insert(wsdl).clone()
    }

    /// Number of cached documents
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Drop everything
    pub async fn clear(&self) {
        self.documents.write().await.clear();
        self.resolved.write().await.clear();
    }
}

impl std::fmt::Debug for WsdlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsdlCache").finish_non_exhaustive()
    }
}
