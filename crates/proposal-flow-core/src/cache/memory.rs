//! In-memory [`ArtifactCache`] implementation for tests and short-lived sessions.
//!
//! Uses a `BTreeMap` behind `std::sync::RwLock`, so `list` comes back
//! ordered by key without extra sorting.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{DocumentId, TemplateId};

use super::{ArtifactCache, ArtifactKey, ArtifactKind};

/// In-memory artifact cache.
pub struct InMemoryCache {
    entries: RwLock<BTreeMap<ArtifactKey, Value>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("artifact cache lock poisoned")
}

#[async_trait]
impl ArtifactCache for InMemoryCache {
    async fn get(&self, key: &ArtifactKey) -> Result<Option<Value>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &ArtifactKey, value: &Value) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.clone(), value.clone());
        Ok(())
    }

    async fn invalidate(&self, key: &ArtifactKey) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }

    async fn list(
        &self,
        document: &DocumentId,
        template: Option<&TemplateId>,
        kind: ArtifactKind,
    ) -> Result<Vec<(String, Value)>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .iter()
            .filter(|(k, _)| {
                &k.document == document && k.template.as_ref() == template && k.kind == kind
            })
            .map(|(k, v)| (k.key.clone(), v.clone()))
            .collect())
    }

    async fn invalidate_document(&self, document: &DocumentId) -> Result<u64> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|k, _| &k.document != document);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{load, store};
    use crate::models::{Scope, Topic};

    #[tokio::test]
    async fn partitions_by_template_and_kind() {
        let cache = InMemoryCache::new();
        let doc = DocumentId::new("doc1");
        let a = TemplateId::new("tplA");
        let b = TemplateId::new("tplB");

        store(&cache, &ArtifactKey::content(&doc, &a, "Intro"), "alpha")
            .await
            .unwrap();
        store(&cache, &ArtifactKey::content(&doc, &a, "Scope"), "beta")
            .await
            .unwrap();
        store(&cache, &ArtifactKey::content(&doc, &b, "Intro"), "other")
            .await
            .unwrap();
        store(&cache, &ArtifactKey::topics(&doc, &a), &vec![Topic::new("Intro")])
            .await
            .unwrap();

        let listed = cache
            .list(&doc, Some(&a), ArtifactKind::Content)
            .await
            .unwrap();
        let keys: Vec<&str> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Intro", "Scope"]);

        let other: Option<String> = load(&cache, &ArtifactKey::content(&doc, &b, "Intro"))
            .await
            .unwrap();
        assert_eq!(other.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn invalidate_document_removes_everything_for_it() {
        let cache = InMemoryCache::new();
        let doc1 = DocumentId::new("doc1");
        let doc2 = DocumentId::new("doc2");
        let scope = Scope {
            text: "scope".into(),
            source_pages: vec![3, 4],
            confirmed: true,
            is_complete: true,
        };
        store(&cache, &ArtifactKey::scope(&doc1), &scope).await.unwrap();
        store(&cache, &ArtifactKey::scope(&doc2), &scope).await.unwrap();
        store(
            &cache,
            &ArtifactKey::content(&doc1, &TemplateId::new("t"), "Intro"),
            "x",
        )
        .await
        .unwrap();

        assert_eq!(cache.invalidate_document(&doc1).await.unwrap(), 2);
        assert_eq!(cache.len(), 1);
        let kept: Option<Scope> = load(&cache, &ArtifactKey::scope(&doc2)).await.unwrap();
        assert_eq!(kept, Some(scope));
    }
}
