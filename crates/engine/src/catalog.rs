//! Read-only character catalog (the "reference data provider").
//!
//! The catalog is fetched once from a [`CatalogSource`] and cached for the
//! life of the process by [`CatalogCache`]. A failed fetch is not cached, so
//! the next caller retries.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CatalogError;

pub const DEFAULT_DATA_DRAGON_URL: &str = "https://ddragon.leagueoflegends.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub num: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    /// Canonical identifier, e.g. `Aatrox`.
    pub id: String,
    /// Numeric alias, e.g. `266`.
    pub key: String,
    pub name: String,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    version: String,
    characters: BTreeMap<String, Character>,
    keys: Vec<String>,
    id_by_alias: HashMap<String, String>,
}

impl Catalog {
    pub fn new(version: impl Into<String>, characters: impl IntoIterator<Item = Character>) -> Self {
        let characters: BTreeMap<String, Character> = characters
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let keys = characters.keys().cloned().collect();
        let id_by_alias = characters
            .values()
            .map(|c| (c.key.clone(), c.id.clone()))
            .collect();
        Self {
            version: version.into(),
            characters,
            keys,
            id_by_alias,
        }
    }

    /// Parse a `championFull.json` document. `fallback_version` is used when
    /// the document does not carry its own.
    pub fn from_champion_full(raw: &str, fallback_version: &str) -> Result<Self, CatalogError> {
        let doc: ChampionFull = serde_json::from_str(raw)
            .map_err(|e| CatalogError::InvalidPayload(e.to_string()))?;
        let version = doc.version.unwrap_or_else(|| fallback_version.to_string());
        let characters = doc.data.into_values().map(|c| Character {
            id: c.id,
            key: c.key,
            name: c.name,
            variants: c
                .skins
                .into_iter()
                .map(|s| Variant {
                    num: s.num,
                    name: s.name,
                })
                .collect(),
        });
        Ok(Self::new(version, characters))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn character(&self, id: &str) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn id_for_alias(&self, alias: &str) -> Option<&str> {
        self.id_by_alias.get(alias).map(String::as_str)
    }

    pub fn variant_name(&self, id: &str, num: u32) -> Option<&str> {
        self.character(id)?
            .variants
            .iter()
            .find(|v| v.num == num)
            .map(|v| v.name.as_str())
    }
}

#[derive(Deserialize)]
struct ChampionFull {
    #[serde(default)]
    version: Option<String>,
    data: BTreeMap<String, ChampionEntry>,
}

#[derive(Deserialize)]
struct ChampionEntry {
    id: String,
    key: String,
    name: String,
    #[serde(default)]
    skins: Vec<SkinEntry>,
}

#[derive(Deserialize)]
struct SkinEntry {
    num: u32,
    name: String,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn latest_version(&self) -> Result<String, CatalogError>;
    async fn full_catalog(&self, version: &str) -> Result<Catalog, CatalogError>;
}

/// Data Dragon compatible HTTP provider.
pub struct DataDragonSource {
    client: reqwest::Client,
    base_url: String,
}

impl DataDragonSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for DataDragonSource {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DRAGON_URL)
    }
}

#[async_trait]
impl CatalogSource for DataDragonSource {
    async fn latest_version(&self) -> Result<String, CatalogError> {
        let url = format!("{}/api/versions.json", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        let versions: Vec<String> = res
            .json()
            .await
            .map_err(|e| CatalogError::InvalidPayload(e.to_string()))?;
        versions
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::InvalidPayload("empty versions list".to_string()))
    }

    async fn full_catalog(&self, version: &str) -> Result<Catalog, CatalogError> {
        let url = format!(
            "{}/cdn/{version}/data/en_US/championFull.json",
            self.base_url
        );
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CatalogError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| CatalogError::Request(e.to_string()))?;
        Catalog::from_champion_full(&body, version)
    }
}

/// A `championFull.json` document on local disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self, version: &str) -> Result<Catalog, CatalogError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CatalogError::Request(format!("{}: {e}", self.path.display())))?;
        Catalog::from_champion_full(&raw, version)
    }
}

#[async_trait]
impl CatalogSource for FileSource {
    async fn latest_version(&self) -> Result<String, CatalogError> {
        Ok(self.read("local").await?.version)
    }

    async fn full_catalog(&self, version: &str) -> Result<Catalog, CatalogError> {
        self.read(version).await
    }
}

/// Fixed in-memory catalog.
pub struct StaticCatalog(pub Catalog);

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn latest_version(&self) -> Result<String, CatalogError> {
        Ok(self.0.version.clone())
    }

    async fn full_catalog(&self, _version: &str) -> Result<Catalog, CatalogError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogStatus {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    ready: RwLock<Option<Arc<Catalog>>>,
    status: RwLock<CatalogStatus>,
    // Serializes loads so concurrent callers share one fetch.
    load_gate: tokio::sync::Mutex<()>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            ready: RwLock::new(None),
            status: RwLock::new(CatalogStatus::Idle),
            load_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// A cache that starts out loaded.
    pub fn preloaded(catalog: Catalog) -> Self {
        let cache = Self::new(Arc::new(StaticCatalog(catalog.clone())));
        cache.store(Arc::new(catalog));
        cache
    }

    /// The cached catalog, without triggering a load.
    pub fn get(&self) -> Option<Arc<Catalog>> {
        self.ready
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> CatalogStatus {
        self.status
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn ensure_loaded(&self) -> Result<Arc<Catalog>, CatalogError> {
        if let Some(catalog) = self.get() {
            return Ok(catalog);
        }
        let _gate = self.load_gate.lock().await;
        if let Some(catalog) = self.get() {
            return Ok(catalog);
        }

        self.set_status(CatalogStatus::Loading);
        let loaded = async {
            let version = self.source.latest_version().await?;
            let catalog = self.source.full_catalog(&version).await?;
            if catalog.is_empty() {
                return Err(CatalogError::InvalidPayload(format!(
                    "catalog {version} has no characters"
                )));
            }
            Ok(catalog)
        }
        .await;

        match loaded {
            Ok(catalog) => {
                tracing::info!(
                    version = catalog.version(),
                    characters = catalog.keys().len(),
                    "catalog loaded"
                );
                let catalog = Arc::new(catalog);
                self.store(catalog.clone());
                Ok(catalog)
            }
            Err(err) => {
                tracing::warn!(error = %err, "catalog load failed");
                self.set_status(CatalogStatus::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn store(&self, catalog: Arc<Catalog>) {
        *self.ready.write().unwrap_or_else(|e| e.into_inner()) = Some(catalog);
        self.set_status(CatalogStatus::Ready);
    }

    fn set_status(&self, status: CatalogStatus) {
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn sample_catalog() -> Catalog {
        Catalog::new(
            "14.20.1",
            [
                Character {
                    id: "Aatrox".to_string(),
                    key: "266".to_string(),
                    name: "Aatrox".to_string(),
                    variants: vec![
                        Variant { num: 0, name: "default".to_string() },
                        Variant { num: 1, name: "Justicar Aatrox".to_string() },
                        Variant { num: 2, name: "Mecha Aatrox".to_string() },
                    ],
                },
                Character {
                    id: "MonkeyKing".to_string(),
                    key: "62".to_string(),
                    name: "Wukong".to_string(),
                    variants: vec![
                        Variant { num: 0, name: "default".to_string() },
                        Variant { num: 5, name: "Radiant Wukong".to_string() },
                    ],
                },
                Character {
                    id: "Zed".to_string(),
                    key: "238".to_string(),
                    name: "Zed".to_string(),
                    variants: vec![Variant { num: 0, name: "default".to_string() }],
                },
            ],
        )
    }

    #[test]
    fn parses_champion_full_document() {
        let raw = r#"{
            "type": "champion",
            "format": "full",
            "version": "14.1.1",
            "data": {
                "Ahri": {
                    "id": "Ahri", "key": "103", "name": "Ahri", "title": "the Nine-Tailed Fox",
                    "skins": [
                        {"id": "103000", "num": 0, "name": "default", "chromas": false},
                        {"id": "103001", "num": 1, "name": "Dynasty Ahri", "chromas": false}
                    ]
                }
            }
        }"#;
        let catalog = Catalog::from_champion_full(raw, "ignored").unwrap();
        assert_eq!(catalog.version(), "14.1.1");
        assert_eq!(catalog.keys(), ["Ahri".to_string()]);
        assert_eq!(catalog.id_for_alias("103"), Some("Ahri"));
        assert_eq!(catalog.variant_name("Ahri", 1), Some("Dynasty Ahri"));
        assert_eq!(catalog.variant_name("Ahri", 9), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Catalog::from_champion_full("[1,2]", "x"),
            Err(CatalogError::InvalidPayload(_))
        ));
    }

    /// Fails the first load, then serves [`sample_catalog`].
    pub(crate) struct FlakySource {
        pub(crate) calls: AtomicUsize,
    }

    impl FlakySource {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogSource for FlakySource {
        async fn latest_version(&self) -> Result<String, CatalogError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(CatalogError::Request("offline".to_string()));
            }
            Ok("1.0".to_string())
        }

        async fn full_catalog(&self, _version: &str) -> Result<Catalog, CatalogError> {
            Ok(sample_catalog())
        }
    }

    #[tokio::test]
    async fn failed_load_is_retried_then_cached() {
        let source = Arc::new(FlakySource::new());
        let cache = CatalogCache::new(source.clone());
        assert_eq!(cache.status(), CatalogStatus::Idle);

        assert!(cache.ensure_loaded().await.is_err());
        assert!(matches!(cache.status(), CatalogStatus::Failed(_)));
        assert!(cache.get().is_none());

        let catalog = cache.ensure_loaded().await.unwrap();
        assert_eq!(catalog.keys().len(), 3);
        assert_eq!(cache.status(), CatalogStatus::Ready);

        cache.ensure_loaded().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    struct EmptySource;

    #[async_trait]
    impl CatalogSource for EmptySource {
        async fn latest_version(&self) -> Result<String, CatalogError> {
            Ok("1.0".to_string())
        }

        async fn full_catalog(&self, version: &str) -> Result<Catalog, CatalogError> {
            Ok(Catalog::new(version, Vec::new()))
        }
    }

    #[tokio::test]
    async fn empty_catalog_is_not_cached() {
        let cache = CatalogCache::new(Arc::new(EmptySource));
        assert!(matches!(
            cache.ensure_loaded().await,
            Err(CatalogError::InvalidPayload(_))
        ));
        assert!(matches!(cache.status(), CatalogStatus::Failed(_)));
        assert!(cache.get().is_none());
    }
}
