//! Secret retrieval keyed by logical name.
//!
//! Stores return `Ok(None)` when a secret is absent; callers decide whether
//! that is fatal. At startup it always is.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("could not read secret file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse secret file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
    #[error("secret `{name}` has an unexpected structure (keys: {keys:?})")]
    UnexpectedStructure { name: String, keys: Vec<String> },
    #[error("required secret `{0}` is not available")]
    Missing(String),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, logical_name: &str) -> Result<Option<SecretString>, SecretError>;
}

/// Resolves a secret that must exist; absence becomes [`SecretError::Missing`].
pub async fn require_secret(
    store: &dyn SecretStore,
    logical_name: &str,
) -> Result<SecretString, SecretError> {
    store
        .get_secret(logical_name)
        .await?
        .ok_or_else(|| SecretError::Missing(logical_name.to_owned()))
}

/// Reads secrets from process environment variables named after the logical name.
#[derive(Clone, Debug, Default)]
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, logical_name: &str) -> Result<Option<SecretString>, SecretError> {
        Ok(env::var(logical_name)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(SecretString::from))
    }
}

/// JSON document mapping logical names to secret payloads.
///
/// A payload is either a plain string, an object carrying `api_key`, or an
/// object with exactly one key.
#[derive(Clone, Debug)]
pub struct JsonFileSecretStore {
    path: PathBuf,
}

impl JsonFileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<HashMap<String, Value>, SecretError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| SecretError::ReadFile { path: self.path.clone(), source })?;
        serde_json::from_str(&raw)
            .map_err(|source| SecretError::ParseFile { path: self.path.clone(), source })
    }
}

#[async_trait]
impl SecretStore for JsonFileSecretStore {
    async fn get_secret(&self, logical_name: &str) -> Result<Option<SecretString>, SecretError> {
        let document = self.read_document()?;
        let Some(payload) = document.get(logical_name) else {
            debug!(
                event_name = "secrets.file.miss",
                secret_name = logical_name,
                "secret not present in file"
            );
            return Ok(None);
        };
        extract_secret_value(logical_name, payload).map(|value| value.map(SecretString::from))
    }
}

fn extract_secret_value(name: &str, payload: &Value) -> Result<Option<String>, SecretError> {
    match payload {
        Value::String(value) if value.trim().is_empty() => Ok(None),
        Value::String(value) => Ok(Some(value.clone())),
        Value::Object(fields) => {
            if let Some(Value::String(api_key)) = fields.get("api_key") {
                return Ok(Some(api_key.clone()));
            }
            if fields.len() == 1 {
                if let Some(Value::String(value)) = fields.values().next() {
                    return Ok(Some(value.clone()));
                }
            }
            Err(SecretError::UnexpectedStructure {
                name: name.to_owned(),
                keys: fields.keys().cloned().collect(),
            })
        }
        Value::Null => Ok(None),
        _ => Err(SecretError::UnexpectedStructure { name: name.to_owned(), keys: Vec::new() }),
    }
}

/// Get-or-cache wrapper. Values are cached for the lifetime of the process;
/// misses are not cached.
pub struct CachedSecretStore<S> {
    inner: S,
    cache: RwLock<HashMap<String, SecretString>>,
}

impl<S> CachedSecretStore<S>
where
    S: SecretStore,
{
    pub fn new(inner: S) -> Self {
        Self { inner, cache: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl<S> SecretStore for CachedSecretStore<S>
where
    S: SecretStore,
{
    async fn get_secret(&self, logical_name: &str) -> Result<Option<SecretString>, SecretError> {
        if let Some(cached) = self.cache.read().await.get(logical_name) {
            return Ok(Some(cached.clone()));
        }

        let resolved = self.inner.get_secret(logical_name).await?;
        if let Some(value) = &resolved {
            self.cache.write().await.insert(logical_name.to_owned(), value.clone());
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use tempfile::TempDir;

    use super::{
        require_secret, CachedSecretStore, JsonFileSecretStore, SecretError, SecretStore,
    };

    fn write_secrets(contents: &str) -> (TempDir, JsonFileSecretStore) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("secrets.json");
        fs::write(&path, contents).expect("write secrets");
        (dir, JsonFileSecretStore::new(path))
    }

    #[tokio::test]
    async fn file_store_supports_string_api_key_and_single_key_payloads() {
        let (_dir, store) = write_secrets(
            r#"{
                "plain": "sk-plain",
                "wrapped": {"api_key": "sk-wrapped", "created_by": "ops"},
                "single": {"token": "xoxb-single"}
            }"#,
        );

        for (name, expected) in
            [("plain", "sk-plain"), ("wrapped", "sk-wrapped"), ("single", "xoxb-single")]
        {
            let value = store.get_secret(name).await.expect("lookup").expect("present");
            assert_eq!(value.expose_secret(), expected);
        }

        assert!(store.get_secret("absent").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn file_store_rejects_ambiguous_objects() {
        let (_dir, store) = write_secrets(r#"{"multi": {"a": "1", "b": "2"}}"#);

        let error = store.get_secret("multi").await.expect_err("ambiguous structure");
        assert!(matches!(error, SecretError::UnexpectedStructure { ref keys, .. } if keys.len() == 2));
    }

    #[tokio::test]
    async fn require_secret_turns_absence_into_an_error() {
        let (_dir, store) = write_secrets("{}");

        let error = require_secret(&store, "LLM_API_KEY").await.expect_err("missing");
        assert_eq!(error.to_string(), "required secret `LLM_API_KEY` is not available");
    }

    struct CountingStore {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        async fn get_secret(&self, name: &str) -> Result<Option<SecretString>, SecretError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok((name == "known").then(|| SecretString::from("value".to_owned())))
        }
    }

    #[tokio::test]
    async fn cached_store_hits_inner_store_once_per_present_secret() {
        let store = CachedSecretStore::new(CountingStore { lookups: AtomicUsize::new(0) });

        for _ in 0..3 {
            assert!(store.get_secret("known").await.expect("lookup").is_some());
        }
        assert!(store.get_secret("unknown").await.expect("lookup").is_none());
        assert!(store.get_secret("unknown").await.expect("lookup").is_none());

        assert_eq!(store.inner.lookups.load(Ordering::SeqCst), 3);
    }
}
