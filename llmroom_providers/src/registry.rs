use llmroom_config::BackendConfig;
use llmroom_core::{Backend, ConfigurationError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use crate::openai::BasicOpenAiBackend;

/// Builds a backend from its configuration entry.
pub type BackendFactory =
    Arc<dyn Fn(&BackendConfig) -> anyhow::Result<Arc<dyn Backend>> + Send + Sync>;

/// Backend types shipped with this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    BasicOpenAi,
}

impl BackendKind {
    pub const ALL: [Self; 1] = [Self::BasicOpenAi];

    /// Every `kind` string that selects this backend type.
    #[must_use]
    pub const fn names(self) -> &'static [&'static str] {
        match self {
            Self::BasicOpenAi => &["basic_openai", "basic", "openai"],
        }
    }

    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.names().contains(&kind))
    }

    fn factory(self) -> BackendFactory {
        match self {
            Self::BasicOpenAi => Arc::new(|config: &BackendConfig| {
                Ok(Arc::new(BasicOpenAiBackend::from_config(config)) as Arc<dyn Backend>)
            }),
        }
    }
}

enum Entry {
    Ready(Arc<dyn Backend>),
    UnknownKind(String),
}

/// Maps configuration keys to constructed backends. Immutable once built.
pub struct BackendRegistry {
    entries: HashMap<String, Entry>,
}

impl BackendRegistry {
    #[must_use]
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::new()
    }

    /// Registry with only the built-in backend kinds.
    pub fn from_config(backends: &BTreeMap<String, BackendConfig>) -> anyhow::Result<Self> {
        Self::builder().build(backends)
    }

    pub fn resolve(&self, key: &str) -> Result<Arc<dyn Backend>, ConfigurationError> {
        match self.entries.get(key) {
            Some(Entry::Ready(backend)) => Ok(Arc::clone(backend)),
            Some(Entry::UnknownKind(kind)) => Err(ConfigurationError::UnknownBackendKind {
                key: key.to_string(),
                kind: kind.clone(),
            }),
            None => Err(ConfigurationError::MissingBackendKey(key.to_string())),
        }
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Collects backend constructors by kind name before the registry is built.
pub struct BackendRegistryBuilder {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut factories = HashMap::new();
        for kind in BackendKind::ALL {
            let factory = kind.factory();
            for name in kind.names() {
                factories.insert((*name).to_string(), Arc::clone(&factory));
            }
        }
        Self { factories }
    }

    /// Adds a backend kind, or replaces the constructor of an existing one.
    #[must_use]
    pub fn factory<F>(mut self, kind: &str, factory: F) -> Self
    where
        F: Fn(&BackendConfig) -> anyhow::Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        info!("Registering backend kind: {}", kind);
        self.factories.insert(kind.to_string(), Arc::new(factory));
        self
    }

    /// Constructs every configured backend.
    ///
    /// Entries with an unrecognized kind are kept so that resolving them reports
    /// `UnknownBackendKind`; a failing constructor aborts the build.
    pub fn build(
        self,
        backends: &BTreeMap<String, BackendConfig>,
    ) -> anyhow::Result<BackendRegistry> {
        let mut entries = HashMap::with_capacity(backends.len());

        for (key, config) in backends {
            let entry = if let Some(factory) = self.factories.get(&config.kind) {
                let backend = factory(config)
                    .map_err(|e| anyhow::anyhow!("Failed to build backend `{key}`: {e}"))?;
                info!("Loaded backend `{}` (kind: {})", key, config.kind);
                Entry::Ready(backend)
            } else {
                warn!("Backend `{}` has unrecognized kind `{}`", key, config.kind);
                Entry::UnknownKind(config.kind.clone())
            };
            entries.insert(key.clone(), entry);
        }

        Ok(BackendRegistry { entries })
    }
}

impl Default for BackendRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llmroom_core::{Completion, Turn};

    struct Fixed {
        model: String,
    }

    #[async_trait]
    impl Backend for Fixed {
        fn default_model(&self) -> &str {
            &self.model
        }

        fn default_system_prompt(&self) -> &str {
            "fixed"
        }

        async fn create_chat_completion(
            &self,
            _http: &reqwest::Client,
            _context: &[Turn],
            _system: &str,
            _model: &str,
        ) -> anyhow::Result<Completion> {
            Ok(Completion::assistant("fixed".to_string()))
        }
    }

    fn backend_config(kind: &str, model: &str) -> BackendConfig {
        BackendConfig {
            kind: kind.to_string(),
            endpoint: None,
            credential: None,
            default_model: model.to_string(),
            default_system_prompt: "s1".to_string(),
            timeout_secs: None,
            retry_delays_secs: Vec::new(),
        }
    }

    fn backends(entries: &[(&str, &str, &str)]) -> BTreeMap<String, BackendConfig> {
        entries
            .iter()
            .map(|(key, kind, model)| ((*key).to_string(), backend_config(kind, model)))
            .collect()
    }

    #[test]
    fn resolves_builtin_kinds_and_aliases() {
        let registry = BackendRegistry::from_config(&backends(&[
            ("a", "basic_openai", "m-a"),
            ("b", "basic", "m-b"),
            ("c", "openai", "m-c"),
        ]))
        .unwrap();

        assert_eq!(registry.resolve("a").unwrap().default_model(), "m-a");
        assert_eq!(registry.resolve("b").unwrap().default_model(), "m-b");
        assert_eq!(registry.resolve("c").unwrap().default_system_prompt(), "s1");
        assert_eq!(registry.keys(), ["a", "b", "c"]);
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let registry = BackendRegistry::from_config(&backends(&[("b1", "basic", "m1")])).unwrap();

        assert_eq!(
            registry.resolve("missing_key").err(),
            Some(ConfigurationError::MissingBackendKey("missing_key".to_string()))
        );
    }

    #[test]
    fn unknown_kind_is_a_configuration_error() {
        let registry =
            BackendRegistry::from_config(&backends(&[("weird", "carrier_pigeon", "m1")])).unwrap();

        assert_eq!(
            registry.resolve("weird").err(),
            Some(ConfigurationError::UnknownBackendKind {
                key: "weird".to_string(),
                kind: "carrier_pigeon".to_string(),
            })
        );
    }

    #[test]
    fn custom_factory_adds_and_overrides_kinds() {
        let fixed = |config: &BackendConfig| -> anyhow::Result<Arc<dyn Backend>> {
            Ok(Arc::new(Fixed {
                model: config.default_model.clone(),
            }))
        };

        let registry = BackendRegistry::builder()
            .factory("fixed", fixed)
            .factory("basic", fixed)
            .build(&backends(&[("x", "fixed", "mx"), ("y", "basic", "my")]))
            .unwrap();

        assert_eq!(registry.resolve("x").unwrap().default_system_prompt(), "fixed");
        assert_eq!(registry.resolve("y").unwrap().default_system_prompt(), "fixed");
        assert_eq!(registry.resolve("y").unwrap().default_model(), "my");
    }

    #[test]
    fn failing_factory_aborts_build() {
        let result = BackendRegistry::builder()
            .factory("broken", |_: &BackendConfig| anyhow::bail!("no endpoint"))
            .build(&backends(&[("b", "broken", "m")]));
        assert!(result.is_err());
    }

    #[test]
    fn kind_parsing() {
        assert_eq!(BackendKind::parse("basic"), Some(BackendKind::BasicOpenAi));
        assert_eq!(BackendKind::parse("nope"), None);
    }
}
