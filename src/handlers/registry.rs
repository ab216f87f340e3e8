use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use super::{local, mirror, HandlerProvider, ParsedUri, UriHandler};
use crate::config::AuditConfig;
use crate::error::FeatureDisabled;
use crate::session::ScanSession;

/// One entry of the plugin table: a name and a loader that either yields a
/// provider or declines with a reason.
#[derive(Clone, Copy)]
pub struct PluginEntry {
    pub name: &'static str,
    pub load: fn(&AuditConfig) -> Result<Arc<dyn HandlerProvider>, FeatureDisabled>,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry").field("name", &self.name).finish()
    }
}

static BUILTIN_PLUGINS: &[PluginEntry] = &[
    PluginEntry {
        name: "local",
        load: local::load,
    },
    PluginEntry {
        name: "mirror",
        load: mirror::load,
    },
];

pub fn builtin_plugins() -> &'static [PluginEntry] {
    BUILTIN_PLUGINS
}

#[derive(Default)]
struct LoadedHandlers {
    providers: Vec<Arc<dyn HandlerProvider>>,
    default: Option<Arc<dyn HandlerProvider>>,
    disabled: BTreeMap<String, FeatureDisabled>,
}

/// Scheme to handler resolution, populated once from the plugin table.
pub struct HandlerRegistry {
    session: Arc<ScanSession>,
    plugins: Vec<PluginEntry>,
    loaded: OnceLock<LoadedHandlers>,
}

impl HandlerRegistry {
    pub fn new(session: Arc<ScanSession>) -> Self {
        Self::with_plugins(session, builtin_plugins().to_vec())
    }

    pub fn with_plugins(session: Arc<ScanSession>, plugins: Vec<PluginEntry>) -> Self {
        Self {
            session,
            plugins,
            loaded: OnceLock::new(),
        }
    }

    pub fn session(&self) -> &Arc<ScanSession> {
        &self.session
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Loads the plugin table. Later calls are no-ops.
    pub fn load(&self) {
        self.handlers();
    }

    fn handlers(&self) -> &LoadedHandlers {
        self.loaded.get_or_init(|| self.populate())
    }

    fn populate(&self) -> LoadedHandlers {
        let config = self.session.config();
        let mut loaded = LoadedHandlers::default();

        let selected: Vec<&str> = match &config.handlers {
            Some(names) => names.iter().map(String::as_str).collect(),
            None => self.plugins.iter().map(|p| p.name).collect(),
        };

        for plugin in &self.plugins {
            if !selected.contains(&plugin.name) {
                loaded
                    .disabled
                    .insert(plugin.name.to_string(), FeatureDisabled::new("not enabled"));
            }
        }

        for name in selected {
            let Some(plugin) = self.plugins.iter().find(|p| p.name == name) else {
                warn!(handler = name, "unknown handler in configuration");
                loaded
                    .disabled
                    .insert(name.to_string(), FeatureDisabled::new("unknown handler"));
                continue;
            };

            match (plugin.load)(config) {
                Ok(provider) => {
                    debug!(handler = name, scheme = provider.scheme(), "loaded handler");
                    if provider.is_default() {
                        if loaded.default.is_none() {
                            loaded.default = Some(Arc::clone(&provider));
                        } else {
                            warn!(handler = name, "ignoring second default handler");
                        }
                    }
                    loaded.providers.push(provider);
                }
                Err(disabled) => {
                    info!(handler = name, reason = %disabled.reason, "handler disabled");
                    loaded.disabled.insert(name.to_string(), disabled);
                }
            }
        }

        loaded
    }

    /// Plugins that declined to load, keyed by plugin name.
    pub fn disabled(&self) -> &BTreeMap<String, FeatureDisabled> {
        &self.handlers().disabled
    }

    pub fn schemes(&self) -> Vec<&'static str> {
        self.handlers().providers.iter().map(|p| p.scheme()).collect()
    }

    pub fn default_scheme(&self) -> Option<&'static str> {
        self.handlers().default.as_ref().map(|p| p.scheme())
    }

    fn provider_for(&self, uri: &ParsedUri) -> Option<&Arc<dyn HandlerProvider>> {
        let handlers = self.handlers();
        handlers
            .providers
            .iter()
            .find(|p| p.is_supported(uri))
            .or(handlers.default.as_ref())
    }

    /// Opens a handler for `uri`, falling back to the default handler.
    pub fn resolve(&self, uri: &str) -> Option<Box<dyn UriHandler>> {
        let parsed = ParsedUri::parse(uri);
        let provider = self.provider_for(&parsed)?;
        Some(provider.open(parsed, Arc::clone(&self.session)))
    }

    /// Opens handlers for both sides of a diff. The two URIs may use
    /// different schemes. When no provider pair claims both, each side gets
    /// its own default resolution, as [`HandlerRegistry::resolve`] would.
    pub fn resolve_pair(
        &self,
        uri_a: &str,
        uri_b: &str,
    ) -> Option<(Box<dyn UriHandler>, Box<dyn UriHandler>)> {
        let a = ParsedUri::parse(uri_a);
        let b = ParsedUri::parse(uri_b);
        let providers = &self.handlers().providers;

        for left in providers {
            for right in providers {
                if left.is_supported(&a) && right.is_supported(&b) {
                    return Some((
                        left.open(a, Arc::clone(&self.session)),
                        right.open(b, Arc::clone(&self.session)),
                    ));
                }
            }
        }

        let left = self.provider_for(&a)?;
        let right = self.provider_for(&b)?;
        Some((
            left.open(a, Arc::clone(&self.session)),
            right.open(b, Arc::clone(&self.session)),
        ))
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("plugins", &self.plugins)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
