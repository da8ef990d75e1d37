//! Session configuration shared by encoders, decoders and sockets.

use std::collections::HashMap;
use std::sync::Arc;

use crate::registry::Registry;

/// Configuration for a codec session. The presence of a default registry
/// switches the session into object mode: every top-level value is
/// prepended with its registry id.
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) registry: Option<Arc<Registry>>,
    pub(crate) sub_registries: HashMap<String, Arc<Registry>>,
    pub(crate) size_limit: u64,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default registry and thereby enables object mode.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Replaces the named-registry dispatch table used by fields and
    /// containers carrying an `objects:<name>` directive.
    pub fn with_sub_registries(mut self, subs: HashMap<String, Registry>) -> Self {
        self.sub_registries = subs
            .into_iter()
            .map(|(name, registry)| (name, Arc::new(registry)))
            .collect();
        self
    }

    /// Adds one named sub-registry.
    pub fn with_sub_registry(mut self, name: impl Into<String>, registry: Registry) -> Self {
        self.sub_registries.insert(name.into(), Arc::new(registry));
        self
    }

    /// Byte budget applied to each top-level encode/decode operation.
    /// Zero disables the limit.
    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = bytes;
        self
    }
}
