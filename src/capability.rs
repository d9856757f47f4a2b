//! Capability registry
//!
//! Flat catalog of named capabilities. Components declare their
//! capabilities through an explicit typed registration call at startup;
//! there is no runtime discovery.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{AccessError, Result};
use crate::store::AccessStore;
use crate::types::{Capability, CapabilityDef};

/// Characters allowed in a capability name besides ASCII lowercase
/// alphanumerics.
const NAME_EXTRA_CHARS: &[char] = &[':', '/', '_', '.', '-'];

/// Validate a capability name of the `component/scope:action` form
/// (the component prefix is optional, e.g. `"site:config"`).
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AccessError::Validation("empty capability name".to_string()));
    }
    if !name.contains(':') {
        return Err(AccessError::Validation(format!(
            "capability name '{name}' is missing the scope:action separator"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || NAME_EXTRA_CHARS.contains(c)))
    {
        return Err(AccessError::Validation(format!(
            "capability name '{name}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Capability catalog over an [`AccessStore`].
pub struct CapabilityRegistry {
    store: Arc<dyn AccessStore>,
}

impl CapabilityRegistry {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Register a component's capability definitions. Already-known names
    /// are skipped, so components can re-register on every startup.
    /// Returns the number of capabilities actually inserted.
    pub async fn register_component(
        &self,
        component: &str,
        defs: &[CapabilityDef],
    ) -> Result<usize> {
        let mut inserted = 0;
        for def in defs {
            validate_name(&def.name)?;
            if self.store.find_capability(&def.name).await?.is_some() {
                debug!(capability = %def.name, "capability already registered");
                continue;
            }
            self.store.insert_capability(component, def).await?;
            inserted += 1;
        }
        if inserted > 0 {
            info!(component, inserted, "capabilities registered");
        }
        Ok(inserted)
    }

    /// Resolve a capability name to its record. Malformed names are a
    /// validation error; well-formed unknown names resolve to `None`.
    pub async fn resolve(&self, name: &str) -> Result<Option<Capability>> {
        validate_name(name)?;
        self.store.find_capability(name).await
    }

    /// Every registered capability, ordered by name.
    pub async fn list(&self) -> Result<Vec<Capability>> {
        self.store.list_capabilities().await
    }
}
