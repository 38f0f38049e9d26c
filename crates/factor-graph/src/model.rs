//! Ordered registry of templates.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ModelError;
use crate::pattern::TemplateId;
use crate::template::Template;
use crate::vector::Vector;

/// Immutable per-template weight snapshots taken at one point in time.
pub type WeightsSnapshot = BTreeMap<TemplateId, Arc<Vector>>;

/// The set of templates that together define a scoring function.
///
/// Templates are applied in registration order. Cloning a model shares the
/// templates (and therefore their weights).
pub struct Model<I, C> {
    templates: Vec<Arc<dyn Template<I, C>>>,
}

impl<I, C> Clone for Model<I, C> {
    fn clone(&self) -> Self {
        Self {
            templates: self.templates.clone(),
        }
    }
}

impl<I, C> Default for Model<I, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, C> std::fmt::Debug for Model<I, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.templates.iter().map(|t| t.id().to_string()))
            .finish()
    }
}

impl<I, C> Model<I, C> {
    pub fn new() -> Self {
        Self {
            templates: Vec::new(),
        }
    }

    /// Build a model from templates, rejecting duplicate names.
    pub fn with_templates(
        templates: impl IntoIterator<Item = Arc<dyn Template<I, C>>>,
    ) -> Result<Self, ModelError> {
        let mut model = Self::new();
        for t in templates {
            model.register(t)?;
        }
        Ok(model)
    }

    pub fn register(&mut self, template: Arc<dyn Template<I, C>>) -> Result<(), ModelError> {
        if self.templates.iter().any(|t| t.id() == template.id()) {
            return Err(ModelError::DuplicateTemplate(template.id().to_string()));
        }
        self.templates.push(template);
        Ok(())
    }

    pub fn templates(&self) -> &[Arc<dyn Template<I, C>>] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Look up a template by name.
    pub fn template(&self, name: &str) -> Result<&Arc<dyn Template<I, C>>, ModelError> {
        self.templates
            .iter()
            .find(|t| t.id().as_str() == name)
            .ok_or_else(|| ModelError::UnknownTemplate(name.to_string()))
    }

    /// Snapshot every template's weights.
    pub fn snapshot(&self) -> WeightsSnapshot {
        self.templates
            .iter()
            .map(|t| (t.id().clone(), t.weights().snapshot()))
            .collect()
    }
}
