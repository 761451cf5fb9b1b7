use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{Adapter, AdapterError, RunContext};
use crate::metadata::{aggregate_metadata, base_metadata_schema, MetadataTree};
use crate::schema::{compose_metadata_schema, compose_options_schema, compose_source_schema, Schema};

/// An ordered set of labeled adapters behaving as one adapter.
#[derive(Debug, Default)]
pub struct Converter {
    adapters: IndexMap<String, Box<dyn Adapter>>,
}

/// A sequence stopped at a failing adapter.
#[derive(Debug)]
pub struct SequenceFailure {
    /// Labels that completed before the failure, in order
    pub committed: Vec<String>,
    /// Label of the failing adapter
    pub label: String,
    /// Its error
    pub error: AdapterError,
}

impl Converter {
    /// An empty converter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under `label`.
    pub fn add(
        &mut self,
        label: impl Into<String>,
        adapter: Box<dyn Adapter>,
    ) -> Result<&mut Self, AdapterError> {
        let label = label.into();
        if self.adapters.contains_key(&label) {
            return Err(AdapterError::DuplicateLabel(label));
        }
        self.adapters.insert(label, adapter);
        Ok(self)
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, label: impl Into<String>, adapter: Box<dyn Adapter>) -> Result<Self, AdapterError> {
        self.add(label, adapter)?;
        Ok(self)
    }

    /// Labels in registration order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns true if no adapters are registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// The adapter registered under `label`.
    pub fn get(&self, label: &str) -> Option<&dyn Adapter> {
        self.adapters.get(label).map(|a| a.as_ref())
    }

    /// Labeled adapters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Adapter)> {
        self.adapters.iter().map(|(l, a)| (l.as_str(), a.as_ref()))
    }

    /// Run each child in order with its own options subtree.
    ///
    /// Stops at the first failure. Children that completed stay committed.
    pub fn run_sequence(
        &mut self,
        ctx: &mut RunContext<'_>,
        metadata: &MetadataTree,
        options: &Map<String, Value>,
    ) -> Result<Vec<String>, SequenceFailure> {
        let empty = Map::new();
        let mut committed = Vec::with_capacity(self.adapters.len());

        for (label, adapter) in self.adapters.iter_mut() {
            let child_options = match options.get(label) {
                Some(Value::Object(map)) => map,
                _ => &empty,
            };
            log::info!("running '{}' ({})", label, adapter.name());

            let result = ctx
                .check_cancelled()
                .and_then(|()| adapter.run_conversion(ctx, metadata, child_options));
            if let Err(error) = result {
                log::warn!("'{}' failed: {}", label, error);
                return Err(SequenceFailure {
                    committed,
                    label: label.clone(),
                    error,
                });
            }
            committed.push(label.clone());
        }

        Ok(committed)
    }
}

impl Adapter for Converter {
    fn name(&self) -> &str {
        "converter"
    }

    fn source_schema(&self) -> Schema {
        compose_source_schema(self.iter().map(|(l, a)| (l, a.source_schema())))
    }

    fn metadata_schema(&self) -> Schema {
        compose_metadata_schema(
            base_metadata_schema(),
            self.iter().map(|(l, a)| (l, a.metadata_schema())),
        )
    }

    fn options_schema(&self) -> Schema {
        compose_options_schema(self.iter().map(|(l, a)| (l, a.options_schema())))
    }

    fn metadata(&self) -> MetadataTree {
        let trees: Vec<(&str, MetadataTree)> = self.iter().map(|(l, a)| (l, a.metadata())).collect();
        aggregate_metadata(trees.iter().map(|(l, t)| (*l, t)), None)
    }

    fn default_options(&self) -> Map<String, Value> {
        self.iter()
            .map(|(l, a)| (l.to_string(), Value::Object(a.default_options())))
            .collect()
    }

    fn check_options(&self, options: &Map<String, Value>) -> Result<(), AdapterError> {
        let empty = Map::new();
        for (label, adapter) in self.iter() {
            let child_options = match options.get(label) {
                Some(Value::Object(map)) => map,
                _ => &empty,
            };
            adapter
                .check_options(child_options)
                .map_err(|error| AdapterError::Child {
                    label: label.to_string(),
                    source: Box::new(error),
                })?;
        }
        Ok(())
    }

    fn run_conversion(
        &mut self,
        ctx: &mut RunContext<'_>,
        metadata: &MetadataTree,
        options: &Map<String, Value>,
    ) -> Result<(), AdapterError> {
        self.run_sequence(ctx, metadata, options)
            .map(|_| ())
            .map_err(|failure| AdapterError::Child {
                label: failure.label,
                source: Box::new(failure.error),
            })
    }
}
