//! Metric name → metric kind registry.
//!
//! Registration happens on a [`MetricRegistryBuilder`] during startup. Calling
//! [`MetricRegistryBuilder::build`] freezes the mapping into a [`MetricRegistry`]
//! which has no mutating methods and is shared behind an `Arc` by every query.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Closed set of metric kinds.
///
/// `Cpm`, `Sum` and `Max` specialize `SingleValue`: their display value is a
/// single long column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Average,
    Percentile,
    Percentage,
    SingleValue,
    Cpm,
    Sum,
    Max,
}

impl MetricKind {
    pub fn parent(&self) -> Option<MetricKind> {
        match self {
            MetricKind::Cpm | MetricKind::Sum | MetricKind::Max => Some(MetricKind::SingleValue),
            _ => None,
        }
    }

    /// True if `self` is `other` or specializes it.
    pub fn is_a(&self, other: MetricKind) -> bool {
        let mut current = Some(*self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Declared aggregation function label, empty when the kind declares none.
    pub fn function_name(&self) -> &'static str {
        match self {
            MetricKind::Average => "longAvg",
            MetricKind::Percentile => "percentile",
            MetricKind::Percentage => "percent",
            MetricKind::Cpm => "cpm",
            MetricKind::Sum => "sum",
            MetricKind::Max => "max",
            MetricKind::SingleValue => "",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::Average => "Average",
            MetricKind::Percentile => "Percentile",
            MetricKind::Percentage => "Percentage",
            MetricKind::SingleValue => "SingleValue",
            MetricKind::Cpm => "Cpm",
            MetricKind::Sum => "Sum",
            MetricKind::Max => "Max",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of one named metric, as emitted by the aggregation-script compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricKindDescriptor {
    pub name: String,
    #[serde(default)]
    pub function_name: String,
    pub kind: MetricKind,
}

impl MetricKindDescriptor {
    /// Descriptor using the kind's declared function name.
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            function_name: kind.function_name().to_owned(),
            kind,
        }
    }
}

/// Mutable registry used during startup.
#[derive(Debug, Default)]
pub struct MetricRegistryBuilder {
    descriptors: HashMap<String, MetricKindDescriptor>,
}

impl MetricRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor. Identical re-registration is a no-op, a
    /// different kind under an existing name is an error.
    pub fn register(&mut self, descriptor: MetricKindDescriptor) -> Result<&mut Self> {
        match self.descriptors.get(&descriptor.name) {
            Some(existing) if *existing == descriptor => {
                debug!(metric = %descriptor.name, "Ignoring identical re-registration");
            }
            Some(existing) => {
                return Err(Error::Registration(format!(
                    "metric {} is already registered as {}, cannot re-register as {}",
                    descriptor.name, existing.kind, descriptor.kind
                )));
            }
            None => {
                self.descriptors.insert(descriptor.name.clone(), descriptor);
            }
        }
        Ok(self)
    }

    pub fn register_kind(&mut self, name: &str, kind: MetricKind) -> Result<&mut Self> {
        self.register(MetricKindDescriptor::new(name, kind))
    }

    /// Freezes the registry.
    pub fn build(self) -> MetricRegistry {
        info!(metrics = self.descriptors.len(), "Metric registry frozen");
        MetricRegistry {
            descriptors: self.descriptors,
        }
    }
}

/// Read-only metric name → kind mapping.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    descriptors: HashMap<String, MetricKindDescriptor>,
}

impl MetricRegistry {
    pub fn builder() -> MetricRegistryBuilder {
        MetricRegistryBuilder::new()
    }

    pub fn resolve(&self, name: &str) -> Result<&MetricKindDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Can't find metrics, {}", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// True iff `name` resolves to `kind` or to a kind specializing it.
    pub fn is_kind(&self, name: &str, kind: MetricKind) -> Result<bool> {
        Ok(self.resolve(name)?.kind.is_a(kind))
    }

    pub fn function_name(kind: MetricKind) -> &'static str {
        kind.function_name()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MetricRegistry {
        let mut builder = MetricRegistry::builder();
        builder
            .register_kind("service_resp_time", MetricKind::Average)
            .unwrap()
            .register_kind("service_cpm", MetricKind::Cpm)
            .unwrap()
            .register_kind("service_percentile", MetricKind::Percentile)
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = registry();
        assert!(matches!(registry.resolve("nope"), Err(Error::NotFound(_))));
        assert!(matches!(
            registry.is_kind("nope", MetricKind::Average),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_is_kind_specialization() {
        let registry = registry();
        assert!(registry.is_kind("service_cpm", MetricKind::Cpm).unwrap());
        assert!(registry.is_kind("service_cpm", MetricKind::SingleValue).unwrap());
        assert!(!registry.is_kind("service_cpm", MetricKind::Average).unwrap());
        assert!(!registry.is_kind("service_resp_time", MetricKind::SingleValue).unwrap());
    }

    #[test]
    fn test_reregistration() {
        let mut builder = MetricRegistry::builder();
        builder.register_kind("a", MetricKind::Sum).unwrap();
        assert!(builder.register_kind("a", MetricKind::Sum).is_ok());
        assert!(matches!(
            builder.register_kind("a", MetricKind::Max),
            Err(Error::Registration(_))
        ));
        assert_eq!(builder.build().resolve("a").unwrap().kind, MetricKind::Sum);
    }

    #[test]
    fn test_function_names() {
        assert_eq!(MetricRegistry::function_name(MetricKind::Percentile), "percentile");
        assert_eq!(MetricRegistry::function_name(MetricKind::Average), "longAvg");
        assert_eq!(MetricRegistry::function_name(MetricKind::SingleValue), "");
    }
}
