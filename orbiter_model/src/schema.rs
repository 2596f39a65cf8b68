// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Schema
//!
//! Declares, per record type, the attributes, keys, and relationships the
//! rest of the runtime is allowed to reference. A `Schema` is immutable once
//! built; `upgrade()` produces a new `Schema` and bumps `version`, which is
//! how the Source kernel's `autoUpgrade` option reacts to model changes.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use uuid::Uuid;

use crate::error::OrbitError;

/// Identifier names (type, attribute, key, relationship) must match this
/// shape — a leading letter followed by letters, digits, or underscores.
fn validate_identifier_name(kind: &str, name: &str) -> Result<(), OrbitError> {
    let pattern = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static pattern is valid");
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(OrbitError::SchemaError(format!("invalid {kind} name '{name}'")))
    }
}

/// Mints a fresh local identifier for a newly-added record.
///
/// `Schema` owns one of these; the default is [`UuidIdGenerator`]. Tests that
/// need deterministic ids inject their own implementation instead.
pub trait IdGenerator: fmt::Debug + Send + Sync {
    fn generate(&self) -> String;
}

/// The default generator: a random UUIDv4 rendered as a string.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    HasOne,
    HasMany,
}

#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    pub type_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct KeyDefinition {
    pub primary_key: bool,
}

#[derive(Debug, Clone)]
pub struct RelationshipDefinition {
    pub kind: RelationshipKind,
    /// Record type(s) this relationship may point at.
    pub target_types: Vec<String>,
    /// Name of the relationship on the other side that mirrors this one, if
    /// the schema declares an inverse.
    pub inverse: Option<String>,
}

/// The attribute/key/relationship declarations for one record type.
#[derive(Debug, Clone, Default)]
pub struct ModelDefinition {
    pub attributes: HashMap<String, AttributeDefinition>,
    pub keys: HashMap<String, KeyDefinition>,
    pub relationships: HashMap<String, RelationshipDefinition>,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.attributes.insert(
            name.into(),
            AttributeDefinition {
                type_name: type_name.into(),
            },
        );
        self
    }

    pub fn with_key(mut self, name: impl Into<String>) -> Self {
        self.keys.insert(name.into(), KeyDefinition::default());
        self
    }

    pub fn with_relationship(
        mut self,
        name: impl Into<String>,
        kind: RelationshipKind,
        target_types: Vec<String>,
        inverse: Option<String>,
    ) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipDefinition {
                kind,
                target_types,
                inverse,
            },
        );
        self
    }
}

/// The full set of model definitions for one schema version, plus the id
/// generator records of any type are minted through.
pub struct Schema {
    version: u64,
    models: HashMap<String, ModelDefinition>,
    id_generator: Box<dyn IdGenerator>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("version", &self.version)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Schema {
    pub fn new(models: HashMap<String, ModelDefinition>) -> Self {
        Self {
            version: 1,
            models,
            id_generator: Box::new(UuidIdGenerator),
        }
    }

    pub fn with_id_generator(mut self, generator: Box<dyn IdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn generate_id(&self) -> String {
        self.id_generator.generate()
    }

    pub fn model(&self, type_name: &str) -> Result<&ModelDefinition, OrbitError> {
        self.models
            .get(type_name)
            .ok_or_else(|| OrbitError::ModelNotDefined(type_name.to_string()))
    }

    pub fn has_model(&self, type_name: &str) -> bool {
        self.models.contains_key(type_name)
    }

    pub fn relationship_definition(
        &self,
        type_name: &str,
        relationship: &str,
    ) -> Result<&RelationshipDefinition, OrbitError> {
        self.model(type_name)?.relationships.get(relationship).ok_or_else(|| {
            OrbitError::SchemaError(format!(
                "relationship '{relationship}' not declared on type '{type_name}'"
            ))
        })
    }

    /// Validates every declared name against the identifier shape the rest
    /// of the runtime assumes. Not run implicitly by `new` — a host
    /// authoring a schema from untrusted input calls this once up front.
    pub fn validate(&self) -> Result<(), OrbitError> {
        for (type_name, model) in &self.models {
            validate_identifier_name("type", type_name)?;
            for attribute in model.attributes.keys() {
                validate_identifier_name("attribute", attribute)?;
            }
            for key in model.keys.keys() {
                validate_identifier_name("key", key)?;
            }
            for relationship in model.relationships.keys() {
                validate_identifier_name("relationship", relationship)?;
            }
        }
        Ok(())
    }

    /// Produces a new schema with model definitions replaced and the version
    /// incremented. The kernel's `autoUpgrade` handling reacts to this.
    ///
    /// The id generator does not carry forward automatically (`Box<dyn
    /// IdGenerator>` isn't `Clone`); callers relying on a custom generator
    /// across an upgrade should re-apply it with [`Schema::with_id_generator`].
    pub fn upgrade(&self, models: HashMap<String, ModelDefinition>) -> Self {
        Self {
            version: self.version + 1,
            models,
            id_generator: Box::new(UuidIdGenerator),
        }
    }
}
