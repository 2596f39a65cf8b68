// /////////////////////////////////////////////////////////////////////////////
// Orbiter
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Query / Transform Builders
//!
//! A fluent surface over [`QueryExpression`]/[`Operation`] construction,
//! plus the normalization step ([`build_query`]/[`build_transform`]) the
//! Source kernel's pipeline runs every caller input through.

use orbiter_model::error::OrbitError;
use orbiter_model::identity::RecordIdentity;
use orbiter_model::operations::Operation;
use orbiter_model::query::{Filter, FindRecordsModifiers, PageSpecifier, Query, QueryExpression, SortSpecifier};
use orbiter_model::record::Record;
use orbiter_model::transform::Transform;

/// A term that knows how to render itself as a canonical expression. The
/// builder's fluent methods return concrete term types; callers needing to
/// pass one through a generic path can box it behind this trait.
pub trait QueryTerm: Send + Sync {
    fn to_query_expression(&self) -> QueryExpression;
}

pub trait TransformTerm: Send + Sync {
    fn to_operation(&self) -> Operation;
}

/// Everything [`build_query`] accepts.
pub enum QueryInput {
    Expression(QueryExpression),
    Expressions(Vec<QueryExpression>),
    Term(Box<dyn QueryTerm>),
    Terms(Vec<Box<dyn QueryTerm>>),
    Query(Query),
    Builder(Box<dyn Fn(&QueryBuilder) -> Box<dyn QueryTerm> + Send + Sync>),
}

impl From<QueryExpression> for QueryInput {
    fn from(expression: QueryExpression) -> Self {
        QueryInput::Expression(expression)
    }
}

impl From<Query> for QueryInput {
    fn from(query: Query) -> Self {
        QueryInput::Query(query)
    }
}

/// Normalizes any [`QueryInput`] shape into a canonical [`Query`]. A
/// fully-formed `Query` passes through unchanged.
pub fn build_query(input: QueryInput, builder: &QueryBuilder) -> Result<Query, OrbitError> {
    match input {
        QueryInput::Expression(expression) => Ok(Query::single(expression)),
        QueryInput::Expressions(expressions) => Ok(Query::new(expressions)),
        QueryInput::Term(term) => Ok(Query::single(term.to_query_expression())),
        QueryInput::Terms(terms) => Ok(Query::new(terms.iter().map(|t| t.to_query_expression()).collect())),
        QueryInput::Query(query) => Ok(query),
        QueryInput::Builder(build_fn) => Ok(Query::single(build_fn(builder).to_query_expression())),
    }
}

pub enum TransformInput {
    Operation(Operation),
    Operations(Vec<Operation>),
    Term(Box<dyn TransformTerm>),
    Terms(Vec<Box<dyn TransformTerm>>),
    Transform(Transform),
    Builder(Box<dyn Fn(&TransformBuilder) -> Box<dyn TransformTerm> + Send + Sync>),
}

impl From<Operation> for TransformInput {
    fn from(operation: Operation) -> Self {
        TransformInput::Operation(operation)
    }
}

impl From<Transform> for TransformInput {
    fn from(transform: Transform) -> Self {
        TransformInput::Transform(transform)
    }
}

pub fn build_transform(input: TransformInput, builder: &TransformBuilder) -> Result<Transform, OrbitError> {
    match input {
        TransformInput::Operation(operation) => Ok(Transform::new(vec![operation])),
        TransformInput::Operations(operations) => Ok(Transform::new(operations)),
        TransformInput::Term(term) => Ok(Transform::new(vec![term.to_operation()])),
        TransformInput::Terms(terms) => Ok(Transform::new(terms.iter().map(|t| t.to_operation()).collect())),
        TransformInput::Transform(transform) => Ok(transform),
        TransformInput::Builder(build_fn) => Ok(Transform::new(vec![build_fn(builder).to_operation()])),
    }
}

// ------------------------------------------------------------ query terms

pub struct FindRecordTerm {
    record: RecordIdentity,
}

impl QueryTerm for FindRecordTerm {
    fn to_query_expression(&self) -> QueryExpression {
        QueryExpression::FindRecord { record: self.record.clone() }
    }
}

pub struct FindRecordsTerm {
    type_name: Option<String>,
    modifiers: FindRecordsModifiers,
}

impl FindRecordsTerm {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.modifiers.filter.push(filter);
        self
    }

    pub fn sort(mut self, sort: SortSpecifier) -> Self {
        self.modifiers.sort.push(sort);
        self
    }

    pub fn page(mut self, page: PageSpecifier) -> Self {
        self.modifiers.page = Some(page);
        self
    }
}

impl QueryTerm for FindRecordsTerm {
    fn to_query_expression(&self) -> QueryExpression {
        QueryExpression::FindRecords {
            type_name: self.type_name.clone(),
            modifiers: self.modifiers.clone(),
        }
    }
}

pub struct FindRelatedRecordTerm {
    record: RecordIdentity,
    relationship: String,
}

impl QueryTerm for FindRelatedRecordTerm {
    fn to_query_expression(&self) -> QueryExpression {
        QueryExpression::FindRelatedRecord {
            record: self.record.clone(),
            relationship: self.relationship.clone(),
        }
    }
}

pub struct FindRelatedRecordsTerm {
    record: RecordIdentity,
    relationship: String,
    modifiers: FindRecordsModifiers,
}

impl FindRelatedRecordsTerm {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.modifiers.filter.push(filter);
        self
    }

    pub fn sort(mut self, sort: SortSpecifier) -> Self {
        self.modifiers.sort.push(sort);
        self
    }

    pub fn page(mut self, page: PageSpecifier) -> Self {
        self.modifiers.page = Some(page);
        self
    }
}

impl QueryTerm for FindRelatedRecordsTerm {
    fn to_query_expression(&self) -> QueryExpression {
        QueryExpression::FindRelatedRecords {
            record: self.record.clone(),
            relationship: self.relationship.clone(),
            modifiers: self.modifiers.clone(),
        }
    }
}

/// The default query builder: one fluent entry point per [`QueryExpression`]
/// kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn find_record(&self, record: RecordIdentity) -> FindRecordTerm {
        FindRecordTerm { record }
    }

    pub fn find_records(&self, type_name: impl Into<String>) -> FindRecordsTerm {
        FindRecordsTerm {
            type_name: Some(type_name.into()),
            modifiers: FindRecordsModifiers::default(),
        }
    }

    pub fn find_related_record(&self, record: RecordIdentity, relationship: impl Into<String>) -> FindRelatedRecordTerm {
        FindRelatedRecordTerm {
            record,
            relationship: relationship.into(),
        }
    }

    pub fn find_related_records(&self, record: RecordIdentity, relationship: impl Into<String>) -> FindRelatedRecordsTerm {
        FindRelatedRecordsTerm {
            record,
            relationship: relationship.into(),
            modifiers: FindRecordsModifiers::default(),
        }
    }
}

// -------------------------------------------------------- transform terms

macro_rules! operation_term {
    ($name:ident) => {
        pub struct $name(Operation);

        impl TransformTerm for $name {
            fn to_operation(&self) -> Operation {
                self.0.clone()
            }
        }
    };
}

operation_term!(AddRecordTerm);
operation_term!(UpdateRecordTerm);

/// The default transform builder: operations are flat data, so each method
/// here is a thin, type-checked constructor rather than a multi-step fluent
/// chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformBuilder;

impl TransformBuilder {
    pub fn add_record(&self, record: Record) -> AddRecordTerm {
        AddRecordTerm(Operation::AddRecord { record })
    }

    pub fn update_record(&self, record: Record) -> UpdateRecordTerm {
        UpdateRecordTerm(Operation::UpdateRecord { record })
    }

    pub fn remove_record(&self, record: RecordIdentity) -> RemoveRecordTerm {
        RemoveRecordTerm(Operation::RemoveRecord { record })
    }

    pub fn replace_key(&self, record: RecordIdentity, key: impl Into<String>, value: impl Into<String>) -> ReplaceKeyTerm {
        ReplaceKeyTerm(Operation::ReplaceKey {
            record,
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn replace_attribute(&self, record: RecordIdentity, attribute: impl Into<String>, value: Option<serde_json::Value>) -> ReplaceAttributeTerm {
        ReplaceAttributeTerm(Operation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value,
        })
    }

    pub fn add_to_related_records(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> AddToRelatedRecordsTerm {
        AddToRelatedRecordsTerm(Operation::AddToRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        })
    }

    pub fn remove_from_related_records(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> RemoveFromRelatedRecordsTerm {
        RemoveFromRelatedRecordsTerm(Operation::RemoveFromRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        })
    }

    pub fn replace_related_records(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_records: Vec<RecordIdentity>,
    ) -> ReplaceRelatedRecordsTerm {
        ReplaceRelatedRecordsTerm(Operation::ReplaceRelatedRecords {
            record,
            relationship: relationship.into(),
            related_records,
        })
    }

    pub fn replace_related_record(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: Option<RecordIdentity>,
    ) -> ReplaceRelatedRecordTerm {
        ReplaceRelatedRecordTerm(Operation::ReplaceRelatedRecord {
            record,
            relationship: relationship.into(),
            related_record,
        })
    }
}

operation_term!(RemoveRecordTerm);
operation_term!(ReplaceKeyTerm);
operation_term!(ReplaceAttributeTerm);
operation_term!(AddToRelatedRecordsTerm);
operation_term!(RemoveFromRelatedRecordsTerm);
operation_term!(ReplaceRelatedRecordsTerm);
operation_term!(ReplaceRelatedRecordTerm);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_input_passes_through_as_a_single_element_query() {
        let builder = QueryBuilder;
        let query = build_query(
            QueryExpression::FindRecord {
                record: RecordIdentity::new("planet", "earth"),
            }
            .into(),
            &builder,
        )
        .unwrap();
        assert_eq!(query.expressions.len(), 1);
    }

    #[test]
    fn a_fully_formed_query_passes_through_unchanged() {
        let builder = QueryBuilder;
        let original = Query::single(QueryExpression::FindRecord {
            record: RecordIdentity::new("planet", "earth"),
        });
        let result = build_query(original.clone().into(), &builder).unwrap();
        assert_eq!(result.id, original.id);
    }

    #[test]
    fn builder_function_input_resolves_through_the_fluent_surface() {
        let builder = QueryBuilder;
        let input = QueryInput::Builder(Box::new(|b: &QueryBuilder| -> Box<dyn QueryTerm> {
            Box::new(b.find_records("planet").sort(SortSpecifier::asc("name")))
        }));
        let query = build_query(input, &builder).unwrap();
        assert!(matches!(&query.expressions[0], QueryExpression::FindRecords { .. }));
    }

    #[test]
    fn transform_builder_produces_a_single_operation_transform() {
        let builder = TransformBuilder;
        let transform = build_transform(
            builder.remove_record(RecordIdentity::new("planet", "earth")).to_operation().into(),
            &builder,
        )
        .unwrap();
        assert_eq!(transform.operations.len(), 1);
    }
}
