//! # Relationship Resolver
//!
//! Finds the foreign key connecting a table to an embedded resource. The
//! resolver never guesses: when more than one key qualifies the embed must
//! carry a hint naming the constraint or the foreign-key column.

use crate::schema::{ColumnInfo, ForeignKeyInfo, SchemaSnapshot, TableInfo};

use super::errors::{RestError, RestResult};
use super::request::EmbedSpec;

/// Which side of the foreign key the embedded table is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Parent row holds the foreign key; embed is a single object
    ManyToOne,
    /// Embedded rows hold the foreign key; embed is an array
    OneToMany,
}

/// A resolved relationship from `parent` to `child`
#[derive(Debug, Clone)]
pub struct Relationship<'s> {
    pub parent: &'s TableInfo,
    pub child: &'s TableInfo,
    pub fk: &'s ForeignKeyInfo,
    pub cardinality: Cardinality,
}

impl<'s> Relationship<'s> {
    /// Column pairs `(child column, parent column)` forming the join condition
    pub fn join_pairs(&self) -> RestResult<Vec<(&'s ColumnInfo, &'s ColumnInfo)>> {
        let (child_cols, parent_cols) = match self.cardinality {
            Cardinality::ManyToOne => (&self.fk.referenced_columns, &self.fk.columns),
            Cardinality::OneToMany => (&self.fk.columns, &self.fk.referenced_columns),
        };
        child_cols
            .iter()
            .zip(parent_cols.iter())
            .map(|(c, p)| {
                let child = self.child.find_column(c);
                let parent = self.parent.find_column(p);
                match (child, parent) {
                    (Some(child), Some(parent)) => Ok((child, parent)),
                    _ => Err(RestError::validation(format!(
                        "relationship {} references columns missing from the schema",
                        self.fk.name
                    ))),
                }
            })
            .collect()
    }
}

/// Resolves embed directives against the snapshot's foreign-key graph
#[derive(Debug, Clone, Copy)]
pub struct RelationshipResolver<'s> {
    snapshot: &'s SchemaSnapshot,
    max_depth: usize,
}

impl<'s> RelationshipResolver<'s> {
    pub fn new(snapshot: &'s SchemaSnapshot, max_depth: usize) -> Self {
        Self {
            snapshot,
            max_depth,
        }
    }

    /// Resolve `spec` embedded under `parent` at nesting `depth` (1 = top level)
    pub fn resolve(
        &self,
        parent: &'s TableInfo,
        spec: &EmbedSpec,
        depth: usize,
    ) -> RestResult<Relationship<'s>> {
        if depth > self.max_depth {
            return Err(RestError::validation(format!(
                "embedding is limited to a depth of {}",
                self.max_depth
            )));
        }

        let child = self
            .snapshot
            .table(&parent.schema, &spec.table)
            .ok_or_else(|| {
                RestError::validation(format!("no table '{}' to embed", spec.table))
            })?;
        let parent_ref = parent.table_ref();
        let child_ref = child.table_ref();

        let mut candidates: Vec<Relationship<'s>> = Vec::new();
        for fk in &parent.foreign_keys {
            if parent.referenced_ref(fk) == child_ref {
                candidates.push(Relationship {
                    parent,
                    child,
                    fk,
                    cardinality: Cardinality::ManyToOne,
                });
            }
        }
        for fk in &child.foreign_keys {
            if child.referenced_ref(fk) == parent_ref {
                candidates.push(Relationship {
                    parent,
                    child,
                    fk,
                    cardinality: Cardinality::OneToMany,
                });
            }
        }

        if let Some(hint) = &spec.hint {
            candidates.retain(|rel| matches_hint(rel.fk, hint));
        }

        match candidates.len() {
            0 => Err(RestError::validation(match &spec.hint {
                Some(hint) => format!(
                    "no relationship between '{}' and '{}' matches '{}'",
                    parent.name, child.name, hint
                ),
                None => format!(
                    "no relationship between '{}' and '{}'",
                    parent.name, child.name
                ),
            })),
            1 => {
                let rel = candidates.remove(0);
                // Surface metadata gaps here rather than at emission
                rel.join_pairs()?;
                Ok(rel)
            }
            _ => Err(RestError::AmbiguousRelationship {
                from: parent.name.clone(),
                to: child.name.clone(),
                candidates: candidates.iter().map(|rel| rel.fk.name.clone()).collect(),
            }),
        }
    }
}

fn matches_hint(fk: &ForeignKeyInfo, hint: &str) -> bool {
    fk.name == hint || (fk.columns.len() == 1 && fk.columns[0] == hint)
}
