//! Transaction management over the running/candidate pair.
//!
//! # States
//! - RunningOnly: no candidate open
//! - CandidateOpen: an edit transaction holds a validated candidate
//!
//! # State Transitions
//! ```text
//! RunningOnly   → CandidateOpen: make_candidate_config (patch valid)
//! CandidateOpen → CandidateOpen: make_candidate_config (re-patch)
//! CandidateOpen → RunningOnly:  apply_candidate_config (swap)
//! CandidateOpen → RunningOnly:  cancel_candidate_config (discard)
//! ```
//!
//! # Design Decisions
//! - One RwLock serializes every mutation; reads take the shared side
//! - A failed make discards the candidate and restores the prior state
//! - Apply recomputes the safe update order; a dependency cycle rejects
//!   the apply wholesale and leaves the candidate open

pub mod diff;
pub mod refs;

pub use diff::{diff, ChangedLeaf, ConfigDiff};
pub use refs::ReverseRefIndex;

use std::ops::ControlFlow;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::config::loader::{contract_check, LoadError, LoadedConfig};
use crate::config::{apply_patch, check_bounds};
use crate::constraint;
use crate::deps::{DependencyError, DependencyResolver};
use crate::path;
use crate::tree::{attr, Tree, TreeError};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("no candidate configuration is open")]
    NoCandidate,
    #[error("schema validation failed: {}", .0.join("; "))]
    Schema(Vec<String>),
    #[error("constraint violated at `{path}`: {rule}")]
    Constraint { path: String, rule: String },
    #[error(transparent)]
    Cycle(#[from] DependencyError),
    #[error("`{target}` is still referenced by {}", holders.join(", "))]
    ReferenceHeld {
        target: String,
        holders: Vec<String>,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Schema-node view carrying only the recognized attributes.
#[derive(Debug, Serialize)]
pub struct SchemaView {
    pub path: String,
    pub attributes: IndexMap<String, Vec<String>>,
}

struct Inner {
    running: Tree,
    candidate: Option<Tree>,
    running_refs: ReverseRefIndex,
}

/// Owns the running and candidate tree instances and orchestrates
/// validation and ordering around every edit.
pub struct TransactionManager {
    schema_doc: serde_json::Value,
    schema: Tree,
    inner: RwLock<Inner>,
}

impl TransactionManager {
    pub fn new(loaded: LoadedConfig) -> Self {
        let running_refs = ReverseRefIndex::build(&loaded.running, &loaded.schema);
        TransactionManager {
            schema_doc: loaded.schema_doc,
            schema: loaded.schema,
            inner: RwLock::new(Inner {
                running: loaded.running,
                candidate: None,
                running_refs,
            }),
        }
    }

    /// Deep-copy running, apply the patch and validate the result. On
    /// success the candidate transaction is (re)opened; on failure the
    /// prior state is untouched.
    pub fn make_candidate_config(
        &self,
        patch: &serde_json::Value,
        force: bool,
    ) -> Result<(), CommitError> {
        let mut inner = self.inner.write();
        let mut candidate = inner.running.clone();
        apply_patch(&mut candidate, &self.schema, patch)?;
        self.validate_candidate(&inner, &candidate, force)?;
        tracing::info!("candidate configuration opened");
        inner.candidate = Some(candidate);
        Ok(())
    }

    /// Swap the candidate into running. Returns the safe update order
    /// that was applied.
    pub fn apply_candidate_config(&self) -> Result<Vec<String>, CommitError> {
        let mut inner = self.inner.write();
        let order = {
            let candidate = inner.candidate.as_ref().ok_or(CommitError::NoCandidate)?;
            DependencyResolver::new(&self.schema, candidate).update_order()?
        };
        let candidate = inner.candidate.take().ok_or(CommitError::NoCandidate)?;
        inner.running_refs = ReverseRefIndex::build(&candidate, &self.schema);
        inner.running = candidate;
        tracing::info!(steps = order.len(), "candidate applied to running");
        Ok(order)
    }

    /// Discard the candidate unchanged.
    pub fn cancel_candidate_config(&self) -> Result<(), CommitError> {
        let mut inner = self.inner.write();
        match inner.candidate.take() {
            Some(_) => {
                tracing::info!("candidate configuration cancelled");
                Ok(())
            }
            None => Err(CommitError::NoCandidate),
        }
    }

    pub fn has_candidate(&self) -> bool {
        self.inner.read().candidate.is_some()
    }

    pub fn dump_running_config(&self) -> serde_json::Value {
        let inner = self.inner.read();
        inner.running.to_json(inner.running.root())
    }

    pub fn dump_candidate_config(&self) -> Option<serde_json::Value> {
        let inner = self.inner.read();
        inner
            .candidate
            .as_ref()
            .map(|candidate| candidate.to_json(candidate.root()))
    }

    /// Diff running against a patched scratch copy without opening a
    /// transaction.
    pub fn get_config_diff(&self, patch: &serde_json::Value) -> Result<ConfigDiff, CommitError> {
        let inner = self.inner.read();
        let mut scratch = inner.running.clone();
        apply_patch(&mut scratch, &self.schema, patch)?;
        Ok(diff(&inner.running, &scratch))
    }

    /// Resolve a path against the schema document and materialize the
    /// recognized attributes.
    pub fn get_schema_by_xpath(&self, xpath: &str) -> Option<SchemaView> {
        let id = path::select(&self.schema, xpath)?;
        let attributes = self
            .schema
            .attrs(id)
            .cloned()
            .unwrap_or_default();
        Some(SchemaView {
            path: path::node_path(&self.schema, id),
            attributes,
        })
    }

    fn validate_candidate(
        &self,
        inner: &Inner,
        candidate: &Tree,
        force: bool,
    ) -> Result<(), CommitError> {
        // External contract check over the dumped candidate.
        let dumped = candidate.to_json(candidate.root());
        contract_check(&self.schema_doc, &dumped).map_err(|e| match e {
            LoadError::Contract(messages) => CommitError::Schema(messages),
            other => CommitError::Schema(vec![other.to_string()]),
        })?;

        // Semantic bounds.
        let bounds = check_bounds(candidate, &self.schema);
        if !bounds.is_empty() {
            return Err(CommitError::Schema(bounds));
        }

        // Reference integrity over removals.
        let changes = diff(&inner.running, candidate);
        if !force {
            if let Some((target, holders)) = inner.running_refs.held(&changes.removed) {
                return Err(CommitError::ReferenceHeld { target, holders });
            }
        }

        self.check_constraints(&inner.running, candidate, &changes.removed)?;

        // Ordering must be computable; a cycle rejects the edit.
        DependencyResolver::new(&self.schema, candidate).update_order()?;
        Ok(())
    }

    fn check_constraints(
        &self,
        running: &Tree,
        candidate: &Tree,
        removed: &[String],
    ) -> Result<(), CommitError> {
        // update-constraints evaluated over the candidate.
        let mut failure: Option<(String, String)> = None;
        let root = candidate.root();
        let _ = candidate.visit(root, &mut |id| {
            if let Some(schema_node) = candidate.schema_of(id) {
                let rules = self.schema.attr_values(schema_node, attr::UPDATE_CONSTRAINTS);
                if !rules.is_empty()
                    && !constraint::validate_all(
                        &self.schema,
                        candidate,
                        id,
                        rules.iter().map(String::as_str),
                    )
                {
                    failure = Some((path::node_path(candidate, id), rules.join("; ")));
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });
        if let Some((path, rule)) = failure {
            tracing::warn!(%path, "update constraint rejected candidate");
            return Err(CommitError::Constraint { path, rule });
        }

        // delete-constraints evaluated for removed nodes, in the tree
        // they still exist in.
        let running_paths = diff::index_paths(running);
        for removed_path in removed {
            let Some(id) = running_paths.get(removed_path) else {
                continue;
            };
            let Some(schema_node) = running.schema_of(*id) else {
                continue;
            };
            let rules = self.schema.attr_values(schema_node, attr::DELETE_CONSTRAINTS);
            if !rules.is_empty()
                && !constraint::validate_all(
                    &self.schema,
                    running,
                    *id,
                    rules.iter().map(String::as_str),
                )
            {
                tracing::warn!(path = %removed_path, "delete constraint rejected candidate");
                return Err(CommitError::Constraint {
                    path: removed_path.clone(),
                    rule: rules.join("; "),
                });
            }
        }
        Ok(())
    }
}
