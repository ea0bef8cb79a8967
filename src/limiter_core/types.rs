//! Core data types shared across the rate-limit pipeline

use chrono::{DateTime, Utc};

/// One of the nine tracked edit categories:
/// {created, modified, deleted} x {point, way, relation}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditCategory {
    CreatedPoints,
    ModifiedPoints,
    DeletedPoints,
    CreatedWays,
    ModifiedWays,
    DeletedWays,
    CreatedRelations,
    ModifiedRelations,
    DeletedRelations,
}

impl EditCategory {
    pub fn all() -> [EditCategory; 9] {
        [
            EditCategory::CreatedPoints,
            EditCategory::ModifiedPoints,
            EditCategory::DeletedPoints,
            EditCategory::CreatedWays,
            EditCategory::ModifiedWays,
            EditCategory::DeletedWays,
            EditCategory::CreatedRelations,
            EditCategory::ModifiedRelations,
            EditCategory::DeletedRelations,
        ]
    }

    /// Verb used in published breach reasons
    pub fn verb(&self) -> &'static str {
        match self {
            EditCategory::CreatedPoints
            | EditCategory::CreatedWays
            | EditCategory::CreatedRelations => "Created",
            EditCategory::ModifiedPoints
            | EditCategory::ModifiedWays
            | EditCategory::ModifiedRelations => "Modified",
            EditCategory::DeletedPoints
            | EditCategory::DeletedWays
            | EditCategory::DeletedRelations => "Deleted",
        }
    }

    /// Plural noun used in published breach reasons
    pub fn noun(&self) -> &'static str {
        match self {
            EditCategory::CreatedPoints
            | EditCategory::ModifiedPoints
            | EditCategory::DeletedPoints => "points",
            EditCategory::CreatedWays
            | EditCategory::ModifiedWays
            | EditCategory::DeletedWays => "ways",
            EditCategory::CreatedRelations
            | EditCategory::ModifiedRelations
            | EditCategory::DeletedRelations => "relations",
        }
    }

    /// Per-24h base ceiling before the account ratio is applied
    pub fn base_limit(&self) -> u64 {
        match self {
            EditCategory::CreatedPoints => 3000,
            EditCategory::ModifiedPoints => 500,
            EditCategory::DeletedPoints => 500,
            EditCategory::CreatedWays => 700,
            EditCategory::ModifiedWays => 250,
            EditCategory::DeletedWays => 200,
            EditCategory::CreatedRelations => 100,
            EditCategory::ModifiedRelations => 50,
            EditCategory::DeletedRelations => 50,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            EditCategory::CreatedPoints => 0,
            EditCategory::ModifiedPoints => 1,
            EditCategory::DeletedPoints => 2,
            EditCategory::CreatedWays => 3,
            EditCategory::ModifiedWays => 4,
            EditCategory::DeletedWays => 5,
            EditCategory::CreatedRelations => 6,
            EditCategory::ModifiedRelations => 7,
            EditCategory::DeletedRelations => 8,
        }
    }
}

/// Counter block covering the nine edit categories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditCounts([u64; 9]);

impl EditCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: EditCategory) -> u64 {
        self.0[category.index()]
    }

    pub fn increment(&mut self, category: EditCategory) {
        self.0[category.index()] += 1;
    }

    pub fn merge(&mut self, other: &EditCounts) {
        for i in 0..9 {
            self.0[i] += other.0[i];
        }
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

/// Per-changeset delta folded out of one replication batch
///
/// Username and timestamp are captured from the first elementary edit
/// seen for the changeset within the batch.
#[derive(Debug, Clone)]
pub struct ChangesetDelta {
    pub changeset_id: i64,
    pub account_id: i64,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub counts: EditCounts,
}
