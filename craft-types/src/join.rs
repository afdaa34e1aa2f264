use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::part::{Part, PartName, PlacedPart};

/// How to treat a name that one stage references but the authoritative list lacks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Skip the orphan and log it.
    #[default]
    Permissive,
    /// Fail the join.
    Strict,
}

#[derive(Debug, Error, PartialEq)]
pub enum JoinError {
    #[error("part name {0:?} is not in the parts list")]
    Orphan(String),
    #[error("part name {0:?} appears more than once")]
    DuplicateName(String),
}

pub trait Named {
    fn name(&self) -> &PartName;
}

impl Named for Part {
    fn name(&self) -> &PartName {
        &self.name
    }
}

impl Named for PlacedPart {
    fn name(&self) -> &PartName {
        &self.name
    }
}

/// Name-keyed view over a list of parts, preserving list order.
pub struct PartIndex<'a, T> {
    items: &'a [T],
    by_name: HashMap<&'a str, usize>,
}

impl<'a, T: Named> PartIndex<'a, T> {
    pub fn new(items: &'a [T]) -> Result<Self, JoinError> {
        let mut by_name = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let name = item.name().as_str();
            if by_name.insert(name, i).is_some() {
                return Err(JoinError::DuplicateName(name.to_string()));
            }
        }
        Ok(Self { items, by_name })
    }

    pub fn get(&self, name: &str) -> Option<&'a T> {
        self.by_name.get(name).map(|&i| &self.items[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Items whose name is in `names`, in index order.
    pub fn select<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
        policy: JoinPolicy,
    ) -> Result<Vec<&'a T>, JoinError> {
        let mut wanted = HashSet::new();
        for name in names {
            if !self.contains(name) {
                orphan(name, policy)?;
                continue;
            }
            wanted.insert(name);
        }
        Ok(self
            .items
            .iter()
            .filter(|item| wanted.contains(item.name().as_str()))
            .collect())
    }

    /// Check every name of a later stage against this authoritative list.
    pub fn check_known<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
        policy: JoinPolicy,
    ) -> Result<(), JoinError> {
        for name in names {
            if !self.contains(name) {
                orphan(name, policy)?;
            }
        }
        Ok(())
    }
}

fn orphan(name: &str, policy: JoinPolicy) -> Result<(), JoinError> {
    match policy {
        JoinPolicy::Strict => Err(JoinError::Orphan(name.to_string())),
        JoinPolicy::Permissive => {
            warn!(part = name, "[join] skipping name absent from parts list");
            Ok(())
        }
    }
}
