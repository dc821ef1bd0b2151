use std::collections::HashSet;

use arch::{Mnemonic, Reg};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::ast::{Node, NodeKind};
use crate::error::Error;

/// Names with this suffix are resolved by the external linker hook.
pub const EXTERN_SUFFIX: &str = "@extern";

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "$", "$$", "org", "bits", "target", "times", "equ", "db", "dw", "dd", "dq", "dt",
    ])
});

pub fn is_reserved(name: &str) -> bool {
    KEYWORDS.contains(name.to_ascii_lowercase().as_str())
        || Reg::parse(name).is_some()
        || Mnemonic::parse(name).is_some()
}

pub fn is_local(name: &str) -> bool {
    name.starts_with('.')
}

pub fn is_external(name: &str) -> bool {
    name.ends_with(EXTERN_SUFFIX)
}

/// Label name -> absolute address, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Labels(IndexMap<String, i64>);

impl Labels {
    pub fn new() -> Self {
        Labels(IndexMap::new())
    }

    pub fn insert(&mut self, name: String, address: i64) -> Option<i64> {
        self.0.insert(name, address)
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Move every label placed after `offset` by `delta` bytes.
    pub fn shift_after(&mut self, offset: i64, delta: i64) {
        for address in self.0.values_mut().filter(|address| **address > offset) {
            *address += delta;
        }
    }

    /// Like `shift_after`, but labels sitting at `offset` move too once
    /// they were declared at position `first` or later.
    pub fn shift_from(&mut self, offset: i64, first: usize, delta: i64) {
        for (position, address) in self.0.values_mut().enumerate() {
            if *address > offset || (*address == offset && position >= first) {
                *address += delta;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(name, address)| (name.as_str(), *address))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Nearest preceding global label of every top-level node.
#[derive(Debug, Clone, Default)]
pub struct Scopes(Vec<Option<String>>);

impl Scopes {
    pub fn new(nodes: &[Node]) -> Self {
        let mut parent: Option<String> = None;
        let scopes = nodes
            .iter()
            .map(|node| {
                if let NodeKind::Label(label) = &node.kind {
                    if !is_local(&label.name) {
                        parent = Some(label.name.clone());
                    }
                }
                parent.clone()
            })
            .collect();
        Scopes(scopes)
    }

    /// Fully qualified name of `name` as seen from node `index`.
    pub fn qualify(&self, index: usize, name: &str) -> Result<String, Error> {
        if !is_local(name) {
            return Ok(name.to_string());
        }
        match self.0.get(index).and_then(Option::as_deref) {
            Some(parent) => Ok(format!("{parent}{name}")),
            None => Err(Error::MissingParentLabel(name.to_string())),
        }
    }
}
