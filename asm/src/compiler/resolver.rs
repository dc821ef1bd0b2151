use indexmap::IndexMap;

use crate::error::Error;
use crate::expr::Lookup;
use crate::label::{is_external, Labels, Scopes};

/// `(name, instruction address) -> address` of a symbol linked elsewhere.
pub type ExternalLinker = dyn Fn(&str, i64) -> i64;

/// Constant name -> value, `None` while it waits for a forward reference.
pub type EquTable = IndexMap<String, Option<i64>>;

/// Symbol tables of one compile.
pub struct Symbols<'c> {
    pub labels: Labels,
    pub equ: EquTable,
    pub scopes: Scopes,
    pub origin: i64,
    pub external: Option<&'c ExternalLinker>,
}

impl<'c> Symbols<'c> {
    /// Resolver for the node `index` placed at `address`.
    pub fn resolver(&self, index: usize, address: i64) -> Resolver<'_, 'c> {
        Resolver {
            symbols: self,
            index,
            address,
        }
    }

    /// Store a constant, returning whether its value changed.
    pub fn set_equ(&mut self, name: &str, value: Option<i64>) -> bool {
        match self.equ.get_mut(name) {
            Some(slot) if *slot == value => false,
            Some(slot) => {
                *slot = value;
                true
            }
            None => {
                self.equ.insert(name.to_string(), value);
                true
            }
        }
    }
}

pub struct Resolver<'s, 'c> {
    symbols: &'s Symbols<'c>,
    index: usize,
    address: i64,
}

impl Lookup for Resolver<'_, '_> {
    fn lookup(&self, name: &str) -> Result<Option<i64>, Error> {
        match name {
            "$$" => return Ok(Some(self.symbols.origin)),
            "$" => return Ok(Some(self.address)),
            _ => {}
        }

        if let Some(value) = self.symbols.equ.get(name) {
            return Ok(*value);
        }

        if is_external(name) {
            return Ok(self.symbols.external.map(|link| link(name, self.address)));
        }

        let name = self.symbols.scopes.qualify(self.index, name)?;
        match self.symbols.labels.get(&name) {
            Some(address) => Ok(Some(address)),
            None => Err(Error::UnknownLabel(name)),
        }
    }
}

/// Constants known so far, used before any label has an address.
pub struct KnownConstants<'s> {
    pub equ: &'s EquTable,
    pub origin: i64,
    pub address: i64,
}

impl Lookup for KnownConstants<'_> {
    fn lookup(&self, name: &str) -> Result<Option<i64>, Error> {
        Ok(match name {
            "$$" => Some(self.origin),
            "$" => Some(self.address),
            _ => self.equ.get(name).copied().flatten(),
        })
    }
}
