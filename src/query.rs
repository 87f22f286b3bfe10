//! Typeless rows of a query result feed.
//!
//! Query results carry properties without a known object type, so values
//! are coerced by the atomic type each wire property declares for itself
//! rather than through a type definition.

use crate::error::{Error, Result};
use crate::property::{self, PropertyValue};
use crate::wire::Entry;

/// One row of a query result.
#[derive(Debug, Clone)]
pub struct QueryResult {
    entry: Entry,
}

impl QueryResult {
    pub(crate) fn new(entry: Entry) -> Self {
        Self { entry }
    }

    /// The property ids present in this row.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entry.properties.iter().map(|p| p.id.as_str())
    }

    /// The coerced value of a property, by its self-declared atomic type.
    ///
    /// Queries give no repeating/single hint, so zero values map to an
    /// empty sequence, one value to a single and several to a sequence.
    pub fn get(&self, id: &str) -> Result<PropertyValue> {
        let prop = self
            .entry
            .property(id)
            .ok_or_else(|| Error::UnknownAttribute(id.to_string()))?;
        match prop.values.as_slice() {
            [] => Ok(PropertyValue::Absent),
            [value] => Ok(PropertyValue::Single(property::to_native(prop.atomic, value)?)),
            values => {
                let values: Result<Vec<_>> =
                    values.iter().map(|v| property::to_native(prop.atomic, v)).collect();
                Ok(PropertyValue::Multi(values?))
            }
        }
    }

    /// The raw entry backing this row.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}
