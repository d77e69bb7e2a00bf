// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Entities: an object key with its scope and chained value blocks.

use crate::errors::{UpllError, UpllResult};
use crate::key::ObjectKey;
use crate::scope::ScopeData;
use crate::status::AggregateStatus;
use crate::validity::{AttributeValidity, ConfigStatus};
use crate::value::FieldValue;
use std::fmt::Display;

/// One attribute of a value block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Attr {
    pub value: Option<FieldValue>,
    pub valid: AttributeValidity,
    pub cs: ConfigStatus,
}

impl Attr {
    #[must_use]
    pub fn valid(value: FieldValue) -> Self {
        Self {
            value: Some(value),
            valid: AttributeValidity::Valid,
            cs: ConfigStatus::Unknown,
        }
    }
}

/// An ordered set of attributes, configured or observed, with the row config-status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ValueBlock {
    attrs: Vec<Attr>,
    pub row_cs: ConfigStatus,
}

impl ValueBlock {
    /// A block of `len` attributes, all [`AttributeValidity::Invalid`].
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            attrs: vec![Attr::default(); len],
            row_cs: ConfigStatus::Unknown,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    #[must_use]
    pub fn attr(&self, index: usize) -> Option<&Attr> {
        self.attrs.get(index)
    }

    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if the index is out of range.
    pub fn attr_mut(&mut self, index: usize) -> UpllResult<&mut Attr> {
        let len = self.attrs.len();
        self.attrs.get_mut(index).ok_or_else(|| {
            UpllError::Generic(format!("attribute {index} out of range (block of {len})"))
        })
    }

    /// The value of an attribute, if it is valid.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&FieldValue> {
        self.attrs
            .get(index)
            .filter(|a| a.valid == AttributeValidity::Valid)
            .and_then(|a| a.value.as_ref())
    }

    /// Set an attribute and mark it valid.
    ///
    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if the index is out of range.
    pub fn set(&mut self, index: usize, value: impl Into<FieldValue>) -> UpllResult {
        let attr = self.attr_mut(index)?;
        attr.value = Some(value.into());
        attr.valid = AttributeValidity::Valid;
        Ok(())
    }

    /// Request that an attribute be erased.
    ///
    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if the index is out of range.
    pub fn clear(&mut self, index: usize) -> UpllResult {
        let attr = self.attr_mut(index)?;
        attr.value = None;
        attr.valid = AttributeValidity::ValidNoValue;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails with [`UpllError::Generic`] if the index is out of range.
    pub fn set_validity(&mut self, index: usize, valid: AttributeValidity) -> UpllResult {
        self.attr_mut(index)?.valid = valid;
        Ok(())
    }

    /// Set the config-status of every present attribute and of the row.
    pub fn mark_cs(&mut self, cs: ConfigStatus) {
        self.row_cs = cs;
        for attr in self.attrs.iter_mut().filter(|a| a.valid.is_present()) {
            attr.cs = cs;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Attr)> {
        self.attrs.iter().enumerate()
    }

    /// Indices of attributes whose validity makes them present.
    #[must_use]
    pub fn present(&self) -> Vec<usize> {
        self.iter()
            .filter(|(_, a)| a.valid.is_present())
            .map(|(i, _)| i)
            .collect()
    }
}

/// The value chain of an object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ValueRecord {
    pub config: Option<ValueBlock>,
    /// Observed attributes. Only meaningful when read from the STATE datastore.
    pub state: Option<ValueBlock>,
    pub status: Option<AggregateStatus>,
}

/// An object instance as exchanged with the Versioned Store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entity {
    pub key: ObjectKey,
    pub scope: ScopeData,
    pub value: ValueRecord,
    /// Changed flag maintained by the write path on CANDIDATE and IMPORT rows.
    pub changed: bool,
}

impl Entity {
    #[must_use]
    pub fn new(key: ObjectKey) -> Self {
        Self {
            key,
            scope: ScopeData::default(),
            value: ValueRecord::default(),
            changed: false,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: ScopeData) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ValueBlock) -> Self {
        self.value.config = Some(config);
        self
    }

    #[must_use]
    pub fn config(&self) -> Option<&ValueBlock> {
        self.value.config.as_ref()
    }

    /// The configuration block, allocated with `len` attributes if missing.
    pub fn config_or_alloc(&mut self, len: usize) -> &mut ValueBlock {
        self.value.config.get_or_insert_with(|| ValueBlock::new(len))
    }

    /// The state block, allocated with `len` attributes if missing.
    pub fn state_or_alloc(&mut self, len: usize) -> &mut ValueBlock {
        self.value.state.get_or_insert_with(|| ValueBlock::new(len))
    }

    /// The valid value of a configured attribute.
    #[must_use]
    pub fn config_value(&self, index: usize) -> Option<&FieldValue> {
        self.config().and_then(|c| c.value(index))
    }

    #[must_use]
    pub fn status(&self) -> Option<&AggregateStatus> {
        self.value.status.as_ref()
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.key, self.scope)
    }
}
