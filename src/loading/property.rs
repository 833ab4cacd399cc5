//! Property values and their conversion into stored words
//!
//! Relationship property channels store `f64` bit patterns. Node property
//! columns store either `i64` or `f64`. A value that does not fit the
//! declared type aborts the import with [`CsrError::Conversion`]; nothing is
//! coerced silently.

use super::records::{PropertiesRef, NO_PROPERTIES};
use crate::error::{CsrError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Token identifying a property key in the source
pub type PropertyKey = u32;

/// A property value as read from the source
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// The record has no value for the key
    Missing,
    /// Integral value
    Long(i64),
    /// Floating point value
    Double(f64),
    /// Text value
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("<missing>"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

/// Declared type of a property column or channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// 64-bit float
    #[default]
    Double,
    /// 64-bit signed integer
    Long,
}

impl ValueType {
    /// Name used in error messages
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Double => "f64",
            Self::Long => "i64",
        }
    }
}

/// Resolves property references produced by a [`super::RecordSource`]
pub trait PropertyReader: Sync {
    /// Value of `key` for the record behind `properties_ref`
    fn read(&self, properties_ref: PropertiesRef, key: PropertyKey) -> PropertyValue;
}

/// Reader for records without any properties
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProperties;

impl PropertyReader for NoProperties {
    fn read(&self, _: PropertiesRef, _: PropertyKey) -> PropertyValue {
        PropertyValue::Missing
    }
}

/// Property store held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProperties {
    records: Vec<BTreeMap<PropertyKey, PropertyValue>>,
}

impl InMemoryProperties {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the properties of one record and return its reference
    pub fn push(&mut self, values: impl IntoIterator<Item = (PropertyKey, PropertyValue)>) -> PropertiesRef {
        self.records.push(values.into_iter().collect());
        self.records.len() as u64 - 1
    }
}

impl PropertyReader for InMemoryProperties {
    fn read(&self, properties_ref: PropertiesRef, key: PropertyKey) -> PropertyValue {
        if properties_ref == NO_PROPERTIES {
            return PropertyValue::Missing;
        }
        usize::try_from(properties_ref)
            .ok()
            .and_then(|index| self.records.get(index))
            .and_then(|values| values.get(&key))
            .cloned()
            .unwrap_or(PropertyValue::Missing)
    }
}

fn conversion_error(key: PropertyKey, value: &PropertyValue, expected: ValueType) -> CsrError {
    CsrError::Conversion {
        key,
        value: value.to_string(),
        expected: expected.name(),
    }
}

/// Convert `value` to `f64`, substituting `default` when missing
///
/// # Errors
///
/// Returns [`CsrError::Conversion`] for text values and for longs that `f64`
/// cannot represent exactly.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn to_double(key: PropertyKey, value: &PropertyValue, default: f64) -> Result<f64> {
    match value {
        PropertyValue::Missing => Ok(default),
        PropertyValue::Double(v) => Ok(*v),
        // i64::MAX rounds up to 2^63, which saturates back to i64::MAX
        PropertyValue::Long(v) if *v != i64::MAX && (*v as f64) as i64 == *v => Ok(*v as f64),
        _ => Err(conversion_error(key, value, ValueType::Double)),
    }
}

/// Convert `value` to `i64`, substituting `default` when missing
///
/// # Errors
///
/// Returns [`CsrError::Conversion`] for text values and for doubles with a
/// fractional part or outside the `i64` range.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn to_long(key: PropertyKey, value: &PropertyValue, default: i64) -> Result<i64> {
    match value {
        PropertyValue::Missing => Ok(default),
        PropertyValue::Long(v) => Ok(*v),
        PropertyValue::Double(v)
            if v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64 =>
        {
            Ok(*v as i64)
        }
        _ => Err(conversion_error(key, value, ValueType::Long)),
    }
}

/// Read and convert one relationship property into its stored word
///
/// # Errors
///
/// Returns [`CsrError::Conversion`] if the value does not fit `value_type`
/// or does not survive the round trip through the stored `f64`.
#[allow(clippy::cast_precision_loss)]
pub fn read_word(
    reader: &dyn PropertyReader,
    properties_ref: PropertiesRef,
    key: PropertyKey,
    value_type: ValueType,
    default: f64,
) -> Result<u64> {
    let value = reader.read(properties_ref, key);
    let converted = match value_type {
        ValueType::Double => to_double(key, &value, default)?,
        // validated as integral, then stored like every other channel
        ValueType::Long => {
            let long = to_long(key, &value, default as i64)?;
            to_double(key, &PropertyValue::Long(long), default)
                .map_err(|_| conversion_error(key, &value, ValueType::Double))?
        }
    };
    Ok(converted.to_bits())
}
