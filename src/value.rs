//! Payload data model
//!
//! In-memory representation of everything the payload envelope can carry:
//! typed values, metrics, property sets, datasets, and templates. The shapes
//! mirror the wire format's one-of slots, so an ambiguous wire record always
//! resolves to exactly one variant here.

use crate::datatype::DataType;

/// A single typed value.
///
/// Variants are shaped after the wire slots rather than the declared types:
/// `Int8`/`Int16`/`Int32` all land in [`TypedValue::Int`], `UInt8`/`UInt16` in
/// [`TypedValue::UInt`], and `Int64`/`UInt32`/`UInt64`/`DateTime` in the
/// 64-bit slots. The declared [`DataType`] is carried by the enclosing record
/// ([`Metric`], [`PropertyValue`], ...) and decides how a slot is read back.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Signed 32-bit slot (Int8, Int16, Int32, and narrowed UInt32)
    Int(i32),
    /// Unsigned small-integer slot (UInt8, UInt16)
    UInt(u32),
    /// Signed 64-bit slot (Int64)
    Long(i64),
    /// Unsigned 64-bit slot (UInt64, DateTime, wide UInt32)
    ULong(u64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    DataSet(DataSet),
    Template(Box<Template>),
    PropertySet(PropertySet),
    PropertySetList(PropertySetList),
    Null,
}

impl TypedValue {
    /// Whether this is the explicit null value.
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }
}

/// One metric inside a payload.
///
/// Every field other than `value` mirrors wire presence with an `Option`, so
/// the state engine's shallow merge can tell "field not sent" apart from a
/// field explicitly set by the publisher.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metric {
    /// Metric name; required for the metric to be merged into a metric-set
    pub name: Option<String>,
    /// Numeric shorthand some publishers use in place of the name
    pub alias: Option<u64>,
    /// Sample timestamp, epoch milliseconds
    pub timestamp: Option<u64>,
    /// Declared type; `None` when the wire tag was unknown
    pub datatype: Option<DataType>,
    pub is_historical: Option<bool>,
    pub is_transient: Option<bool>,
    /// Explicit wire-level null flag; checked before the value slot
    pub is_null: Option<bool>,
    pub metadata: Option<MetaData>,
    pub properties: Option<PropertySet>,
    pub value: TypedValue,
}

impl Metric {
    /// Convenience constructor for a named metric with a declared type.
    pub fn new(name: impl Into<String>, datatype: DataType, value: TypedValue) -> Self {
        Metric {
            name: Some(name.into()),
            datatype: Some(datatype),
            value,
            ..Default::default()
        }
    }
}

impl Default for TypedValue {
    fn default() -> Self {
        TypedValue::Null
    }
}

/// A property value: a typed value plus an explicit null flag.
///
/// The flag makes "present but null" representable, which plain absence from
/// the property set cannot express.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    /// Declared type; `None` when the wire tag was unknown
    pub datatype: Option<DataType>,
    pub is_null: bool,
    pub value: TypedValue,
}

impl PropertyValue {
    pub fn new(datatype: DataType, value: TypedValue) -> Self {
        PropertyValue {
            datatype: Some(datatype),
            is_null: value.is_null(),
            value,
        }
    }

    /// A present-but-null property of the given declared type.
    pub fn null(datatype: DataType) -> Self {
        PropertyValue {
            datatype: Some(datatype),
            is_null: true,
            value: TypedValue::Null,
        }
    }
}

/// An ordered name → [`PropertyValue`] mapping.
///
/// Insertion order is preserved because the wire format is a pair of
/// index-aligned `keys`/`values` arrays, and merge order is defined to follow
/// the incoming set's key order. Values of type `PropertySet` nest
/// recursively to arbitrary depth.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertySet {
    entries: Vec<(String, PropertyValue)>,
}

impl PropertySet {
    pub fn new() -> Self {
        PropertySet::default()
    }

    /// Insert or overwrite the value at `key`, preserving the position of an
    /// existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, PropertyValue)> for PropertySet {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        let mut set = PropertySet::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

/// An ordered list of property sets.
pub type PropertySetList = Vec<PropertySet>;

/// A tabular dataset: named, typed columns and fixed-width rows of scalars.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    pub num_of_columns: u64,
    pub columns: Vec<String>,
    /// Declared per-column types; `None` for unknown wire tags
    pub types: Vec<Option<DataType>>,
    /// Each row is a tuple of scalar values matching the column types
    pub rows: Vec<Vec<TypedValue>>,
}

/// A reusable template: a bundle of metrics plus instantiation parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub version: Option<String>,
    pub metrics: Option<Vec<Metric>>,
    pub parameters: Option<Vec<Parameter>>,
    /// Name of the template definition this instance refers to
    pub template_ref: Option<String>,
    /// True for the definition itself, false (or unset) for instances
    pub is_definition: Option<bool>,
}

/// One template parameter: a named scalar value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Option<String>,
    pub datatype: Option<DataType>,
    pub value: TypedValue,
}

/// Descriptive metadata attached to a metric, typically for file transfers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaData {
    pub is_multi_part: Option<bool>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub seq: Option<u64>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub md5: Option<String>,
    pub description: Option<String>,
}

/// A full message payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    /// Payload timestamp, epoch milliseconds
    pub timestamp: Option<u64>,
    pub metrics: Option<Vec<Metric>>,
    /// Monotonic sequence number; carried, not validated
    pub seq: Option<u64>,
    pub uuid: Option<String>,
    /// Opaque application body
    pub body: Option<Vec<u8>>,
}
