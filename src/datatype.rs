//! Type registry
//!
//! Maps between the compact numeric type tags used on the wire (1-21) and
//! the semantic [`DataType`] used programmatically. Pure and stateless; every
//! other module dispatches on this enum rather than on raw tags.

/// Declared type of a metric, property, parameter, or dataset column.
///
/// The discriminants are the wire tags. Tags outside 1-21 are unknown and are
/// represented as `None` wherever a `DataType` is optional; unknown tags decode
/// to a null value rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataType {
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Boolean = 11,
    String = 12,
    DateTime = 13,
    Text = 14,
    Uuid = 15,
    DataSet = 16,
    Bytes = 17,
    File = 18,
    Template = 19,
    PropertySet = 20,
    PropertySetList = 21,
}

impl DataType {
    /// Resolve a wire tag to its semantic type. Unknown tags yield `None`.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(DataType::Int8),
            2 => Some(DataType::Int16),
            3 => Some(DataType::Int32),
            4 => Some(DataType::Int64),
            5 => Some(DataType::UInt8),
            6 => Some(DataType::UInt16),
            7 => Some(DataType::UInt32),
            8 => Some(DataType::UInt64),
            9 => Some(DataType::Float),
            10 => Some(DataType::Double),
            11 => Some(DataType::Boolean),
            12 => Some(DataType::String),
            13 => Some(DataType::DateTime),
            14 => Some(DataType::Text),
            15 => Some(DataType::Uuid),
            16 => Some(DataType::DataSet),
            17 => Some(DataType::Bytes),
            18 => Some(DataType::File),
            19 => Some(DataType::Template),
            20 => Some(DataType::PropertySet),
            21 => Some(DataType::PropertySetList),
            _ => None,
        }
    }

    /// The numeric wire tag for this type.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Human-readable type name, as used by host tooling.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Int8 => "Int8",
            DataType::Int16 => "Int16",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::UInt8 => "UInt8",
            DataType::UInt16 => "UInt16",
            DataType::UInt32 => "UInt32",
            DataType::UInt64 => "UInt64",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::Boolean => "Boolean",
            DataType::String => "String",
            DataType::DateTime => "DateTime",
            DataType::Text => "Text",
            DataType::Uuid => "UUID",
            DataType::DataSet => "DataSet",
            DataType::Bytes => "Bytes",
            DataType::File => "File",
            DataType::Template => "Template",
            DataType::PropertySet => "PropertySet",
            DataType::PropertySetList => "PropertySetList",
        }
    }

    /// Parse a type name, case-insensitively.
    ///
    /// Accepts the `Int` and `Long` shorthands for `Int32` and `Int64`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INT8" => Some(DataType::Int8),
            "INT16" => Some(DataType::Int16),
            "INT32" | "INT" => Some(DataType::Int32),
            "INT64" | "LONG" => Some(DataType::Int64),
            "UINT8" => Some(DataType::UInt8),
            "UINT16" => Some(DataType::UInt16),
            "UINT32" => Some(DataType::UInt32),
            "UINT64" => Some(DataType::UInt64),
            "FLOAT" => Some(DataType::Float),
            "DOUBLE" => Some(DataType::Double),
            "BOOLEAN" => Some(DataType::Boolean),
            "STRING" => Some(DataType::String),
            "DATETIME" => Some(DataType::DateTime),
            "TEXT" => Some(DataType::Text),
            "UUID" => Some(DataType::Uuid),
            "DATASET" => Some(DataType::DataSet),
            "BYTES" => Some(DataType::Bytes),
            "FILE" => Some(DataType::File),
            "TEMPLATE" => Some(DataType::Template),
            "PROPERTYSET" => Some(DataType::PropertySet),
            "PROPERTYSETLIST" => Some(DataType::PropertySetList),
            _ => None,
        }
    }

    /// Whether values of this type are valid DataSet cells / Template
    /// parameters: scalar numerics, booleans, and the string family.
    pub fn is_scalar_cell(self) -> bool {
        !matches!(
            self,
            DataType::DataSet
                | DataType::Bytes
                | DataType::File
                | DataType::Template
                | DataType::PropertySet
                | DataType::PropertySetList
        )
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
