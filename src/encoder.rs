//! Payload encoding
//!
//! Turns a [`Payload`] and everything it contains into the tagged wire
//! representation. Slot selection is driven by the declared [`DataType`], not
//! by the value variant: several logical types share one physical slot (see
//! the decoder for the reverse mapping). Out-of-range integers are truncated
//! modularly, matching the wire library this format interoperates with.

use crate::datatype::DataType;
use crate::error::EncodeError;
use crate::value::{
    DataSet, MetaData, Metric, Parameter, Payload, PropertySet, PropertySetList, PropertyValue,
    TypedValue,
};
use crate::wire::{fields, WireWriter};

/// Encode a full payload to wire bytes.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, EncodeError> {
    let mut writer = WireWriter::new();
    if let Some(timestamp) = payload.timestamp {
        writer.varint(fields::payload::TIMESTAMP, timestamp);
    }
    if let Some(metrics) = &payload.metrics {
        for metric in metrics {
            writer.record(fields::payload::METRICS, encode_metric(metric)?);
        }
    }
    if let Some(seq) = payload.seq {
        writer.varint(fields::payload::SEQ, seq);
    }
    if let Some(uuid) = &payload.uuid {
        writer.string(fields::payload::UUID, uuid);
    }
    if let Some(body) = &payload.body {
        writer.bytes(fields::payload::BODY, body);
    }
    Ok(writer.into_bytes())
}

/// Which one-of slot each field number maps to for a given record kind.
///
/// `None` marks a slot the record kind does not carry: the property slots are
/// silently skipped (only `PropertyValue` records have them), every other
/// missing slot is an encode error.
struct ValueFields {
    int: u32,
    long: u32,
    float: u32,
    double: u32,
    boolean: u32,
    string: u32,
    bytes: Option<u32>,
    dataset: Option<u32>,
    template: Option<u32>,
    propertyset: Option<u32>,
    propertysets: Option<u32>,
}

const METRIC_VALUE_FIELDS: ValueFields = ValueFields {
    int: fields::metric::INT_VALUE,
    long: fields::metric::LONG_VALUE,
    float: fields::metric::FLOAT_VALUE,
    double: fields::metric::DOUBLE_VALUE,
    boolean: fields::metric::BOOLEAN_VALUE,
    string: fields::metric::STRING_VALUE,
    bytes: Some(fields::metric::BYTES_VALUE),
    dataset: Some(fields::metric::DATASET_VALUE),
    template: Some(fields::metric::TEMPLATE_VALUE),
    propertyset: None,
    propertysets: None,
};

const PROPERTY_VALUE_FIELDS: ValueFields = ValueFields {
    int: fields::property_value::INT_VALUE,
    long: fields::property_value::LONG_VALUE,
    float: fields::property_value::FLOAT_VALUE,
    double: fields::property_value::DOUBLE_VALUE,
    boolean: fields::property_value::BOOLEAN_VALUE,
    string: fields::property_value::STRING_VALUE,
    bytes: None,
    dataset: None,
    template: None,
    propertyset: Some(fields::property_value::PROPERTYSET_VALUE),
    propertysets: Some(fields::property_value::PROPERTYSETS_VALUE),
};

const PARAMETER_VALUE_FIELDS: ValueFields = ValueFields {
    int: fields::parameter::INT_VALUE,
    long: fields::parameter::LONG_VALUE,
    float: fields::parameter::FLOAT_VALUE,
    double: fields::parameter::DOUBLE_VALUE,
    boolean: fields::parameter::BOOLEAN_VALUE,
    string: fields::parameter::STRING_VALUE,
    bytes: None,
    dataset: None,
    template: None,
    propertyset: None,
    propertysets: None,
};

const DATASET_VALUE_FIELDS: ValueFields = ValueFields {
    int: fields::dataset_value::INT_VALUE,
    long: fields::dataset_value::LONG_VALUE,
    float: fields::dataset_value::FLOAT_VALUE,
    double: fields::dataset_value::DOUBLE_VALUE,
    boolean: fields::dataset_value::BOOLEAN_VALUE,
    string: fields::dataset_value::STRING_VALUE,
    bytes: None,
    dataset: None,
    template: None,
    propertyset: None,
    propertysets: None,
};

fn incompatible(datatype: DataType, reason: &'static str) -> EncodeError {
    EncodeError::IncompatibleValue {
        datatype: datatype.name(),
        reason,
    }
}

/// Coerce an integer-family value into the 32-bit slot, modularly.
fn int_slot(datatype: DataType, value: &TypedValue) -> Result<u32, EncodeError> {
    match value {
        TypedValue::Int(v) => Ok(*v as u32),
        TypedValue::UInt(v) => Ok(*v),
        TypedValue::Long(v) => Ok(*v as u32),
        TypedValue::ULong(v) => Ok(*v as u32),
        _ => Err(incompatible(datatype, "expected an integer value")),
    }
}

/// Coerce an integer-family value into the 64-bit slot. Signed values are
/// sign-extended before the modular reinterpretation, so `-1` becomes the
/// all-ones 64-bit pattern regardless of source width.
fn long_slot(datatype: DataType, value: &TypedValue) -> Result<u64, EncodeError> {
    match value {
        TypedValue::Int(v) => Ok(i64::from(*v) as u64),
        TypedValue::UInt(v) => Ok(u64::from(*v)),
        TypedValue::Long(v) => Ok(*v as u64),
        TypedValue::ULong(v) => Ok(*v),
        _ => Err(incompatible(datatype, "expected an integer value")),
    }
}

fn float_slot(datatype: DataType, value: &TypedValue) -> Result<f32, EncodeError> {
    match value {
        TypedValue::Float(v) => Ok(*v),
        TypedValue::Double(v) => Ok(*v as f32),
        TypedValue::Int(v) => Ok(*v as f32),
        TypedValue::UInt(v) => Ok(*v as f32),
        TypedValue::Long(v) => Ok(*v as f32),
        TypedValue::ULong(v) => Ok(*v as f32),
        _ => Err(incompatible(datatype, "expected a numeric value")),
    }
}

fn double_slot(datatype: DataType, value: &TypedValue) -> Result<f64, EncodeError> {
    match value {
        TypedValue::Double(v) => Ok(*v),
        TypedValue::Float(v) => Ok(f64::from(*v)),
        TypedValue::Int(v) => Ok(f64::from(*v)),
        TypedValue::UInt(v) => Ok(f64::from(*v)),
        TypedValue::Long(v) => Ok(*v as f64),
        TypedValue::ULong(v) => Ok(*v as f64),
        _ => Err(incompatible(datatype, "expected a numeric value")),
    }
}

/// Write one typed value into the slot the declared type dictates.
///
/// Null values are handled by the caller (the `is_null` flag); an unknown
/// declared type writes no slot at all.
fn encode_value(
    writer: &mut WireWriter,
    slots: &ValueFields,
    datatype: DataType,
    value: &TypedValue,
) -> Result<(), EncodeError> {
    match datatype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::UInt8
        | DataType::UInt16 => {
            writer.varint(slots.int, u64::from(int_slot(datatype, value)?));
        }
        DataType::Int64 | DataType::UInt32 | DataType::UInt64 | DataType::DateTime => {
            writer.varint(slots.long, long_slot(datatype, value)?);
        }
        DataType::Float => writer.fixed32(slots.float, float_slot(datatype, value)?),
        DataType::Double => writer.fixed64(slots.double, double_slot(datatype, value)?),
        DataType::Boolean => match value {
            TypedValue::Boolean(v) => writer.boolean(slots.boolean, *v),
            _ => return Err(incompatible(datatype, "expected a boolean value")),
        },
        DataType::String | DataType::Text | DataType::Uuid => match value {
            TypedValue::String(v) => writer.string(slots.string, v),
            _ => return Err(incompatible(datatype, "expected a string value")),
        },
        DataType::Bytes | DataType::File => {
            let field = slots
                .bytes
                .ok_or_else(|| incompatible(datatype, "record has no bytes slot"))?;
            match value {
                TypedValue::Bytes(v) => writer.bytes(field, v),
                _ => return Err(incompatible(datatype, "expected a bytes value")),
            }
        }
        DataType::DataSet => {
            let field = slots
                .dataset
                .ok_or_else(|| incompatible(datatype, "record has no dataset slot"))?;
            match value {
                TypedValue::DataSet(v) => writer.record(field, encode_dataset(v)?),
                _ => return Err(incompatible(datatype, "expected a dataset value")),
            }
        }
        DataType::Template => {
            let field = slots
                .template
                .ok_or_else(|| incompatible(datatype, "record has no template slot"))?;
            match value {
                TypedValue::Template(v) => writer.record(field, encode_template(v)?),
                _ => return Err(incompatible(datatype, "expected a template value")),
            }
        }
        // Property-set slots only exist on PropertyValue records; elsewhere
        // the value is simply not carried, mirroring the wire library.
        DataType::PropertySet => {
            if let (Some(field), TypedValue::PropertySet(v)) = (slots.propertyset, value) {
                writer.record(field, encode_property_set(v)?);
            }
        }
        DataType::PropertySetList => {
            if let (Some(field), TypedValue::PropertySetList(v)) = (slots.propertysets, value) {
                writer.record(field, encode_property_set_list(v)?);
            }
        }
    }
    Ok(())
}

fn encode_metric(metric: &Metric) -> Result<WireWriter, EncodeError> {
    let mut writer = WireWriter::new();
    if let Some(name) = &metric.name {
        writer.string(fields::metric::NAME, name);
    }
    if let Some(alias) = metric.alias {
        writer.varint(fields::metric::ALIAS, alias);
    }
    if let Some(timestamp) = metric.timestamp {
        writer.varint(fields::metric::TIMESTAMP, timestamp);
    }
    if let Some(datatype) = metric.datatype {
        writer.varint(fields::metric::DATATYPE, u64::from(datatype.tag()));
    }
    if let Some(is_historical) = metric.is_historical {
        writer.boolean(fields::metric::IS_HISTORICAL, is_historical);
    }
    if let Some(is_transient) = metric.is_transient {
        writer.boolean(fields::metric::IS_TRANSIENT, is_transient);
    }
    // The explicit flag wins, but a null value also raises it on the wire.
    if metric.is_null.unwrap_or(false) || metric.value.is_null() {
        writer.boolean(fields::metric::IS_NULL, true);
    }
    if let Some(metadata) = &metric.metadata {
        writer.record(fields::metric::METADATA, encode_metadata(metadata));
    }
    if let Some(properties) = &metric.properties {
        writer.record(fields::metric::PROPERTIES, encode_property_set(properties)?);
    }
    if let Some(datatype) = metric.datatype {
        if !metric.value.is_null() {
            encode_value(&mut writer, &METRIC_VALUE_FIELDS, datatype, &metric.value)?;
        }
    }
    Ok(writer)
}

fn encode_property_value(value: &PropertyValue) -> Result<WireWriter, EncodeError> {
    let mut writer = WireWriter::new();
    if let Some(datatype) = value.datatype {
        writer.varint(fields::property_value::TYPE, u64::from(datatype.tag()));
    }
    if value.is_null || value.value.is_null() {
        writer.boolean(fields::property_value::IS_NULL, true);
    } else if let Some(datatype) = value.datatype {
        encode_value(&mut writer, &PROPERTY_VALUE_FIELDS, datatype, &value.value)?;
    }
    Ok(writer)
}

fn encode_property_set(set: &PropertySet) -> Result<WireWriter, EncodeError> {
    let mut writer = WireWriter::new();
    // Parallel arrays, index-aligned: all keys first, then all values.
    for (key, _) in set.iter() {
        writer.string(fields::property_set::KEYS, key);
    }
    for (_, value) in set.iter() {
        writer.record(fields::property_set::VALUES, encode_property_value(value)?);
    }
    Ok(writer)
}

fn encode_property_set_list(list: &PropertySetList) -> Result<WireWriter, EncodeError> {
    let mut writer = WireWriter::new();
    for set in list {
        writer.record(fields::property_set_list::PROPERTYSET, encode_property_set(set)?);
    }
    Ok(writer)
}

fn encode_dataset(dataset: &DataSet) -> Result<WireWriter, EncodeError> {
    let mut writer = WireWriter::new();
    writer.varint(fields::dataset::NUM_OF_COLUMNS, dataset.num_of_columns);
    for column in &dataset.columns {
        writer.string(fields::dataset::COLUMNS, column);
    }
    for datatype in &dataset.types {
        let tag = datatype.map(DataType::tag).unwrap_or(0);
        writer.varint(fields::dataset::TYPES, u64::from(tag));
    }
    for row in &dataset.rows {
        let mut row_writer = WireWriter::new();
        for (index, cell) in row.iter().enumerate() {
            let mut cell_writer = WireWriter::new();
            if let Some(Some(datatype)) = dataset.types.get(index) {
                if !cell.is_null() {
                    encode_value(&mut cell_writer, &DATASET_VALUE_FIELDS, *datatype, cell)?;
                }
            }
            row_writer.record(fields::row::ELEMENTS, cell_writer);
        }
        writer.record(fields::dataset::ROWS, row_writer);
    }
    Ok(writer)
}

fn encode_template(template: &crate::value::Template) -> Result<WireWriter, EncodeError> {
    let mut writer = WireWriter::new();
    if let Some(version) = &template.version {
        writer.string(fields::template::VERSION, version);
    }
    if let Some(metrics) = &template.metrics {
        for metric in metrics {
            writer.record(fields::template::METRICS, encode_metric(metric)?);
        }
    }
    if let Some(parameters) = &template.parameters {
        for parameter in parameters {
            writer.record(fields::template::PARAMETERS, encode_parameter(parameter)?);
        }
    }
    if let Some(template_ref) = &template.template_ref {
        writer.string(fields::template::TEMPLATE_REF, template_ref);
    }
    if let Some(is_definition) = template.is_definition {
        writer.boolean(fields::template::IS_DEFINITION, is_definition);
    }
    Ok(writer)
}

fn encode_parameter(parameter: &Parameter) -> Result<WireWriter, EncodeError> {
    let mut writer = WireWriter::new();
    if let Some(name) = &parameter.name {
        writer.string(fields::parameter::NAME, name);
    }
    if let Some(datatype) = parameter.datatype {
        writer.varint(fields::parameter::TYPE, u64::from(datatype.tag()));
        if !parameter.value.is_null() {
            encode_value(&mut writer, &PARAMETER_VALUE_FIELDS, datatype, &parameter.value)?;
        }
    }
    Ok(writer)
}

fn encode_metadata(metadata: &MetaData) -> WireWriter {
    let mut writer = WireWriter::new();
    if let Some(is_multi_part) = metadata.is_multi_part {
        writer.boolean(fields::metadata::IS_MULTI_PART, is_multi_part);
    }
    if let Some(content_type) = &metadata.content_type {
        writer.string(fields::metadata::CONTENT_TYPE, content_type);
    }
    if let Some(size) = metadata.size {
        writer.varint(fields::metadata::SIZE, size);
    }
    if let Some(seq) = metadata.seq {
        writer.varint(fields::metadata::SEQ, seq);
    }
    if let Some(file_name) = &metadata.file_name {
        writer.string(fields::metadata::FILE_NAME, file_name);
    }
    if let Some(file_type) = &metadata.file_type {
        writer.string(fields::metadata::FILE_TYPE, file_type);
    }
    if let Some(md5) = &metadata.md5 {
        writer.string(fields::metadata::MD5, md5);
    }
    if let Some(description) = &metadata.description {
        writer.string(fields::metadata::DESCRIPTION, description);
    }
    writer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_minimal_payload() {
        let payload = Payload {
            timestamp: Some(5),
            ..Default::default()
        };
        // field 1 varint, value 5
        assert_eq!(encode_payload(&payload).unwrap(), vec![0x08, 0x05]);
    }

    #[test]
    fn test_encode_empty_payload_is_empty() {
        assert!(encode_payload(&Payload::default()).unwrap().is_empty());
    }

    #[test]
    fn test_int_slot_truncates_modularly() {
        assert_eq!(int_slot(DataType::Int8, &TypedValue::Long(0x1_0000_0001)).unwrap(), 1);
        assert_eq!(int_slot(DataType::Int8, &TypedValue::Int(-1)).unwrap(), u32::MAX);
    }

    #[test]
    fn test_long_slot_sign_extends() {
        assert_eq!(long_slot(DataType::Int64, &TypedValue::Int(-1)).unwrap(), u64::MAX);
        assert_eq!(
            long_slot(DataType::UInt32, &TypedValue::ULong(4294967295)).unwrap(),
            4294967295
        );
    }

    #[test]
    fn test_null_metric_sets_flag_and_no_slot() {
        let metric = Metric::new("m", DataType::Int32, TypedValue::Null);
        let payload = Payload {
            metrics: Some(vec![metric]),
            ..Default::default()
        };
        let bytes = encode_payload(&payload).unwrap();
        // Metric record: name "m" (field 1), datatype 3 (field 4), is_null
        // (field 7); no value slot.
        let expected_metric = [
            0x0a, 0x01, b'm', // name
            0x20, 0x03, // datatype
            0x38, 0x01, // is_null
        ];
        assert_eq!(bytes[0], 0x12); // payload field 2, length-delimited
        assert_eq!(bytes[1] as usize, expected_metric.len());
        assert_eq!(&bytes[2..], &expected_metric);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let metric = Metric::new("m", DataType::Boolean, TypedValue::Int(1));
        let payload = Payload {
            metrics: Some(vec![metric]),
            ..Default::default()
        };
        assert!(matches!(
            encode_payload(&payload),
            Err(EncodeError::IncompatibleValue { .. })
        ));
    }

    #[test]
    fn test_metric_propertyset_value_writes_no_slot() {
        // Metric records have no property-set slot; the value is dropped
        // rather than rejected.
        let metric = Metric::new(
            "m",
            DataType::PropertySet,
            TypedValue::PropertySet(PropertySet::new()),
        );
        let bytes = encode_payload(&Payload {
            metrics: Some(vec![metric]),
            ..Default::default()
        })
        .unwrap();
        let expected_metric = [
            0x0a, 0x01, b'm', // name
            0x20, 0x14, // datatype 20
        ];
        assert_eq!(&bytes[2..], &expected_metric);
    }
}
