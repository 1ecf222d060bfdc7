//! Payload decoding
//!
//! Turns wire bytes back into a [`Payload`]. Dispatch is by the record's
//! declared type tag, not by which slot happens to be present: several
//! logical types share a physical slot, and the declared tag decides how the
//! slot is reinterpreted.
//!
//! Narrowing rules, preserved exactly for interoperability with existing
//! publishers:
//! - `Int8`/`Int16`/`Int32` reinterpret the 32-bit slot as signed.
//! - `Int64` reinterprets the 64-bit slot as signed.
//! - `UInt32` narrows the 64-bit slot through a modular 32-bit reduction and
//!   returns it *signed*: the max value `4294967295` decodes as `-1`.
//!
//! Unknown type tags on metrics and properties decode to null, never an
//! error. DataSet cells and Template parameters use a restricted getter that
//! rejects composite and byte-valued tags.

use crate::datatype::DataType;
use crate::error::DecodeError;
use crate::value::{
    DataSet, MetaData, Metric, Parameter, Payload, PropertySet, PropertySetList, PropertyValue,
    Template, TypedValue,
};
use crate::wire::{fields, WireReader, WIRE_LEN, WIRE_VARINT};

/// Decode a full payload from wire bytes.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut payload = Payload::default();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::payload::TIMESTAMP => payload.timestamp = Some(reader.varint()?),
            fields::payload::METRICS => {
                let metric = decode_metric(reader.bytes()?)?;
                payload.metrics.get_or_insert_with(Vec::new).push(metric);
            }
            fields::payload::SEQ => payload.seq = Some(reader.varint()?),
            fields::payload::UUID => payload.uuid = Some(reader.string()?),
            fields::payload::BODY => payload.body = Some(reader.bytes()?.to_vec()),
            _ => reader.skip(key)?,
        }
    }
    Ok(payload)
}

/// The raw one-of slots of a value-carrying record, collected before the
/// declared tag is applied.
#[derive(Debug, Default)]
struct Slots {
    int: Option<u32>,
    long: Option<u64>,
    float: Option<f32>,
    double: Option<f64>,
    boolean: Option<bool>,
    string: Option<String>,
    bytes: Option<Vec<u8>>,
    dataset: Option<DataSet>,
    template: Option<Template>,
    propertyset: Option<PropertySet>,
    propertysets: Option<PropertySetList>,
}

/// Interpret the collected slots under the declared tag.
///
/// Missing scalar slots read as the slot's zero value; missing composite
/// slots and unknown tags read as null.
fn value_from_slots(datatype: Option<DataType>, slots: Slots) -> TypedValue {
    let Some(datatype) = datatype else {
        return TypedValue::Null;
    };
    match datatype {
        DataType::Int8 | DataType::Int16 | DataType::Int32 => {
            TypedValue::Int(slots.int.unwrap_or(0) as i32)
        }
        DataType::UInt8 | DataType::UInt16 => TypedValue::UInt(slots.int.unwrap_or(0)),
        DataType::Int64 => TypedValue::Long(slots.long.unwrap_or(0) as i64),
        // The pinned narrowing rule: modular reduction to 32 bits, read back
        // signed. 4294967295 comes out as -1.
        DataType::UInt32 => TypedValue::Int(slots.long.unwrap_or(0) as u32 as i32),
        DataType::UInt64 | DataType::DateTime => TypedValue::ULong(slots.long.unwrap_or(0)),
        DataType::Float => TypedValue::Float(slots.float.unwrap_or(0.0)),
        DataType::Double => TypedValue::Double(slots.double.unwrap_or(0.0)),
        DataType::Boolean => TypedValue::Boolean(slots.boolean.unwrap_or(false)),
        DataType::String | DataType::Text | DataType::Uuid => {
            TypedValue::String(slots.string.unwrap_or_default())
        }
        DataType::Bytes | DataType::File => TypedValue::Bytes(slots.bytes.unwrap_or_default()),
        DataType::DataSet => slots
            .dataset
            .map(TypedValue::DataSet)
            .unwrap_or(TypedValue::Null),
        DataType::Template => slots
            .template
            .map(|t| TypedValue::Template(Box::new(t)))
            .unwrap_or(TypedValue::Null),
        DataType::PropertySet => slots
            .propertyset
            .map(TypedValue::PropertySet)
            .unwrap_or(TypedValue::Null),
        DataType::PropertySetList => slots
            .propertysets
            .map(TypedValue::PropertySetList)
            .unwrap_or(TypedValue::Null),
    }
}

/// Restricted getter for DataSet cells and Template parameters.
///
/// Only scalar numerics, booleans, and the string family are valid; any other
/// tag, an unknown tag, or a missing value slot is a decode error carrying
/// the offending tag.
fn cell_from_slots(tag: u32, slots: Slots) -> Result<TypedValue, DecodeError> {
    let datatype = DataType::from_tag(tag).filter(|dt| dt.is_scalar_cell());
    let Some(datatype) = datatype else {
        return Err(DecodeError::InvalidCellValue { tag });
    };
    let missing = match datatype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::UInt8
        | DataType::UInt16 => slots.int.is_none(),
        DataType::Int64 | DataType::UInt32 | DataType::UInt64 | DataType::DateTime => {
            slots.long.is_none()
        }
        DataType::Float => slots.float.is_none(),
        DataType::Double => slots.double.is_none(),
        DataType::Boolean => slots.boolean.is_none(),
        DataType::String | DataType::Text | DataType::Uuid => slots.string.is_none(),
        _ => true,
    };
    if missing {
        return Err(DecodeError::InvalidCellValue { tag });
    }
    Ok(value_from_slots(Some(datatype), slots))
}

fn decode_metric(bytes: &[u8]) -> Result<Metric, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut metric = Metric::default();
    let mut raw_datatype: Option<u32> = None;
    let mut slots = Slots::default();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::metric::NAME => metric.name = Some(reader.string()?),
            fields::metric::ALIAS => metric.alias = Some(reader.varint()?),
            fields::metric::TIMESTAMP => metric.timestamp = Some(reader.varint()?),
            fields::metric::DATATYPE => raw_datatype = Some(reader.varint()? as u32),
            fields::metric::IS_HISTORICAL => metric.is_historical = Some(reader.varint()? != 0),
            fields::metric::IS_TRANSIENT => metric.is_transient = Some(reader.varint()? != 0),
            fields::metric::IS_NULL => metric.is_null = Some(reader.varint()? != 0),
            fields::metric::METADATA => metric.metadata = Some(decode_metadata(reader.bytes()?)?),
            fields::metric::PROPERTIES => {
                metric.properties = Some(decode_property_set(reader.bytes()?)?)
            }
            fields::metric::INT_VALUE => slots.int = Some(reader.varint()? as u32),
            fields::metric::LONG_VALUE => slots.long = Some(reader.varint()?),
            fields::metric::FLOAT_VALUE => slots.float = Some(reader.fixed32()?),
            fields::metric::DOUBLE_VALUE => slots.double = Some(reader.fixed64()?),
            fields::metric::BOOLEAN_VALUE => slots.boolean = Some(reader.varint()? != 0),
            fields::metric::STRING_VALUE => slots.string = Some(reader.string()?),
            fields::metric::BYTES_VALUE => slots.bytes = Some(reader.bytes()?.to_vec()),
            fields::metric::DATASET_VALUE => slots.dataset = Some(decode_dataset(reader.bytes()?)?),
            fields::metric::TEMPLATE_VALUE => {
                slots.template = Some(decode_template(reader.bytes()?)?)
            }
            _ => reader.skip(key)?,
        }
    }
    metric.datatype = raw_datatype.and_then(DataType::from_tag);
    // The null flag wins over whatever the slot holds.
    metric.value = if metric.is_null == Some(true) {
        TypedValue::Null
    } else {
        value_from_slots(metric.datatype, slots)
    };
    Ok(metric)
}

fn decode_property_value(bytes: &[u8]) -> Result<PropertyValue, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut raw_datatype: Option<u32> = None;
    let mut is_null = false;
    let mut slots = Slots::default();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::property_value::TYPE => raw_datatype = Some(reader.varint()? as u32),
            fields::property_value::IS_NULL => is_null = reader.varint()? != 0,
            fields::property_value::INT_VALUE => slots.int = Some(reader.varint()? as u32),
            fields::property_value::LONG_VALUE => slots.long = Some(reader.varint()?),
            fields::property_value::FLOAT_VALUE => slots.float = Some(reader.fixed32()?),
            fields::property_value::DOUBLE_VALUE => slots.double = Some(reader.fixed64()?),
            fields::property_value::BOOLEAN_VALUE => slots.boolean = Some(reader.varint()? != 0),
            fields::property_value::STRING_VALUE => slots.string = Some(reader.string()?),
            fields::property_value::PROPERTYSET_VALUE => {
                slots.propertyset = Some(decode_property_set(reader.bytes()?)?)
            }
            fields::property_value::PROPERTYSETS_VALUE => {
                slots.propertysets = Some(decode_property_set_list(reader.bytes()?)?)
            }
            _ => reader.skip(key)?,
        }
    }
    let datatype = raw_datatype.and_then(DataType::from_tag);
    let value = if is_null {
        TypedValue::Null
    } else {
        value_from_slots(datatype, slots)
    };
    Ok(PropertyValue {
        datatype,
        is_null,
        value,
    })
}

fn decode_property_set(bytes: &[u8]) -> Result<PropertySet, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut keys = Vec::new();
    let mut values = Vec::new();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::property_set::KEYS => keys.push(reader.string()?),
            fields::property_set::VALUES => values.push(decode_property_value(reader.bytes()?)?),
            _ => reader.skip(key)?,
        }
    }
    // Parallel arrays, zipped by index; a publisher that sends mismatched
    // counts loses the tail.
    Ok(keys.into_iter().zip(values).collect())
}

fn decode_property_set_list(bytes: &[u8]) -> Result<PropertySetList, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut sets = Vec::new();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::property_set_list::PROPERTYSET => {
                sets.push(decode_property_set(reader.bytes()?)?)
            }
            _ => reader.skip(key)?,
        }
    }
    Ok(sets)
}

fn decode_dataset(bytes: &[u8]) -> Result<DataSet, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut dataset = DataSet::default();
    let mut raw_types: Vec<u32> = Vec::new();
    let mut raw_rows: Vec<Vec<Slots>> = Vec::new();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::dataset::NUM_OF_COLUMNS => dataset.num_of_columns = reader.varint()?,
            fields::dataset::COLUMNS => dataset.columns.push(reader.string()?),
            fields::dataset::TYPES => match key.wire_type {
                // Accept both packed and unpacked encodings of the repeated
                // type tags.
                WIRE_VARINT => raw_types.push(reader.varint()? as u32),
                WIRE_LEN => {
                    let mut packed = WireReader::new(reader.bytes()?);
                    while !packed.is_at_end() {
                        raw_types.push(packed.varint()? as u32);
                    }
                }
                _ => reader.skip(key)?,
            },
            fields::dataset::ROWS => raw_rows.push(decode_row(reader.bytes()?)?),
            _ => reader.skip(key)?,
        }
    }

    dataset.types = raw_types.iter().map(|&tag| DataType::from_tag(tag)).collect();

    let columns = dataset.num_of_columns as usize;
    for raw_row in raw_rows {
        if raw_row.len() != columns {
            return Err(DecodeError::ColumnCountMismatch {
                expected: columns,
                actual: raw_row.len(),
            });
        }
        let mut row = Vec::with_capacity(columns);
        for (index, cell) in raw_row.into_iter().enumerate() {
            let tag = raw_types.get(index).copied().unwrap_or(0);
            row.push(cell_from_slots(tag, cell)?);
        }
        dataset.rows.push(row);
    }
    Ok(dataset)
}

fn decode_row(bytes: &[u8]) -> Result<Vec<Slots>, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut elements = Vec::new();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::row::ELEMENTS => elements.push(decode_cell(reader.bytes()?)?),
            _ => reader.skip(key)?,
        }
    }
    Ok(elements)
}

fn decode_cell(bytes: &[u8]) -> Result<Slots, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut slots = Slots::default();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::dataset_value::INT_VALUE => slots.int = Some(reader.varint()? as u32),
            fields::dataset_value::LONG_VALUE => slots.long = Some(reader.varint()?),
            fields::dataset_value::FLOAT_VALUE => slots.float = Some(reader.fixed32()?),
            fields::dataset_value::DOUBLE_VALUE => slots.double = Some(reader.fixed64()?),
            fields::dataset_value::BOOLEAN_VALUE => slots.boolean = Some(reader.varint()? != 0),
            fields::dataset_value::STRING_VALUE => slots.string = Some(reader.string()?),
            _ => reader.skip(key)?,
        }
    }
    Ok(slots)
}

fn decode_template(bytes: &[u8]) -> Result<Template, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut template = Template::default();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::template::VERSION => template.version = Some(reader.string()?),
            fields::template::METRICS => {
                let metric = decode_metric(reader.bytes()?)?;
                template.metrics.get_or_insert_with(Vec::new).push(metric);
            }
            fields::template::PARAMETERS => {
                let parameter = decode_parameter(reader.bytes()?)?;
                template
                    .parameters
                    .get_or_insert_with(Vec::new)
                    .push(parameter);
            }
            fields::template::TEMPLATE_REF => template.template_ref = Some(reader.string()?),
            fields::template::IS_DEFINITION => template.is_definition = Some(reader.varint()? != 0),
            _ => reader.skip(key)?,
        }
    }
    Ok(template)
}

fn decode_parameter(bytes: &[u8]) -> Result<Parameter, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut name = None;
    let mut raw_datatype: u32 = 0;
    let mut slots = Slots::default();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::parameter::NAME => name = Some(reader.string()?),
            fields::parameter::TYPE => raw_datatype = reader.varint()? as u32,
            fields::parameter::INT_VALUE => slots.int = Some(reader.varint()? as u32),
            fields::parameter::LONG_VALUE => slots.long = Some(reader.varint()?),
            fields::parameter::FLOAT_VALUE => slots.float = Some(reader.fixed32()?),
            fields::parameter::DOUBLE_VALUE => slots.double = Some(reader.fixed64()?),
            fields::parameter::BOOLEAN_VALUE => slots.boolean = Some(reader.varint()? != 0),
            fields::parameter::STRING_VALUE => slots.string = Some(reader.string()?),
            _ => reader.skip(key)?,
        }
    }
    let value = cell_from_slots(raw_datatype, slots)?;
    Ok(Parameter {
        name,
        datatype: DataType::from_tag(raw_datatype),
        value,
    })
}

fn decode_metadata(bytes: &[u8]) -> Result<MetaData, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let mut metadata = MetaData::default();
    while let Some(key) = reader.next_key()? {
        match key.field {
            fields::metadata::IS_MULTI_PART => metadata.is_multi_part = Some(reader.varint()? != 0),
            fields::metadata::CONTENT_TYPE => metadata.content_type = Some(reader.string()?),
            fields::metadata::SIZE => metadata.size = Some(reader.varint()?),
            fields::metadata::SEQ => metadata.seq = Some(reader.varint()?),
            fields::metadata::FILE_NAME => metadata.file_name = Some(reader.string()?),
            fields::metadata::FILE_TYPE => metadata.file_type = Some(reader.string()?),
            fields::metadata::MD5 => metadata.md5 = Some(reader.string()?),
            fields::metadata::DESCRIPTION => metadata.description = Some(reader.string()?),
            _ => reader.skip(key)?,
        }
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_payload;
    use approx::assert_relative_eq;

    fn round_trip(metric: Metric) -> Metric {
        let payload = Payload {
            metrics: Some(vec![metric]),
            ..Default::default()
        };
        let bytes = encode_payload(&payload).unwrap();
        let decoded = decode_payload(&bytes).unwrap();
        decoded.metrics.unwrap().into_iter().next().unwrap()
    }

    #[test]
    fn test_round_trip_integers() {
        let cases = [
            (DataType::Int8, TypedValue::Int(-128), TypedValue::Int(-128)),
            (DataType::Int8, TypedValue::Int(0), TypedValue::Int(0)),
            (DataType::Int16, TypedValue::Int(-1), TypedValue::Int(-1)),
            (DataType::Int32, TypedValue::Int(i32::MIN), TypedValue::Int(i32::MIN)),
            (DataType::Int32, TypedValue::Int(i32::MAX), TypedValue::Int(i32::MAX)),
            (DataType::UInt8, TypedValue::UInt(255), TypedValue::UInt(255)),
            (DataType::UInt16, TypedValue::UInt(65535), TypedValue::UInt(65535)),
            (DataType::Int64, TypedValue::Long(i64::MIN), TypedValue::Long(i64::MIN)),
            (DataType::Int64, TypedValue::Long(-1), TypedValue::Long(-1)),
            (DataType::UInt64, TypedValue::ULong(u64::MAX), TypedValue::ULong(u64::MAX)),
            (DataType::UInt64, TypedValue::ULong(0), TypedValue::ULong(0)),
            (DataType::DateTime, TypedValue::ULong(1693526400000), TypedValue::ULong(1693526400000)),
        ];
        for (datatype, value, expected) in cases {
            let decoded = round_trip(Metric::new("m", datatype, value));
            assert_eq!(decoded.value, expected, "{datatype}");
            assert_eq!(decoded.datatype, Some(datatype));
        }
    }

    #[test]
    fn test_uint32_narrowing_pinned_vector() {
        // Literal wire bytes for: metric { name: "m", datatype: 7 (UInt32),
        // long_value: 4294967295 }. The narrowed decode is -1.
        let metric_record = [
            0x0a, 0x01, b'm', // name
            0x20, 0x07, // datatype = UInt32
            0x58, 0xff, 0xff, 0xff, 0xff, 0x0f, // long_value = 4294967295
        ];
        let mut bytes = vec![0x12, metric_record.len() as u8];
        bytes.extend_from_slice(&metric_record);

        let payload = decode_payload(&bytes).unwrap();
        let metric = &payload.metrics.unwrap()[0];
        assert_eq!(metric.datatype, Some(DataType::UInt32));
        assert_eq!(metric.value, TypedValue::Int(-1));
    }

    #[test]
    fn test_uint32_narrowing_small_value() {
        let decoded = round_trip(Metric::new("m", DataType::UInt32, TypedValue::ULong(7)));
        assert_eq!(decoded.value, TypedValue::Int(7));
    }

    #[test]
    fn test_round_trip_floats() {
        let decoded = round_trip(Metric::new("m", DataType::Float, TypedValue::Float(1.25)));
        match decoded.value {
            TypedValue::Float(v) => assert_relative_eq!(v, 1.25f32),
            other => panic!("unexpected value {other:?}"),
        }

        let decoded = round_trip(Metric::new("m", DataType::Double, TypedValue::Double(-2.5e300)));
        match decoded.value {
            TypedValue::Double(v) => assert_relative_eq!(v, -2.5e300),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_strings_and_bytes() {
        for (datatype, text) in [
            (DataType::String, "hello"),
            (DataType::String, ""),
            (DataType::Text, "multi\nline"),
            (DataType::Uuid, "0e0cd7ce-7a62-45f5-8bca-1a2b3c4d5e6f"),
        ] {
            let decoded = round_trip(Metric::new("m", datatype, TypedValue::String(text.into())));
            assert_eq!(decoded.value, TypedValue::String(text.into()));
        }

        for data in [vec![], vec![0u8, 1, 2, 255]] {
            let decoded = round_trip(Metric::new("m", DataType::Bytes, TypedValue::Bytes(data.clone())));
            assert_eq!(decoded.value, TypedValue::Bytes(data));
        }
    }

    #[test]
    fn test_round_trip_boolean_and_null() {
        let decoded = round_trip(Metric::new("m", DataType::Boolean, TypedValue::Boolean(true)));
        assert_eq!(decoded.value, TypedValue::Boolean(true));

        let decoded = round_trip(Metric::new("m", DataType::Int32, TypedValue::Null));
        assert_eq!(decoded.value, TypedValue::Null);
        assert_eq!(decoded.is_null, Some(true));
    }

    #[test]
    fn test_round_trip_metric_fields() {
        let mut metric = Metric::new("Rate", DataType::Int32, TypedValue::Int(42));
        metric.alias = Some(17);
        metric.timestamp = Some(1000);
        metric.is_historical = Some(true);
        metric.is_transient = Some(false);
        metric.metadata = Some(MetaData {
            content_type: Some("text/plain".into()),
            size: Some(9),
            ..Default::default()
        });

        let decoded = round_trip(metric.clone());
        assert_eq!(decoded.alias, Some(17));
        assert_eq!(decoded.timestamp, Some(1000));
        assert_eq!(decoded.is_historical, Some(true));
        assert_eq!(decoded.is_transient, Some(false));
        assert_eq!(decoded.metadata, metric.metadata);
    }

    #[test]
    fn test_round_trip_properties() {
        let mut nested = PropertySet::new();
        nested.insert("unit", PropertyValue::new(DataType::String, TypedValue::String("degC".into())));

        let mut properties = PropertySet::new();
        properties.insert("engUnits", PropertyValue::new(DataType::PropertySet, TypedValue::PropertySet(nested)));
        properties.insert("low", PropertyValue::new(DataType::Int32, TypedValue::Int(-40)));
        properties.insert("missing", PropertyValue::null(DataType::Double));

        let mut metric = Metric::new("m", DataType::Int32, TypedValue::Int(1));
        metric.properties = Some(properties.clone());

        let decoded = round_trip(metric);
        assert_eq!(decoded.properties, Some(properties));
    }

    #[test]
    fn test_round_trip_property_set_list() {
        let mut first = PropertySet::new();
        first.insert("a", PropertyValue::new(DataType::Int32, TypedValue::Int(1)));
        let mut second = PropertySet::new();
        second.insert("b", PropertyValue::new(DataType::Boolean, TypedValue::Boolean(true)));

        let mut properties = PropertySet::new();
        properties.insert(
            "list",
            PropertyValue::new(
                DataType::PropertySetList,
                TypedValue::PropertySetList(vec![first, second]),
            ),
        );

        let mut metric = Metric::new("m", DataType::Int32, TypedValue::Int(1));
        metric.properties = Some(properties.clone());
        let decoded = round_trip(metric);
        assert_eq!(decoded.properties, Some(properties));
    }

    #[test]
    fn test_round_trip_dataset() {
        let dataset = DataSet {
            num_of_columns: 3,
            columns: vec!["t".into(), "value".into(), "ok".into()],
            types: vec![
                Some(DataType::DateTime),
                Some(DataType::Double),
                Some(DataType::Boolean),
            ],
            rows: vec![
                vec![
                    TypedValue::ULong(1000),
                    TypedValue::Double(1.5),
                    TypedValue::Boolean(true),
                ],
                vec![
                    TypedValue::ULong(2000),
                    TypedValue::Double(-0.5),
                    TypedValue::Boolean(false),
                ],
            ],
        };
        let decoded = round_trip(Metric::new("m", DataType::DataSet, TypedValue::DataSet(dataset.clone())));
        assert_eq!(decoded.value, TypedValue::DataSet(dataset));
    }

    #[test]
    fn test_round_trip_template() {
        let template = Template {
            version: Some("1.2".into()),
            template_ref: Some("MotorType".into()),
            is_definition: Some(false),
            metrics: Some(vec![Metric::new("rpm", DataType::Int32, TypedValue::Int(900))]),
            parameters: Some(vec![Parameter {
                name: Some("scale".into()),
                datatype: Some(DataType::Double),
                value: TypedValue::Double(0.1),
            }]),
        };
        let decoded = round_trip(Metric::new(
            "m",
            DataType::Template,
            TypedValue::Template(Box::new(template.clone())),
        ));
        assert_eq!(decoded.value, TypedValue::Template(Box::new(template)));
    }

    #[test]
    fn test_round_trip_payload_envelope() {
        let payload = Payload {
            timestamp: Some(1693526400000),
            seq: Some(255),
            uuid: Some("host-rebirth".into()),
            body: Some(vec![1, 2, 3]),
            metrics: None,
        };
        let bytes = encode_payload(&payload).unwrap();
        assert_eq!(decode_payload(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_unknown_datatype_decodes_to_null() {
        // metric { name: "m", datatype: 99, long_value: 5 }
        let metric_record = [0x0a, 0x01, b'm', 0x20, 0x63, 0x58, 0x05];
        let mut bytes = vec![0x12, metric_record.len() as u8];
        bytes.extend_from_slice(&metric_record);

        let payload = decode_payload(&bytes).unwrap();
        let metric = &payload.metrics.unwrap()[0];
        assert_eq!(metric.datatype, None);
        assert_eq!(metric.value, TypedValue::Null);
    }

    #[test]
    fn test_is_null_wins_over_slot() {
        // metric { name: "m", datatype: 3, is_null: true, int_value: 5 }
        let metric_record = [0x0a, 0x01, b'm', 0x20, 0x03, 0x38, 0x01, 0x50, 0x05];
        let mut bytes = vec![0x12, metric_record.len() as u8];
        bytes.extend_from_slice(&metric_record);

        let metric = decode_payload(&bytes).unwrap().metrics.unwrap().remove(0);
        assert_eq!(metric.value, TypedValue::Null);
    }

    #[test]
    fn test_dataset_row_width_mismatch() {
        // Hand-build a dataset with 2 declared columns but a 1-element row.
        let dataset = DataSet {
            num_of_columns: 2,
            columns: vec!["a".into(), "b".into()],
            types: vec![Some(DataType::Int32), Some(DataType::Int32)],
            rows: vec![vec![TypedValue::Int(1), TypedValue::Int(2)]],
        };
        let payload = Payload {
            metrics: Some(vec![Metric::new("m", DataType::DataSet, TypedValue::DataSet(dataset))]),
            ..Default::default()
        };
        let mut bytes = encode_payload(&payload).unwrap();
        // Bump the declared column count in place; the first 0x02 byte in
        // the encoding is the num_of_columns varint.
        let pos = bytes.iter().position(|&b| b == 0x02).unwrap();
        bytes[pos] = 0x03;

        let err = decode_payload(&bytes).unwrap_err();
        assert_eq!(err, DecodeError::ColumnCountMismatch { expected: 3, actual: 2 });
    }

    #[test]
    fn test_dataset_invalid_cell_tag() {
        let dataset = DataSet {
            num_of_columns: 1,
            columns: vec!["blob".into()],
            types: vec![Some(DataType::Bytes)],
            rows: vec![],
        };
        // Encoding the empty dataset is fine; append a row record holding a
        // string slot so the decoder has to consult the declared type.
        let mut inner = crate::wire::WireWriter::new();
        inner.varint(fields::dataset::NUM_OF_COLUMNS, 1);
        inner.string(fields::dataset::COLUMNS, &dataset.columns[0]);
        inner.varint(fields::dataset::TYPES, u64::from(DataType::Bytes.tag()));
        let mut cell = crate::wire::WireWriter::new();
        cell.string(fields::dataset_value::STRING_VALUE, "x");
        let mut row = crate::wire::WireWriter::new();
        row.record(fields::row::ELEMENTS, cell);
        inner.record(fields::dataset::ROWS, row);

        let err = decode_dataset(&inner.into_bytes()).unwrap_err();
        assert_eq!(err, DecodeError::InvalidCellValue { tag: 17 });
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut writer = crate::wire::WireWriter::new();
        writer.varint(fields::payload::TIMESTAMP, 9);
        writer.string(100, "from-the-future");
        writer.varint(fields::payload::SEQ, 3);
        let payload = decode_payload(&writer.into_bytes()).unwrap();
        assert_eq!(payload.timestamp, Some(9));
        assert_eq!(payload.seq, Some(3));
    }
}
