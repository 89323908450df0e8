//! Decoder: pairs schema rows with datatype codes to build a field layout,
//! then walks a payload to produce labeled measurements.

use std::collections::BTreeMap;

use crate::datatype;
use crate::error::WpuError;
use crate::schema::{CounterRow, DataLabelRow, SchemaStore};

/// A decoded field descriptor assembled from a schema row paired with a
/// datatype code.
#[derive(Debug, Clone)]
pub struct Field {
    pub index: u16,
    pub datatype: u8,
    pub label: String,
    pub description: String,
}

/// `{ManufacturerGroup, Manufacturer, HardwareType, ProductVersion, ListVersion}`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeId {
    pub manufacturer_group: u16,
    pub manufacturer: &'static str,
    pub hardware_type: &'static str,
    pub product_version: u8,
    pub list_version: u8,
}

/// Decodes a `getnodeid` response payload (spec S2).
pub fn decode_node_id(payload: &[u8]) -> Result<NodeId, WpuError> {
    if payload.len() < 6 {
        return Err(WpuError::BadLength);
    }
    let manufacturer_group = u16::from_be_bytes([payload[0], payload[1]]);
    let manufacturer_code = payload[2];
    let hardware_code = payload[3];
    let manufacturer = match manufacturer_code {
        0 => "HCCP",
        other => return Err(WpuError::NotFound(format!("unknown manufacturer code {other}"))),
    };
    let hardware_type = match (manufacturer_code, hardware_code) {
        (0, 13) => "WPU",
        (0, 15) => "Autotemp",
        (_, other) => return Err(WpuError::NotFound(format!("unknown hardware type code {other}"))),
    };
    Ok(NodeId {
        manufacturer_group,
        manufacturer,
        hardware_type,
        product_version: payload[4],
        list_version: payload[5],
    })
}

/// Decodes a `getserial` response payload (spec S1): a 24-bit big-endian
/// integer over the 3 payload bytes.
pub fn decode_serial(payload: &[u8]) -> Result<u32, WpuError> {
    if payload.len() < 3 {
        return Err(WpuError::BadLength);
    }
    Ok(((payload[0] as u32) << 16) | ((payload[1] as u32) << 8) | payload[2] as u32)
}

/// Builds the ordered `[Field]` layout for `getdatalog` decoding: strips
/// the getdatatype response's 5-byte header and trailing checksum byte,
/// then zips the remaining per-field datatype codes against the ordered
/// `datalabel` rows, computing cumulative offsets.
///
/// An unrecognized datatype code aborts structure construction at that
/// field; fields already built are kept.
pub fn build_datalog_fields(datatype_payload: &[u8], labels: &[DataLabelRow]) -> Vec<Field> {
    let codes = strip_datatype_header(datatype_payload);
    if codes.len() != labels.len() {
        log::warn!(
            "datatype code count ({}) does not match datalabel row count ({}); zipping element-wise",
            codes.len(),
            labels.len()
        );
    }

    let mut fields = Vec::new();
    let mut offset: u16 = 0;
    for (label, &dt) in labels.iter().zip(codes.iter()) {
        let Some(w) = datatype::width(dt) else {
            log::error!("unknown datatype for label {}: {dt:#04x}", label.name);
            break;
        };
        let mut description = title_case(&label.title);
        if let Some(unit) = &label.unit {
            description = format!("{description} ({unit})");
        }
        description = format!("{description} ({})", label.name.to_lowercase());
        if let Some(tooltip) = &label.tooltip {
            log::debug!("{}: {tooltip}", label.name);
        }

        fields.push(Field {
            index: offset,
            datatype: dt,
            label: label.name.to_lowercase(),
            description,
        });
        offset += w as u16;
    }
    fields
}

/// The getdatatype response has a 5-byte header and a trailing checksum
/// byte; everything in between is one datatype code per field.
fn strip_datatype_header(datatype_payload: &[u8]) -> &[u8] {
    if datatype_payload.len() <= 6 {
        return &[];
    }
    &datatype_payload[5..datatype_payload.len() - 1]
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes a `getdatalog` payload using a prebuilt field layout. One bad
/// field logs and is skipped; it does not abort the rest of the decode.
pub fn decode_datalog(fields: &[Field], payload: &[u8]) -> BTreeMap<String, f64> {
    let mut measurements = BTreeMap::new();
    for field in fields {
        let Some(w) = datatype::width(field.datatype) else {
            log::error!("unknown datatype 0x{:02x} for field {}", field.datatype, field.label);
            continue;
        };
        let start = field.index as usize;
        let Some(bytes) = payload.get(start..start + w) else {
            log::error!("payload too short for field {} at offset {start}", field.label);
            continue;
        };
        match datatype::decode(field.datatype, bytes) {
            Ok(decoded) => {
                log::info!("{}: {}", field.description, decoded.value);
                measurements.insert(field.label.clone(), decoded.value);
            }
            Err(e) => log::error!("{e} (field {})", field.label),
        }
    }
    measurements
}

/// Decodes a `getcounters` payload. Each counter's offset is `id * 2`; every
/// counter is a 2-byte `u16` (datatype `0x10`).
pub fn decode_counters(rows: &[CounterRow], payload: &[u8]) -> BTreeMap<String, f64> {
    let mut measurements = BTreeMap::new();
    for row in rows {
        let offset = (row.id as usize) * 2;
        let Some(bytes) = payload.get(offset..offset + 2) else {
            log::error!("payload too short for counter {} at offset {offset}", row.name);
            continue;
        };
        match datatype::decode(0x10, bytes) {
            Ok(decoded) => {
                measurements.insert(row.name.to_lowercase(), decoded.value);
            }
            Err(e) => log::error!("{e} (counter {})", row.name),
        }
    }
    measurements
}

/// A decoded `getsetting` response: `current | min | max | step`, all under
/// the same datatype found at payload byte 16.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingValue {
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub datatype: u8,
}

pub fn decode_setting_response(payload: &[u8]) -> Result<SettingValue, WpuError> {
    if payload.len() < 17 {
        return Err(WpuError::BadLength);
    }
    let dt = payload[16];
    let w = datatype::width(dt).ok_or(WpuError::UnknownDatatype(dt))?;
    // All four windows are 4 bytes wide on the wire regardless of `dt`'s
    // native width; only the trailing `w` bytes of each window carry data.
    let window = |start: usize| -> Result<f64, WpuError> {
        let bytes = &payload[start..start + 4];
        Ok(datatype::decode(dt, &bytes[4 - w..])?.value)
    };
    Ok(SettingValue {
        current: window(0)?,
        min: window(4)?,
        max: window(8)?,
        step: window(12)?,
        datatype: dt,
    })
}

/// A decoded `getmanual` response: `{reserved, reserved, id, datatype,
/// value_hi, value_lo}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualValue {
    pub id: u8,
    pub datatype: u8,
    pub value: f64,
}

pub fn decode_manual_response(payload: &[u8]) -> Result<ManualValue, WpuError> {
    if payload.len() < 6 {
        return Err(WpuError::BadLength);
    }
    let id = payload[2];
    let dt = payload[3];
    let decoded = datatype::decode(dt, &payload[4..6])?;
    Ok(ManualValue { id, datatype: dt, value: decoded.value })
}

/// Resolves `ListVersion` -> datalabel schema -> `[Field]`, the full path
/// from a node id's list version to a usable field layout.
pub fn resolve_datalog_fields(
    store: &SchemaStore,
    list_version: u8,
    datatype_payload: &[u8],
) -> Result<Vec<Field>, WpuError> {
    let versions = store.resolve_versions(list_version)?;
    let labels = store.datalabels(versions.datalabel)?;
    Ok(build_datalog_fields(datatype_payload, &labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataLabelRow;

    #[test]
    fn s2_node_id() {
        let payload = [0x00, 0x01, 0x00, 0x0D, 0x02, 0x05];
        let node = decode_node_id(&payload).unwrap();
        assert_eq!(
            node,
            NodeId {
                manufacturer_group: 1,
                manufacturer: "HCCP",
                hardware_type: "WPU",
                product_version: 2,
                list_version: 5,
            }
        );
    }

    #[test]
    fn s1_serial() {
        let payload = [0x00, 0x12, 0x34];
        assert_eq!(decode_serial(&payload).unwrap(), 4660);
    }

    #[test]
    fn decoder_monotonicity() {
        let labels = vec![
            DataLabelRow { name: "a".into(), title: "A".into(), tooltip: None, unit: None },
            DataLabelRow { name: "b".into(), title: "B".into(), tooltip: None, unit: None },
            DataLabelRow { name: "c".into(), title: "C".into(), tooltip: None, unit: None },
        ];
        // header(5) + codes [0x00, 0x10, 0x20] + checksum(1)
        let datatype_payload = [0, 0, 0, 0, 0, 0x00, 0x10, 0x20, 0];
        let fields = build_datalog_fields(&datatype_payload, &labels);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].index, 0);
        assert_eq!(fields[1].index, 1);
        assert_eq!(fields[2].index, 3);
    }

    #[test]
    fn s4_datalog_decode() {
        let labels = vec![DataLabelRow {
            name: "temp".into(),
            title: "Temp".into(),
            tooltip: None,
            unit: None,
        }];
        let datatype_payload = [0, 0, 0, 0, 0, 0x92, 0];
        let fields = build_datalog_fields(&datatype_payload, &labels);
        let payload = [0xFF, 0x38];
        let measurements = decode_datalog(&fields, &payload);
        assert_eq!(measurements["temp"], -2.00);
    }

    #[test]
    fn unrecognized_datatype_stops_structure_build_but_keeps_prior_fields() {
        let labels = vec![
            DataLabelRow { name: "a".into(), title: "A".into(), tooltip: None, unit: None },
            DataLabelRow { name: "b".into(), title: "B".into(), tooltip: None, unit: None },
        ];
        let datatype_payload = [0, 0, 0, 0, 0, 0x00, 0xFF, 0];
        let fields = build_datalog_fields(&datatype_payload, &labels);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].label, "a");
    }

    #[test]
    fn decode_counters_offset_rule() {
        let rows = vec![CounterRow {
            id: 2,
            name: "compressor_hours".into(),
            title: "Compressor hours".into(),
            tooltip: None,
            unit: None,
        }];
        let mut payload = vec![0u8; 8];
        payload[4] = 0x01;
        payload[5] = 0x2C; // 0x012C = 300
        let measurements = decode_counters(&rows, &payload);
        assert_eq!(measurements["compressor_hours"], 300.0);
    }

    #[test]
    fn setting_response_layout() {
        let mut payload = vec![0u8; 19];
        // current = 0x00000032 (50), datatype 0x00 at byte 16
        payload[3] = 0x32;
        payload[7] = 10; // min
        payload[11] = 90; // max
        payload[15] = 5; // step
        payload[16] = 0x00;
        let setting = decode_setting_response(&payload).unwrap();
        assert_eq!(setting.current, 50.0);
        assert_eq!(setting.min, 10.0);
        assert_eq!(setting.max, 90.0);
        assert_eq!(setting.step, 5.0);
    }

    #[test]
    fn manual_response_layout() {
        let payload = [0x00, 0x00, 0x07, 0x10, 0x00, 0x2A];
        let manual = decode_manual_response(&payload).unwrap();
        assert_eq!(manual.id, 7);
        assert_eq!(manual.datatype, 0x10);
        assert_eq!(manual.value, 42.0);
    }
}
