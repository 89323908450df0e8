//! The closed set of well-known requests the WPU understands. Each has a
//! fixed `MessageClass` and a request-composition rule.

use crate::datatype;
use crate::frame::{self, MSG_TYPE_REQUEST, MSG_TYPE_WRITE, SOURCE};

pub type MessageClass = (u8, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetNodeId,
    GetSerial,
    GetDataType,
    GetDataLog,
    GetCounters,
    GetSetting,
    SetSetting,
    GetManual,
    SetManual,
}

impl Action {
    pub fn class(self) -> MessageClass {
        match self {
            Action::GetNodeId => (0x90, 0xE0),
            Action::GetSerial => (0x90, 0xE1),
            Action::GetDataType => (0xA4, 0x00),
            Action::GetDataLog => (0xA4, 0x01),
            Action::GetCounters => (0x42, 0x10),
            Action::GetSetting | Action::SetSetting => (0xA4, 0x10),
            Action::GetManual | Action::SetManual => (0x40, 0x30),
        }
    }

    /// `true` for the three actions whose results are cacheable invariants
    /// of the installed unit.
    pub fn cacheable(self) -> bool {
        matches!(self, Action::GetNodeId | Action::GetSerial | Action::GetDataType)
    }

    /// `true` for the two write actions, which require the CLI-boundary
    /// confirmation gate before the engine may proceed.
    pub fn is_write(self) -> bool {
        matches!(self, Action::SetSetting | Action::SetManual)
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::GetNodeId => "getnodeid",
            Action::GetSerial => "getserial",
            Action::GetDataType => "getdatatype",
            Action::GetDataLog => "getdatalog",
            Action::GetCounters => "getcounters",
            Action::GetSetting => "getsetting",
            Action::SetSetting => "setsetting",
            Action::GetManual => "getmanual",
            Action::SetManual => "setmanual",
        }
    }
}

/// Parameters needed to compose a request; which fields are used depends on
/// `Action`.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub id: Option<u16>,
    pub datatype: Option<u8>,
    pub value: Option<u32>,
    pub check: bool,
}

/// Builds the request frame body (without checksum) per the action's
/// payload shape, then appends the checksum.
pub fn compose(action: Action, params: &RequestParams) -> Vec<u8> {
    let (class_hi, class_lo) = action.class();
    let mut body = vec![SOURCE, class_hi, class_lo];

    match action {
        Action::GetSetting => {
            let id = params.id.unwrap_or(0) as u8;
            body.push(MSG_TYPE_REQUEST);
            body.push(19);
            body.extend(std::iter::repeat_n(0u8, 16));
            body.extend([0x00, id, 0x00]);
        }
        Action::SetSetting => {
            let id = params.id.unwrap_or(0) as u8;
            let value = params.value.unwrap_or(0);
            body.push(MSG_TYPE_WRITE);
            body.push(19);
            body.extend(datatype::encode_unsigned(value, 4));
            body.extend(std::iter::repeat_n(0u8, 12));
            body.extend([0x00, id, 0x00]);
        }
        Action::GetManual => {
            let id = params.id.unwrap_or(0);
            let [id_hi, id_lo] = id.to_be_bytes();
            body.push(MSG_TYPE_REQUEST);
            body.push(4);
            body.extend([0x01, id_hi, id_lo, 0x01]);
        }
        Action::SetManual => {
            let id = params.id.unwrap_or(0);
            let [id_hi, id_lo] = id.to_be_bytes();
            let dt = params.datatype.unwrap_or(0);
            let value = params.value.unwrap_or(0);
            let value_bytes = datatype::encode_unsigned(value, 2);
            body.push(MSG_TYPE_WRITE);
            body.push(7);
            body.extend([0x01, id_hi, id_lo, dt, value_bytes[0], value_bytes[1]]);
            if params.check {
                body.push(0x01);
            } else {
                body.push(0x00);
            }
        }
        _ => {
            body.push(MSG_TYPE_REQUEST);
            body.push(0);
        }
    }

    frame::finish_request(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getserial_matches_s1() {
        let frame = compose(Action::GetSerial, &RequestParams::default());
        assert_eq!(frame, vec![0x80, 0x90, 0xE1, 0x04, 0x00, 0x89]);
    }

    #[test]
    fn getdatatype_matches_s3() {
        let frame = compose(Action::GetDataType, &RequestParams::default());
        assert_eq!(frame, vec![0x80, 0xA4, 0x00, 0x04, 0x00, 0x56]);
    }

    #[test]
    fn getsetting_payload_shape() {
        let params = RequestParams { id: Some(5), ..Default::default() };
        let frame = compose(Action::GetSetting, &params);
        assert_eq!(frame[3], MSG_TYPE_REQUEST);
        assert_eq!(frame[4], 19);
        assert_eq!(frame.len(), 6 + 19);
        assert_eq!(&frame[frame.len() - 4..frame.len() - 1], &[0x00, 5, 0x00]);
    }

    #[test]
    fn setmanual_payload_shape() {
        let params = RequestParams { id: Some(300), datatype: Some(0x10), value: Some(42), check: true };
        let frame = compose(Action::SetManual, &params);
        assert_eq!(frame[3], MSG_TYPE_WRITE);
        assert_eq!(frame[4], 7);
        assert_eq!(frame.len(), 6 + 7);
    }
}
