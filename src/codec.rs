//! Declarative binary layouts for every request and response on both
//! endpoints.
//!
//! A [`Layout`] is an ordered list of segments. Literal segments are written
//! verbatim on encode and validated on decode; every other segment is a field
//! whose value is carried in a [`Value`]. Decoding yields only the field
//! values, in layout order, so `encode(decode(raw)) == raw` for any
//! well-formed frame.

use crate::error::ProtocolError;

pub const START_OF_PACKET: u8 = 0x02;
pub const RESPONSE_START_OF_PACKET: u8 = 0x82;
pub const TOKEN: u8 = 0x01;
pub const NULL_CODE: u8 = 0x00;

/// Largest optional payload any real-time response carries (printer status).
pub const MAX_OPTIONAL_DATA: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Literal(u8),
    Byte(&'static str),
    /// A length byte followed by that many bytes, at most `max`.
    Counted { name: &'static str, max: usize },
    /// Everything up to the end of the frame.
    Rest(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Byte(u8),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub name: &'static str,
    pub segments: &'static [Segment],
}

impl Layout {
    pub const fn new(name: &'static str, segments: &'static [Segment]) -> Self {
        Self { name, segments }
    }

    pub fn field_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Literal(_)))
            .count()
    }

    pub fn encode(&self, values: &[Value]) -> Result<Vec<u8>, ProtocolError> {
        let expected = self.field_count();
        if values.len() != expected {
            return Err(ProtocolError::FieldCount {
                layout: self.name,
                expected,
                actual: values.len(),
            });
        }

        let mut out = Vec::with_capacity(self.segments.len());
        let mut values = values.iter();
        for (index, segment) in self.segments.iter().enumerate() {
            if let Segment::Literal(b) = *segment {
                out.push(b);
                continue;
            }
            match (*segment, values.next()) {
                (Segment::Byte(_), Some(Value::Byte(b))) => out.push(*b),
                (Segment::Counted { max, .. }, Some(Value::Bytes(data))) => {
                    if data.len() > max {
                        return Err(ProtocolError::PayloadTooLong {
                            layout: self.name,
                            len: data.len(),
                            max,
                        });
                    }
                    out.push(data.len() as u8);
                    out.extend_from_slice(data);
                }
                (Segment::Rest(_), Some(Value::Bytes(data))) => out.extend_from_slice(data),
                _ => {
                    return Err(ProtocolError::FieldType {
                        layout: self.name,
                        index,
                    })
                }
            }
        }
        Ok(out)
    }

    /// Encode a layout whose fields are all single bytes.
    pub fn encode_bytes(&self, fields: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let values: Vec<Value> = fields.iter().map(|&b| Value::Byte(b)).collect();
        self.encode(&values)
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Vec<Value>, ProtocolError> {
        let mut values = Vec::with_capacity(self.field_count());
        let mut pos = 0;
        let need = |pos: usize, n: usize| -> Result<(), ProtocolError> {
            if raw.len() < pos + n {
                Err(ProtocolError::Truncated {
                    layout: self.name,
                    needed: pos + n,
                    actual: raw.len(),
                })
            } else {
                Ok(())
            }
        };

        for segment in self.segments {
            match *segment {
                Segment::Literal(expected) => {
                    need(pos, 1)?;
                    if raw[pos] != expected {
                        return Err(ProtocolError::LiteralMismatch {
                            layout: self.name,
                            offset: pos,
                            expected,
                            actual: raw[pos],
                        });
                    }
                    pos += 1;
                }
                Segment::Byte(_) => {
                    need(pos, 1)?;
                    values.push(Value::Byte(raw[pos]));
                    pos += 1;
                }
                Segment::Counted { max, .. } => {
                    need(pos, 1)?;
                    let len = raw[pos] as usize;
                    if len > max {
                        return Err(ProtocolError::PayloadTooLong {
                            layout: self.name,
                            len,
                            max,
                        });
                    }
                    need(pos + 1, len)?;
                    values.push(Value::Bytes(raw[pos + 1..pos + 1 + len].to_vec()));
                    pos += 1 + len;
                }
                Segment::Rest(_) => {
                    values.push(Value::Bytes(raw[pos..].to_vec()));
                    pos = raw.len();
                }
            }
        }

        if pos != raw.len() {
            return Err(ProtocolError::TrailingBytes {
                layout: self.name,
                extra: raw.len() - pos,
            });
        }
        Ok(values)
    }
}

// ── Framing messages ─────────────────────────────────────────────────

pub const REAL_TIME_REQUEST: Layout = Layout::new(
    "real-time request",
    &[
        Segment::Literal(START_OF_PACKET),
        Segment::Byte("request_id"),
        Segment::Literal(TOKEN),
        Segment::Byte("optional_data_length"),
    ],
);

pub const REAL_TIME_RESPONSE: Layout = Layout::new(
    "real-time response",
    &[
        Segment::Literal(RESPONSE_START_OF_PACKET),
        Segment::Byte("request_id"),
        Segment::Literal(TOKEN),
        Segment::Byte("return_code"),
        Segment::Counted {
            name: "optional_data",
            max: MAX_OPTIONAL_DATA,
        },
    ],
);

pub const ACKNOWLEDGEMENT: Layout = Layout::new("acknowledgement", &[Segment::Byte("code")]);

/// Status request on the real-time endpoint. Optional request data is not
/// used by any request this driver issues, so its length is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealTimeRequest {
    pub request_id: u8,
}

impl RealTimeRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        REAL_TIME_REQUEST.encode_bytes(&[self.request_id, NULL_CODE])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealTimeResponse {
    pub request_id: u8,
    pub return_code: u8,
    pub optional_data: Vec<u8>,
}

impl RealTimeResponse {
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        match REAL_TIME_RESPONSE.decode(raw)?.as_slice() {
            [Value::Byte(request_id), Value::Byte(return_code), Value::Bytes(data)] => {
                Ok(Self {
                    request_id: *request_id,
                    return_code: *return_code,
                    optional_data: data.clone(),
                })
            }
            other => Err(ProtocolError::FieldCount {
                layout: REAL_TIME_RESPONSE.name,
                expected: 3,
                actual: other.len(),
            }),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        REAL_TIME_RESPONSE.encode(&[
            Value::Byte(self.request_id),
            Value::Byte(self.return_code),
            Value::Bytes(self.optional_data.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FIELDS: Layout = Layout::new(
        "test",
        &[
            Segment::Literal(0x1b),
            Segment::Literal(0x24),
            Segment::Byte("nL"),
            Segment::Byte("nH"),
        ],
    );

    #[test]
    fn encode_writes_literals_verbatim() {
        assert_eq!(
            TWO_FIELDS.encode_bytes(&[0xcd, 0xab]).unwrap(),
            vec![0x1b, 0x24, 0xcd, 0xab]
        );
    }

    #[test]
    fn encode_rejects_wrong_field_count() {
        let err = TWO_FIELDS.encode_bytes(&[0x01]).unwrap_err();
        assert!(matches!(err, ProtocolError::FieldCount { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn encode_rejects_wrong_field_kind() {
        let err = TWO_FIELDS
            .encode(&[Value::Byte(1), Value::Bytes(vec![2])])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FieldType { index: 3, .. }));
    }

    #[test]
    fn decode_validates_literals() {
        let err = TWO_FIELDS.decode(&[0x1b, 0x25, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::LiteralMismatch {
                layout: "test",
                offset: 1,
                expected: 0x24,
                actual: 0x25,
            }
        );
    }

    #[test]
    fn decode_rejects_truncated_and_trailing() {
        assert!(matches!(
            TWO_FIELDS.decode(&[0x1b, 0x24, 0x00]),
            Err(ProtocolError::Truncated { needed: 4, actual: 3, .. })
        ));
        assert!(matches!(
            TWO_FIELDS.decode(&[0x1b, 0x24, 0x00, 0x00, 0x00]),
            Err(ProtocolError::TrailingBytes { extra: 1, .. })
        ));
    }

    #[test]
    fn real_time_request_frame() {
        let frame = RealTimeRequest { request_id: 0x73 }.encode().unwrap();
        assert_eq!(frame, vec![0x02, 0x73, 0x01, 0x00]);
    }

    #[test]
    fn real_time_response_round_trips() {
        let frames: [&[u8]; 3] = [
            &[0x82, 0x73, 0x01, 0x06, 0x04, 0x8f, 0x4f, 0x08, 0x00],
            &[0x82, 0x64, 0x01, 0x06, 0x06, 0x10, 0x0f, 0x20, 0x0c, 0x02, 0x80],
            &[0x82, 0x43, 0x01, 0x15, 0x00],
        ];
        for raw in frames {
            let decoded = RealTimeResponse::decode(raw).unwrap();
            assert_eq!(decoded.encode().unwrap(), raw);
        }
    }

    #[test]
    fn real_time_response_length_must_match() {
        let err = RealTimeResponse::decode(&[0x82, 0x73, 0x01, 0x06, 0x04, 0x8f]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));

        let err = RealTimeResponse::decode(&[0x82, 0x73, 0x01, 0x06, 0x07, 0, 0, 0, 0, 0, 0, 0])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLong { len: 7, .. }));
    }

    #[test]
    fn real_time_response_rejects_wrong_token() {
        let err = RealTimeResponse::decode(&[0x82, 0x73, 0x02, 0x06, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::LiteralMismatch { offset: 2, expected: TOKEN, .. }
        ));
    }

    #[test]
    fn rest_segment_takes_remaining_bytes() {
        const RASTER: Layout = Layout::new(
            "raster",
            &[Segment::Literal(0x1b), Segment::Byte("m"), Segment::Rest("data")],
        );
        let values = RASTER.decode(&[0x1b, 33, 1, 2, 3]).unwrap();
        assert_eq!(values, vec![Value::Byte(33), Value::Bytes(vec![1, 2, 3])]);
        assert_eq!(RASTER.encode(&values).unwrap(), vec![0x1b, 33, 1, 2, 3]);
    }
}
