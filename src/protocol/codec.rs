//! Frame encoder and body decoder
//!
//! Pure functions over byte buffers: no I/O, no logging. One codec instance
//! serves one [`ProtocolVariant`] for its whole lifetime.

use super::{FRAME_HEADER, MAX_TARGETS, ProtocolVariant, TargetRecord};
use crate::error::{Error, Result};

/// Records decoded from one frame body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedBody {
    /// Records in transmission order
    pub records: Vec<TargetRecord>,
    /// Bytes left over after the last full record
    pub trailing_bytes: usize,
}

impl DecodedBody {
    /// Body carried bytes beyond its declared records
    #[inline]
    pub fn has_trailing_data(&self) -> bool {
        self.trailing_bytes > 0
    }
}

/// Encoder/decoder for one protocol variant
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    variant: ProtocolVariant,
}

impl FrameCodec {
    pub fn new(variant: ProtocolVariant) -> Self {
        Self { variant }
    }

    #[inline]
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Encode records into a complete frame
    ///
    /// `frame_index` is written only by the indexed preamble (as 0 when
    /// `None`); the plain preamble ignores it.
    pub fn encode(&self, records: &[TargetRecord], frame_index: Option<u32>) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.frame_len(records.len()));
        self.encode_into(&mut out, records, frame_index)?;
        Ok(out)
    }

    /// Encode into a reusable buffer (cleared first)
    pub fn encode_into(
        &self,
        out: &mut Vec<u8>,
        records: &[TargetRecord],
        frame_index: Option<u32>,
    ) -> Result<()> {
        if records.len() > MAX_TARGETS {
            return Err(Error::Encoding {
                count: records.len(),
                max: MAX_TARGETS,
            });
        }

        let body_len = self.variant.body_len(records.len());
        out.clear();
        out.reserve(self.variant.preamble_size() + body_len);

        out.extend_from_slice(&FRAME_HEADER.to_le_bytes());
        if self.variant.has_index() {
            out.extend_from_slice(&frame_index.unwrap_or(0).to_le_bytes());
        }
        // max_body_len() fits in u16 for both layouts
        out.extend_from_slice(&(body_len as u16).to_le_bytes());
        out.push(records.len() as u8);

        for record in records {
            record.write_to(self.variant.layout, out);
        }
        Ok(())
    }

    /// Decode a frame body (target count byte + records)
    ///
    /// The body must already be delimited by the frame's declared length.
    pub fn decode_body(&self, body: &[u8]) -> Result<DecodedBody> {
        let Some((&count, data)) = body.split_first() else {
            return Err(Error::EmptyBody);
        };

        let record_size = self.variant.record_size();
        let expected = count as usize * record_size;
        if data.len() < expected {
            return Err(Error::TruncatedRecord {
                expected,
                actual: data.len(),
            });
        }

        let records = data[..expected]
            .chunks_exact(record_size)
            .map(|chunk| TargetRecord::read_from(self.variant.layout, chunk))
            .collect();

        Ok(DecodedBody {
            records,
            trailing_bytes: data.len() - expected,
        })
    }

    /// Total encoded size of a frame carrying `count` records
    #[inline]
    pub fn frame_len(&self, count: usize) -> usize {
        self.variant.preamble_size() + self.variant.body_len(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Preamble, RecordLayout};
    use rand::Rng;

    const INDEXED_FULL: ProtocolVariant = ProtocolVariant::new(Preamble::Indexed, RecordLayout::Full);
    const PLAIN_KINEMATIC: ProtocolVariant =
        ProtocolVariant::new(Preamble::Plain, RecordLayout::Kinematic);

    fn random_record<R: Rng>(rng: &mut R, layout: RecordLayout) -> TargetRecord {
        let vec3 = |rng: &mut R| -> [f32; 3] {
            [
                rng.gen_range(-50.0f32..50.0),
                rng.gen_range(-50.0f32..50.0),
                rng.gen_range(-50.0f32..50.0),
            ]
        };
        let position = vec3(rng);
        let velocity = vec3(rng);
        let acceleration = match layout {
            RecordLayout::Full => vec3(rng),
            RecordLayout::Kinematic => [0.0; 3],
        };
        TargetRecord {
            id: rng.r#gen(),
            state: rng.r#gen(),
            point_count: rng.r#gen(),
            position,
            velocity,
            acceleration,
        }
    }

    #[test]
    fn test_encode_preamble_indexed() {
        let codec = FrameCodec::new(INDEXED_FULL);
        let frame = codec.encode(&[TargetRecord::default()], Some(0x0102_0304)).unwrap();

        assert_eq!(frame.len(), 8 + 1 + 44);
        assert_eq!(&frame[0..2], &[0x55, 0xAA]);
        assert_eq!(&frame[2..6], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(u16::from_le_bytes([frame[6], frame[7]]), 45);
        assert_eq!(frame[8], 1);
    }

    #[test]
    fn test_encode_preamble_plain_ignores_index() {
        let codec = FrameCodec::new(PLAIN_KINEMATIC);
        let frame = codec.encode(&[], Some(99)).unwrap();
        assert_eq!(frame, vec![0x55, 0xAA, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_too_many_records() {
        let codec = FrameCodec::new(INDEXED_FULL);
        let records = vec![TargetRecord::default(); 256];
        let err = codec.encode(&records, Some(1)).unwrap_err();
        assert!(matches!(err, Error::Encoding { count: 256, max: 255 }));
    }

    #[test]
    fn test_round_trip_random_records() {
        let mut rng = rand::thread_rng();
        for variant in [INDEXED_FULL, PLAIN_KINEMATIC] {
            let codec = FrameCodec::new(variant);
            for count in [0usize, 1, 17, 255] {
                let records: Vec<_> = (0..count)
                    .map(|_| random_record(&mut rng, variant.layout))
                    .collect();
                let frame = codec.encode(&records, Some(5)).unwrap();
                let body = &frame[variant.preamble_size()..];
                let decoded = codec.decode_body(body).unwrap();
                assert_eq!(decoded.records, records);
                assert!(!decoded.has_trailing_data());
            }
        }
    }

    #[test]
    fn test_decode_empty_body() {
        let codec = FrameCodec::new(INDEXED_FULL);
        assert!(matches!(codec.decode_body(&[]), Err(Error::EmptyBody)));
    }

    #[test]
    fn test_decode_truncated() {
        let codec = FrameCodec::new(INDEXED_FULL);
        let mut body = vec![2u8];
        body.extend_from_slice(&[0u8; 44 + 10]);
        let err = codec.decode_body(&body).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedRecord {
                expected: 88,
                actual: 54
            }
        ));
    }

    #[test]
    fn test_decode_trailing_data_keeps_records() {
        let codec = FrameCodec::new(PLAIN_KINEMATIC);
        let record = TargetRecord {
            id: 3,
            state: 1,
            point_count: 4,
            position: [1.0, 2.0, 3.0],
            ..Default::default()
        };
        let frame = codec.encode(&[record], None).unwrap();
        let mut body = frame[4..].to_vec();
        body.extend_from_slice(&[0xDE, 0xAD, 0xBE]);

        let decoded = codec.decode_body(&body).unwrap();
        assert_eq!(decoded.records, vec![record]);
        assert_eq!(decoded.trailing_bytes, 3);
        assert!(decoded.has_trailing_data());
    }

    #[test]
    fn test_encode_into_reuses_buffer() {
        let codec = FrameCodec::new(INDEXED_FULL);
        let mut buf = vec![0xFF; 300];
        codec.encode_into(&mut buf, &[], Some(1)).unwrap();
        assert_eq!(buf.len(), codec.frame_len(0));
        assert_eq!(buf[8], 0);
    }
}
