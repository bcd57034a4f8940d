//! Line codec — frames `'\n'`-terminated packets for tokio streams.
//!
//! Empty lines are keep-alives and are consumed without yielding an item.
//! A line that grows past [`MAX_LINE`] without a terminator is a protocol
//! violation, not a reason to buffer forever.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{Packet, ProtoError};

/// Upper bound on one wire line, terminator included.
pub const MAX_LINE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct AdcCodec;

impl Decoder for AdcCodec {
    type Item = Packet;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, ProtoError> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > MAX_LINE {
                    return Err(ProtoError::LineTooLong);
                }
                return Ok(None);
            };
            if pos > MAX_LINE {
                return Err(ProtoError::LineTooLong);
            }
            let line = src.split_to(pos);
            src.advance(1);
            let line = std::str::from_utf8(&line).map_err(|_| ProtoError::InvalidUtf8)?;
            // keep-alive lines parse to None; scan for the next terminator
            if let Some(pkt) = Packet::parse(line)? {
                return Ok(Some(pkt));
            }
        }
    }
}

impl Encoder<Packet> for AdcCodec {
    type Error = ProtoError;

    fn encode(&mut self, pkt: Packet, dst: &mut BytesMut) -> Result<(), ProtoError> {
        let mut line = String::new();
        pkt.encode(&mut line);
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Command;

    fn decode_all(codec: &mut AdcCodec, buf: &mut BytesMut) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Some(pkt) = codec.decode(buf).unwrap() {
            out.push(pkt);
        }
        out
    }

    #[test]
    fn decodes_complete_lines_only() {
        let mut codec = AdcCodec;
        let mut buf = BytesMut::from("HSUP ADBASE ADTIGR\nBINF AA");
        let pkts = decode_all(&mut codec, &mut buf);
        assert_eq!(pkts.len(), 1);
        assert_eq!(pkts[0].cmd(), Command::SUP);
        assert_eq!(&buf[..], b"BINF AA", "partial line stays buffered");

        buf.extend_from_slice(b"AB NIalice\n");
        let pkts = decode_all(&mut codec, &mut buf);
        assert_eq!(pkts.len(), 1);
        assert_eq!(pkts[0].cmd(), Command::INF);
    }

    #[test]
    fn keep_alive_lines_are_skipped() {
        let mut codec = AdcCodec;
        let mut buf = BytesMut::from("\n\nBMSG AAAB hi\n\n");
        let pkts = decode_all(&mut codec, &mut buf);
        assert_eq!(pkts.len(), 1);
        assert_eq!(pkts[0].cmd(), Command::MSG);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_line_is_fatal() {
        let mut codec = AdcCodec;
        let mut buf = BytesMut::from(vec![b'A'; MAX_LINE + 1].as_slice());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtoError::LineTooLong)
        ));
    }

    #[test]
    fn encode_appends_terminator() {
        let mut codec = AdcCodec;
        let mut buf = BytesMut::new();
        let pkt = Packet::parse("IQUI AAAB").unwrap().unwrap();
        codec.encode(pkt, &mut buf).unwrap();
        assert_eq!(&buf[..], b"IQUI AAAB\n");
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut codec = AdcCodec;
        let mut buf = BytesMut::new();
        let pkt = Packet::parse("DMSG AAAB AAAC secret\\smessage")
            .unwrap()
            .unwrap();
        codec.encode(pkt.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, pkt);
    }
}
