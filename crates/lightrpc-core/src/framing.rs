//! `\n\n`-delimited message framing
//!
//! Every message on the wire is a JSON document followed by a blank line.
//! [`FrameCodec`] plugs into `tokio_util`'s `FramedRead`/`FramedWrite`.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::config::{Direction, EngineConfig};
use crate::error::FrameError;

pub const DELIMITER: &[u8] = b"\n\n";

/// Largest frame accepted before a delimiter shows up.
pub const MAX_FRAME_SIZE: usize = 500 * 1024 * 1023;

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    // Bytes already scanned without finding a delimiter.
    scanned: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            scanned: 0,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        // Back up one byte in case the delimiter straddles two reads.
        let start = self.scanned.saturating_sub(DELIMITER.len() - 1);
        let found = src[start..]
            .windows(DELIMITER.len())
            .position(|window| window == DELIMITER)
            .map(|offset| start + offset);

        match found {
            Some(end) => {
                self.scanned = 0;
                let mut frame = src.split_to(end + DELIMITER.len());
                frame.truncate(end);
                Ok(Some(frame))
            }
            None if src.len() > self.max_frame_size => Err(FrameError::TooLong {
                limit: self.max_frame_size,
            }),
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // An unterminated tail is not a message.
                if !src.is_empty() {
                    debug!(bytes = src.len(), "Dropping unterminated frame at end of stream");
                    src.clear();
                }
                self.scanned = 0;
                Ok(None)
            }
        }
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), FrameError> {
        let payload = item.as_ref();
        dst.reserve(payload.len() + DELIMITER.len());
        dst.put_slice(payload);
        dst.put_slice(DELIMITER);
        Ok(())
    }
}

/// Log a frame verbatim when wire debugging is on for its direction.
pub fn log_frame(config: &EngineConfig, direction: Direction, frame: &[u8]) {
    if config.logs_wire(direction) {
        debug!(
            target: "lightrpc::wire",
            direction = %direction,
            "{}",
            String::from_utf8_lossy(frame)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn test_decode_two_frames_in_one_buffer() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"{\"a\":1}\n\n{\"b\":2}\n\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"{\"a\":1}"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"{\"b\":2}"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_single_newline_is_not_a_delimiter() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"{\"a\":\n1}\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"{\"a\":\n1}"[..]);
    }

    #[test]
    fn test_delimiter_split_across_reads() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"{}\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\n{");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), &b"{}"[..]);
        assert_eq!(buf, &b"{"[..]);
    }

    #[test]
    fn test_empty_frame() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"\n\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::TooLong { limit: 8 }));
    }

    #[test]
    fn test_unterminated_tail_is_dropped() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"{\"a\":1}\n\n{\"partial\""[..]);

        assert!(codec.decode_eof(&mut buf).unwrap().is_some());
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_appends_delimiter() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(b"{\"x\":1}".as_slice(), &mut buf).unwrap();
        assert_eq!(buf, &b"{\"x\":1}\n\n"[..]);
    }

    #[tokio::test]
    async fn test_framed_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(client, FrameCodec::default());
        let mut reader = FramedRead::new(server, FrameCodec::default());

        writer.send(r#"{"id":1}"#).await.unwrap();
        writer.send(r#"{"id":2}"#).await.unwrap();
        let mut inner = writer.into_inner();
        inner.write_all(b"{\"unterminated\"").await.unwrap();
        drop(inner);

        assert_eq!(reader.next().await.unwrap().unwrap(), &br#"{"id":1}"#[..]);
        assert_eq!(reader.next().await.unwrap().unwrap(), &br#"{"id":2}"#[..]);
        assert!(reader.next().await.is_none());
    }
}
