//! Transfer frame: a validated header followed by the binary payload.
//!
//! On the wire a frame is a 4-byte little-endian header length, the
//! bincode-encoded [`FrameHeader`], then exactly `len` payload bytes. The
//! header carries magic bytes, a format version, and a checksum so the
//! receiver can reject anything that is not a complete, intact binary.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use vesta_common::ContentHash;

use crate::error::TransferError;

/// Magic bytes identifying a Vesta transfer frame.
const FRAME_MAGIC: [u8; 4] = *b"VSTA";

/// Current frame format version. Increment on breaking changes.
const FRAME_FORMAT_VERSION: u32 = 1;

/// Largest header accepted from a peer.
const MAX_HEADER_LEN: usize = 64 * 1024;

/// Largest payload accepted from a peer.
pub const MAX_PAYLOAD_LEN: u64 = 1 << 30;

/// Header prepended to every transferred binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Magic bytes: must be `b"VSTA"`.
    pub magic: [u8; 4],
    /// Frame format version.
    pub format_version: u32,
    /// File name the binary had on the producer, for diagnostics.
    pub file_name: String,
    /// Payload length in bytes.
    pub len: u64,
    /// Content hash of the payload.
    pub checksum: ContentHash,
}

impl FrameHeader {
    /// Describes `payload` for sending.
    pub fn for_payload(file_name: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            magic: FRAME_MAGIC,
            format_version: FRAME_FORMAT_VERSION,
            file_name: file_name.into(),
            len: payload.len() as u64,
            checksum: ContentHash::from_bytes(payload),
        }
    }
}

/// Builds the complete frame for `payload`.
pub fn encode_frame(file_name: &str, payload: &[u8]) -> Result<Vec<u8>, TransferError> {
    let header = FrameHeader::for_payload(file_name, payload);
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| TransferError::InvalidHeader {
            reason: e.to_string(),
        })?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(payload);
    Ok(output)
}

/// Decodes and validates a header.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, TransferError> {
    let (header, _): (FrameHeader, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| {
            TransferError::InvalidHeader {
                reason: e.to_string(),
            }
        })?;

    if header.magic != FRAME_MAGIC {
        return Err(TransferError::InvalidHeader {
            reason: "bad magic bytes".to_string(),
        });
    }
    if header.format_version != FRAME_FORMAT_VERSION {
        return Err(TransferError::VersionMismatch {
            expected: FRAME_FORMAT_VERSION,
            actual: header.format_version,
        });
    }
    if header.len > MAX_PAYLOAD_LEN {
        return Err(TransferError::TooLarge {
            len: header.len,
            limit: MAX_PAYLOAD_LEN,
        });
    }
    Ok(header)
}

/// Reads one frame from `reader`, returning the header and verified payload.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    location: &str,
) -> Result<(FrameHeader, Vec<u8>), TransferError> {
    let io_err = |e: std::io::Error| TransferError::Io {
        location: location.to_string(),
        source: e,
    };

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await.map_err(io_err)?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    if header_len > MAX_HEADER_LEN {
        return Err(TransferError::InvalidHeader {
            reason: format!("header length {header_len} exceeds {MAX_HEADER_LEN}"),
        });
    }

    let mut header_bytes = vec![0u8; header_len];
    reader.read_exact(&mut header_bytes).await.map_err(io_err)?;
    let header = decode_header(&header_bytes)?;

    let mut payload = vec![0u8; header.len as usize];
    reader.read_exact(&mut payload).await.map_err(io_err)?;

    let actual = ContentHash::from_bytes(&payload);
    if actual != header.checksum {
        return Err(TransferError::ChecksumMismatch {
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame(header: &FrameHeader, payload: &[u8]) -> Vec<u8> {
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(payload);
        out
    }

    #[tokio::test]
    async fn read_valid_frame() {
        let frame = encode_frame("vc_sort_0_256.so", b"\x7fELF binary").unwrap();
        let (header, payload) = read_frame(&mut frame.as_slice(), "test").await.unwrap();
        assert_eq!(header.file_name, "vc_sort_0_256.so");
        assert_eq!(payload, b"\x7fELF binary");
    }

    #[tokio::test]
    async fn truncated_payload_is_io_error() {
        let frame = encode_frame("k.so", b"0123456789").unwrap();
        let cut = &frame[..frame.len() - 3];
        let err = read_frame(&mut &cut[..], "test").await.unwrap_err();
        assert!(matches!(err, TransferError::Io { .. }));
    }

    #[tokio::test]
    async fn corrupted_payload_is_rejected() {
        let mut frame = encode_frame("k.so", b"payload bytes").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        let err = read_frame(&mut frame.as_slice(), "test").await.unwrap_err();
        assert!(matches!(err, TransferError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn wrong_magic_is_rejected() {
        let mut header = FrameHeader::for_payload("k.so", b"data");
        header.magic = *b"BAAD";
        let frame = raw_frame(&header, b"data");
        let err = read_frame(&mut frame.as_slice(), "test").await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidHeader { .. }));
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let mut header = FrameHeader::for_payload("k.so", b"data");
        header.format_version = FRAME_FORMAT_VERSION + 1;
        let frame = raw_frame(&header, b"data");
        let err = read_frame(&mut frame.as_slice(), "test").await.unwrap_err();
        assert!(matches!(err, TransferError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn oversized_header_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&(MAX_HEADER_LEN as u32 + 1).to_le_bytes());
        let err = read_frame(&mut frame.as_slice(), "test").await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidHeader { .. }));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut header = FrameHeader::for_payload("k.so", b"");
        header.len = MAX_PAYLOAD_LEN + 1;
        let bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard()).unwrap();
        assert!(matches!(
            decode_header(&bytes),
            Err(TransferError::TooLarge { .. })
        ));
    }
}
