//! Wire format for pending calls.
//!
//! Frame format: `[length:4][checksum:4][id:4][payload:N]`
//!
//! - **length**: Total frame size including header (little-endian u32)
//! - **checksum**: CRC32C of (id + payload) for integrity verification
//! - **id**: Target callback id (little-endian u32)
//! - **payload**: Argument tuple encoded by the dispatcher's codec
//!
//! A frame is the whole collective message; the transport delivers frames
//! intact, so a frame whose length field disagrees with the bytes received is
//! malformed rather than partial.

use lockstep_core::CallbackId;

/// Header size: 4 (length) + 4 (checksum) + 4 (id) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size (1MB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Largest payload whose frame length still fits the `u32` length field.
pub const MAX_ENCODABLE_PAYLOAD: usize = u32::MAX as usize - HEADER_SIZE;

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// Checksum verification failed - data was corrupted.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Expected checksum from header.
        expected: u32,
        /// Computed checksum from data.
        actual: u32,
    },

    /// Payload exceeds the configured limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        size: usize,
        /// Limit in force.
        max: usize,
    },

    /// Length field disagrees with the frame that was received.
    #[error("invalid frame length: header says {length}, received {received}")]
    InvalidLength {
        /// The length value from the header.
        length: u32,
        /// Bytes actually received.
        received: usize,
    },
}

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total frame size including header.
    pub length: u32,
    /// CRC32C checksum of (id + payload).
    pub checksum: u32,
    /// Target callback id.
    pub id: CallbackId,
}

impl FrameHeader {
    /// Serialize header into buffer (must be at least HEADER_SIZE bytes).
    pub fn serialize_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        buf[8..12].copy_from_slice(&self.id.get().to_le_bytes());
    }

    /// Deserialize header from buffer.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if buffer is smaller than HEADER_SIZE.
    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::InsufficientData {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }

        let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let checksum = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let id = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);

        Ok(Self {
            length,
            checksum,
            id: CallbackId::new(id),
        })
    }
}

fn compute_checksum(id: CallbackId, payload: &[u8]) -> u32 {
    let crc = crc32c::crc32c(&id.get().to_le_bytes());
    crc32c::crc32c_append(crc, payload)
}

/// Serialize a frame with the default payload limit.
///
/// # Examples
///
/// ```
/// use lockstep_core::CallbackId;
/// use lockstep_transport::{deserialize_frame, serialize_frame};
///
/// let frame = serialize_frame(CallbackId::new(2), b"args").expect("serialize");
/// let (id, payload) = deserialize_frame(&frame).expect("deserialize");
///
/// assert_eq!(id, CallbackId::new(2));
/// assert_eq!(payload, b"args");
/// ```
pub fn serialize_frame(id: CallbackId, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    serialize_frame_with_limit(id, payload, MAX_PAYLOAD_SIZE)
}

/// Serialize a frame, rejecting payloads larger than `max_payload_size`.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload exceeds the limit. Limits above
/// [`MAX_ENCODABLE_PAYLOAD`] are clamped to it.
pub fn serialize_frame_with_limit(
    id: CallbackId,
    payload: &[u8],
    max_payload_size: usize,
) -> Result<Vec<u8>, WireError> {
    let max = effective_limit(max_payload_size);
    if payload.len() > max {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }

    let total_length = HEADER_SIZE + payload.len();
    let length = u32::try_from(total_length).map_err(|_| WireError::PayloadTooLarge {
        size: payload.len(),
        max,
    })?;
    let mut data = vec![0u8; total_length];

    let header = FrameHeader {
        length,
        checksum: compute_checksum(id, payload),
        id,
    };

    header.serialize_into(&mut data[..HEADER_SIZE]);
    data[HEADER_SIZE..].copy_from_slice(payload);

    Ok(data)
}

fn effective_limit(max_payload_size: usize) -> usize {
    max_payload_size.min(MAX_ENCODABLE_PAYLOAD)
}

/// Deserialize a frame, validating length and checksum.
///
/// # Errors
///
/// - `InsufficientData`: Not enough bytes for a header
/// - `InvalidLength`: Length field disagrees with the received bytes
/// - `ChecksumMismatch`: Data was corrupted
pub fn deserialize_frame(data: &[u8]) -> Result<(CallbackId, &[u8]), WireError> {
    let (header, payload) = split_frame(data)?;

    let computed = compute_checksum(header.id, payload);
    if computed != header.checksum {
        return Err(WireError::ChecksumMismatch {
            expected: header.checksum,
            actual: computed,
        });
    }

    Ok((header.id, payload))
}

/// Deserialize a frame without checksum verification.
///
/// For transports that already guarantee integrity.
///
/// # Errors
///
/// Same as [`deserialize_frame`] minus `ChecksumMismatch`.
pub fn deserialize_frame_unverified(data: &[u8]) -> Result<(CallbackId, &[u8]), WireError> {
    let (header, payload) = split_frame(data)?;
    Ok((header.id, payload))
}

fn split_frame(data: &[u8]) -> Result<(FrameHeader, &[u8]), WireError> {
    let header = FrameHeader::deserialize(data)?;

    if header.length as usize != data.len() || (header.length as usize) < HEADER_SIZE {
        return Err(WireError::InvalidLength {
            length: header.length,
            received: data.len(),
        });
    }

    Ok((header, &data[HEADER_SIZE..]))
}
