//! Dispatcher configuration.

use lockstep_transport::MAX_PAYLOAD_SIZE;

/// Configuration for a [`CollectiveDispatcher`](crate::CollectiveDispatcher).
///
/// Every rank of a group must use the same configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Largest encoded argument payload accepted by `call`.
    pub max_payload_size: usize,

    /// Verify the CRC32C checksum of every received frame.
    pub verify_checksums: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            verify_checksums: true,
        }
    }
}

impl DispatcherConfig {
    /// Limit encoded argument payloads to `max_payload_size` bytes.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Enable or disable checksum verification on receive.
    pub fn with_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }
}
