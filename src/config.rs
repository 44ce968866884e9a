//! Host-side sizing configuration, threaded through constructors instead of
//! baked-in constants so the reference emulator can target non-default
//! hardware builds.

/// Sizing parameters for a single accelerator instance.
///
/// `HostConfig::default()` reproduces the fixed sizes assumed by §3/§6 of
/// the hardware's command contract: 2 stock LUTs, 32 delay buffers, 16
/// channels, 256 scratch words, 256 instruction slots per pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HostConfig {
    /// Number of built-in, read-only look-up tables (sine, tanh, ...).
    pub stock_luts: usize,
    /// Maximum number of delay buffers a single pipeline can hold.
    pub max_delay_buffers: usize,
    /// Number of channel-file registers available to the instruction set.
    pub channel_count: usize,
    /// Number of scratch-memory words available to MEM_READ/MEM_WRITE.
    pub scratch_words: usize,
    /// Maximum number of instruction slots (blocks) per pipeline.
    pub max_blocks: usize,
    /// Informational sample rate; the core never schedules against it.
    pub sample_rate_hz: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            stock_luts: 2,
            max_delay_buffers: 32,
            channel_count: 16,
            scratch_words: 256,
            max_blocks: 256,
            sample_rate_hz: 44_100,
        }
    }
}

impl HostConfig {
    /// Whether block numbers on the wire need a two-byte (wide) encoding.
    ///
    /// The reference configuration keeps `max_blocks <= 255` so block
    /// numbers fit one byte (§6); larger configurations prepend a high byte.
    pub fn wide_block_numbers(&self) -> bool {
        self.max_blocks > 255
    }
}
