//! Transfer-batch builder: an append-only byte buffer with typed writers
//! for the command formats of the wire protocol.
//!
//! `Vec<u8>` already grows by amortised doubling, so the low-level
//! appenders lean on that directly rather than hand-rolling the original's
//! manual capacity/realloc bookkeeping — the observable growth strategy is
//! the same, the allocator just does it.

use crate::config::HostConfig;
use crate::error::Error;
use crate::wire;

/// Growable byte buffer carrying a serialised command stream.
///
/// Every high-level writer guarantees that either the entire command is
/// appended or none of it: composers build the command payload into a
/// scratch `Vec` first and only extend `self.bytes` once it is complete.
#[derive(Debug, Clone, Default)]
pub struct TransferBatch {
    bytes: Vec<u8>,
    wide_blocks: bool,
}

impl TransferBatch {
    pub fn new(config: &HostConfig) -> Self {
        TransferBatch {
            bytes: Vec::new(),
            wide_blocks: config.wide_block_numbers(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn append_u8(&mut self, v: u8) -> Result<(), Error> {
        self.bytes.push(v);
        Ok(())
    }

    pub fn append_u16_be(&mut self, v: u16) -> Result<(), Error> {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    pub fn append_u32_be(&mut self, v: u32) -> Result<(), Error> {
        self.bytes.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    fn append_block_number(&mut self, block: u16) -> Result<(), Error> {
        if self.wide_blocks {
            self.append_u16_be(block)
        } else {
            if block > u8::MAX as u16 {
                return Err(Error::BadArgs(format!(
                    "block number {block} does not fit in one byte"
                )));
            }
            self.append_u8(block as u8)
        }
    }

    pub fn write_block_instr(&mut self, block: u16, instr: u32) -> Result<(), Error> {
        let mut scratch = Vec::new();
        scratch.push(wire::WRITE_BLOCK_INSTR);
        self.encode_block_and_word(&mut scratch, block, instr)?;
        self.bytes.extend_from_slice(&scratch);
        Ok(())
    }

    fn encode_block_and_word(
        &self,
        scratch: &mut Vec<u8>,
        block: u16,
        word: u32,
    ) -> Result<(), Error> {
        if self.wide_blocks {
            scratch.extend_from_slice(&block.to_be_bytes());
        } else {
            if block > u8::MAX as u16 {
                return Err(Error::BadArgs(format!(
                    "block number {block} does not fit in one byte"
                )));
            }
            scratch.push(block as u8);
        }
        scratch.extend_from_slice(&word.to_be_bytes());
        Ok(())
    }

    fn write_reg_command(
        &mut self,
        opcode: u8,
        block: u16,
        reg: u8,
        value: i16,
    ) -> Result<(), Error> {
        let mut scratch = Vec::new();
        scratch.push(opcode);
        if self.wide_blocks {
            scratch.extend_from_slice(&block.to_be_bytes());
        } else {
            if block > u8::MAX as u16 {
                return Err(Error::BadArgs(format!(
                    "block number {block} does not fit in one byte"
                )));
            }
            scratch.push(block as u8);
        }
        scratch.push(reg);
        scratch.extend_from_slice(&value.to_be_bytes());
        self.bytes.extend_from_slice(&scratch);
        Ok(())
    }

    pub fn write_block_reg(&mut self, block: u16, reg: u8, value: i16) -> Result<(), Error> {
        self.write_reg_command(wire::WRITE_BLOCK_REG, block, reg, value)
    }

    pub fn update_block_reg(&mut self, block: u16, reg: u8, value: i16) -> Result<(), Error> {
        self.write_reg_command(wire::UPDATE_BLOCK_REG, block, reg, value)
    }

    pub fn commit_reg_updates(&mut self) -> Result<(), Error> {
        self.append_u8(wire::COMMIT_REG_UPDATES)
    }

    pub fn alloc_delay(&mut self, size: u16) -> Result<(), Error> {
        let mut scratch = Vec::new();
        scratch.push(wire::ALLOC_DELAY);
        scratch.extend_from_slice(&size.to_be_bytes());
        self.bytes.extend_from_slice(&scratch);
        Ok(())
    }

    pub fn swap_pipelines(&mut self) -> Result<(), Error> {
        self.append_u8(wire::SWAP_PIPELINES)
    }

    pub fn reset_pipeline(&mut self) -> Result<(), Error> {
        self.append_u8(wire::RESET_PIPELINE)
    }

    pub fn set_input_gain(&mut self, q10_5: i16) -> Result<(), Error> {
        let mut scratch = Vec::new();
        scratch.push(wire::SET_INPUT_GAIN);
        scratch.extend_from_slice(&q10_5.to_be_bytes());
        self.bytes.extend_from_slice(&scratch);
        Ok(())
    }

    pub fn set_output_gain(&mut self, q10_5: i16) -> Result<(), Error> {
        let mut scratch = Vec::new();
        scratch.push(wire::SET_OUTPUT_GAIN);
        scratch.extend_from_slice(&q10_5.to_be_bytes());
        self.bytes.extend_from_slice(&scratch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_block_instr_layout() {
        let cfg = HostConfig::default();
        let mut b = TransferBatch::new(&cfg);
        b.write_block_instr(3, 0xDEAD_BEEF).unwrap();
        assert_eq!(
            b.as_bytes(),
            &[wire::WRITE_BLOCK_INSTR, 3, 0xDE, 0xAD, 0xBE, 0xEF]
        );
    }

    #[test]
    fn alloc_delay_layout() {
        let cfg = HostConfig::default();
        let mut b = TransferBatch::new(&cfg);
        b.alloc_delay(8192).unwrap();
        assert_eq!(b.as_bytes(), &[wire::ALLOC_DELAY, 0x20, 0x00]);
    }

    #[test]
    fn wide_blocks_use_two_bytes() {
        let cfg = HostConfig {
            max_blocks: 1000,
            ..HostConfig::default()
        };
        let mut b = TransferBatch::new(&cfg);
        b.write_block_instr(300, 0).unwrap();
        assert_eq!(b.as_bytes()[0], wire::WRITE_BLOCK_INSTR);
        assert_eq!(&b.as_bytes()[1..3], &300u16.to_be_bytes());
    }
}
