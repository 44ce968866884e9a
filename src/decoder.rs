//! Command decoder (device side): a sequential state machine over the byte
//! stream, dispatching block-instruction writes, register writes/updates,
//! resource allocations, pipeline swaps, and gain changes.
//!
//! Every command is self-delimiting (its length is fixed by its opcode
//! byte), so the decoder never loses synchronisation: an unknown opcode
//! byte is reported and the next byte is simply interpreted as a fresh
//! command.

use crate::error::Error;
use crate::wire;

/// One fully-decoded command, ready to be applied to an [`crate::engine::Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `(block, raw instruction word)`. The word is decoded lazily by the
    /// engine so a bad opcode degrades to a logged NOP rather than
    /// aborting the whole stream.
    WriteBlockInstr(u16, u32),
    WriteBlockReg(u16, u8, i16),
    UpdateBlockReg(u16, u8, i16),
    CommitRegUpdates,
    AllocDelay(u16),
    SwapPipelines,
    ResetPipeline,
    SetInputGain(i16),
    SetOutputGain(i16),
}

#[derive(Debug, Clone)]
enum State {
    ExpectCommand,
    ExpectBlockHigh { cmd: u8 },
    ExpectBlockLow { cmd: u8, high: u8 },
    ExpectInstrWord { block: u16, bytes: Vec<u8> },
    ExpectRegHigh { cmd: u8 },
    ExpectRegLow { cmd: u8, high: u8 },
    ExpectReg { cmd: u8, block: u16 },
    ExpectRegVal { cmd: u8, block: u16, reg: u8, bytes: Vec<u8> },
    ExpectAllocSize { bytes: Vec<u8> },
    ExpectGain { cmd: u8, bytes: Vec<u8> },
}

/// Sequential, byte-at-a-time command decoder.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    state: State,
    wide_blocks: bool,
}

impl CommandDecoder {
    pub fn new(wide_blocks: bool) -> Self {
        CommandDecoder {
            state: State::ExpectCommand,
            wide_blocks,
        }
    }

    /// Feed one byte. Returns `Ok(Some(action))` when a command completes,
    /// `Ok(None)` while a command is still accumulating bytes, and
    /// `Err(UnknownCommand)` (non-fatal; the decoder resynchronises on the
    /// very next byte) when an opcode byte names no known command.
    pub fn push_byte(&mut self, byte: u8) -> Result<Option<Action>, Error> {
        match std::mem::replace(&mut self.state, State::ExpectCommand) {
            State::ExpectCommand => self.start_command(byte),
            State::ExpectBlockHigh { cmd } => {
                self.state = State::ExpectBlockLow { cmd, high: byte };
                Ok(None)
            }
            State::ExpectBlockLow { cmd, high } => {
                let block = u16::from_be_bytes([high, byte]);
                self.after_block(cmd, block)
            }
            State::ExpectInstrWord { block, mut bytes } => {
                bytes.push(byte);
                if bytes.len() == 4 {
                    let word = u32::from_be_bytes(bytes.try_into().unwrap());
                    self.state = State::ExpectCommand;
                    Ok(Some(Action::WriteBlockInstr(block, word)))
                } else {
                    self.state = State::ExpectInstrWord { block, bytes };
                    Ok(None)
                }
            }
            State::ExpectRegHigh { cmd } => {
                self.state = State::ExpectRegLow { cmd, high: byte };
                Ok(None)
            }
            State::ExpectRegLow { cmd, high } => {
                let block = u16::from_be_bytes([high, byte]);
                self.state = State::ExpectReg { cmd, block };
                Ok(None)
            }
            State::ExpectReg { cmd, block } => {
                self.state = State::ExpectRegVal {
                    cmd,
                    block,
                    reg: byte,
                    bytes: Vec::with_capacity(2),
                };
                Ok(None)
            }
            State::ExpectRegVal { cmd, block, reg, mut bytes } => {
                bytes.push(byte);
                if bytes.len() == 2 {
                    let value = i16::from_be_bytes(bytes.try_into().unwrap());
                    self.state = State::ExpectCommand;
                    let action = if cmd == wire::WRITE_BLOCK_REG {
                        Action::WriteBlockReg(block, reg, value)
                    } else {
                        Action::UpdateBlockReg(block, reg, value)
                    };
                    Ok(Some(action))
                } else {
                    self.state = State::ExpectRegVal { cmd, block, reg, bytes };
                    Ok(None)
                }
            }
            State::ExpectAllocSize { mut bytes } => {
                bytes.push(byte);
                if bytes.len() == 2 {
                    let size = u16::from_be_bytes(bytes.try_into().unwrap());
                    self.state = State::ExpectCommand;
                    Ok(Some(Action::AllocDelay(size)))
                } else {
                    self.state = State::ExpectAllocSize { bytes };
                    Ok(None)
                }
            }
            State::ExpectGain { cmd, mut bytes } => {
                bytes.push(byte);
                if bytes.len() == 2 {
                    let value = i16::from_be_bytes(bytes.try_into().unwrap());
                    self.state = State::ExpectCommand;
                    let action = if cmd == wire::SET_INPUT_GAIN {
                        Action::SetInputGain(value)
                    } else {
                        Action::SetOutputGain(value)
                    };
                    Ok(Some(action))
                } else {
                    self.state = State::ExpectGain { cmd, bytes };
                    Ok(None)
                }
            }
        }
    }

    fn start_command(&mut self, cmd: u8) -> Result<Option<Action>, Error> {
        match cmd {
            wire::WRITE_BLOCK_INSTR => {
                self.state = if self.wide_blocks {
                    State::ExpectBlockHigh { cmd }
                } else {
                    State::ExpectBlockLow { cmd, high: 0 }
                };
                Ok(None)
            }
            wire::WRITE_BLOCK_REG | wire::UPDATE_BLOCK_REG => {
                self.state = if self.wide_blocks {
                    State::ExpectRegHigh { cmd }
                } else {
                    State::ExpectRegLow { cmd, high: 0 }
                };
                Ok(None)
            }
            wire::COMMIT_REG_UPDATES => Ok(Some(Action::CommitRegUpdates)),
            wire::ALLOC_DELAY => {
                self.state = State::ExpectAllocSize { bytes: Vec::with_capacity(2) };
                Ok(None)
            }
            wire::SWAP_PIPELINES => Ok(Some(Action::SwapPipelines)),
            wire::RESET_PIPELINE => Ok(Some(Action::ResetPipeline)),
            wire::SET_INPUT_GAIN | wire::SET_OUTPUT_GAIN => {
                self.state = State::ExpectGain { cmd, bytes: Vec::with_capacity(2) };
                Ok(None)
            }
            other => {
                tracing::warn!(opcode = other, "unknown command byte");
                Err(Error::UnknownCommand(other))
            }
        }
    }

    fn after_block(&mut self, cmd: u8, block: u16) -> Result<Option<Action>, Error> {
        if cmd == wire::WRITE_BLOCK_INSTR {
            self.state = State::ExpectInstrWord { block, bytes: Vec::with_capacity(4) };
        } else {
            self.state = State::ExpectReg { cmd, block };
        }
        Ok(None)
    }

    /// Decode every command in `bytes` in order, stopping at the first
    /// `UnknownCommand` (the caller may choose to resynchronise and retry
    /// from the next byte; for a well-formed batch this never triggers).
    pub fn decode_all(wide_blocks: bool, bytes: &[u8]) -> Result<Vec<Action>, Error> {
        let mut decoder = CommandDecoder::new(wide_blocks);
        let mut actions = Vec::new();
        for &b in bytes {
            if let Some(action) = decoder.push_byte(b)? {
                actions.push(action);
            }
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::TransferBatch;
    use crate::config::HostConfig;

    #[test]
    fn round_trips_a_simple_batch() {
        let cfg = HostConfig::default();
        let mut batch = TransferBatch::new(&cfg);
        batch.alloc_delay(8192).unwrap();
        batch.write_block_instr(0, 0x1234_5678).unwrap();
        batch.write_block_reg(0, 0, 42).unwrap();
        batch.swap_pipelines().unwrap();

        let actions = CommandDecoder::decode_all(false, batch.as_bytes()).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::AllocDelay(8192),
                Action::WriteBlockInstr(0, 0x1234_5678),
                Action::WriteBlockReg(0, 0, 42),
                Action::SwapPipelines,
            ]
        );
    }

    #[test]
    fn unknown_command_errors_and_resyncs() {
        let mut decoder = CommandDecoder::new(false);
        assert!(decoder.push_byte(0xFF).is_err());
        // next byte starts a fresh command.
        assert_eq!(
            decoder.push_byte(wire::SWAP_PIPELINES).unwrap(),
            Some(Action::SwapPipelines)
        );
    }
}
