//! Wire opcode bytes shared by the transfer-batch builder (encoder side)
//! and the command decoder (decoder side), so the two halves of the
//! protocol cannot drift apart.

pub const WRITE_BLOCK_INSTR: u8 = 0b1001_0000;
pub const WRITE_BLOCK_REG: u8 = 0b1110_0000;
pub const UPDATE_BLOCK_REG: u8 = 0b1110_1000;
pub const COMMIT_REG_UPDATES: u8 = 0b0000_1010;
pub const ALLOC_DELAY: u8 = 0b0010_0000;
pub const SWAP_PIPELINES: u8 = 0b0000_0001;
pub const RESET_PIPELINE: u8 = 0b0000_1001;
pub const SET_INPUT_GAIN: u8 = 0b0000_0010;
pub const SET_OUTPUT_GAIN: u8 = 0b0000_0011;
