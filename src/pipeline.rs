//! Pipeline evaluator: per-sample execution of a decoded instruction array
//! against a channel file, accumulator, scratch memory, delay lines, and
//! stock/user look-up tables.

use std::collections::HashSet;
use std::f64::consts::PI;

use crate::config::HostConfig;
use crate::delay::DelayBuffer;
use crate::fixed::{mul16, mul32, mul32_unsigned, sum16_sat};
use crate::instruction::{ArithOp, Instruction, Operand, ResourceOp};

fn sat_abs(x: i16, sat: bool) -> i16 {
    let a = (x as i32).unsigned_abs() as i64;
    if sat {
        a.min(i16::MAX as i64) as i16
    } else {
        a as i16
    }
}

fn build_sine_table(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * PI * (i as f64) / (len as f64);
            crate::fixed::to_q15(phase.sin())
        })
        .collect()
}

fn build_tanh_table(len: usize) -> Vec<i16> {
    // Domain [-4, 4] covers the interesting range of tanh; values outside
    // saturate to +-1 anyway.
    (0..len)
        .map(|i| {
            let x = -4.0 + 8.0 * (i as f64) / (len as f64 - 1.0);
            crate::fixed::to_q15(x.tanh())
        })
        .collect()
}

/// One of the two independent instruction arrays plus state; only one
/// pipeline feeds the output at a time, except during a cross-fade.
#[derive(Debug, Clone)]
pub struct PipelineState {
    config: HostConfig,
    instructions: Vec<Instruction>,
    block_regs: Vec<[i16; 2]>,
    pending_updates: Vec<(usize, u8, i16)>,
    channels: Vec<i16>,
    accumulator: i32,
    scratch: Vec<i16>,
    delay_buffers: Vec<DelayBuffer>,
    stock_luts: Vec<Vec<i16>>,
    user_luts: Vec<Vec<i16>>,
    /// Highest-indexed instruction written; evaluation stops there.
    /// `-1` means the pipeline is empty (no instructions execute).
    last_block: i32,
    warned_opcodes: HashSet<u8>,
}

const DEFAULT_TABLE_LEN: usize = 256;

impl PipelineState {
    pub fn new(config: HostConfig) -> Self {
        let nop = Instruction::Arithmetic {
            opcode: ArithOp::Nop,
            src_a: Operand::channel(0),
            src_b: Operand::channel(0),
            src_c: Operand::channel(0),
            dest: 0,
            shift: 0,
            sat: false,
            no_shift: false,
        };
        PipelineState {
            instructions: vec![nop; config.max_blocks],
            block_regs: vec![[0, 0]; config.max_blocks],
            pending_updates: Vec::new(),
            channels: vec![0; config.channel_count],
            accumulator: 0,
            scratch: vec![0; config.scratch_words],
            delay_buffers: Vec::with_capacity(config.max_delay_buffers),
            stock_luts: vec![
                build_sine_table(DEFAULT_TABLE_LEN),
                build_tanh_table(DEFAULT_TABLE_LEN),
            ],
            user_luts: Vec::new(),
            last_block: -1,
            warned_opcodes: HashSet::new(),
            config,
        }
    }

    /// Write a decoded instruction at `index`, bumping `last_block`.
    pub fn write_block_instr(&mut self, index: usize, instr: Instruction) {
        self.instructions[index] = instr;
        self.last_block = self.last_block.max(index as i32);
    }

    /// Record that an encoded word at `index` failed to decode. Per §7, the
    /// evaluator treats this as NOP and the caller is expected to log a
    /// diagnostic once per distinct bad opcode byte (tracked here so
    /// repeated bad writes to the same opcode don't spam the log).
    pub fn note_bad_opcode(&mut self, index: usize, opcode_byte: u8) -> bool {
        self.instructions[index] = Instruction::Arithmetic {
            opcode: ArithOp::Nop,
            src_a: Operand::channel(0),
            src_b: Operand::channel(0),
            src_c: Operand::channel(0),
            dest: 0,
            shift: 0,
            sat: false,
            no_shift: false,
        };
        self.last_block = self.last_block.max(index as i32);
        self.warned_opcodes.insert(opcode_byte)
    }

    pub fn write_block_reg(&mut self, index: usize, reg: u8, value: i16) {
        self.block_regs[index][(reg & 1) as usize] = value;
    }

    /// Buffer a register update for [`Self::commit_reg_updates`].
    pub fn queue_reg_update(&mut self, index: usize, reg: u8, value: i16) {
        self.pending_updates.push((index, reg, value));
    }

    /// Atomically apply any buffered register updates.
    pub fn commit_reg_updates(&mut self) {
        for (index, reg, value) in self.pending_updates.drain(..) {
            self.block_regs[index][(reg & 1) as usize] = value;
        }
    }

    pub fn alloc_delay(&mut self, size: u32) {
        self.delay_buffers.push(DelayBuffer::new(size));
    }

    /// Register a user LUT's contents, growing the user LUT pool as needed.
    /// `index` is zero-based within the user LUT space (i.e. not offset by
    /// `stock_luts`).
    pub fn load_user_lut(&mut self, index: usize, table: Vec<i16>) {
        if self.user_luts.len() <= index {
            self.user_luts.resize(index + 1, Vec::new());
        }
        self.user_luts[index] = table;
    }

    /// Reset to the pipeline's initial (empty) state, per `RESET_PIPELINE`.
    pub fn reset(&mut self) {
        let config = self.config;
        *self = PipelineState::new(config);
    }

    pub fn last_block(&self) -> i32 {
        self.last_block
    }

    fn resolve(&self, op: Operand, block: usize) -> i16 {
        if op.is_reg {
            self.block_regs[block][(op.index & 1) as usize]
        } else {
            self.channels[(op.index as usize) % self.channels.len()]
        }
    }

    fn write_channel(&mut self, index: u8, value: i16) {
        let i = (index as usize) % self.channels.len();
        self.channels[i] = value;
    }

    fn lut_entry(&self, res_addr: u8, phase: i16) -> i16 {
        let table: &[i16] = if (res_addr as usize) < self.config.stock_luts {
            &self.stock_luts[res_addr as usize]
        } else {
            let user_idx = res_addr as usize - self.config.stock_luts;
            self.user_luts
                .get(user_idx)
                .map(|t| t.as_slice())
                .unwrap_or(&[])
        };
        if table.is_empty() {
            return 0;
        }
        let phase_u16 = phase as u16 as u32;
        let idx = (phase_u16 * table.len() as u32) >> 16;
        table[(idx as usize).min(table.len() - 1)]
    }

    /// Execute one sample: channel 0 is seeded with `input`, every written
    /// instruction from index 0 to `last_block` runs in order, and the
    /// final value of channel 0 is the pipeline's output.
    pub fn step(&mut self, input: i16) -> i16 {
        self.channels[0] = input;
        if self.last_block < 0 {
            return self.channels[0];
        }
        for block in 0..=(self.last_block as usize) {
            self.execute(block);
        }
        self.channels[0]
    }

    fn execute(&mut self, block: usize) {
        match self.instructions[block] {
            Instruction::Arithmetic {
                opcode,
                src_a,
                src_b,
                src_c,
                dest,
                shift,
                sat,
                no_shift,
            } => {
                let a = self.resolve(src_a, block);
                let b = self.resolve(src_b, block);
                let c = self.resolve(src_c, block);
                match opcode {
                    ArithOp::Nop => {}
                    ArithOp::Madd => {
                        let product = mul16(a, b, no_shift, shift, false);
                        let result = sum16_sat(c, product, sat);
                        self.write_channel(dest, result);
                    }
                    ArithOp::Arsh => {
                        // The shift amount is `src_b`'s raw operand index used as an
                        // immediate, not a value resolved through the register/channel file.
                        let amount = (src_b.index & 0xF) as u32;
                        self.write_channel(dest, (a >> amount.min(15)) as i16);
                    }
                    ArithOp::Lsh => {
                        let amount = (src_b.index & 0xF) as u32;
                        self.write_channel(dest, ((a as u16) << amount.min(15)) as i16);
                    }
                    ArithOp::Rsh => {
                        let amount = (src_b.index & 0xF) as u32;
                        self.write_channel(dest, ((a as u16) >> amount.min(15)) as i16);
                    }
                    ArithOp::Abs => {
                        self.write_channel(dest, sat_abs(a, sat));
                    }
                    ArithOp::Min => {
                        self.write_channel(dest, a.min(b));
                    }
                    ArithOp::Max => {
                        self.write_channel(dest, a.max(b));
                    }
                    ArithOp::Clamp => {
                        let lo = b.min(c);
                        let hi = b.max(c);
                        self.write_channel(dest, a.clamp(lo, hi));
                    }
                    ArithOp::MovAcc => {
                        let v = self.accumulator.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                        self.write_channel(dest, v);
                    }
                    ArithOp::MovLacc => {
                        self.write_channel(dest, (self.accumulator & 0xFFFF) as i16);
                    }
                    ArithOp::MovUacc => {
                        self.write_channel(dest, ((self.accumulator >> 16) & 0xFFFF) as i16);
                    }
                    ArithOp::Macz => {
                        self.accumulator = mul32(a, b, no_shift, shift);
                    }
                    ArithOp::Umacz => {
                        self.accumulator = mul32_unsigned(a, b, no_shift, shift);
                    }
                    ArithOp::Mac => {
                        self.accumulator = self
                            .accumulator
                            .wrapping_add(mul32(a, b, no_shift, shift));
                    }
                    ArithOp::Umac => {
                        self.accumulator = self
                            .accumulator
                            .wrapping_add(mul32_unsigned(a, b, no_shift, shift));
                    }
                }
            }
            Instruction::Resource {
                opcode,
                src_a,
                src_b: _,
                dest,
                res_addr,
            } => {
                let a = self.resolve(src_a, block);
                match opcode {
                    ResourceOp::LutRead => {
                        let v = self.lut_entry(res_addr, a);
                        self.write_channel(dest, v);
                    }
                    ResourceOp::DelayRead => {
                        if let Some(buf) = self.delay_buffers.get(res_addr as usize) {
                            let v = buf.read(a as u16 as u32);
                            self.write_channel(dest, v);
                        } else {
                            self.write_channel(dest, 0);
                        }
                    }
                    ResourceOp::DelayWrite => {
                        if let Some(buf) = self.delay_buffers.get_mut(res_addr as usize) {
                            buf.write(a);
                        }
                    }
                    ResourceOp::MemRead => {
                        let idx = (res_addr as usize) % self.scratch.len();
                        self.write_channel(dest, self.scratch[idx]);
                    }
                    ResourceOp::MemWrite => {
                        let idx = (res_addr as usize) % self.scratch.len();
                        self.scratch[idx] = a;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::ArithOp;

    fn madd(src_a: Operand, src_b: Operand, src_c: Operand, dest: u8, shift: u8, sat: bool) -> Instruction {
        Instruction::Arithmetic {
            opcode: ArithOp::Madd,
            src_a,
            src_b,
            src_c,
            dest,
            shift,
            sat,
            no_shift: false,
        }
    }

    #[test]
    fn empty_pipeline_passes_through() {
        let mut p = PipelineState::new(HostConfig::default());
        assert_eq!(p.step(1234), 1234);
        assert_eq!(p.step(-1), -1);
    }

    #[test]
    fn nop_passes_through() {
        let mut p = PipelineState::new(HostConfig::default());
        p.write_block_instr(
            0,
            Instruction::Arithmetic {
                opcode: ArithOp::Nop,
                src_a: Operand::channel(0),
                src_b: Operand::channel(0),
                src_c: Operand::channel(0),
                dest: 0,
                shift: 0,
                sat: false,
                no_shift: false,
            },
        );
        for s in [0i16, 16384, -16384, 32767, -32768] {
            assert_eq!(p.step(s), s);
        }
    }

    #[test]
    fn half_gain_madd() {
        let mut p = PipelineState::new(HostConfig::default());
        p.write_block_reg(0, 0, 16384);
        p.write_block_instr(
            0,
            madd(
                Operand::channel(0),
                Operand::register(0),
                Operand::register(1),
                0,
                0,
                true,
            ),
        );
        assert_eq!(p.step(32767), 16383);
        assert_eq!(p.step(-32768), -16384);
        assert_eq!(p.step(1000), 500);
    }

    #[test]
    fn delay_read_write_feedback() {
        let mut p = PipelineState::new(HostConfig::default());
        p.alloc_delay(4);
        // block 0: DELAY_READ offset 3, channel1
        p.write_block_instr(
            0,
            Instruction::Resource {
                opcode: ResourceOp::DelayRead,
                src_a: Operand::register(1), // 1 = POS_ONE constant-register, bound below
                src_b: Operand::channel(0),
                dest: 1,
                res_addr: 0,
            },
        );
        p.write_block_reg(0, 1, 3);
        // block 1: MADD channel0 = input + 0.5*channel1
        p.write_block_reg(1, 0, 16384);
        p.write_block_instr(
            1,
            madd(Operand::channel(0), Operand::register(0), Operand::channel(0), 0, 0, true),
        );
        // block 2: DELAY_WRITE channel0 into buffer 0
        p.write_block_instr(
            2,
            Instruction::Resource {
                opcode: ResourceOp::DelayWrite,
                src_a: Operand::channel(0),
                src_b: Operand::channel(0),
                dest: 0,
                res_addr: 0,
            },
        );
        let input = [10000i16, 0, 0, 0, 0, 0, 0, 0];
        let mut out = Vec::new();
        for s in input {
            out.push(p.step(s));
        }
        assert_eq!(&out[0..4], &[10000, 0, 0, 0]);
    }

    /// `src_b` on a shift opcode is an immediate shift amount taken from the
    /// raw operand index, never resolved through the register/channel file.
    #[test]
    fn arsh_uses_raw_operand_index_as_immediate() {
        let mut p = PipelineState::new(HostConfig::default());
        // block 0: channel 2 = min(reg0, reg1) = 0x7FF5, whose low nibble
        // (5) differs from the src_b operand index (2) used below, so a
        // regression back to resolving src_b through the channel file would
        // shift by 5 instead of 2.
        p.write_block_reg(0, 0, 0x7FF5);
        p.write_block_reg(0, 1, 0x7FF5);
        p.write_block_instr(
            0,
            Instruction::Arithmetic {
                opcode: ArithOp::Min,
                src_a: Operand::register(0),
                src_b: Operand::register(1),
                src_c: Operand::channel(0),
                dest: 2,
                shift: 0,
                sat: false,
                no_shift: false,
            },
        );
        p.write_block_instr(
            1,
            Instruction::Arithmetic {
                opcode: ArithOp::Arsh,
                src_a: Operand::channel(0),
                src_b: Operand::channel(2),
                src_c: Operand::channel(0),
                dest: 0,
                shift: 0,
                sat: false,
                no_shift: false,
            },
        );
        assert_eq!(p.step(4080), 4080 >> 2);
    }

    #[test]
    fn bad_opcode_warns_once_per_distinct_byte() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut p = PipelineState::new(HostConfig::default());
        assert!(p.note_bad_opcode(0, 63));
        assert!(!p.note_bad_opcode(0, 63));
        assert!(p.note_bad_opcode(1, 17));
    }
}
