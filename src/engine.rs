//! Engine orchestrator: holds two pipelines, cross-fades output gain on
//! swap, applies input/output gain, and exposes a single sample step.

use tracing::warn;

use crate::config::HostConfig;
use crate::decoder::Action;
use crate::error::Error;
use crate::fixed::{mul16, sum16_sat};
use crate::instruction::Instruction;
use crate::pipeline::PipelineState;

/// Per-pipeline cross-fade weight step, in 1/16384ths (64-unit steps per
/// §4.10, out of a full-scale weight of `1 << 14`).
const FADE_STEP: i32 = 64;
const FADE_FULL: i32 = 1 << 14;

/// Two pipelines, the currently active index, cross-fade state, and the
/// engine-global input/output gain.
#[derive(Debug, Clone)]
pub struct Engine {
    config: HostConfig,
    pipelines: [PipelineState; 2],
    current: usize,
    enabled: [bool; 2],
    swap_in_progress: bool,
    /// Cross-fade weight of `pipelines[0]`, `pipelines[1]` respectively,
    /// each in `[0, FADE_FULL]`.
    weight: [i32; 2],
    input_gain: i16,
    output_gain: i16,
}

/// Right-shift amount for applying a Q10.5 gain word, chosen so the
/// documented default `0x0400 = 0.5` (§8 S1) round-trips exactly: treating
/// the 16-bit gain word as scaled by `2^11` rather than `2^10` is what
/// makes `1024 / 2048 == 0.5`. See `DESIGN.md` for the full resolution of
/// this labeling ambiguity in §6.
const GAIN_SHIFT: u8 = 4;

impl Engine {
    pub fn new(config: HostConfig) -> Self {
        let default_gain = 0x0400i16;
        Engine {
            pipelines: [PipelineState::new(config), PipelineState::new(config)],
            current: 0,
            enabled: [true, false],
            swap_in_progress: false,
            weight: [FADE_FULL, 0],
            input_gain: default_gain,
            output_gain: default_gain,
            config,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    fn inactive(&self) -> usize {
        1 - self.current
    }

    /// Apply one fully-decoded command, per the routing rules of §4.7.
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::WriteBlockInstr(block, word) => {
                let target = self.inactive();
                match Instruction::decode(word) {
                    Ok(instr) => self.pipelines[target].write_block_instr(block as usize, instr),
                    Err(Error::BadInstruction(opcode)) => {
                        if self.pipelines[target].note_bad_opcode(block as usize, opcode) {
                            warn!(opcode, block, "unknown opcode in WRITE_BLOCK_INSTR, executing as NOP");
                        }
                    }
                    Err(_) => {}
                }
            }
            Action::WriteBlockReg(block, reg, value) => {
                let target = self.inactive();
                self.pipelines[target].write_block_reg(block as usize, reg, value);
            }
            Action::UpdateBlockReg(block, reg, value) => {
                let target = self.current;
                self.pipelines[target].queue_reg_update(block as usize, reg, value);
            }
            Action::CommitRegUpdates => {
                self.pipelines[self.current].commit_reg_updates();
            }
            Action::AllocDelay(size) => {
                let target = self.inactive();
                self.pipelines[target].alloc_delay(size as u32);
            }
            Action::SwapPipelines => {
                self.swap_in_progress = true;
                self.enabled[self.inactive()] = true;
            }
            Action::ResetPipeline => {
                let target = self.inactive();
                self.pipelines[target].reset();
            }
            Action::SetInputGain(v) => self.input_gain = v,
            Action::SetOutputGain(v) => self.output_gain = v,
        }
    }

    /// Apply a full decoded batch in order.
    pub fn apply_all(&mut self, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            self.apply(action);
        }
    }

    /// Run one sample: scale by input gain, run each enabled pipeline,
    /// cross-fade mix, advance the swap state machine, scale by output
    /// gain.
    pub fn step(&mut self, input: i16) -> i16 {
        let scaled_in = mul16(input, self.input_gain, false, GAIN_SHIFT, true);

        let out0 = if self.enabled[0] {
            self.pipelines[0].step(scaled_in)
        } else {
            0
        };
        let out1 = if self.enabled[1] {
            self.pipelines[1].step(scaled_in)
        } else {
            0
        };

        let gain_a = q14_to_i16(self.weight[0]);
        let gain_b = q14_to_i16(self.weight[1]);
        let mixed_a = mul16(out0, gain_a, false, 1, true);
        let mixed_b = mul16(out1, gain_b, false, 1, true);
        let mixed = sum16_sat(mixed_a, mixed_b, true);

        if self.swap_in_progress {
            let src = self.current;
            let dst = self.inactive();
            self.weight[src] = (self.weight[src] - FADE_STEP).max(0);
            self.weight[dst] = (self.weight[dst] + FADE_STEP).min(FADE_FULL);
            if self.weight[src] == 0 {
                self.enabled[src] = false;
                self.current = dst;
                self.swap_in_progress = false;
            }
        }

        mul16(mixed, self.output_gain, false, GAIN_SHIFT, true)
    }
}

fn q14_to_i16(weight: i32) -> i16 {
    weight.clamp(0, FADE_FULL) as i16
}
