//! Resource-aware linker: relocates delay/memory/LUT addresses across
//! effects sharing a pipeline, emitting the final instruction stream and a
//! running usage report.
//!
//! Grounded on `rectify_block_instr`/`rectify_block_sequence`/
//! `integrate_resource_report` in `original_source/verilator/sim_ctrl.cpp`:
//! each effect is relocated against the running context captured once,
//! *before* that effect's own instructions are touched (so every
//! instruction in the effect shares the same base); each effect's local
//! high-water mark of `res_addr + 1` is then folded into the running
//! context exactly once, after the whole effect has been relocated, rather
//! than bumping the context instruction-by-instruction mid-effect. Block
//! count is a plain running sum. Dynamic-delay buffers additionally have an
//! explicit allocation command (§6 `ALLOC_DELAY`), so their context bump
//! comes from the resource-request count rather than from scanning
//! instructions — see `DESIGN.md` for why the two resources are tracked
//! differently.

use crate::batch::TransferBatch;
use crate::config::HostConfig;
use crate::effect::{Effect, ResourceRequestKind};
use crate::error::Error;
use crate::instruction::{Instruction, ResourceOp};

/// Running (or per-block local) resource usage counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub blocks: u32,
    pub memory: u32,
    pub sdelay: u32,
    pub ddelay: u32,
    pub luts: u32,
}

/// Round `x` up to the nearest power of two (`x` itself if already one).
pub fn pow2_ceil(x: u32) -> u32 {
    if x <= 1 {
        1
    } else {
        x.next_power_of_two()
    }
}

/// Relocate a single instruction's `res_addr` against a fixed per-effect
/// base, returning the rewritten instruction and updating `local` (the
/// effect's own high-water marks, folded into the running context only
/// once the whole effect has been relocated — mirroring `ddelay_base`'s
/// one-shot capture).
fn relocate(
    instr: Instruction,
    local: &mut ResourceUsage,
    memory_base: u32,
    ddelay_base: u32,
    lut_base: u32,
    stock_luts: u32,
) -> Instruction {
    match instr {
        Instruction::Resource {
            opcode, res_addr, ..
        } => {
            let addr = res_addr as u32;
            let new_addr = match opcode {
                ResourceOp::DelayRead | ResourceOp::DelayWrite => addr + ddelay_base,
                ResourceOp::MemRead | ResourceOp::MemWrite => {
                    let relocated = addr + memory_base;
                    local.memory = local.memory.max(addr + 1);
                    relocated
                }
                ResourceOp::LutRead => {
                    if addr >= stock_luts {
                        let relocated = addr + lut_base;
                        local.luts = local.luts.max(addr - stock_luts + 1);
                        relocated
                    } else {
                        addr
                    }
                }
            };
            instr.with_res_addr(new_addr as u8)
        }
        arith => arith,
    }
}

/// Link a single effect into `batch` against the running `ctx`, emitting
/// resource allocations, instruction writes, and register writes in the
/// order specified by §4.6. `ctx` is updated in place.
pub fn link_effect(
    ctx: &mut ResourceUsage,
    effect: &Effect,
    host: &HostConfig,
    batch: &mut TransferBatch,
) -> Result<(), Error> {
    // 1. Resource requests: each DDELAY request allocates exactly one
    // buffer slot. The base for this effect's own DELAY_READ/WRITE
    // instructions is the context's ddelay count *before* these requests,
    // so that `res_addr=0` written by this effect maps onto the first
    // buffer it itself just requested.
    let ddelay_base = ctx.ddelay;
    for req in effect.resource_requests() {
        match req.kind {
            ResourceRequestKind::Ddelay => {
                let size = pow2_ceil(req.data);
                if size > u16::MAX as u32 {
                    return Err(Error::BadArgs(format!("delay size {size} too large for wire format")));
                }
                batch.alloc_delay(size as u16)?;
            }
        }
    }
    ctx.ddelay += effect.resource_requests().len() as u32;

    // 2. Instruction writes, absolute block index = ctx.blocks + i. The
    // memory/lut relocation base is fixed for the whole effect (the running
    // context *before* this effect started); each instruction's local usage
    // accumulates into `local` and is folded into `ctx` only once, after
    // every instruction in this effect has been relocated.
    let base_block = ctx.blocks;
    let memory_base = ctx.memory;
    let lut_base = ctx.luts;
    let mut local = ResourceUsage::default();
    for (i, block) in effect.blocks().iter().enumerate() {
        let absolute_index = base_block + i as u32;
        if absolute_index as usize >= host.max_blocks {
            return Err(Error::BadArgs(format!(
                "block index {absolute_index} exceeds pipeline capacity {}",
                host.max_blocks
            )));
        }
        let linked = relocate(
            block.instr,
            &mut local,
            memory_base,
            ddelay_base,
            lut_base,
            host.stock_luts as u32,
        );
        batch.write_block_instr(absolute_index as u16, linked.encode())?;
    }
    ctx.blocks += effect.blocks().len() as u32;
    ctx.memory += local.memory;
    ctx.luts += local.luts;

    // 3. Register writes, per bound register in register-index order.
    for (i, block) in effect.blocks().iter().enumerate() {
        let absolute_index = base_block + i as u32;
        for binding in block.reg_vals.iter().flatten() {
            let raw = effect.arena().eval(binding.expr, effect.params());
            let value = match binding.format {
                crate::effect::RegisterFormat::Literal => raw as i16,
                crate::effect::RegisterFormat::Shift(shift) => crate::fixed::to_q(raw, shift),
            };
            batch.write_block_reg(absolute_index as u16, binding.reg, value)?;
        }
    }

    Ok(())
}

/// Link a full sequence of effects sharing a pipeline, emitting a single
/// trailing `SWAP_PIPELINES` once all effects are written.
pub fn link_effects(
    effects: &[Effect],
    host: &HostConfig,
    batch: &mut TransferBatch,
) -> Result<ResourceUsage, Error> {
    let mut ctx = ResourceUsage::default();
    for effect in effects {
        link_effect(&mut ctx, effect, host, batch)?;
    }
    batch.swap_pipelines()?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Block;
    use crate::instruction::{ArithOp, Operand};
    use pretty_assertions::assert_eq;

    fn mem_block(res_addr: u8) -> Block {
        Block::new(Instruction::Resource {
            opcode: ResourceOp::MemRead,
            src_a: Operand::channel(0),
            src_b: Operand::channel(0),
            dest: 0,
            res_addr,
        })
    }

    #[test]
    fn pow2_ceil_exact_and_rounding() {
        assert_eq!(pow2_ceil(1), 1);
        assert_eq!(pow2_ceil(4), 4);
        assert_eq!(pow2_ceil(5), 8);
        assert_eq!(pow2_ceil(0), 1);
    }

    #[test]
    fn memory_relocation_offsets_second_effect() {
        let host = HostConfig::default();
        let mut batch = TransferBatch::new(&host);

        let mut e1 = Effect::new("biquad1");
        for addr in 0..4 {
            e1.add_block(mem_block(addr));
        }
        let mut e2 = Effect::new("biquad2");
        for addr in 0..4 {
            e2.add_block(mem_block(addr));
        }

        let usage = link_effects(&[e1, e2], &host, &mut batch).unwrap();
        assert_eq!(usage.blocks, 8);
        assert_eq!(usage.memory, 8);

        // Decode the stream and check the second effect's addresses are
        // offset by 4 relative to the first.
        let bytes = batch.as_bytes();
        let mut addrs = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == crate::wire::WRITE_BLOCK_INSTR {
                let word = u32::from_be_bytes(bytes[i + 2..i + 6].try_into().unwrap());
                if let Instruction::Resource { res_addr, .. } = Instruction::decode(word).unwrap() {
                    addrs.push(res_addr);
                }
                i += 6;
            } else {
                break;
            }
        }
        assert_eq!(addrs, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn blocks_counter_is_running_sum() {
        let host = HostConfig::default();
        let mut batch = TransferBatch::new(&host);
        let mut e1 = Effect::new("e1");
        e1.add_block(mem_block(0));
        let mut e2 = Effect::new("e2");
        e2.add_block(mem_block(0));
        e2.add_block(mem_block(1));
        let usage = link_effects(&[e1, e2], &host, &mut batch).unwrap();
        assert_eq!(usage.blocks, 3);
    }

    #[test]
    fn nop_block_is_not_relocated() {
        let host = HostConfig::default();
        let mut batch = TransferBatch::new(&host);
        let mut e = Effect::new("e");
        e.add_block(Block::new(Instruction::Arithmetic {
            opcode: ArithOp::Nop,
            src_a: Operand::channel(0),
            src_b: Operand::channel(0),
            src_c: Operand::channel(0),
            dest: 0,
            shift: 0,
            sat: false,
            no_shift: false,
        }));
        let usage = link_effects(&[e], &host, &mut batch).unwrap();
        assert_eq!(usage.memory, 0);
        assert_eq!(usage.ddelay, 0);
    }
}
