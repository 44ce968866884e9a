//! Effect description builder: a block sequence with per-block register
//! bindings, a parameter list, and resource requests.

use crate::error::Error;
use crate::expr::{ExprArena, ExprHandle};
use crate::instruction::Instruction;

/// `(display name, internal name, current value, min, max)`.
///
/// Parameters conceptually form a singly linked association list so that
/// expressions resolve by internal-name equality; [`ParameterList`] keeps
/// that lookup-by-name semantics with a `Vec` as the idiomatic backing
/// store (the list is small and append-only per effect).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    pub display_name: String,
    pub internal_name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl Parameter {
    pub fn new(
        display_name: impl Into<String>,
        internal_name: impl Into<String>,
        value: f64,
        min: f64,
        max: f64,
    ) -> Self {
        Parameter {
            display_name: display_name.into(),
            internal_name: internal_name.into(),
            value,
            min,
            max,
        }
    }
}

/// An append-only list of [`Parameter`]s, resolved by internal name.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterList {
    params: Vec<Parameter>,
}

impl ParameterList {
    pub fn new() -> Self {
        ParameterList { params: Vec::new() }
    }

    pub fn push(&mut self, param: Parameter) {
        self.params.push(param);
    }

    /// Current value of the named parameter, or `None` if unbound.
    pub fn value_of(&self, internal_name: &str) -> Option<f64> {
        self.params
            .iter()
            .find(|p| p.internal_name == internal_name)
            .map(|p| p.value)
    }

    pub fn get_mut(&mut self, internal_name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.internal_name == internal_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A block-register's Q-format: a legal shift in `[0, 15]`, or the special
/// sentinel meaning "write the integer value as-is".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterFormat {
    Shift(u8),
    Literal,
}

/// One register-value binding: `(register index, format, expression)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterBinding {
    pub reg: u8,
    pub format: RegisterFormat,
    pub expr: ExprHandle,
}

/// An instruction plus up to two register-value bindings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    pub instr: Instruction,
    pub reg_vals: [Option<RegisterBinding>; 2],
}

impl Block {
    pub fn new(instr: Instruction) -> Self {
        Block {
            instr,
            reg_vals: [None, None],
        }
    }
}

/// A resource request kind. Currently only dynamic delay buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceRequestKind {
    /// Dynamic delay buffer; `data` is the requested size in samples (must
    /// be rounded to a power of two by the linker).
    Ddelay,
}

/// `(type, data)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceRequest {
    pub kind: ResourceRequestKind,
    pub data: u32,
}

/// Ordered sequence of blocks, a parameter list, and a set of resource
/// requests: the unit the linker relocates and the batch builder emits.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Effect {
    pub name: String,
    blocks: Vec<Block>,
    params: ParameterList,
    resource_requests: Vec<ResourceRequest>,
    arena: ExprArena,
}

impl Effect {
    pub fn new(name: impl Into<String>) -> Self {
        Effect {
            name: name.into(),
            blocks: Vec::new(),
            params: ParameterList::new(),
            resource_requests: Vec::new(),
            arena: ExprArena::new(),
        }
    }

    /// Append a block; its position becomes its effect-local index.
    pub fn add_block(&mut self, block: Block) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Append a parameter; subsequent expressions may reference it by
    /// internal name.
    pub fn add_param(&mut self, param: Parameter) {
        self.params.push(param);
    }

    /// Append a resource request; emitted before instructions at link time.
    pub fn add_resource_request(&mut self, req: ResourceRequest) {
        self.resource_requests.push(req);
    }

    /// Parse `expr_string` and bind it to `(block_idx, reg)`.
    pub fn add_register_val(
        &mut self,
        block_idx: usize,
        reg: u8,
        format: RegisterFormat,
        expr_string: &str,
    ) -> Result<(), Error> {
        if reg > 1 {
            return Err(Error::BadArgs(format!("register index out of range: {reg}")));
        }
        let block = self
            .blocks
            .get_mut(block_idx)
            .ok_or_else(|| Error::BadArgs(format!("block index out of range: {block_idx}")))?;
        let expr = self.arena.parse(expr_string)?;
        block.reg_vals[reg as usize] = Some(RegisterBinding { reg, format, expr });
        Ok(())
    }

    /// Bind `(block_idx, reg)` to a literal integer value.
    pub fn add_register_val_literal(
        &mut self,
        block_idx: usize,
        reg: u8,
        value: i16,
    ) -> Result<(), Error> {
        if reg > 1 {
            return Err(Error::BadArgs(format!("register index out of range: {reg}")));
        }
        if block_idx >= self.blocks.len() {
            return Err(Error::BadArgs(format!("block index out of range: {block_idx}")));
        }
        // Stash the literal as a constant-int node in the shared arena so
        // evaluation is uniform regardless of binding kind.
        let handle = self.arena.push_const_int(value as i64);
        let block = &mut self.blocks[block_idx];
        block.reg_vals[reg as usize] = Some(RegisterBinding {
            reg,
            format: RegisterFormat::Literal,
            expr: handle,
        });
        Ok(())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn params(&self) -> &ParameterList {
        &self.params
    }

    pub fn resource_requests(&self) -> &[ResourceRequest] {
        &self.resource_requests
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{ArithOp, Operand};

    fn nop_block() -> Block {
        Block::new(Instruction::Arithmetic {
            opcode: ArithOp::Nop,
            src_a: Operand::channel(0),
            src_b: Operand::channel(0),
            src_c: Operand::channel(0),
            dest: 0,
            shift: 0,
            sat: false,
            no_shift: false,
        })
    }

    #[test]
    fn add_block_returns_index() {
        let mut e = Effect::new("test");
        assert_eq!(e.add_block(nop_block()), 0);
        assert_eq!(e.add_block(nop_block()), 1);
    }

    #[test]
    fn register_val_out_of_range_errors() {
        let mut e = Effect::new("test");
        e.add_block(nop_block());
        assert!(e.add_register_val(5, 0, RegisterFormat::Literal, "0").is_err());
        assert!(e
            .add_register_val_literal(0, 7, 0)
            .is_err());
    }

    #[test]
    fn register_val_binds_expression() {
        let mut e = Effect::new("test");
        e.add_block(nop_block());
        e.add_register_val(0, 0, RegisterFormat::Shift(3), "+ 1 2").unwrap();
        let block = &e.blocks()[0];
        let binding = block.reg_vals[0].as_ref().unwrap();
        assert_eq!(e.arena().eval(binding.expr, e.params()), 3.0);
    }
}
