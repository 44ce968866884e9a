//! The 32-bit DSP instruction set: two mutually exclusive encodings
//! discriminated by bit 5 of the opcode, plus the opcode classifier.
//!
//! Bit layout (bit 0 is least significant):
//!
//! Format A (arithmetic/MAC/shift/compare), opcode bit 5 = 0:
//! `opcode[0..6) src_a+a_is_reg[6..11) src_b+b_is_reg[11..16)
//!  src_c+c_is_reg[16..21) dest[21..25) shift[25..30) sat[30] no_shift[31]`
//!
//! Format B (resource access), opcode bit 5 = 1:
//! `opcode[0..6) src_a+a_is_reg[6..11) src_b+b_is_reg[11..16) dest[16..20)
//!  res_addr[20..28)`

use crate::error::Error;

/// Format A opcodes: arithmetic, MAC family, shifts, comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ArithOp {
    /// True no-op; no channel is written.
    Nop = 0,
    /// `dest = sat_or_wrap(c + mul16(a, b))`.
    Madd = 1,
    /// Arithmetic right shift of `a` by `b` (immediate).
    Arsh = 2,
    /// Logical left shift of `a` by `b` (immediate).
    Lsh = 3,
    /// Logical right shift of `a` by `b` (immediate).
    Rsh = 4,
    /// `dest = |a|`.
    Abs = 5,
    /// `dest = min(a, b)`.
    Min = 6,
    /// `dest = max(a, b)`.
    Max = 7,
    /// `dest = clamp(a, lo=b, hi=c)`.
    Clamp = 8,
    /// Write the saturated 32-bit accumulator to `dest`.
    MovAcc = 9,
    /// Write the low 16 bits of the accumulator to `dest`.
    MovLacc = 10,
    /// Write the high 16 bits of the accumulator to `dest`.
    MovUacc = 11,
    /// `acc = mul(a, b)` (signed).
    Macz = 12,
    /// `acc = mul(a, b)` (unsigned operands).
    Umacz = 13,
    /// `acc = acc + mul(a, b)` (signed).
    Mac = 14,
    /// `acc = acc + mul(a, b)` (unsigned operands).
    Umac = 15,
}

impl ArithOp {
    fn from_u8(v: u8) -> Option<Self> {
        use ArithOp::*;
        Some(match v {
            0 => Nop,
            1 => Madd,
            2 => Arsh,
            3 => Lsh,
            4 => Rsh,
            5 => Abs,
            6 => Min,
            7 => Max,
            8 => Clamp,
            9 => MovAcc,
            10 => MovLacc,
            11 => MovUacc,
            12 => Macz,
            13 => Umacz,
            14 => Mac,
            15 => Umac,
            _ => return None,
        })
    }
}

/// Format B opcodes: resource access (LUT, delay line, scratch memory).
/// Discriminants carry bit 5 set, which is what makes these "Format B".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ResourceOp {
    /// Read a look-up table entry.
    LutRead = 0b10_0000,
    /// Read a delay line with fade-in gain applied.
    DelayRead = 0b10_0001,
    /// Write a sample into a delay line.
    DelayWrite = 0b10_0010,
    /// Read a scratch-memory word.
    MemRead = 0b10_0011,
    /// Write a scratch-memory word.
    MemWrite = 0b10_0100,
}

impl ResourceOp {
    fn from_u8(v: u8) -> Option<Self> {
        use ResourceOp::*;
        Some(match v {
            0b10_0000 => LutRead,
            0b10_0001 => DelayRead,
            0b10_0010 => DelayWrite,
            0b10_0011 => MemRead,
            0b10_0100 => MemWrite,
            _ => return None,
        })
    }
}

/// One source operand: either a channel-file index or a block-local
/// constant-register index, selected by `is_reg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Operand {
    /// Raw 4-bit index. Channel index (0..15) when `is_reg` is false,
    /// constant-register index (0..1) when true.
    pub index: u8,
    /// Whether this operand reads the block-local constant-register file.
    pub is_reg: bool,
}

impl Operand {
    /// A plain channel-file operand.
    pub const fn channel(index: u8) -> Self {
        Operand { index, is_reg: false }
    }

    /// A block-local constant-register operand (register 0 or 1).
    pub const fn register(index: u8) -> Self {
        Operand { index, is_reg: true }
    }

    fn pack(self) -> u32 {
        ((self.index & 0xF) as u32) | ((self.is_reg as u32) << 4)
    }

    fn unpack(field: u32) -> Self {
        Operand {
            index: (field & 0xF) as u8,
            is_reg: (field >> 4) & 1 != 0,
        }
    }
}

/// Block-local constant-register conventions the original hardware names;
/// callers are free to bind register 0/1 to anything, but these match the
/// zero/±1 bindings effects commonly need (e.g. S2's zero-register operand).
pub const ZERO_REGISTER: u8 = 0;
pub const POS_ONE_REGISTER: u8 = 1;

/// A decoded 32-bit instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Instruction {
    /// Format A: arithmetic/MAC/shift/compare.
    Arithmetic {
        opcode: ArithOp,
        src_a: Operand,
        src_b: Operand,
        src_c: Operand,
        dest: u8,
        shift: u8,
        sat: bool,
        no_shift: bool,
    },
    /// Format B: resource access.
    Resource {
        opcode: ResourceOp,
        src_a: Operand,
        src_b: Operand,
        dest: u8,
        res_addr: u8,
    },
}

/// The two mutually exclusive instruction encodings, discriminated by bit 5
/// of the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    A,
    B,
}

/// Classify a raw opcode byte by its format bit (bit 5).
pub fn format_of(opcode: u8) -> Format {
    if opcode & 0b10_0000 != 0 {
        Format::B
    } else {
        Format::A
    }
}

impl Instruction {
    /// The wire length of an encoded instruction word, in bytes.
    pub const LEN: usize = 4;

    /// This instruction's format.
    pub fn format(&self) -> Format {
        match self {
            Instruction::Arithmetic { .. } => Format::A,
            Instruction::Resource { .. } => Format::B,
        }
    }

    /// Encode to a 32-bit instruction word.
    pub fn encode(&self) -> u32 {
        match *self {
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
                let mut w = opcode as u32;
                w |= src_a.pack() << 6;
                w |= src_b.pack() << 11;
                w |= src_c.pack() << 16;
                w |= ((dest & 0xF) as u32) << 21;
                w |= ((shift & 0x1F) as u32) << 25;
                w |= (sat as u32) << 30;
                w |= (no_shift as u32) << 31;
                w
            }
            Instruction::Resource {
                opcode,
                src_a,
                src_b,
                dest,
                res_addr,
            } => {
                let mut w = opcode as u32;
                w |= src_a.pack() << 6;
                w |= src_b.pack() << 11;
                w |= ((dest & 0xF) as u32) << 16;
                w |= (res_addr as u32) << 20;
                w
            }
        }
    }

    /// Decode a 32-bit instruction word.
    ///
    /// Fails with [`Error::BadInstruction`] if the low 6 bits do not name a
    /// known opcode.
    pub fn decode(word: u32) -> Result<Self, Error> {
        let opcode_byte = (word & 0x3F) as u8;
        match format_of(opcode_byte) {
            Format::A => {
                let opcode = ArithOp::from_u8(opcode_byte)
                    .ok_or(Error::BadInstruction(opcode_byte))?;
                let src_a = Operand::unpack((word >> 6) & 0x1F);
                let src_b = Operand::unpack((word >> 11) & 0x1F);
                let src_c = Operand::unpack((word >> 16) & 0x1F);
                let dest = ((word >> 21) & 0xF) as u8;
                let shift = ((word >> 25) & 0x1F) as u8;
                let sat = (word >> 30) & 1 != 0;
                let no_shift = (word >> 31) & 1 != 0;
                Ok(Instruction::Arithmetic {
                    opcode,
                    src_a,
                    src_b,
                    src_c,
                    dest,
                    shift,
                    sat,
                    no_shift,
                })
            }
            Format::B => {
                let opcode = ResourceOp::from_u8(opcode_byte)
                    .ok_or(Error::BadInstruction(opcode_byte))?;
                let src_a = Operand::unpack((word >> 6) & 0x1F);
                let src_b = Operand::unpack((word >> 11) & 0x1F);
                let dest = ((word >> 16) & 0xF) as u8;
                let res_addr = ((word >> 20) & 0xFF) as u8;
                Ok(Instruction::Resource {
                    opcode,
                    src_a,
                    src_b,
                    dest,
                    res_addr,
                })
            }
        }
    }

    /// Mutate `res_addr` in place (used only by the linker; Format A
    /// instructions are returned unchanged).
    pub(crate) fn with_res_addr(mut self, new_addr: u8) -> Self {
        if let Instruction::Resource { res_addr, .. } = &mut self {
            *res_addr = new_addr;
        }
        self
    }
}

impl From<Instruction> for u32 {
    fn from(instr: Instruction) -> u32 {
        instr.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn sample_arith() -> Instruction {
        Instruction::Arithmetic {
            opcode: ArithOp::Madd,
            src_a: Operand::channel(3),
            src_b: Operand::register(1),
            src_c: Operand::channel(0),
            dest: 2,
            shift: 5,
            sat: true,
            no_shift: false,
        }
    }

    fn sample_resource() -> Instruction {
        Instruction::Resource {
            opcode: ResourceOp::DelayRead,
            src_a: Operand::channel(1),
            src_b: Operand::register(0),
            dest: 4,
            res_addr: 200,
        }
    }

    #[test]
    fn round_trip_arith() {
        let i = sample_arith();
        assert_eq!(Instruction::decode(i.encode()).unwrap(), i);
    }

    #[test]
    fn round_trip_resource() {
        let i = sample_resource();
        assert_eq!(Instruction::decode(i.encode()).unwrap(), i);
    }

    #[test]
    fn format_bit_matches() {
        assert_eq!(sample_arith().encode() & 0b10_0000, 0);
        assert_eq!(sample_resource().encode() & 0b10_0000, 0b10_0000);
    }

    #[test]
    fn bad_opcode_errors() {
        // opcode byte 16 is an unused Format-A slot.
        let word = 16u32;
        assert!(matches!(
            Instruction::decode(word),
            Err(Error::BadInstruction(16))
        ));
    }

    #[quickcheck]
    fn qc_round_trip_arith(
        src_a: u8,
        src_b: u8,
        src_c: u8,
        dest: u8,
        shift: u8,
        sat: bool,
        no_shift: bool,
        op: u8,
    ) -> bool {
        let Some(opcode) = ArithOp::from_u8(op % 16) else {
            return true;
        };
        let instr = Instruction::Arithmetic {
            opcode,
            src_a: Operand::unpack((src_a & 0x1F) as u32),
            src_b: Operand::unpack((src_b & 0x1F) as u32),
            src_c: Operand::unpack((src_c & 0x1F) as u32),
            dest: dest & 0xF,
            shift: shift & 0x1F,
            sat,
            no_shift,
        };
        let word = instr.encode();
        word & 0b10_0000 == 0 && Instruction::decode(word) == Ok(instr)
    }
}
