//! RISC-V 64 binary code emission.

use super::inst::{AluImmOp, AluOp, AmoOp, BrOp, FpuOp, Inst, LoadOp, StoreOp};
use crate::machinst::{CodeBuffer, FixupKind};
use crate::reg::Reg;

fn x(r: Reg) -> u32 {
    debug_assert!(r.is_real());
    (r.hw_enc() & 31) as u32
}

fn enc_r(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn enc_i(imm12: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    (((imm12 as u32) & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

fn enc_s(imm12: i32, rs2: u32, rs1: u32, funct3: u32, opcode: u32) -> u32 {
    let imm = (imm12 as u32) & 0xfff;
    ((imm >> 5) << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | ((imm & 0x1f) << 7) | opcode
}

/// Encode one instruction. Branch/JAL displacements are filled by the
/// label fixup pass.
pub fn emit(inst: &Inst, buf: &mut CodeBuffer) {
    match *inst {
        Inst::AluRRR { op, rd, rs1, rs2 } => {
            let (funct7, funct3) = match op {
                AluOp::Add => (0b0000000, 0b000),
                AluOp::Sub => (0b0100000, 0b000),
                AluOp::Sll => (0b0000000, 0b001),
                AluOp::Slt => (0b0000000, 0b010),
                AluOp::Sltu => (0b0000000, 0b011),
                AluOp::Xor => (0b0000000, 0b100),
                AluOp::Srl => (0b0000000, 0b101),
                AluOp::Sra => (0b0100000, 0b101),
                AluOp::Or => (0b0000000, 0b110),
                AluOp::And => (0b0000000, 0b111),
                AluOp::Mul => (0b0000001, 0b000),
                AluOp::Mulhu => (0b0000001, 0b011),
                AluOp::Div => (0b0000001, 0b100),
                AluOp::Divu => (0b0000001, 0b101),
                AluOp::Rem => (0b0000001, 0b110),
                AluOp::Remu => (0b0000001, 0b111),
            };
            buf.put4(enc_r(funct7, x(rs2), x(rs1), funct3, x(rd.to_reg()), 0x33));
        }

        Inst::AluRRImm { op, rd, rs1, imm12 } => {
            let word = match op {
                AluImmOp::Addi => enc_i(imm12 as i32, x(rs1), 0b000, x(rd.to_reg()), 0x13),
                AluImmOp::Addiw => enc_i(imm12 as i32, x(rs1), 0b000, x(rd.to_reg()), 0x1b),
                AluImmOp::Sltiu => enc_i(imm12 as i32, x(rs1), 0b011, x(rd.to_reg()), 0x13),
                AluImmOp::Andi => enc_i(imm12 as i32, x(rs1), 0b111, x(rd.to_reg()), 0x13),
                AluImmOp::Ori => enc_i(imm12 as i32, x(rs1), 0b110, x(rd.to_reg()), 0x13),
                AluImmOp::Xori => enc_i(imm12 as i32, x(rs1), 0b100, x(rd.to_reg()), 0x13),
                AluImmOp::Slli => enc_i(imm12 as i32, x(rs1), 0b001, x(rd.to_reg()), 0x13),
                AluImmOp::Srli => enc_i(imm12 as i32, x(rs1), 0b101, x(rd.to_reg()), 0x13),
                AluImmOp::Srai => {
                    enc_i((imm12 as i32) | 0x400, x(rs1), 0b101, x(rd.to_reg()), 0x13)
                }
            };
            buf.put4(word);
        }

        Inst::Lui { rd, imm20 } => {
            buf.put4((((imm20 as u32) & 0xfffff) << 12) | (x(rd.to_reg()) << 7) | 0x37);
        }

        Inst::Mv { rd, rs } => {
            buf.put4(enc_i(0, x(rs), 0b000, x(rd.to_reg()), 0x13));
        }

        Inst::Load { op, rd, base, offset } => {
            let funct3 = match op {
                LoadOp::Lb => 0b000,
                LoadOp::Lh => 0b001,
                LoadOp::Lw => 0b010,
                LoadOp::Ld => 0b011,
                LoadOp::Lbu => 0b100,
                LoadOp::Lhu => 0b101,
                LoadOp::Lwu => 0b110,
            };
            buf.put4(enc_i(offset as i32, x(base), funct3, x(rd.to_reg()), 0x03));
        }

        Inst::Store { op, src, base, offset } => {
            let funct3 = match op {
                StoreOp::Sb => 0b000,
                StoreOp::Sh => 0b001,
                StoreOp::Sw => 0b010,
                StoreOp::Sd => 0b011,
            };
            buf.put4(enc_s(offset as i32, x(src), x(base), funct3, 0x23));
        }

        Inst::Branch { op, rs1, rs2, target } => {
            let funct3 = match op {
                BrOp::Beq => 0b000,
                BrOp::Bne => 0b001,
                BrOp::Blt => 0b100,
                BrOp::Bge => 0b101,
                BrOp::Bltu => 0b110,
                BrOp::Bgeu => 0b111,
            };
            buf.put4((x(rs2) << 20) | (x(rs1) << 15) | (funct3 << 12) | 0x63);
            buf.use_label(target, FixupKind::RvBranch12);
        }

        Inst::Jal { rd, target } => {
            buf.put4((x(rd.to_reg()) << 7) | 0x6f);
            buf.use_label(target, FixupKind::RvJal20);
        }

        Inst::Jalr { rd, base, offset } => {
            buf.put4(enc_i(offset as i32, x(base), 0b000, x(rd.to_reg()), 0x67));
        }

        Inst::LabelDef { label } => buf.bind_label(label),

        Inst::LoadReserved { is64, rd, addr } => {
            let funct3 = if is64 { 0b011 } else { 0b010 };
            // aq|rl set.
            buf.put4(enc_r(0b0001011, 0, x(addr), funct3, x(rd.to_reg()), 0x2f));
        }
        Inst::StoreConditional { is64, rd, src, addr } => {
            let funct3 = if is64 { 0b011 } else { 0b010 };
            buf.put4(enc_r(0b0001111, x(src), x(addr), funct3, x(rd.to_reg()), 0x2f));
        }
        Inst::Amo { op, is64, rd, src, addr } => {
            let funct3 = if is64 { 0b011 } else { 0b010 };
            let funct5 = match op {
                AmoOp::Add => 0b00000,
                AmoOp::Swap => 0b00001,
                AmoOp::Xor => 0b00100,
                AmoOp::And => 0b01100,
                AmoOp::Or => 0b01000,
            };
            buf.put4(enc_r(
                (funct5 << 2) | 0b11,
                x(src),
                x(addr),
                funct3,
                x(rd.to_reg()),
                0x2f,
            ));
        }

        Inst::FpuRRR { op, bits, rd, rs1, rs2 } => {
            let fmt = if bits == 64 { 1 } else { 0 };
            let funct7 = match op {
                FpuOp::Add => 0b0000000 | fmt,
                FpuOp::Sub => 0b0000100 | fmt,
                FpuOp::Mul => 0b0001000 | fmt,
                FpuOp::Div => 0b0001100 | fmt,
            };
            // Dynamic rounding mode.
            buf.put4(enc_r(funct7, x(rs2), x(rs1), 0b111, x(rd.to_reg()), 0x53));
        }

        Inst::FpuMv { bits, rd, rs } => {
            // FSGNJ rd, rs, rs.
            let funct7 = if bits == 64 { 0b0010001 } else { 0b0010000 };
            buf.put4(enc_r(funct7, x(rs), x(rs), 0b000, x(rd.to_reg()), 0x53));
        }
        Inst::FpuMvToX { bits, rd, rs } => {
            let funct7 = if bits == 64 { 0b1110001 } else { 0b1110000 };
            buf.put4(enc_r(funct7, 0, x(rs), 0b000, x(rd.to_reg()), 0x53));
        }
        Inst::FpuMvFromX { bits, rd, rs } => {
            let funct7 = if bits == 64 { 0b1111001 } else { 0b1111000 };
            buf.put4(enc_r(funct7, 0, x(rs), 0b000, x(rd.to_reg()), 0x53));
        }
        Inst::IntToFpu { int_bits, f_bits, rd, rs } => {
            let funct7 = if f_bits == 64 { 0b1101001 } else { 0b1101000 };
            let rs2 = if int_bits == 64 { 0b00010 } else { 0b00000 };
            buf.put4(enc_r(funct7, rs2, x(rs), 0b111, x(rd.to_reg()), 0x53));
        }
        Inst::FpuToInt { f_bits, int_bits, rtz, rd, rs } => {
            let funct7 = if f_bits == 64 { 0b1100001 } else { 0b1100000 };
            let rs2 = if int_bits == 64 { 0b00010 } else { 0b00000 };
            let rm = if rtz { 0b001 } else { 0b000 };
            buf.put4(enc_r(funct7, rs2, x(rs), rm, x(rd.to_reg()), 0x53));
        }
        Inst::FpuCvt { from_bits, to_bits: _, rd, rs } => {
            // fcvt.d.s or fcvt.s.d.
            let (funct7, rs2) = if from_bits == 32 {
                (0b0100001, 0b00000)
            } else {
                (0b0100000, 0b00001)
            };
            buf.put4(enc_r(funct7, rs2, x(rs), 0b111, x(rd.to_reg()), 0x53));
        }

        Inst::Ebreak => buf.put4(0x0010_0073),
    }
}

#[cfg(test)]
mod emit_tests {
    use super::super::inst::*;
    use super::super::regs::*;
    use super::emit;
    use crate::machinst::CodeBuffer;

    #[test]
    fn riscv64_binemit() {
        let cases: Vec<(Inst, u32, &str)> = vec![
            (
                Inst::AluRRR {
                    op: AluOp::Add,
                    rd: writable_xreg(10),
                    rs1: xreg(11),
                    rs2: xreg(12),
                },
                0x00c5_8533,
                "add a0, a1, a2",
            ),
            (
                Inst::AluRRR {
                    op: AluOp::Sub,
                    rd: writable_xreg(10),
                    rs1: xreg(11),
                    rs2: xreg(12),
                },
                0x40c5_8533,
                "sub a0, a1, a2",
            ),
            (
                Inst::AluRRR {
                    op: AluOp::Sltu,
                    rd: writable_xreg(5),
                    rs1: xreg(6),
                    rs2: xreg(7),
                },
                0x0073_32b3,
                "sltu t0, t1, t2",
            ),
            (
                Inst::AluRRR {
                    op: AluOp::Mul,
                    rd: writable_xreg(10),
                    rs1: xreg(11),
                    rs2: xreg(12),
                },
                0x02c5_8533,
                "mul a0, a1, a2",
            ),
            (
                Inst::AluRRImm {
                    op: AluImmOp::Addi,
                    rd: writable_xreg(10),
                    rs1: xreg(2),
                    imm12: -32,
                },
                0xfe01_0513,
                "addi a0, sp, -32",
            ),
            (
                Inst::AluRRImm {
                    op: AluImmOp::Srai,
                    rd: writable_xreg(10),
                    rs1: xreg(10),
                    imm12: 63,
                },
                0x43f5_5513,
                "srai a0, a0, 63",
            ),
            (
                Inst::AluRRImm {
                    op: AluImmOp::Sltiu,
                    rd: writable_xreg(10),
                    rs1: xreg(11),
                    imm12: 1,
                },
                0x0015_b513,
                "sltiu a0, a1, 1",
            ),
            (
                Inst::Lui {
                    rd: writable_xreg(10),
                    imm20: 0x12345,
                },
                0x1234_5537,
                "lui a0, 0x12345",
            ),
            (
                Inst::Mv {
                    rd: writable_xreg(10),
                    rs: xreg(11),
                },
                0x0005_8513,
                "mv a0, a1",
            ),
            (
                Inst::Load {
                    op: LoadOp::Ld,
                    rd: writable_xreg(10),
                    base: xreg(8),
                    offset: 8,
                },
                0x0084_3503,
                "ld a0, 8(s0)",
            ),
            (
                Inst::Load {
                    op: LoadOp::Lbu,
                    rd: writable_xreg(10),
                    base: xreg(8),
                    offset: 136,
                },
                0x0884_4503,
                "lbu a0, 136(s0)",
            ),
            (
                Inst::Store {
                    op: StoreOp::Sd,
                    src: xreg(10),
                    base: xreg(8),
                    offset: 8,
                },
                0x00a4_3423,
                "sd a0, 8(s0)",
            ),
            (
                Inst::Store {
                    op: StoreOp::Sb,
                    src: xreg(10),
                    base: xreg(8),
                    offset: 137,
                },
                0x08a4_04a3,
                "sb a0, 137(s0)",
            ),
            (
                Inst::Jalr {
                    rd: writable_xreg(0),
                    base: xreg(1),
                    offset: 0,
                },
                0x0000_8067,
                "jalr zero, 0(ra)",
            ),
            (
                Inst::Amo {
                    op: AmoOp::Add,
                    is64: true,
                    rd: writable_xreg(10),
                    src: xreg(11),
                    addr: xreg(12),
                },
                0x06b6_3533,
                "amoadd.d.aqrl a0, a1, (a2)",
            ),
            (
                Inst::LoadReserved {
                    is64: true,
                    rd: writable_xreg(10),
                    addr: xreg(11),
                },
                0x1605_b533,
                "lr.d a0, (a1)",
            ),
            (
                Inst::StoreConditional {
                    is64: true,
                    rd: writable_xreg(10),
                    src: xreg(12),
                    addr: xreg(11),
                },
                0x1ec5_b533,
                "sc.d a0, a2, (a1)",
            ),
            (
                Inst::FpuRRR {
                    op: FpuOp::Add,
                    bits: 64,
                    rd: writable_freg(0),
                    rs1: freg(1),
                    rs2: freg(2),
                },
                0x0220_f053,
                "fadd.d ft0, ft1, ft2",
            ),
            (
                Inst::FpuMvToX {
                    bits: 64,
                    rd: writable_xreg(10),
                    rs: freg(0),
                },
                0xe200_0553,
                "fmv.x.d a0, ft0",
            ),
            (
                Inst::FpuMvFromX {
                    bits: 64,
                    rd: writable_freg(0),
                    rs: xreg(10),
                },
                0xf205_0053,
                "fmv.d.x ft0, a0",
            ),
            (
                Inst::IntToFpu {
                    int_bits: 64,
                    f_bits: 64,
                    rd: writable_freg(0),
                    rs: xreg(10),
                },
                0xd225_7053,
                "fcvt.d.l ft0, a0",
            ),
            (
                Inst::FpuToInt {
                    f_bits: 64,
                    int_bits: 64,
                    rtz: true,
                    rd: writable_xreg(10),
                    rs: freg(0),
                },
                0xc220_1553,
                "fcvt.l.d a0, ft0, rtz",
            ),
            (Inst::Ebreak, 0x0010_0073, "ebreak"),
        ];

        for (inst, word, text) in cases {
            let mut buf = CodeBuffer::new(0);
            emit(&inst, &mut buf);
            let bytes = buf.finish().unwrap();
            assert_eq!(
                u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
                word,
                "encoding of `{inst}`"
            );
            assert_eq!(inst.to_string(), text);
        }
    }

    #[test]
    fn branch_fixups() {
        let mut asm = Asm::new();
        let l = asm.new_label();
        asm.bind(l);
        asm.mv(writable_xreg(10), xreg(11)).unwrap();
        asm.branch(BrOp::Bne, xreg(10), zero_reg(), l);
        let mut buf = CodeBuffer::new(asm.stream.num_labels());
        for vi in asm.stream.insts() {
            emit(&vi.inst, &mut buf);
        }
        let bytes = buf.finish().unwrap();
        let word = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        // bne a0, zero, -4: imm = -4 in B-type layout.
        assert_eq!(word, 0xfe05_1ee3);
    }
}
