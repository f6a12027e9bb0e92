//! AArch64 binary code emission.

use super::inst::{ALUOp, AMode, FpuOp, Inst, VecOp};
use crate::machinst::{CodeBuffer, FixupKind};
use crate::reg::Reg;

fn gpr(r: Reg) -> u32 {
    debug_assert!(r.is_real());
    (r.hw_enc() & 31) as u32
}

fn vec(r: Reg) -> u32 {
    debug_assert!(r.is_real());
    (r.hw_enc() & 31) as u32
}

fn enc_arith_rrr(bits_31_21: u32, bits_15_10: u32, rd: u32, rn: u32, rm: u32) -> u32 {
    (bits_31_21 << 21) | (rm << 16) | (bits_15_10 << 10) | (rn << 5) | rd
}

fn enc_move_wide(top9: u32, hw: u32, imm16: u32, rd: u32) -> u32 {
    (top9 << 23) | (hw << 21) | (imm16 << 5) | rd
}

fn enc_bitfield(base: u32, immr: u32, imms: u32, rn: u32, rd: u32) -> u32 {
    base | (immr << 16) | (imms << 10) | (rn << 5) | rd
}

fn enc_ldst_uimm12(base: u32, scaled_off: u32, rn: u32, rt: u32) -> u32 {
    base | (scaled_off << 10) | (rn << 5) | rt
}

fn enc_ldst_simm9(base: u32, simm9: i32, rn: u32, rt: u32) -> u32 {
    base | (((simm9 as u32) & 0x1ff) << 12) | (rn << 5) | rt
}

fn enc_ldst_regreg(base: u32, rm: u32, rn: u32, rt: u32) -> u32 {
    base | (rm << 16) | (rn << 5) | rt
}

fn enc_fpu_rrr(base: u32, rd: u32, rn: u32, rm: u32) -> u32 {
    base | (rm << 16) | (rn << 5) | rd
}

fn enc_fpu_rr(base: u32, rd: u32, rn: u32) -> u32 {
    base | (rn << 5) | rd
}

fn ins_imm5(lane_bits: u8, idx: u8) -> u32 {
    match lane_bits {
        8 => ((idx as u32) << 1) | 1,
        16 => ((idx as u32) << 2) | 0b10,
        32 => ((idx as u32) << 3) | 0b100,
        _ => ((idx as u32) << 4) | 0b1000,
    }
}

/// Encode one instruction into the buffer. Branch displacements are left
/// for the label fixup pass.
pub fn emit(inst: &Inst, buf: &mut CodeBuffer) {
    match *inst {
        Inst::Nop => buf.put4(0xd503201f),
        Inst::Udf => buf.put4(0x0000_0000),

        Inst::AluRRR { op, size, rd, rn, rm } => {
            let sf = size.sf_bit();
            let (rd, rn, rm) = (gpr(rd.to_reg()), gpr(rn), gpr(rm));
            let word = match op {
                ALUOp::Add => enc_arith_rrr((sf << 10) | 0b0001011_000, 0, rd, rn, rm),
                ALUOp::Adds => enc_arith_rrr((sf << 10) | 0b0101011_000, 0, rd, rn, rm),
                ALUOp::Sub => enc_arith_rrr((sf << 10) | 0b1001011_000, 0, rd, rn, rm),
                ALUOp::Subs => enc_arith_rrr((sf << 10) | 0b1101011_000, 0, rd, rn, rm),
                ALUOp::And => enc_arith_rrr((sf << 10) | 0b0001010_000, 0, rd, rn, rm),
                ALUOp::Ands => enc_arith_rrr((sf << 10) | 0b1101010_000, 0, rd, rn, rm),
                ALUOp::Orr => enc_arith_rrr((sf << 10) | 0b0101010_000, 0, rd, rn, rm),
                ALUOp::OrrNot => enc_arith_rrr((sf << 10) | 0b0101010_001, 0, rd, rn, rm),
                ALUOp::Eor => enc_arith_rrr((sf << 10) | 0b1001010_000, 0, rd, rn, rm),
                ALUOp::Adc => enc_arith_rrr((sf << 10) | 0b0011010_000, 0, rd, rn, rm),
                ALUOp::Sbc => enc_arith_rrr((sf << 10) | 0b1011010_000, 0, rd, rn, rm),
                ALUOp::Lsl => enc_arith_rrr((sf << 10) | 0b0011010_110, 0b001000, rd, rn, rm),
                ALUOp::Lsr => enc_arith_rrr((sf << 10) | 0b0011010_110, 0b001001, rd, rn, rm),
                ALUOp::Asr => enc_arith_rrr((sf << 10) | 0b0011010_110, 0b001010, rd, rn, rm),
                ALUOp::UDiv => enc_arith_rrr((sf << 10) | 0b0011010_110, 0b000010, rd, rn, rm),
                ALUOp::SDiv => enc_arith_rrr((sf << 10) | 0b0011010_110, 0b000011, rd, rn, rm),
                ALUOp::SMulH => enc_arith_rrr(0b1001_1011_010, 0b011111, rd, rn, rm),
                ALUOp::UMulH => enc_arith_rrr(0b1001_1011_110, 0b011111, rd, rn, rm),
            };
            buf.put4(word);
        }

        Inst::AluRRImm12 { op, size, rd, rn, imm12 } => {
            let sf = size.sf_bit();
            // Bits [30:23] including the (zero) shift bit.
            let base = match op {
                ALUOp::Add => 0b0010001_0,
                ALUOp::Adds => 0b0110001_0,
                ALUOp::Sub => 0b1010001_0,
                ALUOp::Subs => 0b1110001_0,
                _ => unreachable!("immediate form of {op:?}"),
            };
            buf.put4(
                (((sf << 8) | base) << 23)
                    | ((imm12 as u32) << 10)
                    | (gpr(rn) << 5)
                    | gpr(rd.to_reg()),
            );
        }

        Inst::MovZ { size, rd, imm16, shift } => {
            let top9 = (size.sf_bit() << 8) | 0b10100101;
            buf.put4(enc_move_wide(top9, (shift / 16) as u32, imm16 as u32, gpr(rd.to_reg())));
        }
        Inst::MovK { size, rd, imm16, shift } => {
            let top9 = (size.sf_bit() << 8) | 0b11100101;
            buf.put4(enc_move_wide(top9, (shift / 16) as u32, imm16 as u32, gpr(rd.to_reg())));
        }

        Inst::MovRR { size, rd, rm } => {
            // ORR rd, xzr, rm.
            let sf = size.sf_bit();
            buf.put4(enc_arith_rrr((sf << 10) | 0b0101010_000, 0, gpr(rd.to_reg()), 31, gpr(rm)));
        }

        Inst::Extend { rd, rn, signed, from_bits, to_bits } => {
            let (rd, rn) = (gpr(rd.to_reg()), gpr(rn));
            let word = match (signed, from_bits) {
                // Unsigned extensions write the 32-bit view; the upper
                // half clears itself.
                (false, 8) => enc_bitfield(0x5300_0000, 0, 7, rn, rd),
                (false, 16) => enc_bitfield(0x5300_0000, 0, 15, rn, rd),
                (false, _) => enc_arith_rrr(0b0101010_000, 0, rd, 31, rn),
                (true, 8) if to_bits == 64 => enc_bitfield(0x9340_0000, 0, 7, rn, rd),
                (true, 8) => enc_bitfield(0x1300_0000, 0, 7, rn, rd),
                (true, 16) if to_bits == 64 => enc_bitfield(0x9340_0000, 0, 15, rn, rd),
                (true, 16) => enc_bitfield(0x1300_0000, 0, 15, rn, rd),
                (true, _) => enc_bitfield(0x9340_0000, 0, 31, rn, rd),
            };
            buf.put4(word);
        }

        Inst::UBfx { size, rd, rn, lsb, width } => {
            let base = if size.is64() { 0xd340_0000 } else { 0x5300_0000 };
            buf.put4(enc_bitfield(
                base,
                lsb as u32,
                (lsb + width - 1) as u32,
                gpr(rn),
                gpr(rd.to_reg()),
            ));
        }
        Inst::SBfx { size, rd, rn, lsb, width } => {
            let base = if size.is64() { 0x9340_0000 } else { 0x1300_0000 };
            buf.put4(enc_bitfield(
                base,
                lsb as u32,
                (lsb + width - 1) as u32,
                gpr(rn),
                gpr(rd.to_reg()),
            ));
        }
        Inst::Bfi { size, rd, rn, lsb, width } => {
            let (base, bits) = if size.is64() {
                (0xb340_0000, 64u32)
            } else {
                (0x3300_0000, 32)
            };
            buf.put4(enc_bitfield(
                base,
                (bits - lsb as u32) % bits,
                width as u32 - 1,
                gpr(rn),
                gpr(rd.to_reg()),
            ));
        }

        Inst::MAdd { size, rd, rn, rm, ra } => {
            buf.put4(
                (size.sf_bit() << 31)
                    | 0x1b00_0000
                    | (gpr(rm) << 16)
                    | (gpr(ra) << 10)
                    | (gpr(rn) << 5)
                    | gpr(rd.to_reg()),
            );
        }
        Inst::MSub { size, rd, rn, rm, ra } => {
            buf.put4(
                (size.sf_bit() << 31)
                    | 0x1b00_8000
                    | (gpr(rm) << 16)
                    | (gpr(ra) << 10)
                    | (gpr(rn) << 5)
                    | gpr(rd.to_reg()),
            );
        }

        Inst::Load { bits, rd, mem } => {
            let (scaled_base, unscaled_base, regreg_base) = match bits {
                8 => (0x3940_0000u32, 0x3840_0000u32, 0x3860_6800u32),
                16 => (0x7940_0000, 0x7840_0000, 0x7860_6800),
                32 => (0xb940_0000, 0xb840_0000, 0xb860_6800),
                _ => (0xf940_0000, 0xf840_0000, 0xf860_6800),
            };
            emit_ldst(buf, bits, scaled_base, unscaled_base, regreg_base, rd.to_reg(), mem);
        }
        Inst::Store { bits, rs, mem } => {
            let (scaled_base, unscaled_base, regreg_base) = match bits {
                8 => (0x3900_0000u32, 0x3800_0000u32, 0x3820_6800u32),
                16 => (0x7900_0000, 0x7800_0000, 0x7820_6800),
                32 => (0xb900_0000, 0xb800_0000, 0xb820_6800),
                _ => (0xf900_0000, 0xf800_0000, 0xf820_6800),
            };
            emit_ldst(buf, bits, scaled_base, unscaled_base, regreg_base, rs, mem);
        }

        Inst::CSel { size, cond, rd, rn, rm } => {
            buf.put4(
                (size.sf_bit() << 31)
                    | 0x1a80_0000
                    | (gpr(rm) << 16)
                    | (cond.bits() << 12)
                    | (gpr(rn) << 5)
                    | gpr(rd.to_reg()),
            );
        }
        Inst::CSet { cond, rd } => {
            // CSINC rd, xzr, xzr, !cond.
            buf.put4(0x9a9f_07e0 | (cond.invert().bits() << 12) | gpr(rd.to_reg()));
        }
        Inst::FpuCSel { bits, cond, rd, rn, rm } => {
            let base = if bits == 64 { 0x1e60_0c00 } else { 0x1e20_0c00 };
            buf.put4(
                base | (vec(rm) << 16) | (cond.bits() << 12) | (vec(rn) << 5) | vec(rd.to_reg()),
            );
        }

        Inst::CondBr { cond, target } => {
            buf.put4(0x5400_0000 | cond.bits());
            buf.use_label(target, FixupKind::A64Branch19);
        }
        Inst::Cbz { size, rn, target } => {
            buf.put4((size.sf_bit() << 31) | 0x3400_0000 | gpr(rn));
            buf.use_label(target, FixupKind::A64Branch19);
        }
        Inst::Cbnz { size, rn, target } => {
            buf.put4((size.sf_bit() << 31) | 0x3500_0000 | gpr(rn));
            buf.use_label(target, FixupKind::A64Branch19);
        }
        Inst::Jump { target } => {
            buf.put4(0x1400_0000);
            buf.use_label(target, FixupKind::A64Branch26);
        }
        Inst::LabelDef { label } => buf.bind_label(label),

        Inst::Blr { rn } => buf.put4(0xd63f_0000 | (gpr(rn) << 5)),
        Inst::Ret => buf.put4(0xd65f_03c0),

        Inst::LdAxr { bits, rd, rn } => {
            let base = match bits {
                8 => 0x085f_fc00u32,
                16 => 0x485f_fc00,
                32 => 0x885f_fc00,
                _ => 0xc85f_fc00,
            };
            buf.put4(base | (gpr(rn) << 5) | gpr(rd.to_reg()));
        }
        Inst::StlXr { bits, status, rt, rn } => {
            let base = match bits {
                8 => 0x0800_fc00u32,
                16 => 0x4800_fc00,
                32 => 0x8800_fc00,
                _ => 0xc800_fc00,
            };
            buf.put4(base | (gpr(status.to_reg()) << 16) | (gpr(rn) << 5) | gpr(rt));
        }
        Inst::Dmb => buf.put4(0xd503_3bbf),

        Inst::FpuRRR { op, bits, rd, rn, rm } => {
            let ty = if bits == 64 { 0x0040_0000 } else { 0 };
            let base = match op {
                FpuOp::Add => 0x1e20_2800,
                FpuOp::Sub => 0x1e20_3800,
                FpuOp::Mul => 0x1e20_0800,
                FpuOp::Div => 0x1e20_1800,
            };
            buf.put4(enc_fpu_rrr(base | ty, vec(rd.to_reg()), vec(rn), vec(rm)));
        }
        Inst::FpuMov { bits, rd, rn } => {
            let base = if bits == 64 { 0x1e60_4000 } else { 0x1e20_4000 };
            buf.put4(enc_fpu_rr(base, vec(rd.to_reg()), vec(rn)));
        }
        Inst::MovToFpu { bits, rd, rn } => {
            let base = if bits == 64 { 0x9e67_0000 } else { 0x1e27_0000 };
            buf.put4(enc_fpu_rr(base, vec(rd.to_reg()), gpr(rn)));
        }
        Inst::MovFromFpu { bits, rd, rn } => {
            let base = if bits == 64 { 0x9e66_0000 } else { 0x1e26_0000 };
            buf.put4(enc_fpu_rr(base, gpr(rd.to_reg()), vec(rn)));
        }
        Inst::IntToFpu { src_bits, dst_bits, rd, rn } => {
            let base = match (src_bits, dst_bits) {
                (32, 32) => 0x1e22_0000u32,
                (32, 64) => 0x1e62_0000,
                (64, 32) => 0x9e22_0000,
                _ => 0x9e62_0000,
            };
            buf.put4(enc_fpu_rr(base, vec(rd.to_reg()), gpr(rn)));
        }
        Inst::FpuToInt { src_bits, dst_bits, nearest, rd, rn } => {
            let base = match (nearest, src_bits, dst_bits) {
                (false, 32, 32) => 0x1e38_0000u32,
                (false, 32, 64) => 0x9e38_0000,
                (false, 64, 32) => 0x1e78_0000,
                (false, 64, 64) => 0x9e78_0000,
                (true, 32, 32) => 0x1e20_0000,
                (true, 32, 64) => 0x9e20_0000,
                (true, 64, 32) => 0x1e60_0000,
                _ => 0x9e60_0000,
            };
            buf.put4(enc_fpu_rr(base, gpr(rd.to_reg()), vec(rn)));
        }
        Inst::FpuCvt { from_bits, to_bits: _, rd, rn } => {
            let base = if from_bits == 32 { 0x1e22_c000 } else { 0x1e62_4000 };
            buf.put4(enc_fpu_rr(base, vec(rd.to_reg()), vec(rn)));
        }

        Inst::VecRRR { op, lane_bits, rd, rn, rm } => {
            let size = match lane_bits {
                8 => 0u32,
                16 => 1,
                32 => 2,
                _ => 3,
            };
            let word = match op {
                VecOp::Add => 0x4e20_8400 | (size << 22),
                VecOp::Sub => 0x6e20_8400 | (size << 22),
                VecOp::And => 0x4e20_1c00,
                VecOp::Orr => 0x4ea0_1c00,
                VecOp::Eor => 0x6e20_1c00,
                VecOp::Fadd => {
                    if lane_bits == 64 {
                        0x4e60_d400
                    } else {
                        0x4e20_d400
                    }
                }
                VecOp::Fsub => {
                    if lane_bits == 64 {
                        0x4ee0_d400
                    } else {
                        0x4ea0_d400
                    }
                }
                VecOp::Fmul => {
                    if lane_bits == 64 {
                        0x6e60_dc00
                    } else {
                        0x6e20_dc00
                    }
                }
                VecOp::Fdiv => {
                    if lane_bits == 64 {
                        0x6e60_fc00
                    } else {
                        0x6e20_fc00
                    }
                }
            };
            buf.put4(word | (vec(rm) << 16) | (vec(rn) << 5) | vec(rd.to_reg()));
        }
        Inst::VecMov { rd, rn } => {
            buf.put4(0x4ea0_1c00 | (vec(rn) << 16) | (vec(rn) << 5) | vec(rd.to_reg()));
        }
        Inst::InsLane { lane_bits, idx, rd, rn } => {
            buf.put4(0x4e00_1c00 | (ins_imm5(lane_bits, idx) << 16) | (gpr(rn) << 5) | vec(rd.to_reg()));
        }
        Inst::InsElem { lane_bits, idx, rd, rn } => {
            buf.put4(0x6e00_0400 | (ins_imm5(lane_bits, idx) << 16) | (vec(rn) << 5) | vec(rd.to_reg()));
        }
        Inst::ExtLane { lane_bits, idx, rd, rn } => {
            let base = if lane_bits == 64 { 0x4e00_3c00 } else { 0x0e00_3c00 };
            buf.put4(base | (ins_imm5(lane_bits, idx) << 16) | (vec(rn) << 5) | gpr(rd.to_reg()));
        }
        Inst::DupElem { lane_bits, idx, rd, rn } => {
            buf.put4(0x5e00_0400 | (ins_imm5(lane_bits, idx) << 16) | (vec(rn) << 5) | vec(rd.to_reg()));
        }
    }
}

fn emit_ldst(
    buf: &mut CodeBuffer,
    bits: u8,
    scaled_base: u32,
    unscaled_base: u32,
    regreg_base: u32,
    rt: Reg,
    mem: AMode,
) {
    let rt = gpr(rt);
    match mem {
        AMode::Base { rn } => {
            buf.put4(enc_ldst_uimm12(scaled_base, 0, gpr(rn), rt));
        }
        AMode::Offset { rn, off } => {
            let scale = (bits / 8) as i32;
            if off >= 0 && off % scale == 0 && off / scale < 4096 {
                buf.put4(enc_ldst_uimm12(scaled_base, (off / scale) as u32, gpr(rn), rt));
            } else {
                debug_assert!((-256..256).contains(&off), "offset {off} unencodable");
                buf.put4(enc_ldst_simm9(unscaled_base, off, gpr(rn), rt));
            }
        }
        AMode::RegReg { rn, rm } => {
            buf.put4(enc_ldst_regreg(regreg_base, gpr(rm), gpr(rn), rt));
        }
        AMode::PreIndexed { rn, off } => {
            buf.put4(enc_ldst_simm9(unscaled_base | (0b11 << 10), off, gpr(rn), rt));
        }
        AMode::PostIndexed { rn, off } => {
            buf.put4(enc_ldst_simm9(unscaled_base | (0b01 << 10), off, gpr(rn), rt));
        }
    }
}

#[cfg(test)]
mod emit_tests {
    use super::super::inst::*;
    use super::super::regs::*;
    use super::emit;
    use crate::machinst::CodeBuffer;

    fn assert_emit(insns: &[(Inst, &str, &str)]) {
        for (inst, expect_hex, expect_text) in insns {
            let mut buf = CodeBuffer::new(0);
            emit(inst, &mut buf);
            let bytes = buf.finish().unwrap();
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            assert_eq!(&hex, expect_hex, "encoding of `{expect_text}`");
            assert_eq!(&inst.to_string(), expect_text, "text of `{expect_text}`");
        }
    }

    #[test]
    fn aarch64_binemit() {
        let mut insns: Vec<(Inst, &str, &str)> = Vec::new();

        // N.B.: little-endian: objdump's D65F03C0 prints here as C0035FD6.
        insns.push((Inst::Ret, "C0035FD6", "ret"));
        insns.push((Inst::Nop, "1F2003D5", "nop"));
        insns.push((
            Inst::AluRRR {
                op: ALUOp::Add,
                size: OperandSize::Size32,
                rd: writable_xreg(1),
                rn: xreg(2),
                rm: xreg(3),
            },
            "4100030B",
            "add w1, w2, w3",
        ));
        insns.push((
            Inst::AluRRR {
                op: ALUOp::Add,
                size: OperandSize::Size64,
                rd: writable_xreg(4),
                rn: xreg(5),
                rm: xreg(6),
            },
            "A400068B",
            "add x4, x5, x6",
        ));
        insns.push((
            Inst::AluRRR {
                op: ALUOp::Adc,
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                rm: xreg(2),
            },
            "2000029A",
            "adc x0, x1, x2",
        ));
        insns.push((
            Inst::AluRRR {
                op: ALUOp::Subs,
                size: OperandSize::Size64,
                rd: writable_zero_reg(),
                rn: xreg(3),
                rm: xreg(4),
            },
            "7F0004EB",
            "subs xzr, x3, x4",
        ));
        insns.push((
            Inst::AluRRR {
                op: ALUOp::SDiv,
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                rm: xreg(2),
            },
            "200CC29A",
            "sdiv x0, x1, x2",
        ));
        insns.push((
            Inst::AluRRR {
                op: ALUOp::Lsl,
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                rm: xreg(2),
            },
            "2020C29A",
            "lsl x0, x1, x2",
        ));
        insns.push((
            Inst::AluRRR {
                op: ALUOp::SMulH,
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                rm: xreg(2),
            },
            "207C429B",
            "smulh x0, x1, x2",
        ));
        insns.push((
            Inst::AluRRImm12 {
                op: ALUOp::Add,
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                imm12: 42,
            },
            "20A80091",
            "add x0, x1, #42",
        ));
        insns.push((
            Inst::MovZ {
                size: OperandSize::Size64,
                rd: writable_xreg(1),
                imm16: 0xffff,
                shift: 0,
            },
            "E1FF9FD2",
            "movz x1, #0xffff",
        ));
        insns.push((
            Inst::MovK {
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                imm16: 0x1234,
                shift: 16,
            },
            "8046A2F2",
            "movk x0, #0x1234, lsl #16",
        ));
        insns.push((
            Inst::MovRR {
                size: OperandSize::Size64,
                rd: writable_xreg(8),
                rm: xreg(9),
            },
            "E80309AA",
            "mov x8, x9",
        ));
        insns.push((
            Inst::Extend {
                rd: writable_xreg(0),
                rn: xreg(1),
                signed: false,
                from_bits: 8,
                to_bits: 64,
            },
            "201C0053",
            "uxtb w0, w1",
        ));
        insns.push((
            Inst::Extend {
                rd: writable_xreg(0),
                rn: xreg(1),
                signed: true,
                from_bits: 32,
                to_bits: 64,
            },
            "207C4093",
            "sxtw x0, w1",
        ));
        insns.push((
            Inst::UBfx {
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                lsb: 8,
                width: 8,
            },
            "203C48D3",
            "ubfx x0, x1, #8, #8",
        ));
        insns.push((
            Inst::Bfi {
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                lsb: 8,
                width: 8,
            },
            "201C78B3",
            "bfi x0, x1, #8, #8",
        ));
        insns.push((
            Inst::MAdd {
                size: OperandSize::Size64,
                rd: writable_xreg(0),
                rn: xreg(1),
                rm: xreg(2),
                ra: xreg(3),
            },
            "200C029B",
            "madd x0, x1, x2, x3",
        ));
        assert_emit(&insns);

        // Loads/stores checked with explicit words.
        let cases = [
            (
                Inst::Load {
                    bits: 64,
                    rd: writable_xreg(0),
                    mem: AMode::Base { rn: xreg(29) },
                },
                0xf94003a0u32,
            ),
            (
                Inst::Store {
                    bits: 32,
                    rs: xreg(1),
                    mem: AMode::Offset { rn: xreg(2), off: 4 },
                },
                0xb9000441,
            ),
            (
                Inst::Load {
                    bits: 64,
                    rd: writable_xreg(0),
                    mem: AMode::Offset { rn: xreg(1), off: -8 },
                },
                0xf85f8020,
            ),
            (
                Inst::Load {
                    bits: 8,
                    rd: writable_xreg(0),
                    mem: AMode::Base { rn: xreg(1) },
                },
                0x39400020,
            ),
            (
                Inst::Load {
                    bits: 64,
                    rd: writable_xreg(0),
                    mem: AMode::RegReg { rn: xreg(1), rm: xreg(2) },
                },
                0xf8626820,
            ),
            (
                Inst::Store {
                    bits: 8,
                    rs: xreg(3),
                    mem: AMode::Base { rn: xreg(4) },
                },
                0x39000083,
            ),
            (
                Inst::CSel {
                    size: OperandSize::Size64,
                    cond: Cond::Eq,
                    rd: writable_xreg(0),
                    rn: xreg(1),
                    rm: xreg(2),
                },
                0x9a820020,
            ),
            (
                Inst::CSet {
                    cond: Cond::Ne,
                    rd: writable_xreg(0),
                },
                0x9a9f07e0,
            ),
            (
                Inst::LdAxr {
                    bits: 64,
                    rd: writable_xreg(1),
                    rn: xreg(2),
                },
                0xc85ffc41,
            ),
            (
                Inst::StlXr {
                    bits: 64,
                    status: writable_xreg(0),
                    rt: xreg(1),
                    rn: xreg(2),
                },
                0xc800fc41,
            ),
            (Inst::Dmb, 0xd5033bbf),
            (
                Inst::FpuRRR {
                    op: FpuOp::Add,
                    bits: 64,
                    rd: writable_vreg(0),
                    rn: vreg(1),
                    rm: vreg(2),
                },
                0x1e622820,
            ),
            (
                Inst::MovToFpu {
                    bits: 64,
                    rd: writable_vreg(0),
                    rn: xreg(1),
                },
                0x9e670020,
            ),
            (
                Inst::IntToFpu {
                    src_bits: 32,
                    dst_bits: 64,
                    rd: writable_vreg(0),
                    rn: xreg(1),
                },
                0x1e620020,
            ),
            (
                Inst::FpuToInt {
                    src_bits: 64,
                    dst_bits: 64,
                    nearest: true,
                    rd: writable_xreg(0),
                    rn: vreg(1),
                },
                0x9e600020,
            ),
            (
                Inst::FpuCvt {
                    from_bits: 32,
                    to_bits: 64,
                    rd: writable_vreg(0),
                    rn: vreg(1),
                },
                0x1e22c020,
            ),
            (
                Inst::VecRRR {
                    op: VecOp::Add,
                    lane_bits: 32,
                    rd: writable_vreg(0),
                    rn: vreg(1),
                    rm: vreg(2),
                },
                0x4ea28420,
            ),
            (
                Inst::VecRRR {
                    op: VecOp::Eor,
                    lane_bits: 8,
                    rd: writable_vreg(0),
                    rn: vreg(1),
                    rm: vreg(2),
                },
                0x6e221c20,
            ),
            (
                Inst::InsLane {
                    lane_bits: 64,
                    idx: 1,
                    rd: writable_vreg(0),
                    rn: xreg(1),
                },
                0x4e181c20,
            ),
            (
                Inst::ExtLane {
                    lane_bits: 64,
                    idx: 1,
                    rd: writable_xreg(0),
                    rn: vreg(1),
                },
                0x4e183c20,
            ),
            (
                Inst::DupElem {
                    lane_bits: 64,
                    idx: 1,
                    rd: writable_vreg(0),
                    rn: vreg(1),
                },
                0x5e180420,
            ),
            (
                Inst::Blr { rn: xreg(16) },
                0xd63f0200,
            ),
        ];
        for (inst, word) in cases {
            let mut buf = CodeBuffer::new(0);
            emit(&inst, &mut buf);
            let bytes = buf.finish().unwrap();
            assert_eq!(
                u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
                word,
                "encoding of `{inst}`"
            );
        }
    }
}
