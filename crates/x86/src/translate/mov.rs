//! Data movement: MOV and friends, LEA, extensions, sign-replication,
//! SSE register moves.

use super::{TResult, Translator};
use crate::decode::{IClass, Operand};
use crate::regs::RegClass;
use crate::state::regs;
use magpie_ir::ValueType;

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    match ctx.inst().iclass {
        IClass::Lea => {
            let mem = ctx.inst().mem.expect("lea without memory operand");
            let addr = ctx.compute_address(&mem)?;
            let target = ctx.operand_ty(0);
            let addr = ctx.auto_cast(target, addr)?;
            ctx.write_operand(0, addr.val())?;
        }

        IClass::Mov => {
            // Immediates sign-extend up to the destination width.
            let target = ctx.operand_ty(0);
            let src = ctx.read_operand(1)?;
            let src = ctx.auto_cast(target, src)?;
            ctx.write_operand(0, src.val())?;
        }

        IClass::Movzx => {
            let src = ctx.read_operand(1)?;
            let cast = ctx.auto_cast(ctx.operand_ty(0), src)?;
            ctx.write_operand(0, cast.val())?;
        }

        IClass::Movsx | IClass::Movsxd => {
            let src = ctx.read_operand(1)?;
            let sty = ctx.builder().chunk().port_ty(src.val()).as_signed();
            let src = ctx.builder().bitcast(sty, src.val())?;
            let wide = sty
                .with_width(ctx.operand_ty(0).width() as u16)
                .expect("gpr width");
            let cast = ctx.builder().sx(wide, src.val())?;
            ctx.write_operand(0, cast.val())?;
        }

        IClass::Cdqe => {
            // RAX := sx(EAX).
            let eax = ctx.read_guest(ValueType::u32(), regs::RAX)?;
            let v = ctx.builder().bitcast(ValueType::s32(), eax.val())?;
            let wide = ctx.builder().sx(ValueType::s64(), v.val())?;
            let v = ctx.builder().bitcast(ValueType::u64(), wide.val())?;
            ctx.write_guest(regs::RAX, v.val())?;
        }

        IClass::Cwde => {
            // EAX := sx(AX), zero-extending into the upper half.
            let ax = ctx.read_guest(ValueType::u16(), regs::RAX)?;
            let v = ctx.builder().bitcast(ValueType::s16(), ax.val())?;
            let wide = ctx.builder().sx(ValueType::s32(), v.val())?;
            let v = ctx.builder().bitcast(ValueType::u32(), wide.val())?;
            let v = ctx.builder().zx(ValueType::u64(), v.val())?;
            ctx.write_guest(regs::RAX, v.val())?;
        }

        IClass::Cdq | IClass::Cqo => {
            // Replicate the sign of the accumulator into RDX/EDX.
            let wide = ctx.inst().iclass == IClass::Cqo;
            let (ty, bits) = if wide {
                (ValueType::u64(), 64u32)
            } else {
                (ValueType::u32(), 32u32)
            };
            let acc = ctx.read_guest(ty, regs::RAX)?;
            let shift = ctx.builder().constant_u8((bits - 1) as u8)?;
            let sacc = ctx.builder().bitcast(ty.as_signed(), acc.val())?;
            let spread = ctx.builder().asr(sacc.val(), shift.val())?;
            let sign = ctx.builder().trunc(ValueType::u1(), spread.val())?;
            let ones = ctx
                .builder()
                .constant_i(ty, if wide { u64::MAX } else { 0xffff_ffff })?;
            let zero = ctx.builder().constant_i(ty, 0)?;
            let ext = ctx.builder().csel(sign.val(), ones.val(), zero.val())?;
            let ext = if wide {
                ext
            } else {
                ctx.builder().zx(ValueType::u64(), ext.val())?
            };
            ctx.write_guest(regs::RDX, ext.val())?;
        }

        IClass::Movd | IClass::Movq => translate_int_vec_move(ctx)?,
        IClass::Movss | IClass::Movsd => translate_scalar_move(ctx)?,

        IClass::Movups | IClass::Movupd | IClass::Movaps | IClass::Movapd => {
            let src = ctx.read_operand(1)?;
            ctx.write_operand(0, src.val())?;
        }

        IClass::Movhps => {
            // Merge a 64-bit memory value into the high lane.
            let dst = ctx.read_operand(0)?;
            let src = ctx.read_operand(1)?;
            let merged = ctx.builder().bit_insert(dst.val(), src.val(), 64, 64)?;
            ctx.write_operand(0, merged.val())?;
        }

        other => panic!("mov translator got {other:?}"),
    }
    Ok(())
}

/// MOVD/MOVQ between GPRs/memory and XMM registers: whole-register writes
/// zero the untouched lanes.
fn translate_int_vec_move(ctx: &mut Translator) -> TResult<()> {
    let dst_is_xmm =
        matches!(ctx.inst().operands[0], Operand::Reg(r) if r.class == RegClass::Xmm);
    let src = ctx.read_operand(1)?;

    if dst_is_xmm {
        let Operand::Reg(r) = ctx.inst().operands[0] else {
            unreachable!()
        };
        // Narrow the source to the move width first; MOVQ xmm, xmm reads
        // the full 128 bits.
        let bits = ctx.inst().op_bits;
        let narrow = ctx.auto_cast(
            ValueType::scalar(magpie_ir::TypeClass::UnsignedInteger, bits).expect("width"),
            src,
        )?;
        ctx.write_xmm_zero(r.num, narrow.val())?;
    } else {
        let bits = ctx.inst().op_bits;
        let narrow = ctx.auto_cast(
            ValueType::scalar(magpie_ir::TypeClass::UnsignedInteger, bits).expect("width"),
            src,
        )?;
        ctx.write_operand(0, narrow.val())?;
    }
    Ok(())
}

/// MOVSS/MOVSD lane moves: loads from memory zero the upper lanes,
/// register-to-register moves merge into lane 0, stores write the low
/// lane.
fn translate_scalar_move(ctx: &mut Translator) -> TResult<()> {
    let bits = if ctx.inst().iclass == IClass::Movss {
        32
    } else {
        64
    };
    let ty = ValueType::scalar(magpie_ir::TypeClass::UnsignedInteger, bits).expect("width");

    match (ctx.inst().operands[0], ctx.inst().operands[1]) {
        (Operand::Reg(d), Operand::Mem) => {
            let src = ctx.read_operand(1)?;
            ctx.write_xmm_zero(d.num, src.val())?;
        }
        (Operand::Reg(d), Operand::Reg(_)) => {
            let src = ctx.read_operand(1)?;
            let low = ctx.builder().trunc(ty, src.val())?;
            ctx.write_xmm_merge(d.num, low.val())?;
        }
        (Operand::Mem, Operand::Reg(_)) => {
            let src = ctx.read_operand(1)?;
            let low = ctx.builder().trunc(ty, src.val())?;
            ctx.write_operand(0, low.val())?;
        }
        _ => unreachable!("scalar move operand shape"),
    }
    Ok(())
}
