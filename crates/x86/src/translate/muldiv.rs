//! Multiplication and division.
//!
//! IMUL's narrow forms sign-extend to double width, multiply, and
//! truncate; CF/OF report whether the truncation lost information. The
//! one-operand forms produce the full product in RDX:RAX (AX for bytes)
//! via bit extraction. DIV/IDIV widen the dividend, divide and take the
//! remainder separately.

use super::{TResult, Translator};
use crate::decode::IClass;
use crate::state::regs;
use magpie_ir::{Node, TypeClass, ValueType};

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    match ctx.inst().iclass {
        IClass::Imul => match ctx.inst().operands.len() {
            1 => widening_mul(ctx, true),
            2 => {
                let op0 = ctx.read_operand(0)?;
                let op1 = ctx.read_operand(1)?;
                let r = narrow_mul(ctx, op0, op1)?;
                ctx.write_operand(0, r.val())?;
                Ok(())
            }
            3 => {
                let op1 = ctx.read_operand(1)?;
                let op2 = ctx.read_operand(2)?;
                let ty = ctx.builder().chunk().port_ty(op1.val());
                let op2 = ctx.auto_cast(ty, op2)?;
                let r = narrow_mul(ctx, op1, op2)?;
                ctx.write_operand(0, r.val())?;
                Ok(())
            }
            n => panic!("imul with {n} operands"),
        },
        IClass::Mul => widening_mul(ctx, false),
        IClass::Div => division(ctx, false),
        IClass::Idiv => division(ctx, true),
        other => panic!("muldiv translator got {other:?}"),
    }
}

fn double_width(ty: ValueType) -> ValueType {
    ty.with_width(ty.width() as u16 * 2).expect("double width")
}

/// Signed multiply at double width, truncating back to the operand width.
/// Sets CF=OF iff the full product differs from the sign-extended result.
fn narrow_mul(ctx: &mut Translator, lhs: Node, rhs: Node) -> TResult<Node> {
    let ty = ctx.builder().chunk().port_ty(lhs.val());
    let sty = ty.as_signed();
    let wide = double_width(sty);
    let bits = ty.width();

    let sl = ctx.builder().bitcast(sty, lhs.val())?;
    let sr = ctx.builder().bitcast(sty, rhs.val())?;
    let wl = ctx.builder().sx(wide, sl.val())?;
    let wr = ctx.builder().sx(wide, sr.val())?;
    let prod = ctx.builder().mul(wl.val(), wr.val())?;

    let low = ctx.builder().trunc(sty, prod.val())?;

    // Overflow iff the high half is not the sign replication of the low.
    let high = ctx.builder().bit_extract(prod.val(), bits, bits)?;
    let shift = ctx.builder().constant_u8((bits - 1) as u8)?;
    let spread = ctx.builder().asr(low.val(), shift.val())?;
    let spread = ctx
        .builder()
        .bitcast(ValueType::scalar(TypeClass::UnsignedInteger, bits as u16).expect("width"),
                 spread.val())?;
    let of = ctx.builder().cmpne(high.val(), spread.val())?;
    ctx.write_flag_value('c', of.val())?;
    ctx.write_flag_value('o', of.val())?;

    Ok(ctx.builder().bitcast(ty, low.val())?)
}

/// One-operand MUL/IMUL: RDX:RAX := RAX * src (AX := AL * src for bytes).
fn widening_mul(ctx: &mut Translator, signed: bool) -> TResult<()> {
    let src = ctx.read_operand(0)?;
    let ty = ctx.builder().chunk().port_ty(src.val());
    let bits = ty.width();
    let ety = if signed {
        ty.as_signed()
    } else {
        ty.as_unsigned()
    };
    let wide = double_width(ety);

    let acc = ctx.read_guest(ty, regs::RAX)?;
    let acc = ctx.builder().bitcast(ety, acc.val())?;
    let src = ctx.builder().bitcast(ety, src.val())?;
    let (wa, ws) = if signed {
        (
            ctx.builder().sx(wide, acc.val())?,
            ctx.builder().sx(wide, src.val())?,
        )
    } else {
        (
            ctx.builder().zx(wide, acc.val())?,
            ctx.builder().zx(wide, src.val())?,
        )
    };
    let prod = ctx.builder().mul(wa.val(), ws.val())?;

    if bits == 8 {
        // AX gets the whole 16-bit product.
        let p = ctx.builder().bitcast(ValueType::u16(), prod.val())?;
        let orig = ctx.read_guest(ValueType::u64(), regs::RAX)?;
        let merged = ctx.builder().bit_insert(orig.val(), p.val(), 0, 16)?;
        ctx.write_guest(regs::RAX, merged.val())?;
    } else {
        let low = ctx.builder().bit_extract(prod.val(), 0, bits)?;
        let high = ctx.builder().bit_extract(prod.val(), bits, bits)?;
        ctx.write_reg_arch(crate::regs::Reg::gpr(0, bits as u16), low.val())?;
        ctx.write_reg_arch(crate::regs::Reg::gpr(2, bits as u16), high.val())?;
    }

    // CF=OF=1 iff the upper half carries significant bits.
    let high = ctx.builder().bit_extract(prod.val(), bits, bits)?;
    let carry: Node = if signed {
        let low = ctx.builder().bit_extract(prod.val(), 0, bits)?;
        let shift = ctx.builder().constant_u8((bits - 1) as u8)?;
        let slow = ctx.builder().bitcast(
            ValueType::scalar(TypeClass::SignedInteger, bits as u16).expect("width"),
            low.val(),
        )?;
        let spread = ctx.builder().asr(slow.val(), shift.val())?;
        let spread = ctx.builder().bitcast(
            ValueType::scalar(TypeClass::UnsignedInteger, bits as u16).expect("width"),
            spread.val(),
        )?;
        ctx.builder().cmpne(high.val(), spread.val())?
    } else {
        let zero = ctx
            .builder()
            .constant_i(ValueType::scalar(TypeClass::UnsignedInteger, bits as u16).expect("width"), 0)?;
        ctx.builder().cmpne(high.val(), zero.val())?
    };
    ctx.write_flag_value('c', carry.val())?;
    ctx.write_flag_value('o', carry.val())?;
    Ok(())
}

/// DIV/IDIV. The 16- and 32-bit forms divide the exact RDX:RAX double
/// width; the 64-bit form divides RAX alone, assuming RDX holds the
/// canonical extension (a 128-bit divide has no host form).
fn division(ctx: &mut Translator, signed: bool) -> TResult<()> {
    let src = ctx.read_operand(0)?;
    let ty = ctx.builder().chunk().port_ty(src.val());
    let bits = ty.width();
    let ety = if signed {
        ty.as_signed()
    } else {
        ty.as_unsigned()
    };
    let divisor = ctx.builder().bitcast(ety, src.val())?;

    if bits == 8 {
        // AX / src -> AL quotient, AH remainder.
        let ax = ctx.read_guest(ValueType::u16(), regs::RAX)?;
        let wide = ValueType::scalar(ety.class(), 16).expect("width");
        let num = ctx.builder().bitcast(wide, ax.val())?;
        let den = if signed {
            ctx.builder().sx(wide, divisor.val())?
        } else {
            ctx.builder().zx(wide, divisor.val())?
        };
        let q = ctx.builder().div(num.val(), den.val())?;
        let r = ctx.builder().rem(num.val(), den.val())?;
        let q8 = ctx.builder().trunc(ety, q.val())?;
        let r8 = ctx.builder().trunc(ety, r.val())?;
        let orig = ctx.read_guest(ValueType::u64(), regs::RAX)?;
        let m = ctx.builder().bit_insert(orig.val(), q8.val(), 0, 8)?;
        let m = ctx.builder().bit_insert(m.val(), r8.val(), 8, 8)?;
        ctx.write_guest(regs::RAX, m.val())?;
    } else if bits == 64 {
        let acc = ctx.read_guest(ValueType::u64(), regs::RAX)?;
        let num = ctx.builder().bitcast(ety, acc.val())?;
        let q = ctx.builder().div(num.val(), divisor.val())?;
        let r = ctx.builder().rem(num.val(), divisor.val())?;
        ctx.write_reg_arch(crate::regs::Reg::gpr(0, 64), q.val())?;
        ctx.write_reg_arch(crate::regs::Reg::gpr(2, 64), r.val())?;
    } else {
        let wide = ValueType::scalar(ety.class(), (bits * 2) as u16).expect("width");
        let lo = ctx.read_guest(ty, regs::RAX)?;
        let hi = ctx.read_guest(ty, regs::RDX)?;
        let num = ctx.builder().zx(wide.as_unsigned(), lo.val())?;
        let num = ctx.builder().bit_insert(num.val(), hi.val(), bits, bits)?;
        let num = ctx.builder().bitcast(wide, num.val())?;
        let den = if signed {
            ctx.builder().sx(wide, divisor.val())?
        } else {
            ctx.builder().zx(wide, divisor.val())?
        };
        let q = ctx.builder().div(num.val(), den.val())?;
        let r = ctx.builder().rem(num.val(), den.val())?;
        let qn = ctx.builder().trunc(ety, q.val())?;
        let rn = ctx.builder().trunc(ety, r.val())?;
        ctx.write_reg_arch(crate::regs::Reg::gpr(0, bits as u16), qn.val())?;
        ctx.write_reg_arch(crate::regs::Reg::gpr(2, bits as u16), rn.val())?;
    }

    // Flags are architecturally undefined after division; clear CF/OF.
    let zero = ctx.builder().constant_u1(false)?;
    ctx.write_flag_value('c', zero.val())?;
    let zero = ctx.builder().constant_u1(false)?;
    ctx.write_flag_value('o', zero.val())?;
    Ok(())
}
