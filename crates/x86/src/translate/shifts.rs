//! SHL/SHR/SAR.
//!
//! The count is masked by 63 (or 31 below 64 bits). A zero count leaves
//! every flag untouched, so the flag updates select between the old and
//! new values on `count == 0`. CF receives the last bit shifted out; OF is
//! only architecturally defined for a count of one and is selected on
//! that.

use super::{TResult, Translator};
use crate::decode::IClass;
use magpie_ir::{Node, PortRef, ValueType};

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let iclass = ctx.inst().iclass;
    let value = ctx.read_operand(0)?;
    let ty = ctx.builder().chunk().port_ty(value.val());
    let bits = ty.width();

    // Mask the count like hardware does.
    let count = ctx.read_operand(1)?;
    let count = ctx.auto_cast(ValueType::u8(), count)?;
    let mask = ctx.builder().constant_u8(if bits == 64 { 63 } else { 31 })?;
    let count = ctx.builder().band(count.val(), mask.val())?;

    let result: Node = match iclass {
        IClass::Shl => ctx.builder().lsl(value.val(), count.val())?,
        IClass::Shr => ctx.builder().lsr(value.val(), count.val())?,
        IClass::Sar => {
            let sv = ctx.builder().bitcast(ty.as_signed(), value.val())?;
            let shifted = ctx.builder().asr(sv.val(), count.val())?;
            ctx.builder().bitcast(ty, shifted.val())?
        }
        other => panic!("shift translator got {other:?}"),
    };
    ctx.write_operand(0, result.val())?;

    // The last bit shifted out: shift by count-1, then take the edge bit.
    let one = ctx.builder().constant_u8(1)?;
    let count_m1 = ctx.builder().sub(count.val(), one.val())?;
    let cf_new: PortRef = match iclass {
        IClass::Shl => {
            let partial = ctx.builder().lsl(value.val(), count_m1.val())?;
            ctx.builder()
                .bit_extract(partial.val(), bits - 1, 1)?
                .val()
        }
        IClass::Shr => {
            let partial = ctx.builder().lsr(value.val(), count_m1.val())?;
            ctx.builder().bit_extract(partial.val(), 0, 1)?.val()
        }
        IClass::Sar => {
            let sv = ctx.builder().bitcast(ty.as_signed(), value.val())?;
            let partial = ctx.builder().asr(sv.val(), count_m1.val())?;
            let partial = ctx.builder().bitcast(ty, partial.val())?;
            ctx.builder().bit_extract(partial.val(), 0, 1)?.val()
        }
        _ => unreachable!(),
    };

    let zero_count = {
        let z = ctx.builder().constant_u8(0)?;
        ctx.builder().cmpeq(count.val(), z.val())?
    };

    // ZF/SF from the result, CF from the shifted-out bit, each guarded on
    // a zero count.
    let zeroc = ctx.builder().constant_i(ty, 0)?;
    let zf_new = ctx.builder().cmpeq(result.val(), zeroc.val())?;
    let sf_new = ctx.builder().bit_extract(result.val(), bits - 1, 1)?;

    select_flag(ctx, 'z', zero_count, zf_new.val())?;
    select_flag(ctx, 's', zero_count, sf_new.val())?;
    select_flag(ctx, 'c', zero_count, cf_new)?;

    // OF: defined for a single-bit shift only.
    let of_new: PortRef = match iclass {
        IClass::Shl => {
            let msb = ctx.builder().bit_extract(result.val(), bits - 1, 1)?;
            ctx.builder().bxor(msb.val(), cf_new)?.val()
        }
        IClass::Shr => ctx
            .builder()
            .bit_extract(value.val(), bits - 1, 1)?
            .val(),
        IClass::Sar => ctx.builder().constant_u1(false)?.val(),
        _ => unreachable!(),
    };
    let one_count = {
        let o = ctx.builder().constant_u8(1)?;
        ctx.builder().cmpeq(count.val(), o.val())?
    };
    let of_old = ctx.read_guest(ValueType::u1(), crate::state::regs::OF)?;
    let of = ctx.builder().csel(one_count.val(), of_new, of_old.val())?;
    ctx.write_flag_value('o', of.val())?;

    Ok(())
}

/// `flag := count == 0 ? old : new`.
fn select_flag(
    ctx: &mut Translator,
    tag: char,
    zero_count: Node,
    new: PortRef,
) -> TResult<()> {
    let slot = match tag {
        'z' => crate::state::regs::ZF,
        's' => crate::state::regs::SF,
        'c' => crate::state::regs::CF,
        _ => unreachable!(),
    };
    let old = ctx.read_guest(ValueType::u1(), slot)?;
    let sel = ctx.builder().csel(zero_count.val(), old.val(), new)?;
    ctx.write_flag_value(tag, sel.val())?;
    Ok(())
}
