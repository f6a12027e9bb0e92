//! Lane shuffles driven by an 8-bit immediate.

use super::{TResult, Translator};
use crate::decode::{IClass, Operand};
use magpie_ir::ValueType;

fn selector(ctx: &Translator) -> u8 {
    match ctx.inst().operands[2] {
        Operand::Imm { value, .. } => value as u8,
        _ => panic!("shuffle without immediate selector"),
    }
}

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    match ctx.inst().iclass {
        IClass::Pshufd => {
            // Each destination dword picks a source lane from two selector
            // bits.
            let sel = selector(ctx);
            let v4 = ValueType::vector(ValueType::u32(), 4).expect("u32x4");
            let src = ctx.read_operand(1)?;
            let src = ctx.builder().bitcast(v4, src.val())?;
            let dst = ctx.read_operand(0)?;
            let mut dst = ctx.builder().bitcast(v4, dst.val())?;
            for i in 0..4u32 {
                let lane = (sel >> (2 * i)) & 3;
                let v = ctx.builder().vector_extract(src.val(), lane as u32)?;
                dst = ctx.builder().vector_insert(dst.val(), i, v.val())?;
            }
            ctx.write_operand(0, dst.val())?;
        }

        IClass::Shufpd => {
            let sel = selector(ctx);
            let v2 = ValueType::vector(ValueType::f64(), 2).expect("f64x2");
            let a = ctx.read_operand(0)?;
            let a = ctx.builder().bitcast(v2, a.val())?;
            let b = ctx.read_operand(1)?;
            let b = ctx.auto_cast(ValueType::u128(), b)?;
            let b = ctx.builder().bitcast(v2, b.val())?;

            let lo = ctx
                .builder()
                .vector_extract(a.val(), (sel & 1) as u32)?;
            let hi = ctx
                .builder()
                .vector_extract(b.val(), ((sel >> 1) & 1) as u32)?;
            let r = ctx.builder().vector_insert(a.val(), 0, lo.val())?;
            let r = ctx.builder().vector_insert(r.val(), 1, hi.val())?;
            ctx.write_operand(0, r.val())?;
        }

        IClass::Shufps => {
            // Lanes 0-1 select from the destination, 2-3 from the source.
            let sel = selector(ctx);
            let v4 = ValueType::vector(ValueType::u32(), 4).expect("u32x4");
            let a = ctx.read_operand(0)?;
            let a = ctx.builder().bitcast(v4, a.val())?;
            let b = ctx.read_operand(1)?;
            let b = ctx.auto_cast(ValueType::u128(), b)?;
            let b = ctx.builder().bitcast(v4, b.val())?;

            let mut r = a;
            for i in 0..4u32 {
                let lane = ((sel >> (2 * i)) & 3) as u32;
                let from = if i < 2 { a } else { b };
                let v = ctx.builder().vector_extract(from.val(), lane)?;
                r = ctx.builder().vector_insert(r.val(), i, v.val())?;
            }
            ctx.write_operand(0, r.val())?;
        }

        other => panic!("shuffle translator got {other:?}"),
    }
    Ok(())
}
