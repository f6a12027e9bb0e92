//! PUNPCKL*: interleave the low lanes of two vector views.

use super::{TResult, Translator};
use crate::decode::IClass;
use magpie_ir::ValueType;

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let op0 = ctx.read_operand(0)?;
    let op1 = ctx.read_operand(1)?;

    match ctx.inst().iclass {
        IClass::Punpcklqdq => {
            // dst[63:0] stays; dst[127:64] := src[63:0].
            let v2 = ValueType::vector(ValueType::u64(), 2).expect("u64x2");
            let dst = ctx.builder().bitcast(v2, op0.val())?;
            let src = ctx.builder().bitcast(v2, op1.val())?;
            let low = ctx.builder().vector_extract(src.val(), 0)?;
            let r = ctx.builder().vector_insert(dst.val(), 1, low.val())?;
            ctx.write_operand(0, r.val())?;
        }
        IClass::Punpckldq => {
            // Interleave the low two dwords of dst and src.
            let v4 = ValueType::vector(ValueType::u32(), 4).expect("u32x4");
            let dst = ctx.builder().bitcast(v4, op0.val())?;
            let src = ctx.builder().bitcast(v4, op1.val())?;
            let d1 = ctx.builder().vector_extract(dst.val(), 1)?;
            let s0 = ctx.builder().vector_extract(src.val(), 0)?;
            let s1 = ctx.builder().vector_extract(src.val(), 1)?;
            let r = ctx.builder().vector_insert(dst.val(), 1, s0.val())?;
            let r = ctx.builder().vector_insert(r.val(), 2, d1.val())?;
            let r = ctx.builder().vector_insert(r.val(), 3, s1.val())?;
            ctx.write_operand(0, r.val())?;
        }
        other => panic!("punpck translator got {other:?}"),
    }
    Ok(())
}
