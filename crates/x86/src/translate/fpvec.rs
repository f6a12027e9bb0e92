//! SSE floating-point and bitwise-vector operations.
//!
//! Scalar forms extract lane 0, operate at f32/f64, and merge the result
//! back; packed forms operate on bitcast vector views; conversions use
//! class-changing casts with explicit rounding.

use super::{TResult, Translator};
use crate::decode::IClass;
use magpie_ir::{Node, Rounding, TypeClass, ValueType};

fn f32x4() -> ValueType {
    ValueType::vector(ValueType::f32(), 4).expect("f32x4")
}

fn f64x2() -> ValueType {
    ValueType::vector(ValueType::f64(), 2).expect("f64x2")
}

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    use IClass::*;
    match ctx.inst().iclass {
        // Bitwise forms work on the raw 128 bits.
        Andps | Andpd | Orps | Orpd | Xorps | Xorpd => {
            let a = ctx.read_operand(0)?;
            let b = ctx.read_operand(1)?;
            let b = ctx.auto_cast(ValueType::u128(), b)?;
            let r = match ctx.inst().iclass {
                Andps | Andpd => ctx.builder().band(a.val(), b.val())?,
                Orps | Orpd => ctx.builder().bor(a.val(), b.val())?,
                _ => ctx.builder().bxor(a.val(), b.val())?,
            };
            ctx.write_operand(0, r.val())?;
        }

        Addps | Subps | Mulps | Divps => packed(ctx, f32x4())?,
        Addpd | Subpd | Mulpd | Divpd => packed(ctx, f64x2())?,

        Addss | Subss | Mulss | Divss => scalar(ctx, ValueType::f32())?,
        Addsd | Subsd | Mulsd | Divsd => scalar(ctx, ValueType::f64())?,

        Cvtsi2ss | Cvtsi2sd => {
            let (fty, bits) = if ctx.inst().iclass == Cvtsi2ss {
                (ValueType::f32(), 32)
            } else {
                (ValueType::f64(), 64)
            };
            let src = ctx.read_operand(1)?;
            let sty = ctx.builder().chunk().port_ty(src.val()).as_signed();
            let src = ctx.builder().bitcast(sty, src.val())?;
            let conv = ctx.builder().convert(fty, src.val(), Rounding::Round)?;
            let raw = ctx.builder().bitcast(
                ValueType::scalar(TypeClass::UnsignedInteger, bits).expect("width"),
                conv.val(),
            )?;
            let dst = ctx.read_operand(0)?;
            let merged = ctx
                .builder()
                .bit_insert(dst.val(), raw.val(), 0, bits as u32)?;
            ctx.write_operand(0, merged.val())?;
        }

        Cvtss2si | Cvtsd2si | Cvttss2si | Cvttsd2si => {
            let fty = if matches!(ctx.inst().iclass, Cvtss2si | Cvttss2si) {
                ValueType::f32()
            } else {
                ValueType::f64()
            };
            let rounding = if matches!(ctx.inst().iclass, Cvttss2si | Cvttsd2si) {
                Rounding::Trunc
            } else {
                Rounding::Round
            };
            let src = scalar_lane(ctx, 1, fty)?;
            let dty = ctx.operand_ty(0).as_signed();
            let conv = ctx.builder().convert(dty, src.val(), rounding)?;
            ctx.write_operand(0, conv.val())?;
        }

        Cvtss2sd => {
            let src = scalar_lane(ctx, 1, ValueType::f32())?;
            let conv = ctx
                .builder()
                .convert(ValueType::f64(), src.val(), Rounding::None)?;
            let raw = ctx.builder().bitcast(ValueType::u64(), conv.val())?;
            let dst = ctx.read_operand(0)?;
            let merged = ctx.builder().bit_insert(dst.val(), raw.val(), 0, 64)?;
            ctx.write_operand(0, merged.val())?;
        }

        Cvtsd2ss => {
            let src = scalar_lane(ctx, 1, ValueType::f64())?;
            let conv = ctx
                .builder()
                .convert(ValueType::f32(), src.val(), Rounding::Round)?;
            let raw = ctx.builder().bitcast(ValueType::u32(), conv.val())?;
            let dst = ctx.read_operand(0)?;
            let merged = ctx.builder().bit_insert(dst.val(), raw.val(), 0, 32)?;
            ctx.write_operand(0, merged.val())?;
        }

        other => panic!("fpvec translator got {other:?}"),
    }
    Ok(())
}

/// Read operand `i` as a scalar of `fty`: lane 0 of a 128-bit register, or
/// a plain memory value of that width.
fn scalar_lane(ctx: &mut Translator, i: usize, fty: ValueType) -> TResult<Node> {
    let v = ctx.read_operand(i)?;
    let bits = ctx.builder().chunk().port_ty(v.val()).width();
    if bits == 128 {
        let lanes = ValueType::vector(fty, (128 / fty.width()) as u16).expect("lane type");
        let vec = ctx.builder().bitcast(lanes, v.val())?;
        Ok(ctx.builder().vector_extract(vec.val(), 0)?)
    } else {
        Ok(ctx.builder().bitcast(fty, v.val())?)
    }
}

fn apply(ctx: &mut Translator, a: Node, b: Node) -> TResult<Node> {
    use IClass::*;
    Ok(match ctx.inst().iclass {
        Addps | Addpd | Addss | Addsd => ctx.builder().add(a.val(), b.val())?,
        Subps | Subpd | Subss | Subsd => ctx.builder().sub(a.val(), b.val())?,
        Mulps | Mulpd | Mulss | Mulsd => ctx.builder().mul(a.val(), b.val())?,
        Divps | Divpd | Divss | Divsd => ctx.builder().div(a.val(), b.val())?,
        other => panic!("fpvec arithmetic got {other:?}"),
    })
}

fn packed(ctx: &mut Translator, vty: ValueType) -> TResult<()> {
    let a = ctx.read_operand(0)?;
    let b = ctx.read_operand(1)?;
    let a = ctx.builder().bitcast(vty, a.val())?;
    let b128 = ctx.auto_cast(ValueType::u128(), b)?;
    let b = ctx.builder().bitcast(vty, b128.val())?;
    let r = apply(ctx, a, b)?;
    ctx.write_operand(0, r.val())?;
    Ok(())
}

fn scalar(ctx: &mut Translator, fty: ValueType) -> TResult<()> {
    let a = scalar_lane(ctx, 0, fty)?;
    let b = scalar_lane(ctx, 1, fty)?;
    let r = apply(ctx, a, b)?;
    let raw = ctx.builder().bitcast(
        ValueType::scalar(TypeClass::UnsignedInteger, fty.width() as u16).expect("width"),
        r.val(),
    )?;
    let dst = ctx.read_operand(0)?;
    let merged = ctx
        .builder()
        .bit_insert(dst.val(), raw.val(), 0, fty.width())?;
    ctx.write_operand(0, merged.val())?;
    Ok(())
}
