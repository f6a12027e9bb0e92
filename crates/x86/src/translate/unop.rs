//! Single-operand arithmetic: NOT, NEG, INC, DEC.

use super::{FlagOp, TResult, Translator};
use crate::decode::IClass;

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let src = ctx.read_operand(0)?;

    match ctx.inst().iclass {
        IClass::Not => {
            let r = ctx.builder().bnot(src.val())?;
            ctx.write_operand(0, r.val())?;
        }
        IClass::Neg => {
            // NEG is 0 - src: CF is set iff the source was non-zero.
            let ty = ctx.builder().chunk().port_ty(src.val());
            let zero = ctx.builder().constant_i(ty, 0)?;
            let r = ctx.builder().sub(zero.val(), src.val())?;
            ctx.write_operand(0, r.val())?;
            ctx.write_flags(
                r,
                FlagOp::Update,
                FlagOp::Ignore,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
            )?;
            let nz = ctx.builder().constant_i(ty, 0)?;
            let cf = ctx.builder().cmpne(src.val(), nz.val())?;
            ctx.write_flag_value('c', cf.val())?;
        }
        IClass::Inc | IClass::Dec => {
            // INC/DEC update everything but CF.
            let ty = ctx.builder().chunk().port_ty(src.val());
            let one = ctx.builder().constant_i(ty, 1)?;
            let r = if ctx.inst().iclass == IClass::Inc {
                ctx.builder().add(src.val(), one.val())?
            } else {
                ctx.builder().sub(src.val(), one.val())?
            };
            ctx.write_operand(0, r.val())?;
            ctx.write_flags(
                r,
                FlagOp::Update,
                FlagOp::Ignore,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
            )?;
        }
        other => panic!("unop translator got {other:?}"),
    }
    Ok(())
}
