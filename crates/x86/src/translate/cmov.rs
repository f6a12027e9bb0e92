//! CMOVcc: conditional select between source and current destination.

use super::{TResult, Translator};

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let cond = ctx.inst().cond.expect("cmov without condition");
    let cond = ctx.compute_cond(cond)?;
    let tval = ctx.read_operand(1)?;
    let fval = ctx.read_operand(0)?;
    let ty = ctx.builder().chunk().port_ty(fval.val());
    let tval = ctx.auto_cast(ty, tval)?;
    let sel = ctx.builder().csel(cond.val(), tval.val(), fval.val())?;
    ctx.write_operand(0, sel.val())?;
    Ok(())
}
