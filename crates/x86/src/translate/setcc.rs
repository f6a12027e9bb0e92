//! SETcc: materialize a condition into an 8-bit operand.

use super::{TResult, Translator};
use magpie_ir::ValueType;

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let cond = ctx.inst().cond.expect("setcc without condition");
    let cond = ctx.compute_cond(cond)?;
    let wide = ctx.builder().zx(ValueType::u8(), cond.val())?;
    ctx.write_operand(0, wide.val())?;
    Ok(())
}
