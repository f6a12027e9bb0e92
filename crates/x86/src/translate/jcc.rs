//! Conditional branches.
//!
//! The new PC is a select between target and fall-through; the `Csel`
//! branch hint lets the backend turn it into a real conditional branch.

use super::{TResult, Translator};
use crate::decode::Operand;
use magpie_ir::BranchHint;

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let cond = ctx.inst().cond.expect("jcc without condition");
    let cond = ctx.compute_cond(cond)?;

    let Operand::Rel(rel) = ctx.inst().operands[0] else {
        panic!("jcc operand shape")
    };
    let len = ctx.inst_len();

    let pc = ctx.builder().read_pc()?;
    let fall_off = ctx.builder().constant_u64(len)?;
    let fallthrough = ctx.builder().add(pc.val(), fall_off.val())?;

    let pc = ctx.builder().read_pc()?;
    let tgt_off = ctx
        .builder()
        .constant_u64((rel as i64 as u64).wrapping_add(len))?;
    let target = ctx.builder().add(pc.val(), tgt_off.val())?;

    let sel = ctx
        .builder()
        .csel(cond.val(), target.val(), fallthrough.val())?;
    ctx.builder().write_pc(sel.val(), BranchHint::Csel)?;
    Ok(())
}
