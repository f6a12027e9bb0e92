//! Repeated string operations.
//!
//! `repe cmpsb` becomes an intra-packet loop: compare the bytes at
//! RSI/RDI, update flags, advance both pointers by the DF-directed step,
//! decrement RCX, and branch back while RCX is non-zero and the bytes
//! were equal.

use super::{FlagOp, TResult, Translator};
use crate::decode::IClass;
use crate::state::regs;
use magpie_ir::ValueType;

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    match ctx.inst().iclass {
        IClass::RepeCmpsb => {
            let loop_start = ctx.builder().label(Some("repe_cmpsb"))?;

            let rsi = ctx.read_guest(ValueType::u64(), regs::RSI)?;
            let rdi = ctx.read_guest(ValueType::u64(), regs::RDI)?;
            let lhs = ctx.builder().read_mem(ValueType::u8(), rsi.val())?;
            let rhs = ctx.builder().read_mem(ValueType::u8(), rdi.val())?;
            let cmp = ctx.builder().sub(lhs.val(), rhs.val())?;
            ctx.write_flags(
                cmp,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
            )?;

            // Step is +1 or -1 depending on DF.
            let df = ctx.read_guest(ValueType::u1(), regs::DF)?;
            let fwd = ctx.builder().constant_u64(1)?;
            let back = ctx.builder().constant_u64(u64::MAX)?;
            let step = ctx.builder().csel(df.val(), back.val(), fwd.val())?;

            let new_rsi = ctx.builder().add(rsi.val(), step.val())?;
            ctx.write_guest(regs::RSI, new_rsi.val())?;
            let new_rdi = ctx.builder().add(rdi.val(), step.val())?;
            ctx.write_guest(regs::RDI, new_rdi.val())?;

            let rcx = ctx.read_guest(ValueType::u64(), regs::RCX)?;
            let one = ctx.builder().constant_u64(1)?;
            let new_rcx = ctx.builder().sub(rcx.val(), one.val())?;
            ctx.write_guest(regs::RCX, new_rcx.val())?;

            // Terminate when RCX reaches zero or the last compare differed.
            let zero = ctx.builder().constant_u64(0)?;
            let rcx_zero = ctx.builder().cmpeq(new_rcx.val(), zero.val())?;
            let zf = ctx.read_guest(ValueType::u1(), regs::ZF)?;
            let differs = ctx.builder().bnot(zf.val())?;
            let done = ctx.builder().bor(rcx_zero.val(), differs.val())?;
            let again = ctx.builder().bnot(done.val())?;
            ctx.builder().cond_br(again.val(), loop_start)?;
        }
        other => panic!("rep translator got {other:?}"),
    }
    Ok(())
}
