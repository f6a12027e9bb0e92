//! PUSH and POP.

use super::{TResult, Translator};
use crate::decode::IClass;
use crate::state::regs;
use magpie_ir::ValueType;

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    match ctx.inst().iclass {
        IClass::Push => {
            let value = ctx.read_operand(0)?;
            // Immediates push at the operand size of the instruction.
            let value = ctx.auto_cast(ValueType::u64(), value)?;
            super::branch::push_u64(ctx, value)?;
        }
        IClass::Pop => {
            let rsp = ctx.read_guest(ValueType::u64(), regs::RSP)?;
            let value = ctx.builder().read_mem(ValueType::u64(), rsp.val())?;
            let eight = ctx.builder().constant_u64(8)?;
            let new_rsp = ctx.builder().add(rsp.val(), eight.val())?;
            ctx.write_guest(regs::RSP, new_rsp.val())?;
            ctx.write_operand(0, value.val())?;
        }
        other => panic!("stack translator got {other:?}"),
    }
    Ok(())
}
