//! Unconditional control transfers: JMP, CALL, RET.

use super::{TResult, Translator};
use crate::decode::{IClass, Operand};
use crate::state::regs;
use magpie_ir::{BranchHint, Node, ValueType};

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    match ctx.inst().iclass {
        IClass::Jmp => match ctx.inst().operands[0] {
            Operand::Rel(rel) => {
                let target = relative_target(ctx, rel)?;
                ctx.builder().write_pc(target.val(), BranchHint::Direct)?;
            }
            _ => {
                let target = ctx.read_operand(0)?;
                ctx.builder().write_pc(target.val(), BranchHint::Indirect)?;
            }
        },

        IClass::Call => {
            // Push the return address, then transfer.
            let len = ctx.inst_len();
            let pc = ctx.builder().read_pc()?;
            let off = ctx.builder().constant_u64(len)?;
            let ret = ctx.builder().add(pc.val(), off.val())?;
            push_u64(ctx, ret)?;

            match ctx.inst().operands[0] {
                Operand::Rel(rel) => {
                    let target = relative_target(ctx, rel)?;
                    ctx.builder().write_pc(target.val(), BranchHint::Direct)?;
                }
                _ => {
                    let target = ctx.read_operand(0)?;
                    ctx.builder().write_pc(target.val(), BranchHint::Indirect)?;
                }
            }
        }

        IClass::Ret => {
            let rsp = ctx.read_guest(ValueType::u64(), regs::RSP)?;
            let ret = ctx.builder().read_mem(ValueType::u64(), rsp.val())?;

            // Pop the return address plus any immediate stack adjustment.
            let extra = match ctx.inst().operands.first() {
                Some(&Operand::Imm { value, .. }) => value as u64,
                _ => 0,
            };
            let adj = ctx.builder().constant_u64(8 + extra)?;
            let new_rsp = ctx.builder().add(rsp.val(), adj.val())?;
            ctx.write_guest(regs::RSP, new_rsp.val())?;

            ctx.builder().write_pc(ret.val(), BranchHint::Indirect)?;
        }

        other => panic!("branch translator got {other:?}"),
    }
    Ok(())
}

fn relative_target(ctx: &mut Translator, rel: i32) -> TResult<Node> {
    let len = ctx.inst_len();
    let pc = ctx.builder().read_pc()?;
    let off = ctx
        .builder()
        .constant_u64((rel as i64 as u64).wrapping_add(len))?;
    Ok(ctx.builder().add(pc.val(), off.val())?)
}

/// RSP -= 8; [RSP] := value.
pub(super) fn push_u64(ctx: &mut Translator, value: Node) -> TResult<()> {
    let rsp = ctx.read_guest(ValueType::u64(), regs::RSP)?;
    let eight = ctx.builder().constant_u64(8)?;
    let new_rsp = ctx.builder().sub(rsp.val(), eight.val())?;
    ctx.write_guest(regs::RSP, new_rsp.val())?;
    ctx.builder().write_mem(new_rsp.val(), value.val())?;
    Ok(())
}
