//! LOCK-prefixed read-modify-writes, XCHG and CMPXCHG.
//!
//! Atomic nodes expose the old memory value on their value port; flags
//! derive from the operation result, matching what the LOCK-prefixed
//! forms architecturally set.

use super::{FlagOp, TResult, Translator};
use crate::decode::IClass;
use crate::state::regs;
use magpie_ir::{AtomicOp, ValueType};

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    match ctx.inst().iclass {
        IClass::Xadd => {
            if ctx.inst().is_memory_operand(0) {
                let mem = ctx.inst().mem.expect("memref");
                let addr = ctx.compute_address(&mem)?;
                let src = ctx.read_operand(1)?;
                let old = ctx.builder().atomic_xadd(addr.val(), src.val())?;
                ctx.write_operand(1, old.val())?;
                full_flags(ctx, old)?;
            } else {
                // Register form needs no atomicity.
                let a = ctx.read_operand(0)?;
                let b = ctx.read_operand(1)?;
                let sum = ctx.builder().add(a.val(), b.val())?;
                ctx.write_operand(0, sum.val())?;
                ctx.write_operand(1, a.val())?;
                full_flags(ctx, sum)?;
            }
        }

        IClass::Xchg => {
            let mem_idx = if ctx.inst().is_memory_operand(0) {
                Some(0)
            } else if ctx.inst().is_memory_operand(1) {
                Some(1)
            } else {
                None
            };
            match mem_idx {
                Some(mi) => {
                    // Memory XCHG is implicitly locked.
                    let ri = 1 - mi;
                    let mem = ctx.inst().mem.expect("memref");
                    let addr = ctx.compute_address(&mem)?;
                    let src = ctx.read_operand(ri)?;
                    let old = ctx.builder().atomic_xchg(addr.val(), src.val())?;
                    ctx.write_operand(ri, old.val())?;
                }
                None => {
                    let a = ctx.read_operand(0)?;
                    let b = ctx.read_operand(1)?;
                    ctx.write_operand(0, b.val())?;
                    ctx.write_operand(1, a.val())?;
                }
            }
        }

        IClass::Cmpxchg => {
            let width = ctx.operand_ty(1);
            if ctx.inst().is_memory_operand(0) {
                let mem = ctx.inst().mem.expect("memref");
                let addr = ctx.compute_address(&mem)?;
                let acc = ctx.read_guest(width, regs::RAX)?;
                let src = ctx.read_operand(1)?;
                let old = ctx
                    .builder()
                    .atomic_cmpxchg(addr.val(), acc.val(), src.val())?;
                // On success the accumulator is unchanged and equals the
                // old value, so the write is unconditional.
                ctx.write_reg_arch(
                    crate::regs::Reg::gpr(0, width.width() as u16),
                    old.val(),
                )?;
                full_flags(ctx, old)?;
            } else {
                let dst = ctx.read_operand(0)?;
                let acc = ctx.read_guest(width, regs::RAX)?;
                let src = ctx.read_operand(1)?;
                let eq = ctx.builder().cmpeq(acc.val(), dst.val())?;
                let newdst = ctx.builder().csel(eq.val(), src.val(), dst.val())?;
                ctx.write_operand(0, newdst.val())?;
                ctx.write_reg_arch(crate::regs::Reg::gpr(0, width.width() as u16), dst.val())?;
                let cmp = ctx.builder().sub(acc.val(), dst.val())?;
                full_flags(ctx, cmp)?;
            }
        }

        // LOCK-prefixed group 1 and group 4/5 forms.
        IClass::Add | IClass::Sub | IClass::And | IClass::Or | IClass::Xor => {
            let op = match ctx.inst().iclass {
                IClass::Add => AtomicOp::Add,
                IClass::Sub => AtomicOp::Sub,
                IClass::And => AtomicOp::And,
                IClass::Or => AtomicOp::Or,
                _ => AtomicOp::Xor,
            };
            let mem = ctx.inst().mem.expect("lock without memory operand");
            let addr = ctx.compute_address(&mem)?;
            let src = ctx.read_operand(1)?;
            let src = ctx.auto_cast(ValueType::scalar(magpie_ir::TypeClass::UnsignedInteger, mem.bits).expect("width"), src)?;
            let n = ctx.builder().atomic_binop(op, addr.val(), src.val())?;
            match op {
                AtomicOp::And | AtomicOp::Or | AtomicOp::Xor => {
                    ctx.write_flags(
                        n,
                        FlagOp::Update,
                        FlagOp::Set0,
                        FlagOp::Set0,
                        FlagOp::Update,
                        FlagOp::Update,
                        FlagOp::Ignore,
                    )?;
                }
                _ => full_flags(ctx, n)?,
            }
        }

        IClass::Inc | IClass::Dec => {
            let mem = ctx.inst().mem.expect("lock without memory operand");
            let addr = ctx.compute_address(&mem)?;
            let ty = ValueType::scalar(magpie_ir::TypeClass::UnsignedInteger, mem.bits)
                .expect("width");
            let one = ctx.builder().constant_i(ty, 1)?;
            let op = if ctx.inst().iclass == IClass::Inc {
                AtomicOp::Add
            } else {
                AtomicOp::Sub
            };
            let n = ctx.builder().atomic_binop(op, addr.val(), one.val())?;
            // INC/DEC leave CF alone.
            ctx.write_flags(
                n,
                FlagOp::Update,
                FlagOp::Ignore,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
            )?;
        }

        other => panic!("atomic translator got {other:?}"),
    }
    Ok(())
}

fn full_flags(ctx: &mut Translator, n: magpie_ir::Node) -> TResult<()> {
    ctx.write_flags(
        n,
        FlagOp::Update,
        FlagOp::Update,
        FlagOp::Update,
        FlagOp::Update,
        FlagOp::Update,
        FlagOp::Update,
    )
}
