//! Two-operand arithmetic and logic, including the SSE integer forms.

use super::{FlagOp, TResult, Translator};
use crate::decode::IClass;
use magpie_ir::{Node, ValueType};

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let iclass = ctx.inst().iclass;
    let mut op0 = ctx.read_operand(0)?;
    let mut ty = ctx.builder().chunk().port_ty(op0.val());

    // The packed integer forms view the 128-bit register as lanes.
    let lane_bits = match iclass {
        IClass::Paddb | IClass::Psubb => Some(8),
        IClass::Paddw | IClass::Psubw => Some(16),
        IClass::Paddd | IClass::Psubd => Some(32),
        IClass::Paddq | IClass::Psubq => Some(64),
        _ => None,
    };
    if let Some(bits) = lane_bits {
        let elem = ValueType::scalar(magpie_ir::TypeClass::UnsignedInteger, bits).expect("lane");
        ty = ValueType::vector(elem, (ty.width() / bits as u32) as u16).expect("vector shape");
        op0 = ctx.auto_cast(ty, op0)?;
    }

    let op1 = ctx.read_operand(1)?;
    let op1 = ctx.auto_cast(ty, op1)?;

    let result: Node = match iclass {
        IClass::Xor | IClass::Pxor => ctx.builder().bxor(op0.val(), op1.val())?,
        IClass::And | IClass::Pand | IClass::Test => ctx.builder().band(op0.val(), op1.val())?,
        IClass::Or | IClass::Por => ctx.builder().bor(op0.val(), op1.val())?,
        IClass::Add | IClass::Paddb | IClass::Paddw | IClass::Paddd | IClass::Paddq => {
            ctx.builder().add(op0.val(), op1.val())?
        }
        IClass::Sub
        | IClass::Psubb
        | IClass::Psubw
        | IClass::Psubd
        | IClass::Psubq
        | IClass::Cmp => ctx.builder().sub(op0.val(), op1.val())?,
        IClass::Adc => {
            let cf = ctx.read_guest(ValueType::u1(), crate::state::regs::CF)?;
            ctx.builder().adc(op0.val(), op1.val(), cf.val())?
        }
        IClass::Sbb => {
            let cf = ctx.read_guest(ValueType::u1(), crate::state::regs::CF)?;
            ctx.builder().sbb(op0.val(), op1.val(), cf.val())?
        }
        other => panic!("binop translator got {other:?}"),
    };

    // CMP and TEST only exist for their flags.
    if !matches!(iclass, IClass::Cmp | IClass::Test) {
        ctx.write_operand(0, result.val())?;
    }

    match iclass {
        IClass::Xor | IClass::And | IClass::Or | IClass::Test => {
            ctx.write_flags(
                result,
                FlagOp::Update,
                FlagOp::Set0,
                FlagOp::Set0,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Ignore,
            )?;
        }
        IClass::Add | IClass::Adc | IClass::Sub | IClass::Sbb | IClass::Cmp => {
            ctx.write_flags(
                result,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
                FlagOp::Update,
            )?;
        }
        _ => {}
    }
    Ok(())
}
