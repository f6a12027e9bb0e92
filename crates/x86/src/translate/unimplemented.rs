//! Instructions without a translator.
//!
//! The packet becomes a single call to the poison helper, labeled with the
//! instruction class; the runtime decides whether to trap or continue.

use super::{resolve_poison, TResult, Translator};

pub(super) fn translate(ctx: &mut Translator) -> TResult<()> {
    let func = resolve_poison(ctx.builder())?;
    let name = ctx.inst().iclass.name();
    let label = ctx.builder().label(Some(name))?;
    ctx.builder().internal_call(func, &[label.val()])?;
    Ok(())
}
