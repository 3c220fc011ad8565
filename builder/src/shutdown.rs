//! Interrupt wiring for the hold-open phase.

use error_stack::ResultExt;
use tokio_util::sync::CancellationToken;

use pixslab_common::error::{Result, SlabError};

/// Cancel `token` when the process receives an interrupt.
///
/// Pairs with [`SlabHandle::serve`](crate::SlabHandle::serve): the
/// interrupt handler becomes the one path that tears a served slab down.
pub fn cancel_on_interrupt(token: &CancellationToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        token.cancel();
    })
    .change_context(SlabError::Io)
    .attach_printable("failed to install the interrupt handler")?;

    Ok(())
}
