//! Flash programming engine.
//!
//! Reads stream bytes straight out of program memory. Writes go two
//! bytes at a time into the hardware staging latch and are committed
//! (erase, program, resume read-while-write) exactly when the pointer's
//! low page bits wrap back to zero. The dispatcher's one-page rewind
//! guarantees the pointer lands on the page being programmed, so the
//! boundary test needs no extra address arithmetic.

use crate::device::TransferContext;
use crate::hal::{ControlEndpoint, ProgramMemory, Watchdog};

/// Produces one IN chunk of program-memory bytes, bounded by the packet
/// size and the remaining transfer length.
pub(crate) fn read_chunk<H>(hw: &mut H, ctx: &mut TransferContext)
where
    H: ControlEndpoint + ProgramMemory,
{
    let n = ctx.remaining.min(H::MAX_PACKET);
    for _ in 0..n {
        let byte = hw.read_byte(ctx.pointer);
        hw.push_in(byte);
        ctx.pointer = ctx.pointer.wrapping_add(1);
    }
    ctx.remaining -= n;
}

/// Consumes one OUT chunk into the staging latch, committing each page
/// as it fills.
///
/// Nothing reaches permanent storage until a full page has been staged;
/// a transfer aborted mid-page leaves flash untouched.
pub(crate) fn write_chunk<H>(hw: &mut H, ctx: &mut TransferContext, data: &[u8])
where
    H: ProgramMemory + Watchdog,
{
    let page_mask = H::PAGE_SIZE - 1;

    for pair in data.chunks_exact(2) {
        let word = u16::from_le_bytes([pair[0], pair[1]]);
        hw.stage_word(ctx.pointer, word);
        ctx.pointer = ctx.pointer.wrapping_add(2);

        if ctx.pointer & page_mask == 0 {
            // A full page is staged and the pointer is its address.
            hw.erase_page(ctx.pointer);
            wait_spm(hw);
            hw.program_page(ctx.pointer);
            wait_spm(hw);
            hw.rww_resume();
        }
    }

    ctx.remaining = ctx.remaining.saturating_sub(data.len() as u16);
}

fn wait_spm<H: ProgramMemory + Watchdog>(hw: &mut H) {
    while hw.spm_busy() {
        hw.feed();
    }
}
