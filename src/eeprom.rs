//! EEPROM engine: byte-granular blocking reads and writes.

use crate::device::TransferContext;
use crate::hal::{ControlEndpoint, Eeprom, Watchdog};

/// Produces one IN chunk of EEPROM bytes.
pub(crate) fn read_chunk<H>(hw: &mut H, ctx: &mut TransferContext)
where
    H: ControlEndpoint + Eeprom,
{
    let n = ctx.remaining.min(H::MAX_PACKET);
    for _ in 0..n {
        let byte = hw.read(ctx.pointer);
        hw.push_in(byte);
        ctx.pointer = ctx.pointer.wrapping_add(1);
    }
    ctx.remaining -= n;
}

/// Consumes one OUT chunk, writing it byte by byte.
///
/// The hardware acknowledges each byte before the next one is issued,
/// so the whole chunk is written synchronously; the watchdog is fed
/// throughout the wait.
pub(crate) fn write_chunk<H>(hw: &mut H, ctx: &mut TransferContext, data: &[u8])
where
    H: Eeprom + Watchdog,
{
    for &byte in data {
        hw.write_start(ctx.pointer, byte);
        while hw.busy() {
            hw.feed();
        }
        ctx.pointer = ctx.pointer.wrapping_add(1);
        ctx.remaining = ctx.remaining.saturating_sub(1);
    }
}
