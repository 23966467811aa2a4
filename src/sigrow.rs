//! Special-row reader for the signature and lock/fuse bytes.
//!
//! These reads bypass the generic data-phase loop entirely: the bytes
//! go straight into the IN FIFO while the setup packet is still being
//! handled, and the `ReadData` phase that follows only advances
//! counters.

use crate::hal::{ControlEndpoint, RowSelect, SpecialRow};

/// Number of signature bytes, at offsets 0, 2 and 4 of the row.
pub const SIGNATURE_LEN: u16 = 3;
/// Number of lock/fuse bytes, at offsets 0 through 3.
pub const LOCK_LEN: u16 = 4;

/// Reads the selected row into the IN FIFO. The loaded bytes form the
/// single short packet the transfer will produce.
pub(crate) fn load<H: ControlEndpoint + SpecialRow>(hw: &mut H, select: RowSelect) {
    let (stride, count) = match select {
        RowSelect::Signature => (2, SIGNATURE_LEN),
        RowSelect::LockAndFuse => (1, LOCK_LEN),
    };

    let mut offset = 0u8;
    for _ in 0..count {
        let byte = hw.read_row(select, offset);
        hw.push_in(byte);
        offset += stride;
    }
}
