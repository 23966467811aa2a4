//! Hardware capability traits consumed by the protocol engine.
//!
//! The engine never touches registers directly. Everything it needs from
//! the chip is expressed as a narrow trait here: control-endpoint I/O,
//! flash self-programming, EEPROM access, special-row reads, and the
//! watchdog. A target port implements these over its registers; tests
//! implement them over plain memory.

/// A single control-endpoint hardware event.
///
/// These mirror the per-endpoint event flags of a polled USB device
/// controller. Each variant is one bit of the event-flag register
/// returned by [`ControlEndpoint::events`], so a set of pending events
/// is an ordinary bit mask.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A SETUP token arrived; an 8-byte setup packet is ready to read.
    Setup = 0x01,
    /// An OUT token delivered a packet of host-to-device data.
    OutData = 0x02,
    /// The IN bank is free: either the host is ready for the next
    /// device-to-host packet, or the previously armed packet (possibly
    /// a zero-length status ack) has been accepted.
    InReady = 0x04,
    /// The host signalled the end of the data stage of a control write
    /// by requesting the status handshake.
    DataEnd = 0x08,
}

impl Event {
    /// Returns the lowest-order event set in `flags`, if any.
    ///
    /// The engine processes exactly one event per loop iteration; when
    /// several are pending, the lowest bit wins and the rest stay
    /// queued in the hardware register.
    pub fn lowest_pending(flags: u8) -> Option<Event> {
        for ev in [Event::Setup, Event::OutData, Event::InReady, Event::DataEnd] {
            if flags & ev as u8 != 0 {
                return Some(ev);
            }
        }
        None
    }
}

/// The device's single bidirectional control endpoint.
///
/// The endpoint owns two hardware FIFOs (one per direction) and an
/// event-flag register. All transfers in this protocol run through it.
pub trait ControlEndpoint {
    /// Maximum packet size of the control endpoint in bytes.
    ///
    /// `8` for a low-speed attach, otherwise the largest size the bus
    /// allows. Must be a power of two.
    const MAX_PACKET: u16 = 64;

    /// Returns the raw pending event flags (a mask of [`Event`] bits).
    fn events(&mut self) -> u8;

    /// Clears exactly one event flag, leaving every other pending flag
    /// queued.
    ///
    /// Register-level implementations do this by writing the flag
    /// register with all bits set except the one being acknowledged.
    fn clear_event(&mut self, event: Event);

    /// Returns `true` once per USB bus reset, then rearms.
    fn take_bus_reset(&mut self) -> bool;

    /// Reinitializes the endpoint after a bus reset.
    fn reinit(&mut self);

    /// Copies the captured 8-byte setup packet out of the hardware.
    fn read_setup(&mut self, buf: &mut [u8; 8]);

    /// Drains the pending OUT packet into `buf`, returning its length.
    fn read_packet(&mut self, buf: &mut [u8]) -> usize;

    /// Appends one byte to the IN FIFO without arming it.
    fn push_in(&mut self, byte: u8);

    /// Arms the IN FIFO for transmission. An empty FIFO is sent as a
    /// zero-length packet (the status ack of a control write).
    fn complete_in(&mut self);

    /// STALLs the endpoint, rejecting the current transfer. The stall
    /// condition clears when the next SETUP token arrives.
    fn stall(&mut self);

    /// Commits a device address assigned by the host and enables it.
    /// Called only after the status stage of `SetAddress` completes.
    fn commit_address(&mut self, address: u8);
}

/// Flash self-programming: page-granular erase and write through the
/// hardware staging latch, plus plain program-memory reads.
pub trait ProgramMemory {
    /// Size in bytes of one flash page, the unit the hardware erases
    /// and programs atomically. Must be a power of two.
    const PAGE_SIZE: u16 = 128;

    /// Reads one byte of program memory.
    fn read_byte(&mut self, address: u16) -> u8;

    /// Latches one little-endian word into the page staging buffer.
    /// Only the low page-offset bits of `address` select the slot.
    fn stage_word(&mut self, address: u16, word: u16);

    /// Clears the staging buffer, discarding anything latched so far.
    fn reset_staging(&mut self);

    /// Starts erasing the page containing `address`.
    fn erase_page(&mut self, address: u16);

    /// Starts programming the staged buffer into the page containing
    /// `address`.
    fn program_page(&mut self, address: u16);

    /// Re-enables the read-while-write section after a commit.
    fn rww_resume(&mut self);

    /// Returns `true` while a self-programming operation is running.
    fn spm_busy(&mut self) -> bool;
}

/// Byte-granular EEPROM access.
///
/// Writes are started per byte and acknowledged by hardware; the engine
/// polls [`Eeprom::busy`] before issuing the next one.
pub trait Eeprom {
    /// Reads one EEPROM byte synchronously.
    fn read(&mut self, address: u16) -> u8;

    /// Starts the erase+write sequence for one byte.
    fn write_start(&mut self, address: u16, value: u8);

    /// Returns `true` while a byte write is still in progress.
    fn busy(&mut self) -> bool;
}

/// Addressing mode selector for [`SpecialRow::read_row`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RowSelect {
    /// The device signature row.
    Signature,
    /// The lock and fuse bytes.
    LockAndFuse,
}

/// Reader for the signature and lock/fuse rows, which live behind a
/// special addressing mode of the self-programming unit.
pub trait SpecialRow {
    /// Reads one byte at `offset` within the selected row.
    fn read_row(&mut self, select: RowSelect, offset: u8) -> u8;
}

/// The watchdog timer: safety net during blocking waits and the sole
/// reboot mechanism.
pub trait Watchdog {
    /// Resets the watchdog counter. Called at bounded intervals inside
    /// every busy-wait; the watchdog timeout is the upper bound on any
    /// single blocking operation.
    fn feed(&mut self);

    /// Spins without ever feeding the watchdog until it fires and
    /// resets the device. This is the only exit from the protocol
    /// engine.
    fn reboot(&mut self) -> !;
}

/// Everything the protocol engine needs from the chip.
///
/// Blanket-implemented for any type providing the individual
/// capabilities, so a target port just implements the five traits above
/// on its hardware singleton.
pub trait Hardware: ControlEndpoint + ProgramMemory + Eeprom + SpecialRow + Watchdog {}

impl<T> Hardware for T where T: ControlEndpoint + ProgramMemory + Eeprom + SpecialRow + Watchdog {}

/// Chip-level controls used once at reset by the boot dispatcher,
/// before (or instead of) entering the protocol loop.
pub trait SystemControl {
    /// Reads and clears the hardware reset-cause register. The raw
    /// value must be preserved somewhere the application can inspect
    /// after the bootloader hands over.
    fn take_reset_cause(&mut self) -> crate::boot::ResetCause;

    /// Disables the watchdog. It persists across resets and must not
    /// fire before the main application reconfigures it.
    fn watchdog_disable(&mut self);

    /// Arms the watchdog as the bootloader's safety net.
    fn watchdog_arm(&mut self);

    /// Starts the clock multiplier feeding the USB peripheral.
    fn start_clock(&mut self);

    /// Returns `true` once the clock multiplier has locked.
    fn clock_ready(&mut self) -> bool;

    /// Configures and attaches the USB peripheral.
    fn attach_usb(&mut self);

    /// Jumps to the resident application's entry point.
    fn run_application(&mut self) -> !;
}
