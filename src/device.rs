//! The endpoint transfer-phase state machine.
//!
//! [`Bootloader`] owns the hardware and all persistent protocol state:
//! the current phase, the command of the transfer in flight and its
//! pointer/length context. One call to [`Bootloader::poll`] handles at
//! most one endpoint event; everything else stays queued in the
//! hardware flags for the next iteration.

use crate::descriptor::DescriptorTable;
use crate::eeprom;
use crate::flash;
use crate::hal::{ControlEndpoint, Event, Hardware, Watchdog};
use crate::setup::{self, Command, SetupPacket};

// Upper bound for the OUT packet stack buffer; control endpoints never
// exceed 64 bytes.
const PACKET_BUF: usize = 64;

/// The phase of the control transfer currently in flight.
///
/// Exactly one phase is active at a time. Any bus reset or STALL forces
/// a return to [`TransferPhase::Idle`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferPhase {
    /// No transfer in flight; only a SETUP token is accepted.
    Idle,
    /// Data stage of a control write: consuming OUT packets.
    WriteData,
    /// Status stage of a control write: waiting for the host to accept
    /// the zero-length ack.
    WriteStatus,
    /// Data stage of a control read: producing IN packets.
    ReadData,
}

impl TransferPhase {
    /// The event flags relevant to this phase; everything else stays
    /// queued untouched.
    fn event_mask(self) -> u8 {
        match self {
            TransferPhase::Idle => Event::Setup as u8,
            TransferPhase::WriteData => Event::OutData as u8 | Event::DataEnd as u8,
            TransferPhase::WriteStatus => Event::InReady as u8,
            TransferPhase::ReadData => Event::InReady as u8,
        }
    }
}

/// The byte pointer and remaining-length counter of the transfer in
/// flight. Created when the SETUP phase completes and consumed
/// monotonically during the data phase.
#[derive(Clone, Copy, Default, Debug)]
pub(crate) struct TransferContext {
    /// Target address; which address space it names depends on the
    /// command.
    pub pointer: u16,
    /// Bytes left to transfer.
    pub remaining: u16,
}

/// The bootloader protocol engine.
///
/// Construct one per device and call [`poll`](Bootloader::poll) from
/// the main loop. There is no other entry point: the engine is fully
/// polled, single-context and interrupt-free.
pub struct Bootloader<H: Hardware> {
    hw: H,
    table: DescriptorTable,
    phase: TransferPhase,
    command: Option<Command>,
    context: TransferContext,
}

impl<H: Hardware> Bootloader<H> {
    /// Creates the engine over its hardware and descriptor table.
    pub fn new(hw: H, table: DescriptorTable) -> Self {
        Bootloader {
            hw,
            table,
            phase: TransferPhase::Idle,
            command: None,
            context: TransferContext::default(),
        }
    }

    /// Current transfer phase.
    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Runs one iteration of the protocol loop.
    ///
    /// A pending bus reset wins over everything and reinitializes the
    /// endpoint, discarding any in-flight transfer (a partially staged
    /// flash page is simply dropped; nothing has reached permanent
    /// storage). Otherwise the lowest-order pending event relevant to
    /// the current phase is handled, and only its flag is cleared.
    pub fn poll(&mut self) {
        if self.hw.take_bus_reset() {
            self.hw.reinit();
            self.enter_idle();
            return;
        }

        let pending = self.hw.events() & self.phase.event_mask();
        let event = match Event::lowest_pending(pending) {
            Some(ev) => ev,
            None => return,
        };

        match (self.phase, event) {
            (TransferPhase::Idle, Event::Setup) => self.handle_setup(),
            (TransferPhase::WriteData, Event::OutData) => self.handle_out(),
            (TransferPhase::WriteData, Event::DataEnd) => {
                // Queue the zero-length status ack and wait for the
                // host to take it.
                self.hw.complete_in();
                self.phase = TransferPhase::WriteStatus;
            }
            (TransferPhase::WriteStatus, Event::InReady) => self.finish_status(),
            (TransferPhase::ReadData, Event::InReady) => self.handle_in(),
            _ => {}
        }

        self.hw.clear_event(event);
    }

    /// Consumes the engine, returning the hardware.
    pub fn release(self) -> H {
        self.hw
    }

    fn enter_idle(&mut self) {
        self.phase = TransferPhase::Idle;
        self.command = None;
        self.context = TransferContext::default();
    }

    fn handle_setup(&mut self) {
        let mut raw = [0u8; 8];
        self.hw.read_setup(&mut raw);
        let packet = SetupPacket::from_bytes(&raw);

        match setup::dispatch(&mut self.hw, &self.table, &packet) {
            Ok(plan) => {
                self.command = Some(plan.command);
                self.context = TransferContext {
                    pointer: plan.pointer,
                    remaining: plan.remaining,
                };
                // Zero-data control writes take the WriteData path too;
                // they just see the end-of-data event straight away.
                self.phase = if plan.command.is_device_to_host() {
                    TransferPhase::ReadData
                } else {
                    TransferPhase::WriteData
                };
            }
            Err(_) => {
                self.hw.stall();
                self.enter_idle();
            }
        }
    }

    fn handle_out(&mut self) {
        let mut buf = [0u8; PACKET_BUF];
        let n = self.hw.read_packet(&mut buf);

        match self.command {
            Some(Command::SetProgMem) => {
                flash::write_chunk(&mut self.hw, &mut self.context, &buf[..n])
            }
            Some(Command::SetEeprom) => {
                eeprom::write_chunk(&mut self.hw, &mut self.context, &buf[..n])
            }
            // Zero-data commands never receive OUT data; anything that
            // still arrives is drained and dropped.
            _ => {}
        }
    }

    fn handle_in(&mut self) {
        match self.command {
            Some(Command::GetDescriptor) | Some(Command::GetProgMem) => {
                flash::read_chunk(&mut self.hw, &mut self.context)
            }
            Some(Command::GetEeprom) => eeprom::read_chunk(&mut self.hw, &mut self.context),
            Some(Command::GetSignature) | Some(Command::GetLock) => {
                // The FIFO was populated during SETUP handling; it must
                // not be refetched. The single short packet ends the
                // transfer regardless of the requested length.
                self.context.remaining = 0;
            }
            _ => {}
        }

        self.hw.complete_in();

        if self.context.remaining == 0 {
            self.enter_idle();
        }
    }

    fn finish_status(&mut self) {
        match self.command {
            Some(Command::SetAddress) => {
                let address = (self.context.pointer as u8) & 0x7f;
                self.hw.commit_address(address);
            }
            Some(Command::Reboot) => self.hw.reboot(),
            _ => {}
        }
        self.enter_idle();
    }
}
