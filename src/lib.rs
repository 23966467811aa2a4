#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! Minimal USB bootloader protocol engine for a polled control
//! endpoint.
//!
//! ## About
//!
//! A device running this engine exposes a vendor-defined
//! control-transfer protocol on its default control endpoint, letting a
//! host read and write program memory, read and write EEPROM, read the
//! signature and lock/fuse bytes, and reboot into the resident
//! application. It performs just enough enumeration to get addressed
//! and configured (device and configuration descriptors, `SetAddress`,
//! `SetConfiguration`) and nothing else: one endpoint, control
//! transfers only, no interrupts, a single polled loop.
//!
//! This crate is the protocol implementation only. Register access is
//! behind the capability traits in [`hal`]; a target port implements
//! them over its USB, self-programming, EEPROM and watchdog registers,
//! and the tests implement them over plain arrays.
//!
//! ### Protocol
//!
//! Commands are plain setup packets: the direction/type bits of
//! `bmRequestType` combined with the low nibble of `bRequest` name one
//! of ten commands, `wValue` is the target address, `wLength` the
//! transfer length. Anything else, be it reserved bits, unknown codes
//! or unaligned flash writes, is answered with a STALL and nothing
//! more; there is no status payload or diagnostic channel.
//!
//! Flash writes are staged in the hardware page latch and committed
//! erase-then-write at every page boundary, so an aborted transfer
//! never leaves a half-written page. EEPROM writes block per byte until
//! the hardware acknowledges. Every busy-wait feeds the watchdog; the
//! watchdog timeout bounds every blocking operation and, left unfed on
//! purpose, is also how [`Reboot`](setup::Command::Reboot) works.
//!
//! ## Example
//!
//! The port below backs everything with RAM so the example is
//! self-contained; a real port reads and writes its peripheral
//! registers instead.
//!
//! ```no_run
//! use usbboot::*;
//!
//! struct MyHw {
//!     flash: [u8; 4096],
//!     latch: [u8; 128],
//!     eeprom: [u8; 256],
//!     in_fifo: [u8; 64],
//!     in_len: usize,
//! }
//!
//! impl ControlEndpoint for MyHw {
//!     fn events(&mut self) -> u8 {
//!         0 // read the endpoint interrupt flags
//!     }
//!     fn clear_event(&mut self, _event: Event) {}
//!     fn take_bus_reset(&mut self) -> bool {
//!         false
//!     }
//!     fn reinit(&mut self) {}
//!     fn read_setup(&mut self, _buf: &mut [u8; 8]) {}
//!     fn read_packet(&mut self, _buf: &mut [u8]) -> usize {
//!         0
//!     }
//!     fn push_in(&mut self, byte: u8) {
//!         self.in_fifo[self.in_len] = byte;
//!         self.in_len += 1;
//!     }
//!     fn complete_in(&mut self) {
//!         self.in_len = 0;
//!     }
//!     fn stall(&mut self) {}
//!     fn commit_address(&mut self, _address: u8) {}
//! }
//!
//! impl ProgramMemory for MyHw {
//!     fn read_byte(&mut self, address: u16) -> u8 {
//!         self.flash[address as usize]
//!     }
//!     fn stage_word(&mut self, address: u16, word: u16) {
//!         let slot = (address & (Self::PAGE_SIZE - 1)) as usize;
//!         self.latch[slot..slot + 2].copy_from_slice(&word.to_le_bytes());
//!     }
//!     fn reset_staging(&mut self) {
//!         self.latch.fill(0xff);
//!     }
//!     fn erase_page(&mut self, address: u16) {
//!         let page = (address & !(Self::PAGE_SIZE - 1)) as usize;
//!         self.flash[page..page + 128].fill(0xff);
//!     }
//!     fn program_page(&mut self, address: u16) {
//!         let page = (address & !(Self::PAGE_SIZE - 1)) as usize;
//!         self.flash[page..page + 128].copy_from_slice(&self.latch);
//!     }
//!     fn rww_resume(&mut self) {}
//!     fn spm_busy(&mut self) -> bool {
//!         false
//!     }
//! }
//!
//! impl Eeprom for MyHw {
//!     fn read(&mut self, address: u16) -> u8 {
//!         self.eeprom[address as usize]
//!     }
//!     fn write_start(&mut self, address: u16, value: u8) {
//!         self.eeprom[address as usize] = value;
//!     }
//!     fn busy(&mut self) -> bool {
//!         false
//!     }
//! }
//!
//! impl SpecialRow for MyHw {
//!     fn read_row(&mut self, _select: RowSelect, offset: u8) -> u8 {
//!         offset // signature/fuse read via the self-programming unit
//!     }
//! }
//!
//! impl Watchdog for MyHw {
//!     fn feed(&mut self) {}
//!     fn reboot(&mut self) -> ! {
//!         loop {} // never feed again; the watchdog resets the chip
//!     }
//! }
//!
//! let hw = MyHw {
//!     flash: [0xff; 4096],
//!     latch: [0xff; 128],
//!     eeprom: [0xff; 256],
//!     in_fifo: [0; 64],
//!     in_len: 0,
//! };
//!
//! // The build places the descriptor bytes in program memory; the
//! // engine only needs to know where.
//! let table = DescriptorTable {
//!     device: Descriptor { base: 0x0f00, len: 18 },
//!     configuration: Descriptor { base: 0x0f12, len: 18 },
//! };
//!
//! let mut device = Bootloader::new(hw, table);
//! loop {
//!     device.poll();
//! }
//! ```
//!
//! On a real target the reset path goes through [`boot::run`] instead,
//! which inspects the reset cause and either jumps to the application
//! or brings the bootloader up.

pub mod boot;
pub mod descriptor;
pub mod device;
pub mod eeprom;
pub mod flash;
pub mod hal;
pub mod setup;
pub mod sigrow;

#[doc(inline)]
pub use crate::boot::ResetCause;
#[doc(inline)]
pub use crate::descriptor::{Descriptor, DescriptorTable};
#[doc(inline)]
pub use crate::device::{Bootloader, TransferPhase};
#[doc(inline)]
pub use crate::hal::{
    ControlEndpoint, Eeprom, Event, Hardware, ProgramMemory, RowSelect, SpecialRow, SystemControl,
    Watchdog,
};
#[doc(inline)]
pub use crate::setup::{Command, RequestError, SetupPacket};
