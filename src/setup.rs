//! SETUP packet decoding and command dispatch.
//!
//! Every control transfer begins with an 8-byte setup packet. This
//! module turns it into a [`Command`] plus the transfer pointer and
//! length, applying the per-command validation and setup work: length
//! clamping for descriptor reads, the alignment check and pointer
//! rewind for flash writes, and the immediate FIFO prefill for
//! signature and lock reads.

use crate::descriptor::DescriptorTable;
use crate::hal::{ControlEndpoint, ProgramMemory, RowSelect, SpecialRow};
use crate::sigrow;

/// `bRequest` low nibble of the standard `GET_DESCRIPTOR` request.
pub const REQ_GET_DESCRIPTOR: u8 = 0x06;
/// `bRequest` low nibble of the standard `SET_ADDRESS` request.
pub const REQ_SET_ADDRESS: u8 = 0x05;
/// `bRequest` low nibble of the standard `SET_CONFIGURATION` request.
pub const REQ_SET_CONFIGURATION: u8 = 0x09;
/// Vendor request: read the device signature row.
pub const REQ_GET_SIGNATURE: u8 = 0x01;
/// Vendor request: read program memory.
pub const REQ_GET_PROG_MEM: u8 = 0x02;
/// Vendor request: write program memory.
pub const REQ_SET_PROG_MEM: u8 = 0x03;
/// Vendor request: reboot into the resident application.
pub const REQ_REBOOT: u8 = 0x04;
/// Vendor request: read EEPROM.
pub const REQ_GET_EEPROM: u8 = 0x05;
/// Vendor request: write EEPROM.
pub const REQ_SET_EEPROM: u8 = 0x06;
/// Vendor request: read the lock and fuse bytes.
pub const REQ_GET_LOCK: u8 = 0x07;

const DIR_IN: u8 = 0x80;
const TYPE_VENDOR: u8 = 0x40;
// Type low bit and all recipient bits. Must be zero in every request
// this protocol accepts, otherwise command codes would collide.
const RESERVED_TYPE_BITS: u8 = 0x3f;

/// The 8-byte USB setup packet, captured atomically at the start of a
/// control transfer and immutable for its duration.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    /// `bmRequestType`: direction, type and recipient bits.
    pub request_type: u8,
    /// `bRequest` code.
    pub request: u8,
    /// `wValue`: the transfer pointer, or the descriptor selector.
    pub value: u16,
    /// `wIndex`, unused by this protocol.
    pub index: u16,
    /// `wLength`: the host's requested transfer length.
    pub length: u16,
}

impl SetupPacket {
    /// Decodes the raw 8 bytes read from the endpoint FIFO.
    pub fn from_bytes(raw: &[u8; 8]) -> Self {
        SetupPacket {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }
}

/// The ten commands of the protocol.
///
/// A command is the combination of the direction/type bits of
/// `bmRequestType` with the low nibble of `bRequest`; every other bit
/// pattern is rejected with a STALL. The command is fixed for the life
/// of one transfer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Standard descriptor read during enumeration.
    GetDescriptor,
    /// Standard address assignment; committed at the status stage.
    SetAddress,
    /// Standard configuration selection; acknowledged, no state change.
    SetConfiguration,
    /// Read the 3 signature bytes.
    GetSignature,
    /// Read program memory at an arbitrary address.
    GetProgMem,
    /// Write program memory, one or more whole pages.
    SetProgMem,
    /// Reboot into the resident application via the watchdog.
    Reboot,
    /// Read EEPROM.
    GetEeprom,
    /// Write EEPROM.
    SetEeprom,
    /// Read the 4 lock/fuse bytes.
    GetLock,
}

impl Command {
    /// `true` for device-to-host commands, which run the `ReadData`
    /// phase; host-to-device commands run `WriteData`.
    pub fn is_device_to_host(self) -> bool {
        matches!(
            self,
            Command::GetDescriptor
                | Command::GetSignature
                | Command::GetProgMem
                | Command::GetEeprom
                | Command::GetLock
        )
    }
}

/// Reasons a setup packet is rejected. All of them STALL the endpoint;
/// none of them are reported to the host in any other way.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// Reserved bits of `bmRequestType` or the high nibble of
    /// `bRequest` are set.
    ReservedBits,
    /// The direction/type/request combination is not one of the ten
    /// commands.
    UnknownRequest,
    /// `GetDescriptor` selected a descriptor the table does not have.
    BadDescriptor,
    /// `SetProgMem` address or length is not a page multiple.
    Misaligned,
}

/// Derives the command from a validated setup packet.
pub fn decode(setup: &SetupPacket) -> Result<Command, RequestError> {
    if setup.request_type & RESERVED_TYPE_BITS != 0 || setup.request & 0xf0 != 0 {
        return Err(RequestError::ReservedBits);
    }

    let vendor = setup.request_type & TYPE_VENDOR != 0;
    let device_to_host = setup.request_type & DIR_IN != 0;

    let command = match (vendor, device_to_host, setup.request) {
        (false, true, REQ_GET_DESCRIPTOR) => Command::GetDescriptor,
        (false, false, REQ_SET_ADDRESS) => Command::SetAddress,
        (false, false, REQ_SET_CONFIGURATION) => Command::SetConfiguration,
        (true, true, REQ_GET_SIGNATURE) => Command::GetSignature,
        (true, true, REQ_GET_PROG_MEM) => Command::GetProgMem,
        (true, false, REQ_SET_PROG_MEM) => Command::SetProgMem,
        (true, false, REQ_REBOOT) => Command::Reboot,
        (true, true, REQ_GET_EEPROM) => Command::GetEeprom,
        (true, false, REQ_SET_EEPROM) => Command::SetEeprom,
        (true, true, REQ_GET_LOCK) => Command::GetLock,
        _ => return Err(RequestError::UnknownRequest),
    };
    Ok(command)
}

/// A decoded transfer: the command plus the initial pointer and
/// remaining-length counter the data phase will consume.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Plan {
    pub command: Command,
    pub pointer: u16,
    pub remaining: u16,
}

/// Validates a setup packet and performs the command's setup work.
///
/// The pointer is always `wValue` unless the command says otherwise;
/// the length is always the host's request unless the command clamps
/// it. Signature and lock bytes are produced right here, before the
/// state machine ever enters the data phase.
pub(crate) fn dispatch<H>(
    hw: &mut H,
    table: &DescriptorTable,
    setup: &SetupPacket,
) -> Result<Plan, RequestError>
where
    H: ControlEndpoint + ProgramMemory + SpecialRow,
{
    let command = decode(setup)?;
    let mut pointer = setup.value;
    let mut remaining = setup.length;

    match command {
        Command::GetDescriptor => {
            // Short reads of a descriptor prefix are normal during
            // enumeration; reads past the end never are.
            let desc = table
                .select(setup.value)
                .ok_or(RequestError::BadDescriptor)?;
            pointer = desc.base;
            remaining = setup.length.min(desc.len as u16);
        }
        Command::SetProgMem => {
            let mask = H::PAGE_SIZE - 1;
            if setup.value & mask != 0 || setup.length & mask != 0 {
                return Err(RequestError::Misaligned);
            }
            // Rewind by one page so that after a page's worth of words
            // the pointer lands exactly on the page to program.
            pointer = setup.value.wrapping_sub(H::PAGE_SIZE);
            hw.reset_staging();
        }
        Command::GetSignature => sigrow::load(hw, RowSelect::Signature),
        Command::GetLock => sigrow::load(hw, RowSelect::LockAndFuse),
        _ => {}
    }

    Ok(Plan {
        command,
        pointer,
        remaining,
    })
}
