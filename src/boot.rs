//! Reset-cause dispatch: decide at power-up whether to run the
//! resident application or bring up the bootloader.

use crate::descriptor::DescriptorTable;
use crate::device::Bootloader;
use crate::hal::{Hardware, SystemControl, Watchdog};

/// The hardware-latched record of what triggered the most recent
/// reset. Bit assignments follow the MCU's reset-cause register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetCause(pub u8);

impl ResetCause {
    /// Power-on reset.
    pub const POWER_ON: u8 = 0x01;
    /// External reset pin.
    pub const EXTERNAL: u8 = 0x02;
    /// Brown-out detector.
    pub const BROWN_OUT: u8 = 0x04;
    /// Watchdog timeout.
    pub const WATCHDOG: u8 = 0x08;
    /// JTAG reset.
    pub const JTAG: u8 = 0x10;
    /// USB-triggered reset.
    pub const USB: u8 = 0x20;

    /// Raw register value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `true` when this cause hands control straight to the resident
    /// application instead of the bootloader.
    ///
    /// That is the case for exactly watchdog+external simultaneously
    /// (the application rebooted itself on purpose), and for any cause
    /// with none of brown-out, watchdog, power-on or USB set.
    pub const fn skips_bootloader(self) -> bool {
        const ENTER_MASK: u8 =
            ResetCause::BROWN_OUT | ResetCause::WATCHDOG | ResetCause::POWER_ON | ResetCause::USB;

        self.0 == (ResetCause::WATCHDOG | ResetCause::EXTERNAL) || self.0 & ENTER_MASK == 0
    }
}

/// Entry point on every hardware reset.
///
/// Captures and clears the reset cause (the raw value stays available
/// for the application), disables the watchdog before it can fire
/// again, and either jumps to the application or brings the bootloader
/// up: watchdog re-armed as a safety net, clock multiplier locked, USB
/// attached, then the protocol loop forever.
pub fn run<H>(mut hw: H, table: DescriptorTable) -> !
where
    H: Hardware + SystemControl,
{
    let cause = hw.take_reset_cause();
    hw.watchdog_disable();

    if cause.skips_bootloader() {
        hw.run_application();
    }

    hw.watchdog_arm();
    hw.start_clock();
    while !hw.clock_ready() {
        hw.feed();
    }
    hw.attach_usb();

    let mut device = Bootloader::new(hw, table);
    loop {
        device.poll();
    }
}
