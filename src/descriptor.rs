//! The descriptor table and the canonical descriptor images.
//!
//! The protocol engine only ever sees descriptors as {base address,
//! size} pairs pointing into program memory; where the bytes actually
//! live is the build's business. The builder functions below produce
//! the standard images a build places there.

/// One descriptor: a base address in program memory and its size.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    /// Program-memory address of the first byte.
    pub base: u16,
    /// Size in bytes.
    pub len: u8,
}

/// The immutable pair of descriptors the device serves during
/// enumeration.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorTable {
    /// The device descriptor.
    pub device: Descriptor,
    /// The configuration descriptor set (configuration + interface).
    pub configuration: Descriptor,
}

const DESCRIPTOR_TYPE_DEVICE: u8 = 1;
const DESCRIPTOR_TYPE_CONFIGURATION: u8 = 2;
const DESCRIPTOR_TYPE_INTERFACE: u8 = 4;

/// Size of [`device_descriptor`]'s image.
pub const DEVICE_DESCRIPTOR_LEN: u8 = 18;
/// Size of [`configuration_descriptor`]'s image.
pub const CONFIGURATION_DESCRIPTOR_LEN: u8 = 18;

impl DescriptorTable {
    /// Selects a descriptor by the `wValue` of a `GetDescriptor`
    /// request: the high byte is the descriptor type.
    pub fn select(&self, value: u16) -> Option<Descriptor> {
        match (value >> 8) as u8 {
            DESCRIPTOR_TYPE_DEVICE => Some(self.device),
            DESCRIPTOR_TYPE_CONFIGURATION => Some(self.configuration),
            _ => None,
        }
    }
}

/// Builds the 18-byte USB 1.1 device descriptor: vendor class, one
/// configuration, no strings.
pub const fn device_descriptor(vendor_id: u16, product_id: u16, max_packet: u8) -> [u8; 18] {
    [
        DEVICE_DESCRIPTOR_LEN,
        DESCRIPTOR_TYPE_DEVICE,
        // bcdUSB 1.1
        0x10,
        0x01,
        // vendor-defined class, no subclass/protocol
        0xff,
        0x00,
        0x00,
        max_packet,
        vendor_id as u8,
        (vendor_id >> 8) as u8,
        product_id as u8,
        (product_id >> 8) as u8,
        // bcdDevice
        0x50,
        0x00,
        // iManufacturer, iProduct, iSerialNumber
        0,
        0,
        0,
        // bNumConfigurations
        1,
    ]
}

/// Builds the 18-byte configuration descriptor set: one bus-powered
/// 100 mA configuration with a single vendor interface and no
/// endpoints beyond the control endpoint.
pub const fn configuration_descriptor() -> [u8; 18] {
    [
        9,
        DESCRIPTOR_TYPE_CONFIGURATION,
        // wTotalLength
        CONFIGURATION_DESCRIPTOR_LEN,
        0,
        // bNumInterfaces, bConfigurationValue, iConfiguration
        1,
        1,
        0,
        // bmAttributes: bus powered
        0x80,
        // bMaxPower: 100mA
        50,
        // interface descriptor
        9,
        DESCRIPTOR_TYPE_INTERFACE,
        // bInterfaceNumber, bAlternateSetting, bNumEndpoints
        0,
        0,
        0,
        // vendor-defined class, no subclass/protocol
        0xff,
        0x00,
        0x00,
        // iInterface
        0,
    ]
}
