// Shared by every integration test crate; not all of them use all of it.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use usbboot::*;

pub const PAGE: u16 = 128;
pub const MAX_PACKET: u16 = 8;
pub const FLASH_SIZE: usize = 0x8000;
pub const EEPROM_SIZE: usize = 1024;

pub const VENDOR_ID: u16 = 0x1209;
pub const PRODUCT_ID: u16 = 0xb007;

// Where the build "links" the descriptor images in the mock flash.
pub const DEVICE_DESC_BASE: u16 = 0x7000;
pub const CONFIG_DESC_BASE: u16 = 0x7012;

// Signature bytes live at even offsets of their row; the odd slots
// hold filler so a wrong stride shows up in the data.
pub const SIGNATURE: [u8; 3] = [0x1e, 0x95, 0x87];
pub const FUSES: [u8; 4] = [0xef, 0x5e, 0xd8, 0xcb];

const SPM_BUSY_CYCLES: u32 = 3;
const EEPROM_BUSY_CYCLES: u32 = 2;

#[derive(Debug, PartialEq, Eq)]
pub enum EpErr {
    Stalled,
}

pub struct MockIo {
    // control endpoint
    pub events: u8,
    pub setup: [u8; 8],
    pub out_packets: VecDeque<Vec<u8>>,
    pub in_staged: Vec<u8>,
    pub in_sent: VecDeque<Vec<u8>>,
    pub stalled: bool,
    pub address: Option<u8>,
    pub bus_reset: bool,
    pub reinit_count: u32,
    // flash + staging latch
    pub flash: Vec<u8>,
    pub latch: [u8; PAGE as usize],
    pub erased_pages: Vec<u16>,
    pub programmed_pages: Vec<u16>,
    pub rww_resumes: u32,
    spm_busy_left: u32,
    // eeprom
    pub eeprom: Vec<u8>,
    pub eeprom_write_order: Vec<u16>,
    eeprom_busy_left: u32,
    // watchdog
    pub feeds: u32,
    // reset/boot controls
    pub reset_cause: u8,
    pub cause_cleared: bool,
    pub watchdog_disabled: bool,
    pub watchdog_armed: bool,
    pub clock_wait: u32,
    pub usb_attached: bool,
}

impl MockIo {
    fn new() -> Self {
        let mut flash = vec![0xff; FLASH_SIZE];

        let dev = descriptor::device_descriptor(VENDOR_ID, PRODUCT_ID, MAX_PACKET as u8);
        let conf = descriptor::configuration_descriptor();
        flash[DEVICE_DESC_BASE as usize..DEVICE_DESC_BASE as usize + dev.len()]
            .copy_from_slice(&dev);
        flash[CONFIG_DESC_BASE as usize..CONFIG_DESC_BASE as usize + conf.len()]
            .copy_from_slice(&conf);

        MockIo {
            events: 0,
            setup: [0; 8],
            out_packets: VecDeque::new(),
            in_staged: Vec::new(),
            in_sent: VecDeque::new(),
            stalled: false,
            address: None,
            bus_reset: false,
            reinit_count: 0,
            flash,
            latch: [0xff; PAGE as usize],
            erased_pages: Vec::new(),
            programmed_pages: Vec::new(),
            rww_resumes: 0,
            spm_busy_left: 0,
            eeprom: vec![0xff; EEPROM_SIZE],
            eeprom_write_order: Vec::new(),
            eeprom_busy_left: 0,
            feeds: 0,
            reset_cause: 0,
            cause_cleared: false,
            watchdog_disabled: false,
            watchdog_armed: false,
            clock_wait: 0,
            usb_attached: false,
        }
    }
}

pub struct MockHw {
    io: Rc<RefCell<MockIo>>,
}

impl ControlEndpoint for MockHw {
    const MAX_PACKET: u16 = MAX_PACKET;

    fn events(&mut self) -> u8 {
        self.io.borrow().events
    }

    fn clear_event(&mut self, event: Event) {
        self.io.borrow_mut().events &= !(event as u8);
    }

    fn take_bus_reset(&mut self) -> bool {
        let mut io = self.io.borrow_mut();
        let pending = io.bus_reset;
        io.bus_reset = false;
        pending
    }

    fn reinit(&mut self) {
        let mut io = self.io.borrow_mut();
        io.reinit_count += 1;
        io.events = 0;
        io.out_packets.clear();
        io.in_staged.clear();
        io.in_sent.clear();
        io.stalled = false;
    }

    fn read_setup(&mut self, buf: &mut [u8; 8]) {
        *buf = self.io.borrow().setup;
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> usize {
        let mut io = self.io.borrow_mut();
        match io.out_packets.pop_front() {
            Some(packet) => {
                buf[..packet.len()].copy_from_slice(&packet);
                packet.len()
            }
            None => 0,
        }
    }

    fn push_in(&mut self, byte: u8) {
        let mut io = self.io.borrow_mut();
        assert!(
            io.in_staged.len() < MAX_PACKET as usize,
            "IN FIFO overflow"
        );
        io.in_staged.push(byte);
    }

    fn complete_in(&mut self) {
        let mut io = self.io.borrow_mut();
        let packet = std::mem::take(&mut io.in_staged);
        io.in_sent.push_back(packet);
    }

    fn stall(&mut self) {
        self.io.borrow_mut().stalled = true;
    }

    fn commit_address(&mut self, address: u8) {
        self.io.borrow_mut().address = Some(address);
    }
}

impl ProgramMemory for MockHw {
    const PAGE_SIZE: u16 = PAGE;

    fn read_byte(&mut self, address: u16) -> u8 {
        self.io.borrow().flash[address as usize]
    }

    fn stage_word(&mut self, address: u16, word: u16) {
        let mut io = self.io.borrow_mut();
        assert_eq!(io.spm_busy_left, 0, "staging while self-programming busy");
        let slot = (address & (PAGE - 1)) as usize;
        let bytes = word.to_le_bytes();
        io.latch[slot] = bytes[0];
        io.latch[slot + 1] = bytes[1];
    }

    fn reset_staging(&mut self) {
        self.io.borrow_mut().latch = [0xff; PAGE as usize];
    }

    fn erase_page(&mut self, address: u16) {
        let mut io = self.io.borrow_mut();
        assert_eq!(io.spm_busy_left, 0, "erase while self-programming busy");
        let page = (address & !(PAGE - 1)) as usize;
        io.flash[page..page + PAGE as usize].fill(0xff);
        io.erased_pages.push(page as u16);
        io.spm_busy_left = SPM_BUSY_CYCLES;
    }

    fn program_page(&mut self, address: u16) {
        let mut io = self.io.borrow_mut();
        assert_eq!(io.spm_busy_left, 0, "program while self-programming busy");
        let page = (address & !(PAGE - 1)) as usize;
        for i in 0..PAGE as usize {
            // NOR flash: programming only clears bits
            io.flash[page + i] &= io.latch[i];
        }
        io.programmed_pages.push(page as u16);
        io.spm_busy_left = SPM_BUSY_CYCLES;
    }

    fn rww_resume(&mut self) {
        let mut io = self.io.borrow_mut();
        assert_eq!(io.spm_busy_left, 0, "resume while self-programming busy");
        io.rww_resumes += 1;
    }

    fn spm_busy(&mut self) -> bool {
        let mut io = self.io.borrow_mut();
        if io.spm_busy_left > 0 {
            io.spm_busy_left -= 1;
            true
        } else {
            false
        }
    }
}

impl Eeprom for MockHw {
    fn read(&mut self, address: u16) -> u8 {
        self.io.borrow().eeprom[address as usize]
    }

    fn write_start(&mut self, address: u16, value: u8) {
        let mut io = self.io.borrow_mut();
        assert_eq!(io.eeprom_busy_left, 0, "byte write issued while busy");
        io.eeprom[address as usize] = value;
        io.eeprom_write_order.push(address);
        io.eeprom_busy_left = EEPROM_BUSY_CYCLES;
    }

    fn busy(&mut self) -> bool {
        let mut io = self.io.borrow_mut();
        if io.eeprom_busy_left > 0 {
            io.eeprom_busy_left -= 1;
            true
        } else {
            false
        }
    }
}

impl SpecialRow for MockHw {
    fn read_row(&mut self, select: RowSelect, offset: u8) -> u8 {
        match select {
            RowSelect::Signature => match offset {
                0 => SIGNATURE[0],
                2 => SIGNATURE[1],
                4 => SIGNATURE[2],
                // odd offsets exist but hold nothing useful
                _ => 0xaa,
            },
            RowSelect::LockAndFuse => FUSES[offset as usize],
        }
    }
}

impl Watchdog for MockHw {
    fn feed(&mut self) {
        self.io.borrow_mut().feeds += 1;
    }

    fn reboot(&mut self) -> ! {
        panic!("watchdog reset");
    }
}

impl SystemControl for MockHw {
    fn take_reset_cause(&mut self) -> ResetCause {
        let mut io = self.io.borrow_mut();
        io.cause_cleared = true;
        ResetCause(io.reset_cause)
    }

    fn watchdog_disable(&mut self) {
        self.io.borrow_mut().watchdog_disabled = true;
    }

    fn watchdog_arm(&mut self) {
        self.io.borrow_mut().watchdog_armed = true;
    }

    fn start_clock(&mut self) {}

    fn clock_ready(&mut self) -> bool {
        let mut io = self.io.borrow_mut();
        if io.clock_wait > 0 {
            io.clock_wait -= 1;
            false
        } else {
            true
        }
    }

    fn attach_usb(&mut self) {
        self.io.borrow_mut().usb_attached = true;
    }

    fn run_application(&mut self) -> ! {
        panic!("application start");
    }
}

/// Host side of the mock: scripts endpoint events the way a USB host
/// would and collects what the device sends back.
pub struct Host {
    pub io: Rc<RefCell<MockIo>>,
}

pub fn with_device() -> (Host, Bootloader<MockHw>) {
    let io = Rc::new(RefCell::new(MockIo::new()));
    let hw = MockHw { io: io.clone() };

    let table = DescriptorTable {
        device: Descriptor {
            base: DEVICE_DESC_BASE,
            len: descriptor::DEVICE_DESCRIPTOR_LEN,
        },
        configuration: Descriptor {
            base: CONFIG_DESC_BASE,
            len: descriptor::CONFIGURATION_DESCRIPTOR_LEN,
        },
    };

    (Host { io }, Bootloader::new(hw, table))
}

pub fn mock_hw(reset_cause: u8, clock_wait: u32) -> (Rc<RefCell<MockIo>>, MockHw) {
    let io = Rc::new(RefCell::new(MockIo::new()));
    {
        let mut i = io.borrow_mut();
        i.reset_cause = reset_cause;
        i.clock_wait = clock_wait;
    }
    let hw = MockHw { io: io.clone() };
    (io, hw)
}

pub fn setup_bytes(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let v = value.to_le_bytes();
    let i = index.to_le_bytes();
    let l = length.to_le_bytes();
    [request_type, request, v[0], v[1], i[0], i[1], l[0], l[1]]
}

impl Host {
    fn submit_setup(&self, dev: &mut Bootloader<MockHw>, setup: [u8; 8]) -> Result<(), EpErr> {
        {
            let mut io = self.io.borrow_mut();
            io.setup = setup;
            io.events |= Event::Setup as u8;
            // a new SETUP token clears a stall condition
            io.stalled = false;
        }
        dev.poll();
        if self.io.borrow().stalled {
            return Err(EpErr::Stalled);
        }
        Ok(())
    }

    /// Runs a whole device-to-host control transfer, returning the data
    /// stage bytes.
    pub fn control_read(
        &self,
        dev: &mut Bootloader<MockHw>,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, EpErr> {
        self.submit_setup(dev, setup_bytes(request_type, request, value, index, length))?;

        let mut data = Vec::new();
        for _ in 0..1000 {
            self.io.borrow_mut().events |= Event::InReady as u8;
            dev.poll();
            if self.io.borrow().stalled {
                return Err(EpErr::Stalled);
            }

            let packet = self.io.borrow_mut().in_sent.pop_front();
            let packet = packet.expect("device armed no IN packet");
            let short = packet.len() < MAX_PACKET as usize;
            data.extend_from_slice(&packet);

            if short || data.len() >= length as usize {
                return Ok(data);
            }
        }
        panic!("transfer did not terminate");
    }

    /// Runs a whole host-to-device control transfer including the
    /// status stage.
    pub fn control_write(
        &self,
        dev: &mut Bootloader<MockHw>,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<(), EpErr> {
        self.submit_setup(
            dev,
            setup_bytes(request_type, request, value, index, data.len() as u16),
        )?;

        for chunk in data.chunks(MAX_PACKET as usize) {
            {
                let mut io = self.io.borrow_mut();
                io.out_packets.push_back(chunk.to_vec());
                io.events |= Event::OutData as u8;
            }
            dev.poll();
            if self.io.borrow().stalled {
                return Err(EpErr::Stalled);
            }
        }

        // data stage over: host moves to the status stage
        self.io.borrow_mut().events |= Event::DataEnd as u8;
        dev.poll();

        // host accepts the zero-length status ack
        self.io.borrow_mut().events |= Event::InReady as u8;
        dev.poll();
        if self.io.borrow().stalled {
            return Err(EpErr::Stalled);
        }

        let ack = self.io.borrow_mut().in_sent.pop_front();
        assert_eq!(ack, Some(Vec::new()), "expected zero-length status ack");
        Ok(())
    }

    pub fn bus_reset(&self, dev: &mut Bootloader<MockHw>) {
        self.io.borrow_mut().bus_reset = true;
        dev.poll();
    }
}
