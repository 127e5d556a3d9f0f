//! TPM Command Response Buffer (CRB) interface.
//!
//! The CRB is one 4 KiB page shared with the TPM service partition: a control area followed by
//! the data buffer that carries both the command and the response. The service only looks at it
//! when told to through the FF-A `start` command.
//!
//! # References
//! - TCG PC Client Platform TPM Profile (PTP) Specification, section "CRB Interface"

use core::{
    mem::offset_of,
    ptr::{self, NonNull},
};

use ffa_svc::{Error, Result};
use modular_bitfield::prelude::*;
use static_assertions::const_assert_eq;

/// Offset of the data buffer within the CRB.
pub const DATA_BUFFER_OFFSET: usize = 0x80;

/// Size of the data buffer.
pub const DATA_BUFFER_SIZE: usize = 0xF80;

/// Size of a TPM response header: tag (2), size (4), response code (4).
pub const RESPONSE_HEADER_SIZE: usize = 10;

/// Offset of the big-endian total size within a command or response header.
const HEADER_SIZE_OFFSET: usize = 2;

/// `locality_control`: request access to the locality.
pub const LOCALITY_CONTROL_REQUEST_ACCESS: u32 = 1 << 0;

/// `locality_status`: the locality has been granted.
pub const LOCALITY_STATUS_GRANTED: u32 = 1 << 0;

/// `control_request`: move the TPM to the command ready state.
pub const CONTROL_REQUEST_COMMAND_READY: u32 = 1 << 0;

/// `control_request`: move the TPM to the idle state.
pub const CONTROL_REQUEST_GO_IDLE: u32 = 1 << 1;

/// `control_status`: the TPM hit an unrecoverable error.
pub const CONTROL_STATUS_FATAL_ERROR: u32 = 1 << 0;

/// `control_status`: the TPM is idle.
pub const CONTROL_STATUS_IDLE: u32 = 1 << 1;

/// `control_start`: a command is pending.
pub const CONTROL_START: u32 = 1 << 0;

/// CRB register block for one locality.
#[derive(Debug)]
#[repr(C)]
pub struct CrbRegisters {
    pub locality_state: u32,
    _reserved0: u32,
    pub locality_control: u32,
    pub locality_status: u32,
    _reserved1: [u32; 8],
    pub interface_id: u32,
    pub vendor_id: u32,
    pub control_extension: u64,
    pub control_request: u32,
    pub control_status: u32,
    pub control_cancel: u32,
    pub control_start: u32,
    pub control_interrupt_enable: u32,
    pub control_interrupt_status: u32,
    pub control_command_size: u32,
    pub control_command_address_low: u32,
    pub control_command_address_high: u32,
    pub control_response_size: u32,
    pub control_response_address: u64,
    _reserved2: [u32; 4],
    pub data_buffer: [u8; DATA_BUFFER_SIZE],
}

const_assert_eq!(size_of::<CrbRegisters>(), 0x1000);
const_assert_eq!(offset_of!(CrbRegisters, locality_state), 0x00);
const_assert_eq!(offset_of!(CrbRegisters, locality_control), 0x08);
const_assert_eq!(offset_of!(CrbRegisters, locality_status), 0x0C);
const_assert_eq!(offset_of!(CrbRegisters, interface_id), 0x30);
const_assert_eq!(offset_of!(CrbRegisters, vendor_id), 0x34);
const_assert_eq!(offset_of!(CrbRegisters, control_extension), 0x38);
const_assert_eq!(offset_of!(CrbRegisters, control_request), 0x40);
const_assert_eq!(offset_of!(CrbRegisters, control_status), 0x44);
const_assert_eq!(offset_of!(CrbRegisters, control_cancel), 0x48);
const_assert_eq!(offset_of!(CrbRegisters, control_start), 0x4C);
const_assert_eq!(offset_of!(CrbRegisters, control_interrupt_enable), 0x50);
const_assert_eq!(offset_of!(CrbRegisters, control_interrupt_status), 0x54);
const_assert_eq!(offset_of!(CrbRegisters, control_command_size), 0x58);
const_assert_eq!(offset_of!(CrbRegisters, control_command_address_low), 0x5C);
const_assert_eq!(offset_of!(CrbRegisters, control_command_address_high), 0x60);
const_assert_eq!(offset_of!(CrbRegisters, control_response_size), 0x64);
const_assert_eq!(offset_of!(CrbRegisters, control_response_address), 0x68);
const_assert_eq!(offset_of!(CrbRegisters, data_buffer), DATA_BUFFER_OFFSET);

/// The `interface_id` register.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct InterfaceId {
    /// Active interface, see [`InterfaceType`].
    pub interface_type: B4,
    pub interface_version: B4,
    pub cap_locality: bool,
    /// The TPM can take commands without leaving the idle state first.
    pub cap_crb_idle_bypass: bool,
    #[skip]
    __reserved0: B1,
    pub cap_data_xfer_size: B2,
    pub cap_fifo: bool,
    pub cap_crb: bool,
    #[skip]
    __reserved1: B2,
    pub interface_selector: B2,
    pub interface_selector_lock: bool,
    #[skip]
    __reserved2: B4,
    pub rid: B8,
}

const_assert_eq!(size_of::<InterfaceId>(), 4);

impl InterfaceId {
    /// Decodes the interface identifier register.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bytes(raw.to_le_bytes())
    }
}

/// PTP interface types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterfaceType {
    Fifo = 0x0,
    Crb = 0x1,
    Tis = 0xF,
}

impl InterfaceType {
    /// Decodes the 4-bit interface type field. Reserved values yield `None`.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x0 => Some(Self::Fifo),
            0x1 => Some(Self::Crb),
            0xF => Some(Self::Tis),
            _ => None,
        }
    }
}

macro_rules! read_reg {
    ($crb:expr, $field:ident) => {
        // SAFETY: `Crb::new` requires a valid, mapped register block.
        unsafe { ptr::read_volatile(&raw const (*$crb.regs.as_ptr()).$field) }
    };
}

macro_rules! write_reg {
    ($crb:expr, $field:ident, $value:expr) => {
        // SAFETY: `Crb::new` requires a valid, mapped register block.
        unsafe { ptr::write_volatile(&raw mut (*$crb.regs.as_ptr()).$field, $value) }
    };
}

/// Volatile accessor for a CRB register block.
pub struct Crb {
    regs: NonNull<CrbRegisters>,
}

impl Crb {
    /// Wraps the register block at `regs`.
    ///
    /// # Safety
    ///
    /// `regs` must point to a CRB register block that stays mapped for the lifetime of the
    /// returned value. No other code may access it concurrently, except the TPM service
    /// partition while a `start` call is in flight.
    pub const unsafe fn new(regs: NonNull<CrbRegisters>) -> Self {
        Self { regs }
    }

    /// Returns the base address of the register block.
    #[inline]
    pub fn base(&self) -> usize {
        self.regs.as_ptr() as usize
    }

    /// Reads the interface identifier register.
    pub fn interface_id(&self) -> InterfaceId {
        InterfaceId::from_raw(read_reg!(self, interface_id))
    }

    /// Sets the locality access request.
    pub fn request_locality(&self) {
        write_reg!(self, locality_control, LOCALITY_CONTROL_REQUEST_ACCESS);
    }

    /// Whether the TPM has granted the requested locality.
    pub fn locality_granted(&self) -> bool {
        read_reg!(self, locality_status) & LOCALITY_STATUS_GRANTED != 0
    }

    /// Writes `bits` to the control request register.
    pub fn request(&self, bits: u32) {
        write_reg!(self, control_request, bits);
    }

    /// Returns the control request bits the TPM has not yet acted on.
    pub fn pending_requests(&self) -> u32 {
        read_reg!(self, control_request)
    }

    /// Reads the control area status register.
    pub fn control_status(&self) -> u32 {
        read_reg!(self, control_status)
    }

    /// Sets the start bit.
    pub fn start(&self) {
        write_reg!(self, control_start, CONTROL_START);
    }

    /// Returns `true` while the TPM has not consumed the pending command.
    pub fn start_pending(&self) -> bool {
        read_reg!(self, control_start) & CONTROL_START != 0
    }

    fn data_buffer(&self) -> *mut u8 {
        // SAFETY: `Crb::new` requires a valid, mapped register block.
        unsafe { (&raw mut (*self.regs.as_ptr()).data_buffer).cast::<u8>() }
    }

    /// Copies `command` into the data buffer and points the command and response address
    /// registers at it.
    pub fn write_command(&self, command: &[u8]) -> Result<()> {
        if command.is_empty() || command.len() > DATA_BUFFER_SIZE {
            log::error!("TPM command of {} bytes does not fit the CRB", command.len());
            return Err(Error::InvalidParameter);
        }

        let buf = self.data_buffer();
        for (i, &byte) in command.iter().enumerate() {
            // SAFETY: `i < DATA_BUFFER_SIZE`, checked above.
            unsafe { ptr::write_volatile(buf.add(i), byte) };
        }

        let address = (self.base() + DATA_BUFFER_OFFSET) as u64;
        write_reg!(self, control_command_size, DATA_BUFFER_SIZE as u32);
        write_reg!(self, control_command_address_low, address as u32);
        write_reg!(self, control_command_address_high, (address >> 32) as u32);
        write_reg!(self, control_response_size, DATA_BUFFER_SIZE as u32);
        write_reg!(self, control_response_address, address);

        Ok(())
    }

    /// Reads the total response size from the response header.
    pub fn response_len(&self) -> Result<usize> {
        let mut header = [0u8; RESPONSE_HEADER_SIZE];
        self.read_data(&mut header);

        let mut size = [0u8; 4];
        size.copy_from_slice(&header[HEADER_SIZE_OFFSET..HEADER_SIZE_OFFSET + 4]);
        let len = u32::from_be_bytes(size) as usize;

        if !(RESPONSE_HEADER_SIZE..=DATA_BUFFER_SIZE).contains(&len) {
            log::error!("TPM response size {len} out of range");
            return Err(Error::DeviceError);
        }

        Ok(len)
    }

    /// Copies the start of the data buffer into `out`.
    ///
    /// At most [`DATA_BUFFER_SIZE`] bytes are read.
    pub fn read_data(&self, out: &mut [u8]) {
        let buf = self.data_buffer();
        for (i, byte) in out.iter_mut().take(DATA_BUFFER_SIZE).enumerate() {
            // SAFETY: `i < DATA_BUFFER_SIZE`.
            *byte = unsafe { ptr::read_volatile(buf.add(i)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A zeroed register block on the heap.
    fn zeroed() -> Box<CrbRegisters> {
        // SAFETY: every field is an integer or an integer array.
        unsafe { Box::<CrbRegisters>::new_zeroed().assume_init() }
    }

    #[test]
    fn test_interface_id_fields() {
        // CRB, version 1, locality and idle bypass capable, CRB capable, rid 0x5a
        let id = InterfaceId::from_raw(0x5a00_4311);

        assert_eq!(id.interface_type(), 0x1);
        assert_eq!(id.interface_version(), 0x1);
        assert!(id.cap_locality());
        assert!(id.cap_crb_idle_bypass());
        assert!(id.cap_crb());
        assert!(!id.cap_fifo());
        assert_eq!(id.rid(), 0x5a);
    }

    #[test]
    fn test_interface_type_from_raw() {
        assert_eq!(InterfaceType::from_raw(0), Some(InterfaceType::Fifo));
        assert_eq!(InterfaceType::from_raw(1), Some(InterfaceType::Crb));
        assert_eq!(InterfaceType::from_raw(0xF), Some(InterfaceType::Tis));
        assert_eq!(InterfaceType::from_raw(2), None);
    }

    #[test]
    fn test_write_command_fills_buffer_and_addresses() {
        let mut regs = zeroed();
        let ptr = NonNull::from(&mut *regs);
        // SAFETY: `regs` outlives `crb`.
        let crb = unsafe { Crb::new(ptr) };

        crb.write_command(&[0x80, 0x01, 0, 0, 0, 0x0c, 0, 0, 0x01, 0x44, 0, 0])
            .expect("write");

        let address = (ptr.as_ptr() as usize + DATA_BUFFER_OFFSET) as u64;
        assert_eq!(regs.data_buffer[..12], [0x80, 0x01, 0, 0, 0, 0x0c, 0, 0, 0x01, 0x44, 0, 0]);
        assert_eq!(regs.control_command_address_low, address as u32);
        assert_eq!(regs.control_command_address_high, (address >> 32) as u32);
        assert_eq!(regs.control_response_address, address);
        assert_eq!(regs.control_command_size, DATA_BUFFER_SIZE as u32);
    }

    #[test]
    fn test_write_command_rejects_bad_sizes() {
        let mut regs = zeroed();
        // SAFETY: `regs` outlives `crb`.
        let crb = unsafe { Crb::new(NonNull::from(&mut *regs)) };

        assert_eq!(crb.write_command(&[]), Err(Error::InvalidParameter));
        assert_eq!(
            crb.write_command(&[0; DATA_BUFFER_SIZE + 1]),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_response_len() {
        let mut regs = zeroed();
        regs.data_buffer[..10].copy_from_slice(&[0x80, 0x01, 0, 0, 0x01, 0x02, 0, 0, 0, 0]);
        // SAFETY: `regs` outlives `crb`.
        let crb = unsafe { Crb::new(NonNull::from(&mut *regs)) };

        assert_eq!(crb.response_len(), Ok(0x102));
    }

    #[test]
    fn test_response_len_out_of_range() {
        for size in [0u32, 9, DATA_BUFFER_SIZE as u32 + 1] {
            let mut regs = zeroed();
            regs.data_buffer[2..6].copy_from_slice(&size.to_be_bytes());
            // SAFETY: `regs` outlives `crb`.
            let crb = unsafe { Crb::new(NonNull::from(&mut *regs)) };

            assert_eq!(crb.response_len(), Err(Error::DeviceError), "size {size}");
        }
    }

    #[test]
    fn test_control_bits() {
        let mut regs = zeroed();
        let ptr = NonNull::from(&mut *regs);
        // SAFETY: `regs` outlives `crb`.
        let crb = unsafe { Crb::new(ptr) };

        crb.request(CONTROL_REQUEST_GO_IDLE);
        crb.start();
        crb.request_locality();

        assert_eq!(crb.pending_requests(), CONTROL_REQUEST_GO_IDLE);
        assert!(crb.start_pending());
        assert!(!crb.locality_granted());
        assert_eq!(regs.locality_control, LOCALITY_CONTROL_REQUEST_ACCESS);
    }
}
