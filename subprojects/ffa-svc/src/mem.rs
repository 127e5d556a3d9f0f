//! Memory transactions and memory permissions.
//!
//! A memory transaction (donate, lend or share) is described by a transaction descriptor the
//! caller has written either to the TX buffer registered with [`rxtx`](crate::rxtx), or to a
//! separate caller-owned buffer. The partition manager answers with a 64-bit handle that the
//! receivers use to retrieve the region and the owner uses to reclaim it.
//!
//! The descriptor contents are not interpreted here; these functions only move the lengths,
//! buffer location and handle through the registers. Attribute helpers built on the
//! permission interfaces live in [`attr`].

use crate::{
    code::{
        MEM_DONATE_32, MEM_DONATE_64, MEM_LEND_32, MEM_LEND_64, MEM_PERM_GET_32, MEM_PERM_SET_32,
        MEM_RECLAIM, MEM_RELINQUISH, MEM_RETRIEVE_REQ_32, MEM_RETRIEVE_REQ_64, MEM_RETRIEVE_RESP,
        MEM_SHARE_32, MEM_SHARE_64,
    },
    raw::{self, Conduit, Regs},
    result::{Error, Result},
};

pub mod attr;

//<editor-fold desc="Transactions">

/// A caller-owned buffer holding a transaction descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionBuffer {
    /// Address of the buffer.
    pub address: usize,
    /// Size of the buffer, in 4K pages.
    pub page_count: u32,
}

/// Handle identifying a memory region that is being donated, lent or shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MemoryHandle(pub u64);

impl MemoryHandle {
    /// Assembles a handle from the two 32-bit halves returned in `w2` (low) and `w3` (high).
    #[inline]
    pub const fn from_halves(lo: u32, hi: u32) -> Self {
        Self(((hi as u64) << 32) | lo as u64)
    }

    /// Returns the `(low, high)` halves of the handle.
    #[inline]
    pub const fn to_halves(self) -> (u32, u32) {
        (self.0 as u32, (self.0 >> 32) as u32)
    }
}

/// Lengths reported by `FFA_MEM_RETRIEVE_RESP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveResponse {
    /// Total length of the retrieved descriptor.
    pub total_length: u32,
    /// Length of the fragment placed in the RX buffer.
    pub fragment_length: u32,
}

/// Function ids of an interface that exists in both widths.
struct Fids {
    rxtx: u32,
    buffer: u32,
}

const DONATE: Fids = Fids {
    rxtx: MEM_DONATE_32,
    buffer: MEM_DONATE_64,
};

const LEND: Fids = Fids {
    rxtx: MEM_LEND_32,
    buffer: MEM_LEND_64,
};

const SHARE: Fids = Fids {
    rxtx: MEM_SHARE_32,
    buffer: MEM_SHARE_64,
};

const RETRIEVE_REQ: Fids = Fids {
    rxtx: MEM_RETRIEVE_REQ_32,
    buffer: MEM_RETRIEVE_REQ_64,
};

/// Builds a transaction request.
///
/// A caller buffer selects the 64-bit interface. The TX buffer variant uses the 32-bit one with
/// a zero address and page count.
fn transaction_regs(
    fids: &Fids,
    total_length: u32,
    fragment_length: u32,
    buffer: Option<TransactionBuffer>,
) -> Regs {
    let (fid, address, page_count) = match buffer {
        Some(buf) => (fids.buffer, buf.address, buf.page_count),
        None => (fids.rxtx, 0, 0),
    };

    let mut regs = Regs::new(fid);
    regs[1] = total_length as u64;
    regs[2] = fragment_length as u64;
    regs[3] = address as u64;
    regs[4] = page_count as u64;
    regs
}

fn transaction<C: Conduit + ?Sized>(
    conduit: &C,
    fids: &Fids,
    total_length: u32,
    fragment_length: u32,
    buffer: Option<TransactionBuffer>,
) -> Result<MemoryHandle> {
    let regs = transaction_regs(fids, total_length, fragment_length, buffer);
    let rsp = raw::call_success(conduit, regs)?;
    Ok(MemoryHandle::from_halves(rsp[2] as u32, rsp[3] as u32))
}

/// Donates a region described in `buffer`.
pub fn donate<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
    buffer: TransactionBuffer,
) -> Result<MemoryHandle> {
    transaction(conduit, &DONATE, total_length, fragment_length, Some(buffer))
}

/// Donates a region described in the TX buffer.
pub fn donate_rxtx<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
) -> Result<MemoryHandle> {
    transaction(conduit, &DONATE, total_length, fragment_length, None)
}

/// Lends a region described in `buffer`.
pub fn lend<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
    buffer: TransactionBuffer,
) -> Result<MemoryHandle> {
    transaction(conduit, &LEND, total_length, fragment_length, Some(buffer))
}

/// Lends a region described in the TX buffer.
pub fn lend_rxtx<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
) -> Result<MemoryHandle> {
    transaction(conduit, &LEND, total_length, fragment_length, None)
}

/// Shares a region described in `buffer`.
pub fn share<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
    buffer: TransactionBuffer,
) -> Result<MemoryHandle> {
    transaction(conduit, &SHARE, total_length, fragment_length, Some(buffer))
}

/// Shares a region described in the TX buffer.
pub fn share_rxtx<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
) -> Result<MemoryHandle> {
    transaction(conduit, &SHARE, total_length, fragment_length, None)
}

fn retrieve<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
    buffer: Option<TransactionBuffer>,
) -> Result<RetrieveResponse> {
    let regs = transaction_regs(&RETRIEVE_REQ, total_length, fragment_length, buffer);
    let rsp = raw::call(conduit, regs)?;
    if rsp.function_id() != MEM_RETRIEVE_RESP {
        log::error!(
            "unexpected response {:#010x} to FFA_MEM_RETRIEVE_REQ",
            rsp.function_id()
        );
        return Err(Error::DeviceError);
    }

    Ok(RetrieveResponse {
        total_length: rsp[1] as u32,
        fragment_length: rsp[2] as u32,
    })
}

/// Retrieves a region using a retrieve descriptor in `buffer`.
pub fn retrieve_req<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
    buffer: TransactionBuffer,
) -> Result<RetrieveResponse> {
    retrieve(conduit, total_length, fragment_length, Some(buffer))
}

/// Retrieves a region using a retrieve descriptor in the TX buffer.
pub fn retrieve_req_rxtx<C: Conduit + ?Sized>(
    conduit: &C,
    total_length: u32,
    fragment_length: u32,
) -> Result<RetrieveResponse> {
    retrieve(conduit, total_length, fragment_length, None)
}

/// Relinquishes a retrieved region. The relinquish descriptor is read from the TX buffer.
pub fn relinquish<C: Conduit + ?Sized>(conduit: &C) -> Result<()> {
    raw::call_success(conduit, Regs::new(MEM_RELINQUISH)).map(drop)
}

/// Reclaims exclusive access to the region identified by `handle`.
pub fn reclaim<C: Conduit + ?Sized>(conduit: &C, handle: MemoryHandle, flags: u32) -> Result<()> {
    let (lo, hi) = handle.to_halves();

    let mut regs = Regs::new(MEM_RECLAIM);
    regs[1] = lo as u64;
    regs[2] = hi as u64;
    regs[3] = flags as u64;

    raw::call_success(conduit, regs).map(drop)
}

//</editor-fold>

//<editor-fold desc="Permissions">

/// Bits of a permission word that must be zero.
pub const PERM_RESERVED_MASK: u32 = !0b111;

const PERM_DATA_ACCESS_MASK: u32 = 0b11;
const PERM_NON_EXECUTABLE: u32 = 1 << 2;

/// Data access permission, bits `[1:0]` of a permission word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DataAccess {
    NoAccess = 0b00,
    ReadWrite = 0b01,
    ReadOnly = 0b11,
}

/// Permissions of a page in the caller's own translation regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPermission {
    pub data: DataAccess,
    pub executable: bool,
}

impl MemoryPermission {
    /// Decodes a permission word.
    ///
    /// Reserved bits and the reserved data access value `0b10` are rejected.
    pub const fn from_raw(raw: u32) -> Result<Self> {
        if raw & PERM_RESERVED_MASK != 0 {
            return Err(Error::InvalidParameter);
        }

        let data = match raw & PERM_DATA_ACCESS_MASK {
            0b00 => DataAccess::NoAccess,
            0b01 => DataAccess::ReadWrite,
            0b11 => DataAccess::ReadOnly,
            _ => return Err(Error::InvalidParameter),
        };

        Ok(Self {
            data,
            executable: raw & PERM_NON_EXECUTABLE == 0,
        })
    }

    /// Encodes the permission word for `FFA_MEM_PERM_SET`.
    pub const fn to_raw(self) -> u32 {
        let nx = if self.executable {
            0
        } else {
            PERM_NON_EXECUTABLE
        };
        self.data as u32 | nx
    }
}

/// Returns the permissions of the page containing `base`.
pub fn perm_get<C: Conduit + ?Sized>(conduit: &C, base: usize) -> Result<MemoryPermission> {
    let mut regs = Regs::new(MEM_PERM_GET_32);
    regs[1] = base as u64;

    let rsp = raw::call_success(conduit, regs)?;
    MemoryPermission::from_raw(rsp[2] as u32).map_err(|_| {
        log::error!("FFA_MEM_PERM_GET returned malformed permissions {:#x}", rsp[2]);
        Error::DeviceError
    })
}

/// Sets the permissions of `page_count` pages starting at `base`.
///
/// A permission word with reserved bits set is rejected before anything is sent.
pub fn perm_set<C: Conduit + ?Sized>(
    conduit: &C,
    base: usize,
    page_count: u32,
    perm: u32,
) -> Result<()> {
    if perm & PERM_RESERVED_MASK != 0 {
        return Err(Error::InvalidParameter);
    }

    let mut regs = Regs::new(MEM_PERM_SET_32);
    regs[1] = base as u64;
    regs[2] = page_count as u64;
    regs[3] = perm as u64;

    raw::call_success(conduit, regs).map(drop)
}

//</editor-fold>
