//! Region attribute helpers on top of `FFA_MEM_PERM_GET` / `FFA_MEM_PERM_SET`.
//!
//! Every helper is a read-modify-write of the permission word: the current permissions of the
//! first page are read, only the attribute the helper owns is changed, and the whole word is
//! written back for the entire region. Region lengths are rounded up to whole pages.

use bitflags::bitflags;

use super::{DataAccess, MemoryPermission, perm_get, perm_set};
use crate::{
    raw::Conduit,
    result::{Error, Result},
    rxtx::PAGE_SIZE,
};

bitflags! {
    /// Region attributes understood by [`set_memory_attributes`].
    ///
    /// The values are the UEFI memory attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryAttributes: u64 {
        /// Read-protected, i.e. no access.
        const RP = 0x0000_2000;
        /// Execute-protected.
        const XP = 0x0000_4000;
        /// Read-only.
        const RO = 0x0002_0000;
    }
}

/// Number of pages covering `length` bytes.
fn page_count(length: u64) -> Result<u32> {
    let pages = length.div_ceil(PAGE_SIZE as u64);
    u32::try_from(pages).map_err(|_| Error::InvalidParameter)
}

fn update<C, F>(conduit: &C, base: usize, length: u64, f: F) -> Result<()>
where
    C: Conduit + ?Sized,
    F: FnOnce(MemoryPermission) -> MemoryPermission,
{
    let pages = page_count(length)?;
    let current = perm_get(conduit, base)?;
    perm_set(conduit, base, pages, f(current).to_raw())
}

/// Removes all data access from the region.
pub fn set_no_access<C: Conduit + ?Sized>(conduit: &C, base: usize, length: u64) -> Result<()> {
    update(conduit, base, length, |perm| MemoryPermission {
        data: DataAccess::NoAccess,
        ..perm
    })
}

/// Restores read-write access to a region without data access. Accessible regions are kept as
/// they are.
pub fn clear_no_access<C: Conduit + ?Sized>(conduit: &C, base: usize, length: u64) -> Result<()> {
    update(conduit, base, length, |perm| match perm.data {
        DataAccess::NoAccess => MemoryPermission {
            data: DataAccess::ReadWrite,
            ..perm
        },
        _ => perm,
    })
}

/// Makes a read-write region read-only.
///
/// A region without data access stays inaccessible.
pub fn set_read_only<C: Conduit + ?Sized>(conduit: &C, base: usize, length: u64) -> Result<()> {
    update(conduit, base, length, |perm| match perm.data {
        DataAccess::ReadWrite => MemoryPermission {
            data: DataAccess::ReadOnly,
            ..perm
        },
        _ => perm,
    })
}

/// Makes a read-only region writable again.
pub fn clear_read_only<C: Conduit + ?Sized>(conduit: &C, base: usize, length: u64) -> Result<()> {
    update(conduit, base, length, |perm| match perm.data {
        DataAccess::ReadOnly => MemoryPermission {
            data: DataAccess::ReadWrite,
            ..perm
        },
        _ => perm,
    })
}

/// Makes the region non-executable.
pub fn set_no_exec<C: Conduit + ?Sized>(conduit: &C, base: usize, length: u64) -> Result<()> {
    update(conduit, base, length, |perm| MemoryPermission {
        executable: false,
        ..perm
    })
}

/// Makes the region executable.
pub fn clear_no_exec<C: Conduit + ?Sized>(conduit: &C, base: usize, length: u64) -> Result<()> {
    update(conduit, base, length, |perm| MemoryPermission {
        executable: true,
        ..perm
    })
}

/// Applies the attributes selected by `mask` to the region.
///
/// Each of no-access, read-only and no-exec is set when present in `attributes & mask` and
/// cleared otherwise, in that order. The first failure stops the sequence.
pub fn set_memory_attributes<C: Conduit + ?Sized>(
    conduit: &C,
    base: usize,
    length: u64,
    attributes: u64,
    mask: u64,
) -> Result<()> {
    log::debug!(
        "set attributes {attributes:#x} (mask {mask:#x}) on {base:#x}, length {length:#x}"
    );

    if length == 0 {
        return Err(Error::InvalidParameter);
    }
    let Some(needed) = MemoryAttributes::from_bits(attributes & mask) else {
        log::error!("unsupported memory attributes {:#x}", attributes & mask);
        return Err(Error::InvalidParameter);
    };

    if needed.contains(MemoryAttributes::RP) {
        set_no_access(conduit, base, length)?;
    } else {
        clear_no_access(conduit, base, length)?;
    }

    if needed.contains(MemoryAttributes::RO) {
        set_read_only(conduit, base, length)?;
    } else {
        clear_read_only(conduit, base, length)?;
    }

    if needed.contains(MemoryAttributes::XP) {
        set_no_exec(conduit, base, length)
    } else {
        clear_no_exec(conduit, base, length)
    }
}
