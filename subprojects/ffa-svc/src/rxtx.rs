//! RX/TX buffer registration.
//!
//! Each partition registers one pair of buffers with the partition manager. The TX buffer
//! carries descriptors from the partition (memory transactions, retrieve requests) and the RX
//! buffer receives them. Both buffers live in one contiguous allocation: TX first, RX right
//! after it.

use core::num::NonZeroUsize;

use crate::{
    code::{RXTX_MAP_64, RXTX_UNMAP},
    misc,
    raw::{self, Conduit, Regs},
    result::{Error, Result},
};

/// Granule in which buffer sizes are expressed.
pub const PAGE_SIZE: usize = 0x1000;

/// Source of page-granular memory for the buffers.
pub trait PageAllocator {
    /// Allocates `count` contiguous pages aligned to `align` bytes.
    fn allocate_aligned_pages(&self, count: usize, align: usize) -> Option<NonZeroUsize>;

    /// Frees `count` pages previously returned by [`allocate_aligned_pages`](Self::allocate_aligned_pages).
    fn free_pages(&self, address: NonZeroUsize, count: usize);
}

/// Buffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxTxConfig {
    /// Size of each buffer, in 4K pages.
    pub page_count: usize,
}

impl Default for RxTxConfig {
    fn default() -> Self {
        Self { page_count: 1 }
    }
}

/// A registered buffer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub tx: NonZeroUsize,
    pub rx: NonZeroUsize,
    /// Size of each buffer, in bytes.
    pub size: usize,
}

/// Minimum buffer size and alignment, decoded from `FFA_FEATURES(FFA_RXTX_MAP)`.
fn min_size_and_align(properties: u32) -> Result<usize> {
    match properties & 0b11 {
        0 => Ok(0x1000),
        1 => Ok(0x10000),
        2 => Ok(0x4000),
        other => {
            log::error!("invalid RX/TX minimum size and alignment encoding {other}");
            Err(Error::NotSupported)
        }
    }
}

/// The partition's RX/TX buffer pair.
pub struct RxTxBuffers<A> {
    allocator: A,
    config: RxTxConfig,
    mapping: Option<Mapping>,
}

impl<A: PageAllocator> RxTxBuffers<A> {
    /// Creates an unmapped buffer pair drawing pages from `allocator`.
    pub fn new(allocator: A, config: RxTxConfig) -> Self {
        Self {
            allocator,
            config,
            mapping: None,
        }
    }

    /// Returns the registered buffers, or [`Error::NotReady`] if none are mapped.
    pub fn registered(&self) -> Result<Mapping> {
        self.mapping.ok_or(Error::NotReady)
    }

    /// Allocates and registers the buffer pair.
    ///
    /// The allocation is released again if registration fails.
    pub fn map<C: Conduit + ?Sized>(&mut self, conduit: &C) -> Result<Mapping> {
        if self.mapping.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let features = misc::features(conduit, RXTX_MAP_64).inspect_err(|err| {
            log::error!("failed to query RX/TX buffer properties: {err}");
        })?;
        let min = min_size_and_align(features.properties)?;

        let page_count = self.config.page_count;
        let size = page_count
            .checked_mul(PAGE_SIZE)
            .ok_or(Error::InvalidParameter)?;
        let total_pages = page_count.checked_mul(2).ok_or(Error::InvalidParameter)?;
        if page_count == 0 || min > size {
            log::error!("RX/TX buffer too small: min size {min:#x}, page count {page_count}");
            return Err(Error::InvalidParameter);
        }

        let base = self
            .allocator
            .allocate_aligned_pages(total_pages, min)
            .ok_or(Error::NoMemory)?;
        let tx = base;
        let rx = base.saturating_add(size);

        let mut regs = Regs::new(RXTX_MAP_64);
        regs[1] = tx.get() as u64;
        regs[2] = rx.get() as u64;
        regs[3] = (page_count / (min / PAGE_SIZE)) as u64;

        if let Err(err) = raw::call_success(conduit, regs) {
            log::error!("failed to map RX/TX buffers: {err}");
            self.allocator.free_pages(base, total_pages);
            return Err(err);
        }

        let mapping = Mapping { tx, rx, size };
        self.mapping = Some(mapping);
        Ok(mapping)
    }

    /// Unregisters and frees the buffer pair.
    pub fn unmap<C: Conduit + ?Sized>(&mut self, conduit: &C, own_id: u16) -> Result<()> {
        let mut regs = Regs::new(RXTX_UNMAP);
        regs[1] = (own_id as u64) << 16;

        raw::call_success(conduit, regs)?;

        if let Some(mapping) = self.mapping.take() {
            self.allocator
                .free_pages(mapping.tx, self.config.page_count * 2);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::cell::RefCell;

    use super::*;
    use crate::{
        code,
        result::status,
        testing::{ScriptedConduit, error, success},
    };

    #[derive(Default)]
    struct TrackingAllocator {
        allocations: RefCell<Vec<(usize, usize)>>,
        frees: RefCell<Vec<(usize, usize)>>,
        exhausted: bool,
    }

    impl PageAllocator for &TrackingAllocator {
        fn allocate_aligned_pages(&self, count: usize, align: usize) -> Option<NonZeroUsize> {
            if self.exhausted {
                return None;
            }
            self.allocations.borrow_mut().push((count, align));
            NonZeroUsize::new(0x4000_0000)
        }

        fn free_pages(&self, address: NonZeroUsize, count: usize) {
            self.frees.borrow_mut().push((address.get(), count));
        }
    }

    #[test]
    fn test_registered_before_map_is_not_ready() {
        let allocator = TrackingAllocator::default();
        let buffers = RxTxBuffers::new(&allocator, RxTxConfig::default());

        assert_eq!(buffers.registered(), Err(Error::NotReady));
    }

    #[test]
    fn test_map_with_16k_granule() {
        let allocator = TrackingAllocator::default();
        let mut buffers = RxTxBuffers::new(&allocator, RxTxConfig { page_count: 8 });
        let conduit = ScriptedConduit::new([success(&[0, 2]), success(&[])]);

        let mapping = buffers.map(&conduit).expect("map");

        assert_eq!(mapping.tx.get(), 0x4000_0000);
        assert_eq!(mapping.rx.get(), 0x4000_8000);
        assert_eq!(mapping.size, 0x8000);
        assert_eq!(buffers.registered(), Ok(mapping));
        assert_eq!(allocator.allocations.borrow().as_slice(), &[(16, 0x4000)]);

        let reqs = conduit.requests();
        assert_eq!(reqs[0].function_id(), code::FEATURES);
        assert_eq!(reqs[0][1], code::RXTX_MAP_64 as u64);
        assert_eq!(reqs[1].function_id(), code::RXTX_MAP_64);
        assert_eq!(&reqs[1].0[1..4], &[0x4000_0000, 0x4000_8000, 2]);
    }

    #[test]
    fn test_map_twice_is_already_started() {
        let allocator = TrackingAllocator::default();
        let mut buffers = RxTxBuffers::new(&allocator, RxTxConfig::default());
        let conduit = ScriptedConduit::new([success(&[0, 0]), success(&[])]);

        assert!(buffers.map(&conduit).is_ok());
        assert_eq!(buffers.map(&conduit), Err(Error::AlreadyStarted));
        assert_eq!(conduit.remaining(), 0);
    }

    #[test]
    fn test_map_rejects_buffer_below_minimum() {
        let allocator = TrackingAllocator::default();
        let mut buffers = RxTxBuffers::new(&allocator, RxTxConfig { page_count: 1 });
        let conduit = ScriptedConduit::new([success(&[0, 1])]);

        assert_eq!(buffers.map(&conduit), Err(Error::InvalidParameter));
        assert!(allocator.allocations.borrow().is_empty());
    }

    #[test]
    fn test_map_rejects_oversized_page_count() {
        let allocator = TrackingAllocator::default();
        let config = RxTxConfig {
            page_count: usize::MAX / 2,
        };
        let mut buffers = RxTxBuffers::new(&allocator, config);
        let conduit = ScriptedConduit::new([success(&[0, 0])]);

        assert_eq!(buffers.map(&conduit), Err(Error::InvalidParameter));
        assert!(allocator.allocations.borrow().is_empty());
        assert_eq!(buffers.registered(), Err(Error::NotReady));
    }

    #[test]
    fn test_map_without_memory() {
        let allocator = TrackingAllocator {
            exhausted: true,
            ..Default::default()
        };
        let mut buffers = RxTxBuffers::new(&allocator, RxTxConfig::default());
        let conduit = ScriptedConduit::new([success(&[0, 0])]);

        assert_eq!(buffers.map(&conduit), Err(Error::NoMemory));
    }

    #[test]
    fn test_failed_map_frees_allocation() {
        let allocator = TrackingAllocator::default();
        let mut buffers = RxTxBuffers::new(&allocator, RxTxConfig { page_count: 2 });
        let conduit = ScriptedConduit::new([success(&[0, 0]), error(status::DENIED)]);

        assert_eq!(buffers.map(&conduit), Err(Error::AccessDenied));
        assert_eq!(allocator.frees.borrow().as_slice(), &[(0x4000_0000, 4)]);
        assert_eq!(buffers.registered(), Err(Error::NotReady));
    }

    #[test]
    fn test_unmap_frees_and_clears() {
        let allocator = TrackingAllocator::default();
        let mut buffers = RxTxBuffers::new(&allocator, RxTxConfig::default());
        let conduit = ScriptedConduit::new([success(&[0, 0]), success(&[]), success(&[])]);

        buffers.map(&conduit).expect("map");
        assert_eq!(buffers.unmap(&conduit, 0x8001), Ok(()));

        assert_eq!(conduit.requests()[2][1], 0x8001 << 16);
        assert_eq!(allocator.frees.borrow().as_slice(), &[(0x4000_0000, 2)]);
        assert_eq!(buffers.registered(), Err(Error::NotReady));
    }
}
