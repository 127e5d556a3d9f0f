//! Partition discovery through `FFA_PARTITION_INFO_GET_REGS`.
//!
//! The register variant returns the partition descriptors directly in `x3`-`x17`, three words
//! per descriptor, so at most [`MAX_DESCRIPTORS_PER_CALL`] fit in one response. Larger result
//! sets are paged: the caller repeats the query with `start_index = current_index + 1` and the
//! `tag` returned by the first call until `current_index == last_index`.

use modular_bitfield::prelude::*;
use static_assertions::const_assert_eq;

use crate::{
    code::PARTITION_INFO_GET_REGS,
    guid::ServiceId,
    raw::{self, Conduit, NUM_REGS, Regs},
    result::{Error, Result},
};

/// First register holding descriptor data.
const FIRST_DESCRIPTOR_REG: usize = 3;

/// Register words per partition descriptor.
const WORDS_PER_DESCRIPTOR: usize = 3;

/// Size in bytes of a partition descriptor.
pub const DESCRIPTOR_SIZE: usize = WORDS_PER_DESCRIPTOR * size_of::<u64>();

/// Number of descriptors that fit in a single response.
pub const MAX_DESCRIPTORS_PER_CALL: usize =
    (NUM_REGS - FIRST_DESCRIPTOR_REG) / WORDS_PER_DESCRIPTOR;

/// Response metadata, returned in `x2`.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Metadata {
    /// Index of the last descriptor of the whole result set.
    pub last_index: B16,
    /// Index of the last descriptor in this response.
    pub current_index: B16,
    /// Tag identifying the result set across paged calls.
    pub tag: B16,
    /// Size in bytes of each descriptor.
    pub descriptor_size: B16,
}

const_assert_eq!(size_of::<Metadata>(), 8);

impl Metadata {
    /// Decodes the metadata word returned in `x2`.
    #[inline]
    pub fn from_word(word: u64) -> Self {
        Self::from_bytes(word.to_le_bytes())
    }
}

/// A partition descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionInfo {
    /// Endpoint id of the partition.
    pub id: u16,
    /// Number of execution contexts (vCPUs) of the partition.
    pub execution_contexts: u16,
    /// Partition properties.
    pub properties: u32,
    /// Partition UUID, in host layout.
    pub uuid: ServiceId,
}

impl PartitionInfo {
    fn from_words(words: &[u64]) -> Self {
        let w0 = words[0];
        Self {
            id: w0 as u16,
            execution_contexts: (w0 >> 16) as u16,
            properties: (w0 >> 32) as u32,
            uuid: ServiceId::from_wire([words[1], words[2]]),
        }
    }
}

/// Position of one response within the whole result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Number of descriptors written to the output slice.
    pub count: usize,
    pub last_index: u16,
    pub current_index: u16,
    /// Tag to pass to the next paged call.
    pub tag: u16,
}

impl Page {
    /// Returns `true` if more descriptors remain after this page.
    #[inline]
    pub const fn has_more(&self) -> bool {
        self.current_index < self.last_index
    }
}

/// Discovers the partitions implementing `service_id`, starting at `start_index`.
///
/// [`ServiceId::NIL`] lists every partition. `tag` must be zero on the first call and the tag
/// returned by the previous page afterwards.
///
/// If `out` cannot hold every descriptor of the response, nothing is copied and
/// [`Error::BufferTooSmall`] reports the required number of entries.
pub fn info_get_regs<C: Conduit + ?Sized>(
    conduit: &C,
    service_id: ServiceId,
    start_index: u16,
    tag: u16,
    out: &mut [PartitionInfo],
) -> Result<Page> {
    let [lo, hi] = service_id.to_wire();

    let mut regs = Regs::new(PARTITION_INFO_GET_REGS);
    regs[1] = lo;
    regs[2] = hi;
    regs[3] = ((tag as u64) << 16) | start_index as u64;

    let rsp = raw::call_success(conduit, regs)?;

    let meta = Metadata::from_word(rsp[2]);
    let current_index = meta.current_index();
    let descriptor_size = meta.descriptor_size() as usize;
    if descriptor_size != 0 && descriptor_size != DESCRIPTOR_SIZE {
        log::error!("unexpected partition descriptor size {descriptor_size}");
        return Err(Error::DeviceError);
    }

    let count = match current_index.checked_sub(start_index) {
        Some(delta) => delta as usize + 1,
        None => {
            log::error!(
                "partition info current index {current_index} precedes start index {start_index}"
            );
            return Err(Error::DeviceError);
        }
    };
    if count > MAX_DESCRIPTORS_PER_CALL {
        log::error!("partition info response claims {count} descriptors");
        return Err(Error::DeviceError);
    }

    if out.len() < count {
        return Err(Error::BufferTooSmall { required: count });
    }

    let words = &rsp.0[FIRST_DESCRIPTOR_REG..];
    for (slot, chunk) in out.iter_mut().zip(words.chunks_exact(WORDS_PER_DESCRIPTOR)).take(count) {
        *slot = PartitionInfo::from_words(chunk);
    }

    Ok(Page {
        count,
        last_index: meta.last_index(),
        current_index,
        tag: meta.tag(),
    })
}
