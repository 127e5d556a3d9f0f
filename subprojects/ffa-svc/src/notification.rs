//! Notifications.
//!
//! Notifications are asynchronous 64-bit doorbells. A receiver creates its bitmaps once, binds
//! bits to a sender, and later collects pending bits per sender class with [`get`].
//!
//! Every function takes the caller's own endpoint id explicitly; it is resolved once by the
//! messaging layer and passed down.

use bitflags::bitflags;

use crate::{
    code::{
        NOTIFICATION_BIND, NOTIFICATION_BITMAP_CREATE, NOTIFICATION_BITMAP_DESTROY,
        NOTIFICATION_GET, NOTIFICATION_SET, NOTIFICATION_UNBIND,
    },
    raw::{self, Conduit, Regs, endpoint_pair},
    result::{Error, Result},
};

bitflags! {
    /// Sender classes whose pending notifications are collected by [`get`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NotificationClasses: u32 {
        /// Notifications from secure partitions.
        const PARTITION = 1 << 0;
        /// Notifications from VMs.
        const VM = 1 << 1;
        /// Notifications from the hypervisor.
        const HYPERVISOR = 1 << 3;
    }
}

/// Pending notifications returned by [`get`], one bitmap per requested class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationBitmaps {
    pub partition: Option<u64>,
    pub vm: Option<u64>,
    pub hypervisor: Option<u64>,
}

/// Places a bitmap in two 32-bit halves, low word first.
#[inline]
fn split_bitmap(bitmap: u64) -> (u64, u64) {
    (bitmap & 0xffff_ffff, bitmap >> 32)
}

#[inline]
fn join_bitmap(lo: u64, hi: u64) -> u64 {
    ((hi & 0xffff_ffff) << 32) | (lo & 0xffff_ffff)
}

/// Creates the notification bitmaps of `own_id` for `vcpu_count` vCPUs.
pub fn bitmap_create<C: Conduit + ?Sized>(conduit: &C, own_id: u16, vcpu_count: u16) -> Result<()> {
    let mut regs = Regs::new(NOTIFICATION_BITMAP_CREATE);
    regs[1] = own_id as u64;
    regs[2] = vcpu_count as u64;

    raw::call_success(conduit, regs).map(drop)
}

/// Destroys the notification bitmaps of `own_id`.
pub fn bitmap_destroy<C: Conduit + ?Sized>(conduit: &C, own_id: u16) -> Result<()> {
    let mut regs = Regs::new(NOTIFICATION_BITMAP_DESTROY);
    regs[1] = own_id as u64;

    raw::call_success(conduit, regs).map(drop)
}

/// Binds the notifications in `bitmap` so that `sender` may signal them to `own_id`.
pub fn bind<C: Conduit + ?Sized>(
    conduit: &C,
    own_id: u16,
    sender: u16,
    flags: u32,
    bitmap: u64,
) -> Result<()> {
    let (lo, hi) = split_bitmap(bitmap);

    let mut regs = Regs::new(NOTIFICATION_BIND);
    regs[1] = endpoint_pair(sender, own_id);
    regs[2] = flags as u64;
    regs[3] = lo;
    regs[4] = hi;

    raw::call_success(conduit, regs).map(drop)
}

/// Unbinds the notifications in `bitmap` from `sender`.
pub fn unbind<C: Conduit + ?Sized>(
    conduit: &C,
    own_id: u16,
    sender: u16,
    bitmap: u64,
) -> Result<()> {
    let (lo, hi) = split_bitmap(bitmap);

    let mut regs = Regs::new(NOTIFICATION_UNBIND);
    regs[1] = endpoint_pair(sender, own_id);
    regs[3] = lo;
    regs[4] = hi;

    raw::call_success(conduit, regs).map(drop)
}

/// Signals the notifications in `bitmap` from `own_id` to `receiver`.
pub fn set<C: Conduit + ?Sized>(
    conduit: &C,
    own_id: u16,
    receiver: u16,
    flags: u32,
    bitmap: u64,
) -> Result<()> {
    let (lo, hi) = split_bitmap(bitmap);

    let mut regs = Regs::new(NOTIFICATION_SET);
    regs[1] = endpoint_pair(own_id, receiver);
    regs[2] = flags as u64;
    regs[3] = lo;
    regs[4] = hi;

    raw::call_success(conduit, regs).map(drop)
}

/// Retrieves and clears the pending notifications of `own_id` on `vcpu` for the requested
/// sender `classes`.
///
/// Only the bitmaps of requested classes are read from the response.
pub fn get<C: Conduit + ?Sized>(
    conduit: &C,
    own_id: u16,
    vcpu: u16,
    classes: NotificationClasses,
) -> Result<NotificationBitmaps> {
    if classes.is_empty() {
        return Err(Error::InvalidParameter);
    }

    let mut regs = Regs::new(NOTIFICATION_GET);
    regs[1] = ((vcpu as u64) << 16) | own_id as u64;
    regs[2] = classes.bits() as u64;

    let rsp = raw::call_success(conduit, regs)?;

    let pick = |class, lo: usize| {
        classes
            .contains(class)
            .then(|| join_bitmap(rsp[lo], rsp[lo + 1]))
    };
    Ok(NotificationBitmaps {
        partition: pick(NotificationClasses::PARTITION, 2),
        vm: pick(NotificationClasses::VM, 4),
        hypervisor: pick(NotificationClasses::HYPERVISOR, 6),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        code,
        result::status,
        testing::{ScriptedConduit, error, success},
    };

    #[test]
    fn test_bitmap_create() {
        let conduit = ScriptedConduit::new([success(&[])]);

        assert_eq!(bitmap_create(&conduit, 0x8001, 4), Ok(()));

        let req = conduit.requests()[0];
        assert_eq!(req.function_id(), code::NOTIFICATION_BITMAP_CREATE);
        assert_eq!(&req.0[1..3], &[0x8001, 4]);
    }

    #[test]
    fn test_bitmap_destroy_error() {
        let conduit = ScriptedConduit::new([error(status::DENIED)]);

        assert_eq!(bitmap_destroy(&conduit, 0x8001), Err(Error::AccessDenied));
    }

    #[test]
    fn test_bind_splits_bitmap() {
        let conduit = ScriptedConduit::new([success(&[])]);

        assert_eq!(bind(&conduit, 0x8001, 0x8002, 1, 0x0000_0004_0000_0003), Ok(()));

        let req = conduit.requests()[0];
        assert_eq!(req.function_id(), code::NOTIFICATION_BIND);
        assert_eq!(&req.0[1..5], &[0x8002_8001, 1, 3, 4]);
    }

    #[test]
    fn test_unbind_clears_flags() {
        let conduit = ScriptedConduit::new([success(&[])]);

        assert_eq!(unbind(&conduit, 0x8001, 0x8002, u64::MAX), Ok(()));

        let req = conduit.requests()[0];
        assert_eq!(&req.0[1..5], &[0x8002_8001, 0, 0xffff_ffff, 0xffff_ffff]);
    }

    #[test]
    fn test_set_orders_sender_first() {
        let conduit = ScriptedConduit::new([success(&[])]);

        assert_eq!(set(&conduit, 0x8001, 0x8002, 0, 1), Ok(()));

        let req = conduit.requests()[0];
        assert_eq!(req.function_id(), code::NOTIFICATION_SET);
        assert_eq!(&req.0[1..5], &[0x8001_8002, 0, 1, 0]);
    }

    #[test]
    fn test_get_reads_requested_classes_only() {
        let conduit = ScriptedConduit::new([success(&[0, 1, 2, 3, 4, 5, 6])]);

        let bitmaps = get(
            &conduit,
            0x8001,
            2,
            NotificationClasses::PARTITION | NotificationClasses::HYPERVISOR,
        );

        assert_eq!(
            bitmaps,
            Ok(NotificationBitmaps {
                partition: Some(0x0000_0002_0000_0001),
                vm: None,
                hypervisor: Some(0x0000_0006_0000_0005),
            })
        );
        let req = conduit.requests()[0];
        assert_eq!(&req.0[1..3], &[0x0002_8001, 0b1001]);
    }

    #[test]
    fn test_get_vm_class() {
        let conduit = ScriptedConduit::new([success(&[0, 0, 0, 0xa, 0xb])]);

        let bitmaps = get(&conduit, 1, 0, NotificationClasses::VM);

        assert_eq!(
            bitmaps,
            Ok(NotificationBitmaps {
                vm: Some(0x0000_000b_0000_000a),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_get_without_classes_is_rejected() {
        let conduit = ScriptedConduit::default();

        assert_eq!(
            get(&conduit, 1, 0, NotificationClasses::empty()),
            Err(Error::InvalidParameter)
        );
        assert!(conduit.requests().is_empty());
    }
}
