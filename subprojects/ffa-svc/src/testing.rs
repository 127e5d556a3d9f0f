//! Host-side conduits for exercising the FF-A layers without a partition manager.
//!
//! Only available with the `testing` feature (and in this crate's own tests).

use alloc::{collections::VecDeque, vec::Vec};
use core::cell::RefCell;

use crate::{
    code,
    raw::{Conduit, NUM_REGS, Regs},
};

/// A conduit that replays a fixed script of responses and records every request.
///
/// Panics if invoked more often than there are scripted responses.
#[derive(Debug, Default)]
pub struct ScriptedConduit {
    responses: RefCell<VecDeque<Regs>>,
    requests: RefCell<Vec<Regs>>,
}

impl ScriptedConduit {
    /// Creates a conduit answering with `responses`, in order.
    pub fn new(responses: impl IntoIterator<Item = Regs>) -> Self {
        Self {
            responses: RefCell::new(responses.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Appends a response to the end of the script.
    pub fn push(&self, response: Regs) {
        self.responses.borrow_mut().push_back(response);
    }

    /// Returns a copy of every request seen so far.
    pub fn requests(&self) -> Vec<Regs> {
        self.requests.borrow().clone()
    }

    /// Returns the number of scripted responses not consumed yet.
    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Conduit for ScriptedConduit {
    fn invoke(&self, regs: Regs) -> Regs {
        self.requests.borrow_mut().push(regs);
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted FF-A call {:#010x}", regs.function_id()))
    }
}

/// A conduit backed by a closure, for peers that need to react to the request.
pub struct FnConduit<F>(RefCell<F>);

impl<F: FnMut(Regs) -> Regs> FnConduit<F> {
    pub fn new(f: F) -> Self {
        Self(RefCell::new(f))
    }
}

impl<F: FnMut(Regs) -> Regs> Conduit for FnConduit<F> {
    fn invoke(&self, regs: Regs) -> Regs {
        (self.0.borrow_mut())(regs)
    }
}

/// Builds a register vector with `function_id` in `x0` and `words` from `x1` on.
pub fn regs(function_id: u32, words: &[u64]) -> Regs {
    assert!(words.len() < NUM_REGS, "too many words");

    let mut r = Regs::new(function_id);
    r.0[1..=words.len()].copy_from_slice(words);
    r
}

/// Builds an `FFA_ERROR` response carrying `status` in `w2`.
pub fn error(status: i32) -> Regs {
    regs(code::ERROR, &[0, status as u32 as u64])
}

/// Builds an `FFA_SUCCESS_32` response with `words` from `x1` on.
pub fn success(words: &[u64]) -> Regs {
    regs(code::SUCCESS_32, words)
}
