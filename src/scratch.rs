//! §5 — the per-caller scratch arena and the shared contact buffer.
//!
//! Each of up to `MAX_PHYS_THREADS` callers owns one [`CallerScratch`]
//! record, reset at the start of every top-level query by
//! [`reset_global_prim_buffers`]. `caller_id == MAX_PHYS_THREADS` is the
//! shared "locking" caller: its writes to the global contact buffer take
//! [`SCRATCH`]'s lock instead of assuming exclusive per-thread ownership.

use std::sync::{Mutex, OnceLock};

use crate::contact::Contact;

/// Upper bound on concurrently registered physics threads; `caller_id`s run
/// `0..=MAX_PHYS_THREADS`, with `MAX_PHYS_THREADS` reserved for callers that
/// opt into locked access instead of owning a dedicated scratch slot.
pub const MAX_PHYS_THREADS: usize = 4;

/// One caller's working state for a single top-level query. Mirrors the
/// buffers the original keeps per-thread: a used-nodes cache (here folded
/// into [`crate::gtest::UsedNodesMap`] and owned by the caller instead), a
/// feature-id scratch, and the primitive scratch the BVH leaf walk reuses
/// instead of allocating fresh `Vec`s per leaf.
#[derive(Debug, Default)]
pub struct CallerScratch {
    pub feature_ids: Vec<u8>,
    pub local_contacts: Vec<Contact>,
    /// Set once the caller's contact budget is exhausted; polled by the
    /// driver after every leaf-pair dispatch (§5 "Cancellation").
    pub stop_intersection: bool,
}

impl CallerScratch {
    fn reset(&mut self) {
        self.feature_ids.clear();
        self.local_contacts.clear();
        self.stop_intersection = false;
    }
}

struct ScratchTable {
    callers: Vec<Mutex<CallerScratch>>,
}

fn scratch_table() -> &'static ScratchTable {
    static TABLE: OnceLock<ScratchTable> = OnceLock::new();
    TABLE.get_or_init(|| ScratchTable {
        callers: (0..=MAX_PHYS_THREADS).map(|_| Mutex::new(CallerScratch::default())).collect(),
    })
}

/// Clears the named caller's scratch state; called once at the start of
/// each top-level `intersect`/`sweep`/`build_occlusion_cubemap` call.
pub fn reset_global_prim_buffers(caller_id: usize) {
    let table = scratch_table();
    let mut slot = table.callers[caller_id.min(MAX_PHYS_THREADS)].lock().unwrap();
    slot.reset();
}

/// Runs `f` with exclusive access to `caller_id`'s scratch record.
pub fn with_caller_scratch<R>(caller_id: usize, f: impl FnOnce(&mut CallerScratch) -> R) -> R {
    let table = scratch_table();
    let mut slot = table.callers[caller_id.min(MAX_PHYS_THREADS)].lock().unwrap();
    f(&mut slot)
}

/// The shared contact output buffer (`g_contacts`/`g_lock_intersect`): every
/// caller appends through [`push_shared_contact`], which takes the lock only
/// across the append, matching §5's "held only across an intersect call"
/// contract.
static SHARED_CONTACTS: Mutex<Vec<Contact>> = Mutex::new(Vec::new());

pub fn push_shared_contact(c: Contact) {
    SHARED_CONTACTS.lock().unwrap().push(c);
}

pub fn drain_shared_contacts() -> Vec<Contact> {
    std::mem::take(&mut *SHARED_CONTACTS.lock().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Vector3};

    fn contact() -> Contact {
        Contact {
            pt: [Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)],
            n: Vector3::unit_x(),
            i_feature: [[0, 0], [0, 0]],
            depth: 0.0,
            i_prim: [0, 0],
            dir: Vector3::unit_x(),
            t: 0.0,
            unproj_mode: 0,
            vel: 0.0,
            id: [0, 0],
            i_node: [0, 0],
            border_points: Vec::new(),
            border_idx: Vec::new(),
            area: None,
        }
    }

    #[test]
    fn reset_clears_stop_flag() {
        with_caller_scratch(0, |s| {
            s.stop_intersection = true;
            s.feature_ids.push(1);
        });
        reset_global_prim_buffers(0);
        with_caller_scratch(0, |s| {
            assert!(!s.stop_intersection);
            assert!(s.feature_ids.is_empty());
        });
    }

    #[test]
    fn shared_contacts_round_trip() {
        drain_shared_contacts();
        push_shared_contact(contact());
        push_shared_contact(contact());
        let drained = drain_shared_contacts();
        assert_eq!(drained.len(), 2);
        assert!(drain_shared_contacts().is_empty());
    }
}
