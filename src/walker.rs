//! Walking a node array's tag sequence.
//!
//! A node array is `([EOS]? [HOP|SKIP])* [LIST|POP]?` — the parent
//! pointer's tag describes the first cell, and each HOP/SKIP header
//! re-describes whatever follows it. The walker derives the array's
//! total length from that sequence, and [`FlagSlot`] names the one
//! authoritative place the current tag is stored, which is what every
//! mutator updates when it changes structure.

use crate::cell::{has, Cell, Tag, EOS, HOP, LIST, POP, SKIP};
use crate::pop;
use crate::skip::{self, Skip};

/// Where the tag governing some position in an array lives: the parent
/// pointer's high bits, or the `next` field of a HOP or SKIP header.
#[derive(Clone, Copy)]
pub(crate) enum FlagSlot {
    Ptr(*mut Cell),
    InHop(*mut Cell),
    InSkip(*mut Cell),
}

impl FlagSlot {
    /// # Safety
    /// The referenced cell must be live and of the matching kind.
    pub(crate) unsafe fn get(self) -> Tag {
        match self {
            FlagSlot::Ptr(c) => (*c).ptr().tag(),
            FlagSlot::InHop(c) => (*c).hop().next(),
            FlagSlot::InSkip(c) => (*c).skip().next(),
        }
    }

    /// # Safety
    /// As [`FlagSlot::get`], with exclusive access.
    pub(crate) unsafe fn set(self, tag: Tag) {
        match self {
            FlagSlot::Ptr(c) => {
                let mut p = (*c).ptr();
                p.set_tag(tag);
                (*c).set_ptr(p);
            }
            FlagSlot::InHop(c) => {
                let h = (*c).hop();
                (*c).set_hop(h.with_next(tag));
            }
            FlagSlot::InSkip(c) => {
                let s = (*c).skip();
                (*c).set_skip(Skip::new(s.len(), tag));
            }
        }
    }

    /// # Safety
    /// As [`FlagSlot::set`].
    pub(crate) unsafe fn update(self, clear: Tag, add: Tag) {
        self.set((self.get() & !clear) | add);
    }

    /// Offset of the slot's cell from `start`, or `None` for the
    /// parent-pointer slot (which lives outside the array).
    pub(crate) fn pos_in(self, start: *const Cell) -> Option<usize> {
        match self {
            FlagSlot::Ptr(_) => None,
            FlagSlot::InHop(c) | FlagSlot::InSkip(c) => {
                Some(unsafe { c.cast_const().offset_from(start) } as usize)
            }
        }
    }

    /// The same slot relocated into a rebuilt copy of the array.
    pub(crate) fn rebased(self, old_start: *const Cell, new_start: *mut Cell) -> FlagSlot {
        match self.pos_in(old_start) {
            None => self,
            Some(p) => match self {
                FlagSlot::InHop(_) => FlagSlot::InHop(unsafe { new_start.add(p) }),
                FlagSlot::InSkip(_) => FlagSlot::InSkip(unsafe { new_start.add(p) }),
                FlagSlot::Ptr(_) => unreachable!(),
            },
        }
    }
}

/// Total cell count of the array at `start`, derived from the tags.
///
/// # Safety
/// `start` must be a live array whose first cell is described by `tag`.
pub(crate) unsafe fn array_len(start: *const Cell, mut tag: Tag) -> usize {
    let mut run = start;
    loop {
        if has(tag, EOS) {
            run = run.add(1);
            tag &= !EOS;
        }
        if has(tag, HOP) {
            tag = (*run).hop().next();
            run = run.add(1);
        } else if has(tag, SKIP) {
            let s = (*run).skip();
            tag = s.next();
            run = run.add(1 + skip::data_cells(s.len()));
        } else {
            break;
        }
    }
    if has(tag, LIST) {
        run = run.add(1 + (*run).list().len());
    } else if has(tag, POP) {
        let words = pop::load(run);
        run = run.add(pop::POP_CELLS + pop::count(&words));
    }
    run.offset_from(start) as usize
}

/// The authoritative [`FlagSlot`] for cell position `pos` of the array
/// at `start`. `refcell` is the parent cell holding the array pointer.
///
/// # Safety
/// As [`array_len`]; `pos` must not exceed the chain region's extent.
pub(crate) unsafe fn slot_for(
    refcell: *mut Cell,
    start: *mut Cell,
    initial: Tag,
    pos: usize,
) -> FlagSlot {
    let mut slot = FlagSlot::Ptr(refcell);
    let mut p = 0usize;
    let mut tag = initial;
    loop {
        if p == pos {
            return slot;
        }
        if has(tag, EOS) {
            p += 1;
            tag &= !EOS;
            if p == pos {
                return slot;
            }
        }
        if has(tag, HOP) {
            let c = start.add(p);
            slot = FlagSlot::InHop(c);
            tag = (*c).hop().next();
            p += 1;
        } else if has(tag, SKIP) {
            let c = start.add(p);
            slot = FlagSlot::InSkip(c);
            let s = (*c).skip();
            tag = s.next();
            p += 1 + skip::data_cells(s.len());
        } else {
            // Branch cells; their bits live in the current slot.
            return slot;
        }
    }
}

/// The branch bytes and their child cells, ascending.
///
/// # Safety
/// `run` must point at a live LIST header or POP bitmap matching `tag`.
pub(crate) unsafe fn branch_children(run: *mut Cell, tag: Tag) -> Vec<(u8, *mut Cell)> {
    if has(tag, LIST) {
        let l = (*run).list();
        (0..l.len()).map(|i| (l.at(i), run.add(1 + i))).collect()
    } else {
        debug_assert!(has(tag, POP));
        let words = pop::load(run);
        pop::chars(&words)
            .into_iter()
            .enumerate()
            .map(|(i, b)| (b, run.add(pop::POP_CELLS + i)))
            .collect()
    }
}
