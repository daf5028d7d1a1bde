//! The insert engine.
//!
//! Descent mirrors lookup while tracking where the current tag is
//! authoritatively stored. It ends in exactly one terminal situation,
//! each handled by a dedicated mutator:
//!
//! - key already present (return, optionally overwriting)
//! - mismatch inside a HOP or SKIP (split the run)
//! - key exhausted mid-array (inject an EOS)
//! - branch lacks the next byte (grow the LIST, promote LIST to POP,
//!   or grow the POP)
//! - array ends with no branch (append a new run at the end)
//!
//! Every mutator allocates the replacement array first, copies the
//! surrounding cells verbatim, patches the mutated region and the
//! authoritative flag slot, redirects the parent pointer, and only then
//! frees the old array. When key bytes remain after a branch gains a
//! child, the tail builder emits `[HOP|SKIP]? [EOS value]` into the
//! fresh child slot.

use crate::alloc::{alloc_cells, dealloc_cells};
use crate::cell::{has, Cell, Tag, TaggedPtr, EOS, HOP, LIST, POP, SKIP, TAG_BRANCH, TAG_PATH};
use crate::hop::{Hop, MAX_HOP};
use crate::list::{ByteList, MAX_LIST};
use crate::skip::{self, Skip};
use crate::walker::{array_len, FlagSlot};
use crate::{pop, value};

pub(crate) enum InsertResult<V> {
    /// A new value now lives at this cell.
    Inserted(*mut Cell),
    /// The key existed; the old value was swapped out.
    Replaced(*mut Cell, V),
    /// The key existed and overwriting was not requested; the incoming
    /// value is handed back untouched.
    Occupied(*mut Cell, V),
}

/// Descent state for one node array.
struct Descent {
    /// Cell holding the tagged pointer to this array.
    refcell: *mut Cell,
    /// First cell of the array.
    start: *mut Cell,
    /// Cursor within the array.
    run: *mut Cell,
    /// Tag describing the cursor position.
    tag: Tag,
    /// Tag the array was entered with.
    initial: Tag,
    /// Authoritative storage of `tag`.
    slot: FlagSlot,
}

impl Descent {
    /// Points the parent at `new_start`, replacing the tag.
    unsafe fn redirect(&self, new_start: *mut Cell, tag: Tag) {
        (*self.refcell).set_ptr(TaggedPtr::new(new_start, tag));
    }

    /// Points the parent at `new_start`, keeping the stored tag.
    unsafe fn redirect_keep_tag(&self, new_start: *mut Cell) {
        let mut p = (*self.refcell).ptr();
        p.set_ptr(new_start);
        (*self.refcell).set_ptr(p);
    }

    /// The flag slot relocated into a rebuilt array.
    fn slot_in(&self, new_start: *mut Cell) -> FlagSlot {
        self.slot.rebased(self.start, new_start)
    }
}

/// Cells a compressed run of `len` bytes occupies (0 for none).
#[inline]
pub(crate) fn seg_cells(len: usize) -> usize {
    if len == 0 {
        0
    } else if len <= MAX_HOP {
        1
    } else {
        1 + skip::data_cells(len)
    }
}

/// Tag bit for a compressed run of `len` bytes.
#[inline]
pub(crate) fn seg_tag(len: usize) -> Tag {
    if len == 0 {
        0
    } else if len <= MAX_HOP {
        HOP
    } else {
        SKIP
    }
}

/// Writes `bytes` as a HOP or SKIP at `w`; returns the cell after it.
///
/// # Safety
/// `w` must have `seg_cells(bytes.len())` writable cells.
pub(crate) unsafe fn write_seg(w: *mut Cell, bytes: &[u8], next: Tag) -> *mut Cell {
    debug_assert!(!bytes.is_empty());
    if bytes.len() <= MAX_HOP {
        (*w).set_hop(Hop::new(bytes, next));
        w.add(1)
    } else {
        (*w).set_skip(Skip::new(bytes.len(), next));
        skip::write_bytes(w.add(1), bytes);
        w.add(1 + skip::data_cells(bytes.len()))
    }
}

/// Builds a fresh tail array for `bytes` and attaches it at `slot_cell`.
/// Returns the value cell.
///
/// # Safety
/// `slot_cell` must be a writable cell owning no child.
pub(crate) unsafe fn build_tail<V>(slot_cell: *mut Cell, bytes: &[u8], value: V) -> *mut Cell {
    if bytes.is_empty() {
        let arr = alloc_cells(1);
        value::write(arr, value);
        (*slot_cell).set_ptr(TaggedPtr::new(arr, EOS));
        return arr;
    }
    let len = seg_cells(bytes.len()) + 1;
    let arr = alloc_cells(len);
    let eos = write_seg(arr, bytes, EOS);
    value::write(eos, value);
    (*slot_cell).set_ptr(TaggedPtr::new(arr, seg_tag(bytes.len())));
    eos
}

/// Inserts `key` into the non-empty tree hanging off `root`.
///
/// # Safety
/// `root` must hold a valid non-null tagged pointer, and the caller
/// must have exclusive access to the whole tree.
pub(crate) unsafe fn insert<V>(
    root: *mut Cell,
    key: &[u8],
    value: V,
    overwrite: bool,
) -> InsertResult<V> {
    let (start, tag) = (*root).ptr().pair();
    debug_assert!(!start.is_null());
    let mut d = Descent {
        refcell: root,
        start,
        run: start,
        tag,
        initial: tag,
        slot: FlagSlot::Ptr(root),
    };
    let mut pos = 0usize;

    loop {
        // Fresh array: the cursor sits on the first cell.
        if pos == key.len() {
            if has(d.tag, EOS) {
                return finish_existing(d.run, value, overwrite);
            }
            return inject_eos(&d, value);
        }

        // Walk the EOS / HOP / SKIP chain.
        while has(d.tag, EOS | TAG_PATH) {
            if has(d.tag, EOS) {
                if pos == key.len() {
                    return finish_existing(d.run, value, overwrite);
                }
                d.run = d.run.add(1);
                d.tag &= !EOS;
            }
            if pos == key.len() {
                // The key ends right at a continuing run (which can
                // lack its own EOS after removals): splice one in.
                return inject_eos(&d, value);
            }
            if has(d.tag, HOP) {
                let hop_cell = d.run;
                let h = (*hop_cell).hop();
                let mm = h.mismatch(&key[pos..]);
                if mm < h.len() {
                    return split_hop(&d, key, pos, h, mm, value);
                }
                pos += h.len();
                d.tag = h.next();
                d.slot = FlagSlot::InHop(hop_cell);
                d.run = d.run.add(1);
            } else if has(d.tag, SKIP) {
                let skip_cell = d.run;
                let s = (*skip_cell).skip();
                let n = s.len();
                let sd = skip::bytes(skip_cell.add(1), n);
                let rem = &key[pos..];
                let cl = n.min(rem.len());
                let mut i = 0;
                while i < cl && rem[i] == sd[i] {
                    i += 1;
                }
                if i < n {
                    return split_skip(&d, key, pos, i, value);
                }
                pos += n;
                d.tag = s.next();
                d.slot = FlagSlot::InSkip(skip_cell);
                d.run = d.run.add(1 + skip::data_cells(n));
            } else {
                break;
            }
        }

        if pos == key.len() {
            return inject_eos(&d, value);
        }

        if !has(d.tag, TAG_BRANCH) {
            return append_branch(&d, key, pos, value);
        }

        // Branch: look up the next key byte or grow the branch.
        let b = key[pos];
        if has(d.tag, POP) {
            let words = pop::load(d.run);
            match pop::find(&words, b) {
                None => {
                    let slot_cell = grow_pop(&d, b);
                    return InsertResult::Inserted(build_tail(slot_cell, &key[pos + 1..], value));
                }
                Some(off) => d.run = d.run.add(off),
            }
        } else {
            let l = (*d.run).list();
            let off = l.offset(b);
            if off == 0 {
                let slot_cell = if l.len() >= MAX_LIST {
                    promote_list(&d, b)
                } else {
                    grow_list(&d, b)
                };
                return InsertResult::Inserted(build_tail(slot_cell, &key[pos + 1..], value));
            }
            d.run = d.run.add(off);
        }
        pos += 1;

        // Follow the child pointer into the next array.
        d.refcell = d.run;
        let (child, t) = (*d.run).ptr().pair();
        debug_assert!(!child.is_null(), "branch child pointers are never null");
        d.start = child;
        d.run = child;
        d.tag = t;
        d.initial = t;
        d.slot = FlagSlot::Ptr(d.refcell);
    }
}

unsafe fn finish_existing<V>(eos_cell: *mut Cell, value: V, overwrite: bool) -> InsertResult<V> {
    if overwrite {
        let old = value::replace(eos_cell, value);
        InsertResult::Replaced(eos_cell, old)
    } else {
        InsertResult::Occupied(eos_cell, value)
    }
}

/// The key diverges from (or ends inside) a HOP at `break_pos`.
unsafe fn split_hop<V>(
    d: &Descent,
    key: &[u8],
    pos: usize,
    hop: Hop,
    break_pos: usize,
    value: V,
) -> InsertResult<V> {
    let orig_len = array_len(d.start, d.initial);
    let hop_off = d.run.offset_from(d.start) as usize;
    let nodes_after = orig_len - hop_off - 1;
    let remaining = key.len() - pos;
    let old_cont = hop.next();
    let chars = hop.bytes();
    let hop_len = hop.len();

    if break_pos >= remaining {
        // The key ends inside the run: prefix, EOS, suffix.
        debug_assert!(break_pos == remaining && break_pos > 0);
        let plen = break_pos;
        let slen = hop_len - break_pos;
        let nsz = hop_off + 1 + 1 + 1 + nodes_after;
        let nn = alloc_cells(nsz);
        core::ptr::copy_nonoverlapping(d.start, nn, hop_off);
        let w = nn.add(hop_off);
        (*w).set_hop(Hop::new(&chars[..plen], EOS | HOP));
        let eos = w.add(1);
        (*w.add(2)).set_hop(Hop::new(&chars[break_pos..hop_len], old_cont));
        core::ptr::copy_nonoverlapping(d.run.add(1), w.add(3), nodes_after);
        value::write(eos, value);
        debug_assert!(slen > 0);
        d.redirect_keep_tag(nn);
        dealloc_cells(d.start, orig_len);
        return InsertResult::Inserted(eos);
    }

    // The key and the run diverge: branch into two children.
    let plen = break_pos;
    let slen = hop_len - break_pos - 1;
    let old_b = chars[break_pos];
    let new_b = key[pos + break_pos];
    let nsz = hop_off + seg_cells(plen) + 1 + 2;
    let nn = alloc_cells(nsz);
    core::ptr::copy_nonoverlapping(d.start, nn, hop_off);
    let mut w = nn.add(hop_off);
    if plen > 0 {
        (*w).set_hop(Hop::new(&chars[..plen], LIST));
        w = w.add(1);
    }
    (*w).set_list(ByteList::pair(old_b, new_b));
    let children = w.add(1);
    let new_idx = usize::from(new_b > old_b);
    let old_idx = 1 - new_idx;

    // Rewrap the surviving suffix (and trailing cells) as a child.
    let (old_child, old_tag) = if slen > 0 {
        let ot = alloc_cells(1 + nodes_after);
        (*ot).set_hop(Hop::new(&chars[break_pos + 1..hop_len], old_cont));
        core::ptr::copy_nonoverlapping(d.run.add(1), ot.add(1), nodes_after);
        (ot, HOP)
    } else if nodes_after > 0 {
        let ot = alloc_cells(nodes_after);
        core::ptr::copy_nonoverlapping(d.run.add(1), ot, nodes_after);
        (ot, old_cont)
    } else {
        (core::ptr::null_mut(), old_cont)
    };
    debug_assert!(!old_child.is_null(), "a run always leads somewhere");
    (*children.add(old_idx)).set_ptr(TaggedPtr::new(old_child, old_tag));

    if plen > 0 {
        d.redirect_keep_tag(nn);
    } else {
        match d.slot_in(nn) {
            FlagSlot::Ptr(_) => d.redirect(nn, (d.initial & !(TAG_PATH | TAG_BRANCH)) | LIST),
            slot => {
                slot.update(TAG_PATH | TAG_BRANCH, LIST);
                d.redirect_keep_tag(nn);
            }
        }
    }
    dealloc_cells(d.start, orig_len);
    InsertResult::Inserted(build_tail(
        children.add(new_idx),
        &key[pos + break_pos + 1..],
        value,
    ))
}

/// The key diverges from (or ends inside) a SKIP at `break_at`.
unsafe fn split_skip<V>(
    d: &Descent,
    key: &[u8],
    pos: usize,
    break_at: usize,
    value: V,
) -> InsertResult<V> {
    let skip_cell = d.run;
    let s = (*skip_cell).skip();
    let total = s.len();
    let old_cont = s.next();
    let sd = skip::bytes(skip_cell.add(1), total);
    let sn = skip::data_cells(total);
    let orig_len = array_len(d.start, d.initial);
    let sho = skip_cell.offset_from(d.start) as usize;
    let nodes_after = orig_len - sho - 1 - sn;
    let remaining = key.len() - pos;

    if break_at >= remaining {
        // The key ends inside the run: prefix, EOS, suffix.
        debug_assert!(break_at == remaining && break_at > 0);
        let plen = break_at;
        let slen = total - break_at;
        let after_prefix = EOS | seg_tag(slen);
        let nsz = sho + seg_cells(plen) + 1 + seg_cells(slen) + nodes_after;
        let nn = alloc_cells(nsz);
        core::ptr::copy_nonoverlapping(d.start, nn, sho);
        let w = nn.add(sho);
        let w = write_seg(w, &sd[..plen], after_prefix);
        let eos = w;
        let w = w.add(1);
        let w = write_seg(w, &sd[break_at..], old_cont);
        core::ptr::copy_nonoverlapping(skip_cell.add(1 + sn), w, nodes_after);
        value::write(eos, value);

        if seg_tag(plen) == SKIP {
            d.redirect_keep_tag(nn);
        } else {
            // The prefix shrank to a HOP; retag it at its flag slot.
            match d.slot_in(nn) {
                FlagSlot::Ptr(_) => d.redirect(nn, (d.initial & !SKIP) | HOP),
                slot => {
                    slot.update(SKIP, HOP);
                    d.redirect_keep_tag(nn);
                }
            }
        }
        dealloc_cells(d.start, orig_len);
        return InsertResult::Inserted(eos);
    }

    // Diverge: branch into two children.
    let plen = break_at;
    let slen = total - break_at - 1;
    let old_b = sd[break_at];
    let new_b = key[pos + break_at];
    let nsz = sho + seg_cells(plen) + 1 + 2;
    let nn = alloc_cells(nsz);
    core::ptr::copy_nonoverlapping(d.start, nn, sho);
    let mut w = nn.add(sho);
    if plen > 0 {
        w = write_seg(w, &sd[..plen], LIST);
    }
    (*w).set_list(ByteList::pair(old_b, new_b));
    let children = w.add(1);
    let new_idx = usize::from(new_b > old_b);
    let old_idx = 1 - new_idx;

    let (old_child, old_tag) = if slen > 0 {
        let sc = seg_cells(slen);
        let ot = alloc_cells(sc + nodes_after);
        write_seg(ot, &sd[break_at + 1..], old_cont);
        core::ptr::copy_nonoverlapping(skip_cell.add(1 + sn), ot.add(sc), nodes_after);
        (ot, seg_tag(slen))
    } else if nodes_after > 0 {
        let ot = alloc_cells(nodes_after);
        core::ptr::copy_nonoverlapping(skip_cell.add(1 + sn), ot, nodes_after);
        (ot, old_cont)
    } else {
        (core::ptr::null_mut(), old_cont)
    };
    debug_assert!(!old_child.is_null(), "a run always leads somewhere");
    (*children.add(old_idx)).set_ptr(TaggedPtr::new(old_child, old_tag));

    if plen == 0 {
        match d.slot_in(nn) {
            FlagSlot::Ptr(_) => d.redirect(nn, (d.initial & !(TAG_PATH | TAG_BRANCH)) | LIST),
            slot => {
                slot.update(TAG_PATH | TAG_BRANCH, LIST);
                d.redirect_keep_tag(nn);
            }
        }
    } else if seg_tag(plen) == SKIP {
        d.redirect_keep_tag(nn);
    } else {
        match d.slot_in(nn) {
            FlagSlot::Ptr(_) => d.redirect(nn, (d.initial & !SKIP) | HOP),
            slot => {
                slot.update(SKIP, HOP);
                d.redirect_keep_tag(nn);
            }
        }
    }
    dealloc_cells(d.start, orig_len);
    InsertResult::Inserted(build_tail(
        children.add(new_idx),
        &key[pos + break_at + 1..],
        value,
    ))
}

/// The key is exhausted at the cursor: splice in an EOS cell.
unsafe fn inject_eos<V>(d: &Descent, value: V) -> InsertResult<V> {
    let orig_len = array_len(d.start, d.initial);
    let at = d.run.offset_from(d.start) as usize;
    let nn = alloc_cells(orig_len + 1);
    core::ptr::copy_nonoverlapping(d.start, nn, at);
    core::ptr::copy_nonoverlapping(d.run, nn.add(at + 1), orig_len - at);
    value::write(nn.add(at), value);
    match d.slot_in(nn) {
        FlagSlot::Ptr(_) => d.redirect(nn, d.initial | EOS),
        slot => {
            slot.update(0, EOS);
            d.redirect_keep_tag(nn);
        }
    }
    dealloc_cells(d.start, orig_len);
    InsertResult::Inserted(nn.add(at))
}

/// The array ended without a branch but key bytes remain: append a
/// compressed run plus value at the end.
unsafe fn append_branch<V>(d: &Descent, key: &[u8], pos: usize, value: V) -> InsertResult<V> {
    let rest = &key[pos..];
    debug_assert!(!rest.is_empty());
    let orig_len = array_len(d.start, d.initial);
    let at = d.run.offset_from(d.start) as usize;
    debug_assert_eq!(at, orig_len, "appending happens past the final cell");
    let nn = alloc_cells(orig_len + seg_cells(rest.len()) + 1);
    core::ptr::copy_nonoverlapping(d.start, nn, orig_len);
    let eos = write_seg(nn.add(at), rest, EOS);
    value::write(eos, value);
    match d.slot_in(nn) {
        FlagSlot::Ptr(_) => d.redirect(nn, d.initial | seg_tag(rest.len())),
        slot => {
            slot.update(0, seg_tag(rest.len()));
            d.redirect_keep_tag(nn);
        }
    }
    dealloc_cells(d.start, orig_len);
    InsertResult::Inserted(eos)
}

/// Adds a child to a LIST with room; returns the empty child slot.
unsafe fn grow_list(d: &Descent, b: u8) -> *mut Cell {
    let orig_len = array_len(d.start, d.initial);
    let lo = d.run.offset_from(d.start) as usize;
    let l = (*d.run).list();
    let n = l.len();
    let nn = alloc_cells(orig_len + 1);
    core::ptr::copy_nonoverlapping(d.start, nn, lo);
    let (grown, ins) = l.insert(b);
    (*nn.add(lo)).set_list(grown);
    core::ptr::copy_nonoverlapping(d.start.add(lo + 1), nn.add(lo + 1), ins);
    core::ptr::copy_nonoverlapping(
        d.start.add(lo + 1 + ins),
        nn.add(lo + 2 + ins),
        n - ins,
    );
    d.redirect_keep_tag(nn);
    dealloc_cells(d.start, orig_len);
    nn.add(lo + 1 + ins)
}

/// A full LIST must take an eighth child: rebuild it as a POP.
unsafe fn promote_list(d: &Descent, b: u8) -> *mut Cell {
    let orig_len = array_len(d.start, d.initial);
    let lo = d.run.offset_from(d.start) as usize;
    let l = (*d.run).list();
    debug_assert_eq!(l.len(), MAX_LIST);

    let mut words = [0u64; 4];
    for c in l.chars() {
        pop::set(&mut words, c);
    }
    pop::set(&mut words, b);

    let nn = alloc_cells(orig_len + 3 + 1);
    core::ptr::copy_nonoverlapping(d.start, nn, lo);
    pop::store(nn.add(lo), &words);
    let new_rank = pop::find(&words, b).unwrap() - pop::POP_CELLS;
    let mut src = d.start.add(lo + 1);
    for i in 0..MAX_LIST + 1 {
        if i != new_rank {
            (*nn.add(lo + pop::POP_CELLS + i)).set_raw((*src).raw());
            src = src.add(1);
        }
    }
    match d.slot_in(nn) {
        FlagSlot::Ptr(_) => d.redirect(nn, (d.initial & !LIST) | POP),
        slot => {
            slot.update(LIST, POP);
            d.redirect_keep_tag(nn);
        }
    }
    dealloc_cells(d.start, orig_len);
    nn.add(lo + pop::POP_CELLS + new_rank)
}

/// Adds a child to a POP; returns the empty child slot.
unsafe fn grow_pop(d: &Descent, b: u8) -> *mut Cell {
    let orig_len = array_len(d.start, d.initial);
    let po = d.run.offset_from(d.start) as usize;
    let mut words = pop::load(d.run);
    let k = pop::count(&words);
    pop::set(&mut words, b);

    let nn = alloc_cells(orig_len + 1);
    core::ptr::copy_nonoverlapping(d.start, nn, po);
    pop::store(nn.add(po), &words);
    let new_rank = pop::find(&words, b).unwrap() - pop::POP_CELLS;
    let mut src = d.start.add(po + pop::POP_CELLS);
    for i in 0..k + 1 {
        if i != new_rank {
            (*nn.add(po + pop::POP_CELLS + i)).set_raw((*src).raw());
            src = src.add(1);
        }
    }
    d.redirect_keep_tag(nn);
    dealloc_cells(d.start, orig_len);
    nn.add(po + pop::POP_CELLS + new_rank)
}
