//! The remove engine.
//!
//! Descent follows the lookup walk, pushing a frame at every branch it
//! crosses so cleanup can propagate upward. Once the key's EOS is
//! found, the value is moved out and the array is rebuilt without the
//! EOS cell. Rebuilding may cascade:
//!
//! - a compressed run whose only purpose was reaching the removed EOS
//!   is truncated along with it;
//! - an array that becomes empty nulls its parent pointer, which
//!   removes a child from the parent branch;
//! - a LIST that loses its last child drops the branch terminator
//!   (keeping any earlier EOS content, or emptying the array);
//! - a POP that falls to seven children is rebuilt as a LIST.

use crate::alloc::{alloc_cells, dealloc_cells};
use crate::cell::{has, Cell, Tag, TaggedPtr, EOS, HOP, LIST, POP, SKIP, TAG_BRANCH, TAG_PATH};
use crate::list::{ByteList, MAX_LIST};
use crate::pop;
use crate::skip;
use crate::value;
use crate::walker::{array_len, slot_for};

/// One branch crossed on the way down.
#[derive(Clone, Copy)]
struct PathFrame {
    /// Cell holding the tagged pointer to this array.
    refcell: *mut Cell,
    /// First cell of the array.
    start: *mut Cell,
    /// Tag the array was entered with.
    initial: Tag,
    /// Rank of the child we descended into.
    child_index: usize,
    /// The LIST header or first POP bitmap cell.
    branch: *mut Cell,
    branch_is_pop: bool,
}

/// Removes `key`, returning its value.
///
/// # Safety
/// `root` must hold the tree's root cell and the caller must have
/// exclusive access to the whole tree.
pub(crate) unsafe fn remove<V>(root: *mut Cell, key: &[u8]) -> Option<V> {
    let (start, tag) = (*root).ptr().pair();
    if start.is_null() {
        return None;
    }

    let mut path: Vec<PathFrame> = Vec::new();
    let mut refcell = root;
    let mut arr = start;
    let mut run = start;
    let mut tag_now = tag;
    let mut initial = tag;
    let mut pos = 0usize;

    loop {
        while has(tag_now, EOS | TAG_PATH) {
            if has(tag_now, EOS) {
                if pos == key.len() {
                    let eos_off = run.offset_from(arr) as usize;
                    let v = value::take::<V>(run);
                    rebuild_without_eos(refcell, arr, initial, eos_off, &mut path);
                    return Some(v);
                }
                run = run.add(1);
                tag_now &= !EOS;
            }
            if has(tag_now, HOP) {
                let h = (*run).hop();
                if !h.matches(&key[pos..]) {
                    return None;
                }
                pos += h.len();
                tag_now = h.next();
                run = run.add(1);
            } else if has(tag_now, SKIP) {
                let s = (*run).skip();
                let n = s.len();
                if key.len() - pos < n {
                    return None;
                }
                if skip::bytes(run.add(1), n) != &key[pos..pos + n] {
                    return None;
                }
                pos += n;
                tag_now = s.next();
                run = run.add(1 + skip::data_cells(n));
            } else {
                break;
            }
        }

        if !has(tag_now, TAG_BRANCH) || pos >= key.len() {
            return None;
        }

        let b = key[pos];
        let branch = run;
        let is_pop = has(tag_now, POP);
        let child_index;
        if is_pop {
            let words = pop::load(run);
            match pop::find(&words, b) {
                None => return None,
                Some(off) => {
                    child_index = off - pop::POP_CELLS;
                    run = run.add(off);
                }
            }
        } else {
            let off = (*run).list().offset(b);
            if off == 0 {
                return None;
            }
            child_index = off - 1;
            run = run.add(off);
        }

        path.push(PathFrame {
            refcell,
            start: arr,
            initial,
            child_index,
            branch,
            branch_is_pop: is_pop,
        });
        pos += 1;
        refcell = run;
        let (child, t) = (*run).ptr().pair();
        if child.is_null() {
            return None;
        }
        arr = child;
        run = child;
        tag_now = t;
        initial = t;
    }
}

/// Nulls a parent pointer after its array was freed.
unsafe fn null_out(refcell: *mut Cell) {
    (*refcell).set_ptr(TaggedPtr::null());
}

/// Rebuilds the array at `start` without the EOS cell at `eos_pos`.
/// The value must already have been moved out.
unsafe fn rebuild_without_eos(
    refcell: *mut Cell,
    start: *mut Cell,
    initial: Tag,
    eos_pos: usize,
    path: &mut Vec<PathFrame>,
) {
    let orig_len = array_len(start, initial);
    let before = eos_pos;
    let after = orig_len - eos_pos - 1;

    if before == 0 && after == 0 {
        dealloc_cells(start, orig_len);
        null_out(refcell);
        if !path.is_empty() {
            remove_child_from_branch(path);
        }
        return;
    }

    if after == 0 {
        // The removed EOS ended the array, so the run(s) that led only
        // to it go with it: truncate back to the last surviving EOS,
        // or drop the whole array if none remains.
        let e = match last_eos_before(start, initial, before) {
            None => {
                dealloc_cells(start, orig_len);
                null_out(refcell);
                if !path.is_empty() {
                    remove_child_from_branch(path);
                }
                return;
            }
            Some(e) => e,
        };
        let new_len = e + 1;
        let nn = alloc_cells(new_len);
        core::ptr::copy_nonoverlapping(start, nn, new_len);
        let mut p = (*refcell).ptr();
        p.set_ptr(nn);
        (*refcell).set_ptr(p);
        // Nothing follows the surviving EOS any more.
        slot_for(refcell, nn, initial, e).set(EOS);
        dealloc_cells(start, orig_len);
        return;
    }

    // Content follows the EOS: rebuild one cell shorter and clear the
    // EOS bit where it is authoritatively stored.
    let new_len = before + after;
    let nn = alloc_cells(new_len);
    core::ptr::copy_nonoverlapping(start, nn, before);
    core::ptr::copy_nonoverlapping(start.add(eos_pos + 1), nn.add(before), after);
    let mut p = (*refcell).ptr();
    p.set_ptr(nn);
    (*refcell).set_ptr(p);
    slot_for(refcell, nn, initial, eos_pos).update(EOS, 0);
    dealloc_cells(start, orig_len);
}

/// Position of the last EOS cell strictly before `limit`, if any.
unsafe fn last_eos_before(start: *const Cell, initial: Tag, limit: usize) -> Option<usize> {
    let mut last = None;
    let mut p = 0usize;
    let mut f = initial;
    while p < limit {
        if has(f, EOS) {
            last = Some(p);
            p += 1;
            f &= !EOS;
        }
        if has(f, HOP) {
            f = (*start.add(p)).hop().next();
            p += 1;
        } else if has(f, SKIP) {
            let s = (*start.add(p)).skip();
            f = s.next();
            p += 1 + skip::data_cells(s.len());
        } else {
            break;
        }
    }
    last
}

/// The child at `path.last()` went away: update the parent branch.
unsafe fn remove_child_from_branch(path: &mut Vec<PathFrame>) {
    let frame = *path.last().expect("caller checked");
    if frame.branch_is_pop {
        remove_from_pop(path, frame);
    } else {
        remove_from_list(path, frame);
    }
}

unsafe fn remove_from_list(path: &mut Vec<PathFrame>, f: PathFrame) {
    let l = (*f.branch).list();
    let n = l.len();
    let list_pos = f.branch.offset_from(f.start) as usize;
    if n == 1 {
        return remove_last_branch(path, f, list_pos);
    }

    let orig_len = array_len(f.start, f.initial);
    let nn = alloc_cells(orig_len - 1);
    core::ptr::copy_nonoverlapping(f.start, nn, list_pos);
    (*nn.add(list_pos)).set_list(l.remove(f.child_index));
    let mut dst = list_pos + 1;
    for i in 0..n {
        if i != f.child_index {
            (*nn.add(dst)).set_raw((*f.start.add(list_pos + 1 + i)).raw());
            dst += 1;
        }
    }
    let mut p = (*f.refcell).ptr();
    p.set_ptr(nn);
    (*f.refcell).set_ptr(p);
    dealloc_cells(f.start, orig_len);
}

unsafe fn remove_from_pop(path: &mut Vec<PathFrame>, f: PathFrame) {
    let mut words = pop::load(f.branch);
    let k = pop::count(&words);
    let pop_pos = f.branch.offset_from(f.start) as usize;
    if k == 1 {
        return remove_last_branch(path, f, pop_pos);
    }
    if k - 1 <= MAX_LIST {
        return demote_pop(f, &words);
    }

    let orig_len = array_len(f.start, f.initial);
    let removed = pop::chars(&words)[f.child_index];
    pop::clear(&mut words, removed);
    let nn = alloc_cells(orig_len - 1);
    core::ptr::copy_nonoverlapping(f.start, nn, pop_pos);
    pop::store(nn.add(pop_pos), &words);
    let mut dst = pop_pos + pop::POP_CELLS;
    for i in 0..k {
        if i != f.child_index {
            (*nn.add(dst)).set_raw((*f.start.add(pop_pos + pop::POP_CELLS + i)).raw());
            dst += 1;
        }
    }
    let mut p = (*f.refcell).ptr();
    p.set_ptr(nn);
    (*f.refcell).set_ptr(p);
    dealloc_cells(f.start, orig_len);
}

/// Seven children left: a POP no longer pays for its bitmap.
unsafe fn demote_pop(f: PathFrame, words: &[u64; 4]) {
    let chars = pop::chars(words);
    let k = chars.len();
    let pop_pos = f.branch.offset_from(f.start) as usize;
    let orig_len = array_len(f.start, f.initial);
    let new_len = pop_pos + 1 + (k - 1);

    let mut list_bytes = [0u8; 7];
    let mut li = 0;
    for (i, &c) in chars.iter().enumerate() {
        if i != f.child_index {
            list_bytes[li] = c;
            li += 1;
        }
    }

    let nn = alloc_cells(new_len);
    core::ptr::copy_nonoverlapping(f.start, nn, pop_pos);
    (*nn.add(pop_pos)).set_list(ByteList::from_sorted(&list_bytes[..li]));
    let mut dst = pop_pos + 1;
    for i in 0..k {
        if i != f.child_index {
            (*nn.add(dst)).set_raw((*f.start.add(pop_pos + pop::POP_CELLS + i)).raw());
            dst += 1;
        }
    }
    let mut p = (*f.refcell).ptr();
    p.set_ptr(nn);
    (*f.refcell).set_ptr(p);
    slot_for(f.refcell, nn, f.initial, pop_pos).update(POP, LIST);
    dealloc_cells(f.start, orig_len);
}

/// The branch lost its only child. Keep the array's EOS content if it
/// has any; otherwise the array dies and the cascade continues.
unsafe fn remove_last_branch(path: &mut Vec<PathFrame>, f: PathFrame, branch_pos: usize) {
    let orig_len = array_len(f.start, f.initial);

    let e = match last_eos_before(f.start, f.initial, branch_pos) {
        None => {
            // Everything here was just the path to the dead branch.
            dealloc_cells(f.start, orig_len);
            null_out(f.refcell);
            path.pop();
            if !path.is_empty() {
                remove_child_from_branch(path);
            }
            return;
        }
        Some(e) => e,
    };

    // Truncate to the last EOS; any runs after it led only to the
    // branch and would dangle.
    let new_len = e + 1;
    let nn = alloc_cells(new_len);
    core::ptr::copy_nonoverlapping(f.start, nn, new_len);
    let mut p = (*f.refcell).ptr();
    p.set_ptr(nn);
    (*f.refcell).set_ptr(p);
    slot_for(f.refcell, nn, f.initial, e).set(EOS);
    dealloc_cells(f.start, orig_len);
}
