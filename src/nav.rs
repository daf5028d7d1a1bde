//! Ordered navigation: subtree min/max and the bounded next/prev walk.
//!
//! `next` and `prev` descend like lookup, but at the first point where
//! the tree diverges from the search key they pivot: `next` takes the
//! minimum of the first greater subtree, `prev` the maximum of the
//! last lesser one. When no divergence exists at the current level the
//! explicit frame stack backtracks to the nearest ancestor branch with
//! an untried sibling on the right (or left) side.
//!
//! Keys through a child sort after an EOS at the same level, so the
//! minimum takes an EOS as soon as it appears while the maximum keeps
//! descending and only falls back to the deepest EOS seen.

use crate::cell::{has, Cell, Tag, EOS, HOP, SKIP, TAG_BRANCH, TAG_PATH};
use crate::skip;
use crate::walker::branch_children;

/// A located entry: the full key and the cell holding its value.
pub(crate) type NavHit = (Vec<u8>, *mut Cell);

/// Smallest key at or below `(run, tag)`, prefixed by `prefix`.
///
/// # Safety
/// `run`/`tag` must describe a live array (or `run` may be null).
pub(crate) unsafe fn subtree_min(
    mut run: *mut Cell,
    mut tag: Tag,
    mut prefix: Vec<u8>,
) -> Option<NavHit> {
    if run.is_null() {
        return None;
    }
    loop {
        while has(tag, EOS | TAG_PATH) {
            if has(tag, EOS) {
                return Some((prefix, run));
            }
            if has(tag, HOP) {
                let h = (*run).hop();
                prefix.extend_from_slice(&h.bytes()[..h.len()]);
                tag = h.next();
                run = run.add(1);
            } else if has(tag, SKIP) {
                let s = (*run).skip();
                prefix.extend_from_slice(skip::bytes(run.add(1), s.len()));
                tag = s.next();
                run = run.add(1 + skip::data_cells(s.len()));
            } else {
                break;
            }
        }
        if !has(tag, TAG_BRANCH) {
            return None;
        }
        let children = branch_children(run, tag);
        let (b, cell) = children[0];
        prefix.push(b);
        let (next, t) = (*cell).ptr().pair();
        if next.is_null() {
            return None;
        }
        run = next;
        tag = t;
    }
}

/// Largest key at or below `(run, tag)`, prefixed by `prefix`.
///
/// # Safety
/// As [`subtree_min`].
pub(crate) unsafe fn subtree_max(
    mut run: *mut Cell,
    mut tag: Tag,
    mut prefix: Vec<u8>,
) -> Option<NavHit> {
    if run.is_null() {
        return None;
    }
    let mut deepest: Option<NavHit> = None;
    loop {
        while has(tag, EOS | TAG_PATH) {
            if has(tag, EOS) {
                deepest = Some((prefix.clone(), run));
                run = run.add(1);
                tag &= !EOS;
            }
            if has(tag, HOP) {
                let h = (*run).hop();
                prefix.extend_from_slice(&h.bytes()[..h.len()]);
                tag = h.next();
                run = run.add(1);
            } else if has(tag, SKIP) {
                let s = (*run).skip();
                prefix.extend_from_slice(skip::bytes(run.add(1), s.len()));
                tag = s.next();
                run = run.add(1 + skip::data_cells(s.len()));
            } else {
                break;
            }
        }
        if !has(tag, TAG_BRANCH) {
            return deepest;
        }
        let children = branch_children(run, tag);
        let (b, cell) = *children.last().unwrap();
        prefix.push(b);
        let (next, t) = (*cell).ptr().pair();
        if next.is_null() {
            return deepest;
        }
        run = next;
        tag = t;
    }
}

struct Frame {
    children: Vec<(u8, *mut Cell)>,
    child_index: usize,
    /// Key bytes consumed before the branch byte.
    prefix: Vec<u8>,
}

/// Least stored key `>= key` (`inclusive`) or `> key`.
///
/// # Safety
/// As [`subtree_min`], with `run` non-null.
pub(crate) unsafe fn find_next(
    mut run: *mut Cell,
    mut tag: Tag,
    key: &[u8],
    inclusive: bool,
) -> Option<NavHit> {
    let mut prefix: Vec<u8> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut pos = 0usize;

    loop {
        while has(tag, EOS | TAG_PATH) {
            if has(tag, EOS) {
                if pos >= key.len() {
                    if inclusive {
                        return Some((prefix, run));
                    }
                    // Skip the exact match; everything below is greater.
                    run = run.add(1);
                    tag &= !EOS;
                    if has(tag, TAG_PATH | TAG_BRANCH) {
                        return subtree_min(run, tag, prefix);
                    }
                    return backtrack_next(stack);
                }
                run = run.add(1);
                tag &= !EOS;
            }
            if has(tag, HOP) {
                let h = (*run).hop();
                let hb = h.bytes();
                let n = h.len();
                for i in 0..n {
                    if pos + i >= key.len() || key[pos + i] < hb[i] {
                        // Every key through this run extends past the
                        // search key here: its minimum is the answer.
                        prefix.extend_from_slice(&hb[..n]);
                        return subtree_min(run.add(1), h.next(), prefix);
                    }
                    if key[pos + i] > hb[i] {
                        return backtrack_next(stack);
                    }
                }
                prefix.extend_from_slice(&hb[..n]);
                pos += n;
                tag = h.next();
                run = run.add(1);
            } else if has(tag, SKIP) {
                let s = (*run).skip();
                let n = s.len();
                let sd = skip::bytes(run.add(1), n);
                for i in 0..n {
                    if pos + i >= key.len() || key[pos + i] < sd[i] {
                        prefix.extend_from_slice(sd);
                        return subtree_min(
                            run.add(1 + skip::data_cells(n)),
                            s.next(),
                            prefix,
                        );
                    }
                    if key[pos + i] > sd[i] {
                        return backtrack_next(stack);
                    }
                }
                prefix.extend_from_slice(sd);
                pos += n;
                tag = s.next();
                run = run.add(1 + skip::data_cells(n));
            } else {
                break;
            }
        }

        if !has(tag, TAG_BRANCH) {
            return backtrack_next(stack);
        }
        if pos >= key.len() {
            // The search key is a strict prefix of everything below.
            return subtree_min(run, tag, prefix);
        }

        let b = key[pos];
        let children = branch_children(run, tag);
        let mut exact = None;
        let mut greater = None;
        for (i, &(c, _)) in children.iter().enumerate() {
            if c == b {
                exact = Some(i);
                break;
            }
            if c > b {
                greater = Some(i);
                break;
            }
        }

        if let Some(i) = exact {
            let (child, t) = (*children[i].1).ptr().pair();
            stack.push(Frame {
                children,
                child_index: i,
                prefix: prefix.clone(),
            });
            if child.is_null() {
                return backtrack_next(stack);
            }
            prefix.push(b);
            pos += 1;
            run = child;
            tag = t;
            continue;
        }
        if let Some(i) = greater {
            let (c, cell) = children[i];
            let (child, t) = (*cell).ptr().pair();
            let mut p = prefix;
            p.push(c);
            return subtree_min(child, t, p);
        }
        return backtrack_next(stack);
    }
}

unsafe fn backtrack_next(mut stack: Vec<Frame>) -> Option<NavHit> {
    while let Some(f) = stack.pop() {
        if f.child_index + 1 < f.children.len() {
            let (b, cell) = f.children[f.child_index + 1];
            let (child, t) = (*cell).ptr().pair();
            let mut p = f.prefix;
            p.push(b);
            return subtree_min(child, t, p);
        }
    }
    None
}

/// Greatest stored key `<= key` (`inclusive`) or `< key`.
///
/// # Safety
/// As [`subtree_min`], with `run` non-null.
pub(crate) unsafe fn find_prev(
    mut run: *mut Cell,
    mut tag: Tag,
    key: &[u8],
    inclusive: bool,
) -> Option<NavHit> {
    let mut prefix: Vec<u8> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    // Deepest EOS passed on the path; always a strict prefix of `key`.
    let mut below: Option<NavHit> = None;
    let mut pos = 0usize;

    loop {
        while has(tag, EOS | TAG_PATH) {
            if has(tag, EOS) {
                if pos >= key.len() {
                    if inclusive {
                        return Some((prefix, run));
                    }
                    return backtrack_prev(stack, below);
                }
                below = Some((prefix.clone(), run));
                run = run.add(1);
                tag &= !EOS;
            }
            if has(tag, HOP) {
                let h = (*run).hop();
                let hb = h.bytes();
                let n = h.len();
                for i in 0..n {
                    if pos + i >= key.len() || key[pos + i] < hb[i] {
                        // Everything through this run is greater.
                        return backtrack_prev(stack, below);
                    }
                    if key[pos + i] > hb[i] {
                        // Everything through this run is lesser: take
                        // the largest of it.
                        prefix.extend_from_slice(&hb[..n]);
                        return subtree_max(run.add(1), h.next(), prefix);
                    }
                }
                prefix.extend_from_slice(&hb[..n]);
                pos += n;
                tag = h.next();
                run = run.add(1);
            } else if has(tag, SKIP) {
                let s = (*run).skip();
                let n = s.len();
                let sd = skip::bytes(run.add(1), n);
                for i in 0..n {
                    if pos + i >= key.len() || key[pos + i] < sd[i] {
                        return backtrack_prev(stack, below);
                    }
                    if key[pos + i] > sd[i] {
                        prefix.extend_from_slice(sd);
                        return subtree_max(
                            run.add(1 + skip::data_cells(n)),
                            s.next(),
                            prefix,
                        );
                    }
                }
                prefix.extend_from_slice(sd);
                pos += n;
                tag = s.next();
                run = run.add(1 + skip::data_cells(n));
            } else {
                break;
            }
        }

        if !has(tag, TAG_BRANCH) || pos >= key.len() {
            return backtrack_prev(stack, below);
        }

        let b = key[pos];
        let children = branch_children(run, tag);
        let mut exact = None;
        let mut lesser = None;
        for (i, &(c, _)) in children.iter().enumerate() {
            if c == b {
                exact = Some(i);
                break;
            }
            if c < b {
                lesser = Some(i);
            } else {
                break;
            }
        }

        if let Some(i) = exact {
            let (child, t) = (*children[i].1).ptr().pair();
            stack.push(Frame {
                children,
                child_index: i,
                prefix: prefix.clone(),
            });
            if child.is_null() {
                return backtrack_prev(stack, below);
            }
            prefix.push(b);
            pos += 1;
            run = child;
            tag = t;
            continue;
        }
        if let Some(i) = lesser {
            let (c, cell) = children[i];
            let (child, t) = (*cell).ptr().pair();
            let mut p = prefix;
            p.push(c);
            return subtree_max(child, t, p);
        }
        return backtrack_prev(stack, below);
    }
}

/// Unwinds toward the root taking the largest untried lesser sibling,
/// unless an EOS recorded deeper on the path already beats it.
unsafe fn backtrack_prev(mut stack: Vec<Frame>, below: Option<NavHit>) -> Option<NavHit> {
    while let Some(f) = stack.pop() {
        if let Some((k, _)) = &below {
            if k.len() > f.prefix.len() {
                return below;
            }
        }
        for i in (0..f.child_index).rev() {
            let (b, cell) = f.children[i];
            let (child, t) = (*cell).ptr().pair();
            let mut p = f.prefix.clone();
            p.push(b);
            if let Some(hit) = subtree_max(child, t, p) {
                return Some(hit);
            }
        }
    }
    below
}
