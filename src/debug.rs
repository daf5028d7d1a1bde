//! Introspection: structure statistics, an indented dump, and an
//! invariant checker used heavily by the test suite.

use std::fmt::Write as _;

use crate::cell::{has, Cell, Tag, EOS, HOP, LIST, POP, SKIP, TAG_ALL, TAG_BRANCH};
use crate::raw::RawTrie;
use crate::skip;
use crate::{pop, value};

/// Structure counters collected in one walk over the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrieStats {
    /// Node arrays reachable from the root.
    pub total_arrays: usize,
    /// Total 8-byte cells across those arrays.
    pub total_cells: usize,
    /// Deepest array, counting the root array as depth 1.
    pub max_depth: usize,
    /// Stored values (equals `len()`).
    pub value_count: usize,
    pub hop_count: usize,
    pub hop_total_len: usize,
    pub skip_count: usize,
    pub skip_total_len: usize,
    pub list_count: usize,
    pub pop_count: usize,
    /// POP nodes with 8..=15 children.
    pub short_pop_count: usize,
}

impl<V> RawTrie<V> {
    /// Walks the whole tree collecting [`TrieStats`].
    pub fn stats(&self) -> TrieStats {
        let mut stats = TrieStats::default();
        let (run, tag) = self.root_pair();
        if !run.is_null() {
            unsafe { collect(run, tag, 1, &mut stats) };
        }
        stats
    }

    /// Checks every structural invariant, returning a description of
    /// each violation found (empty means the tree is sound).
    pub fn verify_integrity(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let (run, tag) = self.root_pair();
        if run.is_null() {
            if self.len() != 0 {
                issues.push(format!("null root but len() == {}", self.len()));
            }
            return issues;
        }
        let mut values = 0usize;
        unsafe { verify(run, tag, 0, self.fixed_len(), &mut values, &mut issues) };
        if values != self.len() {
            issues.push(format!(
                "len() is {} but {} values are reachable",
                self.len(),
                values
            ));
        }
        issues
    }
}

impl<V: std::fmt::Debug> RawTrie<V> {
    /// Prints the tree structure, one array per line group.
    pub fn debug_print(&self) {
        println!("=== celltrie ===");
        println!("len: {}", self.len());
        let (run, tag) = self.root_pair();
        if run.is_null() {
            println!("(empty)");
        } else {
            unsafe { dump::<V>(run, tag, 0) };
        }
        let s = self.stats();
        println!(
            "{} arrays, {} cells ({} bytes), max depth {}",
            s.total_arrays,
            s.total_cells,
            s.total_cells * 8,
            s.max_depth
        );
        println!(
            "{} HOPs ({} bytes), {} SKIPs ({} bytes), {} LISTs, {} POPs ({} short)",
            s.hop_count,
            s.hop_total_len,
            s.skip_count,
            s.skip_total_len,
            s.list_count,
            s.pop_count,
            s.short_pop_count
        );
        println!("================");
    }
}

unsafe fn collect(start: *const Cell, mut tag: Tag, depth: usize, stats: &mut TrieStats) {
    stats.total_arrays += 1;
    stats.max_depth = stats.max_depth.max(depth);
    let mut run = start;
    loop {
        if has(tag, EOS) {
            stats.value_count += 1;
            run = run.add(1);
            tag &= !EOS;
        }
        if has(tag, HOP) {
            let h = (*run).hop();
            stats.hop_count += 1;
            stats.hop_total_len += h.len();
            tag = h.next();
            run = run.add(1);
        } else if has(tag, SKIP) {
            let s = (*run).skip();
            stats.skip_count += 1;
            stats.skip_total_len += s.len();
            tag = s.next();
            run = run.add(1 + skip::data_cells(s.len()));
        } else {
            break;
        }
    }
    let children: usize;
    if has(tag, LIST) {
        stats.list_count += 1;
        children = (*run).list().len();
        run = run.add(1);
    } else if has(tag, POP) {
        let words = pop::load(run);
        let k = pop::count(&words);
        stats.pop_count += 1;
        if k < 16 {
            stats.short_pop_count += 1;
        }
        children = k;
        run = run.add(pop::POP_CELLS);
    } else {
        children = 0;
    }
    for _ in 0..children {
        let (child, t) = (*run).ptr().pair();
        if !child.is_null() {
            collect(child, t, depth + 1, stats);
        }
        run = run.add(1);
    }
    stats.total_cells += run.offset_from(start) as usize;
}

unsafe fn verify(
    start: *const Cell,
    initial: Tag,
    key_depth: usize,
    fixed_len: usize,
    values: &mut usize,
    issues: &mut Vec<String>,
) {
    let mut tag = initial;
    let mut run = start;
    let mut depth = key_depth;
    let mut eos_in_array = 0usize;
    let mut path_in_array = 0usize;

    loop {
        if tag & !TAG_ALL != 0 {
            issues.push(format!("unknown tag bits {:#x}", tag));
            return;
        }
        if has(tag, HOP) && has(tag, SKIP) {
            issues.push("HOP and SKIP set together".to_string());
            return;
        }
        if has(tag, HOP | SKIP) && has(tag, TAG_BRANCH) {
            issues.push("branch bits set alongside a path node".to_string());
            return;
        }
        if has(tag, EOS) {
            eos_in_array += 1;
            *values += 1;
            if fixed_len != 0 && depth != fixed_len {
                issues.push(format!(
                    "EOS at depth {} in a fixed-width-{} trie",
                    depth, fixed_len
                ));
            }
            run = run.add(1);
            tag &= !EOS;
        }
        if has(tag, HOP) {
            let h = (*run).hop();
            path_in_array += 1;
            if h.len() == 0 || h.len() > crate::hop::MAX_HOP {
                issues.push(format!("HOP of length {}", h.len()));
                return;
            }
            depth += h.len();
            tag = h.next();
            run = run.add(1);
        } else if has(tag, SKIP) {
            let s = (*run).skip();
            path_in_array += 1;
            if s.len() <= crate::hop::MAX_HOP {
                issues.push(format!("SKIP of length {} (should be a HOP)", s.len()));
            }
            depth += s.len();
            tag = s.next();
            run = run.add(1 + skip::data_cells(s.len()));
        } else {
            break;
        }
    }

    if fixed_len != 0 {
        if eos_in_array > 1 {
            issues.push(format!("{} EOS in one fixed-width array", eos_in_array));
        }
        if path_in_array > 1 {
            issues.push(format!(
                "{} path nodes in one fixed-width array",
                path_in_array
            ));
        }
    }

    if has(tag, LIST) && has(tag, POP) {
        issues.push("LIST and POP set together".to_string());
        return;
    }

    if has(tag, LIST) {
        let l = (*run).list();
        let n = l.len();
        if n == 0 || n > crate::list::MAX_LIST {
            issues.push(format!("LIST with {} children", n));
            return;
        }
        let bytes: Vec<u8> = l.chars().collect();
        if !bytes.windows(2).all(|w| w[0] < w[1]) {
            issues.push(format!("LIST bytes not strictly ascending: {:?}", bytes));
        }
        run = run.add(1);
        for i in 0..n {
            let (child, t) = (*run).ptr().pair();
            if child.is_null() {
                issues.push(format!("null child {} of LIST", i));
            } else {
                verify(child, t, depth + 1, fixed_len, values, issues);
            }
            run = run.add(1);
        }
    } else if has(tag, POP) {
        let words = pop::load(run);
        let k = pop::count(&words);
        if k < 8 {
            issues.push(format!("POP with {} children (minimum 8)", k));
        }
        run = run.add(pop::POP_CELLS);
        for i in 0..k {
            let (child, t) = (*run).ptr().pair();
            if child.is_null() {
                issues.push(format!("null child {} of POP", i));
            } else {
                verify(child, t, depth + 1, fixed_len, values, issues);
            }
            run = run.add(1);
        }
    } else if eos_in_array == 0 {
        issues.push("array with neither EOS nor branch".to_string());
    }
}

unsafe fn dump<V: std::fmt::Debug>(start: *const Cell, mut tag: Tag, indent: usize) {
    let pad = "  ".repeat(indent);
    let mut run = start;
    let mut line = String::new();
    loop {
        if has(tag, EOS) {
            let v = value::get::<V>(run);
            let _ = write!(line, "[value {:?}] ", v);
            run = run.add(1);
            tag &= !EOS;
        }
        if has(tag, HOP) {
            let h = (*run).hop();
            let _ = write!(line, "[hop {:?}] ", Bytes(&h.bytes()[..h.len()]));
            tag = h.next();
            run = run.add(1);
        } else if has(tag, SKIP) {
            let s = (*run).skip();
            let _ = write!(line, "[skip {:?}] ", Bytes(skip::bytes(run.add(1), s.len())));
            tag = s.next();
            run = run.add(1 + skip::data_cells(s.len()));
        } else {
            break;
        }
    }
    if has(tag, LIST) {
        let l = (*run).list();
        let _ = write!(line, "[list {} children]", l.len());
        println!("{pad}{line}");
        let children = run.add(1);
        for i in 0..l.len() {
            println!("{pad}  '{}' ->", ByteChar(l.at(i)));
            let (child, t) = (*children.add(i)).ptr().pair();
            if !child.is_null() {
                dump::<V>(child, t, indent + 2);
            }
        }
    } else if has(tag, POP) {
        let words = pop::load(run);
        let chars = pop::chars(&words);
        let _ = write!(line, "[pop {} children]", chars.len());
        println!("{pad}{line}");
        let children = run.add(pop::POP_CELLS);
        for (i, b) in chars.iter().enumerate() {
            println!("{pad}  '{}' ->", ByteChar(*b));
            let (child, t) = (*children.add(i)).ptr().pair();
            if !child.is_null() {
                dump::<V>(child, t, indent + 2);
            }
        }
    } else {
        println!("{pad}{line}");
    }
}

struct Bytes<'a>(&'a [u8]);

impl std::fmt::Debug for Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "{:02x?}", self.0),
        }
    }
}

struct ByteChar(u8);

impl std::fmt::Display for ByteChar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "{}", self.0 as char)
        } else {
            write!(f, "\\x{:02x}", self.0)
        }
    }
}
