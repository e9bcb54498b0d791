//! Content differencing between two snapshots of a page.
//!
//! Text is split into tokens (word runs, whitespace runs, single punctuation
//! characters) and aligned with Myers' shortest-edit-script algorithm in its
//! linear-space form: find the middle snake, recurse on both halves. The
//! edit script is then folded into tagged segments:
//!
//! - concatenating `Unchanged` + `Removed` segments yields the previous text
//! - concatenating `Unchanged` + `Added` segments yields the current text
//! - inside one change hunk, the removed text comes before the added text

use serde::{Deserialize, Serialize};

use crate::extract::{extract_text, normalize_whitespace};

/// Classification of a diff segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentTag {
    Unchanged,
    Added,
    Removed,
}

/// A tagged span of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSegment {
    pub tag: SegmentTag,
    pub text: String,
}

impl DiffSegment {
    fn new(tag: SegmentTag, text: String) -> Self {
        DiffSegment { tag, text }
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Drift of one page between two runs.
///
/// `has_changes` is true iff some segment is not `Unchanged`;
/// `added_count` / `removed_count` are the character totals of the added and
/// removed segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftSummary {
    pub segments: Vec<DiffSegment>,
    pub added_count: usize,
    pub removed_count: usize,
    pub has_changes: bool,
}

impl DriftSummary {
    fn from_segments(segments: Vec<DiffSegment>) -> Self {
        let count = |tag: SegmentTag| -> usize {
            segments
                .iter()
                .filter(|s| s.tag == tag)
                .map(DiffSegment::len)
                .sum()
        };
        let added_count = count(SegmentTag::Added);
        let removed_count = count(SegmentTag::Removed);
        let has_changes = segments.iter().any(|s| s.tag != SegmentTag::Unchanged);
        DriftSummary {
            segments,
            added_count,
            removed_count,
            has_changes,
        }
    }

    /// Segments that are not `Unchanged`.
    pub fn changes(&self) -> impl Iterator<Item = &DiffSegment> {
        self.segments.iter().filter(|s| s.tag != SegmentTag::Unchanged)
    }

    /// Rebuild the previous text from unchanged and removed segments.
    pub fn previous_text(&self) -> String {
        self.collect(SegmentTag::Removed)
    }

    /// Rebuild the current text from unchanged and added segments.
    pub fn current_text(&self) -> String {
        self.collect(SegmentTag::Added)
    }

    fn collect(&self, side: SegmentTag) -> String {
        self.segments
            .iter()
            .filter(|s| s.tag == SegmentTag::Unchanged || s.tag == side)
            .map(|s| s.text.as_str())
            .collect()
    }
}

/// Diff two plain-text strings.
pub fn diff(previous: &str, current: &str) -> DriftSummary {
    let a = tokenize(previous);
    let b = tokenize(current);

    let mut ops: Vec<Op> = Vec::with_capacity(a.len() + b.len());
    align(&a, &b, &mut ops);
    DriftSummary::from_segments(fold(ops))
}

/// Diff the visible text of two HTML documents, ignoring layout-only
/// whitespace changes.
pub fn diff_pages(previous_html: &str, current_html: &str) -> DriftSummary {
    let previous = normalize_whitespace(&extract_text(previous_html));
    let current = normalize_whitespace(&extract_text(current_html));
    diff(&previous, &current)
}

// ---------------------------------------------------------------------------
// Tokenization
// ---------------------------------------------------------------------------

#[derive(PartialEq, Eq, Clone, Copy)]
enum CharClass {
    Space,
    Word,
    Other,
}

fn class_of(c: char) -> CharClass {
    if c.is_whitespace() {
        CharClass::Space
    } else if c.is_alphanumeric() {
        CharClass::Word
    } else {
        CharClass::Other
    }
}

/// Split into whitespace runs, alphanumeric runs and single other characters.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current: Option<CharClass> = None;

    for (i, c) in text.char_indices() {
        let class = class_of(c);
        let continues = current == Some(class) && class != CharClass::Other;
        if !continues && i > start {
            tokens.push(&text[start..i]);
            start = i;
        }
        current = Some(class);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

// ---------------------------------------------------------------------------
// Myers alignment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op<'a> {
    Equal(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

/// Append the shortest edit script turning `a` into `b` to `ops`.
fn align<'a>(a: &[&'a str], b: &[&'a str], ops: &mut Vec<Op<'a>>) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mid_a = &a[prefix..a.len() - suffix];
    let mid_b = &b[prefix..b.len() - suffix];

    ops.extend(a[..prefix].iter().map(|&t| Op::Equal(t)));
    match middle_snake(mid_a, mid_b) {
        Some((x, y)) => {
            align(&mid_a[..x], &mid_b[..y], ops);
            align(&mid_a[x..], &mid_b[y..], ops);
        }
        None => {
            ops.extend(mid_a.iter().map(|&t| Op::Delete(t)));
            ops.extend(mid_b.iter().map(|&t| Op::Insert(t)));
        }
    }
    ops.extend(a[a.len() - suffix..].iter().map(|&t| Op::Equal(t)));
}

/// Point `(x, y)` where the forward and reverse D-paths of Myers' algorithm
/// meet, splitting the problem into two smaller ones. `None` when `a` and `b`
/// share no token, or when either side is empty, so the whole middle is one
/// removal plus one addition.
///
/// Expects `a` and `b` to have no common prefix or suffix. Uses O(N + M)
/// memory for the two frontiers.
fn middle_snake(a: &[&str], b: &[&str]) -> Option<(usize, usize)> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let offset = max_d;
    let width = 2 * max_d + 2;

    // Furthest x reached on each diagonal, -1 where not yet reached.
    // `forward` counts from the start, `reverse` from the end of both sides.
    let mut forward = vec![-1isize; width as usize];
    let mut reverse = vec![-1isize; width as usize];
    forward[(offset + 1) as usize] = 0;
    reverse[(offset + 1) as usize] = 0;

    let delta = n - m;
    let odd = delta % 2 != 0;
    let ix = |k: isize| (offset + k) as usize;
    let in_range = |i: isize| (0..width).contains(&i);
    let splits = |x: isize, y: isize| {
        (0..=n).contains(&x) && (0..=m).contains(&y) && (x, y) != (0, 0) && (x, y) != (n, m)
    };

    // Diagonals that ran off the edit graph are trimmed from later steps.
    let (mut f_start, mut f_end, mut r_start, mut r_end) = (0, 0, 0, 0);

    for d in 0..max_d {
        let mut k = -d + f_start;
        while k <= d - f_end {
            let mut x = if k == -d || (k != d && forward[ix(k - 1)] < forward[ix(k + 1)]) {
                forward[ix(k + 1)]
            } else {
                forward[ix(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            forward[ix(k)] = x;

            if x > n {
                f_end += 2;
            } else if y > m {
                f_start += 2;
            } else if odd {
                let rk = offset + delta - k;
                if in_range(rk) && reverse[rk as usize] != -1 {
                    let reached = n - reverse[rk as usize];
                    if x >= reached && splits(x, y) {
                        return Some((x as usize, y as usize));
                    }
                }
            }
            k += 2;
        }

        let mut k = -d + r_start;
        while k <= d - r_end {
            let mut x = if k == -d || (k != d && reverse[ix(k - 1)] < reverse[ix(k + 1)]) {
                reverse[ix(k + 1)]
            } else {
                reverse[ix(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[(n - x - 1) as usize] == b[(m - y - 1) as usize] {
                x += 1;
                y += 1;
            }
            reverse[ix(k)] = x;

            if x > n {
                r_end += 2;
            } else if y > m {
                r_start += 2;
            } else if !odd {
                let fk = offset + delta - k;
                if in_range(fk) && forward[fk as usize] != -1 {
                    let fx = forward[fk as usize];
                    let fy = offset + fx - fk;
                    if fx >= n - x && splits(fx, fy) {
                        return Some((fx as usize, fy as usize));
                    }
                }
            }
            k += 2;
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Segment folding
// ---------------------------------------------------------------------------

fn fold(ops: Vec<Op<'_>>) -> Vec<DiffSegment> {
    let mut segments = Vec::new();
    let mut unchanged = String::new();
    let mut removed = String::new();
    let mut added = String::new();

    let flush = |segments: &mut Vec<DiffSegment>, tag: SegmentTag, buf: &mut String| {
        if !buf.is_empty() {
            segments.push(DiffSegment::new(tag, std::mem::take(buf)));
        }
    };

    for op in ops {
        match op {
            Op::Equal(t) => {
                flush(&mut segments, SegmentTag::Removed, &mut removed);
                flush(&mut segments, SegmentTag::Added, &mut added);
                unchanged.push_str(t);
            }
            Op::Delete(t) => {
                flush(&mut segments, SegmentTag::Unchanged, &mut unchanged);
                removed.push_str(t);
            }
            Op::Insert(t) => {
                flush(&mut segments, SegmentTag::Unchanged, &mut unchanged);
                added.push_str(t);
            }
        }
    }
    flush(&mut segments, SegmentTag::Unchanged, &mut unchanged);
    flush(&mut segments, SegmentTag::Removed, &mut removed);
    flush(&mut segments, SegmentTag::Added, &mut added);
    segments
}
