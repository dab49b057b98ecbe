//! Multi-way line merging for variant sources.
//!
//! Variant bodies are encoded as sequences of global line indices and
//! folded one at a time into a merged sequence. Every merged line carries
//! its *condition*: the list of permutation indices whose body contains
//! that line, in merge order.
use crate::DecompileError;

/// One step of an edit script between the merged base and a new sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiffOp {
    /// Line present in both; `(base index, new index)`.
    Keep(usize, usize),
    /// Line only in the base; `(base index)`.
    Remove(usize),
    /// Line only in the new sequence; `(new index)`.
    Add(usize),
}

/// Myers O((N+M)D) shortest edit script over line indices.
pub(crate) fn myers_diff(a: &[u32], b: &[u32]) -> Vec<DiffOp> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }

    let offset = max;
    let width = (2 * max + 1) as usize;
    let mut v = vec![0isize; width];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    let mut found_d = None;
    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let index = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[index - 1] < v[index + 1]) {
                v[index + 1]
            } else {
                v[index - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[index] = x;
            if x >= n && y >= m {
                found_d = Some(d);
                break 'outer;
            }
            k += 2;
        }
    }
    let found_d = found_d.expect("edit distance is bounded by n + m");

    // Backtrack from (n, m) through the stored frontiers.
    let mut ops = Vec::new();
    let (mut x, mut y) = (n, m);
    for d in (1..=found_d).rev() {
        let v = &trace[d as usize];
        let k = x - y;
        let index = (k + offset) as usize;
        let went_down = k == -d || (k != d && v[index - 1] < v[index + 1]);
        let prev_k = if went_down { k + 1 } else { k - 1 };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            ops.push(DiffOp::Keep(x as usize, y as usize));
        }
        if went_down {
            y -= 1;
            ops.push(DiffOp::Add(y as usize));
        } else {
            x -= 1;
            ops.push(DiffOp::Remove(x as usize));
        }
        debug_assert_eq!((prev_x, prev_y), (x, y));
    }
    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        ops.push(DiffOp::Keep(x as usize, y as usize));
    }
    debug_assert!(x == 0 && y == 0);

    ops.reverse();
    ops
}

/// A merged line and the permutations that contain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CondLine {
    pub line: u32,
    pub condition: Vec<usize>,
}

/// Folds encoded permutation bodies into one conditional sequence.
///
/// Kept lines accumulate the new permutation index; added lines start with
/// just it; removed lines keep their existing condition.
pub(crate) fn merge_permutations(bodies: &[Vec<u32>]) -> Result<Vec<CondLine>, DecompileError> {
    let mut merged: Vec<CondLine> = match bodies.first() {
        Some(first) => first
            .iter()
            .map(|line| CondLine {
                line: *line,
                condition: vec![0],
            })
            .collect(),
        None => return Ok(Vec::new()),
    };

    for (permutation, body) in bodies.iter().enumerate().skip(1) {
        let base: Vec<u32> = merged.iter().map(|l| l.line).collect();
        let mut next = Vec::with_capacity(merged.len().max(body.len()));
        let mut merged_iter = merged.into_iter();

        for op in myers_diff(&base, body) {
            match op {
                DiffOp::Keep(_, _) => {
                    let mut line = merged_iter
                        .next()
                        .ok_or_else(|| DecompileError::Inconsistent("edit script ran past the merged sequence".to_string()))?;
                    line.condition.push(permutation);
                    next.push(line);
                }
                DiffOp::Remove(_) => {
                    let line = merged_iter
                        .next()
                        .ok_or_else(|| DecompileError::Inconsistent("edit script ran past the merged sequence".to_string()))?;
                    next.push(line);
                }
                DiffOp::Add(b_index) => {
                    next.push(CondLine {
                        line: body[b_index],
                        condition: vec![permutation],
                    });
                }
            }
        }
        merged = next;
    }

    // Filtering by any permutation must reproduce its body exactly.
    for (permutation, body) in bodies.iter().enumerate() {
        let filtered: Vec<u32> = merged
            .iter()
            .filter(|l| l.condition.contains(&permutation))
            .map(|l| l.line)
            .collect();
        if &filtered != body {
            return Err(DecompileError::Inconsistent(format!(
                "permutation {permutation} does not survive the merge"
            )));
        }
    }

    Ok(merged)
}

/// A run of consecutive lines sharing one condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CodeLineGroup {
    pub lines: Vec<u32>,
    pub condition: Vec<usize>,
}

pub(crate) fn group_lines(merged: Vec<CondLine>) -> Vec<CodeLineGroup> {
    let mut groups: Vec<CodeLineGroup> = Vec::new();
    for line in merged {
        match groups.last_mut() {
            Some(group) if group.condition == line.condition => group.lines.push(line.line),
            _ => groups.push(CodeLineGroup {
                lines: vec![line.line],
                condition: line.condition,
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(a: &[u32], b: &[u32]) -> (Vec<u32>, usize) {
        // Replay the script against `a` and count edits.
        let ops = myers_diff(a, b);
        let mut result = Vec::new();
        let mut edits = 0;
        for op in &ops {
            match op {
                DiffOp::Keep(ai, bi) => {
                    assert_eq!(a[*ai], b[*bi]);
                    result.push(a[*ai]);
                }
                DiffOp::Remove(_) => edits += 1,
                DiffOp::Add(bi) => {
                    result.push(b[*bi]);
                    edits += 1;
                }
            }
        }
        (result, edits)
    }

    #[test]
    fn classic_myers_example() {
        // ABCABBA -> CBABAC with edit distance 5.
        let a = [1, 2, 3, 1, 2, 2, 1];
        let b = [3, 2, 1, 2, 1, 3];
        let (result, edits) = apply(&a, &b);
        assert_eq!(b.to_vec(), result);
        assert_eq!(5, edits);
    }

    #[test]
    fn empty_and_identical_sequences() {
        assert!(myers_diff(&[], &[]).is_empty());

        let (result, edits) = apply(&[], &[1, 2]);
        assert_eq!(vec![1, 2], result);
        assert_eq!(2, edits);

        let (result, edits) = apply(&[1, 2], &[]);
        assert!(result.is_empty());
        assert_eq!(2, edits);

        let (result, edits) = apply(&[5, 6, 7], &[5, 6, 7]);
        assert_eq!(vec![5, 6, 7], result);
        assert_eq!(0, edits);
    }

    #[test]
    fn merge_tracks_conditions() {
        // Permutation 0: 1 2 4, permutation 1: 1 3 4.
        let merged = merge_permutations(&[vec![1, 2, 4], vec![1, 3, 4]]).unwrap();
        let summary: Vec<(u32, Vec<usize>)> = merged
            .into_iter()
            .map(|l| (l.line, l.condition))
            .collect();
        assert_eq!(
            vec![
                (1, vec![0, 1]),
                (2, vec![0]),
                (3, vec![1]),
                (4, vec![0, 1]),
            ],
            summary
        );
    }

    #[test]
    fn merge_three_way() {
        let bodies = vec![
            vec![10, 20, 30, 40],
            vec![10, 25, 30, 40],
            vec![10, 20, 30, 45],
        ];
        let merged = merge_permutations(&bodies).unwrap();
        for (index, body) in bodies.iter().enumerate() {
            let filtered: Vec<u32> = merged
                .iter()
                .filter(|l| l.condition.contains(&index))
                .map(|l| l.line)
                .collect();
            assert_eq!(body, &filtered);
        }
    }

    #[test]
    fn grouping_merges_runs() {
        let merged = merge_permutations(&[vec![1, 2, 4, 5], vec![1, 2, 3, 4, 5]]).unwrap();
        let groups = group_lines(merged);
        assert_eq!(
            vec![
                CodeLineGroup {
                    lines: vec![1, 2],
                    condition: vec![0, 1],
                },
                CodeLineGroup {
                    lines: vec![3],
                    condition: vec![1],
                },
                CodeLineGroup {
                    lines: vec![4, 5],
                    condition: vec![0, 1],
                },
            ],
            groups
        );
    }
}
