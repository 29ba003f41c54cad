//! Target-to-detection assignment.
//!
//! Minimum-cost bipartite matching (Hungarian / Kuhn-Munkres with row and
//! column potentials), followed by a gating post-filter.

use nalgebra::DMatrix;
use tracing::warn;

use crate::affinity::PROHIBITIVE_COST;

/// Result of [`solve_assignment`].
///
/// All index lists are sorted ascending. Every row index appears exactly
/// once across `matches` and `unmatched_rows`; likewise for columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    /// Matched `(row, col)` pairs, ordered by row
    pub matches: Vec<(usize, usize)>,
    pub unmatched_rows: Vec<usize>,
    pub unmatched_cols: Vec<usize>,
}

/// Check if a matrix contains NaN values.
pub fn has_nan(matrix: &DMatrix<f64>) -> bool {
    matrix.iter().any(|&x| x.is_nan())
}

/// Get unmatched indices from a match result.
pub fn get_unmatched(total: usize, matched: &[usize]) -> Vec<usize> {
    let mut is_matched = vec![false; total];
    for &idx in matched {
        is_matched[idx] = true;
    }
    (0..total).filter(|&i| !is_matched[i]).collect()
}

/// Solve the assignment problem over `cost` (rows = targets, cols = detections).
///
/// Entries above `max_cost` are prohibitive during the search, so an
/// over-limit pair never displaces admissible ones. Finds the matching of size
/// `min(rows, cols)` with minimum total cost, then drops every pair that is
/// prohibitive; both sides of a dropped pair are reported unmatched.
///
/// NaN and infinite entries are treated as prohibitive. For identical inputs
/// the output is identical: ties are resolved by the first candidate found in
/// ascending row then column order.
pub fn solve_assignment(cost: &DMatrix<f64>, max_cost: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost.shape();
    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: Vec::new(),
            unmatched_rows: (0..num_rows).collect(),
            unmatched_cols: (0..num_cols).collect(),
        };
    }

    if has_nan(cost) {
        warn!("cost matrix contains NaN values, treating them as prohibitive");
    }
    let sanitized = cost.map(|c| {
        if c.is_finite() && c <= max_cost {
            c.min(PROHIBITIVE_COST)
        } else {
            PROHIBITIVE_COST
        }
    });

    // The solver needs rows <= cols
    let row_to_col: Vec<usize> = if num_rows <= num_cols {
        hungarian(&sanitized)
    } else {
        let col_to_row = hungarian(&sanitized.transpose());
        let mut row_to_col = vec![usize::MAX; num_rows];
        for (col, &row) in col_to_row.iter().enumerate() {
            row_to_col[row] = col;
        }
        row_to_col
    };

    let mut matches = Vec::new();
    for (row, &col) in row_to_col.iter().enumerate() {
        if col == usize::MAX {
            continue;
        }
        let c = sanitized[(row, col)];
        if c < PROHIBITIVE_COST && c <= max_cost {
            matches.push((row, col));
        }
    }

    let matched_rows: Vec<usize> = matches.iter().map(|&(r, _)| r).collect();
    let matched_cols: Vec<usize> = matches.iter().map(|&(_, c)| c).collect();

    AssignmentResult {
        unmatched_rows: get_unmatched(num_rows, &matched_rows),
        unmatched_cols: get_unmatched(num_cols, &matched_cols),
        matches,
    }
}

/// Hungarian algorithm for `n x m` with `n <= m`, all entries finite.
///
/// Returns the assigned column for every row.
#[allow(clippy::needless_range_loop)]
fn hungarian(cost: &DMatrix<f64>) -> Vec<usize> {
    let (n, m) = cost.shape();
    debug_assert!(n <= m);

    // 1-based potentials; index 0 is a virtual column/row
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    // p[j] = row assigned to column j (0 = none)
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment along the alternating path
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut row_to_col = vec![usize::MAX; n];
    for j in 1..=m {
        if p[j] != 0 {
            row_to_col[p[j] - 1] = j - 1;
        }
    }
    row_to_col
}
