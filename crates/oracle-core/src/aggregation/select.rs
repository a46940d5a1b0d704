//! Order-statistic selection and integer median.
//!
//! All functions are pure and operate on a private copy of the input, so callers
//! keep their arrival-ordered response lists intact.
//!
//! # Key Functions
//!
//! - [`select`]: k-th smallest value (1-based) via three-way partitioning
//! - [`median`]: median of a response list without floating point
//!
//! # Performance Characteristics
//!
//! Selection runs in expected O(n) time. The working copy is partitioned in place
//! and only the partition containing the requested rank is revisited, so no
//! allocation happens beyond the single copy.

use super::{errors::OracleError, types::AnswerValue};
use std::cmp::Ordering;

/// Returns the `k`-th smallest value in `values` (1-based rank).
///
/// Uses the middle element of the current window as pivot and partitions the
/// window into strictly-less, equal and strictly-greater blocks. Equal values are
/// treated as a single block, so duplicates never need individual ranks.
///
/// # Errors
///
/// Returns [`OracleError::Range`] if `k` is outside `[1, values.len()]`
/// (including any `k` for an empty input).
pub fn select(values: &[AnswerValue], k: usize) -> Result<AnswerValue, OracleError> {
    if k == 0 || k > values.len() {
        return Err(OracleError::Range { k, len: values.len() });
    }

    let mut working = values.to_vec();
    let mut lo = 0;
    let mut hi = working.len();
    let mut rank = k;

    loop {
        // rank stays within [1, hi - lo], so the window is never empty
        let window = &mut working[lo..hi];
        let pivot = window[window.len() / 2];
        let (less, less_or_equal) = partition_three_way(window, pivot);

        if rank <= less {
            hi = lo + less;
        } else if rank <= less_or_equal {
            return Ok(pivot);
        } else {
            rank -= less_or_equal;
            lo += less_or_equal;
        }
    }
}

/// Partitions `slice` around `pivot` in place.
///
/// Returns `(lt, le)` such that `slice[..lt] < pivot`, `slice[lt..le] == pivot`
/// and `slice[le..] > pivot`.
fn partition_three_way(slice: &mut [AnswerValue], pivot: AnswerValue) -> (usize, usize) {
    let mut lt = 0;
    let mut i = 0;
    let mut gt = slice.len();

    while i < gt {
        match slice[i].cmp(&pivot) {
            Ordering::Less => {
                slice.swap(lt, i);
                lt += 1;
                i += 1;
            }
            Ordering::Greater => {
                gt -= 1;
                slice.swap(i, gt);
            }
            Ordering::Equal => i += 1,
        }
    }

    (lt, gt)
}

/// Computes the median of `values` using integer arithmetic only.
///
/// Let `n = values.len()` and `mid = n / 2`:
/// - odd `n`: `select(values, mid + 1)`
/// - even `n`: `floor((select(values, mid) + select(values, mid + 1)) / 2)`
///
/// # Errors
///
/// Returns [`OracleError::Range`] if `values` is empty.
pub fn median(values: &[AnswerValue]) -> Result<AnswerValue, OracleError> {
    let n = values.len();
    let mid = n / 2;

    if n % 2 == 1 {
        return select(values, mid + 1);
    }

    let lower = select(values, mid)?;
    let upper = select(values, mid + 1)?;
    Ok(floor_average(lower, upper))
}

/// `floor((a + b) / 2)` without overflowing `u128`.
#[inline]
fn floor_average(a: AnswerValue, b: AnswerValue) -> AnswerValue {
    a / 2 + b / 2 + (a % 2 + b % 2) / 2
}
