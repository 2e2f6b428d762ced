//! Iterator extension methods.

use std::iter::Zip;

/// Zips two iterators, panicking if their lengths differ.
///
/// [`Iterator::zip`] silently stops at the shorter iterator, which hides bugs when both sides are
/// expected to line up exactly (predictions vs. ground truth, coordinates vs. buffers). Use this
/// instead whenever equal lengths are an invariant.
#[track_caller]
pub fn zip_exact<A, B>(a: A, b: B) -> Zip<A::IntoIter, B::IntoIter>
where
    A: IntoIterator,
    B: IntoIterator,
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    assert_eq!(
        a.len(),
        b.len(),
        "`zip_exact` called on iterators with different lengths"
    );

    a.zip(b)
}
