use ndarray::{Array, ArrayView, Axis, Dimension, RemoveAxis};
use num_traits::Float;

/// Mean of the non-NaN values, NaN when nothing is left
pub fn nanmean<A, I>(values: I) -> A
where
    A: Float,
    I: IntoIterator<Item = A>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((A::zero(), 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        A::nan()
    } else {
        sum / A::from(count).unwrap_or_else(A::nan)
    }
}

/// NaN-ignoring mean along one axis
pub fn nanmean_axis<A, D>(array: ArrayView<'_, A, D>, axis: Axis) -> Array<A, D::Smaller>
where
    A: Float,
    D: Dimension + RemoveAxis,
{
    array.map_axis(axis, |lane| nanmean(lane.iter().copied()))
}

/// Number of NaN or infinite values
pub fn count_non_finite<'a, A, I>(values: I) -> usize
where
    A: Float + 'a,
    I: IntoIterator<Item = &'a A>,
{
    values.into_iter().filter(|v| !v.is_finite()).count()
}

/// (min, max) over the finite values
pub fn finite_range<'a, A, I>(values: I) -> Option<(A, A)>
where
    A: Float + 'a,
    I: IntoIterator<Item = &'a A>,
{
    values
        .into_iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |range, v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}
