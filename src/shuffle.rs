//! In-place Fisher–Yates shuffle over any indexable, swappable sequence
//!
//! The sequence only has to expose a length and an element swap, so paired
//! or otherwise non-contiguous collections can be shuffled as one unit.

use rand::Rng;

/// A sequence that can be shuffled: a length plus an element swap
///
/// Implemented for slices and `Vec`; implement it for any structure whose
/// elements can be exchanged by index (for example two parallel vectors
/// that must stay aligned).
pub trait SwapSlice {
    /// Number of elements in the sequence
    fn len(&self) -> usize;

    /// Exchange the elements at `i` and `j`
    fn swap(&mut self, i: usize, j: usize);

    /// Whether the sequence has no elements
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> SwapSlice for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn swap(&mut self, i: usize, j: usize) {
        <[T]>::swap(self, i, j);
    }
}

impl<T> SwapSlice for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.as_mut_slice().swap(i, j);
    }
}

/// Shuffle `data` in place with the Fisher–Yates algorithm
///
/// Walks the sequence from the back, swapping each element with a uniformly
/// chosen element at or before it. Every permutation is equally likely for a
/// uniform `rng`.
///
/// # Example
///
/// ```rust
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use stopgate::shuffle;
///
/// let mut items = vec![1, 2, 3, 4, 5];
/// let mut rng = StdRng::seed_from_u64(7);
/// shuffle(&mut items, &mut rng);
/// # let mut sorted = items.clone();
/// # sorted.sort_unstable();
/// # assert_eq!(sorted, [1, 2, 3, 4, 5]);
/// ```
pub fn shuffle<S, R>(data: &mut S, rng: &mut R)
where
    S: SwapSlice + ?Sized,
    R: Rng + ?Sized,
{
    for i in (1..data.len()).rev() {
        let j = rng.gen_range(0..=i);
        data.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn shuffle_is_a_permutation() {
        let mut items: Vec<u32> = (0..100).collect();
        let mut rng = StdRng::seed_from_u64(42);
        shuffle(&mut items, &mut rng);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_permutation() {
        let mut a: Vec<u32> = (0..50).collect();
        let mut b = a.clone();

        shuffle(&mut a, &mut StdRng::seed_from_u64(9));
        shuffle(&mut b, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_and_single_are_untouched() {
        let mut rng = StdRng::seed_from_u64(1);

        let mut empty: Vec<u32> = Vec::new();
        shuffle(&mut empty, &mut rng);
        assert!(empty.is_empty());

        let mut single = [7];
        shuffle(&mut single[..], &mut rng);
        assert_eq!(single, [7]);
    }

    /// Two parallel vectors that must stay aligned under shuffling.
    struct Paired {
        keys: Vec<u32>,
        values: Vec<u32>,
    }

    impl SwapSlice for Paired {
        fn len(&self) -> usize {
            self.keys.len()
        }

        fn swap(&mut self, i: usize, j: usize) {
            self.keys.swap(i, j);
            self.values.swap(i, j);
        }
    }

    #[test]
    fn custom_sequence_keeps_pairs_aligned() {
        let mut paired = Paired {
            keys: (0..20).collect(),
            values: (0..20).map(|k| k * 10).collect(),
        };
        shuffle(&mut paired, &mut StdRng::seed_from_u64(3));

        for (k, v) in paired.keys.iter().zip(&paired.values) {
            assert_eq!(*v, k * 10);
        }
    }
}
