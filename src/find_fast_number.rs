//! FFT-friendly padding lengths.

/// Factors that may appear once on top of powers of 2 and 3.
const SINGLE_FACTORS: [usize; 4] = [1, 5, 7, 11];

/// Smallest `factor * 2^a * 3^b` not below `lower_limit`.
fn smallest_smooth(lower_limit: usize, factor: usize) -> usize {
    let mut best = usize::MAX;
    let mut threes = factor;
    loop {
        let mut candidate = threes;
        while candidate < lower_limit {
            candidate *= 2;
        }
        best = best.min(candidate);
        if threes >= lower_limit {
            return best;
        }
        threes *= 3;
    }
}

/// Smallest length not below `lower_limit` made of factors of 2 and 3, with
/// at most one extra factor of 5, 7 or 11.
///
/// Factors of 2 and 3 are the fastest, the others are still reasonably fast.
pub fn fastish_fft_len(lower_limit: usize) -> usize {
    if lower_limit <= 1 {
        return 1;
    }
    SINGLE_FACTORS
        .iter()
        .map(|&factor| smallest_smooth(lower_limit, factor))
        .min()
        .unwrap_or(lower_limit)
}

/// [`fastish_fft_len`] of every axis.
pub(crate) fn fastish_shape(shape: &[usize]) -> Vec<usize> {
    shape.iter().map(|&n| fastish_fft_len(n)).collect()
}
