/// The largest dimensionality a sampler accepts. `2^MAX_DIMENSIONS` weights are kept per sampler.
pub const MAX_DIMENSIONS: usize = 20;

/// Fills `weights` with the multilinear corner weights for the given fractional offsets.
///
/// `fractions[d]` is the offset of the query position from the floored lattice position along
/// axis `d` and is expected to lie in `[0, 1)`. After the call, `weights[k]` is the product over
/// all axes `d` of `fractions[d]` if bit `d` of `k` is set, and `1 - fractions[d]` otherwise.
///
/// The weights are computed by halving: starting from a single weight of `1`, each axis from the
/// highest down to axis `0` splits every populated weight into a `1 - w` part that stays in place
/// and a `w` part written `2^d` entries further. This touches every entry once per split, i.e.,
/// the whole computation is `O(2^n)`.
///
/// At an integer position all fractions are `0`, so `weights[0]` is exactly `1.0` and every other
/// weight is exactly `0.0`.
///
/// # Panics
/// Panics if `weights.len() != 1 << fractions.len()`.
pub fn fill_weights(fractions: &[f64], weights: &mut [f64]) {
    assert_eq!(
        weights.len(),
        1 << fractions.len(),
        "weights buffer must hold 2^n entries"
    );
    weights[0] = 1.0;
    for d in (0..fractions.len()).rev() {
        let w = fractions[d];
        let w_inv = 1.0 - w;
        let stride = 1 << d;
        for i in (0..weights.len()).step_by(stride << 1) {
            weights[i + stride] = weights[i] * w;
            weights[i] *= w_inv;
        }
    }
}

/// Returns the `i`-th code of the binary reflected Gray code.
/// Successive codes differ in exactly one bit, namely bit `i.trailing_zeros()`.
pub fn gray_code(i: usize) -> usize {
    i ^ (i >> 1)
}
