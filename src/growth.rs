/// Returns the nearest power of two greater than or equal to `num`.
///
/// Zero bails out with zero, and so does anything above `2^31`, which has no
/// power of two representable in a `u32`. Use [`checked_nearest_pow2_gte`] when
/// the overflow case has to be told apart.
pub const fn nearest_pow2_gte(num: u32) -> u32 {
    match checked_nearest_pow2_gte(num) {
        Some(pow2) => pow2,
        None => 0,
    }
}

/// Like [`nearest_pow2_gte`], but returns `None` when the result does not fit.
pub const fn checked_nearest_pow2_gte(num: u32) -> Option<u32> {
    if num == 0 {
        return Some(0);
    }

    num.checked_next_power_of_two()
}
