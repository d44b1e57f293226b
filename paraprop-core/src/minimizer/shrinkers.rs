//! Ready-made shrink strategies for common shapes.
//!
//! Each function returns distinct candidates that differ from the input,
//! simplest first, and an empty list once the input cannot shrink further.

/// Integer types [`integral`] can shrink.
pub trait Integral: Copy + PartialEq {
    /// The zero value.
    const ZERO: Self;

    /// Truncating division by two.
    #[must_use]
    fn halve(self) -> Self;

    /// Moves one step toward zero. Only called on non-zero values.
    #[must_use]
    fn step_toward_zero(self) -> Self;
}

macro_rules! impl_integral {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Integral for $ty {
                const ZERO: Self = 0;

                fn halve(self) -> Self {
                    self / 2
                }

                fn step_toward_zero(self) -> Self {
                    if self > 0 { self - 1 } else { self + 1 }
                }
            }
        )*
    };
}

impl_integral!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// Shrinks toward zero: zero, half the value, then one step closer.
///
/// # Examples
/// ```
/// use paraprop_core::shrinkers;
///
/// assert_eq!(shrinkers::integral(&10_i32), vec![0, 5, 9]);
/// assert_eq!(shrinkers::integral(&-3_i64), vec![0, -1, -2]);
/// assert!(shrinkers::integral(&0_u8).is_empty());
/// ```
#[must_use]
pub fn integral<T: Integral>(value: &T) -> Vec<T> {
    let value = *value;
    if value == T::ZERO {
        return Vec::new();
    }
    let mut candidates = vec![T::ZERO];
    push_distinct(&mut candidates, value.halve(), &value);
    push_distinct(&mut candidates, value.step_toward_zero(), &value);
    candidates
}

/// Shrinks toward zero and toward rounder values.
///
/// Candidates are zero, the nearest integer when within 0.1, half the value,
/// and the value rounded to two decimals. Non-finite values shrink to zero.
#[must_use]
pub fn floating(value: &f64) -> Vec<f64> {
    let value = *value;
    if value == 0.0 {
        return Vec::new();
    }
    let mut candidates = vec![0.0];
    if !value.is_finite() {
        return candidates;
    }
    let rounded = value.round();
    if (value - rounded).abs() < 0.1 {
        push_distinct_float(&mut candidates, rounded, value);
    }
    push_distinct_float(&mut candidates, value / 2.0, value);
    push_distinct_float(&mut candidates, (value * 100.0).round() / 100.0, value);
    candidates
}

/// Shrinks toward the empty string: empty, without the first character,
/// without the last character, then the first half.
///
/// # Examples
/// ```
/// use paraprop_core::shrinkers;
///
/// assert_eq!(
///     shrinkers::string(&"abcd".to_owned()),
///     vec!["", "bcd", "abc", "ab"],
/// );
/// ```
#[must_use]
#[expect(clippy::ptr_arg, reason = "matches `ShrinkFunction<String>`")]
pub fn string(value: &String) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    shrink_slice(&chars)
        .into_iter()
        .map(|candidate| candidate.into_iter().collect())
        .collect()
}

/// Shrinks toward the empty sequence with the same shapes as [`string`].
#[must_use]
#[expect(clippy::ptr_arg, reason = "matches `ShrinkFunction<Vec<T>>`")]
pub fn sequence<T: Clone + PartialEq>(value: &Vec<T>) -> Vec<Vec<T>> {
    shrink_slice(value)
}

fn shrink_slice<T: Clone + PartialEq>(items: &[T]) -> Vec<Vec<T>> {
    let (Some((_, tail)), Some((_, init))) = (items.split_first(), items.split_last()) else {
        return Vec::new();
    };
    let original = items.to_vec();
    let mut candidates = vec![Vec::new()];
    push_distinct(&mut candidates, tail.to_vec(), &original);
    push_distinct(&mut candidates, init.to_vec(), &original);
    if let Some(half) = items.get(..items.len() / 2).filter(|_| items.len() > 2) {
        push_distinct(&mut candidates, half.to_vec(), &original);
    }
    candidates
}

fn push_distinct<T: PartialEq>(candidates: &mut Vec<T>, candidate: T, original: &T) {
    if candidate != *original && !candidates.contains(&candidate) {
        candidates.push(candidate);
    }
}

fn push_distinct_float(candidates: &mut Vec<f64>, candidate: f64, original: f64) {
    if candidate.to_bits() != original.to_bits()
        && !candidates.iter().any(|seen| seen.to_bits() == candidate.to_bits())
    {
        candidates.push(candidate);
    }
}
