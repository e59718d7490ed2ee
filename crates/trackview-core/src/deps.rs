#![forbid(unsafe_code)]

//! Dependency lists and the comparator that decides whether cached work may
//! be reused.
//!
//! A [`Deps`] is the ordered list of values a call site hands in on every
//! render. Two lists are "unchanged" only if both are present, have the same
//! length, and every slot satisfies [`Dep::same_value`].
//!
//! # Invariants
//!
//! 1. `deps_equal(None, _)` and `deps_equal(_, None)` are always `false`.
//! 2. Lists of different length are never equal.
//! 3. `same_value` is reflexive for every slot, including NaN.
//! 4. `+0.0` and `-0.0` are different values.
//! 5. `Dep::Ref` slots compare by allocation identity, never by content.
//! 6. Numbers compare by value across kinds: `1` equals `1.0`, and `0`
//!    equals `+0.0` but not `-0.0`.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// One slot of a dependency list.
#[derive(Clone)]
pub enum Dep {
    /// The unit value.
    Unit,
    /// A boolean.
    Bool(bool),
    /// Any integer, widened so that `1u8` and `1i64` name the same value.
    Int(i128),
    /// A float, compared with same-value semantics.
    Float(f64),
    /// A character.
    Char(char),
    /// A shared string, compared by content.
    Str(Rc<str>),
    /// An opaque shared object, compared by identity.
    Ref(Rc<dyn Any>),
}

impl Dep {
    /// Wrap a shared object so it is compared by identity.
    #[must_use]
    pub fn object<T: Any>(value: Rc<T>) -> Self {
        Self::Ref(value)
    }

    /// Same-value equality.
    ///
    /// Distinguishes `+0.0` from `-0.0` and treats every NaN as equal to
    /// every other NaN. An integer equals a float that is exactly the same
    /// number; otherwise slots of different kinds never match.
    #[must_use]
    pub fn same_value(&self, other: &Dep) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => same_value_f64(*a, *b),
            (Self::Int(i), Self::Float(f)) | (Self::Float(f), Self::Int(i)) => {
                int_is_float(*i, *f)
            }
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn same_value_f64(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

// -2^127 and 2^127, both exact as f64.
const I128_LOW: f64 = i128::MIN as f64;
const I128_HIGH: f64 = -I128_LOW;

fn int_is_float(i: i128, f: f64) -> bool {
    if !f.is_finite() || f.fract() != 0.0 || (f == 0.0 && f.is_sign_negative()) {
        return false;
    }
    (I128_LOW..I128_HIGH).contains(&f) && f as i128 == i
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("()"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Char(v) => write!(f, "{v:?}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Ref(v) => write!(f, "Ref({:p})", Rc::as_ptr(v)),
        }
    }
}

impl From<()> for Dep {
    fn from((): ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! int_dep {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Dep {
                fn from(value: $ty) -> Self {
                    Self::Int(i128::from(value))
                }
            }
        )*
    };
}

int_dep!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

/// Values above `i128::MAX` become the nearest [`Dep::Float`].
impl From<u128> for Dep {
    fn from(value: u128) -> Self {
        match i128::try_from(value) {
            Ok(value) => Self::Int(value),
            Err(_) => Self::Float(value as f64),
        }
    }
}

impl From<isize> for Dep {
    fn from(value: isize) -> Self {
        Self::Int(value as i128)
    }
}

impl From<usize> for Dep {
    fn from(value: usize) -> Self {
        Self::Int(value as i128)
    }
}

impl From<f32> for Dep {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Dep {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<char> for Dep {
    fn from(value: char) -> Self {
        Self::Char(value)
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<String> for Dep {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for Dep {
    fn from(value: Rc<str>) -> Self {
        Self::Str(value)
    }
}

/// An ordered, immutable dependency list.
///
/// Cloning shares the underlying slots, so a cache can hold the list the
/// caller supplied without copying it.
#[derive(Clone)]
pub struct Deps(Rc<[Dep]>);

impl Deps {
    /// The empty list: "run once, never changes".
    #[must_use]
    pub fn empty() -> Self {
        Self(Rc::from(Vec::new()))
    }

    /// Build a list from slots.
    #[must_use]
    pub fn new(slots: impl IntoIterator<Item = Dep>) -> Self {
        slots.into_iter().collect()
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Slot at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Dep> {
        self.0.get(index)
    }

    /// Iterate slots in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Dep> {
        self.0.iter()
    }

    /// Whether both handles share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Deps) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Deps {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Dep> for Deps {
    fn from_iter<I: IntoIterator<Item = Dep>>(iter: I) -> Self {
        Self(iter.into_iter().collect::<Vec<_>>().into())
    }
}

impl From<Vec<Dep>> for Deps {
    fn from(slots: Vec<Dep>) -> Self {
        Self(slots.into())
    }
}

impl fmt::Debug for Deps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Build a [`Deps`] from expressions convertible into [`Dep`].
///
/// ```
/// use trackview_core::{deps, deps_equal};
///
/// let a = deps![1, "user", 0.5];
/// let b = deps![1, "user", 0.5];
/// assert!(deps_equal(Some(&a), Some(&b)));
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        $crate::Deps::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Deps::from(vec![$($crate::Dep::from($value)),+])
    };
}

/// Decide whether a previously computed result may be reused.
///
/// Returns `false` when either list is absent (no dependency tracking was
/// requested), when lengths differ, or on the first slot that is not the
/// same value. O(n) in the list length.
#[must_use]
pub fn deps_equal(next: Option<&Deps>, prev: Option<&Deps>) -> bool {
    let (Some(next), Some(prev)) = (next, prev) else {
        return false;
    };
    if next.len() != prev.len() {
        return false;
    }
    next.iter().zip(prev.iter()).all(|(a, b)| a.same_value(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_lists_never_match() {
        let list = deps![1];
        assert!(!deps_equal(None, None));
        assert!(!deps_equal(Some(&list), None));
        assert!(!deps_equal(None, Some(&list)));
    }

    #[test]
    fn empty_lists_match() {
        assert!(deps_equal(Some(&deps![]), Some(&Deps::empty())));
    }

    #[test]
    fn length_mismatch_is_a_change() {
        assert!(!deps_equal(Some(&deps![1, 2]), Some(&deps![1])));
    }

    #[test]
    fn nan_equals_nan() {
        assert!(Dep::from(f64::NAN).same_value(&Dep::from(f64::NAN)));
        assert!(deps_equal(Some(&deps![f64::NAN]), Some(&deps![f64::NAN])));
    }

    #[test]
    fn signed_zeros_differ() {
        assert!(!Dep::from(0.0).same_value(&Dep::from(-0.0)));
        assert!(Dep::from(-0.0).same_value(&Dep::from(-0.0)));
    }

    #[test]
    fn integers_widen_across_types() {
        assert!(Dep::from(7u8).same_value(&Dep::from(7i64)));
        assert!(Dep::from(usize::MAX).same_value(&Dep::from(usize::MAX as u64)));
    }

    #[test]
    fn integers_equal_floats_of_the_same_number() {
        assert!(deps_equal(Some(&deps![1]), Some(&deps![1.0])));
        assert!(Dep::from(1.0f32).same_value(&Dep::from(1u8)));
        assert!(Dep::from(0).same_value(&Dep::from(0.0)));
        assert!(!Dep::from(0).same_value(&Dep::from(-0.0)));
        assert!(!Dep::from(1).same_value(&Dep::from(1.5)));
        assert!(!Dep::from(0).same_value(&Dep::from(f64::NAN)));
        assert!(!Dep::from(i128::MAX).same_value(&Dep::from(f64::INFINITY)));
        // 2^60 + 1 rounds to 2^60 as a float.
        let big = 1i64 << 60;
        assert!(Dep::from(big).same_value(&Dep::from(big as f64)));
        assert!(!Dep::from(big + 1).same_value(&Dep::from(big as f64)));
    }

    #[test]
    fn u128_beyond_i128_becomes_a_float() {
        assert!(Dep::from(5u128).same_value(&Dep::from(5i32)));
        let top = Dep::from(u128::MAX);
        assert!(matches!(top, Dep::Float(_)));
        assert!(top.same_value(&Dep::from(u128::MAX as f64)));
        assert!(!top.same_value(&Dep::from(i128::MAX)));
    }

    #[test]
    fn kinds_never_cross() {
        assert!(!Dep::from("1").same_value(&Dep::from('1')));
        assert!(!Dep::Unit.same_value(&Dep::from(false)));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Rc::new(vec![1, 2, 3]);
        let b = Rc::new(vec![1, 2, 3]);
        assert!(Dep::object(Rc::clone(&a)).same_value(&Dep::object(Rc::clone(&a))));
        assert!(!Dep::object(a).same_value(&Dep::object(b)));
    }

    #[test]
    fn first_mismatch_decides() {
        assert!(!deps_equal(
            Some(&deps![1, "a", true]),
            Some(&deps![1, "b", true])
        ));
    }

    #[test]
    fn clones_share_storage() {
        let list = deps![1, 2];
        let copy = list.clone();
        assert!(list.ptr_eq(&copy));
        assert!(!list.ptr_eq(&deps![1, 2]));
    }

    #[test]
    fn debug_format_lists_slots() {
        let dbg = format!("{:?}", deps![1, "x", 0.5]);
        assert_eq!(dbg, "[1, \"x\", 0.5]");
    }
}
