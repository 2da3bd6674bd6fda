/// Decides which of two elements must be processed first.
///
/// `compare(a, b)` returns true iff `a` must be processed no later than `b`
/// and strictly ahead of it. When both `compare(a, b)` and `compare(b, a)`
/// are false the two elements have equal priority.
pub trait Comparator<T> {
    fn compare(&self, a: &T, b: &T) -> bool;
}

impl<T, F> Comparator<T> for F
where
    F: Fn(&T, &T) -> bool,
{
    fn compare(&self, a: &T, b: &T) -> bool {
        self(a, b)
    }
}

/// Plain `a < b` ordering. Smallest value comes out first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NaturalOrder;

impl<T: PartialOrd> Comparator<T> for NaturalOrder {
    fn compare(&self, a: &T, b: &T) -> bool {
        a < b
    }
}
