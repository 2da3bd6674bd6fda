pub mod comparator;
pub mod heap;

pub use comparator::{Comparator, NaturalOrder};
pub use heap::MinHeap;
