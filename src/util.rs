//! Miscellaneous utility structs and functions.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An interval on the real number line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: PartialOrd + Copy> Interval<T> {
    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    /// Returns true if the interval has room, i.e. `min < max`.
    pub fn is_open(&self) -> bool {
        self.min < self.max
    }

    /// Clamps `value` into the interval.
    pub fn clamp(&self, value: T) -> T {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

impl<T: std::ops::Sub<T, Output = T> + Copy> Interval<T> {
    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamp() {
        let range = Interval::new(5.0, 30.0);
        assert_eq!(range.clamp(1.0), 5.0);
        assert_eq!(range.clamp(12.0), 12.0);
        assert_eq!(range.clamp(45.0), 30.0);
        assert!(range.is_open());
        assert!(!Interval::new(3.0, 3.0).is_open());
    }
}
