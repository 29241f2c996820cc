use crate::core::description::{self, Describe, Description};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("Fraction denominator must be greater than 0")]
    ZeroDenominator,
    #[error("Fraction must be between 0 and 1, got: {0}")]
    OutOfUnitInterval(Fraction),
}

/// An exact proportion `numerator / denominator` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFraction")]
pub struct Fraction {
    numerator: u64,
    denominator: u64,
}

// Deserialized fractions go through the same checks as `Fraction::new`
#[derive(Deserialize)]
struct RawFraction {
    numerator: u64,
    denominator: u64,
}

impl TryFrom<RawFraction> for Fraction {
    type Error = Error;

    fn try_from(raw: RawFraction) -> Result<Self, Self::Error> {
        Fraction::new(raw.numerator, raw.denominator)
    }
}

impl Fraction {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, Error> {
        if denominator == 0 {
            return Err(Error::ZeroDenominator);
        }
        let fraction = Self {
            numerator,
            denominator,
        };
        if numerator > denominator {
            return Err(Error::OutOfUnitInterval(fraction));
        }
        Ok(fraction)
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    /// `floor(self * length)`
    pub fn truncate(&self, length: usize) -> usize {
        let scaled = self.numerator as u128 * length as u128;
        (scaled / self.denominator as u128) as usize
    }

    /// `self * length` rounded to the nearest integer, halves rounded up
    pub fn round(&self, length: usize) -> usize {
        let scaled = 2 * self.numerator as u128 * length as u128 + self.denominator as u128;
        (scaled / (2 * self.denominator as u128)) as usize
    }
}

impl Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

// Equal proportions describe identically, so 1/2 and 2/4 share a cache entry
impl Describe for Fraction {
    fn describe(&self) -> Result<Description, description::Error> {
        let divisor = gcd(self.numerator, self.denominator).max(1);
        Ok(serde_json::json!({
            "type": "Fraction",
            "numerator": self.numerator / divisor,
            "denominator": self.denominator / divisor,
        }))
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// A dataset size, either an exact element count or a proportion of the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Size {
    Count(usize),
    Fraction(Fraction),
}

impl From<usize> for Size {
    fn from(count: usize) -> Self {
        Size::Count(count)
    }
}

impl From<Fraction> for Size {
    fn from(fraction: Fraction) -> Self {
        Size::Fraction(fraction)
    }
}

impl Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{}", count),
            Self::Fraction(fraction) => write!(f, "{}", fraction),
        }
    }
}

impl Describe for Size {
    fn describe(&self) -> Result<Description, description::Error> {
        match self {
            Self::Count(count) => count.describe(),
            Self::Fraction(fraction) => fraction.describe(),
        }
    }
}

/// Pick `count` of `total` indices, evenly spaced and as far apart as possible.
///
/// Each selected index sits at the centre of one of `count` equal-width bins
/// over `0..total`, i.e. `floor((2j + 1) * total / (2 * count))`. The result is
/// strictly increasing and never touches the same bin twice.
///
/// Panics if `count > total`.
pub fn evenly_spaced_indices(total: usize, count: usize) -> Vec<usize> {
    assert!(
        count <= total,
        "cannot select {} indices out of {}",
        count,
        total
    );

    let total = total as u128;
    let bins = 2 * count as u128;
    (0..count as u128)
        .map(|j| ((2 * j + 1) * total / bins) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_rejects_values_outside_unit_interval() {
        assert_eq!(Fraction::new(1, 0), Err(Error::ZeroDenominator));
        assert!(matches!(
            Fraction::new(3, 2),
            Err(Error::OutOfUnitInterval(_))
        ));
        assert!(Fraction::new(0, 5).is_ok());
        assert!(Fraction::new(5, 5).is_ok());
    }

    #[test]
    fn deserialized_fractions_are_validated() {
        // Behavior: a size read from config cannot smuggle in an invalid fraction.
        let too_large = serde_json::from_str::<Size>(r#"{"Fraction":{"numerator":3,"denominator":2}}"#);
        assert!(too_large.is_err());

        let undefined = serde_json::from_str::<Fraction>(r#"{"numerator":1,"denominator":0}"#);
        assert!(undefined.is_err());

        let half = serde_json::from_str::<Size>(r#"{"Fraction":{"numerator":1,"denominator":2}}"#).unwrap();
        assert_eq!(half, Size::Fraction(Fraction::new(1, 2).unwrap()));
    }

    #[test]
    fn truncate_and_round_differ_on_fractional_parts() {
        // Behavior: 2/3 of 10 is 6.67 - truncation gives 6, rounding gives 7.
        let two_thirds = Fraction::new(2, 3).unwrap();
        assert_eq!(two_thirds.truncate(10), 6);
        assert_eq!(two_thirds.round(10), 7);

        // Halves round up
        let half = Fraction::new(1, 2).unwrap();
        assert_eq!(half.truncate(5), 2);
        assert_eq!(half.round(5), 3);
    }

    #[test]
    fn equal_fractions_describe_identically() {
        let a = Fraction::new(1, 2).unwrap().describe().unwrap();
        let b = Fraction::new(2, 4).unwrap().describe().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn evenly_spaced_indices_are_centred_in_bins() {
        assert_eq!(evenly_spaced_indices(10, 5), vec![1, 3, 5, 7, 9]);
        assert_eq!(evenly_spaced_indices(10, 2), vec![2, 7]);
        assert_eq!(evenly_spaced_indices(10, 1), vec![5]);
        assert_eq!(evenly_spaced_indices(4, 4), vec![0, 1, 2, 3]);
        assert!(evenly_spaced_indices(10, 0).is_empty());
        assert!(evenly_spaced_indices(0, 0).is_empty());
    }

    #[test]
    fn evenly_spaced_indices_are_strictly_increasing_and_in_range() {
        for total in 0..40 {
            for count in 0..=total {
                let indices = evenly_spaced_indices(total, count);
                assert_eq!(indices.len(), count);
                assert!(indices.windows(2).all(|w| w[0] < w[1]));
                assert!(indices.iter().all(|&i| i < total));
            }
        }
    }
}
