use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const RIAL_CURRENCY_CODE: &str = "IRR";
pub const RIAL_CURRENCY_CODE_LOWER: &str = "irr";

//--------------------------------------       Rial        -----------------------------------------------------------
/// Monetary amounts in Iranian Rial. Fixed point, stored as whole rials. Prices never touch floating point on their
/// way through the system.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Rial(i64);

op!(binary Rial, Add, add);
op!(binary Rial, Sub, sub);
op!(inplace Rial, SubAssign, sub_assign);
op!(unary Rial, Neg, neg);

impl Mul<i64> for Rial {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Rial {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in rial: {0}")]
pub struct RialConversionError(String);

impl From<i64> for Rial {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Rial {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Rial {}

impl TryFrom<u64> for Rial {
    type Error = RialConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(RialConversionError(format!("Value {} is too large to convert to Rial", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Rial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} IRR", self.0)
    }
}

impl Rial {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Prices are quoted to customers in toman (1 toman = 10 rial).
    pub fn from_toman(toman: i64) -> Self {
        Self(toman * 10)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Rial::from(500_000);
        let b = Rial::from(120_000);
        assert_eq!(a + b, Rial::from(620_000));
        assert_eq!(a - b, Rial::from(380_000));
        assert_eq!(b * 3, Rial::from(360_000));
        assert_eq!(-b, Rial::from(-120_000));
    }

    #[test]
    fn sums_over_line_items() {
        let total: Rial = [250_000i64, 250_000, 45_000].into_iter().map(Rial::from).sum();
        assert_eq!(total, Rial::from(545_000));
    }

    #[test]
    fn toman_conversion() {
        assert_eq!(Rial::from_toman(50_000), Rial::from(500_000));
    }
}
