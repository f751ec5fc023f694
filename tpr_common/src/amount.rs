use std::{
    borrow::Cow,
    fmt::Display,
    iter::Sum,
    ops::{Add, Sub},
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
    Decode,
    Encode,
    Sqlite,
    Type,
};
use thiserror::Error;

/// A monetary value, in the display units of whatever currency the order is denominated in.
///
/// The gateway reports balances as decimal strings, so this is a thin wrapper around an exact
/// decimal rather than a fixed-point integer. It is stored as TEXT in the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct AmountConversionError(String);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Amount {
    type Err = AmountConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| AmountConversionError(format!("{s}: {e}")))?;
        Ok(Self(value))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Type<Sqlite> for Amount {
    fn type_info() -> SqliteTypeInfo {
        <&str as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <&str as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for Amount {
    fn encode_by_ref(&self, buf: &mut Vec<SqliteArgumentValue<'q>>) -> IsNull {
        buf.push(SqliteArgumentValue::Text(Cow::Owned(self.0.to_string())));
        IsNull::No
    }
}

impl<'r> Decode<'r, Sqlite> for Amount {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as Decode<Sqlite>>::decode(value)?;
        Ok(s.parse::<Amount>()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        let a = "10.50".parse::<Amount>().unwrap();
        let b = "10.5".parse::<Amount>().unwrap();
        assert_eq!(a, b);
        assert!(a.is_positive());
        assert!(Amount::ZERO.is_zero());
    }

    #[test]
    fn rejects_garbage() {
        assert!("ten".parse::<Amount>().is_err());
        assert!("".parse::<Amount>().is_err());
    }

    #[test]
    fn compares_exactly() {
        let paid = "99.999999999999999999".parse::<Amount>().unwrap();
        let total = "100".parse::<Amount>().unwrap();
        assert!(paid < total);
        assert_eq!(paid + "0.000000000000000001".parse::<Amount>().unwrap(), total);
    }
}
