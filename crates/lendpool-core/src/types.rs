//! Core types for the lending pool
//!
//! Amounts are integer base units of an asset. Ratios never touch floating
//! point: configured rates are [`Bps`] (1/10_000) and derived ratios such as
//! shares, utilization, LTV and health factor are [`Wad`] (1e18 = 1.0).

use crate::error::{LendingError, Result};
use crate::math;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 1.0 in [`Wad`] fixed point
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// 100% in basis points
pub const BPS_DENOMINATOR: u128 = 10_000;

/// unix seconds
pub type Timestamp = u64;

/// Account address (20 bytes, rendered as 0x-prefixed hex)
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const fn repeat_byte(byte: u8) -> Self {
        Address([byte; 20])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(digits).map_err(|e| LendingError::InvalidAddress(format!("{}: {}", s, e)))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| LendingError::InvalidAddress(format!("{}: expected 20 bytes", s)))?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            <[u8; 20]>::deserialize(deserializer).map(Address)
        }
    }
}

/// Asset identifier (ticker symbol, e.g. "ETH")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(symbol: impl Into<String>) -> Self {
        AssetId(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Amount of an asset in base units
///
/// Serialized as a decimal string in human-readable formats so 18-decimal
/// values survive JSON and TOML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Self = Amount(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn try_add(self, other: Amount) -> Result<Amount> {
        self.checked_add(other).ok_or(LendingError::ArithmeticOverflow)
    }

    pub fn try_sub(self, other: Amount) -> Result<Amount> {
        self.checked_sub(other).ok_or(LendingError::ArithmeticOverflow)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Amount)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            u128::deserialize(deserializer).map(Amount)
        }
    }
}

struct AmountVisitor;

impl<'de> de::Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
        Ok(Amount(v as u128))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Amount, E> {
        Ok(Amount(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Amount, E> {
        u128::try_from(v)
            .map(Amount)
            .map_err(|_| E::custom(format!("negative amount {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
        v.parse().map_err(|e| E::custom(format!("amount {:?}: {}", v, e)))
    }
}

/// Loan identifier, allocated sequentially from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(pub u64);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Basis points (10_000 = 100%)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bps(pub u32);

impl Bps {
    pub const ZERO: Self = Bps(0);
    pub const MAX: Self = Bps(10_000);

    /// floor(amount * bps / 10_000)
    pub fn apply(self, amount: Amount) -> Result<Amount> {
        math::mul_div(amount.0, self.0 as u128, BPS_DENOMINATOR).map(Amount)
    }

    pub fn to_wad(self) -> Wad {
        Wad(self.0 as u128 * (WAD / BPS_DENOMINATOR))
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// 18-decimal fixed point ratio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wad(pub u128);

impl Wad {
    pub const ZERO: Self = Wad(0);
    pub const ONE: Self = Wad(WAD);
    /// stands in for an unbounded ratio (health factor with no debt)
    pub const MAX: Self = Wad(u128::MAX);

    /// floor(numerator / denominator), `MAX` when the denominator is zero
    pub fn from_ratio(numerator: u128, denominator: u128) -> Result<Wad> {
        if denominator == 0 {
            return Ok(Wad::MAX);
        }
        math::mul_div(numerator, WAD, denominator).map(Wad)
    }

    /// floor to basis points
    pub fn to_bps(self) -> Result<u128> {
        math::mul_div(self.0, BPS_DENOMINATOR, WAD)
    }

    /// percentage with two decimals, e.g. "28.57%"
    pub fn percent(self) -> String {
        if self == Wad::MAX {
            return "inf".to_string();
        }
        match self.to_bps() {
            Ok(bps) => format!("{}.{:02}%", bps / 100, bps % 100),
            Err(_) => "inf".to_string(),
        }
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Wad::MAX {
            return f.write_str("inf");
        }
        // four decimals
        let whole = self.0 / WAD;
        let frac = (self.0 % WAD) / (WAD / 10_000);
        write!(f, "{}.{:04}", whole, frac)
    }
}

/// Price of one collateral unit in base-asset units
///
/// Rational so that oracle prices like 1.05 stay exact.
/// Example: Price { numerator: 105, denominator: 100 } means 1 collateral = 1.05 base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price {
    pub numerator: u128,
    pub denominator: u128,
}

impl Price {
    pub fn new(numerator: u128, denominator: u128) -> Result<Self> {
        if denominator == 0 {
            return Err(LendingError::InvalidConfig(
                "price denominator must be non-zero".into(),
            ));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub const fn from_integer(units: u128) -> Self {
        Self {
            numerator: units,
            denominator: 1,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// base-asset value of a collateral amount (floor)
    pub fn value_of(&self, amount: Amount) -> Result<Amount> {
        math::mul_div(amount.0, self.numerator, self.denominator).map(Amount)
    }

    /// collateral amount needed to be worth `value` (ceil)
    pub fn amount_for_value(&self, value: Amount) -> Result<Amount> {
        if self.is_zero() {
            return Err(LendingError::PriceUnavailable("zero price".into()));
        }
        math::mul_div_ceil(value.0, self.denominator, self.numerator).map(Amount)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

/// Accepts "1800", "1800/3" or "1.05"
impl FromStr for Price {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LendingError::InvalidConfig(format!("invalid price {:?}", s));
        let s = s.trim();

        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse::<u128>().map_err(|_| invalid())?;
            let den = den.trim().parse::<u128>().map_err(|_| invalid())?;
            return Price::new(num, den);
        }

        if let Some((whole, frac)) = s.split_once('.') {
            if frac.is_empty() || frac.len() > 18 || !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            let denominator = 10u128.pow(frac.len() as u32);
            let whole = whole.parse::<u128>().map_err(|_| invalid())?;
            let frac = frac.parse::<u128>().map_err(|_| invalid())?;
            let numerator = whole
                .checked_mul(denominator)
                .and_then(|w| w.checked_add(frac))
                .ok_or_else(invalid)?;
            return Price::new(numerator, denominator);
        }

        s.parse::<u128>().map(Price::from_integer).map_err(|_| invalid())
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            (self.numerator, self.denominator).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(PriceVisitor)
        } else {
            let (numerator, denominator) = <(u128, u128)>::deserialize(deserializer)?;
            Price::new(numerator, denominator).map_err(de::Error::custom)
        }
    }
}

struct PriceVisitor;

impl<'de> de::Visitor<'de> for PriceVisitor {
    type Value = Price;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or a price string like \"1.05\" or \"21/20\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Price, E> {
        Ok(Price::from_integer(v as u128))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Price, E> {
        u128::try_from(v)
            .map(Price::from_integer)
            .map_err(|_| E::custom(format!("negative price {}", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Price, E> {
        v.parse().map_err(E::custom)
    }
}

/// A price as reported by an oracle, with the time it was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Price,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip_display() {
        let addr = Address::repeat_byte(0xab);
        let rendered = addr.to_string();
        assert!(rendered.starts_with("0xabab"));
        assert_eq!(rendered.parse::<Address>().unwrap(), addr);
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(LendingError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_price_parsing() {
        assert_eq!("1800".parse::<Price>().unwrap(), Price::from_integer(1800));
        assert_eq!("1.05".parse::<Price>().unwrap(), Price::new(105, 100).unwrap());
        assert_eq!("3/2".parse::<Price>().unwrap(), Price::new(3, 2).unwrap());
        assert!("1/0".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
        assert!("1.".parse::<Price>().is_err());
    }

    #[test]
    fn test_price_value_rounding() {
        let price = Price::new(3, 2).unwrap();
        assert_eq!(price.value_of(Amount(5)).unwrap(), Amount(7));
        // 7 base units need ceil(7 * 2 / 3) = 5 collateral units
        assert_eq!(price.amount_for_value(Amount(7)).unwrap(), Amount(5));
    }

    #[test]
    fn test_bps_and_wad_formatting() {
        assert_eq!(Bps(350).to_string(), "3.50%");
        assert_eq!(Bps(350).apply(Amount(1000)).unwrap(), Amount(35));
        assert_eq!(Wad::from_ratio(4000, 14000).unwrap().percent(), "28.57%");
        assert_eq!(Wad::ONE.to_string(), "1.0000");
        assert_eq!(Wad::from_ratio(1, 0).unwrap(), Wad::MAX);
    }

    #[test]
    fn test_amount_json_accepts_string_and_number() {
        let a: Amount = serde_json::from_str("\"1000000000000000000000\"").unwrap();
        assert_eq!(a, Amount(1_000_000_000_000_000_000_000));
        let b: Amount = serde_json::from_str("42").unwrap();
        assert_eq!(b, Amount(42));
        assert_eq!(serde_json::to_string(&Amount(7)).unwrap(), "\"7\"");
        assert!(serde_json::from_str::<Amount>("-1").is_err());
        let asset: AssetId = serde_json::from_str("\"ETH\"").unwrap();
        assert_eq!(asset.as_str(), "ETH");
    }

    #[test]
    fn test_binary_encoding_is_compact() {
        let addr = Address::repeat_byte(1);
        let bytes = bincode::serialize(&(addr, Amount(5), Price::new(3, 2).unwrap())).unwrap();
        let (a, b, c): (Address, Amount, Price) = bincode::deserialize(&bytes).unwrap();
        assert_eq!(a, addr);
        assert_eq!(b, Amount(5));
        assert_eq!(c, Price::new(3, 2).unwrap());
    }
}
