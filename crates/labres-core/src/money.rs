//! # Money
//!
//! Fixed-point amounts (cents) and currency conversion for foundry asset
//! purchases. All amounts are in the currency of the record unless noted;
//! "base" amounts are in CNY.

use crate::worktime::WorkHours;
use crate::{LabError, RecordId, Result, fixed};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const RATE_SCALE: u32 = 5;

/// An amount in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Price per hour times a duration, rounded half up to the cent.
    #[must_use]
    pub fn for_hours(self, hours: WorkHours) -> Self {
        let raw = i128::from(self.0) * i128::from(hours.centihours());
        Self(fixed::div_round(raw, 100) as i64)
    }

    /// Unit price times a quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fixed::format(self.0, 2))
    }
}

impl FromStr for Money {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        fixed::parse(s, 2)
            .map(Self)
            .ok_or_else(|| LabError::InvalidAmount(s.to_string()))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Units of a foreign currency per one CNY, with five decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeRate(i64);

impl ExchangeRate {
    /// Build from a value scaled by 10^5. Must be positive.
    pub fn from_scaled(scaled: i64) -> Result<Self> {
        if scaled <= 0 {
            return Err(LabError::InvalidAmount(fixed::format(scaled, RATE_SCALE)));
        }
        Ok(Self(scaled))
    }

    #[must_use]
    pub const fn scaled(self) -> i64 {
        self.0
    }

    /// Convert an amount in this currency into CNY.
    #[must_use]
    pub fn to_base(self, amount: Money) -> Money {
        let raw = i128::from(amount.cents()) * i128::from(fixed::unit(RATE_SCALE));
        Money::from_cents(fixed::div_round(raw, i128::from(self.0)) as i64)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fixed::format(self.0, RATE_SCALE))
    }
}

impl FromStr for ExchangeRate {
    type Err = LabError;

    fn from_str(s: &str) -> Result<Self> {
        let scaled =
            fixed::parse(s, RATE_SCALE).ok_or_else(|| LabError::InvalidAmount(s.to_string()))?;
        Self::from_scaled(scaled)
    }
}

impl Serialize for ExchangeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExchangeRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A currency used by foundry purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: RecordId,
    pub name: String,
    /// ISO code, e.g. `USD`.
    pub short_name: String,
    pub exchange_rate: Option<ExchangeRate>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Amount due for a foundry purchase: `(total, base_total)`.
///
/// `base_total` is `None` when the currency has no rate yet.
#[must_use]
pub fn foundry_total(
    number: u32,
    unit_price: Money,
    rate: Option<ExchangeRate>,
) -> (Money, Option<Money>) {
    let total = unit_price.times(number);
    (total, rate.map(|r| r.to_base(total)))
}

/// Apply a fetched rate table keyed by currency short name.
///
/// Currencies missing from the table keep their old rate. Returns the
/// number of currencies whose rate was written.
pub fn refresh_rates(
    currencies: &mut [Currency],
    rates: &BTreeMap<String, ExchangeRate>,
    now: NaiveDateTime,
) -> usize {
    let mut count = 0;
    for currency in currencies.iter_mut() {
        if let Some(rate) = rates.get(&currency.short_name) {
            currency.exchange_rate = Some(*rate);
            currency.updated_at = Some(now);
            count += 1;
        }
    }
    count
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn hourly_billing_rounds_to_cents() {
        let price: Money = "12.50".parse().unwrap();
        let hours = WorkHours::from_centihours(333); // 3.33h
        assert_eq!(price.for_hours(hours).to_string(), "41.63");
    }

    #[test]
    fn converts_foreign_totals_to_base() {
        let usd: ExchangeRate = "0.13850".parse().unwrap();
        let (total, base) = foundry_total(3, "1000.00".parse().unwrap(), Some(usd));
        assert_eq!(total.to_string(), "3000.00");
        assert_eq!(base.unwrap().to_string(), "21660.65");
    }

    #[test]
    fn missing_rate_leaves_base_empty() {
        let (total, base) = foundry_total(2, Money::from_cents(150), None);
        assert_eq!(total, Money::from_cents(300));
        assert!(base.is_none());
    }

    #[test]
    fn rejects_non_positive_rates() {
        assert!("0".parse::<ExchangeRate>().is_err());
        assert!("-1.2".parse::<ExchangeRate>().is_err());
    }

    #[test]
    fn refresh_updates_only_known_codes() {
        let now = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let mut currencies = vec![
            Currency {
                id: RecordId(1),
                name: "US Dollar".into(),
                short_name: "USD".into(),
                exchange_rate: None,
                updated_at: None,
            },
            Currency {
                id: RecordId(2),
                name: "Yen".into(),
                short_name: "JPY".into(),
                exchange_rate: None,
                updated_at: None,
            },
        ];
        let mut rates = BTreeMap::new();
        rates.insert("USD".to_string(), "0.13850".parse().unwrap());

        assert_eq!(refresh_rates(&mut currencies, &rates, now), 1);
        assert_eq!(currencies[0].updated_at, Some(now));
        assert!(currencies[1].exchange_rate.is_none());
    }
}
