use crate::{
    entities::{delivery_rate, DeliveryRate, DeliveryRateModel},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;

/// Picks the fee for a destination from the active rates.
///
/// An exact ward match wins over the county-wide rate (no ward); otherwise zero.
/// Names compare case-insensitively and ignore surrounding whitespace.
pub fn resolve_fee(rates: &[DeliveryRateModel], county: &str, ward: Option<&str>) -> Decimal {
    let county = county.trim();
    let ward = ward.map(str::trim).filter(|w| !w.is_empty());
    let in_county = rates
        .iter()
        .filter(|rate| rate.is_active && rate.county.trim().eq_ignore_ascii_case(county));

    let rate_ward = |rate: &&DeliveryRateModel| {
        rate.ward
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string)
    };

    let ward_match = ward.and_then(|ward| {
        in_county
            .clone()
            .find(|rate| rate_ward(rate).is_some_and(|w| w.eq_ignore_ascii_case(ward)))
    });
    ward_match
        .or_else(|| in_county.clone().find(|rate| rate_ward(rate).is_none()))
        .map(|rate| rate.price)
        .unwrap_or(Decimal::ZERO)
}

pub async fn fee_for<C: ConnectionTrait>(
    conn: &C,
    county: &str,
    ward: Option<&str>,
) -> Result<Decimal, ServiceError> {
    if county.trim().is_empty() {
        return Ok(Decimal::ZERO);
    }
    let rates = DeliveryRate::find()
        .filter(delivery_rate::Column::IsActive.eq(true))
        .all(conn)
        .await?;
    Ok(resolve_fee(&rates, county, ward))
}

#[derive(Clone)]
pub struct DeliveryService {
    db: Arc<DatabaseConnection>,
}

impl DeliveryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn fee_for(&self, county: &str, ward: Option<&str>) -> Result<Decimal, ServiceError> {
        fee_for(&*self.db, county, ward).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn rate(county: &str, ward: Option<&str>, price: Decimal, is_active: bool) -> DeliveryRateModel {
        DeliveryRateModel {
            id: Uuid::new_v4(),
            county: county.into(),
            ward: ward.map(Into::into),
            price,
            is_active,
        }
    }

    fn rates() -> Vec<DeliveryRateModel> {
        vec![
            rate("Nairobi", None, dec!(300), true),
            rate("Nairobi", Some("Westlands"), dec!(200), true),
            rate("Nairobi", Some("Karen"), dec!(450), false),
            rate("Mombasa", Some("Nyali"), dec!(600), true),
        ]
    }

    #[test]
    fn ward_rate_wins_over_county_rate() {
        assert_eq!(resolve_fee(&rates(), "nairobi", Some(" westlands ")), dec!(200));
    }

    #[test]
    fn unknown_or_inactive_ward_falls_back_to_county() {
        assert_eq!(resolve_fee(&rates(), "Nairobi", Some("Kilimani")), dec!(300));
        assert_eq!(resolve_fee(&rates(), "Nairobi", Some("Karen")), dec!(300));
        assert_eq!(resolve_fee(&rates(), "Nairobi", None), dec!(300));
    }

    #[test]
    fn no_matching_rate_is_free() {
        assert_eq!(resolve_fee(&rates(), "Kisumu", None), Decimal::ZERO);
        // Mombasa has no county-wide rate
        assert_eq!(resolve_fee(&rates(), "Mombasa", Some("Likoni")), Decimal::ZERO);
    }
}
