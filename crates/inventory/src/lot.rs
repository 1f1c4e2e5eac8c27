//! Inventory lots and FIFO drawdown.

use core::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, LotId, MovementId, ProductId};

/// A received quantity of one product.
///
/// Every positive movement opens a lot; negative movements draw lots down.
/// Exhausted lots are kept with `remaining == 0` so their history stays
/// traceable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLot {
    pub id: LotId,
    pub product_id: ProductId,
    pub source_movement: MovementId,
    pub quantity_received: i64,
    pub remaining: i64,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl InventoryLot {
    pub fn open(
        product_id: ProductId,
        source_movement: MovementId,
        quantity: i64,
        acquired_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("lot quantity must be positive"));
        }
        Ok(Self {
            id: LotId::new(),
            product_id,
            source_movement,
            quantity_received: quantity,
            remaining: quantity,
            acquired_at,
            expires_at,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|e| e <= at)
    }
}

impl Entity for InventoryLot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Drawdown order: earliest expiry first, lots without expiry last, then
/// oldest acquisition, then id.
pub fn fifo_order(a: &InventoryLot, b: &InventoryLot) -> Ordering {
    let expiry = match (a.expires_at, b.expires_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    expiry
        .then_with(|| a.acquired_at.cmp(&b.acquired_at))
        .then_with(|| a.id.as_uuid().cmp(b.id.as_uuid()))
}

/// One step of a drawdown plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub take: i64,
    pub remaining_after: i64,
}

/// Plan taking `amount` units out of `lots` in FIFO order.
///
/// Pure: the caller applies the plan. Fails without a partial plan when the
/// open lots hold less than `amount`.
pub fn plan_drawdown(lots: &[InventoryLot], amount: i64) -> DomainResult<Vec<LotDraw>> {
    if amount <= 0 {
        return Err(DomainError::validation("drawdown amount must be positive"));
    }

    let mut open: Vec<&InventoryLot> = lots.iter().filter(|l| l.remaining > 0).collect();
    let available: i64 = open.iter().map(|l| l.remaining).sum();
    if available < amount {
        let product = lots
            .first()
            .map(|l| l.product_id.to_string())
            .unwrap_or_else(|| "product".to_string());
        return Err(DomainError::insufficient_stock(product, amount, available));
    }

    open.sort_by(|a, b| fifo_order(a, b));

    let mut left = amount;
    let mut plan = Vec::new();
    for lot in open {
        if left == 0 {
            break;
        }
        let take = left.min(lot.remaining);
        left -= take;
        plan.push(LotDraw {
            lot_id: lot.id,
            take,
            remaining_after: lot.remaining - take,
        });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap()
    }

    fn lot(product: ProductId, qty: i64, acquired: u32, expires: Option<u32>) -> InventoryLot {
        InventoryLot::open(product, MovementId::new(), qty, day(acquired), expires.map(day)).unwrap()
    }

    #[test]
    fn draws_earliest_expiry_first_then_oldest() {
        let p = ProductId::new();
        let no_expiry_old = lot(p, 10, 1, None);
        let late_expiry = lot(p, 10, 2, Some(20));
        let early_expiry = lot(p, 10, 3, Some(10));
        let lots = vec![no_expiry_old.clone(), late_expiry.clone(), early_expiry.clone()];

        let plan = plan_drawdown(&lots, 25).unwrap();

        assert_eq!(
            plan,
            vec![
                LotDraw { lot_id: early_expiry.id, take: 10, remaining_after: 0 },
                LotDraw { lot_id: late_expiry.id, take: 10, remaining_after: 0 },
                LotDraw { lot_id: no_expiry_old.id, take: 5, remaining_after: 5 },
            ]
        );
    }

    #[test]
    fn skips_exhausted_lots() {
        let p = ProductId::new();
        let mut empty = lot(p, 4, 1, None);
        empty.remaining = 0;
        let full = lot(p, 4, 2, None);

        let plan = plan_drawdown(&[empty, full.clone()], 3).unwrap();
        assert_eq!(plan, vec![LotDraw { lot_id: full.id, take: 3, remaining_after: 1 }]);
    }

    #[test]
    fn refuses_more_than_available() {
        let p = ProductId::new();
        let err = plan_drawdown(&[lot(p, 3, 1, None)], 5).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { requested: 5, on_hand: 3, .. }));
    }

    #[test]
    fn open_rejects_non_positive_quantity() {
        let err = InventoryLot::open(ProductId::new(), MovementId::new(), 0, day(1), None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn expiry_is_inclusive() {
        let l = lot(ProductId::new(), 1, 1, Some(5));
        assert!(!l.is_expired(day(5) - Duration::seconds(1)));
        assert!(l.is_expired(day(5)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 300,
                ..ProptestConfig::default()
            })]

            /// Property: a successful plan takes exactly the amount and never overdraws a lot.
            #[test]
            fn plan_takes_exact_amount(
                sizes in prop::collection::vec(1i64..50, 1..20),
                amount in 1i64..500,
            ) {
                let p = ProductId::new();
                let lots: Vec<_> = sizes
                    .iter()
                    .enumerate()
                    .map(|(i, q)| lot(p, *q, 1 + (i as u32 % 27), None))
                    .collect();
                let total: i64 = sizes.iter().sum();

                match plan_drawdown(&lots, amount) {
                    Ok(plan) => {
                        prop_assert!(amount <= total);
                        prop_assert_eq!(plan.iter().map(|d| d.take).sum::<i64>(), amount);
                        for draw in &plan {
                            prop_assert!(draw.take > 0);
                            prop_assert!(draw.remaining_after >= 0);
                        }
                    }
                    Err(_) => prop_assert!(amount > total),
                }
            }
        }
    }
}
