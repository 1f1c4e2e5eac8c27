use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateRoot, DomainError, MovementId, ProductId};
use stockroom_events::Event;
use stockroom_products::{Product, ReorderPolicy};

use crate::alert::{AlertRaised, crosses_into_low};
use crate::movement::MovementKind;

/// Aggregate root: the on-hand quantity of one product.
///
/// The store keeps this as a materialized counter next to the append-only
/// movement log; `version` is bumped once per applied movement and is what the
/// counter update is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    product_id: ProductId,
    sku: String,
    on_hand: i64,
    policy: ReorderPolicy,
    version: u64,
}

impl StockLevel {
    /// Zero stock for a freshly created product.
    pub fn for_product(product: &Product) -> Self {
        Self::rehydrate(product.id_typed(), product.sku(), 0, product.policy(), 0)
    }

    /// Rebuild from the persisted counter row.
    pub fn rehydrate(
        product_id: ProductId,
        sku: impl Into<String>,
        on_hand: i64,
        policy: ReorderPolicy,
        version: u64,
    ) -> Self {
        Self {
            product_id,
            sku: sku.into(),
            on_hand,
            policy,
            version,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn policy(&self) -> ReorderPolicy {
        self.policy
    }

    pub fn is_low(&self) -> bool {
        self.policy.is_low(self.on_hand)
    }
}

impl AggregateRoot for StockLevel {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
    /// Set for compensating movements; those skip the kind's sign rule.
    pub reverses: Option<MovementId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Record(RecordMovement),
}

/// Event: MovementApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementApplied {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub delta: i64,
    pub on_hand_after: i64,
    pub reverses: Option<MovementId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    MovementApplied(MovementApplied),
    AlertRaised(AlertRaised),
}

impl StockEvent {
    pub fn as_alert(&self) -> Option<&AlertRaised> {
        match self {
            StockEvent::AlertRaised(alert) => Some(alert),
            StockEvent::MovementApplied(_) => None,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::MovementApplied(_) => "inventory.stock.movement_applied",
            StockEvent::AlertRaised(e) => e.event_type(),
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::MovementApplied(e) => e.occurred_at,
            StockEvent::AlertRaised(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockLevel {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::MovementApplied(e) => {
                self.on_hand = e.on_hand_after;
                self.version += 1;
            }
            // Alerts are derived from the movement; nothing to fold.
            StockEvent::AlertRaised(_) => {}
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::Record(cmd) => self.handle_record(cmd),
        }
    }
}

impl StockLevel {
    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<StockEvent>, DomainError> {
        if cmd.product_id != self.product_id {
            return Err(DomainError::validation("product_id mismatch"));
        }

        if cmd.reverses.is_none() {
            cmd.kind.check_delta(cmd.delta)?;
        } else if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let on_hand_after = self
            .on_hand
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("quantity out of range"))?;
        if on_hand_after < 0 {
            let requested = cmd
                .delta
                .checked_neg()
                .ok_or_else(|| DomainError::validation("quantity out of range"))?;
            return Err(DomainError::insufficient_stock(
                self.sku.clone(),
                requested,
                self.on_hand,
            ));
        }

        let mut events = vec![StockEvent::MovementApplied(MovementApplied {
            movement_id: cmd.movement_id,
            product_id: cmd.product_id,
            kind: cmd.kind,
            delta: cmd.delta,
            on_hand_after,
            reverses: cmd.reverses,
            occurred_at: cmd.occurred_at,
        })];

        if crosses_into_low(self.on_hand, on_hand_after, self.policy.threshold()) {
            events.push(StockEvent::AlertRaised(AlertRaised {
                product_id: self.product_id,
                sku: self.sku.clone(),
                on_hand: on_hand_after,
                threshold: self.policy.threshold(),
                reorder_quantity: self.policy.reorder_quantity(),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcha() -> StockLevel {
        StockLevel::rehydrate(
            ProductId::new(),
            "matcha-powder-1kg",
            0,
            ReorderPolicy::new(5, 20).unwrap(),
            0,
        )
    }

    fn record(level: &StockLevel, kind: MovementKind, delta: i64) -> StockCommand {
        StockCommand::Record(RecordMovement {
            movement_id: MovementId::new(),
            product_id: level.product_id(),
            kind,
            delta,
            occurred_at: Utc::now(),
            reverses: None,
        })
    }

    fn run(level: &mut StockLevel, kind: MovementKind, delta: i64) -> Result<Vec<StockEvent>, DomainError> {
        let cmd = record(level, kind, delta);
        execute(level, cmd)
    }

    fn execute(level: &mut StockLevel, cmd: StockCommand) -> Result<Vec<StockEvent>, DomainError> {
        let events = level.handle(&cmd)?;
        for e in &events {
            level.apply(e);
        }
        Ok(events)
    }

    #[test]
    fn matcha_scenario_alerts_once_and_refuses_oversell() {
        let mut level = matcha();

        let events = run(&mut level, MovementKind::Receipt, 20).unwrap();
        assert_eq!(level.on_hand(), 20);
        assert_eq!(events.len(), 1);

        let events = run(&mut level, MovementKind::Sale, -17).unwrap();
        assert_eq!(level.on_hand(), 3);
        let alert = events.iter().find_map(StockEvent::as_alert).unwrap();
        assert_eq!(alert.on_hand, 3);
        assert_eq!(alert.threshold, 5);
        assert_eq!(alert.reorder_quantity, 20);
        assert!(level.is_low());

        let err = run(&mut level, MovementKind::Sale, -5).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product: "matcha-powder-1kg".to_string(),
                requested: 5,
                on_hand: 3,
            }
        );
        assert_eq!(level.on_hand(), 3);
        assert_eq!(level.version(), 2);
    }

    #[test]
    fn already_low_does_not_alert_again() {
        let mut level = matcha();
        run(&mut level, MovementKind::Receipt, 4).unwrap();
        let events = run(&mut level, MovementKind::Sale, -1).unwrap();
        assert!(events.iter().all(|e| e.as_alert().is_none()));
    }

    #[test]
    fn sign_rule_is_enforced_for_originals() {
        let level = matcha();
        let err = level.handle(&record(&level, MovementKind::Receipt, -3)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = level.handle(&record(&level, MovementKind::Adjustment, 0)).unwrap_err();
        assert_eq!(err, DomainError::validation("delta cannot be zero"));
    }

    #[test]
    fn most_negative_adjustment_is_rejected_without_panicking() {
        let mut level = matcha();
        run(&mut level, MovementKind::Receipt, 3).unwrap();

        let err = run(&mut level, MovementKind::Adjustment, i64::MIN).unwrap_err();
        assert_eq!(err, DomainError::validation("quantity out of range"));
        assert_eq!(level.on_hand(), 3);

        let mut empty = matcha();
        let err = run(&mut empty, MovementKind::Sale, i64::MIN).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn compensation_skips_sign_rule_but_not_stock_rule() {
        let mut level = matcha();
        run(&mut level, MovementKind::Receipt, 10).unwrap();

        let reversal = StockCommand::Record(RecordMovement {
            movement_id: MovementId::new(),
            product_id: level.product_id(),
            kind: MovementKind::Receipt,
            delta: -10,
            occurred_at: Utc::now(),
            reverses: Some(MovementId::new()),
        });
        execute(&mut level, reversal.clone()).unwrap();
        assert_eq!(level.on_hand(), 0);

        let err = level.handle(&reversal).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
    }

    #[test]
    fn rejects_commands_for_another_product() {
        let level = matcha();
        let other = matcha();
        let err = level.handle(&record(&other, MovementKind::Receipt, 1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_kind() -> impl Strategy<Value = MovementKind> {
            prop::sample::select(MovementKind::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: on-hand equals the sum of accepted deltas and never dips below zero.
            #[test]
            fn on_hand_is_sum_of_accepted_deltas(
                moves in prop::collection::vec((arb_kind(), -50i64..=50), 0..60)
            ) {
                let mut level = matcha();
                let mut accepted = 0i64;

                for (kind, delta) in moves {
                    let before = level.clone();
                    match run(&mut level, kind, delta) {
                        Ok(_) => accepted += delta,
                        Err(_) => prop_assert_eq!(&level, &before),
                    }
                    prop_assert!(level.on_hand() >= 0);
                    prop_assert_eq!(level.on_hand(), accepted);
                }
            }

            /// Property: an alert is raised exactly when the threshold is crossed downward.
            #[test]
            fn alert_iff_crossing(start in 0i64..40, delta in -40i64..40) {
                prop_assume!(delta != 0);
                let level = StockLevel::rehydrate(
                    ProductId::new(),
                    "sku",
                    start,
                    ReorderPolicy::new(5, 10).unwrap(),
                    0,
                );
                if let Ok(events) = level.handle(&record(&level, MovementKind::Adjustment, delta)) {
                    let alerted = events.iter().any(|e| e.as_alert().is_some());
                    prop_assert_eq!(alerted, start > 5 && start + delta <= 5);
                }
            }
        }
    }
}
