use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ProductId, ValueObject};

/// What a product is used for.
///
/// Raw materials are received and consumed by production; finished goods are
/// produced by batches and sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RawMaterial,
    FinishedGood,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::RawMaterial => "raw_material",
            Category::FinishedGood => "finished_good",
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw_material" => Ok(Category::RawMaterial),
            "finished_good" => Ok(Category::FinishedGood),
            other => Err(DomainError::validation(format!("unknown category '{other}'"))),
        }
    }
}

/// Reorder threshold and the quantity to order once it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderPolicy {
    threshold: i64,
    reorder_quantity: i64,
}

impl ValueObject for ReorderPolicy {}

impl ReorderPolicy {
    pub fn new(threshold: i64, reorder_quantity: i64) -> DomainResult<Self> {
        if threshold < 0 {
            return Err(DomainError::validation("reorder threshold cannot be negative"));
        }
        if reorder_quantity < 0 {
            return Err(DomainError::validation("reorder quantity cannot be negative"));
        }
        Ok(Self {
            threshold,
            reorder_quantity,
        })
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn reorder_quantity(&self) -> i64 {
        self.reorder_quantity
    }

    /// Low stock means at or below the threshold.
    pub fn is_low(&self, on_hand: i64) -> bool {
        on_hand <= self.threshold
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub category: Category,
    pub reorder_threshold: i64,
    pub reorder_quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub cost_per_unit: Option<i64>,
    pub supplier: Option<String>,
}

impl NewProduct {
    /// A raw material with no reorder threshold and no cost metadata.
    pub fn raw_material(sku: impl Into<String>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            unit: unit.into(),
            category: Category::RawMaterial,
            reorder_threshold: 0,
            reorder_quantity: 0,
            cost_per_unit: None,
            supplier: None,
        }
    }

    pub fn finished_good(sku: impl Into<String>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            category: Category::FinishedGood,
            ..Self::raw_material(sku, name, unit)
        }
    }

    pub fn with_reorder(mut self, threshold: i64, reorder_quantity: i64) -> Self {
        self.reorder_threshold = threshold;
        self.reorder_quantity = reorder_quantity;
        self
    }

    pub fn with_cost(mut self, cost_per_unit: i64) -> Self {
        self.cost_per_unit = Some(cost_per_unit);
        self
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("SKU cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        ReorderPolicy::new(self.reorder_threshold, self.reorder_quantity)?;
        if matches!(self.cost_per_unit, Some(c) if c < 0) {
            return Err(DomainError::validation("cost per unit cannot be negative"));
        }
        Ok(())
    }
}

/// A stocked product.
///
/// Identity (id and SKU) never changes once created; the reorder policy may.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    unit: String,
    category: Category,
    policy: ReorderPolicy,
    cost_per_unit: Option<i64>,
    supplier: Option<String>,
    created_at: DateTime<Utc>,
}

impl Product {
    /// Validate `spec` and build the product. Text fields are trimmed; a blank
    /// supplier is treated as absent.
    pub fn create(id: ProductId, spec: &NewProduct, created_at: DateTime<Utc>) -> DomainResult<Self> {
        spec.validate()?;
        Ok(Self {
            id,
            sku: spec.sku.trim().to_string(),
            name: spec.name.trim().to_string(),
            unit: spec.unit.trim().to_string(),
            category: spec.category,
            policy: ReorderPolicy::new(spec.reorder_threshold, spec.reorder_quantity)?,
            cost_per_unit: spec.cost_per_unit,
            supplier: spec
                .supplier
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            created_at,
        })
    }

    /// Rebuild a product from persisted columns without re-running creation
    /// validation (the store's CHECK constraints already hold).
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ProductId,
        sku: String,
        name: String,
        unit: String,
        category: Category,
        policy: ReorderPolicy,
        cost_per_unit: Option<i64>,
        supplier: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sku,
            name,
            unit,
            category,
            policy,
            cost_per_unit,
            supplier,
            created_at,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn policy(&self) -> ReorderPolicy {
        self.policy
    }

    pub fn reorder_threshold(&self) -> i64 {
        self.policy.threshold()
    }

    pub fn reorder_quantity(&self) -> i64 {
        self.policy.reorder_quantity()
    }

    pub fn cost_per_unit(&self) -> Option<i64> {
        self.cost_per_unit
    }

    pub fn supplier(&self) -> Option<&str> {
        self.supplier.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_low(&self, on_hand: i64) -> bool {
        self.policy.is_low(on_hand)
    }

    pub fn update_reorder_policy(&mut self, policy: ReorderPolicy) {
        self.policy = policy;
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Criteria for listing products. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<Category>,
    /// Case-insensitive substring of SKU or name.
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            search: None,
        }
    }

    pub fn with_search(mut self, needle: impl Into<String>) -> Self {
        self.search = Some(needle.into());
        self
    }

    /// Search term lowered and trimmed, or `None` when blank.
    pub fn normalized_search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = self.category {
            if product.category() != category {
                return false;
            }
        }
        match self.normalized_search() {
            Some(needle) => {
                product.sku().to_lowercase().contains(&needle)
                    || product.name().to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcha() -> NewProduct {
        NewProduct::raw_material("matcha-powder-1kg", "Matcha Powder", "g").with_reorder(5, 20)
    }

    #[test]
    fn create_trims_and_keeps_policy() {
        let spec = NewProduct {
            sku: "  matcha-powder-1kg ".to_string(),
            supplier: Some("  ".to_string()),
            ..matcha()
        };
        let product = Product::create(ProductId::new(), &spec, Utc::now()).unwrap();

        assert_eq!(product.sku(), "matcha-powder-1kg");
        assert_eq!(product.reorder_threshold(), 5);
        assert_eq!(product.reorder_quantity(), 20);
        assert_eq!(product.supplier(), None);
        assert_eq!(product.category(), Category::RawMaterial);
    }

    #[test]
    fn create_rejects_blank_fields() {
        for spec in [
            NewProduct { sku: " ".into(), ..matcha() },
            NewProduct { name: "".into(), ..matcha() },
            NewProduct { unit: "\t".into(), ..matcha() },
        ] {
            let err = Product::create(ProductId::new(), &spec, Utc::now()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{spec:?}");
        }
    }

    #[test]
    fn create_rejects_negative_policy_and_cost() {
        let spec = matcha().with_reorder(-1, 0);
        assert!(matches!(spec.validate(), Err(DomainError::Validation(_))));

        let spec = matcha().with_reorder(0, -3);
        assert!(matches!(spec.validate(), Err(DomainError::Validation(_))));

        let spec = matcha().with_cost(-1);
        assert!(matches!(spec.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn low_stock_is_at_or_below_threshold() {
        let policy = ReorderPolicy::new(5, 20).unwrap();
        assert!(policy.is_low(5));
        assert!(policy.is_low(0));
        assert!(!policy.is_low(6));
    }

    #[test]
    fn category_round_trips_through_text() {
        assert_eq!("finished_good".parse::<Category>().unwrap(), Category::FinishedGood);
        assert_eq!(Category::RawMaterial.to_string(), "raw_material");
        assert!("widget".parse::<Category>().is_err());
    }

    #[test]
    fn filter_matches_category_and_search() {
        let product = Product::create(ProductId::new(), &matcha(), Utc::now()).unwrap();

        assert!(ProductFilter::all().matches(&product));
        assert!(ProductFilter::category(Category::RawMaterial).matches(&product));
        assert!(!ProductFilter::category(Category::FinishedGood).matches(&product));
        assert!(ProductFilter::all().with_search("POWDER").matches(&product));
        assert!(ProductFilter::all().with_search("1kg").matches(&product));
        assert!(!ProductFilter::all().with_search("hojicha").matches(&product));
        assert!(ProductFilter::all().with_search("  ").matches(&product));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: a policy is low exactly when on-hand does not exceed the threshold.
            #[test]
            fn is_low_matches_threshold(threshold in 0i64..10_000, on_hand in 0i64..20_000) {
                let policy = ReorderPolicy::new(threshold, 0).unwrap();
                prop_assert_eq!(policy.is_low(on_hand), on_hand <= threshold);
            }

            /// Property: valid specs always create, and the stored SKU is trimmed.
            #[test]
            fn valid_specs_create(
                sku in "[a-z0-9-]{1,20}",
                name in "[A-Za-z][A-Za-z0-9 ]{0,40}",
                threshold in 0i64..1_000,
            ) {
                let spec = NewProduct::finished_good(format!(" {sku} "), name, "unit")
                    .with_reorder(threshold, threshold * 2);
                let product = Product::create(ProductId::new(), &spec, Utc::now()).unwrap();
                prop_assert_eq!(product.sku(), sku.as_str());
                prop_assert_eq!(product.reorder_threshold(), threshold);
            }
        }
    }
}
