use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ProductId, RecipeId};
use stockroom_products::{Category, Product};

/// One raw material and how much of it goes into a single produced unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub material_id: ProductId,
    pub quantity_per_unit: i64,
}

/// Material needed for a concrete batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: ProductId,
    pub quantity: i64,
}

/// Bill of materials for a finished good. At most one per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    id: RecipeId,
    product_id: ProductId,
    lines: Vec<RecipeLine>,
    notes: Option<String>,
}

impl Recipe {
    /// Validate and build a recipe for `finished` out of `components`.
    ///
    /// The finished product must be a finished good, each component a raw
    /// material listed once with a positive quantity.
    pub fn define(
        id: RecipeId,
        finished: &Product,
        components: &[(Product, i64)],
        notes: Option<String>,
    ) -> DomainResult<Self> {
        if finished.category() != Category::FinishedGood {
            return Err(DomainError::validation(format!(
                "{} is not a finished good",
                finished.sku()
            )));
        }
        if components.is_empty() {
            return Err(DomainError::validation("recipe needs at least one material"));
        }

        let mut seen = HashSet::new();
        let mut lines = Vec::with_capacity(components.len());
        for (material, qty) in components {
            if material.category() != Category::RawMaterial {
                return Err(DomainError::validation(format!(
                    "{} is not a raw material",
                    material.sku()
                )));
            }
            if *qty <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity of {} must be positive",
                    material.sku()
                )));
            }
            if !seen.insert(material.id_typed()) {
                return Err(DomainError::validation(format!(
                    "{} is listed more than once",
                    material.sku()
                )));
            }
            lines.push(RecipeLine {
                material_id: material.id_typed(),
                quantity_per_unit: *qty,
            });
        }

        Ok(Self {
            id,
            product_id: finished.id_typed(),
            lines,
            notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        })
    }

    pub fn restore(id: RecipeId, product_id: ProductId, lines: Vec<RecipeLine>, notes: Option<String>) -> Self {
        Self {
            id,
            product_id,
            lines,
            notes,
        }
    }

    pub fn id_typed(&self) -> RecipeId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn lines(&self) -> &[RecipeLine] {
        &self.lines
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Materials needed to produce `quantity` units.
    pub fn requirements(&self, quantity: i64) -> DomainResult<Vec<MaterialRequirement>> {
        if quantity <= 0 {
            return Err(DomainError::validation("batch quantity must be positive"));
        }
        self.lines
            .iter()
            .map(|line| {
                let needed = line
                    .quantity_per_unit
                    .checked_mul(quantity)
                    .ok_or_else(|| DomainError::validation("material requirement out of range"))?;
                Ok(MaterialRequirement {
                    material_id: line.material_id,
                    quantity: needed,
                })
            })
            .collect()
    }
}

impl Entity for Recipe {
    type Id = RecipeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_products::NewProduct;

    fn product(spec: NewProduct) -> Product {
        Product::create(ProductId::new(), &spec, Utc::now()).unwrap()
    }

    fn latte_kit() -> Product {
        product(NewProduct::finished_good("latte-kit", "Matcha Latte Kit", "box"))
    }

    fn matcha() -> Product {
        product(NewProduct::raw_material("matcha-powder-1kg", "Matcha Powder", "g"))
    }

    fn whisk() -> Product {
        product(NewProduct::raw_material("bamboo-whisk", "Bamboo Whisk", "pcs"))
    }

    #[test]
    fn requirements_scale_with_quantity() {
        let (m, w) = (matcha(), whisk());
        let recipe = Recipe::define(
            RecipeId::new(),
            &latte_kit(),
            &[(m.clone(), 30), (w.clone(), 1)],
            Some("  sift first ".into()),
        )
        .unwrap();

        assert_eq!(recipe.notes(), Some("sift first"));
        assert_eq!(
            recipe.requirements(4).unwrap(),
            vec![
                MaterialRequirement { material_id: m.id_typed(), quantity: 120 },
                MaterialRequirement { material_id: w.id_typed(), quantity: 4 },
            ]
        );
    }

    #[test]
    fn rejects_wrong_categories() {
        let err = Recipe::define(RecipeId::new(), &matcha(), &[(whisk(), 1)], None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Recipe::define(RecipeId::new(), &latte_kit(), &[(latte_kit(), 1)], None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_empty_duplicate_and_non_positive_lines() {
        let m = matcha();
        assert!(Recipe::define(RecipeId::new(), &latte_kit(), &[], None).is_err());
        assert!(Recipe::define(RecipeId::new(), &latte_kit(), &[(m.clone(), 1), (m.clone(), 2)], None).is_err());
        assert!(Recipe::define(RecipeId::new(), &latte_kit(), &[(m, 0)], None).is_err());
    }

    #[test]
    fn requirements_reject_overflow() {
        let recipe = Recipe::define(RecipeId::new(), &latte_kit(), &[(matcha(), i64::MAX / 2)], None).unwrap();
        assert!(recipe.requirements(3).is_err());
        assert!(recipe.requirements(0).is_err());
    }
}
