use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::drug::{ResolvedDrug, resolve_required};
use crate::error::MedSafeError;
use crate::sources::Terminology;

/// Ingredient, semantic ingredient and precise ingredient.
pub(crate) const INGREDIENT_TERM_TYPES: [&str; 3] = ["IN", "SIN", "PIN"];
/// Clinical and branded drug products.
pub(crate) const PRODUCT_TERM_TYPES: [&str; 2] = ["SCD", "SBD"];

pub const MAX_ALTERNATIVES: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeProduct {
    pub rxcui: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternatives {
    pub drug: ResolvedDrug,
    pub alternatives: Vec<AlternativeProduct>,
}

async fn ingredient_codes(
    terminology: &dyn Terminology,
    rxcui: &str,
) -> Result<Vec<String>, MedSafeError> {
    let mut seen = HashSet::new();
    Ok(terminology
        .related(rxcui, &INGREDIENT_TERM_TYPES)
        .await?
        .into_iter()
        .map(|c| c.rxcui)
        .filter(|code| seen.insert(code.clone()))
        .collect())
}

/// Same-ingredient products for an already resolved drug.
///
/// Products come out in ingredient discovery order, then upstream order per ingredient. The
/// drug's own label is excluded, names are unique, and at most [`MAX_ALTERNATIVES`] are kept.
/// A drug with no decomposed ingredient yields an empty list.
pub async fn alternatives_for(
    terminology: &dyn Terminology,
    drug: &ResolvedDrug,
) -> Result<Vec<AlternativeProduct>, MedSafeError> {
    let ingredients = ingredient_codes(terminology, &drug.rxcui).await?;
    if ingredients.is_empty() {
        debug!(rxcui = %drug.rxcui, "no ingredient relations");
        return Ok(Vec::new());
    }

    let mut products = Vec::new();
    for ingredient in &ingredients {
        products.extend(terminology.related(ingredient, &PRODUCT_TERM_TYPES).await?);
    }

    let mut seen = HashSet::new();
    Ok(products
        .into_iter()
        .filter(|p| p.name != drug.label)
        .filter(|p| seen.insert(p.name.clone()))
        .map(|p| AlternativeProduct {
            rxcui: p.rxcui,
            name: p.name,
        })
        .take(MAX_ALTERNATIVES)
        .collect())
}

/// Resolves `name` and lists its same-ingredient alternatives.
///
/// # Errors
///
/// `NotFound` when the name does not resolve; upstream errors from any relation lookup.
pub async fn find_alternatives(
    terminology: &dyn Terminology,
    name: &str,
) -> Result<Alternatives, MedSafeError> {
    let drug = resolve_required(terminology, name).await?;
    let alternatives = alternatives_for(terminology, &drug).await?;
    Ok(Alternatives { drug, alternatives })
}
