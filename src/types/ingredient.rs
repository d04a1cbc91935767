use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
}

/// An ingredient as it appears inside a recipe.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeIngredient {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// `{id, amount}` as sent when writing a recipe.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct IngredientAmount {
    pub id: i32,
    pub amount: i32,
}

/// A row of the ingredient CSV consumed by `load_ingredients`.
#[derive(Deserialize, Debug, Clone)]
pub struct IngredientRecord {
    pub name: String,
    pub measurement_unit: String,
}
