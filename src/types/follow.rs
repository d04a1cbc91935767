use serde::Serialize;

use crate::types::recipe::RecipeShort;

/// Recipes shown per subscription when `recipes_limit` is absent.
pub const DEFAULT_RECIPES_LIMIT: i64 = 3;

/// A followed author together with a preview of their newest recipes.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Subscription {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}
