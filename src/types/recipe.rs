use std::collections::HashSet;

use chrono::prelude::*;
use handle_errors::Error;
use serde::{Deserialize, Serialize};

use crate::types::account::UserProfile;
use crate::types::ingredient::{IngredientAmount, RecipeIngredient};
use crate::types::pagination::{query_param, query_values};
use crate::types::tag::Tag;

pub const MIN_AMOUNT: i32 = 1;
pub const MAX_AMOUNT: i32 = 32000;
const MAX_RECIPE_NAME: usize = 50;

#[derive(Serialize, Debug, Clone)]
pub struct Recipe {
    pub id: i32,
    pub author: UserProfile,
    pub name: String,
    pub image: String,
    pub text: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub tags: Vec<Tag>,
    pub cooking_time: i32,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    #[serde(skip)]
    pub created: DateTime<Utc>,
}

/// The compact form used by favorites, carts and subscriptions.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeShort {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<&Recipe> for RecipeShort {
    fn from(recipe: &Recipe) -> Self {
        RecipeShort {
            id: recipe.id,
            name: recipe.name.clone(),
            image: recipe.image.clone(),
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewRecipe {
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<i32>,
    pub image: String,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
}

impl NewRecipe {
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name)?;
        if self.text.trim().is_empty() {
            return Err(Error::validation("text", "This field may not be blank."));
        }
        if self.image.trim().is_empty() {
            return Err(Error::validation("image", "This field may not be blank."));
        }
        validate_cooking_time(self.cooking_time)?;
        validate_components(&self.tags, &self.ingredients)
    }
}

/// A partial update. Tags and ingredients are still required because both
/// join tables are rebuilt on every write.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeUpdate {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<i32>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

impl RecipeUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(text) = &self.text {
            if text.trim().is_empty() {
                return Err(Error::validation("text", "This field may not be blank."));
            }
        }
        if let Some(cooking_time) = self.cooking_time {
            validate_cooking_time(cooking_time)?;
        }
        let tags = self
            .tags
            .as_deref()
            .ok_or_else(|| Error::validation("tags", "This field is required."))?;
        let ingredients = self
            .ingredients
            .as_deref()
            .ok_or_else(|| Error::validation("ingredients", "This field is required."))?;
        validate_components(tags, ingredients)
    }
}

/// Column values for a recipe write, image already stored.
#[derive(Debug, Clone)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Vec<i32>,
    pub ingredients: Vec<IngredientAmount>,
}

fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::validation("name", "This field may not be blank."));
    }
    if name.chars().count() > MAX_RECIPE_NAME {
        return Err(Error::validation(
            "name",
            format!("Ensure this field has no more than {} characters.", MAX_RECIPE_NAME),
        ));
    }
    Ok(())
}

fn validate_cooking_time(cooking_time: i32) -> Result<(), Error> {
    in_range("cooking_time", cooking_time)
}

fn in_range(field: &'static str, value: i32) -> Result<(), Error> {
    if value < MIN_AMOUNT {
        Err(Error::validation(
            field,
            format!("Ensure this value is greater than or equal to {}.", MIN_AMOUNT),
        ))
    } else if value > MAX_AMOUNT {
        Err(Error::validation(
            field,
            format!("Ensure this value is less than or equal to {}.", MAX_AMOUNT),
        ))
    } else {
        Ok(())
    }
}

/// Non-empty, duplicate-free tags and ingredients with amounts in range.
/// Existence of the referenced rows is checked by the store.
pub fn validate_components(tags: &[i32], ingredients: &[IngredientAmount]) -> Result<(), Error> {
    if tags.is_empty() {
        return Err(Error::validation("tags", "This field may not be empty."));
    }
    if ingredients.is_empty() {
        return Err(Error::validation("ingredients", "This field may not be empty."));
    }
    let mut seen = HashSet::new();
    for tag in tags {
        if !seen.insert(*tag) {
            return Err(Error::validation("tags", format!("Tag {} is duplicated.", tag)));
        }
    }
    let mut seen = HashSet::new();
    for ingredient in ingredients {
        if !seen.insert(ingredient.id) {
            return Err(Error::validation(
                "ingredients",
                format!("Ingredient {} is duplicated.", ingredient.id),
            ));
        }
        in_range("amount", ingredient.amount)?;
    }
    Ok(())
}

/// Query filters for the recipe list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub author: Option<i32>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub ingredients: Option<String>,
}

impl RecipeFilter {
    pub fn from_query(query: &[(String, String)]) -> Result<Self, Error> {
        let author = match query_param(query, "author") {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<i32>().map_err(Error::ParseError)?),
        };
        Ok(RecipeFilter {
            author,
            tags: query_values(query, "tags")
                .into_iter()
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            is_favorited: is_truthy(query_param(query, "is_favorited")),
            is_in_shopping_cart: is_truthy(query_param(query, "is_in_shopping_cart")),
            ingredients: query_param(query, "ingredients")
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }

    /// `ILIKE` pattern matching names that start with the requested prefix.
    pub fn ingredient_pattern(&self) -> Option<String> {
        self.ingredients.as_deref().map(like_prefix)
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true") | Some("True"))
}

/// Escapes `LIKE` wildcards and appends `%`.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(id: i32, amount: i32) -> IngredientAmount {
        IngredientAmount { id, amount }
    }

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn new_recipe() -> NewRecipe {
        NewRecipe {
            ingredients: vec![amount(1, 200), amount(2, 3)],
            tags: vec![1, 2],
            image: "data:image/png;base64,iVBORw0KGgo=".to_string(),
            name: "Pancakes".to_string(),
            text: "Mix and fry.".to_string(),
            cooking_time: 20,
        }
    }

    #[test]
    fn accepts_valid_recipe() {
        assert!(new_recipe().validate().is_ok());
    }

    #[test]
    fn requires_tags_and_ingredients() {
        let mut r = new_recipe();
        r.tags.clear();
        assert!(matches!(r.validate(), Err(Error::Validation { field: "tags", .. })));

        let mut r = new_recipe();
        r.ingredients.clear();
        assert!(matches!(r.validate(), Err(Error::Validation { field: "ingredients", .. })));
    }

    #[test]
    fn rejects_duplicates() {
        assert!(matches!(
            validate_components(&[1, 1], &[amount(1, 5)]),
            Err(Error::Validation { field: "tags", .. })
        ));
        assert!(matches!(
            validate_components(&[1], &[amount(4, 5), amount(4, 7)]),
            Err(Error::Validation { field: "ingredients", .. })
        ));
    }

    #[test]
    fn amounts_and_cooking_time_stay_in_range() {
        assert!(validate_components(&[1], &[amount(1, MIN_AMOUNT)]).is_ok());
        assert!(validate_components(&[1], &[amount(1, MAX_AMOUNT)]).is_ok());
        assert!(matches!(
            validate_components(&[1], &[amount(1, 0)]),
            Err(Error::Validation { field: "amount", .. })
        ));
        assert!(matches!(
            validate_components(&[1], &[amount(1, MAX_AMOUNT + 1)]),
            Err(Error::Validation { field: "amount", .. })
        ));

        let mut r = new_recipe();
        r.cooking_time = 0;
        assert!(matches!(r.validate(), Err(Error::Validation { field: "cooking_time", .. })));
        r.cooking_time = 32001;
        assert!(matches!(r.validate(), Err(Error::Validation { field: "cooking_time", .. })));
    }

    #[test]
    fn name_is_limited_to_fifty_characters() {
        let mut r = new_recipe();
        r.name = "щ".repeat(50);
        assert!(r.validate().is_ok());
        r.name.push('щ');
        assert!(matches!(r.validate(), Err(Error::Validation { field: "name", .. })));
    }

    #[test]
    fn update_requires_components_but_not_columns() {
        let update = RecipeUpdate {
            tags: Some(vec![1]),
            ingredients: Some(vec![amount(1, 10)]),
            ..RecipeUpdate::default()
        };
        assert!(update.validate().is_ok());

        let update = RecipeUpdate {
            ingredients: Some(vec![amount(1, 10)]),
            ..RecipeUpdate::default()
        };
        assert!(matches!(update.validate(), Err(Error::Validation { field: "tags", .. })));
    }

    #[test]
    fn parses_filters() {
        let filter = RecipeFilter::from_query(&pairs(&[
            ("author", "7"),
            ("tags", "breakfast"),
            ("tags", "dinner"),
            ("is_favorited", "1"),
            ("is_in_shopping_cart", "0"),
            ("ingredients", "Fl"),
            ("page", "2"),
        ]))
        .unwrap();
        assert_eq!(
            filter,
            RecipeFilter {
                author: Some(7),
                tags: vec!["breakfast".to_string(), "dinner".to_string()],
                is_favorited: true,
                is_in_shopping_cart: false,
                ingredients: Some("Fl".to_string()),
            }
        );
        assert_eq!(filter.ingredient_pattern().as_deref(), Some("Fl%"));
    }

    #[test]
    fn bad_author_is_rejected() {
        assert!(matches!(
            RecipeFilter::from_query(&pairs(&[("author", "me")])),
            Err(Error::ParseError(_))
        ));
    }

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("50%_off\\"), "50\\%\\_off\\\\%");
    }
}
