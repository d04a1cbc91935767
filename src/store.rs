use std::collections::HashMap;

use chrono::{DateTime, Utc};
use handle_errors::Error;
use shopping_list::{IngredientTotal, ShoppingList};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;

use crate::types::account::{Account, NewAccount, UserProfile};
use crate::types::follow::Subscription;
use crate::types::ingredient::{Ingredient, IngredientAmount, RecipeIngredient};
use crate::types::recipe::{Recipe, RecipeChanges, RecipeFilter, RecipeShort};
use crate::types::tag::Tag;

/// Per-user recipe markers. Both tables share one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Favorite,
    Cart,
}

impl Marker {
    fn table(self) -> &'static str {
        match self {
            Marker::Favorite => "favorites",
            Marker::Cart => "carts",
        }
    }
}

// $1 author, $2 tags, $3 favorites only, $4 cart only, $5 viewer, $6 ingredient pattern.
const RECIPE_FILTER: &str = "
    WHERE ($1::INTEGER IS NULL OR r.author_id = $1)
      AND (cardinality($2::TEXT[]) = 0 OR EXISTS (
            SELECT 1 FROM recipe_tags rt JOIN tags t ON t.id = rt.tag_id
            WHERE rt.recipe_id = r.id AND (t.slug = ANY($2) OR t.name = ANY($2))))
      AND ($3::BOOLEAN IS FALSE OR EXISTS (
            SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = $5))
      AND ($4::BOOLEAN IS FALSE OR EXISTS (
            SELECT 1 FROM carts c WHERE c.recipe_id = r.id AND c.user_id = $5))
      AND ($6::TEXT IS NULL OR EXISTS (
            SELECT 1 FROM recipe_ingredient_amounts ria
            JOIN ingredients i ON i.id = ria.ingredient_id
            WHERE ria.recipe_id = r.id AND i.name ILIKE $6))";

/// Recipe columns joined with the author (`u`), flags relative to `viewer`.
fn recipe_columns(viewer: &str) -> String {
    format!(
        "r.id, r.name, r.image, r.text, r.cooking_time, r.created,
        u.id AS author_id, u.email, u.username, u.first_name, u.last_name,
        EXISTS (SELECT 1 FROM follows fo WHERE fo.user_id = {v} AND fo.following_id = u.id) AS is_subscribed,
        EXISTS (SELECT 1 FROM favorites f WHERE f.user_id = {v} AND f.recipe_id = r.id) AS is_favorited,
        EXISTS (SELECT 1 FROM carts c WHERE c.user_id = {v} AND c.recipe_id = r.id) AS is_in_shopping_cart",
        v = viewer
    )
}

fn recipe_from_row(row: PgRow) -> Recipe {
    Recipe {
        id: row.get("id"),
        author: UserProfile {
            id: row.get("author_id"),
            email: row.get("email"),
            username: row.get("username"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            is_subscribed: row.get("is_subscribed"),
        },
        name: row.get("name"),
        image: row.get("image"),
        text: row.get("text"),
        ingredients: Vec::new(),
        tags: Vec::new(),
        cooking_time: row.get("cooking_time"),
        is_favorited: row.get("is_favorited"),
        is_in_shopping_cart: row.get("is_in_shopping_cart"),
        created: row.get("created"),
    }
}

fn account_from_row(row: PgRow) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password: row.get("password"),
    }
}

fn recipe_short_from_row(row: PgRow) -> RecipeShort {
    RecipeShort {
        id: row.get("id"),
        name: row.get("name"),
        image: row.get("image"),
        cooking_time: row.get("cooking_time"),
    }
}

#[derive(Clone)]
pub struct Store {
    pub connection: PgPool,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self, Error> {
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(Error::DatabaseQueryError)?;
        Ok(Store {
            connection: db_pool,
        })
    }

    // ---- accounts ----

    pub async fn add_account(&self, account: NewAccount) -> Result<Account, Error> {
        match sqlx::query(
            "INSERT INTO users (email, username, first_name, last_name, password)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, first_name, last_name, password",
        )
        .bind(account.email)
        .bind(account.username)
        .bind(account.first_name)
        .bind(account.last_name)
        .bind(account.password)
        .map(account_from_row)
        .fetch_one(&self.connection)
        .await
        {
            Ok(account) => Ok(account),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    pub async fn get_account(&self, id: i32) -> Result<Option<Account>, Error> {
        match sqlx::query(
            "SELECT id, email, username, first_name, last_name, password
            FROM users WHERE id = $1",
        )
        .bind(id)
        .map(account_from_row)
        .fetch_optional(&self.connection)
        .await
        {
            Ok(account) => Ok(account),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    pub async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>, Error> {
        match sqlx::query(
            "SELECT id, email, username, first_name, last_name, password
            FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .map(account_from_row)
        .fetch_optional(&self.connection)
        .await
        {
            Ok(account) => Ok(account),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    pub async fn update_password(&self, id: i32, password: String) -> Result<(), Error> {
        sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(password)
            .bind(id)
            .execute(&self.connection)
            .await?;
        Ok(())
    }

    pub async fn delete_account(&self, id: i32) -> Result<(), Error> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.connection)
            .await?;
        info!("Deleted account {}", id);
        Ok(())
    }

    pub async fn count_accounts(&self) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.connection)
            .await?;
        Ok(count)
    }

    pub async fn get_profiles(
        &self,
        viewer: Option<i32>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserProfile>, Error> {
        match sqlx::query(
            "SELECT u.id, u.email, u.username, u.first_name, u.last_name,
                EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.following_id = u.id)
                    AS is_subscribed
            FROM users u
            ORDER BY u.id
            LIMIT $2 OFFSET $3",
        )
        .bind(viewer)
        .bind(limit)
        .bind(offset)
        .map(|row: PgRow| UserProfile {
            id: row.get("id"),
            email: row.get("email"),
            username: row.get("username"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            is_subscribed: row.get("is_subscribed"),
        })
        .fetch_all(&self.connection)
        .await
        {
            Ok(profiles) => Ok(profiles),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    pub async fn get_profile(&self, id: i32, viewer: Option<i32>) -> Result<Option<UserProfile>, Error> {
        match sqlx::query(
            "SELECT u.id, u.email, u.username, u.first_name, u.last_name,
                EXISTS (SELECT 1 FROM follows f WHERE f.user_id = $2 AND f.following_id = u.id)
                    AS is_subscribed
            FROM users u
            WHERE u.id = $1",
        )
        .bind(id)
        .bind(viewer)
        .map(|row: PgRow| UserProfile {
            id: row.get("id"),
            email: row.get("email"),
            username: row.get("username"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            is_subscribed: row.get("is_subscribed"),
        })
        .fetch_optional(&self.connection)
        .await
        {
            Ok(profile) => Ok(profile),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    // ---- tokens ----

    pub async fn revoke_token(&self, token: &str, expires: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO revoked_tokens (token, expires) VALUES ($1, $2)
            ON CONFLICT (token) DO NOTHING",
        )
        .bind(token)
        .bind(expires)
        .execute(&self.connection)
        .await?;
        sqlx::query("DELETE FROM revoked_tokens WHERE expires < NOW()")
            .execute(&self.connection)
            .await?;
        Ok(())
    }

    /// A session is live while its user exists and its token was not revoked.
    pub async fn is_session_active(&self, user_id: i32, token: &str) -> Result<bool, Error> {
        let active: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)
                AND NOT EXISTS (SELECT 1 FROM revoked_tokens WHERE token = $2)",
        )
        .bind(user_id)
        .bind(token)
        .fetch_one(&self.connection)
        .await?;
        Ok(active)
    }

    // ---- tags & ingredients ----

    pub async fn get_tags(&self) -> Result<Vec<Tag>, Error> {
        match sqlx::query("SELECT id, name, color, slug FROM tags ORDER BY id")
            .map(|row: PgRow| Tag {
                id: row.get("id"),
                name: row.get("name"),
                color: row.get("color"),
                slug: row.get("slug"),
            })
            .fetch_all(&self.connection)
            .await
        {
            Ok(tags) => Ok(tags),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    pub async fn get_tag(&self, id: i32) -> Result<Option<Tag>, Error> {
        match sqlx::query("SELECT id, name, color, slug FROM tags WHERE id = $1")
            .bind(id)
            .map(|row: PgRow| Tag {
                id: row.get("id"),
                name: row.get("name"),
                color: row.get("color"),
                slug: row.get("slug"),
            })
            .fetch_optional(&self.connection)
            .await
        {
            Ok(tag) => Ok(tag),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    pub async fn get_ingredients(&self, name_pattern: Option<String>) -> Result<Vec<Ingredient>, Error> {
        match sqlx::query(
            "SELECT id, name, measurement_unit FROM ingredients
            WHERE $1::TEXT IS NULL OR name ILIKE $1
            ORDER BY name, id",
        )
        .bind(name_pattern)
        .map(|row: PgRow| Ingredient {
            id: row.get("id"),
            name: row.get("name"),
            measurement_unit: row.get("measurement_unit"),
        })
        .fetch_all(&self.connection)
        .await
        {
            Ok(ingredients) => Ok(ingredients),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    pub async fn get_ingredient(&self, id: i32) -> Result<Option<Ingredient>, Error> {
        match sqlx::query("SELECT id, name, measurement_unit FROM ingredients WHERE id = $1")
            .bind(id)
            .map(|row: PgRow| Ingredient {
                id: row.get("id"),
                name: row.get("name"),
                measurement_unit: row.get("measurement_unit"),
            })
            .fetch_optional(&self.connection)
            .await
        {
            Ok(ingredient) => Ok(ingredient),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    /// Inserts an ingredient unless the same (name, unit) pair exists.
    /// Returns whether a row was added.
    pub async fn add_ingredient_if_missing(&self, name: &str, measurement_unit: &str) -> Result<bool, Error> {
        let result = sqlx::query(
            "INSERT INTO ingredients (name, measurement_unit)
            SELECT $1, $2
            WHERE NOT EXISTS (
                SELECT 1 FROM ingredients WHERE name = $1 AND measurement_unit = $2)",
        )
        .bind(name)
        .bind(measurement_unit)
        .execute(&self.connection)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- recipes ----

    pub async fn count_recipes(&self, filter: &RecipeFilter, viewer: Option<i32>) -> Result<i64, Error> {
        let sql = format!("SELECT COUNT(*) FROM recipes r {}", RECIPE_FILTER);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(filter.author)
            .bind(&filter.tags[..])
            .bind(filter.is_favorited)
            .bind(filter.is_in_shopping_cart)
            .bind(viewer)
            .bind(filter.ingredient_pattern())
            .fetch_one(&self.connection)
            .await?;
        Ok(count)
    }

    pub async fn get_recipes(
        &self,
        filter: &RecipeFilter,
        viewer: Option<i32>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Recipe>, Error> {
        let sql = format!(
            "SELECT {} FROM recipes r JOIN users u ON u.id = r.author_id {}
            ORDER BY r.created DESC, r.id DESC
            LIMIT $7 OFFSET $8",
            recipe_columns("$5"),
            RECIPE_FILTER
        );
        let mut recipes = match sqlx::query(&sql)
            .bind(filter.author)
            .bind(&filter.tags[..])
            .bind(filter.is_favorited)
            .bind(filter.is_in_shopping_cart)
            .bind(viewer)
            .bind(filter.ingredient_pattern())
            .bind(limit)
            .bind(offset)
            .map(recipe_from_row)
            .fetch_all(&self.connection)
            .await
        {
            Ok(recipes) => recipes,
            Err(e) => return Err(Error::DatabaseQueryError(e)),
        };
        self.attach_components(&mut recipes).await?;
        Ok(recipes)
    }

    pub async fn get_recipe(&self, id: i32, viewer: Option<i32>) -> Result<Option<Recipe>, Error> {
        let sql = format!(
            "SELECT {} FROM recipes r JOIN users u ON u.id = r.author_id WHERE r.id = $1",
            recipe_columns("$2")
        );
        let recipe = match sqlx::query(&sql)
            .bind(id)
            .bind(viewer)
            .map(recipe_from_row)
            .fetch_optional(&self.connection)
            .await
        {
            Ok(recipe) => recipe,
            Err(e) => return Err(Error::DatabaseQueryError(e)),
        };
        match recipe {
            Some(recipe) => {
                let mut recipes = vec![recipe];
                self.attach_components(&mut recipes).await?;
                Ok(recipes.pop())
            }
            None => Ok(None),
        }
    }

    /// The author of a recipe, or `None` when the recipe does not exist.
    pub async fn get_recipe_author(&self, id: i32) -> Result<Option<i32>, Error> {
        let author: Option<i32> = sqlx::query_scalar("SELECT author_id FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.connection)
            .await?;
        Ok(author)
    }

    pub async fn get_recipe_short(&self, id: i32) -> Result<Option<RecipeShort>, Error> {
        match sqlx::query("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .map(recipe_short_from_row)
            .fetch_optional(&self.connection)
            .await
        {
            Ok(recipe) => Ok(recipe),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    async fn attach_components(&self, recipes: &mut [Recipe]) -> Result<(), Error> {
        if recipes.is_empty() {
            return Ok(());
        }
        let ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();

        let ingredient_rows = sqlx::query(
            "SELECT ria.recipe_id, i.id, i.name, i.measurement_unit, a.amount
            FROM recipe_ingredient_amounts ria
            JOIN ingredients i ON i.id = ria.ingredient_id
            JOIN amounts a ON a.id = ria.amount_id
            WHERE ria.recipe_id = ANY($1)
            ORDER BY ria.id",
        )
        .bind(&ids[..])
        .map(|row: PgRow| {
            let recipe_id: i32 = row.get("recipe_id");
            (
                recipe_id,
                RecipeIngredient {
                    id: row.get("id"),
                    name: row.get("name"),
                    measurement_unit: row.get("measurement_unit"),
                    amount: row.get("amount"),
                },
            )
        })
        .fetch_all(&self.connection)
        .await?;

        let tag_rows = sqlx::query(
            "SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
            FROM recipe_tags rt
            JOIN tags t ON t.id = rt.tag_id
            WHERE rt.recipe_id = ANY($1)
            ORDER BY rt.id",
        )
        .bind(&ids[..])
        .map(|row: PgRow| {
            let recipe_id: i32 = row.get("recipe_id");
            (
                recipe_id,
                Tag {
                    id: row.get("id"),
                    name: row.get("name"),
                    color: row.get("color"),
                    slug: row.get("slug"),
                },
            )
        })
        .fetch_all(&self.connection)
        .await?;

        let mut ingredients: HashMap<i32, Vec<RecipeIngredient>> = HashMap::new();
        for (recipe_id, ingredient) in ingredient_rows {
            ingredients.entry(recipe_id).or_default().push(ingredient);
        }
        let mut tags: HashMap<i32, Vec<Tag>> = HashMap::new();
        for (recipe_id, tag) in tag_rows {
            tags.entry(recipe_id).or_default().push(tag);
        }
        for recipe in recipes.iter_mut() {
            recipe.ingredients = ingredients.remove(&recipe.id).unwrap_or_default();
            recipe.tags = tags.remove(&recipe.id).unwrap_or_default();
        }
        Ok(())
    }

    pub async fn add_recipe(&self, author_id: i32, recipe: RecipeChanges) -> Result<i32, Error> {
        let mut tx = self.connection.begin().await?;

        let recipe_id: i32 = sqlx::query_scalar(
            "INSERT INTO recipes (author_id, name, image, text, cooking_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id",
        )
        .bind(author_id)
        .bind(recipe.name)
        .bind(recipe.image)
        .bind(recipe.text)
        .bind(recipe.cooking_time)
        .fetch_one(&mut tx)
        .await?;

        Self::insert_components(&mut tx, recipe_id, &recipe.tags, &recipe.ingredients).await?;
        tx.commit().await?;
        info!("Recipe {} created by {}", recipe_id, author_id);
        Ok(recipe_id)
    }

    /// Overwrites the given columns and rebuilds both join tables.
    pub async fn update_recipe(&self, id: i32, changes: RecipeChanges) -> Result<(), Error> {
        let mut tx = self.connection.begin().await?;

        sqlx::query(
            "UPDATE recipes SET
                name = COALESCE($2, name),
                image = COALESCE($3, image),
                text = COALESCE($4, text),
                cooking_time = COALESCE($5, cooking_time)
            WHERE id = $1",
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.image)
        .bind(changes.text)
        .bind(changes.cooking_time)
        .execute(&mut tx)
        .await?;

        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;
        sqlx::query("DELETE FROM recipe_ingredient_amounts WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;

        Self::insert_components(&mut tx, id, &changes.tags, &changes.ingredients).await?;
        tx.commit().await?;
        info!("Recipe {} updated", id);
        Ok(())
    }

    async fn insert_components(
        tx: &mut Transaction<'_, Postgres>,
        recipe_id: i32,
        tags: &[i32],
        ingredients: &[IngredientAmount],
    ) -> Result<(), Error> {
        for tag in tags {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tags WHERE id = $1)")
                .bind(tag)
                .fetch_one(&mut *tx)
                .await?;
            if !exists {
                return Err(Error::validation("tags", format!("Tag {} does not exist.", tag)));
            }
            sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES ($1, $2)")
                .bind(recipe_id)
                .bind(tag)
                .execute(&mut *tx)
                .await?;
        }

        for ingredient in ingredients {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM ingredients WHERE id = $1)")
                    .bind(ingredient.id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !exists {
                return Err(Error::validation(
                    "ingredients",
                    format!("Ingredient {} does not exist.", ingredient.id),
                ));
            }
            // Amounts are shared rows, looked up or created by value.
            let amount_id: i32 = sqlx::query_scalar(
                "INSERT INTO amounts (amount) VALUES ($1)
                ON CONFLICT (amount) DO UPDATE SET amount = EXCLUDED.amount
                RETURNING id",
            )
            .bind(ingredient.amount)
            .fetch_one(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT INTO recipe_ingredient_amounts (recipe_id, amount_id, ingredient_id)
                VALUES ($1, $2, $3)",
            )
            .bind(recipe_id)
            .bind(amount_id)
            .bind(ingredient.id)
            .execute(&mut *tx)
            .await?;
        }
        Ok(())
    }

    /// Favorites and carts pointing at the recipe keep their rows with a null recipe.
    pub async fn delete_recipe(&self, id: i32) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.connection)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- favorites & cart ----

    pub async fn has_marker(&self, marker: Marker, user_id: i32, recipe_id: i32) -> Result<bool, Error> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
            marker.table()
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(recipe_id)
            .fetch_one(&self.connection)
            .await?;
        Ok(exists)
    }

    pub async fn add_marker(&self, marker: Marker, user_id: i32, recipe_id: i32) -> Result<(), Error> {
        let sql = format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2)",
            marker.table()
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(recipe_id)
            .execute(&self.connection)
            .await?;
        Ok(())
    }

    pub async fn remove_marker(&self, marker: Marker, user_id: i32, recipe_id: i32) -> Result<bool, Error> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            marker.table()
        );
        let result = sqlx::query(&sql)
            .bind(user_id)
            .bind(recipe_id)
            .execute(&self.connection)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sums every cart recipe's ingredient amounts per (name, unit), ordered by name.
    pub async fn get_shopping_list(&self, user_id: i32) -> Result<ShoppingList, Error> {
        match sqlx::query(
            "SELECT i.name, i.measurement_unit, SUM(a.amount)::BIGINT AS total
            FROM carts c
            JOIN recipe_ingredient_amounts ria ON ria.recipe_id = c.recipe_id
            JOIN ingredients i ON i.id = ria.ingredient_id
            JOIN amounts a ON a.id = ria.amount_id
            WHERE c.user_id = $1
            GROUP BY i.name, i.measurement_unit
            ORDER BY i.name, i.measurement_unit",
        )
        .bind(user_id)
        .map(|row: PgRow| IngredientTotal {
            name: row.get("name"),
            measurement_unit: row.get("measurement_unit"),
            amount: row.get("total"),
        })
        .fetch_all(&self.connection)
        .await
        {
            Ok(totals) => Ok(ShoppingList::new(totals)),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }

    // ---- follows ----

    pub async fn follow_exists(&self, user_id: i32, following_id: i32) -> Result<bool, Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND following_id = $2)",
        )
        .bind(user_id)
        .bind(following_id)
        .fetch_one(&self.connection)
        .await?;
        Ok(exists)
    }

    pub async fn add_follow(&self, user_id: i32, following_id: i32) -> Result<(), Error> {
        sqlx::query("INSERT INTO follows (user_id, following_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(following_id)
            .execute(&self.connection)
            .await?;
        Ok(())
    }

    pub async fn remove_follow(&self, user_id: i32, following_id: i32) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND following_id = $2")
            .bind(user_id)
            .bind(following_id)
            .execute(&self.connection)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_subscriptions(&self, user_id: i32) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.connection)
            .await?;
        Ok(count)
    }

    /// Followed authors, newest follow first, each with a recipe preview.
    pub async fn get_subscriptions(
        &self,
        user_id: i32,
        limit: i64,
        offset: i64,
        recipes_limit: i64,
    ) -> Result<Vec<Subscription>, Error> {
        let authors = match sqlx::query(
            "SELECT u.id, u.email, u.username, u.first_name, u.last_name,
                (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count
            FROM follows f
            JOIN users u ON u.id = f.following_id
            WHERE f.user_id = $1
            ORDER BY f.created DESC, f.id DESC
            LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .map(subscription_from_row)
        .fetch_all(&self.connection)
        .await
        {
            Ok(authors) => authors,
            Err(e) => return Err(Error::DatabaseQueryError(e)),
        };

        let mut subscriptions = Vec::with_capacity(authors.len());
        for mut subscription in authors {
            subscription.recipes = self.get_recipes_by_author(subscription.id, recipes_limit).await?;
            subscriptions.push(subscription);
        }
        Ok(subscriptions)
    }

    pub async fn get_subscription(
        &self,
        following_id: i32,
        recipes_limit: i64,
    ) -> Result<Option<Subscription>, Error> {
        let author = match sqlx::query(
            "SELECT u.id, u.email, u.username, u.first_name, u.last_name,
                (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count
            FROM users u
            WHERE u.id = $1",
        )
        .bind(following_id)
        .map(subscription_from_row)
        .fetch_optional(&self.connection)
        .await
        {
            Ok(author) => author,
            Err(e) => return Err(Error::DatabaseQueryError(e)),
        };
        match author {
            Some(mut subscription) => {
                subscription.recipes = self.get_recipes_by_author(subscription.id, recipes_limit).await?;
                Ok(Some(subscription))
            }
            None => Ok(None),
        }
    }

    async fn get_recipes_by_author(&self, author_id: i32, limit: i64) -> Result<Vec<RecipeShort>, Error> {
        match sqlx::query(
            "SELECT id, name, image, cooking_time FROM recipes
            WHERE author_id = $1
            ORDER BY created DESC, id DESC
            LIMIT $2",
        )
        .bind(author_id)
        .bind(limit)
        .map(recipe_short_from_row)
        .fetch_all(&self.connection)
        .await
        {
            Ok(recipes) => Ok(recipes),
            Err(e) => Err(Error::DatabaseQueryError(e)),
        }
    }
}

fn subscription_from_row(row: PgRow) -> Subscription {
    Subscription {
        email: row.get("email"),
        id: row.get("id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_subscribed: true,
        recipes: Vec::new(),
        recipes_count: row.get("recipes_count"),
    }
}
