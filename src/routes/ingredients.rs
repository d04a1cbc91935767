use handle_errors::Error;

use crate::store::Store;
use crate::types::pagination::{query_param, Query};
use crate::types::recipe::like_prefix;

/// `?name=` narrows the list to names starting with the given text, case-insensitively.
pub async fn get_ingredients(query: Query, store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    let pattern = query_param(&query, "name")
        .filter(|name| !name.is_empty())
        .map(like_prefix);
    let ingredients = store.get_ingredients(pattern).await?;
    Ok(warp::reply::json(&ingredients))
}

pub async fn get_ingredient(id: i32, store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    match store.get_ingredient(id).await? {
        Some(ingredient) => Ok(warp::reply::json(&ingredient)),
        None => Err(warp::reject::custom(Error::NotFound("Ingredient"))),
    }
}
