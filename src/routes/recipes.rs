use handle_errors::Error;
use tracing::{info, instrument, warn};
use warp::http::StatusCode;

use crate::media::Media;
use crate::store::Store;
use crate::types::account::Session;
use crate::types::pagination::{Page, PageRequest, PageSettings, Query};
use crate::types::recipe::{NewRecipe, Recipe, RecipeChanges, RecipeFilter, RecipeUpdate};

fn with_image_url(mut recipe: Recipe, media: &Media) -> Recipe {
    recipe.image = media.url_for(&recipe.image);
    recipe
}

async fn load_recipe(store: &Store, id: i32, viewer: Option<i32>, media: &Media) -> Result<Recipe, Error> {
    store
        .get_recipe(id, viewer)
        .await?
        .map(|recipe| with_image_url(recipe, media))
        .ok_or(Error::NotFound("Recipe"))
}

/// Anonymous viewers never match the favorites or cart filters.
#[instrument(skip(store, media, pages))]
pub async fn list_recipes(
    session: Option<Session>,
    query: Query,
    store: Store,
    media: Media,
    pages: PageSettings,
) -> Result<impl warp::Reply, warp::Rejection> {
    let request = PageRequest::from_query(&query, &pages)?;
    let filter = RecipeFilter::from_query(&query)?;
    let viewer = session.map(|s| s.user_id);

    let count = store.count_recipes(&filter, viewer).await?;
    let recipes = store
        .get_recipes(&filter, viewer, request.limit, request.offset())
        .await?
        .into_iter()
        .map(|recipe| with_image_url(recipe, &media))
        .collect();
    let page = Page::new(recipes, count, request, "/api/recipes/", &query, &pages)?;
    Ok(warp::reply::json(&page))
}

pub async fn get_recipe(
    id: i32,
    session: Option<Session>,
    store: Store,
    media: Media,
) -> Result<impl warp::Reply, warp::Rejection> {
    let recipe = load_recipe(&store, id, session.map(|s| s.user_id), &media).await?;
    Ok(warp::reply::json(&recipe))
}

#[instrument(skip(store, media, recipe), fields(user_id = session.user_id))]
pub async fn add_recipe(
    session: Session,
    store: Store,
    media: Media,
    recipe: NewRecipe,
) -> Result<impl warp::Reply, warp::Rejection> {
    recipe.validate()?;
    let image = media.save_image(&recipe.image).await?;
    let changes = RecipeChanges {
        name: Some(recipe.name),
        image: Some(image.clone()),
        text: Some(recipe.text),
        cooking_time: Some(recipe.cooking_time),
        tags: recipe.tags,
        ingredients: recipe.ingredients,
    };

    let id = match store.add_recipe(session.user_id, changes).await {
        Ok(id) => id,
        Err(e) => {
            media.remove(&image).await;
            return Err(warp::reject::custom(e));
        }
    };
    let recipe = load_recipe(&store, id, Some(session.user_id), &media).await?;
    Ok(warp::reply::with_status(
        warp::reply::json(&recipe),
        StatusCode::CREATED,
    ))
}

async fn check_author(store: &Store, id: i32, session: &Session) -> Result<(), Error> {
    match store.get_recipe_author(id).await? {
        None => Err(Error::NotFound("Recipe")),
        Some(author) if author != session.user_id => Err(Error::Forbidden),
        Some(_) => Ok(()),
    }
}

#[instrument(skip(store, media, update), fields(user_id = session.user_id))]
pub async fn update_recipe(
    id: i32,
    session: Session,
    store: Store,
    media: Media,
    update: RecipeUpdate,
) -> Result<impl warp::Reply, warp::Rejection> {
    check_author(&store, id, &session).await?;
    update.validate()?;

    let previous_image = match &update.image {
        Some(_) => store.get_recipe_short(id).await?.map(|r| r.image),
        None => None,
    };
    let image = match &update.image {
        Some(data_url) => Some(media.save_image(data_url).await?),
        None => None,
    };
    let changes = RecipeChanges {
        name: update.name,
        image: image.clone(),
        text: update.text,
        cooking_time: update.cooking_time,
        tags: update.tags.unwrap_or_default(),
        ingredients: update.ingredients.unwrap_or_default(),
    };

    if let Err(e) = store.update_recipe(id, changes).await {
        if let Some(image) = &image {
            media.remove(image).await;
        }
        return Err(warp::reject::custom(e));
    }
    if let Some(previous) = previous_image {
        media.remove(&previous).await;
    }

    let recipe = load_recipe(&store, id, Some(session.user_id), &media).await?;
    Ok(warp::reply::json(&recipe))
}

pub async fn delete_recipe(
    id: i32,
    session: Session,
    store: Store,
    media: Media,
) -> Result<impl warp::Reply, warp::Rejection> {
    check_author(&store, id, &session).await?;
    let image = store.get_recipe_short(id).await?.map(|r| r.image);

    if !store.delete_recipe(id).await? {
        warn!("Recipe {} vanished before delete", id);
        return Err(warp::reject::custom(Error::NotFound("Recipe")));
    }
    if let Some(image) = image {
        media.remove(&image).await;
    }
    info!("Recipe {} deleted by {}", id, session.user_id);
    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}
