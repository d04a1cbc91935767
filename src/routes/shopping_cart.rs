use handle_errors::Error;
use tracing::info;
use warp::http::{header, StatusCode};

use crate::media::Media;
use crate::store::{Marker, Store};
use crate::types::account::Session;

const SHOPPING_LIST_FILENAME: &str = "shopping_list.pdf";

fn marker_name(marker: Marker) -> &'static str {
    match marker {
        Marker::Favorite => "favorites",
        Marker::Cart => "shopping cart",
    }
}

/// Adds the recipe to the user's favorites or cart and returns its short form.
pub async fn add_marker(
    marker: Marker,
    id: i32,
    session: Session,
    store: Store,
    media: Media,
) -> Result<impl warp::Reply, warp::Rejection> {
    let mut recipe = match store.get_recipe_short(id).await? {
        Some(recipe) => recipe,
        None => {
            return Err(warp::reject::custom(Error::validation(
                "errors",
                format!("Recipe {} does not exist.", id),
            )))
        }
    };
    if store.has_marker(marker, session.user_id, id).await? {
        return Err(warp::reject::custom(Error::validation(
            "errors",
            format!("Recipe is already in {}.", marker_name(marker)),
        )));
    }

    store.add_marker(marker, session.user_id, id).await?;
    info!("User {} added recipe {} to {}", session.user_id, id, marker_name(marker));
    recipe.image = media.url_for(&recipe.image);
    Ok(warp::reply::with_status(
        warp::reply::json(&recipe),
        StatusCode::CREATED,
    ))
}

pub async fn remove_marker(
    marker: Marker,
    id: i32,
    session: Session,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    if store.get_recipe_author(id).await?.is_none() {
        return Err(warp::reject::custom(Error::NotFound("Recipe")));
    }
    if !store.remove_marker(marker, session.user_id, id).await? {
        return Err(warp::reject::custom(Error::validation(
            "errors",
            format!("Recipe is not in {}.", marker_name(marker)),
        )));
    }
    info!("User {} removed recipe {} from {}", session.user_id, id, marker_name(marker));
    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}

pub async fn download_shopping_cart(
    session: Session,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    let list = store.get_shopping_list(session.user_id).await?;
    info!(
        "Rendering shopping list for user {} ({} lines)",
        session.user_id,
        list.lines().len()
    );
    let pdf = list
        .to_pdf()
        .map_err(|e| warp::reject::custom(Error::Document(e.to_string())))?;

    let reply = warp::reply::with_header(pdf, header::CONTENT_TYPE, "application/pdf");
    Ok(warp::reply::with_header(
        reply,
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", SHOPPING_LIST_FILENAME),
    ))
}
