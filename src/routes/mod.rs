pub mod authentication;
pub mod ingredients;
pub mod recipes;
pub mod shopping_cart;
pub mod tags;
pub mod users;

use handle_errors::return_error;
use warp::{http::Method, Filter};

use crate::media::Media;
use crate::routes::authentication::{auth, optional_auth, Tokens};
use crate::store::{Marker, Store};
use crate::types::pagination::{PageSettings, Query};

/// Recipe bodies carry a base64 image.
const MAX_RECIPE_BODY: u64 = 10 * 1024 * 1024;
const MAX_JSON_BODY: u64 = 64 * 1024;

/// Every HTTP route of the service, with CORS, request tracing and error recovery.
pub fn api(
    store: Store,
    tokens: Tokens,
    media: Media,
    pages: PageSettings,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let media_root = media.root.clone();
    let authenticated = auth(tokens.clone(), store.clone());
    let anyone = optional_auth(tokens.clone(), store.clone());
    let store_filter = warp::any().map(move || store.clone());
    let tokens_filter = warp::any().map(move || tokens.clone());
    let media_filter = warp::any().map(move || media.clone());
    let pages_filter = warp::any().map(move || pages.clone());

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["Content-Type", "Authorization"])
        .allow_methods(&[
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::GET,
            Method::POST,
        ]);

    // ---- auth ----

    let login = warp::post()
        .and(warp::path("api"))
        .and(warp::path("auth"))
        .and(warp::path("token"))
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(store_filter.clone())
        .and(tokens_filter.clone())
        .and(warp::body::content_length_limit(MAX_JSON_BODY))
        .and(warp::body::json())
        .and_then(authentication::login);

    let logout = warp::post()
        .and(warp::path("api"))
        .and(warp::path("auth"))
        .and(warp::path("token"))
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and_then(authentication::logout);

    // ---- users ----

    let register = warp::post()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path::end())
        .and(store_filter.clone())
        .and(warp::body::content_length_limit(MAX_JSON_BODY))
        .and(warp::body::json())
        .and_then(users::register);

    let list_users = warp::get()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path::end())
        .and(anyone.clone())
        .and(warp::query::<Query>())
        .and(store_filter.clone())
        .and(pages_filter.clone())
        .and_then(users::list_users);

    let me = warp::get()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and_then(users::me);

    let delete_me = warp::delete()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and(warp::body::content_length_limit(MAX_JSON_BODY))
        .and(warp::body::json())
        .and_then(users::delete_me);

    let set_password = warp::post()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path("set_password"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and(warp::body::content_length_limit(MAX_JSON_BODY))
        .and(warp::body::json())
        .and_then(users::set_password);

    let subscriptions = warp::get()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path("subscriptions"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(warp::query::<Query>())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and(pages_filter.clone())
        .and_then(users::subscriptions);

    let get_user = warp::get()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(anyone.clone())
        .and(store_filter.clone())
        .and_then(users::get_user);

    let subscribe = warp::post()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path::param::<i32>())
        .and(warp::path("subscribe"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(warp::query::<Query>())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and_then(users::subscribe);

    let unsubscribe = warp::delete()
        .and(warp::path("api"))
        .and(warp::path("users"))
        .and(warp::path::param::<i32>())
        .and(warp::path("subscribe"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and_then(users::unsubscribe);

    // ---- tags & ingredients ----

    let get_tags = warp::get()
        .and(warp::path("api"))
        .and(warp::path("tags"))
        .and(warp::path::end())
        .and(store_filter.clone())
        .and_then(tags::get_tags);

    let get_tag = warp::get()
        .and(warp::path("api"))
        .and(warp::path("tags"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(store_filter.clone())
        .and_then(tags::get_tag);

    let get_ingredients = warp::get()
        .and(warp::path("api"))
        .and(warp::path("ingredients"))
        .and(warp::path::end())
        .and(warp::query::<Query>())
        .and(store_filter.clone())
        .and_then(ingredients::get_ingredients);

    let get_ingredient = warp::get()
        .and(warp::path("api"))
        .and(warp::path("ingredients"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(store_filter.clone())
        .and_then(ingredients::get_ingredient);

    // ---- recipes ----

    let list_recipes = warp::get()
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path::end())
        .and(anyone.clone())
        .and(warp::query::<Query>())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and(pages_filter.clone())
        .and_then(recipes::list_recipes);

    let download_shopping_cart = warp::get()
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path("download_shopping_cart"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and_then(shopping_cart::download_shopping_cart);

    let get_recipe = warp::get()
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(anyone.clone())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and_then(recipes::get_recipe);

    let add_recipe = warp::post()
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and(warp::body::content_length_limit(MAX_RECIPE_BODY))
        .and(warp::body::json())
        .and_then(recipes::add_recipe);

    let update_recipe = warp::patch()
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and(warp::body::content_length_limit(MAX_RECIPE_BODY))
        .and(warp::body::json())
        .and_then(recipes::update_recipe);

    let delete_recipe = warp::delete()
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path::param::<i32>())
        .and(warp::path::end())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and_then(recipes::delete_recipe);

    // ---- favorites & shopping cart ----

    let favorite = warp::any()
        .map(|| Marker::Favorite)
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path::param::<i32>())
        .and(warp::path("favorite"))
        .and(warp::path::end());

    let cart = warp::any()
        .map(|| Marker::Cart)
        .and(warp::path("api"))
        .and(warp::path("recipes"))
        .and(warp::path::param::<i32>())
        .and(warp::path("shopping_cart"))
        .and(warp::path::end());

    let add_marker = warp::post()
        .and(favorite.clone().or(cart.clone()).unify())
        .and(authenticated.clone())
        .and(store_filter.clone())
        .and(media_filter.clone())
        .and_then(shopping_cart::add_marker);

    let remove_marker = warp::delete()
        .and(favorite.or(cart).unify())
        .and(authenticated)
        .and(store_filter)
        .and_then(shopping_cart::remove_marker);

    // ---- media ----

    let media_files = warp::get()
        .and(warp::path("media"))
        .and(warp::fs::dir(media_root));

    let user_routes = register
        .or(list_users)
        .or(me)
        .or(delete_me)
        .or(set_password)
        .or(subscriptions)
        .or(get_user)
        .or(subscribe)
        .or(unsubscribe);

    let recipe_routes = list_recipes
        .or(download_shopping_cart)
        .or(get_recipe)
        .or(add_recipe)
        .or(update_recipe)
        .or(delete_recipe)
        .or(add_marker)
        .or(remove_marker);

    login
        .or(logout)
        .or(user_routes)
        .or(get_tags)
        .or(get_tag)
        .or(get_ingredients)
        .or(get_ingredient)
        .or(recipe_routes)
        .or(media_files)
        .with(warp::trace(|info| {
            tracing::info_span!(
                "request",
                method = %info.method(),
                path = %info.path(),
                id = %uuid::Uuid::new_v4(),
            )
        }))
        .with(cors)
        .recover(return_error)
}
