use handle_errors::Error;
use tracing::{info, instrument};
use warp::http::StatusCode;

use crate::media::Media;
use crate::routes::authentication::{hash_password, verify_password};
use crate::store::Store;
use crate::types::account::{AccountCreated, CurrentPassword, NewAccount, PasswordChange, Session};
use crate::types::follow::{Subscription, DEFAULT_RECIPES_LIMIT};
use crate::types::pagination::{positive_param, Page, PageRequest, PageSettings, Query};

#[instrument(skip(store, account), fields(email = %account.email))]
pub async fn register(store: Store, account: NewAccount) -> Result<impl warp::Reply, warp::Rejection> {
    account.validate()?;
    let hashed = hash_password(account.password.as_bytes())?;
    let account = NewAccount {
        password: hashed,
        ..account
    };

    let created = store.add_account(account).await?;
    info!("Registered user {}", created.id);
    Ok(warp::reply::with_status(
        warp::reply::json(&AccountCreated::from(created)),
        StatusCode::CREATED,
    ))
}

pub async fn list_users(
    session: Option<Session>,
    query: Query,
    store: Store,
    pages: PageSettings,
) -> Result<impl warp::Reply, warp::Rejection> {
    let request = PageRequest::from_query(&query, &pages)?;
    let viewer = session.map(|s| s.user_id);
    let count = store.count_accounts().await?;
    let profiles = store
        .get_profiles(viewer, request.limit, request.offset())
        .await?;
    let page = Page::new(profiles, count, request, "/api/users/", &query, &pages)?;
    Ok(warp::reply::json(&page))
}

pub async fn get_user(
    id: i32,
    session: Option<Session>,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    match store.get_profile(id, session.map(|s| s.user_id)).await? {
        Some(profile) => Ok(warp::reply::json(&profile)),
        None => Err(warp::reject::custom(Error::NotFound("User"))),
    }
}

pub async fn me(session: Session, store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    match store.get_profile(session.user_id, Some(session.user_id)).await? {
        Some(profile) => Ok(warp::reply::json(&profile)),
        None => Err(warp::reject::custom(Error::Unauthorized)),
    }
}

async fn check_current_password(store: &Store, user_id: i32, password: &str) -> Result<(), Error> {
    let account = store.get_account(user_id).await?.ok_or(Error::Unauthorized)?;
    if verify_password(&account.password, password.as_bytes())? {
        Ok(())
    } else {
        Err(Error::validation("current_password", "Invalid password."))
    }
}

pub async fn set_password(
    session: Session,
    store: Store,
    change: PasswordChange,
) -> Result<impl warp::Reply, warp::Rejection> {
    check_current_password(&store, session.user_id, &change.current_password).await?;
    if change.new_password.trim().is_empty() {
        return Err(warp::reject::custom(Error::validation(
            "new_password",
            "This field may not be blank.",
        )));
    }
    let hashed = hash_password(change.new_password.as_bytes())?;
    store.update_password(session.user_id, hashed).await?;
    info!("User {} changed password", session.user_id);
    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}

pub async fn delete_me(
    session: Session,
    store: Store,
    confirmation: CurrentPassword,
) -> Result<impl warp::Reply, warp::Rejection> {
    check_current_password(&store, session.user_id, &confirmation.current_password).await?;
    store.delete_account(session.user_id).await?;
    info!("User {} deleted their account", session.user_id);
    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}

fn with_image_urls(mut subscription: Subscription, media: &Media) -> Subscription {
    for recipe in subscription.recipes.iter_mut() {
        recipe.image = media.url_for(&recipe.image);
    }
    subscription
}

fn recipes_limit(query: &Query) -> Result<i64, Error> {
    Ok(positive_param(query, "recipes_limit")?.unwrap_or(DEFAULT_RECIPES_LIMIT))
}

pub async fn subscribe(
    id: i32,
    session: Session,
    query: Query,
    store: Store,
    media: Media,
) -> Result<impl warp::Reply, warp::Rejection> {
    let limit = recipes_limit(&query)?;
    let subscription = store
        .get_subscription(id, limit)
        .await?
        .ok_or(Error::NotFound("User"))?;

    if id == session.user_id {
        return Err(warp::reject::custom(Error::validation(
            "errors",
            "You cannot subscribe to yourself.",
        )));
    }
    if store.follow_exists(session.user_id, id).await? {
        return Err(warp::reject::custom(Error::validation(
            "errors",
            "You are already subscribed to this user.",
        )));
    }

    store.add_follow(session.user_id, id).await?;
    info!("User {} followed {}", session.user_id, id);
    Ok(warp::reply::with_status(
        warp::reply::json(&with_image_urls(subscription, &media)),
        StatusCode::CREATED,
    ))
}

pub async fn unsubscribe(
    id: i32,
    session: Session,
    store: Store,
) -> Result<impl warp::Reply, warp::Rejection> {
    if store.get_account(id).await?.is_none() {
        return Err(warp::reject::custom(Error::NotFound("User")));
    }
    if !store.remove_follow(session.user_id, id).await? {
        return Err(warp::reject::custom(Error::validation(
            "errors",
            "You are not subscribed to this user.",
        )));
    }
    info!("User {} unfollowed {}", session.user_id, id);
    Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT))
}

pub async fn subscriptions(
    session: Session,
    query: Query,
    store: Store,
    media: Media,
    pages: PageSettings,
) -> Result<impl warp::Reply, warp::Rejection> {
    let request = PageRequest::from_query(&query, &pages)?;
    let limit = recipes_limit(&query)?;
    let count = store.count_subscriptions(session.user_id).await?;
    let subscriptions = store
        .get_subscriptions(session.user_id, request.limit, request.offset(), limit)
        .await?
        .into_iter()
        .map(|s| with_image_urls(s, &media))
        .collect();
    let page = Page::new(
        subscriptions,
        count,
        request,
        "/api/users/subscriptions/",
        &query,
        &pages,
    )?;
    Ok(warp::reply::json(&page))
}
