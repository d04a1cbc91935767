use handle_errors::Error;

use crate::store::Store;

pub async fn get_tags(store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    let tags = store.get_tags().await?;
    Ok(warp::reply::json(&tags))
}

pub async fn get_tag(id: i32, store: Store) -> Result<impl warp::Reply, warp::Rejection> {
    match store.get_tag(id).await? {
        Some(tag) => Ok(warp::reply::json(&tag)),
        None => Err(warp::reject::custom(Error::NotFound("Tag"))),
    }
}
