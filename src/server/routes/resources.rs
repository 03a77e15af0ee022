//! CRUD routes for the plain collections.
//!
//! Every collection maps one-to-one onto the upstream: `/api/<name>` and
//! `/api/<name>/:id` forward to `/<name>` and `/<name>/:id`, with create and
//! update bodies checked against the collection's schema first.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use reqwest::Method;

use crate::school::forms::{self, Schema};
use crate::server::auth::Caller;
use crate::server::backend::Auth;
use crate::server::AppState;

use super::{checked_id, created, parse_body, relay, ApiResult};

pub struct Collection {
  pub name: &'static str,
  pub schema: &'static Schema,
}

pub static STUDENTS: Collection = Collection {
  name: "students",
  schema: &forms::STUDENT,
};

pub static CLASSES: Collection = Collection {
  name: "classes",
  schema: &forms::CLASS,
};

pub static PARENTS: Collection = Collection {
  name: "parents",
  schema: &forms::PARENT,
};

pub static USERS: Collection = Collection {
  name: "users",
  schema: &forms::USER,
};

pub static ATTENDANCE: Collection = Collection {
  name: "attendance",
  schema: &forms::ATTENDANCE,
};

pub fn routes(collection: &'static Collection) -> Router<AppState> {
  let list_path = format!("/{}", collection.name);
  let item_path = format!("/{}/:id", collection.name);

  Router::new()
    .route(
      &list_path,
      get(move |State(state): State<AppState>, Caller(auth): Caller| {
        list(collection, state, auth)
      })
      .post(
        move |State(state): State<AppState>, Caller(auth): Caller, body: Bytes| {
          create(collection, state, auth, body)
        },
      ),
    )
    .route(
      &item_path,
      get(
        move |State(state): State<AppState>, Caller(auth): Caller, Path(id): Path<String>| {
          fetch_one(collection, state, auth, id)
        },
      )
      .patch(
        move |State(state): State<AppState>,
              Caller(auth): Caller,
              Path(id): Path<String>,
              body: Bytes| { update(collection, state, auth, id, body) },
      )
      .delete(
        move |State(state): State<AppState>, Caller(auth): Caller, Path(id): Path<String>| {
          remove(collection, state, auth, id)
        },
      ),
    )
}

async fn list(collection: &'static Collection, state: AppState, auth: Auth) -> ApiResult {
  let path = format!("/{}", collection.name);
  relay(state.backend.request(Method::GET, &path, &auth, None).await?)
}

async fn create(
  collection: &'static Collection,
  state: AppState,
  auth: Auth,
  body: Bytes,
) -> ApiResult {
  let body = parse_body(&body)?;
  collection.schema.validate(&body)?;

  let path = format!("/{}", collection.name);
  let reply = state
    .backend
    .request(Method::POST, &path, &auth, Some(&body))
    .await?;
  created(reply.data)
}

async fn fetch_one(
  collection: &'static Collection,
  state: AppState,
  auth: Auth,
  id: String,
) -> ApiResult {
  let path = format!("/{}/{}", collection.name, checked_id(&id)?);
  relay(state.backend.request(Method::GET, &path, &auth, None).await?)
}

async fn update(
  collection: &'static Collection,
  state: AppState,
  auth: Auth,
  id: String,
  body: Bytes,
) -> ApiResult {
  let path = format!("/{}/{}", collection.name, checked_id(&id)?);
  let body = parse_body(&body)?;
  collection.schema.validate_patch(&body)?;

  relay(
    state
      .backend
      .request(Method::PATCH, &path, &auth, Some(&body))
      .await?,
  )
}

async fn remove(
  collection: &'static Collection,
  state: AppState,
  auth: Auth,
  id: String,
) -> ApiResult {
  let path = format!("/{}/{}", collection.name, checked_id(&id)?);
  relay(state.backend.request(Method::DELETE, &path, &auth, None).await?)
}
