//! Upload an object, then record it in the backend; undo the upload if the
//! record cannot be written.

use std::future::Future;
use tracing::{error, warn};

use super::{NewObject, ObjectStore, StorageError, StoredObject};

#[derive(Debug)]
pub enum SagaError<E> {
  /// Nothing was stored
  Upload(StorageError),
  /// The object was stored, the write failed and the object was removed again
  /// (or removal was attempted and logged)
  Write(E),
}

/// The undo step for an uploaded object. Runs at most once.
struct Compensation<'a> {
  store: &'a dyn ObjectStore,
  object: Option<StoredObject>,
}

impl<'a> Compensation<'a> {
  fn record(store: &'a dyn ObjectStore, object: StoredObject) -> Self {
    Self {
      store,
      object: Some(object),
    }
  }

  fn discard(mut self) {
    self.object = None;
  }

  async fn run(mut self) {
    let Some(object) = self.object.take() else {
      return;
    };
    warn!(file_id = %object.id, name = %object.name, "compensating: deleting uploaded object");
    if let Err(e) = self.store.delete(&object).await {
      error!(file_id = %object.id, name = %object.name, "compensation failed, object is orphaned: {}", e);
    }
  }
}

/// Store `object`, then call `write` with the stored object.
///
/// If `write` fails the upload is deleted before the write's error is
/// returned. A failed delete is logged and never replaces that error.
pub async fn upload_then_write<W, Fut, T, E>(
  store: &dyn ObjectStore,
  object: NewObject,
  write: W,
) -> Result<(StoredObject, T), SagaError<E>>
where
  W: FnOnce(StoredObject) -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let stored = store.put(object).await.map_err(SagaError::Upload)?;
  let compensation = Compensation::record(store, stored.clone());

  match write(stored.clone()).await {
    Ok(written) => {
      compensation.discard();
      Ok((stored, written))
    }
    Err(e) => {
      compensation.run().await;
      Err(SagaError::Write(e))
    }
  }
}
