mod fut;
pub use fut::Fut;

mod matrix;
pub use matrix::{MatrixMedia, MediaId};

use crate::BackendError;

pub type FetchResult = Result<Vec<u8>, BackendError>;

// called with the runtime entered. an `Err` means nothing was dispatched
pub trait ThumbnailBackend: Send + Sync {
    fn fetch_thumbnail(
        &self,
        id: &str,
        width: u32,
        height: u32,
    ) -> Result<Fut<FetchResult>, BackendError>;
}
