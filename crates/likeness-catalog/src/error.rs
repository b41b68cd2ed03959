use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("photo root is not a readable directory: {}", .0.display())]
    InvalidRoot(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("cannot decode stored photo: {0}")]
    Decode(String),
    #[error("{images} images but {names} labeled names")]
    Mismatch { images: usize, names: usize },
}
