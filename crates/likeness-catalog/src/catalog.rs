//! Typed catalog operations over the store: scan, persist, query, reset.

use crate::error::CatalogError;
use crate::ingest::{self, Ingested};
use crate::store::CatalogStore;
use image::{ImageFormat, RgbImage};
use likeness_core::Label;
use std::io::Cursor;
use std::path::Path;

/// Encode `image` as a PNG byte blob.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, CatalogError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbImage, CatalogError> {
    if bytes.is_empty() {
        return Err(CatalogError::Decode("empty blob".into()));
    }
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| CatalogError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

fn encode_rows<'n>(
    images: &[RgbImage],
    names: &'n [(Label, String)],
) -> Result<Vec<(Label, &'n str, Vec<u8>)>, CatalogError> {
    if images.len() != names.len() {
        return Err(CatalogError::Mismatch {
            images: images.len(),
            names: names.len(),
        });
    }
    images
        .iter()
        .zip(names)
        .map(|(img, (label, name))| -> Result<_, CatalogError> {
            Ok((*label, name.as_str(), encode_png(img)?))
        })
        .collect()
}

/// Labeled photo catalog over a borrowed [`CatalogStore`].
pub struct PhotoCatalog<'a> {
    store: &'a CatalogStore,
}

impl<'a> PhotoCatalog<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self { store }
    }

    /// Scan `root` for per-person photo directories. Nothing is stored.
    pub fn ingest(&self, root: &Path) -> Result<Ingested, CatalogError> {
        ingest::scan_photo_dir(root)
    }

    /// Store every image with its `(label, name)` as one PNG row, atomically.
    pub fn persist(&self, images: &[RgbImage], names: &[(Label, String)]) -> Result<usize, CatalogError> {
        let rows = encode_rows(images, names)?;
        let inserted = self.store.insert_photos(rows)?;
        tracing::info!(rows = inserted, "catalog photos persisted");
        Ok(inserted)
    }

    /// Like [`persist`](Self::persist), but first removes every existing row
    /// in the same transaction. Any error leaves the old catalog in place.
    pub fn replace(&self, images: &[RgbImage], names: &[(Label, String)]) -> Result<usize, CatalogError> {
        let rows = encode_rows(images, names)?;
        let inserted = self.store.replace_photos(rows)?;
        tracing::info!(rows = inserted, "catalog photos replaced");
        Ok(inserted)
    }

    /// Distinct `(label, name)` pairs ordered by label.
    pub fn names(&self) -> Result<Vec<(Label, String)>, CatalogError> {
        self.store.distinct_names()
    }

    pub fn name(&self, label: Label) -> Result<Option<String>, CatalogError> {
        self.store.name_for_label(label)
    }

    /// One `(label, image)` per stored row in insertion order. Rows that
    /// fail to decode are logged and left out.
    pub fn images(&self) -> Result<Vec<(Label, RgbImage)>, CatalogError> {
        let blobs = self.store.photo_blobs()?;
        let total = blobs.len();
        let mut images = Vec::with_capacity(total);

        for (row, (label, blob)) in blobs.into_iter().enumerate() {
            match decode_png(&blob) {
                Ok(img) => images.push((label, img)),
                Err(e) => tracing::warn!(row, label, error = %e, "skipping unreadable catalog photo"),
            }
        }

        if images.len() < total {
            tracing::warn!(loaded = images.len(), total, "some catalog photos could not be decoded");
        }
        Ok(images)
    }

    /// Remove every row by dropping and recreating the table.
    pub fn reset(&self) -> Result<(), CatalogError> {
        self.store.drop_table()?;
        self.store.create_table()?;
        tracing::info!("catalog reset");
        Ok(())
    }

    pub fn count(&self) -> Result<u64, CatalogError> {
        self.store.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tests::write_photo;
    use image::Rgb;
    use rstest::rstest;

    fn pattern(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 13) as u8, (y * 7) as u8, ((x ^ y) * 5) as u8]))
    }

    #[rstest]
    #[case::tiny(1, 1)]
    #[case::wide(37, 5)]
    #[case::square(64, 64)]
    fn test_png_roundtrip_pixel_exact(#[case] w: u32, #[case] h: u32) {
        let img = pattern(w, h);
        let decoded = decode_png(&encode_png(&img).unwrap()).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_png(&[]), Err(CatalogError::Decode(_))));
        assert!(matches!(decode_png(b"definitely not png"), Err(CatalogError::Decode(_))));
    }

    #[test]
    fn test_ingest_persist_and_query() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(&dir.path().join("photos/Alice/a.jpg"), 10);
        write_photo(&dir.path().join("photos/Alice/b.jpg"), 20);
        write_photo(&dir.path().join("photos/Bob/c.png"), 30);

        let store = CatalogStore::open_in_memory().unwrap();
        let catalog = PhotoCatalog::new(&store);
        let ingested = catalog.ingest(&dir.path().join("photos")).unwrap();
        catalog.persist(&ingested.images, &ingested.names).unwrap();

        assert_eq!(
            catalog.names().unwrap(),
            vec![(0, "Alice".to_string()), (1, "Bob".to_string())]
        );
        assert_eq!(catalog.count().unwrap(), 3);
        assert_eq!(catalog.name(1).unwrap().as_deref(), Some("Bob"));

        let images = catalog.images().unwrap();
        let labels: Vec<Label> = images.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec![0, 0, 1]);
        assert_eq!(images[2].1, ingested.images[2]);
    }

    #[test]
    fn test_persist_length_mismatch() {
        let store = CatalogStore::open_in_memory().unwrap();
        let catalog = PhotoCatalog::new(&store);
        let err = catalog
            .persist(&[pattern(4, 4)], &[(0, "A".into()), (1, "B".into())])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Mismatch { images: 1, names: 2 }));
        assert_eq!(catalog.count().unwrap(), 0);
    }

    #[test]
    fn test_images_skip_corrupt_rows() {
        let store = CatalogStore::open_in_memory().unwrap();
        let catalog = PhotoCatalog::new(&store);
        catalog.persist(&[pattern(4, 4)], &[(0, "Alice".into())]).unwrap();
        store
            .insert_photos(vec![(1, "Bob", b"garbage".to_vec()), (2, "Carol", Vec::new())])
            .unwrap();

        let images = catalog.images().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0, 0);
        // Names are still listed for rows whose photo is unreadable.
        assert_eq!(catalog.names().unwrap().len(), 3);
    }

    #[test]
    fn test_replace_swaps_rows_atomically() {
        let store = CatalogStore::open_in_memory().unwrap();
        let catalog = PhotoCatalog::new(&store);
        catalog
            .persist(&[pattern(4, 4), pattern(5, 5)], &[(0, "Alice".into()), (1, "Bob".into())])
            .unwrap();

        let rows = catalog.replace(&[pattern(6, 6)], &[(0, "Carol".into())]).unwrap();
        assert_eq!(rows, 1);
        assert_eq!(catalog.names().unwrap(), vec![(0, "Carol".to_string())]);
        assert_eq!(catalog.images().unwrap(), vec![(0, pattern(6, 6))]);
    }

    #[test]
    fn test_failed_replace_keeps_old_rows() {
        let store = CatalogStore::open_in_memory().unwrap();
        let catalog = PhotoCatalog::new(&store);
        catalog.persist(&[pattern(4, 4)], &[(0, "Alice".into())]).unwrap();

        let err = catalog
            .replace(&[pattern(6, 6)], &[(0, "Carol".into()), (1, "Dan".into())])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Mismatch { .. }));
        assert_eq!(catalog.names().unwrap(), vec![(0, "Alice".to_string())]);
    }

    #[test]
    fn test_replace_rolls_back_on_insert_failure() {
        let store = CatalogStore::open_in_memory().unwrap();
        let catalog = PhotoCatalog::new(&store);
        catalog.persist(&[pattern(4, 4)], &[(0, "Alice".into())]).unwrap();
        // Any insert after the delete now fails inside the transaction.
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER no_carol BEFORE INSERT ON photos WHEN NEW.name = 'Carol'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
            )
            .unwrap();

        let err = catalog.replace(&[pattern(6, 6)], &[(0, "Carol".into())]).unwrap_err();
        assert!(matches!(err, CatalogError::Sqlite(_)), "{err}");
        assert_eq!(catalog.count().unwrap(), 1);
        assert_eq!(catalog.names().unwrap(), vec![(0, "Alice".to_string())]);
    }

    #[test]
    fn test_reset_empties_catalog() {
        let store = CatalogStore::open_in_memory().unwrap();
        let catalog = PhotoCatalog::new(&store);
        catalog.persist(&[pattern(4, 4)], &[(0, "Alice".into())]).unwrap();
        catalog.reset().unwrap();
        assert_eq!(catalog.count().unwrap(), 0);
        assert!(catalog.names().unwrap().is_empty());
    }

    #[test]
    fn test_persisted_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("catalog.db");
        {
            let store = CatalogStore::open(&db).unwrap();
            PhotoCatalog::new(&store)
                .persist(&[pattern(8, 8)], &[(0, "Alice".into())])
                .unwrap();
        }
        let store = CatalogStore::open(&db).unwrap();
        let images = PhotoCatalog::new(&store).images().unwrap();
        assert_eq!(images, vec![(0, pattern(8, 8))]);
    }
}
