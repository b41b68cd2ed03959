//! Photo directory scanning and per-pass label assignment.

use crate::error::CatalogError;
use image::RgbImage;
use likeness_core::Label;
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

const PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Assigns consecutive labels to names in first-seen order.
///
/// Labels are only meaningful within one registry; two scans of different
/// trees can hand out the same label to different people.
#[derive(Debug, Default)]
pub struct LabelRegistry {
    labels: HashMap<String, Label>,
    next: Label,
}

impl LabelRegistry {
    /// Label for `name`, assigning the next free one on first sight.
    /// Names are compared case-sensitively.
    pub fn label_for(&mut self, name: &str) -> Label {
        if let Some(&label) = self.labels.get(name) {
            return label;
        }
        let label = self.next;
        self.labels.insert(name.to_string(), label);
        self.next += 1;
        label
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Decoded photos with a `(label, name)` entry per photo.
#[derive(Debug, Default)]
pub struct Ingested {
    pub images: Vec<RgbImage>,
    pub names: Vec<(Label, String)>,
}

impl Ingested {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Pair each image with its `(label, name)`.
    pub fn into_samples(self) -> Vec<((Label, String), RgbImage)> {
        self.names.into_iter().zip(self.images).collect()
    }

    pub fn from_samples(samples: Vec<((Label, String), RgbImage)>) -> Self {
        let (names, images) = samples.into_iter().unzip();
        Self { images, names }
    }

    /// Number of distinct labels.
    pub fn people(&self) -> usize {
        let mut labels: Vec<Label> = self.names.iter().map(|(l, _)| *l).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }
}

fn is_photo(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| PHOTO_EXTENSIONS.contains(&ext.as_str()))
}

/// Recursively read every photo under `root`, naming each after its
/// immediate parent directory.
///
/// Entries are visited in file-name order so label assignment is
/// deterministic. Photos directly inside `root` have no person directory and
/// are ignored. Unreadable or undecodable photos are logged and skipped
/// without consuming a label.
pub fn scan_photo_dir(root: &Path) -> Result<Ingested, CatalogError> {
    if !root.is_dir() {
        return Err(CatalogError::InvalidRoot(root.to_path_buf()));
    }

    let mut registry = LabelRegistry::default();
    let mut out = Ingested::default();
    let mut skipped = 0usize;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read catalog entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_photo(path) {
            continue;
        }
        if entry.depth() < 2 {
            tracing::debug!(path = %path.display(), "photo outside a person directory, ignoring");
            continue;
        }
        let Some(name) = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };

        let image = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot decode photo, skipping");
                skipped += 1;
                continue;
            }
        };

        let label = registry.label_for(&name);
        out.images.push(image);
        out.names.push((label, name));
    }

    tracing::info!(
        root = %root.display(),
        photos = out.len(),
        people = registry.len(),
        skipped,
        "photo directory scanned"
    );
    Ok(out)
}
