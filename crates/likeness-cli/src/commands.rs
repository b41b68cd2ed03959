use crate::config::Config;
use anyhow::{bail, Context, Result};
use likeness_catalog::{CatalogStore, Ingested, PhotoCatalog};
use likeness_core::{
    FrameProcessor, IdentityResolver, KnownNames, Label, LbphRecognizer, ModelSource,
    ModelTrainer, Recognizer, ScrfdDetector, TemplateTracker,
};
use likeness_hw::{next_usable_frame, open_source, Camera, FrameWriter};
use std::path::{Path, PathBuf};

/// Consecutive unusable frames tolerated before `run` stops.
const MAX_SKIPPED_FRAMES: u32 = 5;

fn open_store(config: &Config) -> Result<CatalogStore> {
    CatalogStore::open(&config.db_path)
        .with_context(|| format!("failed to open catalog {}", config.db_path.display()))
}

fn load_detector(config: &Config) -> Result<ScrfdDetector> {
    let path = config.detector_model_path();
    let detector = ScrfdDetector::load(&path)
        .with_context(|| format!("failed to load detector {}", path.display()))?;
    tracing::info!(path = %path.display(), "SCRFD detector loaded");
    Ok(detector)
}

/// Train or load the recognizer model. Catalog photos are only read when
/// there is no model to load.
fn ensure_model(
    config: &Config,
    catalog: &PhotoCatalog<'_>,
    recognizer: &mut dyn Recognizer,
) -> Result<ModelSource> {
    let trainer = ModelTrainer::new(config.miss_policy);
    let (labels, images): (Vec<Label>, Vec<_>) = if config.recognizer_path.is_file() {
        (Vec::new(), Vec::new())
    } else {
        catalog.images()?.into_iter().unzip()
    };

    trainer
        .train_or_load(recognizer, &images, &labels, &config.recognizer_path)
        .with_context(|| {
            format!(
                "failed to train or load model {}",
                config.recognizer_path.display()
            )
        })
}

pub fn ingest(config: &Config, photos: &Path, reset: bool) -> Result<()> {
    let store = open_store(config)?;
    let catalog = PhotoCatalog::new(&store);

    // With --reset the old rows are only replaced once the new faces are ready.
    let existing = catalog.count()?;
    if existing > 0 && !reset {
        bail!(
            "catalog already holds {existing} photos; labels from another pass would collide, \
             rerun with --reset"
        );
    }

    let ingested = catalog
        .ingest(photos)
        .with_context(|| format!("failed to scan {}", photos.display()))?;
    if ingested.is_empty() {
        tracing::warn!(path = %photos.display(), "no photos found");
        println!("No photos found under {}", photos.display());
        return Ok(());
    }

    let mut detector = load_detector(config)?;
    let trainer = ModelTrainer::new(config.miss_policy);
    let faces = Ingested::from_samples(trainer.prepare(&mut detector, ingested.into_samples())?);

    let rows = if reset {
        catalog.replace(&faces.images, &faces.names)?
    } else {
        catalog.persist(&faces.images, &faces.names)?
    };
    println!("Stored {rows} face photos for {} people", faces.people());

    if config.recognizer_path.exists() {
        tracing::warn!(
            path = %config.recognizer_path.display(),
            "existing recognizer model predates this catalog; run `likeness train --force`"
        );
    }
    Ok(())
}

pub fn reset(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    PhotoCatalog::new(&store).reset()?;
    println!("Catalog cleared");
    Ok(())
}

pub fn names(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let names = PhotoCatalog::new(&store).names()?;
    if names.is_empty() {
        println!("Catalog is empty");
    }
    for (label, name) in names {
        println!("{label:>4}  {name}");
    }
    Ok(())
}

pub fn train(config: &Config, force: bool) -> Result<()> {
    if force && config.recognizer_path.exists() {
        std::fs::remove_file(&config.recognizer_path).with_context(|| {
            format!("failed to remove {}", config.recognizer_path.display())
        })?;
        tracing::info!(path = %config.recognizer_path.display(), "removed existing model");
    }

    let store = open_store(config)?;
    let catalog = PhotoCatalog::new(&store);
    let mut recognizer = LbphRecognizer::default();

    match ensure_model(config, &catalog, &mut recognizer)? {
        ModelSource::Trained => println!("Trained model {}", config.recognizer_path.display()),
        ModelSource::Loaded => println!(
            "Model {} already exists; use --force to retrain",
            config.recognizer_path.display()
        ),
    }
    Ok(())
}

pub struct RunOptions {
    pub source: String,
    pub output: Option<PathBuf>,
    pub track: bool,
    pub max_frames: Option<u64>,
}

pub fn run(config: &Config, opts: RunOptions) -> Result<()> {
    let store = open_store(config)?;
    let catalog = PhotoCatalog::new(&store);

    let names: KnownNames = catalog.names()?.into_iter().collect();
    if names.is_empty() {
        tracing::warn!("catalog has no names; every face will be reported as unknown");
    }

    let mut recognizer = LbphRecognizer::default();
    ensure_model(config, &catalog, &mut recognizer)?;
    let detector = load_detector(config)?;

    let mut processor = FrameProcessor::new(
        Box::new(detector),
        Box::new(recognizer),
        names,
        config.scale_factor,
    )?
    .with_resolver(IdentityResolver::new(config.confidence_threshold));
    if opts.track {
        processor = processor.with_tracker(Box::new(TemplateTracker::default()));
    }

    let mut source = open_source(&opts.source)
        .with_context(|| format!("failed to open source '{}'", opts.source))?;
    let mut writer = opts.output.as_deref().map(FrameWriter::create).transpose()?;
    tracing::info!(source = %source.describe(), track = opts.track, "processing frames");

    let mut processed = 0u64;
    loop {
        if opts.max_frames.is_some_and(|max| processed >= max) {
            break;
        }
        let mut frame = match next_usable_frame(source.as_mut(), MAX_SKIPPED_FRAMES) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "frame source failed, stopping");
                break;
            }
        };
        processed += 1;

        let outcomes = match processor.process_frame(&mut frame.image) {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(seq = frame.sequence, error = %e, "frame skipped");
                continue;
            }
        };
        for outcome in &outcomes {
            tracing::info!(
                seq = frame.sequence,
                name = %outcome.name,
                label = outcome.prediction.label,
                confidence = outcome.prediction.confidence,
                x = outcome.bbox.x,
                y = outcome.bbox.y,
                width = outcome.bbox.width,
                height = outcome.bbox.height,
                "face"
            );
        }

        if let Some(writer) = writer.as_mut() {
            writer.write(&frame.image)?;
        }
    }

    println!("Processed {processed} frames");
    Ok(())
}

pub fn devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
    Ok(())
}
