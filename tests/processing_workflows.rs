//! Single-image processing, scratch lifecycle and session operations

mod common;

use common::{
    engine_with, files_in, local_engine, scratch_config, write_noisy_image, write_test_image,
    FakeCloud, MemoryCodec,
};
use image::{GenericImageView, ImageFormat};
use std::sync::Arc;
use tempfile::TempDir;
use watermark_remover::{
    CloudError, CloudErrorKind, EngineConfig, ErrorKind, InpaintBackends, MemoryCredentialStore,
    PatchInpainter, Region, RemovalError, RemovalMethod, RemovalOptions, WatermarkRemover,
};

#[tokio::test]
async fn test_cleanup_all_removes_output() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let input = write_test_image(dir.path(), "photo.png", 64, 48, ImageFormat::Png);

    let result = engine
        .process_one(&input, Region::new(10, 10, 20, 8), &RemovalOptions::default())
        .await
        .unwrap();
    assert!(result.output_path.exists());

    let removed = engine.cleanup_all().unwrap();
    assert!(removed >= 1);
    assert!(!result.output_path.exists());
    assert!(engine.scratch().registered().is_empty());
    assert!(input.exists());
}

#[tokio::test]
async fn test_size_accounting_uses_actual_bytes() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::builder()
        .scratch_dir(dir.path().join("scratch"))
        .jpeg_quality(40)
        .build()
        .unwrap();
    let engine = WatermarkRemover::with_components(
        config,
        Arc::new(MemoryCredentialStore::new()),
        InpaintBackends::new(Arc::new(PatchInpainter::new()), Arc::new(FakeCloud::default())),
        Arc::new(MemoryCodec::new(1)),
    )
    .unwrap();
    // Source JPEG at quality 100, output re-encoded at 40
    let jpeg = write_noisy_image(dir.path(), "noisy.jpg", 48, 48, ImageFormat::Jpeg);
    let result = engine
        .process_one(&jpeg, Region::new(4, 4, 8, 8), &RemovalOptions::default())
        .await
        .unwrap();

    let source_len = std::fs::metadata(&jpeg).unwrap().len();
    let output_len = std::fs::metadata(&result.output_path).unwrap().len();
    assert_eq!(result.original_size_bytes, source_len);
    assert_eq!(result.processed_size_bytes, output_len);
    assert!(result.processed_size_bytes < result.original_size_bytes);

    let expected = ((1.0 - output_len as f64 / source_len as f64) * 100.0).round() as i64;
    assert_eq!(result.size_reduction_percent(), expected);
}

#[tokio::test]
async fn test_lossless_override_for_jpeg() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let input = write_test_image(dir.path(), "photo.jpg", 40, 40, ImageFormat::Jpeg);
    let options = RemovalOptions::builder().lossless(true).build().unwrap();

    let result = engine
        .process_one(&input, Region::new(5, 5, 10, 10), &options)
        .await
        .unwrap();

    assert_eq!(result.output_path.extension().unwrap(), "png");
    assert!(result.preview.unwrap().starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_local_inpainting_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let input = write_test_image(dir.path(), "photo.png", 50, 50, ImageFormat::Png);
    let options = RemovalOptions::builder()
        .dilate_pixels(4)
        .inpaint_radius(6.0)
        .build()
        .unwrap();

    let first = engine
        .process_one(&input, Region::new(12, 20, 15, 6), &options)
        .await
        .unwrap();
    let second = engine
        .process_one(&input, Region::new(12, 20, 15, 6), &options)
        .await
        .unwrap();

    assert_ne!(first.output_path, second.output_path);
    assert_eq!(
        std::fs::read(&first.output_path).unwrap(),
        std::fs::read(&second.output_path).unwrap()
    );
}

#[tokio::test]
async fn test_region_policy() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let input = write_test_image(dir.path(), "square.png", 100, 100, ImageFormat::Png);

    let clamped = engine
        .process_one(&input, Region::new(90, 90, 20, 20), &RemovalOptions::default())
        .await
        .unwrap();
    let output = image::open(&clamped.output_path).unwrap();
    assert_eq!(output.dimensions(), (100, 100));

    let err = engine
        .process_one(&input, Region::new(10, 10, 0, 5), &RemovalOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = engine
        .process_one(&input, Region::new(100, 0, 5, 5), &RemovalOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_export_copies_scratch_file() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let input = write_test_image(dir.path(), "photo.png", 30, 30, ImageFormat::Png);

    let result = engine
        .process_one(&input, Region::new(1, 1, 5, 5), &RemovalOptions::default())
        .await
        .unwrap();
    let destination = dir.path().join("exports").join("clean.png");
    let copied = engine.export(&result.output_path, &destination).await.unwrap();

    assert_eq!(copied, result.processed_size_bytes);
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        std::fs::read(&result.output_path).unwrap()
    );
    assert!(engine.scratch().is_registered(&result.output_path));

    engine.cleanup_all().unwrap();
    assert!(destination.exists());
}

#[tokio::test]
async fn test_new_session_sweeps_orphans() {
    let dir = TempDir::new().unwrap();
    let scratch = dir.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();
    std::fs::write(scratch.join("processed_orphan_1.png"), b"left behind").unwrap();

    let engine = local_engine(dir.path());

    assert!(!scratch.join("processed_orphan_1.png").exists());
    assert_eq!(engine.scratch().root(), scratch.as_path());
    assert_eq!(engine.scratch().dir().parent(), Some(scratch.as_path()));
    assert_eq!(scratch_config(dir.path()).scratch_dir(), scratch);
}

#[tokio::test]
async fn test_new_session_keeps_live_session_outputs() {
    let dir = TempDir::new().unwrap();
    let first = local_engine(dir.path());
    let input = write_test_image(dir.path(), "photo.png", 30, 30, ImageFormat::Png);
    let result = first
        .process_one(&input, Region::new(2, 2, 6, 6), &RemovalOptions::default())
        .await
        .unwrap();

    let second = local_engine(dir.path());
    assert_ne!(first.scratch().dir(), second.scratch().dir());
    assert!(result.output_path.exists());
    assert!(first.scratch().is_registered(&result.output_path));

    second.cleanup_all().unwrap();
    assert!(result.output_path.exists());

    drop(first);
    let third = local_engine(dir.path());
    assert!(!result.output_path.exists());
    assert!(files_in(third.scratch().dir()).is_empty());
    drop(second);
}

#[tokio::test]
async fn test_cloud_result_is_resized_to_source() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(
        dir.path(),
        Arc::new(PatchInpainter::new()),
        Arc::new(FakeCloud::scaling(2)),
        Arc::new(MemoryCredentialStore::with_key("secret")),
        MemoryCodec::new(1),
    );
    let input = write_test_image(dir.path(), "photo.png", 30, 20, ImageFormat::Png);
    let options = RemovalOptions::builder()
        .method(RemovalMethod::Cloud)
        .build()
        .unwrap();

    let result = engine
        .process_one(&input, Region::new(2, 2, 6, 6), &options)
        .await
        .unwrap();

    let output = image::open(&result.output_path).unwrap();
    assert_eq!(output.dimensions(), (30, 20));
}

#[tokio::test]
async fn test_cloud_failure_kind_is_preserved() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with(
        dir.path(),
        Arc::new(PatchInpainter::new()),
        Arc::new(FakeCloud::failing_at(0, CloudError::unauthorized("API key not valid"))),
        Arc::new(MemoryCredentialStore::with_key("bad")),
        MemoryCodec::new(1),
    );
    let input = write_test_image(dir.path(), "photo.png", 20, 20, ImageFormat::Png);
    let options = RemovalOptions::builder()
        .method(RemovalMethod::Cloud)
        .build()
        .unwrap();

    let err = engine
        .process_one(&input, Region::new(0, 0, 4, 4), &options)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cloud(CloudErrorKind::Unauthorized));
    assert!(err.to_string().contains("API key not valid"));
    assert!(engine.scratch().registered().is_empty());
}

#[tokio::test]
async fn test_api_key_lifecycle() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());

    assert!(!engine.api_key_configured());
    assert!(matches!(
        engine.test_cloud_connection().await.unwrap_err(),
        RemovalError::MissingCredential
    ));
    assert!(engine.set_api_key("   ").is_err());

    engine.set_api_key("secret").unwrap();
    assert!(engine.api_key_configured());
    assert!(engine.test_cloud_connection().await.unwrap());
    assert_eq!(engine.list_cloud_models().await.unwrap(), vec!["models/fake-image"]);

    engine.clear_api_key().unwrap();
    assert!(!engine.api_key_configured());
}

#[tokio::test]
async fn test_image_info() {
    let dir = TempDir::new().unwrap();
    let engine = local_engine(dir.path());
    let input = write_test_image(dir.path(), "photo.tiff", 33, 21, ImageFormat::Tiff);

    let info = engine.image_info(&input).unwrap();
    assert_eq!((info.width, info.height), (33, 21));
    assert_eq!(info.path, input);

    assert_eq!(
        engine.image_info(dir.path().join("missing.png")).unwrap_err().kind(),
        ErrorKind::Io
    );
}
