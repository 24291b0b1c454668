//! Whole-pipeline scenarios against the real backend and the zip sink.

use batch_upscale::batch::{Batch, StatusKind, Submission, SubmitError};
use batch_upscale::config::load_config;
use batch_upscale::export::ArchiveExporter;
use batch_upscale::imaging::read_density;
use batch_upscale::orchestrator::{CancelFlag, RunOptions, run_batch};
use batch_upscale::scan::scan;
use batch_upscale::settings::{Density, Settings, SettingsPatch, UpscaleFactor};
use chrono::NaiveDate;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::{Cursor, Read};
use tempfile::TempDir;

/// A sprite with a transparent diagonal and opaque color everywhere else.
/// The transparent pixels carry bright red RGB that must never show up.
fn sprite(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if x == y {
            Rgba([255, 0, 0, 0])
        } else {
            Rgba([20, 90, 200, 255])
        }
    })
}

fn png(img: &RgbaImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn submission(name: &str, img: &RgbaImage) -> Submission {
    Submission {
        name: name.to_string(),
        bytes: png(img),
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

#[test]
fn three_transparent_pngs_upscale_and_bundle() {
    let sources = [
        ("logo.png", sprite(6, 6)),
        ("badge.png", sprite(5, 3)),
        ("icon.png", sprite(4, 7)),
    ];
    let mut batch = Batch::new(Settings::default(), 20);
    let report = batch
        .submit(sources.iter().map(|(n, img)| submission(n, img)).collect())
        .unwrap();
    assert_eq!(report.accepted.len(), 3);
    assert!(report.rejected.is_empty());

    batch.apply_batch_settings(&SettingsPatch {
        upscale_factor: Some(UpscaleFactor::X4),
        target_density: Some(Density::PRINT),
        preserve_style: Some(true),
        enabled: None,
    });

    let summary = run_batch(&mut batch, &RunOptions::default(), None, &CancelFlag::new()).unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);

    for (item, (_, src)) in batch.items().iter().zip(&sources) {
        assert_eq!(item.status.kind(), StatusKind::Completed);
        let output = item.output().unwrap();
        assert_eq!(output.dimensions.width, src.width() * 4);
        assert_eq!(output.dimensions.height, src.height() * 4);
        assert!(output.density_written);

        let bytes = output.data.fetch().unwrap();
        assert_eq!(read_density(&bytes), Some(Density::PRINT));

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (src.width() * 4, src.height() * 4));
        for (x, y, px) in src.enumerate_pixels() {
            if px[3] != 0 {
                continue;
            }
            for dy in 0..4 {
                for dx in 0..4 {
                    let out = decoded.get_pixel(x * 4 + dx, y * 4 + dy);
                    assert_eq!(out[3], 0, "opaque leak at ({}, {})", x * 4 + dx, y * 4 + dy);
                }
            }
        }
        // Hidden red never tints visible pixels
        assert!(decoded.pixels().filter(|p| p[3] > 0).all(|p| p[0] < 128));
    }

    let exporter = ArchiveExporter::zip("_UPSCALED", "batch-upscale");
    let bundle = exporter.export(batch.items(), date()).unwrap().unwrap();
    assert_eq!(bundle.name, "batch-upscale_2026-10-16.zip");

    let mut archive = zip::ZipArchive::new(Cursor::new(bundle.bytes)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["logo_UPSCALED.png", "badge_UPSCALED.png", "icon_UPSCALED.png"]
    );
    let mut first = Vec::new();
    archive.by_index(0).unwrap().read_to_end(&mut first).unwrap();
    assert_eq!(read_density(&first), Some(Density::PRINT));
}

#[test]
fn full_batch_rejects_one_more() {
    let img = sprite(2, 2);
    let mut batch = Batch::new(Settings::default(), 3);
    batch
        .submit(vec![
            submission("a.png", &img),
            submission("b.png", &img),
            submission("c.png", &img),
        ])
        .unwrap();
    let before: Vec<_> = batch.items().iter().map(|i| (i.id, i.name.clone())).collect();

    let err = batch.submit(vec![submission("d.png", &img)]).unwrap_err();
    assert_eq!(
        err,
        SubmitError::CapacityExceeded {
            present: 3,
            incoming: 1,
            max: 3
        }
    );
    let after: Vec<_> = batch.items().iter().map(|i| (i.id, i.name.clone())).collect();
    assert_eq!(before, after);
}

#[test]
fn corrupt_file_fails_alone_and_export_skips_it() {
    let img = sprite(3, 3);
    let mut batch = Batch::default();
    batch
        .submit(vec![
            submission("good.png", &img),
            Submission {
                name: "broken.png".into(),
                bytes: b"\x89PNG\r\n\x1a\nnot really".to_vec(),
            },
            submission("fine.png", &img),
        ])
        .unwrap();

    let summary = run_batch(&mut batch, &RunOptions::default(), None, &CancelFlag::new()).unwrap();
    assert_eq!((summary.completed, summary.failed), (2, 1));
    assert_eq!(batch.items()[1].status.kind(), StatusKind::Error);

    let bundle = ArchiveExporter::zip("_UPSCALED", "batch-upscale")
        .export(batch.items(), date())
        .unwrap()
        .unwrap();
    assert_eq!(bundle.entries, vec!["good_UPSCALED.png", "fine_UPSCALED.png"]);
}

#[test]
fn directory_with_config_and_sidecar_runs_to_disk() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    std::fs::write(
        input.path().join("config.toml"),
        "[defaults]\nupscale_factor = 2\ntarget_density = 150\n",
    )
    .unwrap();
    std::fs::write(input.path().join("a.png"), png(&sprite(4, 4))).unwrap();
    std::fs::write(input.path().join("b.png"), png(&sprite(4, 4))).unwrap();
    std::fs::write(input.path().join("b.upscale.toml"), "upscale_factor = 8\n").unwrap();
    std::fs::write(input.path().join("readme.txt"), "not an image").unwrap();

    let config = load_config(input.path()).unwrap();
    let mut intake = scan(input.path(), false).unwrap();
    let mut batch = Batch::new(config.defaults, config.batch.max_items);
    let report = batch.submit(std::mem::take(&mut intake.submissions)).unwrap();
    assert_eq!(report.rejected, vec!["readme.txt"]);
    assert_eq!(intake.apply_sidecars(&mut batch, &report.accepted), 1);

    let options = RunOptions {
        output_dir: Some(out.path().to_path_buf()),
        max_output_pixels: config.batch.max_output_pixels(),
        file_suffix: config.export.file_suffix.clone(),
        stop_on_failure: false,
    };
    run_batch(&mut batch, &options, None, &CancelFlag::new()).unwrap();

    let a = std::fs::read(out.path().join("a_UPSCALED.png")).unwrap();
    let b = std::fs::read(out.path().join("b_UPSCALED.png")).unwrap();
    assert_eq!(read_density(&a), Some(Density::DRAFT));
    assert_eq!(image::load_from_memory(&a).unwrap().width(), 8);
    assert_eq!(image::load_from_memory(&b).unwrap().width(), 32);
}

#[test]
fn pixel_budget_fails_oversized_items() {
    let mut batch = Batch::default();
    batch
        .submit(vec![submission("big.png", &sprite(10, 10))])
        .unwrap();
    batch.apply_batch_settings(&SettingsPatch::factor(UpscaleFactor::X8));
    let options = RunOptions {
        max_output_pixels: Some(1_000),
        ..RunOptions::default()
    };
    let summary = run_batch(&mut batch, &options, None, &CancelFlag::new()).unwrap();
    assert_eq!(summary.failed, 1);
    assert!(batch.items()[0].output().is_none());
}
