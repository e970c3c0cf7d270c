use deskew::binarize::{binarize, foreground_bounds};
use deskew::{
    crop_image, estimate_skew, load, plan_crop, rotate, save, CropConfig, Depth, EdgeClean, Raster,
    Rectangle, SkewConfig,
};
use image::{GrayImage, Luma};

const BASELINE_CONFIDENCE: f32 = 2.0;

/// Bilevel page with lines of "words" inside `margin`
fn text_page(width: u32, height: u32, margin: u32) -> Raster {
    let img = GrayImage::from_fn(width, height, |x, y| {
        let in_body = x >= margin && x < width - margin && y >= margin && y < height - margin;
        let ink = in_body && (y - margin) % 60 < 16 && (x / 60) % 6 != 5;
        Luma([if ink { 0 } else { 255 }])
    });
    Raster::binary(img)
}

/// Scanner shadow on the left edge plus specks along the top and right edges
fn add_border_noise(raster: Raster) -> Raster {
    let Raster::Binary(mut img) = raster else {
        panic!("expected a binary page");
    };
    let (width, height) = img.dimensions();
    for y in 0..height {
        for x in 0..12 {
            img.put_pixel(x, y, Luma([0]));
        }
    }
    for speck in 0..8 {
        let x0 = 150 + speck * 220;
        for y in 0..4 {
            for x in x0..x0 + 3 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }
    for y in 1300..1306 {
        for x in width - 25..width - 15 {
            img.put_pixel(x, y, Luma([0]));
        }
    }
    Raster::Binary(img)
}

fn contains(outer: &Rectangle, inner: &Rectangle) -> bool {
    outer.x <= inner.x
        && outer.y <= inner.y
        && outer.right() >= inner.right()
        && outer.bottom() >= inner.bottom()
}

#[test]
fn test_skewed_noisy_page_end_to_end() {
    let clean = rotate(&text_page(2000, 2800, 200), 3.2).unwrap();
    let content = foreground_bounds(&binarize(&clean, 0)).unwrap();
    let page = add_border_noise(clean);

    let skew_config = SkewConfig {
        sweep_range: 10.0,
        sweep_delta: 1.0,
        ..SkewConfig::default()
    };
    let skew = estimate_skew(&page, &skew_config, false).unwrap();
    assert!(
        (3.1..=3.3).contains(&skew.angle),
        "angle {} outside [3.1, 3.3]",
        skew.angle
    );
    assert!(
        skew.confidence > BASELINE_CONFIDENCE,
        "confidence {}",
        skew.confidence
    );
    assert!(skew.meets(BASELINE_CONFIDENCE as f64));

    let crop_config = CropConfig {
        margin_clear_lr: 20,
        margin_clear_tb: 20,
        edge_clean: EdgeClean::SideNoise,
        padding_lr: 10,
        padding_tb: 10,
        max_widen: 0.02,
    };
    let rect = plan_crop(&page, &crop_config).unwrap();
    assert!(rect.width > 0 && rect.height > 0);
    assert!(rect.width <= 2000 - 2 * 20 + 2 * 10);
    assert!(rect.height <= 2800 - 2 * 20 + 2 * 10);
    assert!(contains(&rect, &content), "{rect:?} misses {content:?}");
    // Noise must not stretch the crop to the page edges
    assert!(rect.x > 20 && rect.y > 20);
    assert!(rect.right() < 2000 - 20 && rect.bottom() < 2800 - 20);

    let (cropped, extracted_rect) = crop_image(&page, &crop_config).unwrap();
    assert_eq!(extracted_rect, rect);
    assert_eq!(cropped.dimensions(), (rect.width, rect.height));

    let corrected = skew.correct(&cropped).unwrap();
    assert_eq!(corrected.depth(), Depth::Binary);
    assert_eq!(corrected.dimensions(), cropped.dimensions());
}

#[test]
fn test_angles_between_sweep_steps_on_several_page_sizes() {
    let config = SkewConfig::default();
    let tolerance = config.sweep_delta / 10.0;

    for (width, height, angle) in [
        (800, 1000, 0.55),
        (800, 1000, 3.2),
        (800, 1000, 3.25),
        (1200, 900, -1.85),
        (600, 900, -4.45),
    ] {
        let page = rotate(&text_page(width, height, 80), angle as f64).unwrap();
        let skew = estimate_skew(&page, &config, false).unwrap();
        assert!(
            (skew.angle - angle).abs() <= tolerance,
            "{width}x{height} at {angle}: got {}",
            skew.angle
        );
        assert!(skew.confidence > BASELINE_CONFIDENCE);
    }
}

#[test]
fn test_repeated_runs_are_bit_identical() {
    let page = add_border_noise(rotate(&text_page(2000, 2800, 200), -1.4).unwrap());
    let config = SkewConfig::default();
    let crop_config = CropConfig {
        margin_clear_lr: 20,
        margin_clear_tb: 20,
        edge_clean: EdgeClean::MaxAggressive,
        padding_lr: 10,
        padding_tb: 10,
        max_widen: 0.02,
    };

    let first = estimate_skew(&page, &config, false).unwrap();
    let second = estimate_skew(&page, &config, false).unwrap();
    assert_eq!(first.angle.to_bits(), second.angle.to_bits());
    assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());

    assert_eq!(
        plan_crop(&page, &crop_config).unwrap(),
        plan_crop(&page, &crop_config).unwrap()
    );
}

#[test]
fn test_file_round_trip_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");
    let output = dir.path().join("deskewed.tiff");

    save(rotate(&text_page(800, 1000, 80), -2.0).unwrap(), &input, None).unwrap();

    let raster = load(&input).unwrap();
    assert_eq!(raster.depth(), Depth::Binary);

    let skew = estimate_skew(&raster, &SkewConfig::default(), true).unwrap();
    assert!((skew.angle + 2.0).abs() <= 0.1, "angle {}", skew.angle);

    let rotated = skew.rotated.expect("rotation was requested");
    assert_eq!(rotated.dimensions(), (800, 1000));
    save(rotated, &output, None).unwrap();

    let written = load(&output).unwrap();
    assert_eq!(written.dimensions(), (800, 1000));
}

#[test]
fn test_blank_page_has_no_skew_or_crop() {
    let blank = Raster::Gray(GrayImage::from_pixel(300, 400, Luma([255])));
    // Paper grain only, no ink
    let textured = Raster::Gray(GrayImage::from_fn(200, 150, |x, y| {
        Luma([250 + ((x * 3 + y * 5) % 6) as u8])
    }));

    for page in [blank, textured] {
        assert!(matches!(
            estimate_skew(&page, &SkewConfig::default(), true),
            Err(deskew::DeskewError::SkewDetectionFailed(_))
        ));
        assert!(matches!(
            plan_crop(&page, &CropConfig::default()),
            Err(deskew::DeskewError::InvalidCropRegion(_))
        ));
    }
}
