use pano_geometry::HomographyError;
use pano_image::{Image, ImageSize};
use pano_imgproc::crop::crop_region;
use pano_stitch::{
    compositor::trim_borders, stitch_sequence, warper::project_corners, PanoramaBuilder,
    StitchConfig, StitchFailure,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A scene of random overlapping rectangles on a gray background.
///
/// Every channel value is non-zero so that no scene pixel reads as background.
fn synthetic_scene(width: usize, height: usize, seed: u64) -> Image<u8, 3> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = Image::<u8, 3>::from_size_val([width, height].into(), 60).unwrap();

    for _ in 0..(width * height / 400) {
        let w = rng.random_range(6..36);
        let h = rng.random_range(6..36);
        let x0 = rng.random_range(0..width - w);
        let y0 = rng.random_range(0..height - h);
        let color = [
            rng.random_range(20..=255u8),
            rng.random_range(20..=255u8),
            rng.random_range(20..=255u8),
        ];
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                scene.set_pixel(x, y, color).unwrap();
            }
        }
    }

    scene
}

fn config() -> StitchConfig {
    StitchConfig::default()
        .with_max_features(500)
        .with_random_seed(Some(7))
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn identical_frames() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let frame = crop_region(&synthetic_scene(320, 240, 1), 20, 20, 240, 180)?;

    let panorama = stitch_sequence(&[frame.clone(), frame.clone()], &config())?;

    let diagnostics = &panorama.diagnostics()[0];
    assert!(diagnostics.inlier_ratio() > 0.9);
    assert!(diagnostics.mean_reprojection_error.ok_or("missing error")? < 0.1);

    let area = panorama.size().area() as f64;
    let expected = frame.size().area() as f64;
    assert!((area - expected).abs() / expected < 0.02);
    Ok(())
}

#[test]
fn three_frames_with_chained_overlap() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let scene = synthetic_scene(400, 200, 2);
    let frames = [0, 100, 200]
        .iter()
        .map(|&x| crop_region(&scene, x, 20, 200, 160))
        .collect::<Result<Vec<_>, _>>()?;

    let panorama = stitch_sequence(&frames, &config())?;

    assert_eq!(panorama.diagnostics().len(), 2);
    for (i, diagnostics) in panorama.diagnostics().iter().enumerate() {
        assert_eq!(diagnostics.index, i + 1);
        assert!(diagnostics.inliers.ok_or("missing inliers")? >= 15);
        assert!(diagnostics.mean_reprojection_error.ok_or("missing error")? < 1.0);
    }

    // the third frame lands on the right third of the scene, errors of the
    // first stitch must not leak into the second
    let homography = panorama.diagnostics()[1]
        .homography
        .ok_or("missing homography")?;
    let corners = project_corners(&homography, frames[2].size())?;
    let expected = [(200.0, 0.0), (400.0, 0.0), (400.0, 160.0), (200.0, 160.0)];
    for (corner, (x, y)) in corners.iter().zip(expected) {
        assert!((corner.x - x).abs() < 2.0, "corner {corner}");
        assert!((corner.y - y).abs() < 3.0, "corner {corner}");
    }

    let ImageSize { width, height } = panorama.size();
    assert!((390..=410).contains(&width), "width {width}");
    assert!((155..=165).contains(&height), "height {height}");
    Ok(())
}

#[test]
fn textureless_frame_stops_the_sequence() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let scene = synthetic_scene(400, 200, 3);
    let first = crop_region(&scene, 0, 20, 200, 160)?;
    let blank = Image::<u8, 3>::from_size_val([200, 160].into(), 128)?;
    let third = crop_region(&scene, 100, 20, 200, 160)?;

    let err = stitch_sequence(&[first.clone(), blank, third], &config())
        .err()
        .ok_or("stitching a blank frame must fail")?;

    assert_eq!(err.failed_index, 1);
    assert!(matches!(
        err.reason,
        StitchFailure::InsufficientMatches { found: 0, .. }
    ));
    let partial = err.partial.ok_or("missing partial panorama")?;
    assert_eq!(partial.image(), &first);
    Ok(())
}

#[test]
fn failed_estimation_reports_the_attempt() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    // unrelated scenes: a loose ratio test lets random matches through, but no
    // homography explains them
    let anchor = crop_region(&synthetic_scene(320, 200, 8), 0, 20, 200, 160)?;
    let contributor = crop_region(&synthetic_scene(320, 200, 9), 0, 20, 200, 160)?;
    let config = config()
        .with_ratio_threshold(0.95)
        .with_ransac_tolerance(0.5);

    let err = stitch_sequence(&[anchor.clone(), contributor], &config)
        .err()
        .ok_or("unrelated frames must not stitch")?;

    assert_eq!(err.failed_index, 1);
    assert!(err.reason.is_homography_failure());
    let found = match err.reason {
        StitchFailure::Homography(HomographyError::InsufficientInliers { found, required }) => {
            assert_eq!(required, 15);
            found
        }
        other => return Err(format!("unexpected failure {other}").into()),
    };

    let attempt = err.attempt.ok_or("missing attempt diagnostics")?;
    assert_eq!(attempt.index, 1);
    assert!(attempt.anchor_keypoints > 0 && attempt.contributor_keypoints > 0);
    assert!(attempt.matches >= 15, "matches {}", attempt.matches);
    assert_eq!(attempt.inliers, Some(found));
    assert_eq!(attempt.homography, None);
    assert_eq!(attempt.canvas_size, None);

    let partial = err.partial.ok_or("missing partial panorama")?;
    assert_eq!(partial.image(), &anchor);
    Ok(())
}

#[test]
fn contributor_projects_to_the_right_of_the_anchor() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let scene = synthetic_scene(320, 200, 4);
    let anchor = crop_region(&scene, 0, 20, 200, 160)?;
    let contributor = crop_region(&scene, 60, 20, 200, 160)?;

    let builder = PanoramaBuilder::new(config())?;
    let (_, diagnostics) = builder.stitch_pair(&anchor, &contributor)?;

    let homography = diagnostics.homography.ok_or("missing homography")?;
    let corners = project_corners(&homography, contributor.size())?;
    let expected = [(60.0, 0.0), (260.0, 0.0), (260.0, 160.0), (60.0, 160.0)];
    for (corner, (x, y)) in corners.iter().zip(expected) {
        assert!((corner.x - x).abs() < 2.0, "corner {corner}");
        assert!((corner.y - y).abs() < 2.0, "corner {corner}");
    }
    Ok(())
}

#[test]
fn overlap_keeps_anchor_pixels() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let scene = synthetic_scene(320, 200, 5);
    let anchor = crop_region(&scene, 0, 20, 200, 160)?;
    let contributor = crop_region(&scene, 80, 20, 200, 160)?;

    let builder = PanoramaBuilder::new(config())?;
    let (result, _) = builder.stitch_pair(&anchor, &contributor)?;

    // the canvas may gain a row or column from rounding the projected corners
    let found = (0..=2).any(|ty| {
        (0..=2).any(|tx| {
            crop_region(&result, tx, ty, anchor.width(), anchor.height())
                .map(|window| window == anchor)
                .unwrap_or(false)
        })
    });
    assert!(found, "anchor not found verbatim in the result");

    assert_eq!(trim_borders(&result)?, result);
    Ok(())
}

#[test]
fn seeded_runs_are_reproducible() -> Result<(), Box<dyn std::error::Error>> {
    let scene = synthetic_scene(320, 200, 6);
    let frames = [
        crop_region(&scene, 0, 20, 200, 160)?,
        crop_region(&scene, 90, 20, 200, 160)?,
    ];

    let first = stitch_sequence(&frames, &config())?;
    let second = stitch_sequence(&frames, &config().with_parallel_extraction(false))?;
    assert_eq!(first.image(), second.image());
    assert_eq!(first.diagnostics(), second.diagnostics());
    Ok(())
}
