use argh::FromArgs;
use std::path::{Path, PathBuf};

use pano::image::Image;
use pano::stitch::{Command, Event, Session, StitchConfig, StitchFailure};

#[derive(FromArgs)]
/// Stitch a sequence of overlapping images into a panorama
struct Args {
    /// paths to the input images, in stitching order
    #[argh(positional)]
    images: Vec<PathBuf>,

    /// path to the output panorama (PNG or JPEG by extension)
    #[argh(option, short = 'o', default = "PathBuf::from(\"panorama.png\")")]
    output: PathBuf,

    /// path to a JSON stitching configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// ratio test threshold
    #[argh(option)]
    ratio: Option<f32>,

    /// minimum number of matches per pair
    #[argh(option)]
    min_matches: Option<usize>,

    /// maximum number of keypoints per image
    #[argh(option)]
    max_features: Option<usize>,

    /// RANSAC inlier threshold in pixels
    #[argh(option)]
    tolerance: Option<f64>,

    /// seed for RANSAC sampling
    #[argh(option)]
    seed: Option<u64>,

    /// extract features frame by frame instead of all at once
    #[argh(switch)]
    sequential: bool,
}

fn read_rgb8(path: &Path) -> Result<Image<u8, 3>, Box<dyn std::error::Error>> {
    let rgb = image::open(path)?.into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Image::new(
        [width as usize, height as usize].into(),
        rgb.into_raw(),
    )?)
}

fn write_rgb8(path: &Path, image: Image<u8, 3>) -> Result<(), Box<dyn std::error::Error>> {
    let (width, height) = (image.width() as u32, image.height() as u32);
    let buffer = image::RgbImage::from_raw(width, height, image.into_vec())
        .ok_or("panorama buffer does not match its size")?;
    buffer.save(path)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => StitchConfig::from_json_file(path)?,
        None => StitchConfig::default(),
    };
    if let Some(ratio) = args.ratio {
        config = config.with_ratio_threshold(ratio);
    }
    if let Some(min_matches) = args.min_matches {
        config = config.with_min_match_count(min_matches);
    }
    if let Some(max_features) = args.max_features {
        config = config.with_max_features(max_features);
    }
    if let Some(tolerance) = args.tolerance {
        config = config.with_ransac_tolerance(tolerance);
    }
    if args.seed.is_some() {
        config = config.with_random_seed(args.seed);
    }
    if args.sequential {
        config = config.with_parallel_extraction(false);
    }

    let mut session = Session::new(config)?;

    for path in &args.images {
        let frame = read_rgb8(path)?;
        log::info!("read {} ({})", path.display(), frame.size());
        (session, _) = session.apply(Command::Capture(frame));
    }

    let (_, event) = session.apply(Command::Stitch);

    match event {
        Event::Stitched(panorama) => {
            for diagnostics in panorama.diagnostics() {
                println!("{diagnostics}");
            }
            let size = panorama.size();
            write_rgb8(&args.output, panorama.into_image())?;
            println!("panorama {size} written to {}", args.output.display());
        }
        Event::StitchFailed(err) => {
            eprintln!("{err}");
            if let Some(attempt) = &err.attempt {
                eprintln!("failed {attempt}");
            }
            if err.reason.is_homography_failure() {
                eprintln!("hint: the overlap may be too small, try a larger --tolerance");
            } else if let StitchFailure::InsufficientMatches { .. } = err.reason {
                eprintln!("hint: try a looser --ratio or a lower --min-matches");
            }
            if let Some(partial) = err.partial {
                for diagnostics in partial.diagnostics() {
                    println!("{diagnostics}");
                }
                let size = partial.size();
                write_rgb8(&args.output, partial.into_image())?;
                println!("partial panorama {size} written to {}", args.output.display());
            }
            std::process::exit(1);
        }
        Event::NeedMoreFrames { count } => {
            eprintln!("at least 2 images are required, got {count}");
            std::process::exit(1);
        }
        _ => {}
    }

    Ok(())
}
