use std::sync::Arc;

use log::{debug, info};
use pano_image::Image;

use crate::{
    builder::{stitch_sequence, Panorama},
    config::{ConfigError, StitchConfig},
    error::StitchError,
};

/// An input to a [`Session`].
#[derive(Debug, Clone)]
pub enum Command {
    /// Append a frame to the capture list.
    Capture(Image<u8, 3>),
    /// Stitch every captured frame, in capture order.
    Stitch,
    /// Drop the captured frames and the last panorama.
    Reset,
    /// Shift the ratio threshold, clamped to `[0.1, 0.95]`.
    AdjustRatio(f32),
}

/// The outcome of applying a [`Command`].
#[derive(Debug)]
pub enum Event {
    /// A frame was captured.
    Captured {
        /// Number of frames captured so far.
        count: usize,
    },
    /// Stitching needs at least two frames.
    NeedMoreFrames {
        /// Number of frames captured so far.
        count: usize,
    },
    /// The captured frames were stitched.
    Stitched(Panorama),
    /// Stitching stopped early.
    StitchFailed(StitchError),
    /// Frames and panorama were dropped.
    Cleared,
    /// The ratio threshold changed.
    RatioChanged(f32),
}

/// Capture state of an interactive stitching loop.
///
/// A session is a value: [`Session::apply`] consumes it and returns the next
/// one. Captured frames are shared between successive sessions.
///
/// # Example
///
/// ```
/// use pano_image::Image;
/// use pano_stitch::{Command, Event, Session, StitchConfig};
///
/// let session = Session::new(StitchConfig::default()).unwrap();
/// let frame = Image::<u8, 3>::from_size_val([32, 32].into(), 0).unwrap();
///
/// let (session, event) = session.apply(Command::Capture(frame));
/// assert!(matches!(event, Event::Captured { count: 1 }));
///
/// let (_, event) = session.apply(Command::Stitch);
/// assert!(matches!(event, Event::NeedMoreFrames { count: 1 }));
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    config: StitchConfig,
    frames: Arc<Vec<Image<u8, 3>>>,
    last_panorama: Option<Panorama>,
}

impl Session {
    /// Start an empty session.
    pub fn new(config: StitchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            frames: Arc::new(Vec::new()),
            last_panorama: None,
        })
    }

    /// The configuration used for the next stitch.
    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// The captured frames.
    pub fn frames(&self) -> &[Image<u8, 3>] {
        &self.frames
    }

    /// The panorama of the last successful stitch.
    pub fn last_panorama(&self) -> Option<&Panorama> {
        self.last_panorama.as_ref()
    }

    /// Apply a command and return the next session with the resulting event.
    pub fn apply(self, command: Command) -> (Session, Event) {
        let Session {
            mut config,
            mut frames,
            mut last_panorama,
        } = self;

        let event = match command {
            Command::Capture(frame) => {
                Arc::make_mut(&mut frames).push(frame);
                debug!("captured frame {}", frames.len());
                Event::Captured {
                    count: frames.len(),
                }
            }
            Command::Stitch if frames.len() < 2 => Event::NeedMoreFrames {
                count: frames.len(),
            },
            Command::Stitch => match stitch_sequence(&frames, &config) {
                Ok(panorama) => {
                    last_panorama = Some(panorama.clone());
                    Event::Stitched(panorama)
                }
                Err(e) => Event::StitchFailed(e),
            },
            Command::Reset => {
                frames = Arc::new(Vec::new());
                last_panorama = None;
                info!("session cleared");
                Event::Cleared
            }
            Command::AdjustRatio(delta) => {
                config = config.adjust_ratio(delta);
                info!("ratio threshold set to {:.2}", config.ratio_threshold);
                Event::RatioChanged(config.ratio_threshold)
            }
        };

        (
            Session {
                config,
                frames,
                last_panorama,
            },
            event,
        )
    }
}
