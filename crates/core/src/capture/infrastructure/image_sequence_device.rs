use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::capture::domain::frame_device::{DeviceError, FrameDevice};
use crate::shared::cancellation::CancelToken;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Plays a directory of still images as a camera.
///
/// Files are decoded lazily, one per `grab`, in lexical path order and paced
/// to the configured frame rate. With `looped` the sequence restarts after
/// the last image; otherwise the device reports a disconnect at the end.
pub struct ImageSequenceDevice {
    directory: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    looped: bool,
    frame_interval: Duration,
    last_grab: Option<Instant>,
    next_index: u64,
}

impl ImageSequenceDevice {
    pub fn open(directory: &Path, fps: u32, looped: bool) -> Result<Self, DeviceError> {
        let files = list_images(directory)?;
        if files.is_empty() {
            return Err(DeviceError::Unavailable(format!(
                "no images found in {}",
                directory.display()
            )));
        }
        log::info!(
            "Image sequence opened: {} frames from {} @ {} fps",
            files.len(),
            directory.display(),
            fps
        );
        Ok(Self {
            directory: directory.to_path_buf(),
            files,
            position: 0,
            looped,
            frame_interval: Duration::from_millis(1000 / fps.max(1) as u64),
            last_grab: None,
            next_index: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn wait_for_next_slot(&self, cancel: &CancelToken) -> Result<(), DeviceError> {
        if let Some(last) = self.last_grab {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval && !cancel.sleep(self.frame_interval - elapsed) {
                return Err(DeviceError::Interrupted);
            }
        }
        if cancel.is_cancelled() {
            return Err(DeviceError::Interrupted);
        }
        Ok(())
    }
}

impl FrameDevice for ImageSequenceDevice {
    fn grab(&mut self, cancel: &CancelToken) -> Result<Frame, DeviceError> {
        if self.position >= self.files.len() {
            if !self.looped {
                return Err(DeviceError::Disconnected(format!(
                    "end of image sequence in {}",
                    self.directory.display()
                )));
            }
            self.position = 0;
        }

        self.wait_for_next_slot(cancel)?;

        let path = &self.files[self.position];
        let image = image::open(path).map_err(|source| DeviceError::Decode {
            path: path.clone(),
            source,
        })?;
        self.position += 1;
        self.last_grab = Some(Instant::now());

        let frame = Frame::from_image(&image, self.next_index);
        self.next_index += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.directory.display())
    }
}

fn list_images(directory: &Path) -> Result<Vec<PathBuf>, DeviceError> {
    let entries = fs::read_dir(directory).map_err(|e| {
        DeviceError::Unavailable(format!("cannot read {}: {e}", directory.display()))
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    files.sort();
    Ok(files)
}

pub(crate) fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
