use std::path::PathBuf;
use std::sync::Arc;

use image::GrayImage;

use crate::detection::domain::detection_result::SnapshotProvider;
use crate::recognition::infrastructure::image_preprocessor::{ImagePreprocessor, PreprocessError};
use crate::shared::frame::Frame;
use crate::shared::log_sink::LogSink;
use crate::shared::region::Region;

/// Asks the operator for a file name per detected face.
///
/// Receives the face index, its region and the normalized preview; `None`
/// skips the face.
pub trait NameProvider {
    fn name_for(&mut self, index: usize, region: &Region, preview: &GrayImage) -> Option<String>;
}

impl<F> NameProvider for F
where
    F: FnMut(usize, &Region, &GrayImage) -> Option<String>,
{
    fn name_for(&mut self, index: usize, region: &Region, preview: &GrayImage) -> Option<String> {
        self(index, region, preview)
    }
}

/// Fixed file names handed out in detection order; faces past the end of
/// the list are skipped.
pub struct NameList(Vec<String>);

impl NameList {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl NameProvider for NameList {
    fn name_for(&mut self, index: usize, _region: &Region, _preview: &GrayImage) -> Option<String> {
        self.0.get(index).cloned()
    }
}

#[derive(Debug)]
pub enum FaceSaveOutcome {
    Saved(PathBuf),
    Skipped,
    Failed(PreprocessError),
}

#[derive(Debug)]
pub enum CaptureOutcome {
    /// No detection cycle has completed yet.
    NotReady,
    NoFaces,
    /// One outcome per face, in detection order.
    Faces(Vec<(Region, FaceSaveOutcome)>),
}

impl CaptureOutcome {
    pub fn saved_count(&self) -> usize {
        match self {
            Self::Faces(faces) => faces
                .iter()
                .filter(|(_, o)| matches!(o, FaceSaveOutcome::Saved(_)))
                .count(),
            _ => 0,
        }
    }
}

/// Saves the faces of the latest snapshot into the training corpus.
pub struct CaptureTrainingImageUseCase {
    provider: Arc<dyn SnapshotProvider>,
    preprocessor: ImagePreprocessor,
    log: Arc<dyn LogSink>,
}

impl CaptureTrainingImageUseCase {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        preprocessor: ImagePreprocessor,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            provider,
            preprocessor,
            log,
        }
    }

    /// A failure on one face does not stop the others.
    pub fn execute(&self, names: &mut dyn NameProvider) -> CaptureOutcome {
        let Some(snapshot) = self.provider.capture_frame_and_faces() else {
            self.log.log("No frame captured yet");
            return CaptureOutcome::NotReady;
        };
        if !snapshot.has_faces() {
            self.log.log("No faces detected");
            return CaptureOutcome::NoFaces;
        }

        let outcomes = snapshot
            .face_regions()
            .into_iter()
            .enumerate()
            .map(|(index, region)| {
                let outcome = self.save_face(&snapshot.frame.crop(&region), index, &region, names);
                (region, outcome)
            })
            .collect();
        CaptureOutcome::Faces(outcomes)
    }

    fn save_face(
        &self,
        crop: &Frame,
        index: usize,
        region: &Region,
        names: &mut dyn NameProvider,
    ) -> FaceSaveOutcome {
        let preview = match self.preprocessor.process_image(crop) {
            Ok(preview) => preview,
            Err(e) => {
                self.log.log(&format!("Face {}: {e}", index + 1));
                return FaceSaveOutcome::Failed(e);
            }
        };
        let Some(filename) = names.name_for(index, region, &preview) else {
            self.log.log(&format!("Face {}: skipped", index + 1));
            return FaceSaveOutcome::Skipped;
        };
        match self.preprocessor.save_processed(&preview, &filename) {
            Ok(path) => {
                self.log.log(&format!("Saved {}", path.display()));
                FaceSaveOutcome::Saved(path)
            }
            Err(e) => {
                self.log.log(&format!("Could not save {filename}: {e}"));
                FaceSaveOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_result::{
        DetectedFace, DetectionResult, DetectionSnapshot,
    };
    use crate::shared::log_sink::MemoryLogSink;
    use crate::shared::region::FeatureKind;

    struct FixedProvider(Option<DetectionSnapshot>);

    impl SnapshotProvider for FixedProvider {
        fn capture_frame_and_faces(&self) -> Option<DetectionSnapshot> {
            self.0.clone()
        }
    }

    fn snapshot(faces: Vec<Region>) -> DetectionSnapshot {
        let data: Vec<u8> = (0..200 * 100 * 3).map(|i| (i % 251) as u8).collect();
        DetectionSnapshot {
            frame: Arc::new(Frame::new(data, 200, 100, 3, 9)),
            result: Arc::new(DetectionResult::new(
                1,
                faces
                    .into_iter()
                    .map(|f| DetectedFace::new(f, vec![]))
                    .collect(),
            )),
        }
    }

    fn use_case(
        provider: FixedProvider,
        base: &std::path::Path,
    ) -> (CaptureTrainingImageUseCase, Arc<MemoryLogSink>) {
        let sink = Arc::new(MemoryLogSink::new());
        let uc = CaptureTrainingImageUseCase::new(
            Arc::new(provider),
            ImagePreprocessor::default().with_base_path(base),
            sink.clone(),
        );
        (uc, sink)
    }

    #[test]
    fn test_not_ready_before_first_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (uc, _) = use_case(FixedProvider(None), dir.path());
        let mut never = |_: usize, _: &Region, _: &GrayImage| -> Option<String> {
            panic!("no faces to name")
        };
        assert!(matches!(uc.execute(&mut never), CaptureOutcome::NotReady));
    }

    #[test]
    fn test_zero_faces_takes_no_faces_path() {
        let dir = tempfile::tempdir().unwrap();
        let (uc, sink) = use_case(FixedProvider(Some(snapshot(vec![]))), dir.path());
        let mut never = |_: usize, _: &Region, _: &GrayImage| -> Option<String> {
            panic!("no faces to name")
        };
        assert!(matches!(uc.execute(&mut never), CaptureOutcome::NoFaces));
        assert!(sink.contains("No faces detected"));
    }

    #[test]
    fn test_name_list_skips_faces_past_its_end() {
        let dir = tempfile::tempdir().unwrap();
        let faces = vec![
            Region::new(0, 0, 50, 50, FeatureKind::Face),
            Region::new(60, 0, 50, 50, FeatureKind::Face),
        ];
        let (uc, _) = use_case(FixedProvider(Some(snapshot(faces))), dir.path());
        let mut names = NameList::new(vec!["dave.bmp".to_string()]);

        let outcome = uc.execute(&mut names);

        let CaptureOutcome::Faces(faces) = &outcome else {
            panic!("expected faces, got {outcome:?}");
        };
        assert!(matches!(faces[0].1, FaceSaveOutcome::Saved(_)));
        assert!(matches!(faces[1].1, FaceSaveOutcome::Skipped));
        assert!(dir.path().join("dave.bmp").is_file());
    }

    #[test]
    fn test_saved_file_is_the_previewed_image() {
        let dir = tempfile::tempdir().unwrap();
        let faces = vec![Region::new(10, 10, 60, 80, FeatureKind::Face)];
        let (uc, _) = use_case(FixedProvider(Some(snapshot(faces))), dir.path());
        let mut previewed: Option<GrayImage> = None;
        let mut names = |_: usize, _: &Region, preview: &GrayImage| {
            previewed = Some(preview.clone());
            Some("erin.png".to_string())
        };

        let outcome = uc.execute(&mut names);

        assert_eq!(outcome.saved_count(), 1);
        let saved = image::open(dir.path().join("erin.png")).unwrap().into_luma8();
        assert_eq!(Some(saved), previewed);
    }

    #[test]
    fn test_each_face_saved_skipped_or_failed() {
        let dir = tempfile::tempdir().unwrap();
        let faces = vec![
            Region::new(0, 0, 50, 50, FeatureKind::Face),
            Region::new(60, 0, 50, 50, FeatureKind::Face),
            Region::new(120, 0, 50, 50, FeatureKind::Face),
        ];
        let (uc, sink) = use_case(FixedProvider(Some(snapshot(faces))), dir.path());
        let mut names = |index: usize, _: &Region, preview: &GrayImage| {
            assert_eq!(preview.dimensions(), (150, 200));
            match index {
                0 => Some("alice.png".to_string()),
                1 => None,
                _ => Some("bad/name.png".to_string()),
            }
        };

        let outcome = uc.execute(&mut names);

        let CaptureOutcome::Faces(faces) = &outcome else {
            panic!("expected faces, got {outcome:?}");
        };
        assert_eq!(faces.len(), 3);
        assert!(matches!(&faces[0].1, FaceSaveOutcome::Saved(p) if p == &dir.path().join("alice.png")));
        assert!(matches!(faces[1].1, FaceSaveOutcome::Skipped));
        assert!(matches!(
            faces[2].1,
            FaceSaveOutcome::Failed(PreprocessError::InvalidFilename(_))
        ));
        assert_eq!(outcome.saved_count(), 1);
        assert!(dir.path().join("alice.png").is_file());
        assert!(sink.contains("skipped"));
    }
}
