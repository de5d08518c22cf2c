mod console;

use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use receptionist_core::config::{DeviceConfig, ReceptionistConfig};
use receptionist_core::detection::domain::detection_result::SnapshotProvider;
use receptionist_core::detection::infrastructure::onnx_cascade::OnnxCascadeLoader;
use receptionist_core::pipeline::capture_training_image_use_case::{
    CaptureOutcome, CaptureTrainingImageUseCase, FaceSaveOutcome, NameList,
};
use receptionist_core::pipeline::pipeline_controller::PipelineController;
use receptionist_core::pipeline::recognize_faces_use_case::{
    RecognizeFacesUseCase, RecognizeOutcome,
};
use receptionist_core::pipeline::train_recognizer_use_case::TrainRecognizerUseCase;
use receptionist_core::recognition::domain::recognition_model::RecognitionModel;
use receptionist_core::recognition::infrastructure::correlation_recognizer::CorrelationRecognizer;
use receptionist_core::recognition::infrastructure::image_preprocessor::ImagePreprocessor;
use receptionist_core::recognition::infrastructure::training_corpus::TrainingCorpus;
use receptionist_core::shared::log_sink::LogSink;

use console::{ConsoleDisplay, ConsoleLogSink};

/// Real-time face capture, training and recognition.
#[derive(Parser)]
#[command(name = "receptionist")]
struct Cli {
    /// Config file (default: <config dir>/receptionist/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Values that take precedence over the config file.
#[derive(Args)]
struct Overrides {
    /// Play a directory of images instead of a camera.
    #[arg(long, global = true)]
    frames: Option<PathBuf>,

    /// Replay the image directory forever.
    #[arg(long, global = true)]
    looped: bool,

    /// Webcam device index.
    #[arg(long, global = true, conflicts_with = "frames")]
    webcam: Option<u32>,

    /// Frames per second for the capture device.
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Face cascade model.
    #[arg(long, global = true)]
    face_cascade: Option<PathBuf>,

    /// Eyes cascade model.
    #[arg(long, global = true)]
    eyes_cascade: Option<PathBuf>,

    /// Nose cascade model.
    #[arg(long, global = true)]
    nose_cascade: Option<PathBuf>,

    /// Mouth cascade model.
    #[arg(long, global = true)]
    mouth_cascade: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// Training corpus directory.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Minimum correlation for a recognized label (-1.0-1.0).
    #[arg(long, global = true)]
    threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live pipeline, reporting detections until Enter is pressed.
    Run {
        /// Stop after this many seconds instead of waiting for Enter.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Save the faces of the next detection as training images.
    Capture {
        /// File names for the detected faces, in detection order
        /// (e.g. alice.png,bob.jpg). Faces without a name are skipped.
        #[arg(long, value_delimiter = ',', required = true)]
        names: Vec<String>,

        /// Seconds to wait for a first detection.
        #[arg(long, default_value = "10")]
        wait: u64,
    },
    /// Train the recognizer from the corpus and report the result.
    Train,
    /// Train from the corpus, then label the faces of the next detection.
    Recognize {
        /// Seconds to wait for a first detection.
        #[arg(long, default_value = "10")]
        wait: u64,
    },
    /// Write the effective configuration to the config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => Some(path),
        None => ReceptionistConfig::default_path(),
    };
    let mut config = match &config_path {
        Some(path) if path.exists() => ReceptionistConfig::load(path)?,
        _ => ReceptionistConfig::default(),
    };
    apply_overrides(&mut config, cli.overrides);
    config.validate()?;

    let log: Arc<dyn LogSink> = Arc::new(ConsoleLogSink);
    match cli.command {
        Command::Run { seconds } => run_live(&config, log, seconds),
        Command::Capture { names, wait } => run_capture(&config, log, names, wait),
        Command::Train => {
            let mut model = build_model(&config);
            train(&config, &mut model, log)?;
            Ok(())
        }
        Command::Recognize { wait } => run_recognize(&config, log, wait),
        Command::InitConfig { force } => {
            let path = config_path.ok_or("no configuration directory on this platform")?;
            if path.exists() && !force {
                return Err(format!("{} exists, use --force to overwrite", path.display()).into());
            }
            config.save(&path)?;
            log::info!("Configuration written to {}", path.display());
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn apply_overrides(config: &mut ReceptionistConfig, o: Overrides) {
    if let Some(directory) = o.frames {
        let fps = o.fps.unwrap_or(10);
        config.device = DeviceConfig::ImageSequence {
            directory,
            fps,
            looped: o.looped,
        };
    } else if let Some(index) = o.webcam {
        let (width, height, fps) = match config.device {
            DeviceConfig::Webcam {
                width, height, fps, ..
            } => (width, height, fps),
            DeviceConfig::ImageSequence { .. } => (640, 480, 30),
        };
        config.device = DeviceConfig::Webcam {
            index,
            width,
            height,
            fps: o.fps.unwrap_or(fps),
        };
    } else if let Some(new_fps) = o.fps {
        match &mut config.device {
            DeviceConfig::ImageSequence { fps, .. } | DeviceConfig::Webcam { fps, .. } => {
                *fps = new_fps
            }
        }
    }

    if let Some(path) = o.face_cascade {
        config.cascades.face = path;
    }
    if o.eyes_cascade.is_some() {
        config.cascades.eyes = o.eyes_cascade;
    }
    if o.nose_cascade.is_some() {
        config.cascades.nose = o.nose_cascade;
    }
    if o.mouth_cascade.is_some() {
        config.cascades.mouth = o.mouth_cascade;
    }
    if let Some(confidence) = o.confidence {
        config.detection.confidence = confidence;
    }
    if let Some(corpus) = o.corpus {
        config.corpus_dir = corpus;
    }
    if let Some(threshold) = o.threshold {
        config.match_threshold = threshold;
    }
}

fn build_pipeline(
    config: &ReceptionistConfig,
    log: Arc<dyn LogSink>,
) -> Result<Arc<PipelineController>, Box<dyn std::error::Error>> {
    let device = config.device.open()?;
    let pipeline =
        PipelineController::from_config(config, device, Arc::new(OnnxCascadeLoader), log)?;
    Ok(Arc::new(pipeline))
}

fn build_model(config: &ReceptionistConfig) -> RecognitionModel {
    RecognitionModel::new(
        Box::new(CorrelationRecognizer::new(
            config.preprocessing.width,
            config.preprocessing.height,
        )),
        config.match_threshold,
    )
}

fn train(
    config: &ReceptionistConfig,
    model: &mut RecognitionModel,
    log: Arc<dyn LogSink>,
) -> Result<(), Box<dyn std::error::Error>> {
    let use_case = TrainRecognizerUseCase::new(TrainingCorpus::new(&config.corpus_dir), log);
    let summary = use_case.execute(model)?;
    println!(
        "Trained on {} image(s): {}",
        summary.samples,
        summary.labels.join(", ")
    );
    Ok(())
}

/// Polls until the pipeline has published a first snapshot.
fn wait_for_snapshot(pipeline: &PipelineController, wait: Duration) -> bool {
    let step = Duration::from_millis(50);
    let mut waited = Duration::ZERO;
    while waited < wait {
        if pipeline.capture_frame_and_faces().is_some() || !pipeline.source().is_capturing() {
            break;
        }
        std::thread::sleep(step);
        waited += step;
    }
    pipeline.capture_frame_and_faces().is_some()
}

fn run_live(
    config: &ReceptionistConfig,
    log: Arc<dyn LogSink>,
    seconds: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config, log)?;
    pipeline.add_ui_controller(Arc::new(ConsoleDisplay::default()));
    pipeline.start()?;

    match seconds {
        Some(s) => std::thread::sleep(Duration::from_secs(s)),
        None => {
            eprintln!("Press Enter to stop");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
        }
    }

    pipeline.stop()?;
    Ok(())
}

fn run_capture(
    config: &ReceptionistConfig,
    log: Arc<dyn LogSink>,
    names: Vec<String>,
    wait: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config, log.clone())?;
    pipeline.start()?;
    wait_for_snapshot(&pipeline, Duration::from_secs(wait));

    let preprocessor =
        ImagePreprocessor::new(config.preprocessing).with_base_path(&config.corpus_dir);
    let use_case = CaptureTrainingImageUseCase::new(pipeline.clone(), preprocessor, log);
    let outcome = use_case.execute(&mut NameList::new(names));
    pipeline.stop()?;

    match outcome {
        CaptureOutcome::NotReady => Err("no frame was captured".into()),
        CaptureOutcome::NoFaces => {
            println!("No faces detected");
            Ok(())
        }
        CaptureOutcome::Faces(faces) => {
            for (region, outcome) in &faces {
                let (x, y) = (region.x, region.y);
                match outcome {
                    FaceSaveOutcome::Saved(path) => println!("saved   {}", path.display()),
                    FaceSaveOutcome::Skipped => println!("skipped face at ({x}, {y})"),
                    FaceSaveOutcome::Failed(e) => println!("failed  face at ({x}, {y}): {e}"),
                }
            }
            Ok(())
        }
    }
}

fn run_recognize(
    config: &ReceptionistConfig,
    log: Arc<dyn LogSink>,
    wait: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut model = build_model(config);
    train(config, &mut model, log.clone())?;

    let pipeline = build_pipeline(config, log.clone())?;
    pipeline.start()?;
    wait_for_snapshot(&pipeline, Duration::from_secs(wait));

    let use_case = RecognizeFacesUseCase::new(
        pipeline.clone(),
        ImagePreprocessor::new(config.preprocessing),
        log,
    );
    let outcome = use_case.execute(&model);
    pipeline.stop()?;

    match outcome? {
        RecognizeOutcome::NotTrained => Err("recognizer is not trained".into()),
        RecognizeOutcome::NotReady => Err("no frame was captured".into()),
        RecognizeOutcome::NoFaces => {
            println!("No faces detected");
            Ok(())
        }
        RecognizeOutcome::Recognized(faces) => {
            for (region, recognition) in faces {
                println!(
                    "{} ({:.2}) at ({}, {})",
                    recognition.label, recognition.score, region.x, region.y
                );
            }
            Ok(())
        }
    }
}
