use std::sync::atomic::{AtomicU64, Ordering};

use receptionist_core::detection::domain::controller::DetectionController;
use receptionist_core::detection::domain::detection_result::DetectionSnapshot;
use receptionist_core::shared::log_sink::{LogEntry, LogSink};

/// Prints operator messages to stderr with a timestamp prefix.
pub struct ConsoleLogSink;

impl LogSink for ConsoleLogSink {
    fn log(&self, message: &str) {
        eprintln!("{}", LogEntry::now(message));
    }
}

/// Text stand-in for a live preview: reports face counts when they change.
#[derive(Default)]
pub struct ConsoleDisplay {
    last_count: AtomicU64,
}

impl DetectionController for ConsoleDisplay {
    fn on_detection(&self, snapshot: &DetectionSnapshot) {
        let count = snapshot.result.len() as u64;
        if self.last_count.swap(count, Ordering::Relaxed) == count {
            return;
        }
        let regions: Vec<String> = snapshot
            .face_regions()
            .iter()
            .map(|r| format!("{}x{}@({},{})", r.width, r.height, r.x, r.y))
            .collect();
        eprintln!(
            "frame {}: {} face(s) {}",
            snapshot.frame.index(),
            count,
            regions.join(" ")
        );
    }
}
