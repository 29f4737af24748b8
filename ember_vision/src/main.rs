// Example runner for the `ember_vision` library. It feeds a synthetic clip through
// the colour-heuristic detector; a real front end would plug in a capture source
// and a trained model instead (see the `ember_tester` crate).

use ember_vision::{
    AlarmDispatcher, ChromaDetector, EmberConfig, Frame, FrameSequence, HistoryRecord, RunEvent,
    Session,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

#[tokio::main]
async fn main() {
    println!("Ember Vision - Example Runner");

    let session = Session::new(
        EmberConfig::default(),
        Arc::new(ChromaDetector::default()),
        AlarmDispatcher::logging(),
    );

    // Two seconds at 30 fps: half a second of dark room, then a second and a half of flame.
    let dark = Frame::filled(0, 64, 48, [12, 14, 20, 255]);
    let flame = Frame::filled(0, 64, 48, [235, 110, 25, 255]);
    let mut clip = vec![dark; 15];
    clip.extend(std::iter::repeat_n(flame, 45));

    let mut events = session.subscribe();
    let run = match session.start_video(FrameSequence::video(clip, Some(30.0))) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("could not start: {e}");
            return;
        }
    };

    if let Some(record) = follow_run(&mut events).await {
        println!("finished: {} ({} frames)", record.result_label, record.frame_count);
    }

    if let Err(e) = run.wait().await {
        eprintln!("run failed: {e}");
    }
    println!("history entries: {}", session.history().len());
}

/// Prints alarms until the run finishes. Returns the run's record, or `None` if the
/// bus closed first.
async fn follow_run(events: &mut broadcast::Receiver<RunEvent>) -> Option<HistoryRecord> {
    loop {
        match events.recv().await {
            Ok(RunEvent::Alarm { frame_index, .. }) => println!("alarm at frame {frame_index}"),
            Ok(RunEvent::Finished { record, .. }) => return Some(record),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => println!("missed {skipped} events"),
            Err(RecvError::Closed) => return None,
        }
    }
}
