use ember_vision::{FrameReport, HistoryRecord, RunEvent, Termination};
use tokio::sync::broadcast::{self, error::RecvError};

/// Prints bus events until the receiver closes. `--json` writes one object per line.
pub async fn render(mut events: broadcast::Receiver<RunEvent>, json: bool) {
    loop {
        match events.recv().await {
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => log::warn!("could not encode event: {e}"),
            },
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(skipped)) => log::debug!("console lagged by {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::Started {
            run_id,
            kind,
            origin,
            frame_rate,
            required_frames,
            ..
        } => println!(
            "[run {run_id}] {kind} {origin}: {frame_rate:.2} fps, alarm after {required_frames} frames"
        ),
        RunEvent::Frame { run_id, report } => print_frame(*run_id, report),
        RunEvent::Alarm { run_id, frame_index } => {
            println!("[run {run_id}] ALARM at frame {frame_index}")
        }
        RunEvent::Notice { run_id, message } => println!("[run {run_id}] {message}"),
        RunEvent::Finished {
            run_id,
            record,
            termination,
        } => {
            let reason = match termination {
                Termination::Exhausted => "done".to_string(),
                Termination::Cancelled => "stopped".to_string(),
                Termination::ReadFailure { message } => format!("read failure: {message}"),
                Termination::InferenceFailure { message } => format!("inference failure: {message}"),
            };
            println!("[run {run_id}] {} ({reason})", format_record(record));
        }
    }
}

// Only status changes and progress ticks are worth a line.
fn print_frame(run_id: u64, report: &FrameReport) {
    let tick = report.processed % 30 == 0;
    if report.status.is_safe() && !tick {
        return;
    }
    match report.progress() {
        Some(progress) => println!(
            "[run {run_id}] frame {} ({:>3.0}%): {}",
            report.frame_index,
            progress * 100.0,
            report.status
        ),
        None => println!(
            "[run {run_id}] frame {}: {}",
            report.frame_index, report.status
        ),
    }
}

pub fn format_record(record: &HistoryRecord) -> String {
    format!(
        "{} {:<6} {:<16} {:>6} frames {:>7.2}s",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.source_type,
        record.result_label,
        record.frame_count,
        record.processing_time
    )
}

pub fn print_history(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("no history");
        return;
    }
    println!("history (most recent last):");
    for record in records {
        println!("  {}", format_record(record));
    }
}
