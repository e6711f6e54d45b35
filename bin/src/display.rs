//! Progress rendering for the coffer CLI.

use anyhow::Result;
use coffer_lib::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Creates the byte progress bar, hidden in quiet mode.
pub(crate) fn progress_bar(quiet: bool, message: impl Into<String>) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message(message.into());
    Ok(pb)
}

/// Mirrors one event onto `pb`. Returns the result once the job completes.
pub(crate) fn render<T>(pb: &ProgressBar, event: ProgressEvent<T>) -> Option<Result<T, JobError>> {
    match event {
        ProgressEvent::None => None,
        ProgressEvent::Loading { downloaded, total } => {
            if let Some(total) = total {
                pb.set_length(total);
            }
            if let Some(downloaded) = downloaded {
                pb.set_position(downloaded);
            }
            None
        }
        ProgressEvent::Complete { result } => {
            match &result {
                Ok(_) => pb.finish(),
                Err(e) => pb.abandon_with_message(e.to_string()),
            }
            Some(result)
        }
    }
}

/// Drives `subscription` to its terminal event, rendering progress on `pb`.
///
/// Ctrl-C runs `on_interrupt` once; the job's own terminal event still ends
/// the wait.
pub(crate) async fn follow<T>(
    pb: &ProgressBar,
    subscription: &mut Subscription<T>,
    on_interrupt: impl FnOnce(),
) -> Result<T, JobError>
where
    T: Clone + Send + 'static,
{
    let mut on_interrupt = Some(on_interrupt);
    loop {
        let event = tokio::select! {
            event = subscription.next() => event,
            _ = tokio::signal::ctrl_c(), if on_interrupt.is_some() => {
                pb.set_message("cancelling");
                if let Some(cancel) = on_interrupt.take() {
                    cancel();
                }
                continue;
            }
        };
        let Some(event) = event else {
            return Err(JobError::Cancelled);
        };
        if let Some(result) = render(pb, event) {
            return result;
        }
    }
}

/// Formats a byte count for humans.
pub(crate) fn format_bytes(bytes: u64) -> String {
    indicatif::HumanBytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tracks_counters() {
        let pb = ProgressBar::hidden();
        assert!(render::<()>(&pb, ProgressEvent::loading_with(10, Some(40))).is_none());
        assert_eq!(pb.length(), Some(40));
        assert_eq!(pb.position(), 10);
        assert!(render::<()>(&pb, ProgressEvent::None).is_none());
    }

    #[test]
    fn test_render_returns_terminal_result() {
        let pb = ProgressBar::hidden();
        let result = render(&pb, ProgressEvent::success(7u8));
        assert_eq!(result, Some(Ok(7)));
        assert!(pb.is_finished());

        let result = render::<u8>(&ProgressBar::hidden(), ProgressEvent::failure(JobError::Cancelled));
        assert_eq!(result, Some(Err(JobError::Cancelled)));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
    }
}
