//! Progress reporting from chunk loading and the render loop.

/// State of the render loop as seen by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// Interactive preview, re-rendered on every refresh.
    Preview,
    /// Accumulating samples.
    Rendering,
    /// Path tracing is on but paused.
    Paused,
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RenderState::Preview => "preview",
            RenderState::Rendering => "rendering",
            RenderState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Receiver of render progress.
///
/// Every method has an empty default so implementors pick what they need.
/// Calls come from the render manager thread.
pub trait RenderStatusListener: Send + Sync {
    fn set_progress(&self, _task: &str, _done: usize, _start: usize, _target: usize) {}

    /// Progress with an estimated time remaining, formatted `h:mm:ss`.
    fn set_progress_eta(&self, _task: &str, _done: usize, _start: usize, _target: usize, _eta: &str) {}

    fn set_spp(&self, _spp: u32) {}

    /// Total time spent on the current accumulation, in milliseconds.
    fn set_render_time(&self, _millis: u64) {}

    fn set_samples_per_second(&self, _sps: u64) {}

    fn render_state_changed(&self, _state: RenderState) {}

    /// The target sample count was reached.
    fn render_job_finished(&self, _millis: u64, _sps: u64) {}

    fn chunks_loaded(&self, _count: usize) {}
}

/// Forwards status to the `log` crate.
///
/// Per-frame updates go to `debug`, milestones to `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusListener;

impl RenderStatusListener for LogStatusListener {
    fn set_progress(&self, task: &str, done: usize, start: usize, target: usize) {
        log::debug!("{}: {}/{} (from {})", task, done, target, start);
    }

    fn set_progress_eta(&self, task: &str, done: usize, _start: usize, target: usize, eta: &str) {
        log::info!("{}: {}/{} spp, ETA {}", task, done, target, eta);
    }

    fn set_samples_per_second(&self, sps: u64) {
        log::debug!("{} samples per second", sps);
    }

    fn render_state_changed(&self, state: RenderState) {
        log::info!("Render state: {}", state);
    }

    fn render_job_finished(&self, millis: u64, sps: u64) {
        log::info!(
            "Render job finished in {} ({} samples per second)",
            format_duration(millis),
            sps
        );
    }

    fn chunks_loaded(&self, count: usize) {
        log::info!("Loaded {} chunks", count);
    }
}

/// Format milliseconds as `h:mm:ss`.
pub fn format_duration(millis: u64) -> String {
    let seconds = millis / 1000;
    format!("{}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(61_999), "0:01:01");
        assert_eq!(format_duration(3_723_000), "1:02:03");
        assert_eq!(format_duration(100 * 3600 * 1000), "100:00:00");
    }

    #[test]
    fn test_default_methods_are_noops() {
        struct Quiet;
        impl RenderStatusListener for Quiet {}

        let listener: &dyn RenderStatusListener = &Quiet;
        listener.set_progress("task", 1, 0, 2);
        listener.render_state_changed(RenderState::Paused);
        assert_eq!(RenderState::Rendering.to_string(), "rendering");
    }
}
