/// Receives progress updates from [`verify()`](crate::verify()).
///
/// All methods take `&self` so one reporter can be shared by the worker
/// threads.
pub trait VerifyProgress: Send + Sync {
    /// Called once before any file is read.
    fn start(&self, _files: usize, _bytes: u64) {}

    /// Called when a file has been read to the end.
    fn file_completed(&self, _path: &str, _bytes: u64) {}

    /// Called after the last file.
    fn completed(&self) {}
}

/// Discards all updates.
pub struct SilentProgress;

impl VerifyProgress for SilentProgress {}

/// Byte-level progress bar on stderr.
#[cfg(feature = "cli")]
pub struct ConsoleProgress {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            bar: indicatif::ProgressBar::hidden(),
        }
    }
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl VerifyProgress for ConsoleProgress {
    fn start(&self, _files: usize, bytes: u64) {
        let style = indicatif::ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {bytes}/{total_bytes} [{elapsed_precise}] {wide_msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("━╸─");

        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(bytes);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.reset();
    }

    fn file_completed(&self, path: &str, bytes: u64) {
        self.bar.set_message(path.to_owned());
        self.bar.inc(bytes);
    }

    fn completed(&self) {
        self.bar.finish_and_clear();
    }
}
