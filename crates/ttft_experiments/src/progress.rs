use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Progress bar on stderr, or `None` when disabled or there is nothing to count.
pub(crate) fn progress_bar(len: u64, enabled: bool) -> Option<ProgressBar> {
    if !enabled || len == 0 {
        return None;
    }

    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    Some(bar)
}
