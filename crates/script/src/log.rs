//! progress sink for fetch batches, rendered through `tracing-indicatif` spans
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

/// A sink for a single bounded progress value.
pub trait Progress: Sync {
    /// Sets the total number of units.
    fn set_length(&self, len: u64);
    /// Sets the number of units completed so far.
    fn set_position(&self, pos: u64);
}

impl Progress for Span {
    fn set_length(&self, len: u64) {
        self.pb_set_length(len);
    }

    fn set_position(&self, pos: u64) {
        self.pb_set_position(pos);
    }
}

/// Set up the given span to be styled as a subtask of another span
pub fn set_sub_task(span: &Span, msg: &str) {
    span.pb_set_style(
        &ProgressStyle::with_template("  {span_child_prefix} {spinner:.blue} {wide_msg}")
            .unwrap_or(ProgressStyle::default_spinner()),
    );
    span.pb_set_message(msg);
}

/// Set up the given span to be styled as a progress bar
pub fn set_bar(span: &Span, msg: &str, len: u64) {
    let style = ProgressStyle::with_template(
        "{elapsed} ░ {prefix} ░ {bar:30.green/black} {percent}% ░ {msg}",
    )
    .unwrap_or(ProgressStyle::default_bar())
    .progress_chars("█▒ ");
    span.pb_set_style(&style);
    span.pb_set_message(msg);
    span.pb_set_length(len);
}

/// Runs `body` inside a span rendered as a progress bar of `total` units.
pub fn with_progress<R>(label: &str, total: u64, body: impl FnOnce(&dyn Progress) -> R) -> R {
    let span = tracing::info_span!("progress", label);
    set_bar(&span, label, total);
    let _enter = span.enter();
    body(&span)
}
