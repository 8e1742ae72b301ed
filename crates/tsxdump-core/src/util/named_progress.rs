use indicatif::ProgressStyle;

/// Extension trait for creating named progress bars.
pub trait NamedProgress {
    /// Creates a progress bar style with a name label.
    ///
    /// # Arguments
    ///
    /// * `name` - Label to display in front of the bar
    /// * `unit` - Unit appended to the position counter, e.g. `bytes`
    fn named_bar(name: &str, unit: &str) -> Self;
}

impl NamedProgress for ProgressStyle {
    fn named_bar(name: &str, unit: &str) -> Self {
        let fmt = format!(
            "{:<31} {{wide_bar:40.cyan/blue}} {{pos:>5}}/{{len:<5}} {} [{{elapsed_precise}} ({{eta}} remaining)] {{msg}}",
            name, unit
        );
        ProgressStyle::default_bar()
            .template(&fmt)
            .unwrap_or(ProgressStyle::default_bar())
    }
}
