//! Terminal rendering and the console UI sink.

use std::sync::Arc;

use shelflife_core::{ProductIndex, ProductRecord, Severity};
use shelflife_sync::UiSink;
use tracing::{debug, info};

/// UI sink that prints notifications to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleUi {
    quiet: bool,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log notifications without printing them.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

impl UiSink for ConsoleUi {
    fn on_index_ready(&self, index: Arc<ProductIndex>) {
        info!(records = index.len(), "product index ready");
    }

    fn on_load_start(&self) {
        debug!("loading product data");
    }

    fn on_load_end(&self) {
        debug!("product data loaded");
    }

    fn on_notify(&self, message: &str, severity: Severity) {
        info!(%severity, message, "notification");
        if !self.quiet {
            eprintln!("{}", format_notification(message, severity));
        }
    }
}

pub fn format_notification(message: &str, severity: Severity) -> String {
    format!("[{severity}] {message}")
}

/// Multi-line description of a product. Absent fields print as `-`.
pub fn render_record(record: &ProductRecord) -> String {
    let units = record
        .units_per_pack
        .map(|units| units.to_string())
        .unwrap_or_else(|| "-".to_string());
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    format!(
        "Code:            {}\n\
         Name:            {}\n\
         Shelf life:      {} days\n\
         Units per pack:  {}\n\
         Pack barcode:    {}\n\
         Manufacturer:    {}\n\
         Standard:        {}",
        record.code,
        record.name,
        record.shelf_life_days,
        units,
        optional(&record.pack_barcode),
        optional(&record.manufacturer),
        optional(&record.standard),
    )
}

/// One search hit per line: code, name, shelf life.
pub fn render_hit(code: &str, name: &str, shelf_life_days: u32) -> String {
    format!("{code}\t{name}\t{shelf_life_days}d")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_notification() {
        assert_eq!(
            format_notification("Connection restored", Severity::Success),
            "[success] Connection restored"
        );
    }

    #[test]
    fn test_render_record_marks_absent_fields() {
        let record = ProductRecord::new("100200", "Milk 3.2%", 10).with_units_per_pack(12);
        let rendered = render_record(&record);

        assert!(rendered.contains("Code:            100200"));
        assert!(rendered.contains("Shelf life:      10 days"));
        assert!(rendered.contains("Units per pack:  12"));
        assert!(rendered.contains("Manufacturer:    -"));
    }

    #[test]
    fn test_render_hit() {
        assert_eq!(render_hit("100300", "Kefir 1%", 7), "100300\tKefir 1%\t7d");
    }
}
