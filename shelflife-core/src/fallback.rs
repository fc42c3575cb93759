//! Bundled sample dataset.
//!
//! Used only when there is no network and no usable cache entry, so the
//! application always has something to index.

use crate::ProductRecord;

/// The fixed sample records shipped with the application.
pub fn fallback_dataset() -> Vec<ProductRecord> {
    vec![
        ProductRecord::new("000001", "Sample product 1", 365)
            .with_units_per_pack(10)
            .with_pack_barcode("1234567890123")
            .with_manufacturer("Sample manufacturer")
            .with_standard("GOST 12345-2020"),
        ProductRecord::new("000002", "Sample product 2", 180)
            .with_units_per_pack(5)
            .with_pack_barcode("9876543210987")
            .with_manufacturer("Another manufacturer")
            .with_standard("TU 45678-2021"),
    ]
}
