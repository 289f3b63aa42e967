// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for step derivation.
// Run with: cargo +nightly fuzz run fuzz_derive_steps
//
// Feeds arbitrary dataset-query JSON through parsing, derivation and the
// update cascade. Malformed queries must come back as errors, never panics.

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use stepwise_query::{Database, DatasetQuery, Feature, Metadata, Table};
use stepwise_steps::{Notebook, OpenSteps};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if input.len() > 4096 {
        return;
    }
    let Ok(dataset) = DatasetQuery::from_json(input) else {
        return;
    };

    let metadata = Arc::new(
        Metadata::new()
            .with_database(Database::new(1, "fuzz", &Feature::ALL))
            .with_table(Table::new(10, 1, "orders", &["id", "product_id", "total"]))
            .with_table(Table::new(20, 1, "products", &["id", "category"])),
    );

    let Ok(steps) = Notebook::default().derive_dataset(&dataset, metadata, &OpenSteps::new())
    else {
        return;
    };
    for (position, step) in steps.iter().enumerate() {
        let _ = steps.update(position, step.query.dataset_query());
        let _ = steps.remove(position);
    }
});
