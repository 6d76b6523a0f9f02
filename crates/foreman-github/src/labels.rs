//! Label provisioning.

use tracing::{info, warn};

use foreman_models::STANDARD_LABELS;

use crate::runner::GhCli;

/// Create or update every Foreman label on the repository.
///
/// Failures are logged and skipped; returns how many labels were applied.
pub async fn ensure_labels(gh: &GhCli) -> usize {
    let mut applied = 0;
    for spec in STANDARD_LABELS.iter() {
        let result = gh.run([
            "label",
            "create",
            spec.name,
            "--color",
            spec.color,
            "--description",
            spec.description,
            "--force",
        ])
        .await;
        match result {
            Ok(_) => {
                info!(label = %spec.name, "label ensured");
                applied += 1;
            }
            Err(e) => warn!(label = %spec.name, error = %e, "failed to ensure label"),
        }
    }
    applied
}
