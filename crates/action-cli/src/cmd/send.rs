use action_core::{ActionOptions, ActionRecord, KnownAction};
use std::path::Path;

use super::{dispatch_all, load_config, ContextArgs};

/// Every name gets the same context; timestamps are taken in argument order.
pub fn run(
    config_path: &Path,
    names: &[String],
    context: ContextArgs,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let opts = ActionOptions::from(context);
    let records = names
        .iter()
        .map(|name| {
            if KnownAction::from(name.as_str()).is_custom() {
                tracing::debug!(action = %name, "sending custom action name");
            }
            ActionRecord::new(name.as_str(), opts.clone())
        })
        .collect();
    dispatch_all(&config, records, json)
}
