use action_core::{ActionOptions, ActionRecord};

use super::ContextArgs;
use crate::output::print_json;

pub fn run(name: &str, context: ContextArgs) -> anyhow::Result<()> {
    let record = ActionRecord::new(name, ActionOptions::from(context));
    print_json(&record.payload())
}
