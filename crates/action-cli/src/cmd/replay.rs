use action_core::{ActionOptions, ActionRecord};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

use super::{dispatch_all, load_config};

/// One line of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    action: String,
    #[serde(default)]
    screen: Option<String>,
    #[serde(default)]
    extra: Option<String>,
    #[serde(default)]
    section_uid: Option<String>,
    /// Original capture time; lines without one are stamped as they are read.
    #[serde(default)]
    client_timestamp: Option<DateTime<Utc>>,
}

impl ReplayLine {
    fn into_record(self) -> ActionRecord {
        let opts = ActionOptions {
            screen: self.screen,
            extra: self.extra,
            section_uid: self.section_uid,
        };
        match self.client_timestamp {
            Some(ts) => ActionRecord::at(self.action, opts, ts),
            None => ActionRecord::new(self.action, opts),
        }
    }
}

pub fn run(config_path: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let records = parse_lines(&data)?;
    dispatch_all(&config, records, json)
}

fn parse_lines(data: &str) -> anyhow::Result<Vec<ActionRecord>> {
    data.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<ReplayLine>(line)
                .map(ReplayLine::into_record)
                .with_context(|| format!("line {}: invalid action", idx + 1))
        })
        .collect()
}
