use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::StageTemplate;

/// Failure while reading a global stage seed file.
#[derive(Debug, thiserror::Error)]
pub enum StageSeedError {
    #[error("unable to open stage seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed stage seed: {0}")]
    Csv(#[from] csv::Error),
    #[error("stage seed contains no stages")]
    Empty,
    #[error("stage slug '{0}' appears more than once")]
    DuplicateSlug(String),
    #[error("stage positions must run 1..n without gaps (expected {expected}, found {found})")]
    PositionGap { expected: u32, found: u32 },
    #[error("stage seed needs at least one active non-terminal stage to start applications in")]
    NoInitialStage,
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    slug: String,
    name: String,
    position: u32,
    #[serde(deserialize_with = "flag")]
    is_terminal: bool,
    #[serde(default = "active_by_default", deserialize_with = "flag")]
    active: bool,
}

fn active_by_default() -> bool {
    true
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "'{other}' is not a boolean flag"
        ))),
    }
}

/// Parse `slug,name,position,is_terminal[,active]` rows into ordered templates.
pub fn parse_stage_seed<R: Read>(reader: R) -> Result<Vec<StageTemplate>, StageSeedError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut templates = Vec::new();
    for row in csv_reader.deserialize::<SeedRow>() {
        let row = row?;
        templates.push(StageTemplate {
            slug: row.slug.to_ascii_lowercase(),
            name: row.name,
            position: row.position,
            is_terminal: row.is_terminal,
            active: row.active,
        });
    }

    validate_templates(&mut templates)?;
    Ok(templates)
}

pub fn load_stage_seed(path: impl AsRef<Path>) -> Result<Vec<StageTemplate>, StageSeedError> {
    let file = File::open(path)?;
    parse_stage_seed(file)
}

fn validate_templates(templates: &mut [StageTemplate]) -> Result<(), StageSeedError> {
    if templates.is_empty() {
        return Err(StageSeedError::Empty);
    }

    templates.sort_by_key(|template| template.position);

    let mut slugs = HashSet::new();
    for (index, template) in templates.iter().enumerate() {
        let expected = index as u32 + 1;
        if template.position != expected {
            return Err(StageSeedError::PositionGap {
                expected,
                found: template.position,
            });
        }
        if !slugs.insert(template.slug.as_str()) {
            return Err(StageSeedError::DuplicateSlug(template.slug.clone()));
        }
    }

    if !templates
        .iter()
        .any(|template| template.active && !template.is_terminal)
    {
        return Err(StageSeedError::NoInitialStage);
    }

    Ok(())
}
