use anyhow::Result;

use crate::image::{parse_reference, ImageReference};

use super::render::references_table;
use super::OutputFormat;

/// Show how image references are split into registry/user/name/tag/digest
pub fn parse_references(references: &[String], format: OutputFormat) -> Result<()> {
    let parsed: Vec<ImageReference> = references.iter().map(|r| parse_reference(r)).collect();

    match format {
        OutputFormat::Table => println!("{}", references_table(&parsed)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&parsed)?),
    }

    Ok(())
}
