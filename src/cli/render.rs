use anyhow::{Context, Result};
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Color, Table,
};

use crate::catalog::{CatalogSnapshot, CatalogState};
use crate::image::ImageReference;

use super::OutputFormat;

fn verified_cell(image: &ImageReference, state: CatalogState) -> Cell {
    if state == CatalogState::Verifying {
        Cell::new("…").fg(Color::DarkGrey)
    } else if image.verified {
        Cell::new("✓").fg(Color::Green).add_attribute(Attribute::Bold)
    } else {
        Cell::new("")
    }
}

/// Table of images with their verification status
pub fn images_table(images: &[ImageReference], state: CatalogState) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("NAME").add_attribute(Attribute::Bold),
            Cell::new("TAG").add_attribute(Attribute::Bold),
            Cell::new("DIGEST").add_attribute(Attribute::Bold),
            Cell::new("VERIFIED").add_attribute(Attribute::Bold),
        ]);

    for image in images {
        table.add_row(vec![
            Cell::new(&image.repo_name),
            Cell::new(&image.tag),
            Cell::new(&image.digest),
            verified_cell(image, state),
        ]);
    }

    table
}

/// Table of the individual parts of each reference
pub fn references_table(references: &[ImageReference]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("REFERENCE").add_attribute(Attribute::Bold),
            Cell::new("REGISTRY").add_attribute(Attribute::Bold),
            Cell::new("USER").add_attribute(Attribute::Bold),
            Cell::new("NAME").add_attribute(Attribute::Bold),
            Cell::new("TAG").add_attribute(Attribute::Bold),
            Cell::new("DIGEST").add_attribute(Attribute::Bold),
        ]);

    for reference in references {
        table.add_row(vec![
            Cell::new(&reference.repo_tag),
            Cell::new(reference.registry.as_deref().unwrap_or("-")),
            Cell::new(&reference.user),
            Cell::new(&reference.name),
            Cell::new(&reference.tag),
            Cell::new(&reference.digest),
        ]);
    }

    table
}

/// Render a list of images in the requested format
pub fn render_images(
    images: &[ImageReference],
    state: CatalogState,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(images_table(images, state).to_string()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(images).context("Failed to serialize images")
        }
    }
}

/// Short status line for snapshots that have no table yet
pub fn status_line(snapshot: &CatalogSnapshot) -> Option<String> {
    match snapshot.state {
        CatalogState::Idle => None,
        CatalogState::Loading => Some("Loading images...".to_string()),
        CatalogState::Verifying => Some(format!(
            "Verifying {} images...",
            snapshot.images.len()
        )),
        CatalogState::Loaded => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::parse_reference;

    fn images() -> Vec<ImageReference> {
        let mut signed = parse_reference("myregistry.io/team/app:2.3@sha256:abcd");
        signed.verified = true;
        let unsigned = parse_reference("alpinelinux/base:1.0@sha256:ef01");
        vec![signed, unsigned]
    }

    #[test]
    fn test_images_table() {
        let rendered = images_table(&images(), CatalogState::Loaded).to_string();

        assert!(rendered.contains("NAME"));
        assert!(rendered.contains("VERIFIED"));
        assert!(rendered.contains("myregistry.io/team/app"));
        assert!(rendered.contains("sha256:ef01"));
        assert_eq!(rendered.matches('✓').count(), 1);
    }

    #[test]
    fn test_images_table_while_verifying() {
        let rendered = images_table(&images(), CatalogState::Verifying).to_string();
        assert!(!rendered.contains('✓'));
        assert_eq!(rendered.matches('…').count(), 2);
    }

    #[test]
    fn test_render_json() {
        let rendered = render_images(&images(), CatalogState::Loaded, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value[0]["registry"], "myregistry.io");
        assert_eq!(value[0]["verified"], true);
        assert_eq!(value[1]["user"], "alpinelinux");
        assert!(value[1].get("registry").is_none());
    }

    #[test]
    fn test_references_table() {
        let rendered = references_table(&[parse_reference("alpine:3.19")]).to_string();
        assert!(rendered.contains("REGISTRY"));
        assert!(rendered.contains("alpine"));
        assert!(rendered.contains("3.19"));
    }

    #[test]
    fn test_status_line() {
        let snapshot = CatalogSnapshot {
            state: CatalogState::Verifying,
            generation: 3,
            images: images(),
        };
        assert_eq!(
            status_line(&snapshot).as_deref(),
            Some("Verifying 2 images...")
        );
    }
}
