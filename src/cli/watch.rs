// Interactive view: renders every published snapshot and re-verifies on demand

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::catalog::{Catalog, CatalogSnapshot, CatalogState};

use super::render::{images_table, status_line};

/// What the user asked for at the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Reverify,
    Reload,
    Quit,
    Unknown,
}

fn parse_action(line: &str) -> Action {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "r" | "v" | "verify" => Action::Reverify,
        "l" | "reload" => Action::Reload,
        "q" | "quit" | "exit" => Action::Quit,
        _ => Action::Unknown,
    }
}

fn render(snapshot: &CatalogSnapshot) {
    if let Some(line) = status_line(snapshot) {
        eprintln!("{}", line);
    }
    if snapshot.state == CatalogState::Loaded {
        if snapshot.images.is_empty() {
            println!("No tagged images with digests found");
        } else {
            println!("{}", images_table(&snapshot.images, snapshot.state));
        }
        eprintln!("[enter] re-verify  [l] reload  [q] quit");
    }
}

async fn render_loop(mut rx: watch::Receiver<Arc<CatalogSnapshot>>) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        debug!(generation = snapshot.generation, "Rendering snapshot");
        render(&snapshot);
    }
}

/// Load, verify and keep re-verifying on user input until quit or EOF
pub async fn watch_images(mut catalog: Catalog) -> Result<()> {
    let renderer = tokio::spawn(render_loop(catalog.subscribe()));

    catalog.load().await?;
    catalog.verify_all().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        match parse_action(&line) {
            Action::Reverify => {
                catalog.verify_all().await?;
            }
            Action::Reload => {
                catalog.load().await?;
                catalog.verify_all().await?;
            }
            Action::Quit => break,
            Action::Unknown => warn!("Unknown command '{}'", line.trim()),
        }
    }

    // Dropping the catalog closes the channel and ends the render loop
    drop(catalog);
    renderer.await.context("Render task failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action(""), Action::Reverify);
        assert_eq!(parse_action("  r \n"), Action::Reverify);
        assert_eq!(parse_action("L"), Action::Reload);
        assert_eq!(parse_action("quit"), Action::Quit);
        assert_eq!(parse_action("x"), Action::Unknown);
    }
}
