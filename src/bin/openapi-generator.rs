use std::{env, fs};

use anyhow::Context;
use quiz_arena_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

/// Print the OpenAPI document, or write it to the path given as first argument.
fn main() -> anyhow::Result<()> {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .context("failed to serialize OpenAPI document")?;

    match env::args().nth(1) {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("failed to write {path}"))?;
        }
        None => println!("{json}"),
    }
    Ok(())
}
