use crate::aggregate::{CONFIG_JSON, LINKS_CSV, REPOSITORIES_CSV, TOP_CONTRIBUTORS_CSV};
use crate::cli::{CommonArgs, SiteArgs};
use crate::error::{NetworkError, Result};
use anyhow::Context;
use console::style;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_SITE_ROOT: &str = "site";
pub const DEFAULT_DESTINATION: &str = "dist";

const DATA_FILES: &[&str] = &[TOP_CONTRIBUTORS_CSV, REPOSITORIES_CSV, LINKS_CSV, CONFIG_JSON];

#[derive(Debug, Default)]
pub struct AssembleReport {
    pub files_copied: usize,
    pub data_files: Vec<String>,
}

/// Copy the static front end and the generated data into `destination`.
///
/// Layout of `site_root`: `index.html`, `js/**`, `assets/css/style.css`,
/// `assets/lib/**/*.js`, `assets/img/**`. Only `index.html` is mandatory.
pub fn assemble(site_root: &Path, data_dir: &Path, destination: &Path) -> Result<AssembleReport> {
    let index = site_root.join("index.html");
    if !index.is_file() {
        return Err(NetworkError::Other(format!(
            "missing front end entry point {}",
            index.display()
        )));
    }

    let mut report = AssembleReport::default();
    let assets_dest = destination.join("assets");
    std::fs::create_dir_all(&assets_dest)?;

    let stylesheet = site_root.join("assets").join("css").join("style.css");
    if stylesheet.is_file() {
        copy(&stylesheet, &assets_dest.join("css").join("style.css"), &mut report)?;
    }

    for path in files_under(&site_root.join("assets").join("lib"))? {
        if path.extension().is_some_and(|e| e == "js") {
            copy_flat(&path, &assets_dest.join("lib"), &mut report)?;
        }
    }

    for path in files_under(&site_root.join("assets").join("img"))? {
        copy_flat(&path, &assets_dest.join("img"), &mut report)?;
    }

    let data_dest = assets_dest.join("data");
    std::fs::create_dir_all(&data_dest)?;
    for name in DATA_FILES {
        let src = data_dir.join(name);
        if src.is_file() {
            copy(&src, &data_dest.join(name), &mut report)?;
            report.data_files.push(name.to_string());
        } else {
            debug!(file = %src.display(), "data file not generated, skipping");
        }
    }

    let js_root = site_root.join("js");
    for path in files_under(&js_root)? {
        if let Ok(relative) = path.strip_prefix(&js_root) {
            copy(&path, &destination.join("js").join(relative), &mut report)?;
        }
    }

    copy(&index, &destination.join("index.html"), &mut report)?;
    Ok(report)
}

fn files_under(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkBuilder::new(dir).standard_filters(false).build() {
        let entry = entry?;
        if entry.file_type().is_some_and(|t| t.is_file()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn copy_flat(src: &Path, dest_dir: &Path, report: &mut AssembleReport) -> Result<()> {
    match src.file_name() {
        Some(name) => copy(src, &dest_dir.join(name), report),
        None => Ok(()),
    }
}

fn copy(src: &Path, dest: &Path, report: &mut AssembleReport) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // copying a file onto itself truncates it
    if same_file(src, dest)? {
        debug!(file = %src.display(), "already in place");
        return Ok(());
    }
    std::fs::copy(src, dest)?;
    report.files_copied += 1;
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> Result<bool> {
    if !b.exists() {
        return Ok(false);
    }
    Ok(std::fs::canonicalize(a)? == std::fs::canonicalize(b)?)
}

pub fn exec(common: &CommonArgs, args: &SiteArgs) -> anyhow::Result<()> {
    let report = assemble(&args.site_root, &common.data_dir, &args.destination).with_context(|| {
        format!(
            "Failed to assemble {} into {}",
            args.site_root.display(),
            args.destination.display()
        )
    })?;
    output_report(&report, &args.destination);
    Ok(())
}

pub fn output_report(report: &AssembleReport, destination: &Path) {
    println!(
        "Copied {} files into {}",
        style(report.files_copied).cyan(),
        style(destination.display()).bold()
    );
    if report.data_files.is_empty() {
        println!(
            "{}",
            style("No generated data found; run the csvs command first").yellow()
        );
    } else {
        println!("Data: {}", report.data_files.join(", "));
    }
}
