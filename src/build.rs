use crate::aggregate::{generate, output_tables, table_options};
use crate::cli::{CommonArgs, FetchArgs, SiteArgs, TableArgs};
use anyhow::Context;
use console::style;
use tracing::info;

/// Fetch, regenerate tables, assemble. `csvs_only` stops after the tables
/// and never touches the network.
pub fn exec(
    common: &CommonArgs,
    site: &SiteArgs,
    fetch: &FetchArgs,
    tables: &TableArgs,
    skip_fetch: bool,
    csvs_only: bool,
) -> anyhow::Result<()> {
    let options = table_options(tables)?;
    let config = common.load_config()?;

    if csvs_only {
        info!("regenerating tables only");
    } else if skip_fetch {
        println!("{}", style("Skipping GitHub fetch (--skip-fetch)").dim());
    } else {
        crate::fetch::exec(common, fetch)?;
        println!();
    }

    let store = common.store()?;
    let generated = generate(&store, &config, &options).context("Failed to generate tables")?;
    output_tables(&generated, store.root());

    if csvs_only {
        return Ok(());
    }

    println!();
    crate::site::exec(common, site)?;
    println!();
    println!(
        "{} Site written to {}",
        style("Build complete!").green().bold(),
        site.destination.display()
    );
    Ok(())
}
