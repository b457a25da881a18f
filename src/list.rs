use crate::cli::CommonArgs;
use crate::config::Config;
use crate::model::{ContributorEntry, Tier};
use console::style;

pub fn exec(common: &CommonArgs) -> anyhow::Result<()> {
    let config = common.load_config()?;
    output_contributors(&config);
    Ok(())
}

/// Members of `tier`, sorted by display name then username.
pub fn members(config: &Config, tier: Tier) -> Vec<ContributorEntry> {
    let mut entries: Vec<ContributorEntry> = config
        .contributors()
        .into_iter()
        .filter(|e| e.kind == tier)
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.username.cmp(&b.username)));
    entries
}

fn output_contributors(config: &Config) {
    let core = members(config, Tier::Core);
    output_group("Core Contributors", &core);

    let community = members(config, Tier::Community);
    if !community.is_empty() {
        println!();
        output_group("Community Contributors", &community);
    }
}

fn output_group(title: &str, entries: &[ContributorEntry]) {
    println!("{}", style(format!("{title}:")).bold());
    println!("{}", "─".repeat(40));
    for e in entries {
        println!("  {} {}", e.name, style(format!("(@{})", e.username)).dim());
    }
    println!();
    println!("Total: {}", style(entries.len()).cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_are_sorted_by_name() {
        let config = Config::from_toml_str(
            r#"
organization_name = "Org"

[contributors.staff]
zed = "Alice"
amy = "Zoe"

[contributors.friends]
bob = "Bob"
"#,
        )
        .unwrap();

        let core: Vec<String> = members(&config, Tier::Core)
            .into_iter()
            .map(|e| e.username)
            .collect();
        assert_eq!(core, vec!["zed", "amy"]);
        assert_eq!(members(&config, Tier::Community).len(), 1);
    }
}
