//! `pce-add` and `pce-list`: manage stored PCE profiles.

use crate::core::config::{ConfigFile, PceProfile};
use crate::core::error::PceResult;
use colored::Colorize;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(clap::Args, Debug)]
pub struct PceAddArgs {
    /// Profile name used with --pce.
    pub name: String,
    /// PCE fully qualified domain name.
    #[clap(long)]
    pub fqdn: String,
    #[clap(long, default_value_t = 8443)]
    pub port: u16,
    #[clap(long, default_value_t = 1)]
    pub org: u32,
    /// API key username (api_xxxxxxxx).
    #[clap(long)]
    pub api_user: String,
    /// API key secret.
    #[clap(long)]
    pub api_key: String,
    /// Skip TLS certificate verification.
    #[clap(long)]
    pub disable_tls: bool,
    /// HTTP timeout in seconds.
    #[clap(long, default_value_t = 300)]
    pub timeout: u64,
    /// Make this the default profile.
    #[clap(long)]
    pub default: bool,
}

pub fn run_add(config: &Path, args: PceAddArgs, out: &mut dyn Write) -> PceResult<()> {
    let mut cfg = ConfigFile::load(config)?;
    let profile = PceProfile {
        fqdn: args.fqdn,
        port: args.port,
        org: args.org,
        api_user: args.api_user,
        api_key: args.api_key,
        disable_tls: args.disable_tls,
        timeout_secs: args.timeout,
    };
    cfg.upsert(&args.name, profile, args.default);
    cfg.save(config)?;
    info!(name = %args.name, path = %config.display(), "saved PCE profile");
    writeln!(out, "saved PCE profile '{}' to {}", args.name, config.display())?;
    Ok(())
}

pub fn run_list(config: &Path, out: &mut dyn Write) -> PceResult<()> {
    let cfg = ConfigFile::load(config)?;
    if cfg.pce.is_empty() {
        writeln!(out, "no PCE profiles in {}", config.display())?;
        return Ok(());
    }
    for (name, p) in &cfg.pce {
        let marker = if cfg.default.as_deref() == Some(name.as_str()) {
            "*".green().bold().to_string()
        } else {
            " ".to_string()
        };
        writeln!(
            out,
            "{} {:<16} {}:{} org {} user {}{}",
            marker,
            name,
            p.fqdn,
            p.port,
            p.org,
            p.api_user,
            if p.disable_tls { " (tls verification off)" } else { "" }
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn add(name: &str, default: bool) -> PceAddArgs {
        PceAddArgs {
            name: name.into(),
            fqdn: format!("{}.example.com", name),
            port: 8443,
            org: 1,
            api_user: "api_1".into(),
            api_key: "secret".into(),
            disable_tls: false,
            timeout: 300,
            default,
        }
    }

    #[test]
    fn added_profiles_listed_without_secrets() {
        colored::control::set_override(false);
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("pce.toml");
        let mut out = Vec::new();
        run_add(&path, add("lab", false), &mut out).unwrap();
        run_add(&path, add("prod", true), &mut out).unwrap();

        let mut listing = Vec::new();
        run_list(&path, &mut listing).unwrap();
        let text = String::from_utf8(listing).unwrap();
        assert!(text.contains("* prod"));
        assert!(text.contains("lab.example.com:8443"));
        assert!(!text.contains("secret"));
    }
}
