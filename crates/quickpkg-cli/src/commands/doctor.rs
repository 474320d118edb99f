use super::{colorize_status, json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use quickpkg_runtime::TOOLS;
use quickpkg_schema::{default_config_path, Defaults};
use serde::Serialize;
use std::path::Path;

pub fn run(config: Option<&Path>, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_tools(&mut checks, &mut all_pass);
    check_config(config, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_tools(checks: &mut Vec<Check>, all_pass: &mut bool) {
    for tool in TOOLS {
        if tool.available() {
            checks.push(Check::pass(
                tool.name,
                &format!("{} found at {}", tool.name, tool.path),
            ));
        } else {
            *all_pass = false;
            checks.push(Check::fail(
                tool.name,
                &format!(
                    "{} not found at {} (needed for {})",
                    tool.name, tool.path, tool.purpose
                ),
            ));
        }
    }
}

fn check_config(explicit: Option<&Path>, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let Some(path) = explicit
        .map(Path::to_path_buf)
        .or_else(default_config_path)
    else {
        checks.push(Check::info("config", "HOME is not set; no config file"));
        return;
    };
    if !path.is_file() {
        checks.push(Check::info(
            "config",
            &format!("no config file at {} (built-in defaults apply)", path.display()),
        ));
        return;
    }
    match Defaults::load(&path) {
        Ok(_) => checks.push(Check::pass(
            "config",
            &format!("config file {} is valid", path.display()),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "config",
                &format!("config file {}: {e}", path.display()),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks,
        });
        println!("{}", json_pretty(&json)?);
    } else {
        println!("quickpkg doctor\n");
        for check in checks {
            println!("  {} {}", colorize_status(check.status), check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_is_checked() {
        let mut checks = Vec::new();
        let mut all_pass = true;
        check_tools(&mut checks, &mut all_pass);
        assert_eq!(checks.len(), TOOLS.len());
        assert_eq!(all_pass, TOOLS.iter().all(|t| t.available()));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "unknown_key = 1\n").unwrap();

        let mut checks = Vec::new();
        let mut all_pass = true;
        check_config(Some(&path), &mut checks, &mut all_pass);
        assert!(!all_pass);
        assert_eq!(checks[0].status, "fail");
    }

    #[test]
    fn missing_config_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let mut checks = Vec::new();
        let mut all_pass = true;
        check_config(Some(&dir.path().join("none.toml")), &mut checks, &mut all_pass);
        assert!(all_pass);
        assert_eq!(checks[0].status, "info");
    }

    #[test]
    fn checks_serialize_for_json() {
        let json = serde_json::to_value(Check::pass("pkgbuild", "ok")).unwrap();
        assert_eq!(json["status"], "pass");
        assert_eq!(json["name"], "pkgbuild");
    }
}
