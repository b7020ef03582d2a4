//! Embeds the build commit for `vsync --version`

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=VSYNC_GIT_COMMIT");

    // Explicit VSYNC_GIT_COMMIT wins, then git, then "notpassed"
    let commit = std::env::var("VSYNC_GIT_COMMIT")
        .ok()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .or_else(git_commit)
        .unwrap_or_else(|| "notpassed".to_string());

    println!("cargo:rustc-env=VSYNC_GIT_COMMIT={}", commit);
}

fn git_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
}
