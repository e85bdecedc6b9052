use std::process::Command;

fn main() {
    // BUILD_VERSION: package version plus git short hash when available.
    let hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|h| h.trim().to_string())
        .unwrap_or_default();

    let pkg = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = if hash.is_empty() { pkg } else { format!("{pkg}+{hash}") };
    println!("cargo:rustc-env=BUILD_VERSION={version}");
    println!("cargo:rerun-if-changed=src/");
}
