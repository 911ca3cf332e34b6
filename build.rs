use chrono::Utc;
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

fn package_description(cargo_toml: &Path) -> String {
    fs::read_to_string(cargo_toml)
        .ok()
        .and_then(|contents| contents.parse::<toml::Table>().ok())
        .and_then(|manifest| {
            manifest
                .get("package")?
                .get("description")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn git_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let out_dir = env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo");
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set by cargo");

    let description = package_description(&Path::new(&manifest_dir).join("Cargo.toml"));
    let build_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

    let version_rs = format!(
        "pub const PACKAGE_DESCRIPTION: &str = {:?};\npub const BUILD_TIME: &str = \"{}\";\npub const GIT_HASH: &str = {:?};\n",
        description,
        build_time,
        git_hash()
    );
    fs::write(Path::new(&out_dir).join("version.rs"), version_rs).expect("Failed to write version.rs");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
