use std::{env, fs, path::Path};

/// `[package]` string field, or `fallback`.
fn field<'a>(table: Option<&'a toml::Value>, key: &str, fallback: &'a str) -> &'a str {
    table
        .and_then(|t| t.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(fallback)
}

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let cargo_toml_path = Path::new(&manifest_dir).join("Cargo.toml");
    println!("cargo:rerun-if-changed={}", cargo_toml_path.display());

    let content = fs::read_to_string(&cargo_toml_path)
        .unwrap_or_else(|e| panic!("Failed to read Cargo.toml: {e}"));
    let parsed: toml::Value =
        toml::from_str(&content).unwrap_or_else(|e| panic!("Failed to parse Cargo.toml: {e}"));
    let package = parsed.get("package");
    let settings = package
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("bricktrack"));

    let name = field(package, "name", "bricktrack");
    let data_dir = field(settings, "data-dir", ".bricktrack");
    let topic = field(settings, "channel-topic", "realtime:bricktrack");

    // Debug formatting yields escaped string literals.
    let contents = format!(
        "pub const PKG_NAME: &str = {:?};\n\
         pub const PKG_VERSION: &str = {:?};\n\
         pub const PKG_DESCRIPTION: &str = {:?};\n\
         /// Directory under the home directory holding the local store.\n\
         pub const DATA_DIR_NAME: &str = {:?};\n\
         /// Default realtime channel topic.\n\
         pub const CHANNEL_TOPIC: &str = {:?};\n",
        name,
        field(package, "version", "0.0.0"),
        field(package, "description", ""),
        data_dir,
        topic,
    );

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    fs::write(Path::new(&out_dir).join("pkg_info.rs"), contents)
        .expect("Failed to write pkg_info.rs");
}
