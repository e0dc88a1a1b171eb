//! Build script for sosym-core
//!
//! Checks the toolchain before compilation. The engine relies on `let ... else`
//! and `Option::is_some_and`, so anything older than Rust 1.70 is rejected.

fn main()
{
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 70, 0);

        if rustc_version < min_rust_version {
            panic!(
                "sosym-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }
}
