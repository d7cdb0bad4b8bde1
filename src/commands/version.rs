//! Command: print version information.

/// The release version, or the crate version for local builds.
#[must_use]
pub fn current() -> &'static str {
    option_env!("PROVISIONER_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the provisioner version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("provisioner {}", current());
}
