//! Command: print version information.

/// Print the dotsafe version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("dotsafe {}", crate::VERSION);
}
