//! rtmcc entry point.

fn main() {
    std::process::exit(rtmcc::cli::run_cli());
}
