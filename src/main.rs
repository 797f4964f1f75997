fn main() {
    if let Err(e) = localca::cli::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
