fn main() {
    if let Err(err) = flowgrid::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
