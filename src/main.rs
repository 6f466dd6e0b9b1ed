fn main() {
    if let Err(err) = archlayout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
