fn main() {
    if let Err(err) = phylo_graph::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
