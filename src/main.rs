use colored::Colorize;

fn main() {
    if let Err(e) = pcectl::run() {
        tracing::error!(error = %e, "pcectl failed");
        eprintln!("{} {}", "error:".red().bold(), e.to_string().red());
        std::process::exit(e.exit_code());
    }
}
