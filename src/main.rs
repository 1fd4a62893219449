fn main() {
    if handle_cli_flags() {
        return;
    }

    if let Err(err) = martisor_tui::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Mărțișor {}", martisor_tui::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "Mărțișor — A scripted invitation, played back as a chat in the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                if let Some(path) = martisor_tui::config::default_path() {
                    println!("\nConfig file: {}", path.display());
                }
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}
