use atelier::cli::run;
use atelier::error::CoreError;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        if is_user_error(&e) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }

        eprintln!("Internal error: {}", e);
        let mut causes = e.chain().skip(1).peekable();
        if causes.peek().is_some() {
            eprintln!("\nCaused by:");
            for (indent, cause) in causes.enumerate() {
                eprintln!("{:indent$}  {}", "", cause, indent = indent + 1);
            }
        }
        std::process::exit(2);
    }
}

/// Typed domain failures and plain validation messages are user errors
/// (exit 1); anything carrying a storage error in its chain is internal
/// (exit 2). Classification is by type, not by message text.
fn is_user_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<CoreError>().is_some()
        || e.chain().all(|cause| cause.downcast_ref::<rusqlite::Error>().is_none())
}
