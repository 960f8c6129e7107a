use pipetrack::cli::{is_internal_error, run};

fn main() {
    // Colors are only emitted on terminals that understand them
    if enable_ansi_support::enable_ansi_support().is_err() {
        std::env::set_var("NO_COLOR", "1");
    }

    if let Err(e) = run() {
        if is_internal_error(&e) {
            eprintln!("Internal error: {}", e);
            // Show error chain if available
            let mut causes = e.chain().skip(1).peekable();
            if causes.peek().is_some() {
                eprintln!("\nCaused by:");
                for (indent, err) in causes.enumerate() {
                    eprintln!("{:indent$}  {}", "", err, indent = indent + 1);
                }
            }
            std::process::exit(2);
        } else {
            // User error
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
