use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    ghost::app::run(options)
}

fn parse_args(args: Vec<String>) -> anyhow::Result<ghost::app::AppOptions> {
    let mut out = ghost::app::AppOptions::default();
    for arg in args {
        match arg.as_str() {
            "--debug" => out.debug = true,
            "--null-audio" => out.null_audio = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => anyhow::bail!("unknown argument {flag}"),
            path => {
                if path.trim().is_empty() {
                    anyhow::bail!("empty path argument");
                }
                out.enqueue.push(PathBuf::from(path));
            }
        }
    }
    Ok(out)
}

fn print_help() {
    println!("ghost [OPTIONS] [FILE|FOLDER]...");
    println!("  --debug           Write debug-level logs to ghost.log");
    println!("  --null-audio      Play silently without opening an output device");
    println!("  FILE|FOLDER       Append media to the restored playlist");
}
