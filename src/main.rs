use clap::Parser as ClapParser;
use log::debug;
use parable::{Parser, ParserOptions};
use std::io::Read;

#[derive(ClapParser)]
#[command(name = "parable")]
#[command(about = "Parse bash source and print its S-expression form")]
#[command(version)]
struct Cli {
    /// Parse the script given on the command line
    #[arg(short = 'c')]
    script: Option<String>,

    /// Recognize extended glob patterns such as @(a|b)
    #[arg(long = "extglob")]
    extglob: bool,

    /// Print the AST as JSON instead of S-expressions
    #[arg(long = "json")]
    json: bool,

    /// Only report whether the input parses
    #[arg(long = "check")]
    check: bool,

    /// Script file to parse
    #[arg()]
    script_file: Option<String>,
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    // Script source: -c, file, or stdin
    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: Cannot read script file: {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("Error: No script provided. Use -c 'script', provide a script file, or pipe via stdin.");
            std::process::exit(1);
        }
        let mut buf = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
            eprintln!("Error: Cannot read stdin: {}", e);
            std::process::exit(1);
        }
        buf
    };
    debug!("parsing {} bytes (extglob={})", script.len(), cli.extglob);

    let mut parser = Parser::new(&script, ParserOptions { extglob: cli.extglob });
    let result = parser.parse();

    if cli.json {
        let doc = match &result {
            Ok(nodes) => serde_json::json!({
                "ok": true,
                "sexp": nodes.iter().map(|n| n.to_sexp()).collect::<Vec<_>>(),
                "ast": nodes,
            }),
            Err(e) => serde_json::json!({
                "ok": false,
                "error": e.to_string(),
            }),
        };
        println!("{}", doc);
        std::process::exit(if result.is_ok() { 0 } else { 1 });
    }

    let nodes = match result {
        Ok(nodes) => nodes,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if cli.check {
        return;
    }
    for node in &nodes {
        let sexp = node.to_sexp();
        if !sexp.is_empty() {
            println!("{}", sexp);
        }
    }
}
