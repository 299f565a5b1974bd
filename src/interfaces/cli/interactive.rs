// ============================================================
// INTERACTIVE MODE
// ============================================================
// One question per line against a single data source

use super::commands::{print_outcome, Session};
use super::render::render_sources;
use crate::domain::error::Result;
use crate::infrastructure::db::QueryDatabase;
use std::io::Write;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Type a question to query the data source, or one of:
  /help      show this help
  /sources   list data sources
  /schema    show the tables of the current source
  /active    show the current source
  /quit      leave (also /exit or Ctrl-D)";

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Help,
    Sources,
    Schema,
    Active,
    Quit,
    Unknown(&'a str),
    Question(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return match line.to_lowercase().as_str() {
            "quit" | "exit" => Input::Quit,
            _ => Input::Question(line),
        };
    }
    match line.to_lowercase().as_str() {
        "/help" | "/?" => Input::Help,
        "/sources" => Input::Sources,
        "/schema" => Input::Schema,
        "/active" => Input::Active,
        "/quit" | "/exit" | "/q" => Input::Quit,
        _ => Input::Unknown(line),
    }
}

pub async fn run(
    session: &Session,
    source: Option<&str>,
    max_attempts: Option<u32>,
) -> Result<ExitCode> {
    let registry = session.registry()?;
    let source = registry.resolve(source)?.clone();
    let database = session.open_database(&source).await?;
    let use_case = session.text_to_sql(database.clone(), max_attempts);

    println!(
        "Connected to '{}' [{}]. Up to {} repair attempt(s) per question.",
        source.name,
        source.kind,
        use_case.settings().max_debug_attempts
    );
    println!("Type /help for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("text2sql> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Help => println!("{}", HELP),
            Input::Sources => print!(
                "{}",
                render_sources(registry.list(), |name| name == source.name)
            ),
            Input::Schema => match database.extract_schema().await {
                Ok(schema) => print!("{}", schema),
                Err(e) => eprintln!("{}", e),
            },
            Input::Active => println!(
                "{} [{}] {}",
                source.name,
                source.kind,
                source.location()
            ),
            Input::Quit => break,
            Input::Unknown(command) => {
                eprintln!("Unknown command '{}'. Type /help for commands.", command)
            }
            Input::Question(question) => match use_case.answer(question).await {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => eprintln!("{}", e),
            },
        }
        println!();
    }

    database.close().await;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(parse_input("/HELP"), Input::Help);
        assert_eq!(parse_input(" /schema "), Input::Schema);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("quit"), Input::Quit);
        assert_eq!(parse_input("/drop"), Input::Unknown("/drop"));
        assert_eq!(
            parse_input("how many rows are there?"),
            Input::Question("how many rows are there?")
        );
    }
}
