use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    text2sql_lib::run().await
}
