//! Interactive terminal chat
//!
//! One thread per run. `/reset` starts a fresh thread, `/exit` or EOF quits.

use anyhow::Result;
use fab_chat::{ChatService, Turn, TurnOutcome};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(service: &ChatService, json: bool) -> Result<()> {
    let mut thread_id = new_thread_id();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Connected. Ask about the fabric; /reset starts over, /exit quits.");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => break,
            "/reset" => {
                service.discard(&thread_id).await;
                thread_id = new_thread_id();
                println!("Started a new conversation.");
                continue;
            }
            message => {
                let turn = service.handle(&thread_id, message).await?;
                print_turn(&turn, json)?;
            }
        }
    }

    service.discard(&thread_id).await;
    Ok(())
}

fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Response to stdout; failed turns get an error banner on stderr
pub fn print_turn(turn: &Turn, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(turn)?);
        return Ok(());
    }
    if turn.outcome == TurnOutcome::Failed {
        eprintln!("error: the request failed");
    }
    println!("{}", turn.response);
    Ok(())
}
